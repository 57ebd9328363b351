pub mod arch;
pub mod config;
pub mod data;
mod error;
pub mod optimization;
pub mod orchestra;
pub mod privacy;

pub use error::{FedErr, Result};
