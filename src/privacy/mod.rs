mod accountant;
pub mod rdp;

pub use accountant::{default_orders, PrivacySpent, RdpAccountant};
