pub mod activations;
mod init;
pub mod layers;
pub mod loss;
mod model;
mod params;
mod sequential;

pub use init::ParamInit;
pub use model::Model;
pub use params::{l2_norm, ParamLayout, ParamSet, TensorSpec};
pub use sequential::Sequential;
