mod dataset;
mod loader;
mod partition;

pub use dataset::Dataset;
pub use loader::DataLoader;
pub use partition::{partition, shard_range};
