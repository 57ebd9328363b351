use crate::{arch::ParamSet, privacy::PrivacySpent, Result};

/// A data holder taking part in the federation, the seam the orchestrator drives.
pub trait Participant: Send {
    /// The worker's unique identifier.
    fn id(&self) -> &str;

    /// The amount of examples in the worker's partition.
    fn num_samples(&self) -> usize;

    /// The worker's local parameters.
    fn params(&self) -> &ParamSet;

    /// Overwrites every local parameter with the global model's.
    ///
    /// # Returns
    /// An error if the layouts differ, the local parameters are left untouched in that case.
    fn receive(&mut self, global: &ParamSet) -> Result<()>;

    /// Trains over the whole local partition once.
    ///
    /// # Returns
    /// The epoch's mean loss.
    fn train_one_epoch(&mut self) -> Result<f32>;

    /// The privacy spent by every local step so far.
    fn privacy_spent(&self, delta: f64) -> Result<PrivacySpent>;
}
