use ndarray::{Array2, ArrayView2};

use crate::{
    arch::{loss::LossFn, ParamSet},
    Result,
};

/// A parameterized model a worker can train locally.
pub trait Model: Send + Sync {
    /// The model's parameters, in order.
    fn params(&self) -> &ParamSet;

    /// Mutable access to the model's parameters, used for broadcasts and optimizer steps.
    fn params_mut(&mut self) -> &mut ParamSet;

    /// Computes the predictions for a batch.
    ///
    /// # Arguments
    /// * `x` - The input batch, one example per row.
    fn forward(&self, x: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Computes one gradient per example of the batch instead of a single averaged one.
    ///
    /// # Arguments
    /// * `x` - The input batch, one example per row.
    /// * `y` - The expected outputs, one per row.
    /// * `loss_fn` - The loss function.
    ///
    /// # Returns
    /// The mean loss over the batch and a flat gradient per example, each laid out like
    /// `params`.
    fn per_example_grads<L: LossFn>(
        &self,
        x: ArrayView2<f32>,
        y: ArrayView2<f32>,
        loss_fn: &L,
    ) -> Result<(f32, Vec<Vec<f32>>)>;
}
