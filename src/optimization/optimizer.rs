use crate::{FedErr, Result};

/// Defines the strategy for updating model parameters based on calculated gradients.
pub trait Optimizer {
    /// Updates the provided slice of parameters using the gradient.
    ///
    /// # Arguments
    /// * `grad` - A reference to the model's gradient.
    /// * `params` - The parameters to update.
    ///
    /// # Returns
    /// An error if there's a mismatch in the sizes of `grad` and `params`.
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()>;
}

impl<O: Optimizer + ?Sized> Optimizer for Box<O> {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        (**self).update_params(grad, params)
    }
}

pub(super) fn check_sizes(grad: &[f32], params: &[f32]) -> Result<()> {
    if grad.len() != params.len() {
        return Err(FedErr::SizeMismatch {
            what: "gradient",
            got: grad.len(),
            expected: params.len(),
        });
    }

    Ok(())
}
