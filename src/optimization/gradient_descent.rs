use super::{optimizer::check_sizes, Optimizer};
use crate::Result;

#[derive(Debug)]
pub struct GradientDescent {
    learning_rate: f32,
}

impl GradientDescent {
    /// Creates a new `GradientDescent` optimizer.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    ///
    /// # Returns
    /// A new `GradientDescent` instance.
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for GradientDescent {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_sizes(grad, params)?;

        let lr = self.learning_rate;

        for (p, g) in params.iter_mut().zip(grad) {
            *p -= lr * g;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FedErr;

    #[test]
    fn steps_against_the_gradient() {
        let mut params = [1.0, -1.0];
        GradientDescent::new(0.5)
            .update_params(&[2.0, -4.0], &mut params)
            .unwrap();
        assert_eq!(params, [0.0, 1.0]);
    }

    #[test]
    fn rejects_mismatched_sizes() {
        let mut params = [0.0; 3];
        let err = GradientDescent::new(0.1)
            .update_params(&[1.0], &mut params)
            .unwrap_err();
        assert!(matches!(err, FedErr::SizeMismatch { got: 1, expected: 3, .. }));
    }
}
