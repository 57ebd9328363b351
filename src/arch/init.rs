use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

use crate::{FedErr, Result};

/// How to fill a layer's weights before training. Biases always start at zero, except for
/// `Const` which sets every parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamInit {
    Const { value: f32 },
    Normal { mean: f32, std_dev: f32 },
    #[default]
    XavierUniform,
}

impl ParamInit {
    /// Fills a weight tensor.
    ///
    /// # Arguments
    /// * `weights` - The weights to overwrite.
    /// * `fan_in` - The number of input units of the layer.
    /// * `fan_out` - The number of output units of the layer.
    /// * `rng` - A random number generator.
    ///
    /// # Returns
    /// An error if the distribution's parameters are invalid.
    pub fn fill_weights<R: Rng>(
        &self,
        weights: &mut [f32],
        fan_in: usize,
        fan_out: usize,
        rng: &mut R,
    ) -> Result<()> {
        match *self {
            ParamInit::Const { value } => weights.fill(value),
            ParamInit::Normal { mean, std_dev } => {
                let dist = Normal::new(mean, std_dev)
                    .map_err(|e| FedErr::InvalidConfig(e.to_string()))?;
                weights.iter_mut().for_each(|w| *w = dist.sample(&mut *rng));
            }
            ParamInit::XavierUniform => {
                let range = (6. / (fan_in + fan_out) as f32).sqrt();
                let dist = Uniform::new(-range, range)
                    .map_err(|e| FedErr::InvalidConfig(e.to_string()))?;
                weights.iter_mut().for_each(|w| *w = dist.sample(&mut *rng));
            }
        }

        Ok(())
    }

    /// The value biases start with.
    pub fn bias(&self) -> f32 {
        match *self {
            ParamInit::Const { value } => value,
            _ => 0.0,
        }
    }
}
