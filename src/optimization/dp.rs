use log::debug;
use rand::{rngs::StdRng, Rng};
use rand_distr::{Distribution, Normal};

use super::{clip_l2, Optimizer};
use crate::{
    privacy::{PrivacySpent, RdpAccountant},
    FedErr, Result,
};

/// Hyperparameters of differentially private SGD.
#[derive(Debug, Clone, PartialEq)]
pub struct DpSgdConfig {
    /// The amount of examples per step.
    pub batch_size: usize,
    /// The amount of examples the batches are drawn from.
    pub sample_size: usize,
    /// The candidate Rényi orders the accountant tracks.
    pub orders: Vec<f64>,
    /// The noise's standard deviation in units of `max_grad_norm`.
    pub noise_multiplier: f64,
    /// The L2 bound every per-example gradient is clipped to.
    pub max_grad_norm: f64,
}

impl DpSgdConfig {
    /// Checks every hyperparameter.
    ///
    /// # Returns
    /// An `InvalidConfig` error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(FedErr::InvalidConfig("the batch size must be positive".into()));
        }

        if self.sample_size < self.batch_size {
            return Err(FedErr::InvalidConfig(format!(
                "the batch size ({}) can't be larger than the sample size ({})",
                self.batch_size, self.sample_size
            )));
        }

        if !self.noise_multiplier.is_finite() || self.noise_multiplier <= 0.0 {
            return Err(FedErr::InvalidConfig(format!(
                "the noise multiplier must be positive, got {}",
                self.noise_multiplier
            )));
        }

        if !self.max_grad_norm.is_finite() || self.max_grad_norm <= 0.0 {
            return Err(FedErr::InvalidConfig(format!(
                "the max gradient norm must be positive, got {}",
                self.max_grad_norm
            )));
        }

        Ok(())
    }

    /// The probability of an example being part of a batch.
    pub fn sampling_rate(&self) -> f64 {
        self.batch_size as f64 / self.sample_size as f64
    }
}

/// Summary of a single private step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepStats {
    pub examples: usize,
    pub clipped: usize,
}

/// Wraps an optimizer so that every update is differentially private.
///
/// Each step clips the per-example gradients, sums them, adds gaussian noise, averages over
/// the batch and hands the result to the wrapped optimizer. The step is then recorded with
/// the accountant this wrapper owns.
#[derive(Debug)]
pub struct DpOptimizer<O, R = StdRng> {
    config: DpSgdConfig,
    optimizer: O,
    rng: R,
    noise: Normal<f64>,
    accountant: RdpAccountant,
    sum: Vec<f64>,
    grad: Vec<f32>,
}

impl<O, R> DpOptimizer<O, R>
where
    O: Optimizer,
    R: Rng,
{
    /// Creates a new `DpOptimizer`.
    ///
    /// # Arguments
    /// * `config` - The privacy hyperparameters.
    /// * `optimizer` - The update rule applied to the noisy gradient.
    /// * `rng` - The source of the noise.
    ///
    /// # Returns
    /// An `InvalidConfig` error if any hyperparameter is invalid.
    pub fn new(config: DpSgdConfig, optimizer: O, rng: R) -> Result<Self> {
        config.validate()?;
        let accountant = RdpAccountant::new(&config.orders)?;
        let std_dev = config.noise_multiplier * config.max_grad_norm;
        let noise = Normal::new(0.0, std_dev)
            .map_err(|e| FedErr::InvalidConfig(format!("noise distribution: {e}")))?;

        Ok(Self {
            config,
            optimizer,
            rng,
            noise,
            accountant,
            sum: Vec::new(),
            grad: Vec::new(),
        })
    }

    pub fn config(&self) -> &DpSgdConfig {
        &self.config
    }

    pub fn accountant(&self) -> &RdpAccountant {
        &self.accountant
    }

    /// The privacy spent so far, see `RdpAccountant::privacy_spent`.
    pub fn privacy_spent(&self, delta: f64) -> Result<PrivacySpent> {
        self.accountant.privacy_spent(delta)
    }

    /// Performs one private update of `params`.
    ///
    /// # Arguments
    /// * `params` - The parameters to update.
    /// * `per_example` - One gradient per example of the batch, clipped in place.
    ///
    /// # Returns
    /// A `SizeMismatch` error if the amount of gradients differs from the batch size or a
    /// gradient's length differs from the amount of parameters. Nothing is updated or
    /// recorded in that case.
    pub fn step(&mut self, params: &mut [f32], per_example: &mut [Vec<f32>]) -> Result<StepStats> {
        if per_example.len() != self.config.batch_size {
            return Err(FedErr::SizeMismatch {
                what: "per-example gradients",
                got: per_example.len(),
                expected: self.config.batch_size,
            });
        }

        if let Some(bad) = per_example.iter().find(|g| g.len() != params.len()) {
            return Err(FedErr::SizeMismatch {
                what: "gradient",
                got: bad.len(),
                expected: params.len(),
            });
        }

        self.sum.clear();
        self.sum.resize(params.len(), 0.0);
        let mut clipped = 0;

        for grad in per_example.iter_mut() {
            let report = clip_l2(grad, self.config.max_grad_norm);
            clipped += report.clipped as usize;

            for (s, &g) in self.sum.iter_mut().zip(grad.iter()) {
                *s += g as f64;
            }
        }

        let batch_size = self.config.batch_size as f64;
        let Self {
            sum,
            grad,
            rng,
            noise,
            ..
        } = &mut *self;

        grad.clear();
        grad.extend(
            sum.iter()
                .map(|&s| ((s + noise.sample(&mut *rng)) / batch_size) as f32),
        );

        self.optimizer.update_params(&self.grad, params)?;
        self.accountant
            .record_step(self.config.sampling_rate(), self.config.noise_multiplier)?;

        debug!(
            examples = per_example.len(),
            clipped = clipped,
            steps = self.accountant.steps();
            "private step done"
        );

        Ok(StepStats {
            examples: per_example.len(),
            clipped,
        })
    }
}
