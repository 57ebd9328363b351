use std::{fs, num::NonZeroUsize, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    arch::ParamInit,
    orchestra::{RoundConfig, Weighting},
    privacy::default_orders,
    FedErr, Result,
};

/// The specification for the `Optimizer` trait.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerSpec {
    Adam {
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    },
    GradientDescent {
        learning_rate: f32,
    },
    GradientDescentWithMomentum {
        learning_rate: f32,
        momentum: f32,
    },
}

/// The private optimizer's hyperparameters shared by every worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivacySpec {
    pub batch_size: NonZeroUsize,
    pub noise_multiplier: f64,
    pub max_grad_norm: f64,
    #[serde(default = "default_orders")]
    pub orders: Vec<f64>,
}

/// Everything needed to run a federation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederationConfig {
    pub workers: NonZeroUsize,
    pub rounds: NonZeroUsize,
    pub delta: f64,
    #[serde(default)]
    pub max_epsilon: Option<f64>,
    #[serde(default)]
    pub round_timeout_ms: Option<u64>,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub weighting: Weighting,
    /// How the global model is initialized before the first round.
    #[serde(default)]
    pub init: ParamInit,
    pub privacy: PrivacySpec,
    pub optimizer: OptimizerSpec,
}

impl Default for FederationConfig {
    fn default() -> Self {
        const WORKERS: NonZeroUsize = NonZeroUsize::new(4).unwrap();
        const ROUNDS: NonZeroUsize = NonZeroUsize::new(10).unwrap();
        const BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(16).unwrap();

        Self {
            workers: WORKERS,
            rounds: ROUNDS,
            delta: 1e-5,
            max_epsilon: None,
            round_timeout_ms: None,
            seed: 0,
            weighting: Weighting::Uniform,
            init: ParamInit::XavierUniform,
            privacy: PrivacySpec {
                batch_size: BATCH_SIZE,
                noise_multiplier: 1.1,
                max_grad_norm: 1.0,
                orders: default_orders(),
            },
            optimizer: OptimizerSpec::GradientDescent { learning_rate: 0.1 },
        }
    }
}

impl FederationConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Checks every value that can be checked without the data.
    ///
    /// # Returns
    /// An `InvalidConfig` error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        self.round_config().validate()?;

        let privacy = &self.privacy;
        if !privacy.noise_multiplier.is_finite() || privacy.noise_multiplier <= 0.0 {
            return Err(FedErr::InvalidConfig(format!(
                "the noise multiplier must be positive, got {}",
                privacy.noise_multiplier
            )));
        }

        if !privacy.max_grad_norm.is_finite() || privacy.max_grad_norm <= 0.0 {
            return Err(FedErr::InvalidConfig(format!(
                "the max gradient norm must be positive, got {}",
                privacy.max_grad_norm
            )));
        }

        if privacy.orders.is_empty() || privacy.orders.iter().any(|a| !a.is_finite() || *a < 1.0) {
            return Err(FedErr::InvalidConfig(
                "the orders must be a non empty list of finite values of at least 1".into(),
            ));
        }

        if let ParamInit::Normal { std_dev, .. } = self.init {
            if !std_dev.is_finite() || std_dev < 0.0 {
                return Err(FedErr::InvalidConfig(format!(
                    "the initial standard deviation must be non negative, got {std_dev}"
                )));
            }
        }

        let lr = match self.optimizer {
            OptimizerSpec::Adam { learning_rate, .. }
            | OptimizerSpec::GradientDescent { learning_rate }
            | OptimizerSpec::GradientDescentWithMomentum { learning_rate, .. } => learning_rate,
        };

        if !lr.is_finite() || lr <= 0.0 {
            return Err(FedErr::InvalidConfig(format!(
                "the learning rate must be positive, got {lr}"
            )));
        }

        Ok(())
    }

    /// The orchestrator's share of the configuration.
    pub fn round_config(&self) -> RoundConfig {
        RoundConfig {
            rounds: self.rounds,
            delta: self.delta,
            max_epsilon: self.max_epsilon,
            round_timeout: self.round_timeout_ms.map(Duration::from_millis),
            weighting: self.weighting,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: &str = r#"{
        "workers": 3,
        "rounds": 5,
        "delta": 1e-5,
        "max_epsilon": 8.0,
        "round_timeout_ms": 2000,
        "seed": 42,
        "weighting": "by_samples",
        "init": { "normal": { "mean": 0.0, "std_dev": 0.1 } },
        "privacy": {
            "batch_size": 32,
            "noise_multiplier": 1.2,
            "max_grad_norm": 1.0
        },
        "optimizer": {
            "gradient_descent_with_momentum": { "learning_rate": 0.05, "momentum": 0.9 }
        }
    }"#;

    #[test]
    fn parses_a_full_config() {
        let config = FederationConfig::from_json(JSON).unwrap();

        assert_eq!(config.workers.get(), 3);
        assert_eq!(config.weighting, Weighting::BySamples);
        assert_eq!(
            config.init,
            ParamInit::Normal {
                mean: 0.0,
                std_dev: 0.1
            }
        );
        assert_eq!(config.privacy.orders, default_orders());
        assert_eq!(
            config.optimizer,
            OptimizerSpec::GradientDescentWithMomentum {
                learning_rate: 0.05,
                momentum: 0.9
            }
        );

        let rounds = config.round_config();
        assert_eq!(rounds.round_timeout, Some(Duration::from_secs(2)));
        assert_eq!(rounds.max_epsilon, Some(8.0));
    }

    #[test]
    fn optional_fields_have_defaults() {
        let json = r#"{
            "workers": 2,
            "rounds": 1,
            "delta": 0.001,
            "privacy": { "batch_size": 4, "noise_multiplier": 1.0, "max_grad_norm": 0.5, "orders": [2, 4] },
            "optimizer": { "gradient_descent": { "learning_rate": 0.1 } }
        }"#;
        let config = FederationConfig::from_json(json).unwrap();

        assert_eq!(config.seed, 0);
        assert_eq!(config.weighting, Weighting::Uniform);
        assert_eq!(config.init, ParamInit::XavierUniform);
        assert_eq!(config.max_epsilon, None);
        assert_eq!(config.privacy.orders, vec![2.0, 4.0]);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = FederationConfig::default();
        assert!(config.validate().is_ok());

        config.delta = 1.0;
        assert!(config.validate().is_err());

        let mut config = FederationConfig::default();
        config.privacy.noise_multiplier = 0.0;
        assert!(config.validate().is_err());

        let mut config = FederationConfig::default();
        config.privacy.orders = vec![0.5];
        assert!(config.validate().is_err());

        let mut config = FederationConfig::default();
        config.optimizer = OptimizerSpec::GradientDescent { learning_rate: -1.0 };
        assert!(config.validate().is_err());

        let mut config = FederationConfig::default();
        config.init = ParamInit::Normal {
            mean: 0.0,
            std_dev: -1.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_workers_fail_to_parse() {
        let json = JSON.replace("\"workers\": 3", "\"workers\": 0");
        assert!(matches!(
            FederationConfig::from_json(&json),
            Err(FedErr::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = FederationConfig::from_path("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, FedErr::Io(_)));
    }
}
