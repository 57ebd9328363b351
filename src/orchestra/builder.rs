use log::debug;
use rand::{rngs::StdRng, SeedableRng};

use super::WorkerReplica;
use crate::{
    arch::{loss::LossFn, Model},
    config::{FederationConfig, OptimizerSpec},
    data::{partition, DataLoader, Dataset},
    optimization::{
        Adam, DpOptimizer, DpSgdConfig, GradientDescent, GradientDescentWithMomentum, Optimizer,
    },
    Result,
};

/// A boxed optimizer, so that every worker of a federation shares one concrete type.
pub type DynOptimizer = Box<dyn Optimizer + Send>;

/// Builds the optimizer described by `spec` for `len` parameters.
pub fn build_optimizer(spec: OptimizerSpec, len: usize) -> DynOptimizer {
    match spec {
        OptimizerSpec::Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
        } => Box::new(Adam::new(len, learning_rate, beta1, beta2, epsilon)),
        OptimizerSpec::GradientDescent { learning_rate } => {
            Box::new(GradientDescent::new(learning_rate))
        }
        OptimizerSpec::GradientDescentWithMomentum {
            learning_rate,
            momentum,
        } => Box::new(GradientDescentWithMomentum::new(len, learning_rate, momentum)),
    }
}

/// Splits `dataset` into one disjoint partition per worker and builds their replicas.
///
/// Every replica starts from a copy of `model`. The shuffling and the noise of each worker
/// are seeded from `config.seed`, so a federation is reproducible.
///
/// # Arguments
/// * `config` - The federation's configuration.
/// * `model` - The model every worker starts from.
/// * `loss_fn` - The loss function.
/// * `dataset` - The whole dataset, each example ends up in exactly one partition.
///
/// # Returns
/// An error if the configuration is invalid or a partition is smaller than a batch.
pub fn build_replicas<M, L>(
    config: &FederationConfig,
    model: &M,
    loss_fn: &L,
    dataset: &Dataset,
) -> Result<Vec<WorkerReplica<M, DynOptimizer, L>>>
where
    M: Model + Clone,
    L: LossFn + Clone,
{
    config.validate()?;

    let mut seeds = StdRng::seed_from_u64(config.seed);
    let len = model.params().len();

    partition(dataset, config.workers.get())?
        .into_iter()
        .enumerate()
        .map(|(i, shard)| {
            let id = format!("worker-{i}");
            let dp_config = DpSgdConfig {
                batch_size: config.privacy.batch_size.get(),
                sample_size: shard.len(),
                orders: config.privacy.orders.clone(),
                noise_multiplier: config.privacy.noise_multiplier,
                max_grad_norm: config.privacy.max_grad_norm,
            };

            debug!(
                worker_id = id.as_str(),
                samples = shard.len(),
                sampling_rate = dp_config.sampling_rate();
                "building replica"
            );

            let loader = DataLoader::new(
                shard,
                config.privacy.batch_size,
                StdRng::from_rng(&mut seeds),
            );
            let optimizer = DpOptimizer::new(
                dp_config,
                build_optimizer(config.optimizer, len),
                StdRng::from_rng(&mut seeds),
            )?;

            WorkerReplica::new(id, model.clone(), loader, loss_fn.clone(), optimizer)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;
    use crate::{
        arch::{layers::Dense, loss::Mse, Sequential},
        orchestra::Participant,
        FedErr,
    };

    fn dataset(len: usize) -> Dataset {
        let data = (0..len).flat_map(|i| [i as f32, 1.0]).collect();
        Dataset::new(data, 1, 1).unwrap()
    }

    fn config(workers: usize, batch_size: usize) -> FederationConfig {
        let mut config = FederationConfig::default();
        config.workers = NonZeroUsize::new(workers).unwrap();
        config.privacy.batch_size = NonZeroUsize::new(batch_size).unwrap();
        config
    }

    #[test]
    fn one_replica_per_partition() {
        let model = Sequential::new([Dense::new((1, 1), None)]).unwrap();
        let replicas = build_replicas(&config(3, 2), &model, &Mse, &dataset(10)).unwrap();

        let ids: Vec<_> = replicas.iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, ["worker-0", "worker-1", "worker-2"]);

        let samples: usize = replicas.iter().map(|r| r.num_samples()).sum();
        assert_eq!(samples, 10);
        assert!(replicas.iter().all(|r| r.params() == model.params()));
    }

    #[test]
    fn partitions_smaller_than_a_batch_are_rejected() {
        let model = Sequential::new([Dense::new((1, 1), None)]).unwrap();
        let res = build_replicas(&config(4, 5), &model, &Mse, &dataset(10));
        assert!(matches!(res, Err(FedErr::InvalidConfig(_))));
    }

    #[test]
    fn every_optimizer_spec_builds() {
        let specs = [
            OptimizerSpec::GradientDescent { learning_rate: 0.1 },
            OptimizerSpec::GradientDescentWithMomentum {
                learning_rate: 0.1,
                momentum: 0.9,
            },
            OptimizerSpec::Adam {
                learning_rate: 0.1,
                beta1: 0.9,
                beta2: 0.999,
                epsilon: 1e-8,
            },
        ];

        for spec in specs {
            let mut opt = build_optimizer(spec, 2);
            let mut params = [1.0, 1.0];
            opt.update_params(&[1.0, -1.0], &mut params).unwrap();
            assert!(params[0] < 1.0 && params[1] > 1.0);
        }
    }
}
