use log::{debug, info};

use super::Participant;
use crate::{
    arch::{loss::LossFn, Model, ParamSet},
    data::DataLoader,
    optimization::{DpOptimizer, Optimizer},
    privacy::PrivacySpent,
    FedErr, Result,
};

/// A worker holding one local model, one partition of the data and one private optimizer.
pub struct WorkerReplica<M, O, L> {
    id: String,
    model: M,
    loader: DataLoader,
    loss_fn: L,
    optimizer: DpOptimizer<O>,
    epochs: usize,
}

impl<M, O, L> WorkerReplica<M, O, L>
where
    M: Model,
    O: Optimizer + Send,
    L: LossFn,
{
    /// Creates a new `WorkerReplica`.
    ///
    /// # Arguments
    /// * `id` - The worker's identifier.
    /// * `model` - The local model.
    /// * `loader` - Iterates the worker's partition.
    /// * `loss_fn` - The loss function.
    /// * `optimizer` - The private optimizer, its accountant belongs to this worker alone.
    ///
    /// # Returns
    /// An `InvalidConfig` error if the optimizer's batch or sample size don't describe the
    /// loader.
    pub fn new(
        id: impl Into<String>,
        model: M,
        loader: DataLoader,
        loss_fn: L,
        optimizer: DpOptimizer<O>,
    ) -> Result<Self> {
        let id = id.into();
        let config = optimizer.config();

        if config.batch_size != loader.batch_size() {
            return Err(FedErr::InvalidConfig(format!(
                "worker {id}: the optimizer expects batches of {} but the loader yields {}",
                config.batch_size,
                loader.batch_size()
            )));
        }

        if config.sample_size != loader.len() {
            return Err(FedErr::InvalidConfig(format!(
                "worker {id}: the optimizer accounts for {} examples but the partition has {}",
                config.sample_size,
                loader.len()
            )));
        }

        Ok(Self {
            id,
            model,
            loader,
            loss_fn,
            optimizer,
            epochs: 0,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn optimizer(&self) -> &DpOptimizer<O> {
        &self.optimizer
    }

    /// The amount of epochs trained so far.
    pub fn epochs(&self) -> usize {
        self.epochs
    }
}

impl<M, O, L> Participant for WorkerReplica<M, O, L>
where
    M: Model,
    O: Optimizer + Send,
    L: LossFn,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn num_samples(&self) -> usize {
        self.loader.len()
    }

    fn params(&self) -> &ParamSet {
        self.model.params()
    }

    fn receive(&mut self, global: &ParamSet) -> Result<()> {
        self.model.params_mut().assign(global)
    }

    fn train_one_epoch(&mut self) -> Result<f32> {
        let Self {
            id,
            model,
            loader,
            loss_fn,
            optimizer,
            ..
        } = self;

        let mut total = 0.0;
        let mut batches = 0;
        let mut clipped = 0;

        for (x, y) in loader.epoch() {
            let (loss, mut grads) = model.per_example_grads(x.view(), y.view(), &*loss_fn)?;
            let stats = optimizer.step(model.params_mut().as_mut_slice(), &mut grads)?;

            debug!(worker_id = id.as_str(), batch = batches, loss = loss; "batch trained");
            total += loss;
            clipped += stats.clipped;
            batches += 1;
        }

        if batches == 0 {
            return Err(FedErr::Data(format!(
                "worker {id} has fewer examples than a single batch"
            )));
        }

        self.epochs += 1;
        let mean_loss = total / batches as f32;

        info!(
            worker_id = self.id.as_str(),
            epoch = self.epochs,
            mean_loss = mean_loss,
            clipped = clipped;
            "local epoch finished"
        );

        Ok(mean_loss)
    }

    fn privacy_spent(&self, delta: f64) -> Result<PrivacySpent> {
        self.optimizer.privacy_spent(delta)
    }
}
