use std::num::NonZeroUsize;

use ndarray::Array2;
use rand::{rngs::StdRng, seq::SliceRandom};

use super::Dataset;

/// Produces the fixed-size mini-batches of one partition, reshuffled every epoch.
///
/// A trailing batch smaller than `batch_size` is dropped, the privacy accounting relies on
/// every step seeing exactly `batch_size` examples.
#[derive(Debug, Clone)]
pub struct DataLoader {
    dataset: Dataset,
    batch_size: NonZeroUsize,
    order: Vec<usize>,
    rng: StdRng,
}

impl DataLoader {
    /// Creates a new `DataLoader`.
    ///
    /// # Arguments
    /// * `dataset` - The partition to iterate.
    /// * `batch_size` - The amount of examples per batch.
    /// * `rng` - Drives the per-epoch shuffle, a seeded rng makes epochs reproducible.
    pub fn new(dataset: Dataset, batch_size: NonZeroUsize, rng: StdRng) -> Self {
        let order = (0..dataset.len()).collect();

        Self {
            dataset,
            batch_size,
            order,
            rng,
        }
    }

    /// The amount of examples in the partition.
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    /// The amount of full batches an epoch yields.
    pub fn batches_per_epoch(&self) -> usize {
        self.len() / self.batch_size()
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Shuffles the partition and iterates it once in full batches.
    pub fn epoch(&mut self) -> impl Iterator<Item = (Array2<f32>, Array2<f32>)> + '_ {
        self.order.shuffle(&mut self.rng);

        let dataset = &self.dataset;
        self.order
            .chunks_exact(self.batch_size.get())
            .map(move |rows| dataset.select(rows))
    }
}
