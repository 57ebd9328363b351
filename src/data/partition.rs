use std::ops::Range;

use super::Dataset;
use crate::{FedErr, Result};

/// Splits `total` samples among `num_workers` and returns the shard for `worker_id`.
///
/// Properties:
/// - Ranges are contiguous, disjoint and cover `[0..total)`.
/// - Sizes differ by at most 1 (balanced partition).
pub fn shard_range(total: usize, worker_id: usize, num_workers: usize) -> Range<usize> {
    let base = total / num_workers;
    let rem = total % num_workers;

    let start = worker_id * base + worker_id.min(rem);
    let extra = if worker_id < rem { 1 } else { 0 };
    let end = start + base + extra;

    start..end
}

/// Splits a dataset into `num_workers` disjoint, balanced partitions.
///
/// # Returns
/// An error if there are no workers or less examples than workers.
pub fn partition(dataset: &Dataset, num_workers: usize) -> Result<Vec<Dataset>> {
    if num_workers == 0 {
        return Err(FedErr::InvalidConfig("there must be at least one worker".into()));
    }

    if dataset.len() < num_workers {
        return Err(FedErr::InvalidConfig(format!(
            "can't split {} examples among {num_workers} workers",
            dataset.len()
        )));
    }

    let partitions = (0..num_workers)
        .map(|id| {
            let range = shard_range(dataset.len(), id, num_workers);
            dataset.slice_rows(range.start, range.end)
        })
        .collect();

    Ok(partitions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_range_balanced() {
        // total 10, workers 3 => sizes 4,3,3
        assert_eq!(shard_range(10, 0, 3), 0..4);
        assert_eq!(shard_range(10, 1, 3), 4..7);
        assert_eq!(shard_range(10, 2, 3), 7..10);
    }

    #[test]
    fn partitions_are_disjoint_and_cover_the_dataset() {
        let ds = Dataset::new((0..20).map(|i| i as f32).collect(), 1, 1).unwrap();
        let parts = partition(&ds, 3).unwrap();

        let mut seen: Vec<f32> = parts.iter().flat_map(|p| p.x().column(0).to_vec()).collect();
        seen.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let expected: Vec<f32> = (0..10).map(|i| (2 * i) as f32).collect();
        assert_eq!(seen, expected);
        assert_eq!(
            parts.iter().map(Dataset::len).collect::<Vec<_>>(),
            [4, 3, 3]
        );
    }

    #[test]
    fn too_many_workers() {
        let ds = Dataset::new(vec![0.0, 1.0], 1, 1).unwrap();
        assert!(matches!(partition(&ds, 2), Err(FedErr::InvalidConfig(_))));
    }
}
