use serde::{Deserialize, Serialize};

use crate::{arch::ParamSet, FedErr, Result};

/// How much each replica contributes to the aggregated model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// Every replica weighs the same, the plain arithmetic mean.
    #[default]
    Uniform,
    /// Replicas weigh proportionally to the size of their partition.
    BySamples,
}

/// The state a replica hands back at the end of a round.
#[derive(Debug, Clone)]
pub struct LocalUpdate {
    pub worker_id: String,
    pub params: ParamSet,
    pub num_samples: usize,
}

/// Merges the replicas' parameters into the global model.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator {
    weighting: Weighting,
}

impl Aggregator {
    pub fn new(weighting: Weighting) -> Self {
        Self { weighting }
    }

    pub fn weighting(&self) -> Weighting {
        self.weighting
    }

    /// Overwrites `global` with the (weighted) element-wise mean of the updates.
    ///
    /// # Arguments
    /// * `global` - The global model, written in place.
    /// * `updates` - One update per replica.
    ///
    /// # Returns
    /// An error if there are no updates or any layout differs from the global one, in which
    /// case `global` is left untouched.
    pub fn aggregate(&self, global: &mut ParamSet, updates: &[LocalUpdate]) -> Result<()> {
        if updates.is_empty() {
            return Err(FedErr::InvalidConfig(
                "there's nothing to aggregate without updates".into(),
            ));
        }

        for update in updates {
            global.layout().check_compatible(update.params.layout())?;
        }

        let weights = self.weights(updates)?;
        let mut acc = vec![0.0f64; global.len()];

        for (update, w) in updates.iter().zip(weights) {
            for (a, &p) in acc.iter_mut().zip(update.params.as_slice()) {
                *a += w * p as f64;
            }
        }

        for (g, a) in global.as_mut_slice().iter_mut().zip(acc) {
            *g = a as f32;
        }

        Ok(())
    }

    fn weights(&self, updates: &[LocalUpdate]) -> Result<Vec<f64>> {
        match self.weighting {
            Weighting::Uniform => {
                let w = 1.0 / updates.len() as f64;
                Ok(vec![w; updates.len()])
            }
            Weighting::BySamples => {
                let total: usize = updates.iter().map(|u| u.num_samples).sum();
                if total == 0 {
                    return Err(FedErr::InvalidConfig(
                        "can't weigh by samples when no replica holds any".into(),
                    ));
                }

                Ok(updates
                    .iter()
                    .map(|u| u.num_samples as f64 / total as f64)
                    .collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{ParamLayout, TensorSpec};

    fn layout() -> ParamLayout {
        ParamLayout::new([TensorSpec::new("w", &[2]), TensorSpec::new("b", &[1])])
    }

    fn update(id: &str, values: [f32; 3], num_samples: usize) -> LocalUpdate {
        LocalUpdate {
            worker_id: id.into(),
            params: ParamSet::from_vec(layout(), values.to_vec()).unwrap(),
            num_samples,
        }
    }

    #[test]
    fn uniform_is_the_arithmetic_mean() {
        let mut global = ParamSet::zeros(layout());
        let updates = [update("a", [1.0, 2.0, 3.0], 10), update("b", [3.0, 6.0, -3.0], 30)];

        Aggregator::default().aggregate(&mut global, &updates).unwrap();
        assert_eq!(global.as_slice(), &[2.0, 4.0, 0.0]);
    }

    #[test]
    fn by_samples_weighs_larger_partitions_more() {
        let mut global = ParamSet::zeros(layout());
        let updates = [update("a", [0.0, 0.0, 0.0], 1), update("b", [4.0, 8.0, 4.0], 3)];

        Aggregator::new(Weighting::BySamples)
            .aggregate(&mut global, &updates)
            .unwrap();
        assert_eq!(global.as_slice(), &[3.0, 6.0, 3.0]);
    }

    #[test]
    fn no_updates_is_an_error() {
        let mut global = ParamSet::zeros(layout());
        let err = Aggregator::default().aggregate(&mut global, &[]).unwrap_err();
        assert!(matches!(err, FedErr::InvalidConfig(_)));
    }

    #[test]
    fn mismatched_layouts_leave_the_global_untouched() {
        let mut global = ParamSet::from_vec(layout(), vec![7.0; 3]).unwrap();
        let other = LocalUpdate {
            worker_id: "c".into(),
            params: ParamSet::zeros(ParamLayout::new([TensorSpec::new("w", &[3])])),
            num_samples: 1,
        };
        let updates = [update("a", [1.0; 3], 1), other];

        assert!(Aggregator::default().aggregate(&mut global, &updates).is_err());
        assert_eq!(global.as_slice(), &[7.0; 3]);
    }
}
