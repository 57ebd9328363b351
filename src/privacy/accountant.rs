use serde::Serialize;

use super::rdp;
use crate::{FedErr, Result};

/// The tightest `(epsilon, delta)` guarantee the accountant can currently prove.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrivacySpent {
    pub epsilon: f64,
    pub delta: f64,
    /// The order that achieved `epsilon`, `None` before the first step.
    pub best_alpha: Option<f64>,
}

/// Rényi differential privacy accountant.
///
/// Keeps, for every candidate order, the divergence accumulated over the recorded steps.
/// Composition adds divergences, so every total only grows.
#[derive(Debug, Clone)]
pub struct RdpAccountant {
    orders: Vec<f64>,
    rdp: Vec<f64>,
    steps: usize,
}

impl RdpAccountant {
    /// Creates an accountant over the given candidate orders.
    ///
    /// # Arguments
    /// * `orders` - The candidate orders, finite and at least 1. Duplicates are merged.
    ///
    /// # Returns
    /// An `InvalidConfig` error if there are no orders or any of them is invalid.
    pub fn new(orders: &[f64]) -> Result<Self> {
        if orders.is_empty() {
            return Err(FedErr::InvalidConfig(
                "at least one candidate order is required".into(),
            ));
        }

        if let Some(bad) = orders.iter().find(|a| !a.is_finite() || **a < 1.0) {
            return Err(FedErr::InvalidConfig(format!(
                "candidate orders must be finite and at least 1, got {bad}"
            )));
        }

        Ok(Self::from_orders(orders.to_vec()))
    }

    /// Creates an accountant over `default_orders`.
    pub fn with_default_orders() -> Self {
        Self::from_orders(default_orders())
    }

    fn from_orders(mut orders: Vec<f64>) -> Self {
        orders.sort_by(f64::total_cmp);
        orders.dedup();

        Self {
            rdp: vec![0.0; orders.len()],
            orders,
            steps: 0,
        }
    }

    /// The candidate orders, sorted.
    pub fn orders(&self) -> &[f64] {
        &self.orders
    }

    /// The amount of recorded steps.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// The divergence accumulated at `order`, if it's one of the candidates.
    pub fn divergence(&self, order: f64) -> Option<f64> {
        let idx = self.orders.iter().position(|&a| a == order)?;
        Some(self.rdp[idx])
    }

    /// Records one Poisson-subsampled Gaussian step for every candidate order.
    ///
    /// # Arguments
    /// * `sampling_rate` - The probability of an example being in the batch.
    /// * `noise_multiplier` - The ratio between the noise's standard deviation and the
    ///   clipping norm.
    pub fn record_step(&mut self, sampling_rate: f64, noise_multiplier: f64) -> Result<()> {
        self.record_steps(sampling_rate, noise_multiplier, 1)
    }

    /// Records `n` identical steps.
    pub fn record_steps(
        &mut self,
        sampling_rate: f64,
        noise_multiplier: f64,
        n: usize,
    ) -> Result<()> {
        if !(0.0..=1.0).contains(&sampling_rate) {
            return Err(FedErr::InvalidConfig(format!(
                "the sampling rate must be in [0, 1], got {sampling_rate}"
            )));
        }

        if !noise_multiplier.is_finite() || noise_multiplier <= 0.0 {
            return Err(FedErr::InvalidConfig(format!(
                "the noise multiplier must be positive, got {noise_multiplier}"
            )));
        }

        for (total, &alpha) in self.rdp.iter_mut().zip(&self.orders) {
            let step = rdp::subsampled_gaussian(alpha, sampling_rate, noise_multiplier);
            *total += n as f64 * step;
        }

        self.steps += n;
        Ok(())
    }

    /// Converts the accumulated divergences into an `(epsilon, delta)` guarantee.
    ///
    /// `epsilon(alpha) = D(alpha) + ln(1 / delta) / (alpha - 1)` for every order above 1 and
    /// the smallest one is returned. This never mutates the accountant.
    ///
    /// Before the first step the epsilon is 0 and there's no best order. If every candidate
    /// order is 1 no finite bound exists and the epsilon is infinite.
    ///
    /// # Returns
    /// An `InvalidConfig` error if `delta` isn't in `(0, 1)`.
    pub fn privacy_spent(&self, delta: f64) -> Result<PrivacySpent> {
        if !(delta > 0.0 && delta < 1.0) {
            return Err(FedErr::InvalidConfig(format!(
                "delta must be in (0, 1), got {delta}"
            )));
        }

        if self.steps == 0 {
            return Ok(PrivacySpent {
                epsilon: 0.0,
                delta,
                best_alpha: None,
            });
        }

        let log_delta_inv = (1.0 / delta).ln();
        let best = self
            .orders
            .iter()
            .zip(&self.rdp)
            .filter(|(&alpha, _)| alpha > 1.0)
            .map(|(&alpha, &rdp)| (rdp + log_delta_inv / (alpha - 1.0), alpha))
            .min_by(|a, b| a.0.total_cmp(&b.0));

        let spent = match best {
            Some((epsilon, alpha)) => PrivacySpent {
                epsilon,
                delta,
                best_alpha: Some(alpha),
            },
            None => PrivacySpent {
                epsilon: f64::INFINITY,
                delta,
                best_alpha: None,
            },
        };

        Ok(spent)
    }
}

/// A spread of orders that fits most noise multipliers and sampling rates:
/// 50 points in `[1.01, 8]`, the integers in `[8, 64)` and 10 points in `[65, 512]`.
pub fn default_orders() -> Vec<f64> {
    let mut orders = linspace(1.01, 8.0, 50);
    orders.extend((8..64).map(|a| a as f64));
    orders.extend(linspace(65.0, 512.0, 10).into_iter().map(f64::round));
    orders
}

fn linspace(start: f64, end: f64, num: usize) -> Vec<f64> {
    let step = (end - start) / (num as f64 - 1.0);
    (0..num).map(|i| start + step * i as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epsilon_is_zero_before_any_step() {
        let acc = RdpAccountant::new(&[2.0, 10.0]).unwrap();
        let spent = acc.privacy_spent(1e-5).unwrap();

        assert_eq!(spent.epsilon, 0.0);
        assert_eq!(spent.best_alpha, None);
    }

    #[test]
    fn more_steps_spend_more() {
        let mut acc = RdpAccountant::new(&[10.0]).unwrap();
        acc.record_steps(0.1, 1.2, 5).unwrap();
        let after_5 = acc.privacy_spent(1e-5).unwrap();
        acc.record_steps(0.1, 1.2, 5).unwrap();
        let after_10 = acc.privacy_spent(1e-5).unwrap();

        assert_eq!(acc.steps(), 10);
        assert!(after_10.epsilon > after_5.epsilon);
        assert_eq!(after_10.best_alpha, Some(10.0));
    }

    #[test]
    fn epsilon_never_decreases() {
        let mut acc = RdpAccountant::with_default_orders();
        let mut last = 0.0;
        for _ in 0..50 {
            acc.record_step(0.02, 1.1).unwrap();
            let eps = acc.privacy_spent(1e-6).unwrap().epsilon;
            assert!(eps >= last);
            last = eps;
        }
    }

    #[test]
    fn epsilon_never_decreases_at_tiny_sampling_rates() {
        let mut acc = RdpAccountant::new(&[2.0]).unwrap();
        acc.record_step(1e-8, 20.0).unwrap();
        let first = acc.privacy_spent(1e-5).unwrap().epsilon;

        acc.record_steps(1e-8, 20.0, 1000).unwrap();
        let later = acc.privacy_spent(1e-5).unwrap().epsilon;

        assert!(acc.divergence(2.0).unwrap() >= 0.0);
        assert!(later >= first);
    }

    #[test]
    fn record_steps_matches_repeated_record_step() {
        let mut a = RdpAccountant::new(&[2.0, 4.5, 32.0]).unwrap();
        let mut b = a.clone();

        for _ in 0..7 {
            a.record_step(0.05, 0.9).unwrap();
        }
        b.record_steps(0.05, 0.9, 7).unwrap();

        let ea = a.privacy_spent(1e-5).unwrap().epsilon;
        let eb = b.privacy_spent(1e-5).unwrap().epsilon;
        assert!((ea - eb).abs() < 1e-9);
    }

    #[test]
    fn best_order_is_the_minimizer() {
        let mut acc = RdpAccountant::new(&[1.5, 4.0, 16.0, 64.0]).unwrap();
        acc.record_steps(0.01, 1.0, 100).unwrap();
        let spent = acc.privacy_spent(1e-5).unwrap();

        let log_delta_inv = (1e5f64).ln();
        for &alpha in acc.orders() {
            let eps = acc.divergence(alpha).unwrap() + log_delta_inv / (alpha - 1.0);
            assert!(spent.epsilon <= eps + 1e-12);
        }
    }

    #[test]
    fn privacy_spent_is_read_only() {
        let mut acc = RdpAccountant::new(&[8.0]).unwrap();
        acc.record_step(0.1, 1.0).unwrap();

        let first = acc.privacy_spent(1e-5).unwrap();
        let second = acc.privacy_spent(1e-5).unwrap();
        assert_eq!(first, second);
        assert_eq!(acc.steps(), 1);
    }

    #[test]
    fn only_order_one_gives_no_bound() {
        let mut acc = RdpAccountant::new(&[1.0]).unwrap();
        acc.record_step(0.1, 1.0).unwrap();
        let spent = acc.privacy_spent(1e-5).unwrap();

        assert!(spent.epsilon.is_infinite());
        assert_eq!(spent.best_alpha, None);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        assert!(RdpAccountant::new(&[]).is_err());
        assert!(RdpAccountant::new(&[0.5]).is_err());
        assert!(RdpAccountant::new(&[f64::NAN]).is_err());

        let mut acc = RdpAccountant::new(&[2.0]).unwrap();
        assert!(acc.record_step(1.5, 1.0).is_err());
        assert!(acc.record_step(0.1, 0.0).is_err());
        assert!(acc.privacy_spent(0.0).is_err());
        assert!(acc.privacy_spent(1.0).is_err());
        assert_eq!(acc.steps(), 0);
    }

    #[test]
    fn orders_are_sorted_and_deduplicated() {
        let acc = RdpAccountant::new(&[8.0, 2.0, 8.0]).unwrap();
        assert_eq!(acc.orders(), &[2.0, 8.0]);
    }

    #[test]
    fn default_orders_cover_large_alphas() {
        let orders = default_orders();
        assert_eq!(orders.len(), 50 + 56 + 10);
        assert!((orders[0] - 1.01).abs() < 1e-12);
        assert_eq!(*orders.last().unwrap(), 512.0);
    }
}
