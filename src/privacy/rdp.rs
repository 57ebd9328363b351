//! Rényi divergence of the Poisson-subsampled Gaussian mechanism.

/// RDP at order `alpha` of one subsampled Gaussian step.
///
/// # Arguments
/// * `alpha` - The Rényi order, orders at or below 1 contribute nothing.
/// * `q` - The sampling rate, in `[0, 1]`.
/// * `sigma` - The noise multiplier, positive.
///
/// Integer orders use the exact binomial expansion. A fractional order is bounded by the value
/// at its ceiling, the divergence being non-decreasing in the order. The result is never
/// negative, rounding in the expansion is clamped away at tiny sampling rates.
pub fn subsampled_gaussian(alpha: f64, q: f64, sigma: f64) -> f64 {
    if alpha <= 1.0 || q == 0.0 {
        return 0.0;
    }

    if q == 1.0 {
        return alpha / (2.0 * sigma * sigma);
    }

    let order = alpha.ceil();
    (log_a(order as usize, q, sigma) / (order - 1.0)).max(0.0)
}

/// `log A_alpha = log Σ_j C(alpha, j) q^j (1 - q)^(alpha - j) exp(j (j - 1) / (2 sigma²))`.
fn log_a(alpha: usize, q: f64, sigma: f64) -> f64 {
    let log_q = q.ln();
    let log_1mq = (1.0 - q).ln();
    let two_sigma_sq = 2.0 * sigma * sigma;
    let alpha_f = alpha as f64;

    let mut log_sum = f64::NEG_INFINITY;
    let mut log_binom = 0.0;

    for j in 0..=alpha {
        let j_f = j as f64;
        if j > 0 {
            // C(a, j) = C(a, j - 1) * (a - j + 1) / j
            log_binom += (alpha_f - j_f + 1.0).ln() - j_f.ln();
        }

        let log_term =
            log_binom + j_f * log_q + (alpha_f - j_f) * log_1mq + j_f * (j_f - 1.0) / two_sigma_sq;
        log_sum = log_add_exp(log_sum, log_term);
    }

    log_sum
}

/// Numerically stable `log(exp(a) + exp(b))`.
fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }

    if b == f64::NEG_INFINITY {
        return a;
    }

    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_batch_is_the_plain_gaussian() {
        assert!((subsampled_gaussian(10.0, 1.0, 2.0) - 10.0 / 8.0).abs() < 1e-12);
    }

    #[test]
    fn expansion_agrees_with_plain_gaussian_near_full_sampling() {
        let exact = 4.0 / (2.0 * 1.5 * 1.5);
        let nearly = subsampled_gaussian(4.0, 1.0 - 1e-12, 1.5);
        assert!((exact - nearly).abs() < 1e-6);
    }

    #[test]
    fn subsampling_amplifies_privacy() {
        let full = subsampled_gaussian(8.0, 1.0, 1.2);
        let sub = subsampled_gaussian(8.0, 0.1, 1.2);
        assert!(sub > 0.0);
        assert!(sub < full);
    }

    #[test]
    fn order_two_closed_form() {
        // alpha = 2: log((1-q)^2 + 2q(1-q) + q^2 e^(1/sigma^2))
        let (q, sigma) = (0.3f64, 1.1f64);
        let expected =
            ((1.0 - q).powi(2) + 2.0 * q * (1.0 - q) + q * q * (1.0 / (sigma * sigma)).exp()).ln();
        assert!((subsampled_gaussian(2.0, q, sigma) - expected).abs() < 1e-12);
    }

    #[test]
    fn fractional_orders_use_the_ceiling() {
        assert_eq!(
            subsampled_gaussian(2.5, 0.2, 1.0),
            subsampled_gaussian(3.0, 0.2, 1.0)
        );
    }

    #[test]
    fn tiny_sampling_rates_never_go_negative() {
        for alpha in [1.5, 2.0, 3.0, 8.0, 32.0, 256.0] {
            for sigma in [0.5, 1.0, 5.0, 20.0, 100.0] {
                let rdp = subsampled_gaussian(alpha, 1e-8, sigma);
                assert!(rdp >= 0.0, "alpha={alpha} sigma={sigma}: {rdp}");
            }
        }
    }

    #[test]
    fn degenerate_inputs_contribute_nothing() {
        assert_eq!(subsampled_gaussian(1.0, 0.5, 1.0), 0.0);
        assert_eq!(subsampled_gaussian(5.0, 0.0, 1.0), 0.0);
    }
}
