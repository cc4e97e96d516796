//! Module containing the exceedance models: probability that a single
//! rupture produces ground motion at or above a target intensity.

use super::imt::Imt;
use serde::{Deserialize, Serialize};
use std::f64::consts::SQRT_2;

/// Complementary standard-normal CDF.
fn phi_bar(z: f64) -> f64 {
    0.5 * libm::erfc(z / SQRT_2)
}

/// Rescales the complementary CDF value `p` into the truncated distribution
/// bounded by `p_hi` (upper tail) and `p_lo` (lower tail), clamping the
/// numerical spill just outside `[0, 1]`.
fn bounded(p: f64, p_hi: f64, p_lo: f64) -> f64 {
    ((p - p_hi) / (p_lo - p_hi)).clamp(0.0, 1.0)
}

/// The probability model used to integrate exceedance over the ground-motion
/// distribution.
///
/// All variants are stateless pure functions of `(μ, σ, n, imt, iml)` where
/// `n` is the truncation level in units of `σ`.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum ExceedanceModel {
    /// No truncation: the full normal distribution.
    TruncationOff,
    /// Truncation of the upper tail only at `μ + nσ`.
    #[default]
    TruncationUpperOnly,
    /// Symmetric truncation at `μ ± nσ`.
    TruncationLoHi,
    /// Upper-tail truncation plus the per-IMT physical clamp: exceedance is
    /// zero at or above [`Imt::max_intensity`].
    PeakClamped,
}

impl ExceedanceModel {
    /// Computes the probability that ground motion distributed as
    /// `(mean, sigma)` in natural-log units reaches or exceeds the intensity
    /// `iml`, with truncation at `truncation` standard deviations.
    ///
    /// # Panics
    ///
    /// Panics if `iml` is not positive.
    #[must_use]
    pub fn exceedance(self, mean: f64, sigma: f64, truncation: f64, imt: Imt, iml: f64) -> f64 {
        assert!(iml > 0.0);
        let z = (iml.ln() - mean) / sigma;

        match self {
            Self::TruncationOff => phi_bar(z),
            Self::TruncationUpperOnly => bounded(phi_bar(z), phi_bar(truncation), 1.0),
            Self::TruncationLoHi => {
                bounded(phi_bar(z), phi_bar(truncation), phi_bar(-truncation))
            }
            Self::PeakClamped => {
                if imt.max_intensity().is_some_and(|max| iml >= max) {
                    0.0
                } else {
                    bounded(phi_bar(z), phi_bar(truncation), 1.0)
                }
            }
        }
    }
}

/// The normalized ground-motion residual at `iml`: `ε = (μ − ln iml) / σ`.
#[must_use]
pub fn epsilon(mean: f64, sigma: f64, iml: f64) -> f64 {
    (mean - iml.ln()) / sigma
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    const N: f64 = 3.0;

    #[test]
    fn median_exceeds_half_the_time() {
        let median = 0.1_f64;
        let p = ExceedanceModel::TruncationOff.exceedance(median.ln(), 0.6, N, Imt::Pga, median);
        assert_approx_eq!(f64, p, 0.5, epsilon = 1e-15);
    }

    #[test]
    fn upper_truncation_zeroes_the_tail() {
        let mean = 0.1_f64.ln();
        let sigma = 0.6;
        let above = (mean + (N + 0.1) * sigma).exp();

        let p = ExceedanceModel::TruncationUpperOnly.exceedance(mean, sigma, N, Imt::Pga, above);
        assert_eq!(p, 0.0);

        // untruncated still sees the tail
        let p = ExceedanceModel::TruncationOff.exceedance(mean, sigma, N, Imt::Pga, above);
        assert!(p > 0.0);
    }

    #[test]
    fn two_sided_truncation_saturates_below() {
        let mean = 0.1_f64.ln();
        let sigma = 0.6;
        let below = (mean - (N + 0.1) * sigma).exp();

        let p = ExceedanceModel::TruncationLoHi.exceedance(mean, sigma, N, Imt::Pga, below);
        assert_eq!(p, 1.0);
    }

    #[test]
    fn truncated_exceedance_never_exceeds_untruncated_shape() {
        let mean = 0.05_f64.ln();
        let sigma = 0.5;

        for iml in [0.001, 0.01, 0.05, 0.2, 0.5] {
            let upper =
                ExceedanceModel::TruncationUpperOnly.exceedance(mean, sigma, N, Imt::Pga, iml);
            assert!((0.0..=1.0).contains(&upper));
        }
    }

    #[test]
    fn peak_clamp_cuts_off_physical_maximum() {
        // a distribution centered near the clamp still reports zero at it
        let mean = 2.0_f64.ln();
        let p = ExceedanceModel::PeakClamped.exceedance(mean, 0.6, N, Imt::Pga, 3.0);
        assert_eq!(p, 0.0);

        let p = ExceedanceModel::PeakClamped.exceedance(mean, 0.6, N, Imt::Pga, 2.9);
        assert!(p > 0.0);

        // PGV defines no clamp
        let p = ExceedanceModel::PeakClamped.exceedance(100.0_f64.ln(), 0.6, N, Imt::Pgv, 400.0);
        assert!(p > 0.0);
    }

    #[test]
    fn epsilon_sign_convention() {
        // iml one sigma below the median: positive epsilon
        let mean = 0.1_f64.ln();
        let sigma = 0.6;
        let iml = (mean - sigma).exp();

        assert_approx_eq!(f64, epsilon(mean, sigma, iml), 1.0, epsilon = 1e-12);
        assert!(epsilon(mean, sigma, (mean + sigma).exp()) < 0.0);
    }
}
