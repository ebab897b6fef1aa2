//! Ensemble statistics and decay-constant estimation
//!
//! `mean_and_ci` reduces an ensemble to its mean curve with a Student-t
//! confidence band; `fit_lambda_from_counts` recovers λ and N0 from a mean
//! curve by ordinary least squares on `ln N(t)`.
//!
//! The fit is a plain global log-linear regression. It treats the
//! log-transformed noise as homoscedastic, which biases the estimate when the
//! tail of the curve holds only a handful of nuclei; it is not a weighted or
//! maximum-likelihood fit.

use std::f64::consts::LN_2;

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::ensemble::TrajectoryEnsemble;
use crate::{DecayError, Result};

/// Per-step ensemble mean with a symmetric confidence half-width.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceBand {
    pub mean: Vec<f64>,
    pub half_width: Vec<f64>,
}

impl ConfidenceBand {
    /// Lower edge, clamped at zero since counts cannot be negative.
    pub fn lower(&self) -> Vec<f64> {
        self.mean
            .iter()
            .zip(&self.half_width)
            .map(|(m, h)| (m - h).max(0.0))
            .collect()
    }

    pub fn upper(&self) -> Vec<f64> {
        self.mean
            .iter()
            .zip(&self.half_width)
            .map(|(m, h)| m + h)
            .collect()
    }
}

/// Mean and two-sided `1 - alpha` confidence half-width per time step,
/// `t_{1-α/2, R-1} · s / sqrt(R)` with `s` the unbiased sample std.
pub fn mean_and_ci(ensemble: &TrajectoryEnsemble, alpha: f64) -> Result<ConfidenceBand> {
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(DecayError::InvalidConfig(format!(
            "alpha must be in (0, 1), got {alpha}"
        )));
    }

    let n = ensemble.n_realizations();
    if n < 2 {
        return Err(DecayError::InsufficientData(format!(
            "confidence interval needs at least 2 realizations, got {n}"
        )));
    }

    let dof = (n - 1) as f64;
    let t_crit = StudentsT::new(0.0, 1.0, dof)
        .map_err(|e| DecayError::Distribution(e.to_string()))?
        .inverse_cdf(1.0 - alpha / 2.0);

    let mean = ensemble.mean();
    let sum_sq = squared_deviations(ensemble, &mean);
    let scale = t_crit / (n as f64).sqrt();
    let half_width = sum_sq.iter().map(|ss| scale * (ss / dof).sqrt()).collect();

    Ok(ConfidenceBand { mean, half_width })
}

/// Mean and population standard deviation (ddof = 0) per time step.
pub fn mean_and_std(ensemble: &TrajectoryEnsemble) -> Result<(Vec<f64>, Vec<f64>)> {
    let n = ensemble.n_realizations();
    if n == 0 {
        return Err(DecayError::InsufficientData(
            "ensemble has no realizations".to_string(),
        ));
    }

    let mean = ensemble.mean();
    let std = squared_deviations(ensemble, &mean)
        .into_iter()
        .map(|ss| (ss / n as f64).sqrt())
        .collect();
    Ok((mean, std))
}

fn squared_deviations(ensemble: &TrajectoryEnsemble, mean: &[f64]) -> Vec<f64> {
    let mut sum_sq = vec![0.0; ensemble.n_steps()];
    for row in ensemble.rows() {
        for ((acc, &count), &m) in sum_sq.iter_mut().zip(row).zip(mean) {
            let d = count as f64 - m;
            *acc += d * d;
        }
    }
    sum_sq
}

/// Result of the log-linear decay fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayFit {
    pub lambda: f64,
    pub n0: f64,
    pub r_squared: f64,
    pub points_used: usize,
}

impl DecayFit {
    /// `ln 2 / λ̂`, defined only for a decaying fit.
    pub fn half_life(&self) -> Option<f64> {
        (self.lambda > 0.0).then(|| LN_2 / self.lambda)
    }
}

/// Fit `ln N = ln N0 - λ t` over the points with a strictly positive count.
pub fn fit_lambda_from_counts(times: &[f64], counts: &[f64]) -> Result<DecayFit> {
    if times.len() != counts.len() {
        return Err(DecayError::LengthMismatch {
            context: "fit counts",
            expected: times.len(),
            got: counts.len(),
        });
    }

    let (xs, ys): (Vec<f64>, Vec<f64>) = times
        .iter()
        .zip(counts)
        .filter(|&(_, &c)| c > 0.0)
        .map(|(&t, &c)| (t, c.ln()))
        .unzip();

    let n = xs.len();
    if n < 2 {
        return Err(DecayError::InsufficientData(format!(
            "need at least 2 points with positive counts, got {n}"
        )));
    }

    let x_mean = xs.iter().sum::<f64>() / n as f64;
    let y_mean = ys.iter().sum::<f64>() / n as f64;
    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for (&x, &y) in xs.iter().zip(&ys) {
        let dx = x - x_mean;
        let dy = y - y_mean;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    if sxx == 0.0 {
        return Err(DecayError::InsufficientData(
            "all usable points share one time value".to_string(),
        ));
    }

    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;
    // Squared Pearson correlation; a flat ln N has no variance to explain.
    let r_squared = if syy == 0.0 {
        0.0
    } else {
        (sxy * sxy / (sxx * syy)).min(1.0)
    };

    Ok(DecayFit {
        lambda: -slope,
        n0: intercept.exp(),
        r_squared,
        points_used: n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_perfect_exponential_is_recovered() {
        let times: Vec<f64> = (0..50).map(|k| k as f64 * 0.2).collect();
        let counts: Vec<f64> = times.iter().map(|t| 8_000.0 * (-0.35 * t).exp()).collect();
        let fit = fit_lambda_from_counts(&times, &counts).unwrap();
        assert_relative_eq!(fit.lambda, 0.35, max_relative = 1e-10);
        assert_relative_eq!(fit.n0, 8_000.0, max_relative = 1e-10);
        assert_relative_eq!(fit.r_squared, 1.0, epsilon = 1e-12);
        assert_eq!(fit.points_used, 50);
        assert_relative_eq!(fit.half_life().unwrap(), LN_2 / 0.35, max_relative = 1e-10);
    }

    #[test]
    fn test_zero_counts_are_skipped() {
        let times = [0.0, 1.0, 2.0, 3.0];
        let counts = [100.0, 50.0, 0.0, 0.0];
        let fit = fit_lambda_from_counts(&times, &counts).unwrap();
        assert_eq!(fit.points_used, 2);
        assert_relative_eq!(fit.lambda, LN_2, max_relative = 1e-12);
    }

    #[test]
    fn test_insufficient_points_rejected() {
        let err = fit_lambda_from_counts(&[0.0, 1.0, 2.0], &[10.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(err, DecayError::InsufficientData(_)));
        let err = fit_lambda_from_counts(&[1.0, 1.0], &[10.0, 5.0]).unwrap_err();
        assert!(matches!(err, DecayError::InsufficientData(_)));
        let err = fit_lambda_from_counts(&[0.0, 1.0], &[10.0]).unwrap_err();
        assert!(matches!(err, DecayError::LengthMismatch { .. }));
    }

    #[test]
    fn test_growing_series_has_no_half_life() {
        let fit = fit_lambda_from_counts(&[0.0, 1.0, 2.0], &[1.0, 2.0, 4.0]).unwrap();
        assert!(fit.lambda < 0.0);
        assert!(fit.half_life().is_none());
    }

    #[test]
    fn test_ci_matches_hand_computation() {
        let ens = TrajectoryEnsemble::from_rows(vec![vec![10, 4], vec![12, 6], vec![14, 8]]).unwrap();
        let band = mean_and_ci(&ens, 0.05).unwrap();
        assert_eq!(band.mean, vec![12.0, 6.0]);
        // s = 2, R = 3, t_{0.975, 2} = 4.302652729911275
        let expected = 4.302652729911275 * 2.0 / 3.0_f64.sqrt();
        assert_relative_eq!(band.half_width[0], expected, max_relative = 1e-6);
        assert_relative_eq!(band.half_width[1], expected, max_relative = 1e-6);
        assert!(band.lower()[1] >= 0.0);
        assert_relative_eq!(band.upper()[0], 12.0 + expected, max_relative = 1e-6);
    }

    #[test]
    fn test_ci_needs_two_realizations() {
        let ens = TrajectoryEnsemble::from_rows(vec![vec![1, 2, 3]]).unwrap();
        assert!(matches!(
            mean_and_ci(&ens, 0.05),
            Err(DecayError::InsufficientData(_))
        ));
        let ens = TrajectoryEnsemble::from_rows(vec![vec![1], vec![2]]).unwrap();
        assert!(matches!(
            mean_and_ci(&ens, 1.5),
            Err(DecayError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_constant_ensemble_has_zero_width() {
        let ens = TrajectoryEnsemble::from_rows(vec![vec![5, 5]; 4]).unwrap();
        let band = mean_and_ci(&ens, 0.1).unwrap();
        assert_eq!(band.half_width, vec![0.0, 0.0]);
    }

    #[test]
    fn test_population_std() {
        let ens = TrajectoryEnsemble::from_rows(vec![vec![2], vec![4]]).unwrap();
        let (mean, std) = mean_and_std(&ens).unwrap();
        assert_eq!(mean, vec![3.0]);
        assert_eq!(std, vec![1.0]);
    }
}
