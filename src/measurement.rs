//! Detector background
//!
//! Adds Poisson-distributed background counts to a clean series, one draw per
//! time bin.

use rand::Rng;
use rand_distr::{Distribution, Poisson};

use crate::{DecayError, Result};

/// Measured counts: `series[k] + Poisson(rate_per_bin)` for each bin.
pub fn add_poisson_background<R: Rng + ?Sized>(
    series: &[f64],
    rate_per_bin: f64,
    rng: &mut R,
) -> Result<Vec<f64>> {
    if !rate_per_bin.is_finite() || rate_per_bin < 0.0 {
        return Err(DecayError::InvalidConfig(format!(
            "background rate must be finite and >= 0, got {rate_per_bin}"
        )));
    }
    if rate_per_bin == 0.0 {
        return Ok(series.to_vec());
    }

    let background =
        Poisson::new(rate_per_bin).map_err(|e| DecayError::Distribution(e.to_string()))?;
    Ok(series
        .iter()
        .map(|&clean| clean + background.sample(rng))
        .collect())
}
