//! Simulation configuration
//!
//! Time grid, ensemble size and engine selection shared by the isotope and
//! chain simulators.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::isotope::{DecayRate, Isotope};
use crate::units::DecayRateInput;
use crate::{DecayError, Result};

/// Slack applied when counting grid points so that a `t_max` that is a
/// multiple of `dt` up to rounding ends the grid exactly, without an extra step.
const GRID_EPS: f64 = 1e-9;

/// Stochastic engine selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EngineKind {
    /// Lock-step binomial thinning across all realizations.
    #[default]
    Binomial,
    /// Reference path: one uniform draw per live nucleus.
    PerNucleus,
}

impl EngineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Binomial => "binomial",
            Self::PerNucleus => "per_nucleus",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = DecayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "binomial" => Ok(Self::Binomial),
            "per_nucleus" => Ok(Self::PerNucleus),
            other => Err(DecayError::UnsupportedEngine(other.to_string())),
        }
    }
}

impl TryFrom<String> for EngineKind {
    type Error = DecayError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<EngineKind> for String {
    fn from(kind: EngineKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Discretization and ensemble settings for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Time step
    pub dt: f64,
    /// Horizon
    pub t_max: f64,
    /// Number of independent trajectories
    pub n_realizations: usize,
    pub engine: EngineKind,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dt: 0.05,
            t_max: 10.0,
            n_realizations: 30,
            engine: EngineKind::Binomial,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<()> {
        validate_grid(self.dt, self.t_max)?;

        if self.n_realizations == 0 {
            return Err(DecayError::InvalidConfig(
                "n_realizations must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn n_points(&self) -> usize {
        grid_len(self.dt, self.t_max)
    }

    pub fn time_grid(&self) -> Vec<f64> {
        build_grid(self.dt, self.n_points())
    }
}

/// Complete single-isotope run: what decays, how it is sampled, and how the
/// ensemble is summarized. Loaded from JSON, then overridden from the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub name: String,
    pub n0: u64,
    pub rate: DecayRateInput,
    pub sim: SimConfig,
    pub seed: u64,
    /// Two-sided significance level of the confidence band
    pub alpha: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            name: "isotope".to_string(),
            n0: 10_000,
            rate: DecayRateInput {
                half_life: Some(5.0),
                ..DecayRateInput::default()
            },
            sim: SimConfig::default(),
            seed: 0,
            alpha: 0.05,
        }
    }
}

impl RunConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.sim.validate()?;

        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(DecayError::InvalidConfig(format!(
                "alpha must be in (0, 1), got {}",
                self.alpha
            )));
        }

        self.isotope().map(|_| ())
    }

    /// [`validate`](Self::validate) plus the ensemble size a confidence band
    /// needs. Checked before any output is written.
    pub fn validate_for_ensemble(&self) -> Result<()> {
        self.validate()?;

        if self.sim.n_realizations < 2 {
            return Err(DecayError::InvalidConfig(format!(
                "a Monte Carlo run needs at least 2 realizations for its confidence band, got {}",
                self.sim.n_realizations
            )));
        }

        Ok(())
    }

    pub fn isotope(&self) -> Result<Isotope> {
        Isotope::new(
            self.name.clone(),
            self.n0,
            DecayRate::Lambda(self.rate.resolve()?),
        )
    }
}

/// Time grid `0, dt, 2dt, ...` covering `[0, t_max]`. The last point is the
/// first multiple of `dt` at or beyond `t_max`, so it never exceeds `t_max + dt`.
pub fn time_grid(dt: f64, t_max: f64) -> Result<Vec<f64>> {
    validate_grid(dt, t_max)?;
    Ok(build_grid(dt, grid_len(dt, t_max)))
}

pub(crate) fn validate_grid(dt: f64, t_max: f64) -> Result<()> {
    if !dt.is_finite() || dt <= 0.0 {
        return Err(DecayError::InvalidConfig(format!(
            "dt must be finite and > 0, got {dt}"
        )));
    }

    if !t_max.is_finite() || t_max < 0.0 {
        return Err(DecayError::InvalidConfig(format!(
            "t_max must be finite and >= 0, got {t_max}"
        )));
    }

    Ok(())
}

fn grid_len(dt: f64, t_max: f64) -> usize {
    (t_max / dt - GRID_EPS).ceil().max(0.0) as usize + 1
}

fn build_grid(dt: f64, n_points: usize) -> Vec<f64> {
    (0..n_points).map(|k| k as f64 * dt).collect()
}
