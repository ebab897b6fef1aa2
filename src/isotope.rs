//! Isotope model
//!
//! A single decaying species with its closed-form solution
//! `N(t) = N0 exp(-λ t)`, plus the analytical mixture evaluator.

use std::f64::consts::LN_2;

use serde::Serialize;

use crate::{DecayError, Result};

/// How the decay rate of an isotope is specified.
///
/// Exactly one of half-life or decay constant is allowed; a config record
/// carrying both (or neither) is rejected by [`DecayRate::from_options`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecayRate {
    HalfLife(f64),
    Lambda(f64),
}

impl DecayRate {
    /// Build from the optional pair found in configuration files.
    pub fn from_options(half_life: Option<f64>, lambda: Option<f64>) -> Result<Self> {
        match (half_life, lambda) {
            (Some(half_life), None) => Ok(Self::HalfLife(half_life)),
            (None, Some(lambda)) => Ok(Self::Lambda(lambda)),
            (Some(_), Some(_)) => Err(DecayError::InvalidConfig(
                "provide exactly one of half_life or lambda, not both".to_string(),
            )),
            (None, None) => Err(DecayError::InvalidConfig(
                "provide exactly one of half_life or lambda".to_string(),
            )),
        }
    }

    /// Decay constant λ, validated to be finite and strictly positive.
    pub fn lambda(self) -> Result<f64> {
        let (value, what) = match self {
            Self::HalfLife(h) => (h, "half_life"),
            Self::Lambda(l) => (l, "lambda"),
        };
        if !value.is_finite() || value <= 0.0 {
            return Err(DecayError::InvalidConfig(format!(
                "{what} must be finite and > 0, got {value}"
            )));
        }
        Ok(match self {
            Self::HalfLife(h) => LN_2 / h,
            Self::Lambda(l) => l,
        })
    }
}

/// A decaying species: name, initial population and decay constant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Isotope {
    name: String,
    n0: u64,
    lambda: f64,
}

impl Isotope {
    pub fn new(name: impl Into<String>, n0: u64, rate: DecayRate) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            n0,
            lambda: rate.lambda()?,
        })
    }

    pub fn from_half_life(name: impl Into<String>, n0: u64, half_life: f64) -> Result<Self> {
        Self::new(name, n0, DecayRate::HalfLife(half_life))
    }

    pub fn from_lambda(name: impl Into<String>, n0: u64, lambda: f64) -> Result<Self> {
        Self::new(name, n0, DecayRate::Lambda(lambda))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn n0(&self) -> u64 {
        self.n0
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn half_life(&self) -> f64 {
        LN_2 / self.lambda
    }

    /// Expected population at time `t`. Negative `t` extrapolates backwards.
    pub fn n_analytical(&self, t: f64) -> f64 {
        self.n0 as f64 * (-self.lambda * t).exp()
    }

    /// Activity `λ N(t)` in decays per unit time.
    pub fn activity(&self, t: f64) -> f64 {
        self.lambda * self.n_analytical(t)
    }

    pub fn n_analytical_series(&self, times: &[f64]) -> Vec<f64> {
        times.iter().map(|&t| self.n_analytical(t)).collect()
    }

    pub fn activity_series(&self, times: &[f64]) -> Vec<f64> {
        times.iter().map(|&t| self.activity(t)).collect()
    }
}

/// Total population and total activity of a mixture at time `t`.
pub fn mixture_counts_analytical(isotopes: &[Isotope], t: f64) -> (f64, f64) {
    isotopes.iter().fold((0.0, 0.0), |(n, a), iso| {
        (n + iso.n_analytical(t), a + iso.activity(t))
    })
}

/// Mixture population and activity evaluated over a time grid.
pub fn mixture_series_analytical(isotopes: &[Isotope], times: &[f64]) -> (Vec<f64>, Vec<f64>) {
    times
        .iter()
        .map(|&t| mixture_counts_analytical(isotopes, t))
        .unzip()
}
