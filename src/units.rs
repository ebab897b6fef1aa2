//! Time units and isotope presets
//!
//! Converts half-lives between units and resolves the decay constant from
//! either λ or a half-life, falling back to a named preset.

use std::f64::consts::LN_2;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::isotope::DecayRate;
use crate::{DecayError, Result};

/// Time unit used for half-lives and simulation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    S,
    Min,
    H,
    D,
    Y,
}

impl TimeUnit {
    pub const ALL: [TimeUnit; 5] = [Self::S, Self::Min, Self::H, Self::D, Self::Y];

    /// Length of one unit in seconds (Julian year).
    pub fn seconds(self) -> f64 {
        match self {
            Self::S => 1.0,
            Self::Min => 60.0,
            Self::H => 3_600.0,
            Self::D => 86_400.0,
            Self::Y => 365.25 * 86_400.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::S => "s",
            Self::Min => "min",
            Self::H => "h",
            Self::D => "d",
            Self::Y => "y",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeUnit {
    type Err = DecayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|unit| unit.as_str() == s)
            .ok_or_else(|| DecayError::InvalidConfig(format!("unknown time unit: {s}")))
    }
}

/// Well-known isotopes with tabulated half-lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Tc99m,
    I131,
    Cs137,
    Co60,
}

impl Preset {
    pub const ALL: [Preset; 4] = [Self::Tc99m, Self::I131, Self::Cs137, Self::Co60];

    /// Tabulated half-life and the unit it is quoted in.
    pub fn half_life(self) -> (f64, TimeUnit) {
        match self {
            Self::Tc99m => (6.01, TimeUnit::H),
            Self::I131 => (8.02, TimeUnit::D),
            Self::Cs137 => (30.05, TimeUnit::Y),
            Self::Co60 => (5.27, TimeUnit::Y),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tc99m => "tc99m",
            Self::I131 => "i131",
            Self::Cs137 => "cs137",
            Self::Co60 => "co60",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = DecayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.as_str() == s)
            .ok_or_else(|| DecayError::InvalidConfig(format!("unknown isotope preset: {s}")))
    }
}

/// Decay constant in `1/out_unit` for a half-life quoted in `unit`.
pub fn lambda_from_half_life(half_life: f64, unit: TimeUnit, out_unit: TimeUnit) -> Result<f64> {
    if !half_life.is_finite() || half_life <= 0.0 {
        return Err(DecayError::InvalidConfig(format!(
            "half_life must be finite and > 0, got {half_life}"
        )));
    }
    let seconds = half_life * unit.seconds();
    Ok(LN_2 / seconds * out_unit.seconds())
}

/// User-facing rate inputs. `lambda` and `half_life` are mutually
/// exclusive; `preset` is used only when neither is given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayRateInput {
    pub lambda: Option<f64>,
    pub half_life: Option<f64>,
    /// Unit of `half_life`, and the time unit of the simulation when a preset
    /// is used. Defaults to hours.
    pub unit: Option<TimeUnit>,
    pub preset: Option<Preset>,
}

impl DecayRateInput {
    /// Decay constant per simulation time unit.
    pub fn resolve(&self) -> Result<f64> {
        if self.lambda.is_some() || self.half_life.is_some() {
            return match DecayRate::from_options(self.half_life, self.lambda)? {
                DecayRate::HalfLife(half_life) => {
                    let unit = self.unit.unwrap_or(TimeUnit::H);
                    lambda_from_half_life(half_life, unit, unit)
                }
                rate @ DecayRate::Lambda(_) => rate.lambda(),
            };
        }

        match self.preset {
            Some(preset) => {
                let (half_life, preset_unit) = preset.half_life();
                let out_unit = self.unit.unwrap_or(preset_unit);
                lambda_from_half_life(half_life, preset_unit, out_unit)
            }
            None => Err(DecayError::InvalidConfig(
                "provide lambda, half_life (+ unit) or an isotope preset".to_string(),
            )),
        }
    }
}
