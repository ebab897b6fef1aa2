//! raddecay - radioactive decay simulation and estimation
//!
//! Closed-form decay models for single isotopes, isotope mixtures and A→B
//! chains, fixed-step binomial-thinning Monte Carlo ensembles, and
//! log-linear estimation of the decay constant from ensemble means.

pub mod chain;
pub mod config;
pub mod engine;
pub mod ensemble;
pub mod estimation;
pub mod isotope;
pub mod measurement;
pub mod output;
pub mod units;

use thiserror::Error;

// Re-export main types
pub use chain::{
    simulate_chain_deterministic, simulate_chain_mc, ChainEnsemble, ChainParams, ChainSolution,
};
pub use config::{time_grid, EngineKind, RunConfig, SimConfig};
pub use engine::{build_engine, decay_probability, simulate_isotope, DecayEngine, IsotopeSimulation};
pub use ensemble::TrajectoryEnsemble;
pub use estimation::{fit_lambda_from_counts, mean_and_ci, mean_and_std, ConfidenceBand, DecayFit};
pub use isotope::{mixture_counts_analytical, mixture_series_analytical, DecayRate, Isotope};
pub use measurement::add_poisson_background;
pub use units::{lambda_from_half_life, DecayRateInput, Preset, TimeUnit};

#[derive(Debug, Error)]
pub enum DecayError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("unsupported engine '{0}' (expected one of: binomial, per_nucleus)")]
    UnsupportedEngine(String),
    #[error("{context} length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("sampling distribution rejected its parameters: {0}")]
    Distribution(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DecayError>;
