//! Two-stage decay chain A → B → (stable)
//!
//! `dNA/dt = -λA NA`, `dNB/dt = λA NA - λB NB`. The deterministic solution is
//! the Bateman form; the stochastic one thins both species per step with
//! independent binomial draws.

use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{time_grid, validate_grid};
use crate::engine::{binomial_decays, decay_probability, warn_if_coarse};
use crate::ensemble::TrajectoryEnsemble;
use crate::{DecayError, Result};

/// Rates closer than this use the equal-rate limit `λ N0 t exp(-λ t)`.
pub const DEGENERATE_RATE_TOL: f64 = 1e-12;

/// Validated chain parameters. Deserialization goes through
/// [`ChainParams::new`], so a config file cannot bypass the rate checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawChainParams")]
pub struct ChainParams {
    n0_a: u64,
    lambda_a: f64,
    lambda_b: f64,
}

#[derive(Deserialize)]
struct RawChainParams {
    n0_a: u64,
    lambda_a: f64,
    lambda_b: f64,
}

impl TryFrom<RawChainParams> for ChainParams {
    type Error = DecayError;

    fn try_from(raw: RawChainParams) -> Result<Self> {
        Self::new(raw.n0_a, raw.lambda_a, raw.lambda_b)
    }
}

impl ChainParams {
    pub fn new(n0_a: u64, lambda_a: f64, lambda_b: f64) -> Result<Self> {
        for (name, value) in [("lambda_a", lambda_a), ("lambda_b", lambda_b)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(DecayError::InvalidConfig(format!(
                    "{name} must be finite and > 0, got {value}"
                )));
            }
        }
        Ok(Self {
            n0_a,
            lambda_a,
            lambda_b,
        })
    }

    pub fn n0_a(&self) -> u64 {
        self.n0_a
    }

    pub fn lambda_a(&self) -> f64 {
        self.lambda_a
    }

    pub fn lambda_b(&self) -> f64 {
        self.lambda_b
    }

    pub fn is_degenerate(&self) -> bool {
        (self.lambda_a - self.lambda_b).abs() < DEGENERATE_RATE_TOL
    }

    pub fn n_a(&self, t: f64) -> f64 {
        self.n0_a as f64 * (-self.lambda_a * t).exp()
    }

    pub fn n_b(&self, t: f64) -> f64 {
        let n0 = self.n0_a as f64;
        let (la, lb) = (self.lambda_a, self.lambda_b);
        if self.is_degenerate() {
            la * n0 * t * (-la * t).exp()
        } else {
            la * n0 / (lb - la) * ((-la * t).exp() - (-lb * t).exp())
        }
    }
}

/// Closed-form chain populations over a time grid. `n_c` is the stable end
/// product, `N0A - NA - NB`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSolution {
    pub times: Vec<f64>,
    pub n_a: Vec<f64>,
    pub n_b: Vec<f64>,
    pub n_c: Vec<f64>,
}

pub fn simulate_chain_deterministic(
    params: &ChainParams,
    dt: f64,
    t_max: f64,
) -> Result<ChainSolution> {
    let times = time_grid(dt, t_max)?;
    let n0 = params.n0_a() as f64;
    let n_a: Vec<f64> = times.iter().map(|&t| params.n_a(t)).collect();
    let n_b: Vec<f64> = times.iter().map(|&t| params.n_b(t)).collect();
    let n_c = n_a.iter().zip(&n_b).map(|(a, b)| n0 - a - b).collect();

    Ok(ChainSolution {
        times,
        n_a,
        n_b,
        n_c,
    })
}

/// Stochastic chain ensemble: species A, species B, and cumulative B decays.
#[derive(Debug, Clone)]
pub struct ChainEnsemble {
    pub times: Vec<f64>,
    pub a: TrajectoryEnsemble,
    pub b: TrajectoryEnsemble,
    pub c: TrajectoryEnsemble,
}

/// Monte Carlo chain simulation.
///
/// Per step, both decay counts are drawn from the populations at the start
/// of the step, then A's decays are moved into B. A nucleus that arrives in B
/// therefore cannot decay again within the step it arrived.
pub fn simulate_chain_mc<R: Rng + ?Sized>(
    params: &ChainParams,
    dt: f64,
    t_max: f64,
    n_realizations: usize,
    rng: &mut R,
) -> Result<ChainEnsemble> {
    validate_grid(dt, t_max)?;
    if n_realizations == 0 {
        return Err(DecayError::InvalidConfig(
            "n_realizations must be greater than zero".to_string(),
        ));
    }
    warn_if_coarse("chain species A", params.lambda_a(), dt);
    warn_if_coarse("chain species B", params.lambda_b(), dt);

    let times = time_grid(dt, t_max)?;
    let steps = times.len();
    let p_a = decay_probability(params.lambda_a(), dt);
    let p_b = decay_probability(params.lambda_b(), dt);

    debug!(
        "simulating chain: n0_a={}, p_a={p_a:.6}, p_b={p_b:.6}, {n_realizations} realizations x {steps} steps",
        params.n0_a()
    );

    let mut a = TrajectoryEnsemble::zeros(n_realizations, steps);
    let mut b = TrajectoryEnsemble::zeros(n_realizations, steps);
    let mut c = TrajectoryEnsemble::zeros(n_realizations, steps);

    for r in 0..n_realizations {
        let mut n_a = params.n0_a();
        let mut n_b = 0_u64;
        let mut n_c = 0_u64;
        a.set(r, 0, n_a);

        for k in 1..steps {
            let decay_a = binomial_decays(n_a, p_a, rng)?;
            let decay_b = binomial_decays(n_b, p_b, rng)?;
            n_a -= decay_a;
            n_b = n_b - decay_b + decay_a;
            n_c += decay_b;

            a.set(r, k, n_a);
            b.set(r, k, n_b);
            c.set(r, k, n_c);
        }
    }

    Ok(ChainEnsemble { times, a, b, c })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_params_validation() {
        assert!(ChainParams::new(10, 0.0, 1.0).is_err());
        assert!(ChainParams::new(10, 1.0, -1.0).is_err());
        assert!(ChainParams::new(10, 1.0, f64::INFINITY).is_err());
        assert!(ChainParams::new(0, 1.0, 1.0).is_ok());
    }

    #[test]
    fn test_json_goes_through_validation() {
        let bad = serde_json::from_str::<ChainParams>(
            r#"{"n0_a": 10, "lambda_a": -1.0, "lambda_b": 0.0}"#,
        );
        let err = bad.unwrap_err().to_string();
        assert!(err.contains("lambda_a"), "unexpected error: {err}");

        let params: ChainParams =
            serde_json::from_str(r#"{"n0_a": 10, "lambda_a": 0.2, "lambda_b": 0.05}"#).unwrap();
        assert_eq!(params, ChainParams::new(10, 0.2, 0.05).unwrap());
    }

    #[test]
    fn test_deterministic_matches_closed_form() {
        let params = ChainParams::new(10_000, 0.2, 0.05).unwrap();
        let sol = simulate_chain_deterministic(&params, 0.01, 10.0).unwrap();
        for (k, &t) in sol.times.iter().enumerate() {
            let na = 10_000.0 * (-0.2 * t).exp();
            let nb = 0.2 * 10_000.0 / (0.05 - 0.2) * ((-0.2 * t).exp() - (-0.05 * t).exp());
            assert_relative_eq!(sol.n_a[k], na, max_relative = 1e-12);
            assert_relative_eq!(sol.n_b[k], nb, max_relative = 1e-12);
        }
        assert!(sol.n_a.windows(2).all(|w| w[1] - w[0] <= 1e-12));
    }

    #[test]
    fn test_degenerate_branch_is_taken() {
        let params = ChainParams::new(1_000, 0.3, 0.3).unwrap();
        assert!(params.is_degenerate());
        let t = 2.0;
        assert_relative_eq!(params.n_b(t), 0.3 * 1_000.0 * t * (-0.3 * t).exp());
        assert!(params.n_b(t).is_finite());
    }

    #[test]
    fn test_end_product_completes_balance() {
        let params = ChainParams::new(500, 1.0, 0.5).unwrap();
        let sol = simulate_chain_deterministic(&params, 0.1, 5.0).unwrap();
        for k in 0..sol.times.len() {
            assert_relative_eq!(
                sol.n_a[k] + sol.n_b[k] + sol.n_c[k],
                500.0,
                max_relative = 1e-12
            );
        }
        assert_eq!(sol.n_c[0], 0.0);
    }

    #[test]
    fn test_mc_conserves_nuclei_pathwise() {
        let params = ChainParams::new(3_000, 0.5, 0.2).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let ens = simulate_chain_mc(&params, 0.1, 8.0, 6, &mut rng).unwrap();
        for r in 0..6 {
            for k in 0..ens.times.len() {
                assert_eq!(ens.a.get(r, k) + ens.b.get(r, k) + ens.c.get(r, k), 3_000);
            }
            assert!(ens.a.row(r).windows(2).all(|w| w[1] <= w[0]));
            assert!(ens.c.row(r).windows(2).all(|w| w[1] >= w[0]));
        }
    }

    #[test]
    fn test_arrivals_do_not_decay_in_arrival_step() {
        // With λ·dt huge both per-step probabilities are 1: every A nucleus
        // leaves in step one, and B only loses them in step two.
        let params = ChainParams::new(100, 1e3, 1e3).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let ens = simulate_chain_mc(&params, 1.0, 2.0, 1, &mut rng).unwrap();
        assert_eq!(ens.a.row(0), &[100, 0, 0]);
        assert_eq!(ens.b.row(0), &[0, 100, 0]);
        assert_eq!(ens.c.row(0), &[0, 0, 100]);
    }

    #[test]
    fn test_mc_rejects_zero_realizations() {
        let params = ChainParams::new(10, 1.0, 1.0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(simulate_chain_mc(&params, 0.1, 1.0, 0, &mut rng).is_err());
    }
}
