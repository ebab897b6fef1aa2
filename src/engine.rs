//! Single-isotope stochastic engine
//!
//! Approximates the continuous-time pure-death process by thinning the live
//! population once per step of width `dt`. Each nucleus decays within a step
//! with probability `p = 1 - exp(-λ dt)`, the exact one-step transition
//! probability of an exponential lifetime, so there is no first-order
//! discretization bias at any step size.

use log::{debug, warn};
use rand::{Rng, RngCore};
use rand_distr::{Binomial, Distribution};

use crate::config::{EngineKind, SimConfig};
use crate::ensemble::TrajectoryEnsemble;
use crate::isotope::Isotope;
use crate::{DecayError, Result};

/// Above this value of `λ·dt` most nuclei decay within one step and the
/// discrete path is a coarse picture of the continuous process.
pub const COARSE_STEP_THRESHOLD: f64 = 1.0;

/// Per-step decay probability `1 - exp(-λ dt)`.
pub fn decay_probability(lambda: f64, dt: f64) -> f64 {
    -(-lambda * dt).exp_m1()
}

/// Number of decays among `live` independent nuclei in one step.
pub(crate) fn binomial_decays<R: Rng + ?Sized>(live: u64, p: f64, rng: &mut R) -> Result<u64> {
    // N = 0 is absorbing
    if live == 0 {
        return Ok(0);
    }
    let dist = Binomial::new(live, p).map_err(|e| DecayError::Distribution(e.to_string()))?;
    Ok(dist.sample(rng))
}

pub(crate) fn warn_if_coarse(label: &str, lambda: f64, dt: f64) {
    let ratio = lambda * dt;
    if ratio > COARSE_STEP_THRESHOLD {
        warn!(
            "{label}: lambda*dt = {ratio:.3} exceeds {COARSE_STEP_THRESHOLD}; \
             per-step decay probability is {:.3}, consider a smaller dt",
            decay_probability(lambda, dt)
        );
    }
}

/// Strategy that fills a trajectory ensemble for one isotope.
pub trait DecayEngine {
    fn kind(&self) -> EngineKind;

    /// Simulate `n_realizations` paths of `n_points` samples starting at `n0`,
    /// each nucleus decaying with probability `p` per step.
    fn simulate(
        &self,
        n0: u64,
        p: f64,
        n_realizations: usize,
        n_points: usize,
        rng: &mut dyn RngCore,
    ) -> Result<TrajectoryEnsemble>;
}

/// Vectorized engine: all realizations advance together, one binomial draw
/// per realization per step.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinomialEngine;

impl DecayEngine for BinomialEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Binomial
    }

    fn simulate(
        &self,
        n0: u64,
        p: f64,
        n_realizations: usize,
        n_points: usize,
        rng: &mut dyn RngCore,
    ) -> Result<TrajectoryEnsemble> {
        let mut ensemble = TrajectoryEnsemble::zeros(n_realizations, n_points);
        if n_points == 0 {
            return Ok(ensemble);
        }

        let mut live = vec![n0; n_realizations];
        for (r, &n) in live.iter().enumerate() {
            ensemble.set(r, 0, n);
        }

        for k in 1..n_points {
            for (r, n) in live.iter_mut().enumerate() {
                *n -= binomial_decays(*n, p, rng)?;
                ensemble.set(r, k, *n);
            }
        }

        Ok(ensemble)
    }
}

/// Reference engine: every live nucleus draws its own uniform variate.
/// Same distribution as [`BinomialEngine`], cost linear in the population.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerNucleusEngine;

impl DecayEngine for PerNucleusEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::PerNucleus
    }

    fn simulate(
        &self,
        n0: u64,
        p: f64,
        n_realizations: usize,
        n_points: usize,
        rng: &mut dyn RngCore,
    ) -> Result<TrajectoryEnsemble> {
        let mut ensemble = TrajectoryEnsemble::zeros(n_realizations, n_points);
        if n_points == 0 {
            return Ok(ensemble);
        }

        for r in 0..n_realizations {
            let row = ensemble.row_mut(r);
            let mut live = n0;
            row[0] = live;
            for slot in row.iter_mut().skip(1) {
                let decayed = (0..live).filter(|_| rng.gen::<f64>() < p).count() as u64;
                live -= decayed;
                *slot = live;
            }
        }

        Ok(ensemble)
    }
}

pub fn build_engine(kind: EngineKind) -> Box<dyn DecayEngine> {
    match kind {
        EngineKind::Binomial => Box::new(BinomialEngine),
        EngineKind::PerNucleus => Box::new(PerNucleusEngine),
    }
}

/// Time grid and trajectory ensemble of one isotope simulation.
#[derive(Debug, Clone)]
pub struct IsotopeSimulation {
    pub times: Vec<f64>,
    pub ensemble: TrajectoryEnsemble,
}

impl IsotopeSimulation {
    pub fn mean(&self) -> Vec<f64> {
        self.ensemble.mean()
    }

    /// Index of the grid point closest to `t`.
    pub fn nearest_index(&self, t: f64) -> Option<usize> {
        self.times
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (*a - t).abs().total_cmp(&(*b - t).abs()))
            .map(|(idx, _)| idx)
    }
}

/// Simulate an ensemble of decay trajectories for `iso` using the engine
/// selected in `cfg`.
pub fn simulate_isotope<R: RngCore>(
    iso: &Isotope,
    cfg: &SimConfig,
    rng: &mut R,
) -> Result<IsotopeSimulation> {
    cfg.validate()?;
    warn_if_coarse(iso.name(), iso.lambda(), cfg.dt);

    let times = cfg.time_grid();
    let p = decay_probability(iso.lambda(), cfg.dt);
    let engine = build_engine(cfg.engine);

    debug!(
        "simulating {} with {} engine: n0={}, p={p:.6}, {} realizations x {} steps",
        iso.name(),
        engine.kind(),
        iso.n0(),
        cfg.n_realizations,
        times.len()
    );

    let ensemble = engine.simulate(iso.n0(), p, cfg.n_realizations, times.len(), rng)?;
    Ok(IsotopeSimulation { times, ensemble })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn config(engine: EngineKind, n_realizations: usize) -> SimConfig {
        SimConfig {
            dt: 0.1,
            t_max: 5.0,
            n_realizations,
            engine,
        }
    }

    #[test]
    fn test_decay_probability_is_exact_transition() {
        assert_relative_eq!(decay_probability(0.3, 0.5), 1.0 - (-0.15_f64).exp());
        let tiny = decay_probability(1e-12, 1e-6);
        assert_relative_eq!(tiny, 1e-18, max_relative = 1e-9);
        let huge = decay_probability(1e3, 10.0);
        assert!(huge > 0.0 && huge <= 1.0);
    }

    #[test]
    fn test_paths_are_non_increasing() {
        let iso = Isotope::from_lambda("X", 2_000, 0.4).unwrap();
        for engine in [EngineKind::Binomial, EngineKind::PerNucleus] {
            let mut rng = ChaCha8Rng::seed_from_u64(7);
            let sim = simulate_isotope(&iso, &config(engine, 5), &mut rng).unwrap();
            assert_eq!(sim.ensemble.n_steps(), sim.times.len());
            for row in sim.ensemble.rows() {
                assert_eq!(row[0], 2_000);
                assert!(row.windows(2).all(|w| w[1] <= w[0]));
            }
        }
    }

    #[test]
    fn test_zero_population_stays_zero() {
        let iso = Isotope::from_lambda("X", 0, 1.0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let sim = simulate_isotope(&iso, &config(EngineKind::Binomial, 3), &mut rng).unwrap();
        assert!(sim.ensemble.rows().all(|row| row.iter().all(|&n| n == 0)));
    }

    #[test]
    fn test_same_seed_reproduces_trajectories() {
        let iso = Isotope::from_half_life("X", 10_000, 2.0).unwrap();
        let cfg = config(EngineKind::Binomial, 4);
        let a = simulate_isotope(&iso, &cfg, &mut ChaCha8Rng::seed_from_u64(99)).unwrap();
        let b = simulate_isotope(&iso, &cfg, &mut ChaCha8Rng::seed_from_u64(99)).unwrap();
        let c = simulate_isotope(&iso, &cfg, &mut ChaCha8Rng::seed_from_u64(100)).unwrap();
        assert_eq!(a.ensemble, b.ensemble);
        assert_ne!(a.ensemble, c.ensemble);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let iso = Isotope::from_lambda("X", 10, 1.0).unwrap();
        let cfg = SimConfig {
            n_realizations: 0,
            ..SimConfig::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(matches!(
            simulate_isotope(&iso, &cfg, &mut rng),
            Err(DecayError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_build_engine_honours_kind() {
        assert_eq!(build_engine(EngineKind::Binomial).kind(), EngineKind::Binomial);
        assert_eq!(
            build_engine(EngineKind::PerNucleus).kind(),
            EngineKind::PerNucleus
        );
    }

    #[test]
    fn test_nearest_index() {
        let sim = IsotopeSimulation {
            times: vec![0.0, 0.5, 1.0, 1.5],
            ensemble: TrajectoryEnsemble::zeros(1, 4),
        };
        assert_eq!(sim.nearest_index(1.1), Some(2));
        assert_eq!(sim.nearest_index(-3.0), Some(0));
    }
}
