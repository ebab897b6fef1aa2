//! Closed-form chain invariants

use approx::assert_relative_eq;
use proptest::prelude::*;

use raddecay::{simulate_chain_deterministic, ChainParams};

#[test]
fn test_near_degenerate_rates_match_equal_rate_limit() {
    let equal = ChainParams::new(1_000, 0.3, 0.3).unwrap();
    let near = ChainParams::new(1_000, 0.3, 0.3 + 1e-10).unwrap();
    assert!(equal.is_degenerate());
    assert!(!near.is_degenerate());

    let exact = simulate_chain_deterministic(&equal, 0.1, 10.0).unwrap();
    let close = simulate_chain_deterministic(&near, 0.1, 10.0).unwrap();
    for (k, &t) in exact.times.iter().enumerate().skip(1) {
        assert_relative_eq!(close.n_b[k], exact.n_b[k], max_relative = 1e-4);
        assert!(close.n_b[k].is_finite(), "n_b not finite at t={t}");
    }
}

#[test]
fn test_daughter_peaks_then_decays() {
    let params = ChainParams::new(10_000, 0.2, 0.05).unwrap();
    let sol = simulate_chain_deterministic(&params, 0.1, 60.0).unwrap();
    let peak = sol
        .n_b
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(k, _)| sol.times[k])
        .unwrap();

    // t_max = ln(λB/λA) / (λB - λA)
    let expected = (0.05_f64 / 0.2).ln() / (0.05 - 0.2);
    assert!((peak - expected).abs() <= 0.1, "peak at {peak}, expected {expected}");
}

proptest! {
    #[test]
    fn prop_populations_are_non_negative(
        n0 in 0u64..1_000_000,
        lambda_a in 1e-3f64..5.0,
        lambda_b in 1e-3f64..5.0,
    ) {
        let params = ChainParams::new(n0, lambda_a, lambda_b).unwrap();
        let sol = simulate_chain_deterministic(&params, 0.25, 20.0).unwrap();
        for k in 0..sol.times.len() {
            prop_assert!(sol.n_a[k] >= 0.0);
            prop_assert!(sol.n_b[k] >= -1e-9 * n0 as f64);
            prop_assert!((sol.n_a[k] + sol.n_b[k] + sol.n_c[k] - n0 as f64).abs() <= 1e-6 * n0.max(1) as f64);
        }
        prop_assert!(sol.n_a.windows(2).all(|w| w[1] <= w[0]));
    }
}
