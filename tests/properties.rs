//! Property-based tests across the network, epidemic and spectral modules.

use approx::assert_relative_eq;
use proptest::prelude::*;
use tempnet_rust::epidemics::{simulate, EpidemicConfig, EpidemicNetwork, ProcessKind};
use tempnet_rust::network::{resample, EdgeLists, SparseAdjacencyMatrices, TemporalNetwork};
use tempnet_rust::spectral::{sis_max_eigenvalue, EigenOptions};

// Unit-spaced snapshots t = 0, 1, ..., len-1 with tmax = len, each snapshot a
// random subset of the node pairs.
fn edge_lists_strategy() -> impl Strategy<Value = EdgeLists> {
    (2usize..8, 1usize..6).prop_flat_map(|(n, len)| {
        let pairs = n * (n - 1) / 2;
        prop::collection::vec(prop::collection::vec(any::<bool>(), pairs), len).prop_map(
            move |masks| {
                let all: Vec<(usize, usize)> = (0..n)
                    .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
                    .collect();
                let edges = masks
                    .iter()
                    .map(|mask| {
                        all.iter()
                            .zip(mask)
                            .filter(|&(_, &on)| on)
                            .map(|(&edge, _)| edge)
                            .collect()
                    })
                    .collect();
                let t = (0..len).map(|k| k as f64).collect();
                EdgeLists::new(n, t, len as f64, edges).unwrap()
            },
        )
    })
}

proptest! {
    // Property: lists -> changes -> lists is the identity on canonical input
    #[test]
    fn test_conversion_round_trip(lists in edge_lists_strategy()) {
        let back = lists.to_edge_changes().unwrap().to_edge_lists().unwrap();
        prop_assert_eq!(back, lists.canonicalized());
    }

    // Property: resampling yields exactly K windows on the same span
    #[test]
    fn test_resample_window_count(
        lists in edge_lists_strategy(),
        aggregate in any::<bool>(),
    ) {
        let len = lists.t.len();
        let network = TemporalNetwork::from(lists.clone());
        for k in [1, len, 10 * len] {
            let out = resample(&network, k, aggregate).unwrap();
            prop_assert_eq!(out.t.len(), k);
            prop_assert_eq!(out.edges.len(), k);
            prop_assert_eq!(out.t[0], lists.t[0]);
            prop_assert_eq!(out.tmax, lists.tmax);
            prop_assert!(out.t.windows(2).all(|w| w[0] < w[1]));
        }
    }

    // Property: aggregating onto the snapshot grid reproduces the snapshots
    #[test]
    fn test_aggregate_on_native_grid_is_identity(lists in edge_lists_strategy()) {
        let len = lists.t.len();
        let out = resample(&TemporalNetwork::from(lists.clone()), len, true).unwrap();
        prop_assert_eq!(out, lists.canonicalized());
    }

    // Property: SIS conserves S + I = N and is reproducible per seed
    #[test]
    fn test_sis_conservation_and_reproducibility(
        lists in edge_lists_strategy(),
        seed in any::<u64>(),
        eta in 0.1f64..3.0,
    ) {
        let n = lists.n;
        let network = TemporalNetwork::from(lists);
        let config = EpidemicConfig::sis(n, 10.0, eta, 1.0);
        let a = simulate(EpidemicNetwork::Temporal(&network), &config, seed).unwrap();
        let b = simulate(EpidemicNetwork::Temporal(&network), &config, seed).unwrap();
        prop_assert_eq!(&a.observables, &b.observables);
        for k in 0..a.observables.len() {
            prop_assert_eq!(a.observables.susceptible[k] + a.observables.infected[k], n);
            prop_assert_eq!(a.observables.recovered[k], 0);
        }
        prop_assert!(a.observables.time.windows(2).all(|w| w[0] <= w[1]));
    }

    // Property: SIR counts never resurrect susceptibles
    #[test]
    fn test_sir_susceptibles_never_increase(
        lists in edge_lists_strategy(),
        seed in any::<u64>(),
    ) {
        let n = lists.n;
        let network = TemporalNetwork::from(lists);
        let config = EpidemicConfig {
            process: ProcessKind::SIR,
            ..EpidemicConfig::sis(n, 10.0, 2.0, 1.0)
        };
        let result = simulate(EpidemicNetwork::Temporal(&network), &config, seed).unwrap();
        prop_assert!(result.observables.susceptible.windows(2).all(|w| w[1] <= w[0]));
    }

    // Property: μ_max grows with η and shrinks with ρ
    #[test]
    fn test_max_eigenvalue_monotone(
        lists in edge_lists_strategy(),
        eta in 0.0f64..1.0,
        rho in 0.1f64..1.0,
        delta in 0.05f64..0.5,
    ) {
        let seq = SparseAdjacencyMatrices::from_edge_lists(&lists).unwrap();
        let options = EigenOptions::default();
        let base = sis_max_eigenvalue(&seq, eta, rho, &options).unwrap();
        let more_infectious = sis_max_eigenvalue(&seq, eta + delta, rho, &options).unwrap();
        let faster_recovery = sis_max_eigenvalue(&seq, eta, rho + delta, &options).unwrap();
        prop_assert!(more_infectious >= base * (1.0 - 1e-7));
        prop_assert!(faster_recovery <= base * (1.0 + 1e-7));
    }
}

#[test]
fn test_boundary_event_lands_in_last_window() {
    // an edge switched on exactly at a window's right boundary belongs to that
    // window's last state but not to its aggregate
    let lists = EdgeLists::new(3, vec![0.0, 2.0], 3.0, vec![vec![], vec![(0, 1)]]).unwrap();
    let network = TemporalNetwork::from(lists);

    let last_state = resample(&network, 3, false).unwrap();
    assert_eq!(last_state.edges, vec![vec![], vec![(0, 1)], vec![(0, 1)]]);

    let aggregate = resample(&network, 3, true).unwrap();
    assert_eq!(aggregate.edges, vec![vec![], vec![], vec![(0, 1)]]);
}

#[test]
fn test_isolated_nodes_decay_at_recovery_rate() {
    // no edges: μ_max = exp(−ρ·(tmax − t0))
    let lists = EdgeLists::new(4, vec![0.0, 1.0], 2.5, vec![vec![], vec![]]).unwrap();
    let seq = SparseAdjacencyMatrices::from_edge_lists(&lists).unwrap();
    let mu = sis_max_eigenvalue(&seq, 5.0, 0.8, &EigenOptions::default()).unwrap();
    assert_relative_eq!(mu, (-0.8f64 * 2.5).exp(), max_relative = 1e-10);
}
