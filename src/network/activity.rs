//! Edge activity model: exogenous-rate edge switching.
//!
//! Every absent node pair switches on at rate ω⁺ = density·ω and every present
//! edge switches off at rate ω⁻ = (1 − density)·ω, so the stationary edge
//! density is `density`. Initial graphs are drawn from the stationary state
//! (Erdős–Rényi with that density).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{canonical_edge, DynamicGraph, Edge, EdgeChanges};
use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeActivityModel {
    /// Number of nodes.
    pub n: usize,
    /// Stationary edge density in `[0, 1]`.
    pub density: f64,
    /// Total switching rate ω = ω⁺ + ω⁻.
    pub omega: f64,
    /// Start time.
    pub t0: f64,
}

/// One edge switching event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeSwitch {
    On(Edge),
    Off(Edge),
}

impl EdgeActivityModel {
    pub fn new(n: usize, density: f64, omega: f64, t0: f64) -> Result<Self> {
        let model = Self {
            n,
            density,
            omega,
            t0,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<()> {
        if self.n < 2 {
            return Err(Error::InvalidConfig(format!(
                "edge activity model needs at least 2 nodes, got {}",
                self.n
            )));
        }
        if !(0.0..=1.0).contains(&self.density) {
            return Err(Error::InvalidConfig(format!(
                "density {} outside [0, 1]",
                self.density
            )));
        }
        if !(self.omega.is_finite() && self.omega >= 0.0) || !self.t0.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "omega {} and t0 {} must be finite, omega non-negative",
                self.omega, self.t0
            )));
        }
        Ok(())
    }

    /// Rate at which a single absent pair switches on.
    #[inline]
    pub fn omega_plus(&self) -> f64 {
        self.density * self.omega
    }

    /// Rate at which a single present edge switches off.
    #[inline]
    pub fn omega_minus(&self) -> f64 {
        (1.0 - self.density) * self.omega
    }

    /// Erdős–Rényi graph with the stationary density.
    pub fn initial_graph(&self, rng: &mut StdRng) -> DynamicGraph {
        let mut graph = DynamicGraph::empty(self.n);
        for i in 0..self.n {
            for j in (i + 1)..self.n {
                if rng.gen::<f64>() < self.density {
                    // pairs are visited once each, so the insert cannot collide
                    let _ = graph.insert_edge(i, j, self.t0);
                }
            }
        }
        graph
    }

    /// Total switching hazard for the current graph.
    pub fn total_rate(&self, graph: &DynamicGraph) -> f64 {
        let m = graph.edge_count();
        let absent = graph.pair_count() - m;
        self.omega_plus() * absent as f64 + self.omega_minus() * m as f64
    }

    /// Pick the next switching event with probability proportional to its rate.
    ///
    /// Returns `None` when no event is possible.
    pub fn draw_switch(&self, graph: &DynamicGraph, rng: &mut StdRng) -> Option<EdgeSwitch> {
        let m = graph.edge_count();
        let off_rate = self.omega_minus() * m as f64;
        let total = self.total_rate(graph);
        if total <= 0.0 {
            return None;
        }

        if rng.gen::<f64>() * total < off_rate {
            let index = rng.gen_range(0..m);
            return graph.edge_at(index).map(EdgeSwitch::Off);
        }

        // rejection-sample an absent pair; the on-rate is positive so one exists
        loop {
            let (i, j) = choose_pair(self.n, rng);
            if !graph.has_edge(i, j) {
                return Some(EdgeSwitch::On(canonical_edge(i, j)));
            }
        }
    }

    /// Apply a switching event to `graph`.
    pub fn apply(&self, graph: &mut DynamicGraph, switch: EdgeSwitch, time: f64) -> Result<()> {
        match switch {
            EdgeSwitch::On((i, j)) => graph.insert_edge(i, j, time).map(|_| ()),
            EdgeSwitch::Off((i, j)) => graph.remove_edge(i, j, time).map(|_| ()),
        }
    }
}

/// Two distinct uniformly random nodes.
fn choose_pair(n: usize, rng: &mut StdRng) -> Edge {
    let first = rng.gen_range(0..n);
    let mut second = rng.gen_range(0..n - 1);
    if second >= first {
        second += 1;
    }
    (first, second)
}

/// Run the model alone for `t_run` and record it as edge changes.
///
/// # Arguments
/// * `model` - Model parameters
/// * `t_run` - Duration after `model.t0`
/// * `seed` - RNG seed
pub fn simulate_edge_activity(
    model: &EdgeActivityModel,
    t_run: f64,
    seed: u64,
) -> Result<EdgeChanges> {
    model.validate()?;
    if !(t_run.is_finite() && t_run >= 0.0) {
        return Err(Error::InvalidConfig(format!("t_run={t_run} must be finite and >= 0")));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut graph = model.initial_graph(&mut rng);
    let edges_initial = graph.sorted_edges();
    let tmax = model.t0 + t_run;

    let mut t = Vec::new();
    let mut edges_in = Vec::new();
    let mut edges_out = Vec::new();
    let mut now = model.t0;

    loop {
        let total = model.total_rate(&graph);
        if total <= 0.0 {
            break;
        }
        now += -(1.0 - rng.gen::<f64>()).ln() / total;
        if now > tmax {
            break;
        }
        let Some(switch) = model.draw_switch(&graph, &mut rng) else {
            break;
        };
        model.apply(&mut graph, switch, now)?;
        t.push(now);
        match switch {
            EdgeSwitch::On(edge) => {
                edges_in.push(vec![edge]);
                edges_out.push(Vec::new());
            }
            EdgeSwitch::Off(edge) => {
                edges_in.push(Vec::new());
                edges_out.push(vec![edge]);
            }
        }
    }

    debug!(n_events = t.len(), t_run, "simulated edge activity model");

    Ok(EdgeChanges {
        n: model.n,
        t0: model.t0,
        tmax,
        t,
        edges_initial,
        edges_in,
        edges_out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_split_omega() {
        let model = EdgeActivityModel::new(10, 0.2, 2.0, 0.0).unwrap();
        assert!((model.omega_plus() - 0.4).abs() < 1e-12);
        assert!((model.omega_minus() - 1.6).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_density() {
        assert!(EdgeActivityModel::new(10, 1.5, 1.0, 0.0).is_err());
        assert!(EdgeActivityModel::new(1, 0.5, 1.0, 0.0).is_err());
    }

    #[test]
    fn test_simulated_changes_replay_cleanly() {
        let model = EdgeActivityModel::new(12, 0.3, 1.0, 5.0).unwrap();
        let changes = simulate_edge_activity(&model, 20.0, 7).unwrap();
        assert!(!changes.is_empty());
        assert_eq!(changes.t0, 5.0);
        assert_eq!(changes.tmax, 25.0);
        let lists = changes.to_edge_lists().unwrap();
        assert_eq!(lists.t.len(), changes.len() + 1);
    }

    #[test]
    fn test_same_seed_same_network() {
        let model = EdgeActivityModel::new(8, 0.5, 3.0, 0.0).unwrap();
        let a = simulate_edge_activity(&model, 5.0, 11).unwrap();
        let b = simulate_edge_activity(&model, 5.0, 11).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_frozen_model_never_switches() {
        let model = EdgeActivityModel::new(6, 0.5, 0.0, 0.0).unwrap();
        let changes = simulate_edge_activity(&model, 100.0, 3).unwrap();
        assert!(changes.is_empty());
    }
}
