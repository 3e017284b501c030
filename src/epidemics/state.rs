//! Per-node compartment automaton with susceptible-neighbour bookkeeping.
//!
//! Every infected node owns the set of its currently susceptible neighbours.
//! The sets drive both the infection hazard and the R0 estimate, and are kept
//! in step with the current edge set through `on_edge_added` /
//! `on_edge_removed`.

use std::collections::{BTreeMap, BTreeSet};

use super::observables::Observables;
use super::process::{Compartment, Transition, TransitionTable};
use crate::error::{Error, Result};
use crate::network::{DynamicGraph, Edge};

/// Full node configuration at one instant, as archived by the
/// quasi-stationary controller.
#[derive(Clone, Debug, PartialEq)]
pub struct Configuration {
    pub time: f64,
    pub status: Vec<Compartment>,
    pub edges: Vec<Edge>,
}

/// Compartment state of one simulation run.
#[derive(Clone, Debug)]
pub struct EpidemicState {
    table: TransitionTable,
    status: Vec<Compartment>,
    counts: [usize; 3],
    /// infected node -> its susceptible neighbours
    susceptible_neighbors: BTreeMap<usize, BTreeSet<usize>>,
    si_edges: usize,
    /// Clock time of the last change applied to this state.
    pub last_active_time: f64,
    observables: Observables,
}

impl EpidemicState {
    /// All nodes susceptible.
    pub fn new(table: TransitionTable, n: usize, time: f64) -> Self {
        Self {
            table,
            status: vec![Compartment::Susceptible; n],
            counts: [n, 0, 0],
            susceptible_neighbors: BTreeMap::new(),
            si_edges: 0,
            last_active_time: time,
            observables: Observables::default(),
        }
    }

    /// State with the given statuses on `graph`.
    pub fn from_configuration(
        table: TransitionTable,
        status: Vec<Compartment>,
        graph: &DynamicGraph,
        time: f64,
    ) -> Result<Self> {
        let mut state = Self::new(table, graph.n(), time);
        state.reset_configuration(time, status, graph)?;
        Ok(state)
    }

    /// Replace every node status and rebuild counts and neighbour sets.
    /// Recorded observables are kept.
    pub fn reset_configuration(
        &mut self,
        time: f64,
        status: Vec<Compartment>,
        graph: &DynamicGraph,
    ) -> Result<()> {
        if status.len() != graph.n() {
            return Err(Error::InvalidConfig(format!(
                "configuration has {} statuses for {} nodes",
                status.len(),
                graph.n()
            )));
        }
        if let Some(&bad) = status.iter().find(|&&c| !self.table.uses(c)) {
            return Err(Error::InvalidConfig(format!(
                "compartment {bad:?} does not exist in {:?}",
                self.table.process()
            )));
        }

        self.status = status;
        self.counts = [0; 3];
        for &c in &self.status {
            self.counts[c.index()] += 1;
        }
        self.susceptible_neighbors.clear();
        self.si_edges = 0;
        for node in 0..self.status.len() {
            if self.status[node] == Compartment::Infected {
                let set: BTreeSet<usize> = graph
                    .neighbors(node)
                    .filter(|&v| self.status[v] == Compartment::Susceptible)
                    .collect();
                self.si_edges += set.len();
                self.susceptible_neighbors.insert(node, set);
            }
        }
        self.last_active_time = time;
        Ok(())
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    pub fn n(&self) -> usize {
        self.status.len()
    }

    pub fn status(&self) -> &[Compartment] {
        &self.status
    }

    #[inline]
    pub fn count(&self, compartment: Compartment) -> usize {
        self.counts[compartment.index()]
    }

    /// Counts ordered S, I, R.
    #[inline]
    pub fn counts(&self) -> [usize; 3] {
        self.counts
    }

    /// Number of (infected, susceptible) neighbour pairs.
    #[inline]
    pub fn si_edge_count(&self) -> usize {
        self.si_edges
    }

    /// Infected nodes with their susceptible neighbours, by node id.
    pub fn infected_with_susceptible_neighbors(
        &self,
    ) -> impl Iterator<Item = (usize, &BTreeSet<usize>)> + '_ {
        self.susceptible_neighbors.iter().map(|(&node, set)| (node, set))
    }

    /// The `k`-th infected node in id order.
    pub fn nth_infected(&self, k: usize) -> Option<usize> {
        self.susceptible_neighbors.keys().nth(k).copied()
    }

    /// The `k`-th node in `compartment`, in id order.
    pub fn nth_in(&self, compartment: Compartment, k: usize) -> Option<usize> {
        self.status
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c == compartment)
            .nth(k)
            .map(|(node, _)| node)
    }

    pub fn observables(&self) -> &Observables {
        &self.observables
    }

    pub fn observables_mut(&mut self) -> &mut Observables {
        &mut self.observables
    }

    pub fn into_observables(self) -> Observables {
        self.observables
    }

    /// Snapshot of statuses and edges for archiving.
    pub fn configuration(&self, graph: &DynamicGraph) -> Configuration {
        Configuration {
            time: self.last_active_time,
            status: self.status.clone(),
            edges: graph.sorted_edges(),
        }
    }

    /// Apply a named transition to `node`.
    ///
    /// Fails with `IllegalTransition` when the active process has no such
    /// transition out of the node's current compartment; nothing changes then.
    pub fn apply(
        &mut self,
        node: usize,
        transition: Transition,
        graph: &DynamicGraph,
    ) -> Result<Compartment> {
        let Some(&from) = self.status.get(node) else {
            return Err(Error::InvalidConfig(format!(
                "node {node} out of range for N={}",
                self.status.len()
            )));
        };
        let Some(to) = self.table.target(transition, from) else {
            return Err(Error::IllegalTransition {
                node,
                transition,
                from,
                process: self.table.process(),
            });
        };

        self.leave(node, from, graph);
        self.status[node] = to;
        self.counts[from.index()] -= 1;
        self.counts[to.index()] += 1;
        self.enter(node, to, graph);
        Ok(to)
    }

    /// Keep neighbour sets in step with a new edge.
    pub fn on_edge_added(&mut self, i: usize, j: usize) {
        if let Some((infected, susceptible)) = self.si_pair(i, j) {
            if let Some(set) = self.susceptible_neighbors.get_mut(&infected) {
                if set.insert(susceptible) {
                    self.si_edges += 1;
                }
            }
        }
    }

    /// Keep neighbour sets in step with a removed edge.
    pub fn on_edge_removed(&mut self, i: usize, j: usize) {
        if let Some((infected, susceptible)) = self.si_pair(i, j) {
            if let Some(set) = self.susceptible_neighbors.get_mut(&infected) {
                if set.remove(&susceptible) {
                    self.si_edges -= 1;
                }
            }
        }
    }

    /// Current R0 estimate: mean over infected nodes of their expected number
    /// of secondary infections, `η·s_i/ρ` (or `η·s_i/(k_i·ρ)` when node based).
    pub fn reproduction_number(
        &self,
        graph: &DynamicGraph,
        infection_rate: f64,
        recovery_rate: f64,
    ) -> f64 {
        let infected = self.count(Compartment::Infected);
        if infected == 0 {
            return 0.0;
        }
        let node_based = self.table.process().is_node_based();
        let pressure: f64 = self
            .susceptible_neighbors
            .iter()
            .map(|(&node, set)| {
                let s = set.len() as f64;
                if node_based {
                    let k = graph.degree(node);
                    if k == 0 {
                        0.0
                    } else {
                        s / k as f64
                    }
                } else {
                    s
                }
            })
            .sum();
        let spread = infection_rate * pressure / infected as f64;
        if spread <= 0.0 {
            0.0
        } else if recovery_rate <= 0.0 {
            f64::INFINITY
        } else {
            spread / recovery_rate
        }
    }

    fn si_pair(&self, i: usize, j: usize) -> Option<(usize, usize)> {
        match (self.status.get(i)?, self.status.get(j)?) {
            (Compartment::Infected, Compartment::Susceptible) => Some((i, j)),
            (Compartment::Susceptible, Compartment::Infected) => Some((j, i)),
            _ => None,
        }
    }

    fn leave(&mut self, node: usize, from: Compartment, graph: &DynamicGraph) {
        match from {
            Compartment::Susceptible => {
                for u in graph.neighbors(node) {
                    if let Some(set) = self.susceptible_neighbors.get_mut(&u) {
                        if set.remove(&node) {
                            self.si_edges -= 1;
                        }
                    }
                }
            }
            Compartment::Infected => {
                if let Some(set) = self.susceptible_neighbors.remove(&node) {
                    self.si_edges -= set.len();
                }
            }
            Compartment::Recovered => {}
        }
    }

    fn enter(&mut self, node: usize, to: Compartment, graph: &DynamicGraph) {
        match to {
            Compartment::Susceptible => {
                for u in graph.neighbors(node) {
                    if let Some(set) = self.susceptible_neighbors.get_mut(&u) {
                        if set.insert(node) {
                            self.si_edges += 1;
                        }
                    }
                }
            }
            Compartment::Infected => {
                let set: BTreeSet<usize> = graph
                    .neighbors(node)
                    .filter(|&v| self.status[v] == Compartment::Susceptible)
                    .collect();
                self.si_edges += set.len();
                self.susceptible_neighbors.insert(node, set);
            }
            Compartment::Recovered => {}
        }
    }
}
