//! Gillespie simulator for compartmental epidemics on dynamic networks.
//!
//! Simulates stochastic dynamics:
//! - State = node compartments on the current edge set
//! - Events = infection along S–I edges, recovery, waning, edge switching
//! - Rates = per-edge infection rate, per-node recovery/waning rates,
//!   exogenous edge-switching rates of an activity model
//!
//! Scheduled network changes (replayed temporal networks) do not compete in
//! the race: whenever the next change comes before the drawn event time, the
//! clock jumps to the change, the edge set is updated and the hazards are
//! recomputed.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::observables::Observables;
use super::process::{Compartment, ProcessKind, Transition, TransitionTable};
use super::state::{Configuration, EpidemicState};
use crate::error::{Error, Result};
use crate::network::activity::EdgeSwitch;
use crate::network::{DynamicGraph, Edge, EdgeActivityModel, EdgeChanges, EdgeLists, TemporalNetwork};

/// Configuration for an epidemic simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpidemicConfig {
    /// Process variant.
    pub process: ProcessKind,
    /// Number of nodes; must match the network.
    pub n: usize,
    /// Simulated duration.
    pub t_simulation: f64,
    /// Per S–I edge infection rate η (per infected node for node-based SIS).
    pub infection_rate: f64,
    /// Per-node recovery rate ρ.
    pub recovery_rate: f64,
    /// Per-node R → S rate (SIRS only).
    pub waning_immunity_rate: f64,
    /// Nodes infected at the start, drawn uniformly.
    pub number_of_initially_infected: usize,
    /// Nodes starting in R (SIR/SIRS only).
    pub number_of_initially_vaccinated: usize,
    /// Observable sampling interval; 0 records after every event.
    pub sampling_dt: f64,
}

impl Default for EpidemicConfig {
    fn default() -> Self {
        Self {
            process: ProcessKind::SIS,
            n: 100,
            t_simulation: 100.0,
            infection_rate: 1.0,
            recovery_rate: 1.0,
            waning_immunity_rate: 0.0,
            number_of_initially_infected: 1,
            number_of_initially_vaccinated: 0,
            sampling_dt: 0.0,
        }
    }
}

impl EpidemicConfig {
    /// SIS configuration with one initially infected node.
    pub fn sis(n: usize, t_simulation: f64, infection_rate: f64, recovery_rate: f64) -> Self {
        Self {
            process: ProcessKind::SIS,
            n,
            t_simulation,
            infection_rate,
            recovery_rate,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let rates = [
            ("t_simulation", self.t_simulation),
            ("infection_rate", self.infection_rate),
            ("recovery_rate", self.recovery_rate),
            ("waning_immunity_rate", self.waning_immunity_rate),
            ("sampling_dt", self.sampling_dt),
        ];
        for (name, value) in rates {
            if !(value.is_finite() && value >= 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "{name}={value} must be finite and non-negative"
                )));
            }
        }
        let seeded = self.number_of_initially_infected + self.number_of_initially_vaccinated;
        if seeded > self.n {
            return Err(Error::InvalidConfig(format!(
                "{} infected + {} vaccinated exceed N={}",
                self.number_of_initially_infected, self.number_of_initially_vaccinated, self.n
            )));
        }
        if self.number_of_initially_vaccinated > 0 && !self.process.has_recovered() {
            return Err(Error::InvalidConfig(format!(
                "{:?} has no recovered compartment for vaccinated nodes",
                self.process
            )));
        }
        Ok(())
    }
}

/// Network an engine runs on. Inputs are only read; every engine derives its
/// own current edge set.
#[derive(Clone, Copy, Debug)]
pub enum EpidemicNetwork<'a> {
    /// Replayed temporal network, repeated periodically past its `tmax`.
    Temporal(&'a TemporalNetwork),
    /// First snapshot only, never changing.
    Static(&'a EdgeLists),
    /// Exogenous-rate edge switching.
    Activity(&'a EdgeActivityModel),
}

impl EpidemicNetwork<'_> {
    pub fn n(&self) -> usize {
        match self {
            EpidemicNetwork::Temporal(network) => network.n(),
            EpidemicNetwork::Static(lists) => lists.n,
            EpidemicNetwork::Activity(model) => model.n,
        }
    }
}

/// Why `run_until` returned.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Halt {
    /// The clock reached the requested horizon.
    Completed { time: f64 },
    /// No infected node is left.
    Absorbed { time: f64 },
    /// Infected nodes remain but every hazard is zero and no network change
    /// is pending, so the state can never change again. The run stops at the
    /// time it froze; its last record holds until any later horizon.
    Stalled { time: f64 },
}

impl Halt {
    pub fn time(&self) -> f64 {
        match *self {
            Halt::Completed { time } | Halt::Absorbed { time } | Halt::Stalled { time } => time,
        }
    }

    pub fn is_absorbed(&self) -> bool {
        matches!(self, Halt::Absorbed { .. })
    }

    pub fn is_stalled(&self) -> bool {
        matches!(self, Halt::Stalled { .. })
    }
}

/// Outcome of a full run.
#[derive(Clone, Debug)]
pub struct SimulationResult {
    pub observables: Observables,
    pub halt: Halt,
    pub n: usize,
}

/// Epidemic hazards at one instant.
#[derive(Clone, Copy, Debug, Default)]
struct Hazards {
    infection: f64,
    recovery: f64,
    waning: f64,
    network: f64,
}

impl Hazards {
    fn total(&self) -> f64 {
        self.infection + self.recovery + self.waning + self.network
    }

    fn as_weights(&self) -> [f64; 4] {
        [self.infection, self.recovery, self.waning, self.network]
    }
}

/// Replay cursor over a temporal network.
#[derive(Clone, Debug)]
struct Schedule {
    changes: EdgeChanges,
    next: usize,
    offset: f64,
    period: f64,
}

impl Schedule {
    fn next_time(&self) -> Option<f64> {
        if self.changes.is_empty() {
            return None;
        }
        match self.changes.t.get(self.next) {
            Some(&t) => Some(t + self.offset),
            None if self.period > 0.0 => Some(self.changes.tmax + self.offset),
            None => None,
        }
    }

    fn apply_next(
        &mut self,
        graph: &mut DynamicGraph,
        state: &mut EpidemicState,
        time: f64,
    ) -> Result<()> {
        if self.next < self.changes.len() {
            let index = self.next;
            apply_edge_event(
                graph,
                state,
                &self.changes.edges_in[index],
                &self.changes.edges_out[index],
                time,
            )?;
            self.next += 1;
            return Ok(());
        }

        // period boundary: jump back to the initial edge set
        let target: BTreeSet<Edge> = self.changes.edges_initial.iter().copied().collect();
        let current: BTreeSet<Edge> = graph.sorted_edges().into_iter().collect();
        let edges_in: Vec<Edge> = target.difference(&current).copied().collect();
        let edges_out: Vec<Edge> = current.difference(&target).copied().collect();
        apply_edge_event(graph, state, &edges_in, &edges_out, time)?;
        self.next = 0;
        self.offset += self.period;
        trace!(time, offset = self.offset, "temporal network wrapped");
        Ok(())
    }
}

#[derive(Clone, Debug)]
enum NetworkDriver {
    Static,
    Scheduled(Schedule),
    Activity(EdgeActivityModel),
}

/// One simulation run: owns its edge set, its epidemic state and its RNG.
pub struct GillespieEngine {
    config: EpidemicConfig,
    driver: NetworkDriver,
    graph: DynamicGraph,
    state: EpidemicState,
    rng: StdRng,
    sample_origin: f64,
    sample_index: u64,
    pending_record: bool,
}

impl GillespieEngine {
    /// Set up a run: derive the initial edge set, then seed infected and
    /// vaccinated nodes uniformly at random.
    ///
    /// # Arguments
    /// * `network` - Network to run on (read only)
    /// * `config` - Epidemic configuration
    /// * `seed` - RNG seed; equal seeds give identical runs
    pub fn new(network: EpidemicNetwork<'_>, config: EpidemicConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        if network.n() != config.n {
            return Err(Error::InvalidConfig(format!(
                "network has {} nodes but configuration expects {}",
                network.n(),
                config.n
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let (driver, graph, t0) = match network {
            EpidemicNetwork::Temporal(temporal) => {
                let changes = temporal.to_edge_changes()?;
                let graph = DynamicGraph::from_edges(changes.n, &changes.edges_initial)?;
                let t0 = changes.t0;
                let period = changes.tmax - changes.t0;
                let schedule = Schedule {
                    changes,
                    next: 0,
                    offset: 0.0,
                    period,
                };
                (NetworkDriver::Scheduled(schedule), graph, t0)
            }
            EpidemicNetwork::Static(lists) => {
                lists.validate()?;
                let graph = DynamicGraph::from_edges(lists.n, &lists.edges[0])?;
                (NetworkDriver::Static, graph, lists.t0())
            }
            EpidemicNetwork::Activity(model) => {
                model.validate()?;
                let graph = model.initial_graph(&mut rng);
                (NetworkDriver::Activity(model.clone()), graph, model.t0)
            }
        };

        let infected = config.number_of_initially_infected;
        let vaccinated = config.number_of_initially_vaccinated;
        let mut status = vec![Compartment::Susceptible; config.n];
        for (k, node) in sample(&mut rng, config.n, infected + vaccinated).iter().enumerate() {
            status[node] = if k < infected {
                Compartment::Infected
            } else {
                Compartment::Recovered
            };
        }
        let table = TransitionTable::for_process(config.process);
        let state = EpidemicState::from_configuration(table, status, &graph, t0)?;

        Ok(Self {
            config,
            driver,
            graph,
            state,
            rng,
            sample_origin: t0,
            sample_index: 0,
            pending_record: true,
        })
    }

    /// Current clock time.
    #[inline]
    pub fn now(&self) -> f64 {
        self.state.last_active_time
    }

    pub fn config(&self) -> &EpidemicConfig {
        &self.config
    }

    pub fn state(&self) -> &EpidemicState {
        &self.state
    }

    pub fn graph(&self) -> &DynamicGraph {
        &self.graph
    }

    pub fn observables(&self) -> &Observables {
        self.state.observables()
    }

    /// Current statuses and edges.
    pub fn snapshot(&self) -> Configuration {
        self.state.configuration(&self.graph)
    }

    /// Run for the configured `t_simulation` and hand back the record.
    pub fn simulate(mut self) -> Result<SimulationResult> {
        let horizon = self.now() + self.config.t_simulation;
        let halt = self.run_until(horizon)?;
        Ok(SimulationResult {
            n: self.config.n,
            halt,
            observables: self.state.into_observables(),
        })
    }

    /// Advance the clock until `horizon` or until no infected node remains.
    pub fn run_until(&mut self, horizon: f64) -> Result<Halt> {
        loop {
            let now = self.now();
            if self.state.count(Compartment::Infected) == 0 {
                debug!(time = now, "reached disease-free state");
                return Ok(Halt::Absorbed { time: now });
            }
            if self.pending_record {
                if self.config.sampling_dt <= 0.0 {
                    self.record(now);
                }
                self.pending_record = false;
            }

            let hazards = self.hazards();
            let total = hazards.total();
            let t_event = if total > 0.0 {
                now - (1.0 - self.rng.gen::<f64>()).ln() / total
            } else {
                f64::INFINITY
            };

            match self.next_scheduled_change() {
                Some(t_change) if t_change < t_event && t_change <= horizon => {
                    self.sample_until(t_change, false);
                    self.state.last_active_time = t_change;
                    self.apply_scheduled_change(t_change)?;
                    continue;
                }
                None if total <= 0.0 => {
                    if self.config.sampling_dt > 0.0 {
                        self.sample_until(now, true);
                        self.record_if_new(now);
                    }
                    debug!(time = now, "no event can fire");
                    return Ok(Halt::Stalled { time: now });
                }
                _ => {}
            }

            if t_event > horizon {
                let end = horizon.max(now);
                self.sample_until(end, true);
                self.state.last_active_time = end;
                trace!(time = end, "reached horizon");
                return Ok(Halt::Completed { time: end });
            }

            self.sample_until(t_event, false);
            self.state.last_active_time = t_event;
            self.fire(&hazards, t_event)?;
        }
    }

    /// Reset statuses (and, for model-driven or static networks, the edge
    /// set) to an archived configuration at the current clock time.
    ///
    /// Replayed temporal networks keep the edge set their schedule dictates
    /// at the current time.
    pub fn restore(&mut self, configuration: &Configuration) -> Result<()> {
        match self.driver {
            NetworkDriver::Scheduled(_) => {}
            NetworkDriver::Static | NetworkDriver::Activity(_) => {
                self.graph.replace_edges(&configuration.edges)?;
            }
        }
        let now = self.now();
        self.state
            .reset_configuration(now, configuration.status.clone(), &self.graph)?;
        if self.config.sampling_dt > 0.0 {
            // off-grid, so the restored state holds from the restart onwards
            self.record(now);
        } else {
            self.pending_record = true;
        }
        Ok(())
    }

    /// Drop the record of the final, disease-free state if it was the last
    /// thing recorded at the current time.
    pub fn splice_absorption(&mut self) {
        let now = self.now();
        let observables = self.state.observables_mut();
        let absorbed_last = observables.infected.last() == Some(&0)
            && observables.last_time() == Some(now);
        if absorbed_last {
            observables.pop();
        }
    }

    fn hazards(&self) -> Hazards {
        let table = self.state.table();
        let config = &self.config;
        let mut hazards = Hazards::default();

        if table.allows(Transition::Infection) {
            hazards.infection = if config.process.is_node_based() {
                config.infection_rate * node_based_pressure(&self.state, &self.graph).1
            } else {
                config.infection_rate * self.state.si_edge_count() as f64
            };
        }
        if table.allows(Transition::Recovery) {
            hazards.recovery =
                config.recovery_rate * self.state.count(Compartment::Infected) as f64;
        }
        if table.allows(Transition::Waning) {
            hazards.waning =
                config.waning_immunity_rate * self.state.count(Compartment::Recovered) as f64;
        }
        if let NetworkDriver::Activity(model) = &self.driver {
            hazards.network = model.total_rate(&self.graph);
        }
        hazards
    }

    fn next_scheduled_change(&self) -> Option<f64> {
        match &self.driver {
            NetworkDriver::Scheduled(schedule) => schedule.next_time(),
            NetworkDriver::Static | NetworkDriver::Activity(_) => None,
        }
    }

    fn apply_scheduled_change(&mut self, time: f64) -> Result<()> {
        if let NetworkDriver::Scheduled(schedule) = &mut self.driver {
            schedule.apply_next(&mut self.graph, &mut self.state, time)?;
        }
        Ok(())
    }

    /// Pick one event proportional to its rate and apply it.
    fn fire(&mut self, hazards: &Hazards, time: f64) -> Result<()> {
        let weights = hazards.as_weights();
        let u = self.rng.gen::<f64>() * hazards.total();
        let Some(kind) = choose_weighted(&weights, u) else {
            return Ok(());
        };

        match kind {
            0 => {
                let target = pick_infection_target(
                    &self.state,
                    &self.graph,
                    self.config.process,
                    &mut self.rng,
                )?;
                self.state.apply(target, Transition::Infection, &self.graph)?;
                trace!(time, node = target, "infection");
            }
            1 => {
                let k = self.rng.gen_range(0..self.state.count(Compartment::Infected));
                let node = self.state.nth_infected(k).ok_or_else(|| {
                    Error::InvalidConfig(format!("no infected node at index {k}"))
                })?;
                self.state.apply(node, Transition::Recovery, &self.graph)?;
                trace!(time, node, "recovery");
            }
            2 => {
                let k = self.rng.gen_range(0..self.state.count(Compartment::Recovered));
                let node = self
                    .state
                    .nth_in(Compartment::Recovered, k)
                    .ok_or_else(|| Error::InvalidConfig(format!("no recovered node at index {k}")))?;
                self.state.apply(node, Transition::Waning, &self.graph)?;
                trace!(time, node, "waning");
            }
            _ => {
                if let NetworkDriver::Activity(model) = &self.driver {
                    if let Some(switch) = model.draw_switch(&self.graph, &mut self.rng) {
                        model.apply(&mut self.graph, switch, time)?;
                        match switch {
                            EdgeSwitch::On((i, j)) => self.state.on_edge_added(i, j),
                            EdgeSwitch::Off((i, j)) => self.state.on_edge_removed(i, j),
                        }
                    }
                }
                // edge switching does not change the counts
                return Ok(());
            }
        }

        // the disease-free state is recorded off-grid too
        if self.config.sampling_dt <= 0.0 || self.state.count(Compartment::Infected) == 0 {
            self.record(time);
        }
        Ok(())
    }

    fn record_if_new(&mut self, time: f64) {
        if self.state.observables().last_time() != Some(time) {
            self.record(time);
        }
    }

    fn record(&mut self, time: f64) {
        let r0 = self.state.reproduction_number(
            &self.graph,
            self.config.infection_rate,
            self.config.recovery_rate,
        );
        let counts = self.state.counts();
        self.state.observables_mut().push(time, counts, r0);
    }

    /// Record every grid point before `time` (or up to it, when `inclusive`)
    /// with the state currently in effect.
    fn sample_until(&mut self, time: f64, inclusive: bool) {
        let dt = self.config.sampling_dt;
        if dt <= 0.0 {
            return;
        }
        loop {
            let grid = self.sample_origin + dt * self.sample_index as f64;
            if grid < time || (inclusive && grid <= time) {
                self.record(grid);
                self.sample_index += 1;
            } else {
                break;
            }
        }
    }
}

/// Apply one batch of edge changes to the graph and the neighbour sets.
/// Everything is checked first, so a failing batch changes nothing.
fn apply_edge_event(
    graph: &mut DynamicGraph,
    state: &mut EpidemicState,
    edges_in: &[Edge],
    edges_out: &[Edge],
    time: f64,
) -> Result<()> {
    for &(i, j) in edges_out {
        if !graph.has_edge(i, j) {
            return Err(Error::inconsistent(
                time,
                crate::network::canonical_edge(i, j),
                "is removed but not present",
            ));
        }
    }
    for &(i, j) in edges_in {
        if graph.has_edge(i, j) {
            return Err(Error::inconsistent(
                time,
                crate::network::canonical_edge(i, j),
                "is added but already present",
            ));
        }
    }

    for &(i, j) in edges_out {
        graph.remove_edge(i, j, time)?;
        state.on_edge_removed(i, j);
    }
    for &(i, j) in edges_in {
        graph.insert_edge(i, j, time)?;
        state.on_edge_added(i, j);
    }
    Ok(())
}

/// Index of the first weight whose cumulative sum exceeds `u`; falls back to
/// the last positive weight when rounding pushes `u` past the total.
fn choose_weighted(weights: &[f64], u: f64) -> Option<usize> {
    let mut cumsum = 0.0;
    let mut last_positive = None;
    for (i, &w) in weights.iter().enumerate() {
        if w <= 0.0 {
            continue;
        }
        cumsum += w;
        last_positive = Some(i);
        if u < cumsum {
            return Some(i);
        }
    }
    last_positive
}

/// Per-infected weights `s_i / k_i` and their sum.
fn node_based_pressure(state: &EpidemicState, graph: &DynamicGraph) -> (Vec<f64>, f64) {
    let weights: Vec<f64> = state
        .infected_with_susceptible_neighbors()
        .map(|(node, set)| match graph.degree(node) {
            0 => 0.0,
            k => set.len() as f64 / k as f64,
        })
        .collect();
    let total = weights.iter().sum();
    (weights, total)
}

/// Susceptible node hit by the next infection event.
fn pick_infection_target(
    state: &EpidemicState,
    graph: &DynamicGraph,
    process: ProcessKind,
    rng: &mut StdRng,
) -> Result<usize> {
    let missing = || Error::InvalidConfig("infection drawn without S-I edges".to_string());

    if process.is_node_based() {
        let (weights, total) = node_based_pressure(state, graph);
        let chosen = choose_weighted(&weights, rng.gen::<f64>() * total).ok_or_else(missing)?;
        let (_, set) = state
            .infected_with_susceptible_neighbors()
            .nth(chosen)
            .ok_or_else(missing)?;
        let k = rng.gen_range(0..set.len());
        return set.iter().nth(k).copied().ok_or_else(missing);
    }

    let mut r = rng.gen_range(0..state.si_edge_count());
    for (_, set) in state.infected_with_susceptible_neighbors() {
        if r < set.len() {
            return set.iter().nth(r).copied().ok_or_else(missing);
        }
        r -= set.len();
    }
    Err(missing())
}

/// Run one full simulation.
pub fn simulate(
    network: EpidemicNetwork<'_>,
    config: &EpidemicConfig,
    seed: u64,
) -> Result<SimulationResult> {
    GillespieEngine::new(network, config.clone(), seed)?.simulate()
}

/// Simulate independent runs in parallel.
///
/// # Arguments
/// * `network` - Shared read-only network
/// * `config` - Epidemic configuration
/// * `n_runs` - Number of runs
/// * `seed` - Base RNG seed (run i gets seed + i)
pub fn simulate_ensemble_parallel(
    network: EpidemicNetwork<'_>,
    config: &EpidemicConfig,
    n_runs: usize,
    seed: u64,
) -> Result<Vec<SimulationResult>> {
    (0..n_runs)
        .into_par_iter()
        .map(|i| simulate(network, config, seed.wrapping_add(i as u64)))
        .collect()
}
