//! Quasi-stationary simulation: restart-on-absorption with resampling from a
//! bounded history of visited configurations.
//!
//! The controller is an explicit two-phase machine. While `Running` it drives
//! the engine in chunks of `history_sampling_dt`, archiving one configuration
//! per chunk. When the engine reports absorption the controller moves to
//! `Absorbed`, draws a configuration uniformly from the history (or applies
//! the fallback) and resumes at the same clock time. Restart count and wall
//! clock are checked on every transition.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::gillespie::{EpidemicConfig, EpidemicNetwork, GillespieEngine, Halt};
use super::observables::{time_average, Observables};
use super::process::Compartment;
use super::state::Configuration;
use crate::error::{Error, Result};

/// What to restart from when the history cannot be used.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Fallback {
    /// Report `AbsorptionWithEmptyHistory`.
    #[default]
    None,
    /// Infect this many uniformly random nodes, everyone else susceptible.
    Reseed(usize),
    /// Restart from a fixed status vector on the current edge set.
    Configuration(Vec<Compartment>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuasiStationaryConfig {
    pub epidemic: EpidemicConfig,
    /// Maximum number of archived configurations; the oldest is dropped first.
    pub history_capacity: usize,
    /// Simulated time between two archived configurations.
    pub history_sampling_dt: f64,
    /// History size below which restarts use the fallback instead.
    pub min_history_size: usize,
    pub max_restarts: usize,
    pub wall_clock_budget: Option<Duration>,
    pub fallback: Fallback,
}

impl Default for QuasiStationaryConfig {
    fn default() -> Self {
        Self {
            epidemic: EpidemicConfig::default(),
            history_capacity: 100,
            history_sampling_dt: 1.0,
            min_history_size: 1,
            max_restarts: 10_000,
            wall_clock_budget: None,
            fallback: Fallback::None,
        }
    }
}

impl QuasiStationaryConfig {
    pub fn validate(&self) -> Result<()> {
        self.epidemic.validate()?;
        if self.epidemic.t_simulation <= 0.0 {
            return Err(Error::InvalidConfig(
                "quasi-stationary runs need t_simulation > 0".to_string(),
            ));
        }
        if self.history_capacity == 0 {
            return Err(Error::InvalidConfig("history_capacity must be positive".to_string()));
        }
        if !(self.history_sampling_dt.is_finite() && self.history_sampling_dt > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "history_sampling_dt={} must be finite and positive",
                self.history_sampling_dt
            )));
        }
        if self.min_history_size > self.history_capacity {
            return Err(Error::InvalidConfig(format!(
                "min_history_size {} exceeds history_capacity {}",
                self.min_history_size, self.history_capacity
            )));
        }
        match &self.fallback {
            Fallback::None => {}
            Fallback::Reseed(k) => {
                if *k == 0 || *k > self.epidemic.n {
                    return Err(Error::InvalidConfig(format!(
                        "cannot reseed {k} of {} nodes",
                        self.epidemic.n
                    )));
                }
            }
            Fallback::Configuration(status) => {
                if status.len() != self.epidemic.n {
                    return Err(Error::InvalidConfig(format!(
                        "fallback configuration has {} statuses for {} nodes",
                        status.len(),
                        self.epidemic.n
                    )));
                }
                if !status.contains(&Compartment::Infected) {
                    return Err(Error::InvalidConfig(
                        "fallback configuration has no infected node".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Bounded archive of visited configurations.
#[derive(Clone, Debug)]
pub struct QuasiStationaryHistory {
    capacity: usize,
    entries: VecDeque<Configuration>,
}

impl QuasiStationaryHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, configuration: Configuration) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(configuration);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Configuration> + '_ {
        self.entries.iter()
    }

    /// Uniformly random archived configuration.
    pub fn draw(&self, rng: &mut StdRng) -> Option<&Configuration> {
        if self.entries.is_empty() {
            return None;
        }
        self.entries.get(rng.gen_range(0..self.entries.len()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Phase {
    Running,
    Absorbed { time: f64 },
}

/// Result of a quasi-stationary run.
#[derive(Clone, Debug)]
pub struct QuasiStationaryReport {
    pub observables: Observables,
    pub n: usize,
    pub t_start: f64,
    pub tmax: f64,
    pub restarts: usize,
    pub history_size: usize,
}

impl QuasiStationaryReport {
    /// Time-averaged QS prevalence `⟨ρ⟩` and susceptibility
    /// `χ = N(⟨ρ²⟩ − ⟨ρ⟩²)/⟨ρ⟩`.
    pub fn infection_observables(&self) -> Result<(f64, f64)> {
        let rho = self.observables.prevalence(self.n);
        let rho_squared: Vec<f64> = rho.iter().map(|r| r * r).collect();
        let mean = time_average(&self.observables.time, &rho, self.tmax)?;
        let mean_squared = time_average(&self.observables.time, &rho_squared, self.tmax)?;
        let chi = if mean > 0.0 {
            self.n as f64 * (mean_squared - mean * mean) / mean
        } else {
            0.0
        };
        Ok((mean, chi))
    }
}

/// Restart-on-absorption controller around one engine.
pub struct QuasiStationarySimulation {
    engine: GillespieEngine,
    config: QuasiStationaryConfig,
    history: QuasiStationaryHistory,
    rng: StdRng,
    phase: Phase,
    restarts: usize,
    t_start: f64,
    next_archive: f64,
}

impl QuasiStationarySimulation {
    pub fn new(
        network: EpidemicNetwork<'_>,
        config: QuasiStationaryConfig,
        seed: u64,
    ) -> Result<Self> {
        config.validate()?;
        let engine = GillespieEngine::new(network, config.epidemic.clone(), seed)?;
        let t_start = engine.now();
        Ok(Self {
            engine,
            history: QuasiStationaryHistory::new(config.history_capacity),
            // separate stream for history draws, decorrelated from the engine
            rng: StdRng::seed_from_u64(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
            phase: Phase::Running,
            restarts: 0,
            t_start,
            next_archive: t_start + config.history_sampling_dt,
            config,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn restarts(&self) -> usize {
        self.restarts
    }

    pub fn history(&self) -> &QuasiStationaryHistory {
        &self.history
    }

    /// Run until `t_start + t_simulation`.
    pub fn run(mut self) -> Result<QuasiStationaryReport> {
        let started = Instant::now();
        let tmax = self.t_start + self.config.epidemic.t_simulation;

        loop {
            self.check_wall_clock(started)?;
            match self.phase {
                Phase::Running => {
                    let target = self.next_archive.min(tmax);
                    match self.engine.run_until(target)? {
                        Halt::Completed { time } if time >= tmax => break,
                        Halt::Completed { time } => {
                            self.history.push(self.engine.snapshot());
                            self.next_archive =
                                next_archive_time(time, self.config.history_sampling_dt, tmax);
                        }
                        Halt::Absorbed { time } => self.phase = Phase::Absorbed { time },
                        Halt::Stalled { time } => {
                            debug!(time, "epidemic frozen, nothing left to simulate");
                            break;
                        }
                    }
                }
                Phase::Absorbed { time } => {
                    if self.restarts >= self.config.max_restarts {
                        warn!(time, restarts = self.restarts, "restart budget exhausted");
                        return Err(Error::BudgetExhausted {
                            reason: format!(
                                "{} restarts reached at t={time}",
                                self.config.max_restarts
                            ),
                        });
                    }
                    self.restart(time)?;
                    self.restarts += 1;
                    self.phase = Phase::Running;
                }
            }
        }

        debug!(
            tmax,
            restarts = self.restarts,
            history = self.history.len(),
            "quasi-stationary run completed"
        );
        Ok(QuasiStationaryReport {
            n: self.config.epidemic.n,
            t_start: self.t_start,
            tmax,
            restarts: self.restarts,
            history_size: self.history.len(),
            observables: self.engine.observables().clone(),
        })
    }

    fn restart(&mut self, time: f64) -> Result<()> {
        self.engine.splice_absorption();

        let usable = self.history.len() >= self.config.min_history_size.max(1);
        let archived = if usable {
            self.history.draw(&mut self.rng).cloned()
        } else {
            None
        };
        let configuration = match archived {
            Some(configuration) => configuration,
            None => self.fallback_configuration(time)?,
        };
        self.engine.restore(&configuration)?;
        debug!(
            time,
            restart = self.restarts + 1,
            history = self.history.len(),
            archived_at = configuration.time,
            "restarted after absorption"
        );
        Ok(())
    }

    fn fallback_configuration(&mut self, time: f64) -> Result<Configuration> {
        let n = self.config.epidemic.n;
        let status = match &self.config.fallback {
            Fallback::None => {
                return Err(Error::AbsorptionWithEmptyHistory {
                    time,
                    partial: Box::new(self.engine.observables().clone()),
                });
            }
            Fallback::Reseed(k) => {
                let mut status = vec![Compartment::Susceptible; n];
                for node in sample(&mut self.rng, n, *k).iter() {
                    status[node] = Compartment::Infected;
                }
                status
            }
            Fallback::Configuration(status) => status.clone(),
        };
        Ok(Configuration {
            time,
            status,
            edges: self.engine.graph().sorted_edges(),
        })
    }

    fn check_wall_clock(&self, started: Instant) -> Result<()> {
        if let Some(budget) = self.config.wall_clock_budget {
            let elapsed = started.elapsed();
            if elapsed > budget {
                warn!(?elapsed, ?budget, "wall-clock budget exhausted");
                return Err(Error::BudgetExhausted {
                    reason: format!("wall clock {elapsed:?} exceeded {budget:?}"),
                });
            }
        }
        Ok(())
    }
}

/// Next archiving time after `time`. Once the clock is so large that adding
/// `dt` no longer moves it, archiving stops and the run goes to `tmax`.
fn next_archive_time(time: f64, dt: f64, tmax: f64) -> f64 {
    let next = time + dt;
    if next > time {
        next
    } else {
        warn!(time, dt, "archive interval below clock resolution");
        tmax
    }
}

/// Run one quasi-stationary simulation.
pub fn simulate_quasi_stationary(
    network: EpidemicNetwork<'_>,
    config: &QuasiStationaryConfig,
    seed: u64,
) -> Result<QuasiStationaryReport> {
    QuasiStationarySimulation::new(network, config.clone(), seed)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::EdgeLists;
    use approx::assert_relative_eq;

    fn complete(n: usize) -> EdgeLists {
        let mut edges = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                edges.push((i, j));
            }
        }
        EdgeLists::new(n, vec![0.0], 10.0, vec![edges]).unwrap()
    }

    fn qs_config(n: usize, t: f64, eta: f64) -> QuasiStationaryConfig {
        QuasiStationaryConfig {
            epidemic: EpidemicConfig {
                number_of_initially_infected: 2,
                ..EpidemicConfig::sis(n, t, eta, 1.0)
            },
            history_sampling_dt: 0.1,
            ..QuasiStationaryConfig::default()
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = QuasiStationaryHistory::new(2);
        for k in 0..5 {
            history.push(Configuration {
                time: k as f64,
                status: vec![Compartment::Infected],
                edges: vec![],
            });
        }
        assert_eq!(history.len(), 2);
        let times: Vec<f64> = history.iter().map(|c| c.time).collect();
        assert_eq!(times, vec![3.0, 4.0]);
    }

    #[test]
    fn test_supercritical_run_survives() {
        let lists = complete(30);
        let config = qs_config(30, 20.0, 0.5);
        let report = simulate_quasi_stationary(EpidemicNetwork::Static(&lists), &config, 1).unwrap();
        assert_eq!(report.tmax, 20.0);
        let (rho, chi) = report.infection_observables().unwrap();
        assert!(rho > 0.5);
        assert!(chi >= 0.0);
    }

    #[test]
    fn test_subcritical_run_restarts_and_never_records_zero() {
        let lists = complete(20);
        let config = QuasiStationaryConfig {
            fallback: Fallback::Reseed(1),
            ..qs_config(20, 50.0, 0.02)
        };
        let report = simulate_quasi_stationary(EpidemicNetwork::Static(&lists), &config, 7).unwrap();
        assert!(report.restarts > 0);
        assert!(report.observables.infected.iter().all(|&i| i > 0));
        let t = &report.observables.time;
        assert!(t.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_sampled_series_splices_absorption() {
        let lists = complete(20);
        let mut config = QuasiStationaryConfig {
            fallback: Fallback::Reseed(1),
            ..qs_config(20, 50.0, 0.02)
        };
        config.epidemic.sampling_dt = 0.5;
        let report = simulate_quasi_stationary(EpidemicNetwork::Static(&lists), &config, 7).unwrap();
        assert!(report.restarts > 0);
        assert!(report.observables.infected.iter().all(|&i| i > 0));
        assert!(report.observables.time.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_archive_time_always_advances() {
        assert_eq!(next_archive_time(1.0, 0.5, 10.0), 1.5);
        // 1e20 + 1 rounds back to 1e20
        assert_eq!(next_archive_time(1e20, 1.0, 2e20), 2e20);
    }

    #[test]
    fn test_frozen_epidemic_ends_run() {
        // no recovery and no susceptible neighbours: nothing can happen
        let lists = EdgeLists::new(4, vec![0.0], 1.0, vec![vec![]]).unwrap();
        let mut config = qs_config(4, 100.0, 1.0);
        config.epidemic.recovery_rate = 0.0;
        let report = simulate_quasi_stationary(EpidemicNetwork::Static(&lists), &config, 2).unwrap();
        assert_eq!(report.restarts, 0);
        assert_eq!(report.observables.infected, vec![2]);
        let (rho, chi) = report.infection_observables().unwrap();
        assert_relative_eq!(rho, 0.5);
        assert_relative_eq!(chi, 0.0);
    }

    #[test]
    fn test_absorption_without_history_is_reported() {
        let lists = EdgeLists::new(5, vec![0.0], 1.0, vec![vec![]]).unwrap();
        let config = QuasiStationaryConfig {
            min_history_size: 100,
            ..qs_config(5, 1000.0, 1.0)
        };
        let err = simulate_quasi_stationary(EpidemicNetwork::Static(&lists), &config, 3).unwrap_err();
        match err {
            Error::AbsorptionWithEmptyHistory { partial, .. } => assert!(!partial.is_empty()),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_restart_budget() {
        let lists = EdgeLists::new(5, vec![0.0], 1.0, vec![vec![]]).unwrap();
        let config = QuasiStationaryConfig {
            fallback: Fallback::Reseed(1),
            max_restarts: 3,
            ..qs_config(5, 1000.0, 1.0)
        };
        assert!(matches!(
            simulate_quasi_stationary(EpidemicNetwork::Static(&lists), &config, 3),
            Err(Error::BudgetExhausted { .. })
        ));
    }

    #[test]
    fn test_fixed_fallback_configuration() {
        let lists = EdgeLists::new(3, vec![0.0], 1.0, vec![vec![(0, 1)]]).unwrap();
        let status = vec![
            Compartment::Infected,
            Compartment::Susceptible,
            Compartment::Susceptible,
        ];
        let config = QuasiStationaryConfig {
            fallback: Fallback::Configuration(status),
            min_history_size: 50,
            history_capacity: 50,
            ..qs_config(3, 5.0, 0.1)
        };
        let report = simulate_quasi_stationary(EpidemicNetwork::Static(&lists), &config, 2).unwrap();
        assert!(report.observables.infected.iter().all(|&i| i > 0));
    }

    #[test]
    fn test_invalid_fallback() {
        let config = QuasiStationaryConfig {
            fallback: Fallback::Configuration(vec![Compartment::Susceptible; 10]),
            ..qs_config(10, 1.0, 1.0)
        };
        assert!(config.validate().is_err());
        let config = QuasiStationaryConfig {
            fallback: Fallback::Reseed(0),
            ..qs_config(10, 1.0, 1.0)
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_susceptibility_formula() {
        let mut observables = Observables::default();
        observables.push(0.0, [8, 2, 0], 0.0);
        observables.push(1.0, [6, 4, 0], 0.0);
        let report = QuasiStationaryReport {
            observables,
            n: 10,
            t_start: 0.0,
            tmax: 2.0,
            restarts: 0,
            history_size: 0,
        };
        let (rho, chi) = report.infection_observables().unwrap();
        assert_relative_eq!(rho, 0.3, epsilon = 1e-12);
        assert_relative_eq!(chi, 10.0 * 0.01 / 0.3, epsilon = 1e-12);
    }
}
