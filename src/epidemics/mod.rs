//! Stochastic compartmental epidemics on temporal networks.
//!
//! This module provides:
//! - process: compartments, transitions and per-variant transition tables
//! - state: per-node automaton with susceptible-neighbour bookkeeping
//! - observables: recorded series and exact time averages
//! - gillespie: the event-driven simulation engine
//! - quasi_stationary: restart-on-absorption controller
//! - measure: equilibrium prevalence and R0

pub mod gillespie;
pub mod measure;
pub mod observables;
pub mod process;
pub mod quasi_stationary;
pub mod state;

pub use gillespie::{
    simulate, simulate_ensemble_parallel, EpidemicConfig, EpidemicNetwork, GillespieEngine, Halt,
    SimulationResult,
};
pub use measure::{measure_equilibrium, Equilibrium};
pub use observables::{time_average, time_average_std, Observables};
pub use process::{Compartment, ProcessKind, Transition, TransitionRule, TransitionTable};
pub use quasi_stationary::{
    simulate_quasi_stationary, Fallback, Phase, QuasiStationaryConfig, QuasiStationaryHistory,
    QuasiStationaryReport, QuasiStationarySimulation,
};
pub use state::{Configuration, EpidemicState};
