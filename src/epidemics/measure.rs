//! Equilibrium measurements over a single trajectory.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::gillespie::{simulate, EpidemicConfig, EpidemicNetwork};
use super::observables::{time_average, time_average_std, Observables};
use crate::error::{Error, Result};

/// Time-averaged steady-state observables of one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Equilibrium {
    /// Mean infected fraction after equilibration.
    pub i_inf: f64,
    /// Its time-averaged standard deviation.
    pub i_inf_std: f64,
    /// Mean R0 estimate after equilibration.
    pub r0: f64,
}

/// Simulate once and average prevalence and R0 over
/// `[t_start + t_equilibrate, t_start + t_simulation]`.
///
/// A run that dies out before the equilibration period ends reports zero
/// prevalence and the last R0 recorded while infected nodes were present.
pub fn measure_equilibrium(
    network: EpidemicNetwork<'_>,
    config: &EpidemicConfig,
    t_equilibrate: f64,
    seed: u64,
) -> Result<Equilibrium> {
    if !(t_equilibrate >= 0.0 && t_equilibrate < config.t_simulation) {
        return Err(Error::InvalidConfig(format!(
            "t_equilibrate={t_equilibrate} must lie in [0, t_simulation={})",
            config.t_simulation
        )));
    }

    let result = simulate(network, config, seed)?;
    let observables = &result.observables;
    let Some(&t_start) = observables.time.first() else {
        return Ok(Equilibrium::default());
    };
    let t_from = t_start + t_equilibrate;
    let tmax = t_start + config.t_simulation;

    if result.halt.is_absorbed() && result.halt.time() <= t_from {
        debug!(time = result.halt.time(), "died out before equilibration");
        return Ok(Equilibrium {
            r0: last_infected_r0(observables),
            ..Equilibrium::default()
        });
    }

    let (t, infected, r0) = window_from(observables, t_from, config.n);
    let equilibrium = Equilibrium {
        i_inf: time_average(&t, &infected, tmax)?,
        i_inf_std: time_average_std(&t, &infected, tmax)?,
        r0: time_average(&t, &r0, tmax)?,
    };
    debug!(
        i_inf = equilibrium.i_inf,
        r0 = equilibrium.r0,
        "measured equilibrium"
    );
    Ok(equilibrium)
}

/// Series restricted to `t >= t_from`, starting with the state in effect at
/// `t_from`.
fn window_from(observables: &Observables, t_from: f64, n: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let prevalence = observables.prevalence(n);
    let first = observables
        .time
        .iter()
        .rposition(|&t| t <= t_from)
        .unwrap_or(0);

    let mut t = vec![t_from];
    let mut infected = vec![prevalence[first]];
    let mut r0 = vec![observables.r0[first]];
    for k in (first + 1)..observables.len() {
        t.push(observables.time[k]);
        infected.push(prevalence[k]);
        r0.push(observables.r0[k]);
    }
    (t, infected, r0)
}

fn last_infected_r0(observables: &Observables) -> f64 {
    observables
        .infected
        .iter()
        .zip(&observables.r0)
        .rev()
        .find(|&(&i, _)| i > 0)
        .map_or(0.0, |(_, &r0)| r0)
}
