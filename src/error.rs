//! Error types shared by the network model, the epidemic engine and the
//! spectral estimator.

use crate::epidemics::observables::Observables;
use crate::epidemics::process::{Compartment, ProcessKind, Transition};
use crate::network::Edge;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Primary error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Self-loop, duplicate edge, out-of-range node id or broken timestamp layout.
    #[error("malformed network: {reason}")]
    MalformedNetwork {
        /// What exactly is wrong, including the offending timestamp/edge.
        reason: String,
    },

    /// An edge add/remove that does not apply to the current edge set.
    #[error("inconsistent event at t={time}: edge {edge:?} {reason}")]
    InconsistentEvent {
        /// Timestamp of the offending event.
        time: f64,
        /// The edge the event refers to.
        edge: Edge,
        /// Why it could not be applied.
        reason: String,
    },

    /// Resampling onto fewer than one window.
    #[error("cannot resample onto {n_time_steps} time steps")]
    InvalidResampling {
        /// The requested window count.
        n_time_steps: usize,
    },

    /// A compartment transition the active process does not allow.
    #[error("illegal transition {transition:?} for node {node} in compartment {from:?} ({process:?})")]
    IllegalTransition {
        /// Node the transition was applied to.
        node: usize,
        /// The rejected transition.
        transition: Transition,
        /// The node's compartment at the time.
        from: Compartment,
        /// Active process variant.
        process: ProcessKind,
    },

    /// The quasi-stationary controller was absorbed and had nothing to restart from.
    #[error("absorbed at t={time} with no usable history and no fallback")]
    AbsorptionWithEmptyHistory {
        /// Clock time of the absorption.
        time: f64,
        /// Observables recorded up to the absorption.
        partial: Box<Observables>,
    },

    /// The eigenvalue solver did not converge.
    #[error("numerical instability after {iterations} iterations: {detail}")]
    NumericalInstability {
        /// Iterations performed.
        iterations: usize,
        /// Human-readable explanation.
        detail: String,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed input to a time average.
    #[error("invalid series: {0}")]
    InvalidSeries(String),

    /// Restart or wall-clock limit of the quasi-stationary controller reached.
    #[error("budget exhausted: {reason}")]
    BudgetExhausted {
        /// Which limit was hit.
        reason: String,
    },
}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedNetwork {
            reason: reason.into(),
        }
    }

    pub(crate) fn inconsistent(time: f64, edge: Edge, reason: impl Into<String>) -> Self {
        Error::InconsistentEvent {
            time,
            edge,
            reason: reason.into(),
        }
    }
}

#[cfg(feature = "python")]
impl From<Error> for pyo3::PyErr {
    fn from(err: Error) -> Self {
        pyo3::PyErr::new::<pyo3::exceptions::PyValueError, _>(err.to_string())
    }
}
