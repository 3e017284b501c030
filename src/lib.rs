//! Temporal networks, stochastic epidemics on them, and spectral epidemic
//! thresholds.
//!
//! - [`network`]: edge-lists / edge-changes representations, conversions,
//!   resampling onto an even grid, the edge activity model
//! - [`epidemics`]: SI/SIS/SIR/SIRS Gillespie engine, quasi-stationary
//!   controller, time averages
//! - [`spectral`]: leading eigenvalue of the linearised SIS propagator and
//!   critical rates
//!
//! With the `python` feature the main entry points are also exported as a
//! Python extension module.

pub mod epidemics;
pub mod error;
pub mod network;
pub mod spectral;

pub use epidemics::{
    measure_equilibrium, simulate, simulate_ensemble_parallel, simulate_quasi_stationary,
    time_average, time_average_std, EpidemicConfig, EpidemicNetwork, GillespieEngine, Halt,
    Observables, ProcessKind, QuasiStationaryConfig, QuasiStationaryReport, SimulationResult,
};
pub use error::{Error, Result};
pub use network::{
    canonical_edge, resample, resample_to_edge_changes, DynamicGraph, Edge, EdgeActivityModel,
    EdgeChanges, EdgeLists, SparseAdjacencyMatrices, TemporalNetwork,
};
pub use spectral::{
    sis_critical_infection_rate, sis_critical_recovery_rate, sis_max_eigenvalue, EigenOptions,
};

#[cfg(feature = "python")]
mod python {
    use numpy::{PyArray1, PyReadonlyArray1};
    use pyo3::prelude::*;
    use pyo3::types::PyDict;
    use pyo3::wrap_pyfunction;

    use crate::epidemics::{self, EpidemicConfig, EpidemicNetwork, QuasiStationaryConfig};
    use crate::network::{self, Edge, EdgeChanges, EdgeLists, SparseAdjacencyMatrices, TemporalNetwork};
    use crate::spectral::{self, EigenOptions};

    fn edge_lists_to_dict<'py>(py: Python<'py>, lists: EdgeLists) -> PyResult<&'py PyDict> {
        let dict = PyDict::new(py);
        dict.set_item("N", lists.n)?;
        dict.set_item("t", PyArray1::from_vec(py, lists.t))?;
        dict.set_item("tmax", lists.tmax)?;
        dict.set_item("edges", lists.edges)?;
        Ok(dict)
    }

    fn edge_changes_to_dict<'py>(py: Python<'py>, changes: EdgeChanges) -> PyResult<&'py PyDict> {
        let dict = PyDict::new(py);
        dict.set_item("N", changes.n)?;
        dict.set_item("t0", changes.t0)?;
        dict.set_item("tmax", changes.tmax)?;
        dict.set_item("t", PyArray1::from_vec(py, changes.t))?;
        dict.set_item("edges_initial", changes.edges_initial)?;
        dict.set_item("edges_in", changes.edges_in)?;
        dict.set_item("edges_out", changes.edges_out)?;
        Ok(dict)
    }

    /// Resample an edge-lists network onto `n_time_steps` even windows.
    ///
    /// # Returns
    /// * Dict with keys `N`, `t`, `tmax`, `edges`
    #[pyfunction]
    #[pyo3(signature = (n, t, tmax, edges, n_time_steps, sample_aggregates=false))]
    fn resample_edge_lists<'py>(
        py: Python<'py>,
        n: usize,
        t: PyReadonlyArray1<f64>,
        tmax: f64,
        edges: Vec<Vec<Edge>>,
        n_time_steps: usize,
        sample_aggregates: bool,
    ) -> PyResult<&'py PyDict> {
        let lists = EdgeLists::new(n, t.as_array().to_vec(), tmax, edges)?;
        let resampled =
            network::resample(&TemporalNetwork::Lists(lists), n_time_steps, sample_aggregates)?;
        edge_lists_to_dict(py, resampled)
    }

    /// Resample an edge-changes network onto `n_time_steps` even windows.
    #[pyfunction]
    #[pyo3(signature = (n, t0, tmax, t, edges_initial, edges_in, edges_out, n_time_steps, sample_aggregates=false))]
    #[allow(clippy::too_many_arguments)]
    fn resample_edge_changes<'py>(
        py: Python<'py>,
        n: usize,
        t0: f64,
        tmax: f64,
        t: PyReadonlyArray1<f64>,
        edges_initial: Vec<Edge>,
        edges_in: Vec<Vec<Edge>>,
        edges_out: Vec<Vec<Edge>>,
        n_time_steps: usize,
        sample_aggregates: bool,
    ) -> PyResult<&'py PyDict> {
        let changes = EdgeChanges::new(
            n,
            t0,
            tmax,
            t.as_array().to_vec(),
            edges_initial,
            edges_in,
            edges_out,
        )?;
        let resampled =
            network::resample(&TemporalNetwork::Changes(changes), n_time_steps, sample_aggregates)?;
        edge_lists_to_dict(py, resampled)
    }

    /// Convert edge lists to edge changes.
    #[pyfunction]
    fn convert_edge_lists_to_changes<'py>(
        py: Python<'py>,
        n: usize,
        t: PyReadonlyArray1<f64>,
        tmax: f64,
        edges: Vec<Vec<Edge>>,
    ) -> PyResult<&'py PyDict> {
        let lists = EdgeLists::new(n, t.as_array().to_vec(), tmax, edges)?;
        edge_changes_to_dict(py, lists.to_edge_changes()?)
    }

    /// Simulate SIS on a temporal network given as edge lists.
    ///
    /// # Returns
    /// * Dict with numpy arrays `time`, `I`, `SI` (S count), `R0` and the
    ///   flag `absorbed`
    #[pyfunction]
    #[pyo3(signature = (n, t, tmax, edges, t_simulation, infection_rate, recovery_rate, number_of_initially_infected=1, sampling_dt=0.0, is_static=false, seed=0))]
    #[allow(clippy::too_many_arguments)]
    fn simulate_sis<'py>(
        py: Python<'py>,
        n: usize,
        t: PyReadonlyArray1<f64>,
        tmax: f64,
        edges: Vec<Vec<Edge>>,
        t_simulation: f64,
        infection_rate: f64,
        recovery_rate: f64,
        number_of_initially_infected: usize,
        sampling_dt: f64,
        is_static: bool,
        seed: u64,
    ) -> PyResult<&'py PyDict> {
        let lists = EdgeLists::new(n, t.as_array().to_vec(), tmax, edges)?;
        let config = EpidemicConfig {
            number_of_initially_infected,
            sampling_dt,
            ..EpidemicConfig::sis(n, t_simulation, infection_rate, recovery_rate)
        };
        let temporal = TemporalNetwork::Lists(lists.clone());
        let network = if is_static {
            EpidemicNetwork::Static(&lists)
        } else {
            EpidemicNetwork::Temporal(&temporal)
        };
        let result = py.allow_threads(|| epidemics::simulate(network, &config, seed))?;

        let observables = result.observables;
        let dict = PyDict::new(py);
        dict.set_item("time", PyArray1::from_vec(py, observables.time))?;
        dict.set_item("I", PyArray1::from_vec(py, observables.infected))?;
        dict.set_item("SI", PyArray1::from_vec(py, observables.susceptible))?;
        dict.set_item("R0", PyArray1::from_vec(py, observables.r0))?;
        dict.set_item("absorbed", result.halt.is_absorbed())?;
        dict.set_item("stalled", result.halt.is_stalled())?;
        Ok(dict)
    }

    /// Quasi-stationary SIS on a temporal network given as edge lists.
    ///
    /// # Returns
    /// * `(rho, chi)`: QS prevalence and susceptibility
    #[pyfunction]
    #[pyo3(signature = (n, t, tmax, edges, t_simulation, infection_rate, recovery_rate, number_of_initially_infected=1, history_capacity=100, history_sampling_dt=1.0, is_static=false, seed=0))]
    #[allow(clippy::too_many_arguments)]
    fn simulate_quasi_stationary_sis(
        py: Python<'_>,
        n: usize,
        t: PyReadonlyArray1<f64>,
        tmax: f64,
        edges: Vec<Vec<Edge>>,
        t_simulation: f64,
        infection_rate: f64,
        recovery_rate: f64,
        number_of_initially_infected: usize,
        history_capacity: usize,
        history_sampling_dt: f64,
        is_static: bool,
        seed: u64,
    ) -> PyResult<(f64, f64)> {
        let lists = EdgeLists::new(n, t.as_array().to_vec(), tmax, edges)?;
        let config = QuasiStationaryConfig {
            epidemic: EpidemicConfig {
                number_of_initially_infected,
                ..EpidemicConfig::sis(n, t_simulation, infection_rate, recovery_rate)
            },
            history_capacity,
            history_sampling_dt,
            ..QuasiStationaryConfig::default()
        };
        let temporal = TemporalNetwork::Lists(lists.clone());
        let network = if is_static {
            EpidemicNetwork::Static(&lists)
        } else {
            EpidemicNetwork::Temporal(&temporal)
        };
        let report = py.allow_threads(|| epidemics::simulate_quasi_stationary(network, &config, seed))?;
        Ok(report.infection_observables()?)
    }

    /// Exact time average of a piecewise-constant series.
    #[pyfunction]
    #[pyo3(name = "time_average")]
    fn py_time_average(
        t: PyReadonlyArray1<f64>,
        values: PyReadonlyArray1<f64>,
        tmax: f64,
    ) -> PyResult<f64> {
        let t = t.as_array().to_vec();
        let values = values.as_array().to_vec();
        Ok(epidemics::time_average(&t, &values, tmax)?)
    }

    fn adjacency_sequence(
        n: usize,
        t: PyReadonlyArray1<f64>,
        tmax: f64,
        edges: Vec<Vec<Edge>>,
    ) -> PyResult<SparseAdjacencyMatrices> {
        let lists = EdgeLists::new(n, t.as_array().to_vec(), tmax, edges)?;
        Ok(SparseAdjacencyMatrices::from_edge_lists(&lists)?)
    }

    /// Leading eigenvalue of the linearised SIS propagator.
    #[pyfunction]
    #[pyo3(signature = (n, t, tmax, edges, infection_rate, recovery_rate, maxiter=10000, tol=1e-9))]
    #[allow(clippy::too_many_arguments)]
    fn sis_max_eigenvalue(
        py: Python<'_>,
        n: usize,
        t: PyReadonlyArray1<f64>,
        tmax: f64,
        edges: Vec<Vec<Edge>>,
        infection_rate: f64,
        recovery_rate: f64,
        maxiter: usize,
        tol: f64,
    ) -> PyResult<f64> {
        let sequence = adjacency_sequence(n, t, tmax, edges)?;
        let options = EigenOptions { maxiter, tol };
        Ok(py.allow_threads(|| {
            spectral::sis_max_eigenvalue(&sequence, infection_rate, recovery_rate, &options)
        })?)
    }

    /// Critical infection rate for a given recovery rate.
    ///
    /// # Returns
    /// * `(eta_c, mu_max at eta_c)`
    #[pyfunction]
    fn sis_critical_infection_rate(
        py: Python<'_>,
        n: usize,
        t: PyReadonlyArray1<f64>,
        tmax: f64,
        edges: Vec<Vec<Edge>>,
        recovery_rate: f64,
    ) -> PyResult<(f64, f64)> {
        let sequence = adjacency_sequence(n, t, tmax, edges)?;
        Ok(py.allow_threads(|| {
            spectral::sis_critical_infection_rate(&sequence, recovery_rate, &EigenOptions::default())
        })?)
    }

    /// Critical recovery rate for a given infection rate.
    ///
    /// # Returns
    /// * `(rho_c, mu_max at rho_c)`
    #[pyfunction]
    fn sis_critical_recovery_rate(
        py: Python<'_>,
        n: usize,
        t: PyReadonlyArray1<f64>,
        tmax: f64,
        edges: Vec<Vec<Edge>>,
        infection_rate: f64,
    ) -> PyResult<(f64, f64)> {
        let sequence = adjacency_sequence(n, t, tmax, edges)?;
        Ok(py.allow_threads(|| {
            spectral::sis_critical_recovery_rate(&sequence, infection_rate, &EigenOptions::default())
        })?)
    }

    #[pymodule]
    fn tempnet_rust(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(resample_edge_lists, m)?)?;
        m.add_function(wrap_pyfunction!(resample_edge_changes, m)?)?;
        m.add_function(wrap_pyfunction!(convert_edge_lists_to_changes, m)?)?;
        m.add_function(wrap_pyfunction!(simulate_sis, m)?)?;
        m.add_function(wrap_pyfunction!(simulate_quasi_stationary_sis, m)?)?;
        m.add_function(wrap_pyfunction!(py_time_average, m)?)?;
        m.add_function(wrap_pyfunction!(sis_max_eigenvalue, m)?)?;
        m.add_function(wrap_pyfunction!(sis_critical_infection_rate, m)?)?;
        m.add_function(wrap_pyfunction!(sis_critical_recovery_rate, m)?)?;
        Ok(())
    }
}
