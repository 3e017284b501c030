//! Temporal network model.
//!
//! This module provides:
//! - EdgeLists / EdgeChanges: snapshot and event representations
//! - TemporalNetwork: sum type over both, with lossless conversions
//! - DynamicGraph: the mutable current edge set a simulation owns
//! - resample: projection onto an even time grid
//! - SparseAdjacencyMatrices: CSR view for the spectral estimator
//! - EdgeActivityModel: exogenous-rate edge switching

pub mod activity;
pub mod adjacency;
pub mod graph;
pub mod resample;
pub mod temporal;

pub use activity::{simulate_edge_activity, EdgeActivityModel};
pub use adjacency::{CsrMatrix, SparseAdjacencyMatrices};
pub use graph::DynamicGraph;
pub use resample::{resample, resample_to_edge_changes};
pub use temporal::{EdgeChanges, EdgeLists, TemporalNetwork};

/// Undirected edge between two node ids.
pub type Edge = (usize, usize);

/// Order the endpoints so the smaller id comes first.
#[inline]
pub fn canonical_edge(i: usize, j: usize) -> Edge {
    if j < i {
        (j, i)
    } else {
        (i, j)
    }
}
