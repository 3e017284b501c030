//! Sparse adjacency view of a snapshot sequence.
//!
//! Compressed Sparse Row storage, one symmetric 0/1 matrix per snapshot.
//! Read-only; used by the spectral threshold estimator.

use ndarray::Array2;

use super::EdgeLists;
use crate::error::Result;

/// Compressed Sparse Row (CSR) square matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct CsrMatrix {
    /// Number of rows (and columns).
    pub n: usize,
    /// Row i has entries `row_ptr[i]..row_ptr[i+1]`.
    pub row_ptr: Vec<usize>,
    /// Column index of each stored entry.
    pub col_idx: Vec<usize>,
    /// Value of each stored entry.
    pub values: Vec<f64>,
}

impl CsrMatrix {
    /// Symmetric 0/1 adjacency matrix of an undirected edge list.
    pub fn from_undirected_edges(n: usize, edges: &[(usize, usize)]) -> Self {
        let mut rows: Vec<Vec<usize>> = vec![Vec::new(); n];
        for &(i, j) in edges {
            rows[i].push(j);
            rows[j].push(i);
        }

        let mut row_ptr = Vec::with_capacity(n + 1);
        let mut col_idx = Vec::with_capacity(2 * edges.len());
        row_ptr.push(0);
        for row in &mut rows {
            row.sort_unstable();
            col_idx.extend_from_slice(row);
            row_ptr.push(col_idx.len());
        }
        let values = vec![1.0; col_idx.len()];

        Self {
            n,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Entries of row `i` as `(column, value)`.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let start = self.row_ptr.get(i).copied().unwrap_or(0);
        let end = self.row_ptr.get(i + 1).copied().unwrap_or(start);
        self.col_idx[start..end]
            .iter()
            .copied()
            .zip(self.values[start..end].iter().copied())
    }

    /// Dense copy.
    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::<f64>::zeros((self.n, self.n));
        for i in 0..self.n {
            for (j, value) in self.row(i) {
                dense[[i, j]] = value;
            }
        }
        dense
    }
}

/// Adjacency matrices aligned with the snapshots of an edge-lists network.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseAdjacencyMatrices {
    pub n: usize,
    pub t: Vec<f64>,
    pub tmax: f64,
    pub adjacency_matrices: Vec<CsrMatrix>,
}

impl SparseAdjacencyMatrices {
    /// Build the matrix sequence from validated edge lists.
    pub fn from_edge_lists(lists: &EdgeLists) -> Result<Self> {
        let lists = lists.canonicalized();
        lists.validate()?;
        let adjacency_matrices = lists
            .edges
            .iter()
            .map(|edges| CsrMatrix::from_undirected_edges(lists.n, edges))
            .collect();
        Ok(Self {
            n: lists.n,
            t: lists.t,
            tmax: lists.tmax,
            adjacency_matrices,
        })
    }

    /// Length of the interval snapshot `i` is active for.
    pub fn interval(&self, i: usize) -> f64 {
        let start = self.t[i];
        let end = self.t.get(i + 1).copied().unwrap_or(self.tmax);
        end - start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csr_is_symmetric() {
        let a = CsrMatrix::from_undirected_edges(3, &[(0, 1), (1, 2)]);
        assert_eq!(a.nnz(), 4);
        let dense = a.to_dense();
        assert_eq!(dense, dense.t());
        assert_eq!(dense[[1, 0]], 1.0);
        assert_eq!(dense[[0, 2]], 0.0);
    }

    #[test]
    fn test_sequence_intervals() {
        let lists = EdgeLists::new(
            3,
            vec![0.0, 1.0, 2.5],
            4.0,
            vec![vec![(0, 1)], vec![(1, 2), (0, 2)], vec![]],
        )
        .unwrap();
        let seq = SparseAdjacencyMatrices::from_edge_lists(&lists).unwrap();
        assert_eq!(seq.adjacency_matrices.len(), 3);
        assert_eq!(seq.interval(0), 1.0);
        assert_eq!(seq.interval(1), 1.5);
        assert_eq!(seq.interval(2), 1.5);
        assert_eq!(seq.adjacency_matrices[2].nnz(), 0);
    }
}
