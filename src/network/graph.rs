//! Mutable current edge set owned by one simulation run.
//!
//! Keeps neighbour sets for the epidemic bookkeeping and a dense edge vector
//! (with swap-remove positions) so a uniformly random edge can be drawn in O(1).

use std::collections::{BTreeSet, HashMap};

use super::{canonical_edge, Edge};
use crate::error::{Error, Result};

#[derive(Clone, Debug, Default)]
pub struct DynamicGraph {
    neighbors: Vec<BTreeSet<usize>>,
    edges: Vec<Edge>,
    position: HashMap<Edge, usize>,
}

impl DynamicGraph {
    /// Graph on `n` nodes without edges.
    pub fn empty(n: usize) -> Self {
        Self {
            neighbors: vec![BTreeSet::new(); n],
            edges: Vec::new(),
            position: HashMap::new(),
        }
    }

    /// Graph on `n` nodes with the given edges.
    pub fn from_edges(n: usize, edges: &[Edge]) -> Result<Self> {
        let mut graph = Self::empty(n);
        for &(i, j) in edges {
            graph.check_pair(i, j)?;
            if graph.has_edge(i, j) {
                return Err(Error::malformed(format!("duplicate edge ({i}, {j})")));
            }
            graph.link(canonical_edge(i, j));
        }
        Ok(graph)
    }

    #[inline]
    pub fn n(&self) -> usize {
        self.neighbors.len()
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Number of node pairs, i.e. the edge count of the complete graph.
    pub fn pair_count(&self) -> usize {
        let n = self.n();
        n * n.saturating_sub(1) / 2
    }

    #[inline]
    pub fn degree(&self, node: usize) -> usize {
        self.neighbors.get(node).map_or(0, BTreeSet::len)
    }

    /// Neighbours of `node` in ascending order.
    pub fn neighbors(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.neighbors.get(node).into_iter().flatten().copied()
    }

    pub fn has_edge(&self, i: usize, j: usize) -> bool {
        self.position.contains_key(&canonical_edge(i, j))
    }

    /// Edge stored at `index` of the dense edge vector.
    pub fn edge_at(&self, index: usize) -> Option<Edge> {
        self.edges.get(index).copied()
    }

    /// Current edges, sorted.
    pub fn sorted_edges(&self) -> Vec<Edge> {
        let mut edges = self.edges.clone();
        edges.sort_unstable();
        edges
    }

    /// Switch an edge on. Fails, leaving the graph unchanged, if it is present.
    pub fn insert_edge(&mut self, i: usize, j: usize, time: f64) -> Result<Edge> {
        self.check_pair(i, j)?;
        let edge = canonical_edge(i, j);
        if self.position.contains_key(&edge) {
            return Err(Error::inconsistent(time, edge, "is added but already present"));
        }
        self.link(edge);
        Ok(edge)
    }

    /// Switch an edge off. Fails, leaving the graph unchanged, if it is absent.
    pub fn remove_edge(&mut self, i: usize, j: usize, time: f64) -> Result<Edge> {
        let edge = canonical_edge(i, j);
        let Some(index) = self.position.remove(&edge) else {
            return Err(Error::inconsistent(time, edge, "is removed but not present"));
        };
        self.edges.swap_remove(index);
        if let Some(&moved) = self.edges.get(index) {
            self.position.insert(moved, index);
        }
        self.neighbors[edge.0].remove(&edge.1);
        self.neighbors[edge.1].remove(&edge.0);
        Ok(edge)
    }

    /// Replace the whole edge set.
    pub fn replace_edges(&mut self, edges: &[Edge]) -> Result<()> {
        *self = Self::from_edges(self.n(), edges)?;
        Ok(())
    }

    fn check_pair(&self, i: usize, j: usize) -> Result<()> {
        if i == j {
            return Err(Error::malformed(format!("self-loop ({i}, {j})")));
        }
        let n = self.n();
        if i >= n || j >= n {
            return Err(Error::malformed(format!(
                "edge ({i}, {j}) out of range for N={n}"
            )));
        }
        Ok(())
    }

    fn link(&mut self, edge: Edge) {
        self.position.insert(edge, self.edges.len());
        self.edges.push(edge);
        self.neighbors[edge.0].insert(edge.1);
        self.neighbors[edge.1].insert(edge.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_remove() {
        let mut graph = DynamicGraph::from_edges(4, &[(0, 1), (2, 1)]).unwrap();
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.degree(1), 2);

        graph.insert_edge(3, 0, 1.0).unwrap();
        assert!(graph.has_edge(0, 3));
        graph.remove_edge(1, 0, 2.0).unwrap();
        assert!(!graph.has_edge(0, 1));
        assert_eq!(graph.sorted_edges(), vec![(0, 3), (1, 2)]);
        assert_eq!(graph.neighbors(1).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_swap_remove_keeps_positions() {
        let mut graph = DynamicGraph::from_edges(4, &[(0, 1), (1, 2), (2, 3)]).unwrap();
        graph.remove_edge(0, 1, 0.5).unwrap();
        graph.remove_edge(2, 3, 0.6).unwrap();
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edge_at(0), Some((1, 2)));
        graph.remove_edge(1, 2, 0.7).unwrap();
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_double_insert_is_inconsistent() {
        let mut graph = DynamicGraph::from_edges(3, &[(0, 1)]).unwrap();
        let err = graph.insert_edge(1, 0, 3.0).unwrap_err();
        assert!(matches!(err, Error::InconsistentEvent { time, .. } if time == 3.0));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_remove_absent_is_inconsistent() {
        let mut graph = DynamicGraph::empty(3);
        assert!(matches!(
            graph.remove_edge(0, 2, 1.0).unwrap_err(),
            Error::InconsistentEvent { .. }
        ));
    }

    #[test]
    fn test_pair_count() {
        assert_eq!(DynamicGraph::empty(5).pair_count(), 10);
        assert_eq!(DynamicGraph::empty(0).pair_count(), 0);
    }
}
