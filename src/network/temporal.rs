//! Snapshot ("edge lists") and event ("edge changes") representations of a
//! temporal network, and the lossless conversions between them.
//!
//! Both describe the same thing: a sequence of edge-set states over
//! `[t0, tmax]`. Edge lists store every state in full; edge changes store the
//! initial state plus add/remove deltas. Converted outputs are canonical
//! (every pair stored as `(min, max)`, every edge list sorted), so equality of
//! two converted networks is equality of their edge sets.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{canonical_edge, Edge};
use crate::error::{Error, Result};

/// Temporal network as a sequence of complete edge sets.
///
/// `edges[i]` is active on `[t[i], t[i+1])`, the last one until `tmax`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeLists {
    /// Number of nodes.
    pub n: usize,
    /// Strictly increasing snapshot times.
    pub t: Vec<f64>,
    /// End of the observation window.
    pub tmax: f64,
    /// One undirected edge list per timestamp.
    pub edges: Vec<Vec<Edge>>,
}

/// Temporal network as an initial edge set plus add/remove events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeChanges {
    /// Number of nodes.
    pub n: usize,
    /// Start of the observation window; `edges_initial` is active from here.
    pub t0: f64,
    /// End of the observation window.
    pub tmax: f64,
    /// Strictly increasing event times in `(t0, tmax]`.
    pub t: Vec<f64>,
    /// Edge set at `t0`.
    pub edges_initial: Vec<Edge>,
    /// Edges switched on at `t[i]`.
    pub edges_in: Vec<Vec<Edge>>,
    /// Edges switched off at `t[i]`.
    pub edges_out: Vec<Vec<Edge>>,
}

/// Either representation of a temporal network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TemporalNetwork {
    /// Snapshot representation.
    Lists(EdgeLists),
    /// Event representation.
    Changes(EdgeChanges),
}

impl EdgeLists {
    /// Build and validate an edge-lists network.
    pub fn new(n: usize, t: Vec<f64>, tmax: f64, edges: Vec<Vec<Edge>>) -> Result<Self> {
        let lists = Self { n, t, tmax, edges };
        lists.validate()?;
        Ok(lists)
    }

    /// Start time, i.e. the first snapshot time.
    pub fn t0(&self) -> f64 {
        self.t.first().copied().unwrap_or(self.tmax)
    }

    /// Check timestamps and every snapshot.
    pub fn validate(&self) -> Result<()> {
        if self.t.is_empty() {
            return Err(Error::malformed("edge lists contain no snapshot"));
        }
        if self.t.len() != self.edges.len() {
            return Err(Error::malformed(format!(
                "{} timestamps but {} edge lists",
                self.t.len(),
                self.edges.len()
            )));
        }
        check_timestamps(&self.t, None, self.tmax)?;
        for (&time, edges) in self.t.iter().zip(&self.edges) {
            edge_set(self.n, edges, time)?;
        }
        Ok(())
    }

    /// Difference consecutive snapshots into an event sequence.
    pub fn to_edge_changes(&self) -> Result<EdgeChanges> {
        self.validate()?;

        let mut current = edge_set(self.n, &self.edges[0], self.t[0])?;
        let edges_initial: Vec<Edge> = current.iter().copied().collect();

        let mut edges_in = Vec::with_capacity(self.t.len() - 1);
        let mut edges_out = Vec::with_capacity(self.t.len() - 1);
        for (&time, edges) in self.t.iter().zip(&self.edges).skip(1) {
            let next = edge_set(self.n, edges, time)?;
            edges_in.push(next.difference(&current).copied().collect());
            edges_out.push(current.difference(&next).copied().collect());
            current = next;
        }

        Ok(EdgeChanges {
            n: self.n,
            t0: self.t[0],
            tmax: self.tmax,
            t: self.t[1..].to_vec(),
            edges_initial,
            edges_in,
            edges_out,
        })
    }

    /// Copy with every edge canonical and every snapshot sorted.
    pub fn canonicalized(&self) -> Self {
        Self {
            n: self.n,
            t: self.t.clone(),
            tmax: self.tmax,
            edges: self
                .edges
                .iter()
                .map(|edges| {
                    edges
                        .iter()
                        .map(|&(i, j)| canonical_edge(i, j))
                        .collect::<BTreeSet<_>>()
                        .into_iter()
                        .collect()
                })
                .collect(),
        }
    }
}

impl EdgeChanges {
    /// Build and validate an edge-changes network.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        n: usize,
        t0: f64,
        tmax: f64,
        t: Vec<f64>,
        edges_initial: Vec<Edge>,
        edges_in: Vec<Vec<Edge>>,
        edges_out: Vec<Vec<Edge>>,
    ) -> Result<Self> {
        let changes = Self {
            n,
            t0,
            tmax,
            t,
            edges_initial,
            edges_in,
            edges_out,
        };
        changes.validate()?;
        Ok(changes)
    }

    /// Structural checks: lengths, timestamps, edge well-formedness, and no
    /// edge both added and removed at the same time. Applicability against the
    /// running edge set is checked by replaying (`to_edge_lists`).
    pub fn validate(&self) -> Result<()> {
        if self.t.len() != self.edges_in.len() || self.t.len() != self.edges_out.len() {
            return Err(Error::malformed(format!(
                "{} timestamps, {} edges_in lists, {} edges_out lists",
                self.t.len(),
                self.edges_in.len(),
                self.edges_out.len()
            )));
        }
        if !self.t0.is_finite() || self.tmax < self.t0 {
            return Err(Error::malformed(format!(
                "invalid window [{}, {}]",
                self.t0, self.tmax
            )));
        }
        check_timestamps(&self.t, Some(self.t0), self.tmax)?;
        edge_set(self.n, &self.edges_initial, self.t0)?;

        for ((&time, ins), outs) in self.t.iter().zip(&self.edges_in).zip(&self.edges_out) {
            let ins = edge_set(self.n, ins, time)?;
            let outs = edge_set(self.n, outs, time)?;
            if let Some(&edge) = ins.intersection(&outs).next() {
                return Err(Error::inconsistent(
                    time,
                    edge,
                    "is both added and removed",
                ));
            }
        }
        Ok(())
    }

    /// Replay the events against the initial edge set, one snapshot per event
    /// time plus the initial one.
    pub fn to_edge_lists(&self) -> Result<EdgeLists> {
        self.validate()?;

        let mut current = edge_set(self.n, &self.edges_initial, self.t0)?;
        let mut t = Vec::with_capacity(self.t.len() + 1);
        let mut edges = Vec::with_capacity(self.t.len() + 1);
        t.push(self.t0);
        edges.push(current.iter().copied().collect());

        for (index, &time) in self.t.iter().enumerate() {
            apply_event(&mut current, time, &self.edges_in[index], &self.edges_out[index])?;
            t.push(time);
            edges.push(current.iter().copied().collect());
        }

        Ok(EdgeLists {
            n: self.n,
            t,
            tmax: self.tmax,
            edges,
        })
    }

    /// Number of change events.
    pub fn len(&self) -> usize {
        self.t.len()
    }

    /// True when the network never changes.
    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }
}

impl TemporalNetwork {
    /// Number of nodes.
    pub fn n(&self) -> usize {
        match self {
            TemporalNetwork::Lists(lists) => lists.n,
            TemporalNetwork::Changes(changes) => changes.n,
        }
    }

    /// Start of the observation window.
    pub fn t0(&self) -> f64 {
        match self {
            TemporalNetwork::Lists(lists) => lists.t0(),
            TemporalNetwork::Changes(changes) => changes.t0,
        }
    }

    /// End of the observation window.
    pub fn tmax(&self) -> f64 {
        match self {
            TemporalNetwork::Lists(lists) => lists.tmax,
            TemporalNetwork::Changes(changes) => changes.tmax,
        }
    }

    /// Validate the wrapped representation.
    pub fn validate(&self) -> Result<()> {
        match self {
            TemporalNetwork::Lists(lists) => lists.validate(),
            TemporalNetwork::Changes(changes) => changes.to_edge_lists().map(|_| ()),
        }
    }

    /// Snapshot representation.
    pub fn to_edge_lists(&self) -> Result<EdgeLists> {
        match self {
            TemporalNetwork::Lists(lists) => {
                lists.validate()?;
                Ok(lists.canonicalized())
            }
            TemporalNetwork::Changes(changes) => changes.to_edge_lists(),
        }
    }

    /// Event representation.
    pub fn to_edge_changes(&self) -> Result<EdgeChanges> {
        match self {
            TemporalNetwork::Lists(lists) => lists.to_edge_changes(),
            TemporalNetwork::Changes(changes) => {
                // replaying checks applicability, differencing canonicalizes
                changes.to_edge_lists()?.to_edge_changes()
            }
        }
    }
}

impl From<EdgeLists> for TemporalNetwork {
    fn from(lists: EdgeLists) -> Self {
        TemporalNetwork::Lists(lists)
    }
}

impl From<EdgeChanges> for TemporalNetwork {
    fn from(changes: EdgeChanges) -> Self {
        TemporalNetwork::Changes(changes)
    }
}

/// Canonical edge set of one snapshot or event list.
///
/// Fails on self-loops, out-of-range ids and duplicates (in either orientation).
pub(crate) fn edge_set(n: usize, edges: &[Edge], time: f64) -> Result<BTreeSet<Edge>> {
    let mut set = BTreeSet::new();
    for &(i, j) in edges {
        if i == j {
            return Err(Error::malformed(format!("self-loop ({i}, {j}) at t={time}")));
        }
        if i >= n || j >= n {
            return Err(Error::malformed(format!(
                "edge ({i}, {j}) at t={time} out of range for N={n}"
            )));
        }
        if !set.insert(canonical_edge(i, j)) {
            return Err(Error::malformed(format!("duplicate edge ({i}, {j}) at t={time}")));
        }
    }
    Ok(set)
}

/// Apply one event to `current`. Everything is checked before anything is
/// mutated, so a failing event leaves `current` untouched.
pub(crate) fn apply_event(
    current: &mut BTreeSet<Edge>,
    time: f64,
    edges_in: &[Edge],
    edges_out: &[Edge],
) -> Result<()> {
    for &(i, j) in edges_out {
        let edge = canonical_edge(i, j);
        if !current.contains(&edge) {
            return Err(Error::inconsistent(time, edge, "is removed but not present"));
        }
    }
    for &(i, j) in edges_in {
        let edge = canonical_edge(i, j);
        if current.contains(&edge) && !edges_out.iter().any(|&(a, b)| canonical_edge(a, b) == edge) {
            return Err(Error::inconsistent(time, edge, "is added but already present"));
        }
    }

    for &(i, j) in edges_out {
        current.remove(&canonical_edge(i, j));
    }
    for &(i, j) in edges_in {
        current.insert(canonical_edge(i, j));
    }
    Ok(())
}

fn check_timestamps(t: &[f64], t0: Option<f64>, tmax: f64) -> Result<()> {
    if !tmax.is_finite() {
        return Err(Error::malformed(format!("tmax={tmax} is not finite")));
    }
    if let Some(&first) = t.first() {
        if !first.is_finite() {
            return Err(Error::malformed(format!("timestamp {first} is not finite")));
        }
    }
    for window in t.windows(2) {
        if !(window[0] < window[1]) {
            return Err(Error::malformed(format!(
                "timestamps not strictly increasing: {} then {}",
                window[0], window[1]
            )));
        }
    }
    if let (Some(t0), Some(&first)) = (t0, t.first()) {
        if !(first > t0) {
            return Err(Error::malformed(format!(
                "event at t={first} not after t0={t0}"
            )));
        }
    }
    if let Some(&last) = t.last() {
        if !last.is_finite() || last > tmax {
            return Err(Error::malformed(format!(
                "timestamp {last} beyond tmax={tmax}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boundary_lists() -> EdgeLists {
        EdgeLists::new(
            3,
            vec![0.0, 1.0, 2.0],
            3.0,
            vec![vec![(0, 1)], vec![(1, 2), (0, 2)], vec![(0, 1)]],
        )
        .unwrap()
    }

    fn boundary_changes() -> EdgeChanges {
        EdgeChanges::new(
            3,
            0.0,
            3.0,
            vec![1.0, 2.0],
            vec![(0, 1)],
            vec![vec![(1, 2), (0, 2)], vec![(0, 1)]],
            vec![vec![(0, 1)], vec![(1, 2), (0, 2)]],
        )
        .unwrap()
    }

    #[test]
    fn test_changes_replay_to_snapshots() {
        let lists = boundary_changes().to_edge_lists().unwrap();
        assert_eq!(lists, boundary_lists().canonicalized());
        assert_eq!(lists.t, vec![0.0, 1.0, 2.0]);
        assert_eq!(lists.edges[1], vec![(0, 2), (1, 2)]);
    }

    #[test]
    fn test_snapshots_difference_to_changes() {
        let changes = boundary_lists().to_edge_changes().unwrap();
        assert_eq!(changes.t0, 0.0);
        assert_eq!(changes.t, vec![1.0, 2.0]);
        assert_eq!(changes.edges_initial, vec![(0, 1)]);
        assert_eq!(changes.edges_in[0], vec![(0, 2), (1, 2)]);
        assert_eq!(changes.edges_out[0], vec![(0, 1)]);
        assert_eq!(changes.edges_in[1], vec![(0, 1)]);
        assert_eq!(changes.edges_out[1], vec![(0, 2), (1, 2)]);
    }

    #[test]
    fn test_round_trip_both_ways() {
        let lists = boundary_lists().canonicalized();
        let back = lists.to_edge_changes().unwrap().to_edge_lists().unwrap();
        assert_eq!(back, lists);

        let changes = lists.to_edge_changes().unwrap();
        let again = changes.to_edge_lists().unwrap().to_edge_changes().unwrap();
        assert_eq!(again, changes);
    }

    #[test]
    fn test_self_loop_rejected() {
        let err = EdgeLists::new(3, vec![0.0], 1.0, vec![vec![(1, 1)]]).unwrap_err();
        assert!(matches!(err, Error::MalformedNetwork { .. }));
    }

    #[test]
    fn test_duplicate_in_either_orientation_rejected() {
        let err = EdgeLists::new(3, vec![0.0], 1.0, vec![vec![(0, 1), (1, 0)]]).unwrap_err();
        assert!(matches!(err, Error::MalformedNetwork { .. }));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let err = EdgeLists::new(3, vec![0.0], 1.0, vec![vec![(0, 3)]]).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_removing_absent_edge_is_inconsistent() {
        let changes = EdgeChanges {
            n: 3,
            t0: 0.0,
            tmax: 2.0,
            t: vec![1.0],
            edges_initial: vec![(0, 1)],
            edges_in: vec![vec![]],
            edges_out: vec![vec![(1, 2)]],
        };
        match changes.to_edge_lists().unwrap_err() {
            Error::InconsistentEvent { time, edge, .. } => {
                assert_eq!(time, 1.0);
                assert_eq!(edge, (1, 2));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_adding_present_edge_is_inconsistent() {
        let changes = EdgeChanges {
            n: 3,
            t0: 0.0,
            tmax: 2.0,
            t: vec![1.0],
            edges_initial: vec![(0, 1)],
            edges_in: vec![vec![(1, 0)]],
            edges_out: vec![vec![]],
        };
        assert!(matches!(
            changes.to_edge_lists().unwrap_err(),
            Error::InconsistentEvent { .. }
        ));
    }

    #[test]
    fn test_edge_in_and_out_at_same_time_rejected() {
        let changes = EdgeChanges {
            n: 3,
            t0: 0.0,
            tmax: 2.0,
            t: vec![1.0],
            edges_initial: vec![(0, 1)],
            edges_in: vec![vec![(0, 1)]],
            edges_out: vec![vec![(0, 1)]],
        };
        assert!(matches!(
            changes.validate().unwrap_err(),
            Error::InconsistentEvent { .. }
        ));
    }

    #[test]
    fn test_failed_event_leaves_set_untouched() {
        let mut current: BTreeSet<Edge> = [(0, 1), (1, 2)].into_iter().collect();
        let before = current.clone();
        let result = apply_event(&mut current, 1.0, &[(0, 2)], &[(0, 1), (2, 3)]);
        assert!(result.is_err());
        assert_eq!(current, before);
    }

    #[test]
    fn test_infinite_first_snapshot_rejected() {
        let err = EdgeLists::new(2, vec![f64::NEG_INFINITY, 0.0], 1.0, vec![vec![], vec![]])
            .unwrap_err();
        assert!(matches!(err, Error::MalformedNetwork { .. }));
    }

    #[test]
    fn test_event_times_must_lie_after_t0() {
        let err = EdgeChanges::new(
            2,
            1.0,
            3.0,
            vec![1.0],
            vec![],
            vec![vec![(0, 1)]],
            vec![vec![]],
        )
        .unwrap_err();
        assert!(matches!(err, Error::MalformedNetwork { .. }));
    }

    #[test]
    fn test_non_increasing_snapshots_rejected() {
        let err = EdgeLists::new(2, vec![0.0, 0.0], 1.0, vec![vec![], vec![]]).unwrap_err();
        assert!(matches!(err, Error::MalformedNetwork { .. }));
    }

    #[test]
    fn test_enum_accessors() {
        let network = TemporalNetwork::from(boundary_changes());
        assert_eq!(network.n(), 3);
        assert_eq!(network.t0(), 0.0);
        assert_eq!(network.tmax(), 3.0);
        assert_eq!(network.to_edge_lists().unwrap().edges.len(), 3);
    }
}
