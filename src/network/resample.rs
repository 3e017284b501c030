//! Projection of a temporal network onto `K` evenly spaced windows.
//!
//! The window grid partitions `[t0, tmax)` into `K` half-open windows of equal
//! width. The output has one snapshot per window, stamped with the window's
//! left boundary, so `N`, `t0` and `tmax` carry over unchanged.
//!
//! Two policies:
//! - last state: the window's edge set is the input's edge set at the window's
//!   right boundary (events exactly at that boundary included)
//! - aggregate: the union of every edge active at any instant inside the window

use std::collections::BTreeSet;

use tracing::debug;

use super::temporal::{apply_event, edge_set};
use super::{Edge, EdgeChanges, EdgeLists, TemporalNetwork};
use crate::error::{Error, Result};

/// Resample onto `n_time_steps` windows, returning edge lists.
///
/// # Arguments
/// * `network` - Input in either representation
/// * `n_time_steps` - Number of output windows `K` (at least 1)
/// * `sample_aggregates` - Union over each window instead of the last state
pub fn resample(
    network: &TemporalNetwork,
    n_time_steps: usize,
    sample_aggregates: bool,
) -> Result<EdgeLists> {
    if n_time_steps < 1 {
        return Err(Error::InvalidResampling { n_time_steps });
    }
    let changes = network.to_edge_changes()?;
    let mut sweep = Sweep::new(&changes)?;

    let t0 = changes.t0;
    let tmax = changes.tmax;
    let span = tmax - t0;
    if n_time_steps > 1 && !(span > 0.0) {
        return Err(Error::malformed(format!(
            "cannot split the empty span [{t0}, {tmax}] into {n_time_steps} windows"
        )));
    }
    let boundary = |k: usize| {
        if k >= n_time_steps {
            tmax
        } else {
            t0 + span * (k as f64) / (n_time_steps as f64)
        }
    };

    let mut t = Vec::with_capacity(n_time_steps);
    let mut edges = Vec::with_capacity(n_time_steps);
    for k in 0..n_time_steps {
        let left = boundary(k);
        let right = boundary(k + 1);
        t.push(left);

        if sample_aggregates {
            sweep.advance(|time| time <= left, None)?;
            let mut union = sweep.current.clone();
            sweep.advance(|time| time < right, Some(&mut union))?;
            edges.push(union.into_iter().collect());
        } else {
            sweep.advance(|time| time <= right, None)?;
            edges.push(sweep.current.iter().copied().collect());
        }
    }

    debug!(
        n_time_steps,
        sample_aggregates,
        n_events = changes.len(),
        "resampled temporal network"
    );

    Ok(EdgeLists {
        n: changes.n,
        t,
        tmax,
        edges,
    })
}

/// Resample onto `n_time_steps` windows, returning edge changes.
pub fn resample_to_edge_changes(
    network: &TemporalNetwork,
    n_time_steps: usize,
    sample_aggregates: bool,
) -> Result<EdgeChanges> {
    resample(network, n_time_steps, sample_aggregates)?.to_edge_changes()
}

/// Single forward pass over the event sequence.
struct Sweep<'a> {
    changes: &'a EdgeChanges,
    next: usize,
    current: BTreeSet<Edge>,
}

impl<'a> Sweep<'a> {
    fn new(changes: &'a EdgeChanges) -> Result<Self> {
        Ok(Self {
            changes,
            next: 0,
            current: edge_set(changes.n, &changes.edges_initial, changes.t0)?,
        })
    }

    /// Apply every pending event whose time satisfies `include`, recording
    /// switched-on edges in `union` when given.
    fn advance(
        &mut self,
        include: impl Fn(f64) -> bool,
        mut union: Option<&mut BTreeSet<Edge>>,
    ) -> Result<()> {
        while let Some(&time) = self.changes.t.get(self.next) {
            if !include(time) {
                break;
            }
            let edges_in = &self.changes.edges_in[self.next];
            apply_event(
                &mut self.current,
                time,
                edges_in,
                &self.changes.edges_out[self.next],
            )?;
            if let Some(union) = union.as_deref_mut() {
                union.extend(edges_in.iter().map(|&(i, j)| super::canonical_edge(i, j)));
            }
            self.next += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lists() -> TemporalNetwork {
        EdgeLists::new(
            3,
            vec![0.0, 1.0, 2.0],
            3.0,
            vec![vec![(0, 1)], vec![(1, 2), (0, 2)], vec![(0, 1)]],
        )
        .unwrap()
        .into()
    }

    fn changes() -> TemporalNetwork {
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
        .into()
    }

    #[test]
    fn test_zero_windows_rejected() {
        assert!(matches!(
            resample(&lists(), 0, false).unwrap_err(),
            Error::InvalidResampling { n_time_steps: 0 }
        ));
    }

    #[test]
    fn test_empty_span_allows_single_window_only() {
        let instant = EdgeLists::new(3, vec![0.0], 0.0, vec![vec![(0, 1)]]).unwrap();
        let network = TemporalNetwork::from(instant.clone());
        assert!(matches!(
            resample(&network, 3, false),
            Err(Error::MalformedNetwork { .. })
        ));
        assert!(resample_to_edge_changes(&network, 3, true).is_err());
        assert_eq!(resample(&network, 1, false).unwrap(), instant);
    }

    #[test]
    fn test_window_grid() {
        let out = resample(&lists(), 5, false).unwrap();
        assert_eq!(out.n, 3);
        assert_eq!(out.tmax, 3.0);
        assert_eq!(out.t.len(), 5);
        assert_eq!(out.t[0], 0.0);
        for (k, &t) in out.t.iter().enumerate() {
            assert!((t - 0.6 * k as f64).abs() < 1e-12);
        }
    }

    #[test]
    fn test_last_state_at_right_boundary() {
        // windows [0,1), [1,2), [2,3)
        let out = resample(&lists(), 3, false).unwrap();
        assert_eq!(out.edges[0], vec![(0, 2), (1, 2)]);
        assert_eq!(out.edges[1], vec![(0, 1)]);
        assert_eq!(out.edges[2], vec![(0, 1)]);
    }

    #[test]
    fn test_last_state_between_events() {
        // right boundaries 0.6, 1.2, 1.8, 2.4, 3.0
        let out = resample(&lists(), 5, false).unwrap();
        assert_eq!(out.edges[0], vec![(0, 1)]);
        assert_eq!(out.edges[1], vec![(0, 2), (1, 2)]);
        assert_eq!(out.edges[2], vec![(0, 2), (1, 2)]);
        assert_eq!(out.edges[3], vec![(0, 1)]);
        assert_eq!(out.edges[4], vec![(0, 1)]);
    }

    #[test]
    fn test_aggregate_unions_each_window() {
        let out = resample(&lists(), 5, true).unwrap();
        // [0,0.6) only (0,1); [0.6,1.2) sees both states
        assert_eq!(out.edges[0], vec![(0, 1)]);
        assert_eq!(out.edges[1], vec![(0, 1), (0, 2), (1, 2)]);
        assert_eq!(out.edges[2], vec![(0, 2), (1, 2)]);
        assert_eq!(out.edges[3], vec![(0, 1), (0, 2), (1, 2)]);
        assert_eq!(out.edges[4], vec![(0, 1)]);
    }

    #[test]
    fn test_aggregate_excludes_edge_removed_at_left_boundary() {
        let out = resample(&lists(), 3, true).unwrap();
        assert_eq!(out.edges[0], vec![(0, 1)]);
        assert_eq!(out.edges[1], vec![(0, 2), (1, 2)]);
        assert_eq!(out.edges[2], vec![(0, 1)]);
    }

    #[test]
    fn test_both_representations_agree() {
        for aggregate in [false, true] {
            assert_eq!(
                resample(&lists(), 7, aggregate).unwrap(),
                resample(&changes(), 7, aggregate).unwrap()
            );
        }
    }

    #[test]
    fn test_more_windows_than_events() {
        let out = resample(&lists(), 30, false).unwrap();
        assert_eq!(out.t.len(), 30);
        assert!(out.validate().is_ok());
    }

    #[test]
    fn test_single_window_is_final_state() {
        let out = resample(&lists(), 1, false).unwrap();
        assert_eq!(out.t, vec![0.0]);
        assert_eq!(out.edges, vec![vec![(0, 1)]]);

        let out = resample(&lists(), 1, true).unwrap();
        assert_eq!(out.edges, vec![vec![(0, 1), (0, 2), (1, 2)]]);
    }

    #[test]
    fn test_resample_to_changes() {
        let out = resample_to_edge_changes(&changes(), 3, false).unwrap();
        assert_eq!(out.t0, 0.0);
        assert_eq!(out.t, vec![1.0, 2.0]);
        assert_eq!(out.edges_initial, vec![(0, 2), (1, 2)]);
    }
}
