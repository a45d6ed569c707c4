// SPDX-License-Identifier: AGPL-3.0-only

//! Thin wrappers over the message-passing layer.
//!
//! The pipeline only ever talks to peers through scalar reductions, count
//! tables, and barriers, so the whole surface fits in the [`Collective`]
//! trait. [`MpiComm`] backs it with rsmpi collectives for production runs;
//! [`SoloComm`] gives single-rank identity semantics so every stage runs
//! under `cargo test` without an MPI launcher.
//!
//! Invariant inherited by every caller: collectives must appear in the same
//! source order on every rank. Nothing in this module may be called from a
//! rank-gated branch unless the matching call is issued on all peers.

use mpi::collective::SystemOperation;
use mpi::traits::*;

use crate::error::FloeError;

/// Scalar reductions, count-table reductions, and barriers over peer ranks.
pub trait Collective {
    /// This rank's index in `[0, size)`.
    fn rank(&self) -> usize;

    /// Number of peer ranks.
    fn size(&self) -> usize;

    /// Whether this rank produces the report files.
    fn is_root(&self) -> bool {
        self.rank() == 0
    }

    /// Global minimum of a per-rank scalar, available on every rank.
    fn all_reduce_min(&self, local: f64) -> f64;

    /// Global maximum of a per-rank scalar, available on every rank.
    fn all_reduce_max(&self, local: f64) -> f64;

    /// Global sum of a per-rank count, available on every rank.
    fn all_reduce_sum(&self, local: u64) -> u64;

    /// Element-wise global sum of a per-rank count table, on every rank.
    fn all_reduce_sum_table(&self, local: &[u64]) -> Vec<u64>;

    /// Element-wise global sum of a count table; `Some` on the root rank
    /// only, `None` elsewhere.
    fn reduce_sum_table_to_root(&self, local: &[u64]) -> Option<Vec<u64>>;

    /// Block until every rank arrives.
    fn barrier(&self);

    /// Tear down the communicator after a fatal error.
    fn abort(&self, code: i32) -> !;
}

/// [`Collective`] over an MPI communicator.
pub struct MpiComm<C: Communicator> {
    comm: C,
}

impl<C: Communicator> MpiComm<C> {
    /// Wrap a communicator (typically the world from `mpi::initialize`).
    pub const fn new(comm: C) -> Self {
        Self { comm }
    }
}

impl<C: Communicator> Collective for MpiComm<C> {
    fn rank(&self) -> usize {
        // MPI ranks and sizes are non-negative by contract.
        self.comm.rank() as usize
    }

    fn size(&self) -> usize {
        self.comm.size() as usize
    }

    fn all_reduce_min(&self, local: f64) -> f64 {
        let mut global = local;
        self.comm
            .all_reduce_into(&local, &mut global, SystemOperation::min());
        global
    }

    fn all_reduce_max(&self, local: f64) -> f64 {
        let mut global = local;
        self.comm
            .all_reduce_into(&local, &mut global, SystemOperation::max());
        global
    }

    fn all_reduce_sum(&self, local: u64) -> u64 {
        let mut global = 0u64;
        self.comm
            .all_reduce_into(&local, &mut global, SystemOperation::sum());
        global
    }

    fn all_reduce_sum_table(&self, local: &[u64]) -> Vec<u64> {
        let mut global = vec![0u64; local.len()];
        self.comm
            .all_reduce_into(local, &mut global[..], SystemOperation::sum());
        global
    }

    fn reduce_sum_table_to_root(&self, local: &[u64]) -> Option<Vec<u64>> {
        let root = self.comm.process_at_rank(0);
        if self.comm.rank() == 0 {
            let mut global = vec![0u64; local.len()];
            root.reduce_into_root(local, &mut global[..], SystemOperation::sum());
            Some(global)
        } else {
            root.reduce_into(local, SystemOperation::sum());
            None
        }
    }

    fn barrier(&self) {
        self.comm.barrier();
    }

    fn abort(&self, code: i32) -> ! {
        self.comm.abort(code)
    }
}

/// Identity [`Collective`] for single-rank runs and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoloComm;

impl Collective for SoloComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_min(&self, local: f64) -> f64 {
        local
    }

    fn all_reduce_max(&self, local: f64) -> f64 {
        local
    }

    fn all_reduce_sum(&self, local: u64) -> u64 {
        local
    }

    fn all_reduce_sum_table(&self, local: &[u64]) -> Vec<u64> {
        local.to_vec()
    }

    fn reduce_sum_table_to_root(&self, local: &[u64]) -> Option<Vec<u64>> {
        Some(local.to_vec())
    }

    fn barrier(&self) {}

    fn abort(&self, code: i32) -> ! {
        std::process::exit(code)
    }
}

/// Deterministic Cartesian layout of peer ranks over the simulation domain.
///
/// Ranks are ordered row-major with the last dimension varying fastest,
/// matching the decomposition recorded in snapshot headers. The layout is
/// pure metadata: the partition writer only needs each rank's coordinates
/// and the validated grid shape, not a topology handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartTopology {
    /// Ranks per dimension.
    pub dims: [usize; 3],
    /// This rank's coordinates within `dims`.
    pub coords: [usize; 3],
}

impl CartTopology {
    /// Lay out `size` ranks over `dims` and locate `rank` in the grid.
    ///
    /// # Errors
    ///
    /// [`FloeError::ConfigInvalid`] if the grid does not hold exactly
    /// `size` ranks, or `rank` is out of range.
    pub fn layout(rank: usize, size: usize, dims: [usize; 3]) -> Result<Self, FloeError> {
        let slots = dims[0]
            .checked_mul(dims[1])
            .and_then(|p| p.checked_mul(dims[2]))
            .ok_or_else(|| FloeError::ConfigInvalid("rank grid overflows".into()))?;
        if slots != size {
            return Err(FloeError::ConfigInvalid(format!(
                "rank grid {}x{}x{} holds {slots} ranks, communicator has {size}",
                dims[0], dims[1], dims[2]
            )));
        }
        if rank >= size {
            return Err(FloeError::ConfigInvalid(format!(
                "rank {rank} outside communicator of size {size}"
            )));
        }
        let coords = [
            rank / (dims[1] * dims[2]),
            (rank / dims[2]) % dims[1],
            rank % dims[2],
        ];
        Ok(Self { dims, coords })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn solo_reductions_are_identity() {
        let comm = SoloComm;
        assert_eq!(comm.rank(), 0);
        assert_eq!(comm.size(), 1);
        assert!(comm.is_root());
        assert!((comm.all_reduce_min(2.5) - 2.5).abs() < f64::EPSILON);
        assert!((comm.all_reduce_max(-1.0) + 1.0).abs() < f64::EPSILON);
        assert_eq!(comm.all_reduce_sum(41), 41);
        assert_eq!(comm.all_reduce_sum_table(&[1, 2, 3]), vec![1, 2, 3]);
    }

    #[test]
    fn solo_root_reduction_lands_on_root() {
        let comm = SoloComm;
        let table = comm.reduce_sum_table_to_root(&[7, 0, 9]);
        assert_eq!(table, Some(vec![7, 0, 9]));
    }

    #[test]
    fn cart_layout_row_major_last_fastest() {
        let topo = CartTopology::layout(5, 8, [2, 2, 2]).expect("valid grid");
        // rank 5 = coords (1, 0, 1): 1*4 + 0*2 + 1
        assert_eq!(topo.coords, [1, 0, 1]);
    }

    #[test]
    fn cart_layout_single_rank() {
        let topo = CartTopology::layout(0, 1, [1, 1, 1]).expect("valid grid");
        assert_eq!(topo.coords, [0, 0, 0]);
    }

    #[test]
    fn cart_layout_rejects_wrong_cardinality() {
        let err = CartTopology::layout(0, 4, [1, 2, 1]).unwrap_err();
        assert_eq!(err.kind(), "ConfigInvalid");
    }

    #[test]
    fn cart_layout_rejects_rank_outside_grid() {
        assert!(CartTopology::layout(9, 8, [2, 2, 2]).is_err());
    }

    #[test]
    fn cart_layout_covers_every_rank_uniquely() {
        let mut seen = std::collections::HashSet::new();
        for rank in 0..12 {
            let topo = CartTopology::layout(rank, 12, [3, 2, 2]).expect("valid grid");
            assert!(seen.insert(topo.coords), "coords reused at rank {rank}");
        }
        assert_eq!(seen.len(), 12);
    }
}
