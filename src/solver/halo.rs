//! Halo setup and exchange for distributed vectors.
//!
//! A distributed vector stores this rank's owned entries first and ghost
//! copies of neighbor-owned entries after them. Setup derives the ghost
//! numbering and the per-neighbor send/receive regions from the matrix's
//! global column indices; exchange fills the ghost tail with current values
//! from the owning ranks before each SpMV or smoother sweep.
//!
//! Both sides of an exchange compute their index lists independently: the
//! stencil is structurally symmetric, so the rows rank P must send to rank Q
//! are exactly the columns P references from Q, mirrored. Ordering is pinned
//! on both sides (neighbors by ascending rank, entries by ascending global
//! index), so no index lists ever travel over the wire.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{MultigrainError, Result};
use crate::geometry::Geometry;
use crate::solver::comm::{CommunicationBackend, HaloNeighbor};
use crate::sparse::SparseMatrix;

/// Precomputed neighbor communication metadata for one matrix. Immutable
/// after setup; a function of sparsity pattern and partition only.
#[derive(Debug, Clone, Default)]
pub struct HaloExchange {
    /// Neighbors in ascending rank order. Receive regions tile the ghost
    /// tail contiguously in this order.
    pub neighbors: Vec<HaloNeighbor>,
    /// Total entries sent per exchange.
    pub total_to_send: usize,
    /// Total ghost entries received per exchange.
    pub ghost_count: usize,
}

/// Local index of an owned global grid point.
fn local_index_of_global(geometry: &Geometry, gid: u64) -> usize {
    let (gix, giy, giz) = geometry.global_coords(gid);
    let ix = gix - geometry.gix0;
    let iy = giy - geometry.giy0;
    let iz = giz - geometry.giz0;
    iz * geometry.nx * geometry.ny + iy * geometry.nx + ix
}

/// Build halo metadata for `a` and rewrite its global column indices to
/// local numbering (owned rows first, ghost entries after).
pub fn setup_halo(a: &mut SparseMatrix) -> Result<()> {
    let geometry = &a.geometry;
    let rank = geometry.rank;

    // Ghost columns grouped by owning rank; owned rows referenced by each
    // neighbor. BTree ordering pins the wire order on both sides.
    let mut recv_from: BTreeMap<usize, BTreeSet<u64>> = BTreeMap::new();
    let mut send_to: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();

    for i in 0..a.local_rows {
        for &gid in &a.cols_global[a.row_ptr[i]..a.row_ptr[i + 1]] {
            if gid >= a.total_rows {
                return Err(MultigrainError::Setup(format!(
                    "column {gid} outside the global grid of {} rows",
                    a.total_rows
                )));
            }
            let owner = geometry.rank_of_global(gid);
            if owner != rank {
                recv_from.entry(owner).or_default().insert(gid);
                send_to.entry(owner).or_default().insert(i);
            }
        }
    }

    // Assign ghost indices: neighbors in ascending rank order, entries in
    // ascending global order within each neighbor.
    let mut ghost_of: HashMap<u64, usize> = HashMap::new();
    let mut neighbors = Vec::with_capacity(recv_from.len());
    let mut recv_start = 0;
    let mut total_to_send = 0;
    for (&nbr_rank, gids) in &recv_from {
        for &gid in gids {
            let next = a.local_rows + ghost_of.len();
            ghost_of.insert(gid, next);
        }
        let recv_count = gids.len();
        let send_indices: Vec<usize> = send_to[&nbr_rank].iter().copied().collect();
        total_to_send += send_indices.len();
        neighbors.push(HaloNeighbor {
            rank: nbr_rank,
            send_indices,
            recv_start,
            recv_count,
        });
        recv_start += recv_count;
    }
    let ghost_count = recv_start;

    // Localize column indices.
    let mut cols = Vec::with_capacity(a.cols_global.len());
    for &gid in &a.cols_global {
        let local = if geometry.rank_of_global(gid) == rank {
            local_index_of_global(geometry, gid)
        } else {
            ghost_of[&gid]
        };
        cols.push(local);
    }

    a.cols = cols;
    a.local_cols = a.local_rows + ghost_count;
    a.halo = HaloExchange {
        neighbors,
        total_to_send,
        ghost_count,
    };
    Ok(())
}

/// Fill the ghost tail of `x` with current values from neighboring ranks.
///
/// Precondition for SpMV and SYMGS; the only inter-process synchronization
/// in the iteration hot loop.
pub fn exchange_halo(a: &SparseMatrix, x: &mut [f64], comm: &dyn CommunicationBackend) {
    debug_assert!(x.len() >= a.local_cols);
    let (owned, rest) = x.split_at_mut(a.local_rows);
    comm.halo_exchange(&a.halo.neighbors, owned, &mut rest[..a.halo.ghost_count]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::sparse::SparseMatrix;

    /// 1D chain of 4 global points split across 2 ranks, tridiagonal stencil.
    fn two_rank_chain(rank: usize) -> SparseMatrix {
        let geometry = Geometry::new(2, rank, 2, 1, 1, Some((2, 1, 1))).unwrap();
        let base = (rank * 2) as u64;
        let local_to_global = vec![base, base + 1];
        let rows: Vec<Vec<(u64, f64)>> = (base..base + 2)
            .map(|g| {
                let mut row = Vec::new();
                if g > 0 {
                    row.push((g - 1, -1.0));
                }
                row.push((g, 4.0));
                if g + 1 < 4 {
                    row.push((g + 1, -1.0));
                }
                row
            })
            .collect();
        let mut a = SparseMatrix::assemble(geometry, local_to_global, rows).unwrap();
        setup_halo(&mut a).unwrap();
        a
    }

    #[test]
    fn single_rank_has_no_neighbors() {
        let geometry = Geometry::new(1, 0, 3, 1, 1, None).unwrap();
        let rows: Vec<Vec<(u64, f64)>> = (0u64..3)
            .map(|g| {
                let mut row = Vec::new();
                if g > 0 {
                    row.push((g - 1, -1.0));
                }
                row.push((g, 2.0));
                if g < 2 {
                    row.push((g + 1, -1.0));
                }
                row
            })
            .collect();
        let mut a = SparseMatrix::assemble(geometry, (0..3).collect(), rows).unwrap();
        setup_halo(&mut a).unwrap();

        assert!(a.halo.neighbors.is_empty());
        assert_eq!(a.local_cols, a.local_rows);
        // With one rank, local numbering equals global numbering.
        let as_global: Vec<u64> = a.cols.iter().map(|&c| c as u64).collect();
        assert_eq!(as_global, a.cols_global);
    }

    #[test]
    fn two_rank_chain_send_recv_are_mirrored() {
        let a0 = two_rank_chain(0);
        let a1 = two_rank_chain(1);

        assert_eq!(a0.halo.neighbors.len(), 1);
        assert_eq!(a1.halo.neighbors.len(), 1);
        let n0 = &a0.halo.neighbors[0];
        let n1 = &a1.halo.neighbors[0];
        assert_eq!(n0.rank, 1);
        assert_eq!(n1.rank, 0);

        // Rank 0 sends its row for gid 1 (local 1) and receives gid 2.
        assert_eq!(n0.send_indices, vec![1]);
        assert_eq!(n0.recv_count, 1);
        // Rank 1 sends its row for gid 2 (local 0) and receives gid 1.
        assert_eq!(n1.send_indices, vec![0]);
        assert_eq!(n1.recv_count, 1);

        // Counts mirror each other.
        assert_eq!(n0.send_indices.len(), n1.recv_count);
        assert_eq!(n1.send_indices.len(), n0.recv_count);

        // Ghost columns sit past the owned rows.
        assert_eq!(a0.local_cols, 3);
        assert_eq!(a0.cols, vec![0, 1, 0, 1, 2]);
        assert_eq!(a1.local_cols, 3);
        // Rank 1's rows reference ghost gid 1 at local index 2.
        assert_eq!(a1.cols, vec![2, 0, 1, 0, 1]);
    }

    #[test]
    fn ghost_ordering_is_ascending_global_per_neighbor() {
        let a1 = two_rank_chain(1);
        // Ghost gids for each neighbor must ascend so both sides agree on
        // wire order without exchanging index lists.
        let mut seen: Vec<u64> = a1
            .cols_global
            .iter()
            .zip(&a1.cols)
            .filter(|&(_, &c)| c >= a1.local_rows)
            .map(|(&g, _)| g)
            .collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen, vec![1]);
    }
}
