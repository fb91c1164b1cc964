//! 3D Cartesian domain decomposition.
//!
//! Each rank owns one box-shaped subdomain of the global grid. The process
//! grid (npx, npy, npz) is either given explicitly or chosen as the most
//! cubic factorization of the rank count. The z axis additionally supports
//! non-uniform slabs, where consecutive bands of process layers carry
//! different local nz.

use crate::error::{MultigrainError, Result};

/// A band of process layers along z that all share the same local nz.
///
/// `end_ipz` is the first process-z coordinate past this slab, so slabs
/// partition 0..npz when walked in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZSlab {
    pub end_ipz: usize,
    pub nz: usize,
}

/// Immutable description of this rank's subdomain within the global grid.
#[derive(Debug, Clone)]
pub struct Geometry {
    /// Total number of ranks.
    pub size: usize,
    /// This process's rank.
    pub rank: usize,
    /// Local grid extents owned by this rank.
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    /// Process grid extents.
    pub npx: usize,
    pub npy: usize,
    pub npz: usize,
    /// This rank's coordinates in the process grid.
    pub ipx: usize,
    pub ipy: usize,
    pub ipz: usize,
    /// Global grid extents.
    pub gnx: usize,
    pub gny: usize,
    pub gnz: usize,
    /// Global index of this rank's first grid point along each axis.
    pub gix0: usize,
    pub giy0: usize,
    pub giz0: usize,
    /// z-slab partition table, in ascending `end_ipz` order covering 0..npz.
    pub z_slabs: Vec<ZSlab>,
}

impl Geometry {
    /// Build the geometry for one rank of a `size`-process decomposition of
    /// an (nx, ny, nz)-per-rank uniform grid.
    ///
    /// `process_grid` fixes (npx, npy, npz) when given; otherwise the most
    /// cubic factorization of `size` is chosen. Fails if the explicit grid
    /// does not multiply out to `size`.
    pub fn new(
        size: usize,
        rank: usize,
        nx: usize,
        ny: usize,
        nz: usize,
        process_grid: Option<(usize, usize, usize)>,
    ) -> Result<Self> {
        let (npx, npy, npz) = match process_grid {
            Some((px, py, pz)) => {
                if px * py * pz != size {
                    return Err(MultigrainError::Setup(format!(
                        "process grid {px}x{py}x{pz} does not match {size} ranks"
                    )));
                }
                (px, py, pz)
            }
            None => optimal_process_grid(size),
        };
        let z_slabs = vec![ZSlab { end_ipz: npz, nz }];
        Self::with_z_slabs(size, rank, nx, ny, npx, npy, npz, z_slabs)
    }

    /// Build a geometry with an explicit non-uniform z-slab table.
    ///
    /// The slabs must cover 0..npz in ascending order. Local nz for a rank is
    /// the nz of the slab containing its ipz.
    pub fn with_z_slabs(
        size: usize,
        rank: usize,
        nx: usize,
        ny: usize,
        npx: usize,
        npy: usize,
        npz: usize,
        z_slabs: Vec<ZSlab>,
    ) -> Result<Self> {
        if npx * npy * npz != size {
            return Err(MultigrainError::Setup(format!(
                "process grid {npx}x{npy}x{npz} does not match {size} ranks"
            )));
        }
        if rank >= size {
            return Err(MultigrainError::Setup(format!(
                "rank {rank} out of range for {size} processes"
            )));
        }
        if z_slabs.last().map(|s| s.end_ipz) != Some(npz) {
            return Err(MultigrainError::Setup(
                "z-slab table does not cover the process grid".into(),
            ));
        }

        let ipx = rank % npx;
        let ipy = (rank / npx) % npy;
        let ipz = rank / (npx * npy);

        // Walk the slab table to find this rank's local nz and base offset,
        // accumulating the global extent along the way.
        let mut gnz = 0;
        let mut giz0 = 0;
        let mut nz = 0;
        let mut prev_end = 0;
        for slab in &z_slabs {
            if slab.end_ipz <= prev_end {
                return Err(MultigrainError::Setup(
                    "z-slab table is not in ascending order".into(),
                ));
            }
            if ipz >= prev_end && ipz < slab.end_ipz {
                nz = slab.nz;
                giz0 = gnz + (ipz - prev_end) * slab.nz;
            }
            gnz += (slab.end_ipz - prev_end) * slab.nz;
            prev_end = slab.end_ipz;
        }

        Ok(Self {
            size,
            rank,
            nx,
            ny,
            nz,
            npx,
            npy,
            npz,
            ipx,
            ipy,
            ipz,
            gnx: npx * nx,
            gny: npy * ny,
            gnz,
            gix0: ipx * nx,
            giy0: ipy * ny,
            giz0,
            z_slabs,
        })
    }

    /// Number of grid points owned by this rank.
    pub fn local_points(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Total number of grid points in the global problem.
    pub fn total_points(&self) -> u64 {
        self.gnx as u64 * self.gny as u64 * self.gnz as u64
    }

    /// Global index of the local grid point (ix, iy, iz).
    pub fn global_index(&self, ix: usize, iy: usize, iz: usize) -> u64 {
        let gix = (self.gix0 + ix) as u64;
        let giy = (self.giy0 + iy) as u64;
        let giz = (self.giz0 + iz) as u64;
        giz * self.gnx as u64 * self.gny as u64 + giy * self.gnx as u64 + gix
    }

    /// Decompose a global index into (gix, giy, giz) coordinates.
    pub fn global_coords(&self, gid: u64) -> (usize, usize, usize) {
        let plane = self.gnx as u64 * self.gny as u64;
        let giz = (gid / plane) as usize;
        let rem = gid % plane;
        let giy = (rem / self.gnx as u64) as usize;
        let gix = (rem % self.gnx as u64) as usize;
        (gix, giy, giz)
    }

    /// Rank that owns the grid point with the given global index.
    pub fn rank_of_global(&self, gid: u64) -> usize {
        let (gix, giy, giz) = self.global_coords(gid);
        let ipx = gix / self.nx;
        let ipy = giy / self.ny;

        // z needs the slab table: local nz varies across slabs.
        let mut base = 0;
        let mut prev_end = 0;
        let mut ipz = 0;
        for slab in &self.z_slabs {
            let span = (slab.end_ipz - prev_end) * slab.nz;
            if giz < base + span {
                ipz = prev_end + (giz - base) / slab.nz;
                break;
            }
            base += span;
            prev_end = slab.end_ipz;
        }

        ipx + ipy * self.npx + ipz * self.npx * self.npy
    }

    /// True if the global grid point is owned by this rank.
    pub fn owns_global(&self, gid: u64) -> bool {
        self.rank_of_global(gid) == self.rank
    }
}

/// Pick the factorization of `size` into (npx, npy, npz) with the smallest
/// spread between factors, preferring the most cubic process grid.
fn optimal_process_grid(size: usize) -> (usize, usize, usize) {
    let mut best = (size, 1, 1);
    let mut best_score = usize::MAX;
    for npz in 1..=size {
        if size % npz != 0 {
            continue;
        }
        let rest = size / npz;
        for npy in 1..=rest {
            if rest % npy != 0 {
                continue;
            }
            let npx = rest / npy;
            // Surface-area proxy: sum of pairwise products, minimized when
            // the factors are closest to each other.
            let score = npx * npy + npy * npz + npx * npz;
            if score < best_score {
                best_score = score;
                best = (npx, npy, npz);
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_rank_geometry() {
        let geom = Geometry::new(1, 0, 8, 8, 8, None).unwrap();
        assert_eq!((geom.npx, geom.npy, geom.npz), (1, 1, 1));
        assert_eq!((geom.gnx, geom.gny, geom.gnz), (8, 8, 8));
        assert_eq!(geom.local_points(), 512);
        assert_eq!(geom.global_index(0, 0, 0), 0);
        assert_eq!(geom.global_index(7, 7, 7), 511);
    }

    #[test]
    fn process_grid_factorization_is_cubic() {
        assert_eq!(optimal_process_grid(8), (2, 2, 2));
        assert_eq!(optimal_process_grid(12), (3, 2, 2));
        assert_eq!(optimal_process_grid(1), (1, 1, 1));
        assert_eq!(optimal_process_grid(7), (7, 1, 1));
    }

    #[test]
    fn explicit_process_grid_must_match_size() {
        assert!(Geometry::new(4, 0, 4, 4, 4, Some((2, 2, 2))).is_err());
        assert!(Geometry::new(8, 0, 4, 4, 4, Some((2, 2, 2))).is_ok());
    }

    #[test]
    fn rank_ownership_covers_all_points() {
        // 2x2x2 process grid of 2^3 local boxes: each of the 8 ranks must own
        // exactly its own box, and every global point maps to some rank.
        let geoms: Vec<Geometry> = (0..8)
            .map(|r| Geometry::new(8, r, 2, 2, 2, Some((2, 2, 2))).unwrap())
            .collect();
        for geom in &geoms {
            for iz in 0..geom.nz {
                for iy in 0..geom.ny {
                    for ix in 0..geom.nx {
                        let gid = geom.global_index(ix, iy, iz);
                        assert_eq!(geom.rank_of_global(gid), geom.rank);
                    }
                }
            }
        }
    }

    #[test]
    fn nonuniform_z_slabs() {
        // 4 ranks stacked along z: first two layers carry nz=6, last two nz=2.
        let slabs = vec![ZSlab { end_ipz: 2, nz: 6 }, ZSlab { end_ipz: 4, nz: 2 }];
        let g0 = Geometry::with_z_slabs(4, 0, 4, 4, 1, 1, 4, slabs.clone()).unwrap();
        let g2 = Geometry::with_z_slabs(4, 2, 4, 4, 1, 1, 4, slabs.clone()).unwrap();
        let g3 = Geometry::with_z_slabs(4, 3, 4, 4, 1, 1, 4, slabs).unwrap();

        assert_eq!(g0.nz, 6);
        assert_eq!(g2.nz, 2);
        assert_eq!(g0.gnz, 16);
        assert_eq!(g2.giz0, 12);
        assert_eq!(g3.giz0, 14);

        // Point on the boundary between slab bands resolves to the right rank.
        let gid = g0.global_index(0, 0, 0);
        assert_eq!(g0.rank_of_global(gid), 0);
        let boundary = 12 * 16; // first point of giz = 12
        assert_eq!(g0.rank_of_global(boundary), 2);
    }

    #[test]
    fn global_coords_roundtrip() {
        let geom = Geometry::new(1, 0, 4, 4, 4, None).unwrap();
        for gid in [0u64, 1, 17, 63] {
            let (x, y, z) = geom.global_coords(gid);
            assert_eq!(geom.global_index(x, y, z), gid);
        }
    }
}
