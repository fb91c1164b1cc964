//! Synthetic problem generation: the 27-point stencil operator on a 3D box,
//! its right-hand side, and the coarsened multigrid hierarchy.
//!
//! Each interior grid point couples to its 26 neighbors with -1.0 and to
//! itself with 26.0; rows on the global boundary simply lose the entries
//! that fall outside the box. The exact solution is all ones, which fixes
//! b[i] = 26 - (number of off-diagonal entries in row i).

use crate::error::{MultigrainError, Result};
use crate::geometry::{Geometry, ZSlab};
use crate::solver::halo::setup_halo;
use crate::solver::mg::{MgData, MgHierarchy, MgLevel};
use crate::sparse::SparseMatrix;

/// A generated linear system: the operator with halo metadata attached, the
/// right-hand side, and the exact solution it was manufactured from.
#[derive(Debug, Clone)]
pub struct GeneratedProblem {
    pub matrix: SparseMatrix,
    pub b: Vec<f64>,
    pub x_exact: Vec<f64>,
}

/// Generate the 27-point stencil system for one rank's subdomain.
pub fn generate_problem(geometry: Geometry) -> Result<GeneratedProblem> {
    let nrow = geometry.local_points();
    let mut local_to_global = Vec::with_capacity(nrow);
    let mut rows = Vec::with_capacity(nrow);
    let mut b = Vec::with_capacity(nrow);

    for iz in 0..geometry.nz {
        for iy in 0..geometry.ny {
            for ix in 0..geometry.nx {
                let gix = geometry.gix0 + ix;
                let giy = geometry.giy0 + iy;
                let giz = geometry.giz0 + iz;
                let gid = geometry.global_index(ix, iy, iz);

                // Stencil neighbors in ascending (z, y, x) order, which is
                // ascending global index; entries outside the global box are
                // dropped.
                let mut row = Vec::with_capacity(27);
                for sz in -1i64..=1 {
                    let gz = giz as i64 + sz;
                    if gz < 0 || gz >= geometry.gnz as i64 {
                        continue;
                    }
                    for sy in -1i64..=1 {
                        let gy = giy as i64 + sy;
                        if gy < 0 || gy >= geometry.gny as i64 {
                            continue;
                        }
                        for sx in -1i64..=1 {
                            let gx = gix as i64 + sx;
                            if gx < 0 || gx >= geometry.gnx as i64 {
                                continue;
                            }
                            let col = gz as u64 * geometry.gnx as u64 * geometry.gny as u64
                                + gy as u64 * geometry.gnx as u64
                                + gx as u64;
                            let value = if col == gid { 26.0 } else { -1.0 };
                            row.push((col, value));
                        }
                    }
                }

                b.push(26.0 - (row.len() as f64 - 1.0));
                local_to_global.push(gid);
                rows.push(row);
            }
        }
    }

    let mut matrix = SparseMatrix::assemble(geometry, local_to_global, rows)?;
    setup_halo(&mut matrix)?;

    Ok(GeneratedProblem {
        x_exact: vec![1.0; matrix.local_rows],
        matrix,
        b,
    })
}

/// Generate the next-coarser operator for `fine` by halving each grid
/// dimension, along with the fine-to-coarse injection map.
///
/// Every coarse point is the even-coordinate fine point of its 2x2x2 block,
/// so `f2c` is injective by construction. Fails if any local dimension (or
/// z-slab height) is odd.
pub fn generate_coarse_problem(fine: &SparseMatrix) -> Result<(SparseMatrix, Vec<usize>)> {
    let geom = &fine.geometry;
    if geom.nx % 2 != 0 || geom.ny % 2 != 0 || geom.nz % 2 != 0 {
        return Err(MultigrainError::Setup(format!(
            "cannot coarsen {}x{}x{} local grid: dimensions must be even",
            geom.nx, geom.ny, geom.nz
        )));
    }

    let (nxc, nyc, nzc) = (geom.nx / 2, geom.ny / 2, geom.nz / 2);

    let mut f2c = vec![0usize; nxc * nyc * nzc];
    for izc in 0..nzc {
        for iyc in 0..nyc {
            for ixc in 0..nxc {
                let coarse_row = izc * nxc * nyc + iyc * nxc + ixc;
                let fine_row = (2 * izc) * geom.nx * geom.ny + (2 * iyc) * geom.nx + 2 * ixc;
                f2c[coarse_row] = fine_row;
            }
        }
    }

    let mut coarse_slabs = Vec::with_capacity(geom.z_slabs.len());
    for slab in &geom.z_slabs {
        if slab.nz % 2 != 0 {
            return Err(MultigrainError::Setup(format!(
                "cannot coarsen z-slab of height {}: must be even",
                slab.nz
            )));
        }
        coarse_slabs.push(ZSlab {
            end_ipz: slab.end_ipz,
            nz: slab.nz / 2,
        });
    }

    let coarse_geom = Geometry::with_z_slabs(
        geom.size,
        geom.rank,
        nxc,
        nyc,
        geom.npx,
        geom.npy,
        geom.npz,
        coarse_slabs,
    )?;
    let coarse = generate_problem(coarse_geom)?;

    Ok((coarse.matrix, f2c))
}

/// The fine system plus its multigrid hierarchy, ready to solve. The fine
/// matrix is `hierarchy.fine()`.
#[derive(Debug, Clone)]
pub struct ProblemSetup {
    pub hierarchy: MgHierarchy,
    pub b: Vec<f64>,
    pub x_exact: Vec<f64>,
}

/// Generate the full problem: the fine system plus a multigrid hierarchy of
/// `num_levels` grids (1 = no coarsening).
pub fn build_hierarchy(geometry: Geometry, num_levels: usize) -> Result<ProblemSetup> {
    if num_levels == 0 {
        return Err(MultigrainError::Setup("hierarchy needs at least one level".into()));
    }

    let fine = generate_problem(geometry)?;

    let mut levels = Vec::with_capacity(num_levels);
    let mut current = fine.matrix;
    for _ in 1..num_levels {
        let (coarse, f2c) = generate_coarse_problem(&current)?;
        let mg = MgData::new(f2c, coarse.local_rows, coarse.local_cols, current.local_cols);
        levels.push(MgLevel {
            matrix: current,
            mg: Some(mg),
        });
        current = coarse;
    }
    levels.push(MgLevel {
        matrix: current,
        mg: None,
    });

    Ok(ProblemSetup {
        hierarchy: MgHierarchy { levels },
        b: fine.b,
        x_exact: fine.x_exact,
    })
}
