//! Geometric multigrid V-cycle preconditioner.
//!
//! The grid hierarchy is a flat arena of levels, finest first, each level
//! holding its matrix and (unless coarsest) the inter-grid transfer state.
//! The V-cycle recurses down the arena with `split_first_mut`, so no level
//! ever holds a pointer to another and teardown is dropping the arena.

use rayon::prelude::*;

use crate::error::{MultigrainError, Result};
use crate::solver::comm::CommunicationBackend;
use crate::solver::spmv::compute_spmv;
use crate::solver::symgs::compute_symgs;
use crate::sparse::SparseMatrix;

/// Per-level auxiliary state for the V-cycle.
#[derive(Debug, Clone)]
pub struct MgData {
    pub pre_smoother_steps: usize,
    pub post_smoother_steps: usize,
    /// Fine-to-coarse index map: `f2c[i]` is the fine-grid local row injected
    /// into coarse row i. Injective, so the prolongation scatter has no
    /// write conflicts.
    pub f2c: Vec<usize>,
    /// Coarse residual (coarse local rows).
    pub rc: Vec<f64>,
    /// Coarse correction (coarse local columns, ghost space included).
    pub xc: Vec<f64>,
    /// Fine-grid matrix-vector product buffer (fine local columns).
    pub axf: Vec<f64>,
}

impl MgData {
    /// Allocate transfer state for a fine level with the given coarse
    /// operator dimensions. One pre- and one post-smoother sweep by default.
    pub fn new(f2c: Vec<usize>, coarse_rows: usize, coarse_cols: usize, fine_cols: usize) -> Self {
        Self {
            pre_smoother_steps: 1,
            post_smoother_steps: 1,
            f2c,
            rc: vec![0.0; coarse_rows],
            xc: vec![0.0; coarse_cols],
            axf: vec![0.0; fine_cols],
        }
    }
}

/// One level of the grid hierarchy. `mg` is `None` on the coarsest level.
#[derive(Debug, Clone)]
pub struct MgLevel {
    pub matrix: SparseMatrix,
    pub mg: Option<MgData>,
}

/// The full hierarchy, finest level first. Owns every level's matrix and
/// scratch state for the life of the run.
#[derive(Debug, Clone)]
pub struct MgHierarchy {
    pub levels: Vec<MgLevel>,
}

impl MgHierarchy {
    pub fn fine(&self) -> &SparseMatrix {
        &self.levels[0].matrix
    }

    pub fn fine_mut(&mut self) -> &mut SparseMatrix {
        &mut self.levels[0].matrix
    }

    /// Apply one V-cycle: x = M^{-1} * r.
    pub fn apply(
        &mut self,
        r: &[f64],
        x: &mut [f64],
        comm: &dyn CommunicationBackend,
    ) -> Result<()> {
        compute_mg(&mut self.levels, r, x, comm)
    }
}

/// Coarse residual: rc[i] = rf[f2c[i]] - axf[f2c[i]].
///
/// A gather over independent coarse rows; the fine residual is never formed
/// in full, only at the injection points.
pub fn restrict(f2c: &[usize], axf: &[f64], rf: &[f64], rc: &mut [f64]) {
    rc.par_iter_mut()
        .zip(f2c)
        .for_each(|(rci, &fi)| *rci = rf[fi] - axf[fi]);
}

/// Scatter the coarse correction back into the fine grid:
/// xf[f2c[i]] += xc[i].
///
/// `f2c` is injective, so no fine entry is written twice; the loop stays
/// sequential because safe Rust cannot express the disjointness.
pub fn prolongate(f2c: &[usize], xc: &[f64], xf: &mut [f64]) {
    for (&fi, &xci) in f2c.iter().zip(xc) {
        xf[fi] += xci;
    }
}

/// True if no fine-grid index appears twice in the map.
pub fn f2c_is_injective(f2c: &[usize]) -> bool {
    let mut sorted: Vec<usize> = f2c.to_vec();
    sorted.sort_unstable();
    sorted.windows(2).all(|w| w[0] != w[1])
}

/// One multigrid V-cycle over `levels` (finest first), solving toward
/// A*x = r.
///
/// Non-terminal levels zero x, pre-smooth, restrict the residual, recurse,
/// prolongate the correction, and post-smooth. The coarsest level is one
/// smoother sweep from zero. The first kernel error aborts the cycle and
/// propagates unchanged.
pub fn compute_mg(
    levels: &mut [MgLevel],
    r: &[f64],
    x: &mut [f64],
    comm: &dyn CommunicationBackend,
) -> Result<()> {
    let Some((level, coarser)) = levels.split_first_mut() else {
        return Err(MultigrainError::Solve("empty multigrid hierarchy".into()));
    };
    let MgLevel { matrix, mg } = level;
    if x.len() < matrix.local_cols {
        return Err(MultigrainError::Solve(format!(
            "mg output vector too short: {} (need {})",
            x.len(),
            matrix.local_cols
        )));
    }

    x.fill(0.0);

    match mg {
        Some(MgData {
            pre_smoother_steps,
            post_smoother_steps,
            f2c,
            rc,
            xc,
            axf,
        }) => {
            for _ in 0..*pre_smoother_steps {
                compute_symgs(matrix, r, x, comm)?;
            }
            compute_spmv(matrix, x, axf, comm)?;
            restrict(f2c, axf, r, rc);
            compute_mg(coarser, rc, xc, comm)?;
            prolongate(f2c, xc, x);
            for _ in 0..*post_smoother_steps {
                compute_symgs(matrix, r, x, comm)?;
            }
        }
        None => {
            compute_symgs(matrix, r, x, comm)?;
        }
    }
    Ok(())
}
