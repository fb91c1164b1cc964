//! Preconditioned conjugate gradient driver.
//!
//! The top-level Krylov iteration: each pass applies the multigrid
//! preconditioner (or the identity), updates the search direction, and takes
//! one step along it. All cross-rank coupling happens inside the dot-product
//! reductions and the halo exchanges buried in SpMV/SYMGS; every iteration
//! is a lockstep barrier across ranks.

use std::time::Instant;

use crate::error::{MultigrainError, Result};
use crate::solver::comm::CommunicationBackend;
use crate::solver::kernels::{axpy, dot, waxpby, xpby};
use crate::solver::mg::MgHierarchy;
use crate::solver::spmv::compute_spmv;
use crate::sparse::SparseMatrix;
use crate::stats::SolveStats;

/// Working vectors reused across all CG iterations. Allocated once per run;
/// nothing inside the iteration loop allocates.
#[derive(Debug, Clone)]
pub struct CgData {
    /// Residual (owned rows).
    pub r: Vec<f64>,
    /// Preconditioned residual (ghost space for the smoother).
    pub z: Vec<f64>,
    /// Search direction (ghost space for SpMV).
    pub p: Vec<f64>,
    /// A * p (owned rows).
    pub ap: Vec<f64>,
}

impl CgData {
    pub fn new(a: &SparseMatrix) -> Self {
        Self {
            r: vec![0.0; a.local_rows],
            z: vec![0.0; a.local_cols],
            p: vec![0.0; a.local_cols],
            ap: vec![0.0; a.local_rows],
        }
    }
}

/// Outcome of one CG call. Hitting `max_iter` without reaching the tolerance
/// is a normal return; the caller decides whether the count is acceptable.
#[derive(Debug, Clone)]
pub struct CgResult {
    /// Iterations actually performed.
    pub iterations: usize,
    /// Residual 2-norm after the last iteration.
    pub normr: f64,
    /// Residual 2-norm before the first iteration.
    pub normr0: f64,
    /// Scaled residual normr/normr0 after each iteration, for convergence
    /// diagnostics.
    pub scaled_residuals: Vec<f64>,
}

/// Solve A*x = b with preconditioned CG.
///
/// `x` carries the initial guess in and the approximate solution out, and
/// must provide ghost space. One multigrid V-cycle per iteration serves as
/// the preconditioner when `precondition` is set; otherwise z = r. Kernel
/// errors abort the call immediately; a non-finite residual is a solve
/// error.
#[allow(clippy::too_many_arguments)]
pub fn cg(
    hierarchy: &mut MgHierarchy,
    data: &mut CgData,
    b: &[f64],
    x: &mut [f64],
    max_iter: usize,
    tolerance: f64,
    precondition: bool,
    comm: &dyn CommunicationBackend,
    stats: &mut SolveStats,
) -> Result<CgResult> {
    let t_begin = Instant::now();
    let nrow = hierarchy.fine().local_rows;
    let ncol = hierarchy.fine().local_cols;

    if b.len() < nrow || x.len() < ncol {
        return Err(MultigrainError::Solve(format!(
            "cg dimension mismatch: b {} (need {}), x {} (need {})",
            b.len(),
            nrow,
            x.len(),
            ncol
        )));
    }
    if data.p.len() < ncol || data.z.len() < ncol {
        return Err(MultigrainError::Solve(
            "cg working vectors lack ghost space for this matrix".into(),
        ));
    }

    let _span = tracing::debug_span!("cg", nrow, max_iter, precondition).entered();

    if !precondition && comm.rank() == 0 {
        tracing::warn!("performing unpreconditioned iterations");
    }

    let mut rtz = 0.0;
    let mut oldrtz;

    // p is ncol-long; seed it with x so the initial SpMV sees the guess.
    data.p[..ncol].copy_from_slice(&x[..ncol]);

    let mut t0 = Instant::now();
    compute_spmv(hierarchy.fine(), &mut data.p, &mut data.ap, comm)?;
    stats.spmv += t0.elapsed();

    // r = b - A*x
    t0 = Instant::now();
    waxpby(nrow, 1.0, b, -1.0, &data.ap, &mut data.r);
    stats.waxpby += t0.elapsed();

    t0 = Instant::now();
    let mut normr = dot(nrow, &data.r, &data.r, comm, &mut stats.allreduce).sqrt();
    stats.dot += t0.elapsed();

    let normr0 = normr;
    tracing::debug!(normr0, "initial residual");

    let mut iterations = 0;
    let mut scaled_residuals = Vec::new();

    for k in 1..=max_iter {
        if normr <= tolerance * normr0 {
            break;
        }

        t0 = Instant::now();
        if precondition {
            hierarchy.apply(&data.r, &mut data.z, comm)?;
        } else {
            data.z[..nrow].copy_from_slice(&data.r[..nrow]);
        }
        stats.precond += t0.elapsed();

        if k == 1 {
            t0 = Instant::now();
            data.p[..nrow].copy_from_slice(&data.z[..nrow]);
            stats.waxpby += t0.elapsed();

            t0 = Instant::now();
            rtz = dot(nrow, &data.r, &data.z, comm, &mut stats.allreduce);
            stats.dot += t0.elapsed();
        } else {
            oldrtz = rtz;
            t0 = Instant::now();
            rtz = dot(nrow, &data.r, &data.z, comm, &mut stats.allreduce);
            stats.dot += t0.elapsed();

            let beta = rtz / oldrtz;
            t0 = Instant::now();
            xpby(nrow, &data.z, beta, &mut data.p);
            stats.waxpby += t0.elapsed();
        }

        t0 = Instant::now();
        compute_spmv(hierarchy.fine(), &mut data.p, &mut data.ap, comm)?;
        stats.spmv += t0.elapsed();

        t0 = Instant::now();
        let pap = dot(nrow, &data.p, &data.ap, comm, &mut stats.allreduce);
        stats.dot += t0.elapsed();

        if pap == 0.0 || !pap.is_finite() {
            return Err(MultigrainError::Solve(format!(
                "cg breakdown at iteration {k}: p'Ap = {pap}"
            )));
        }
        let alpha = rtz / pap;

        t0 = Instant::now();
        axpy(nrow, alpha, &data.p, x);
        axpy(nrow, -alpha, &data.ap, &mut data.r);
        stats.waxpby += t0.elapsed();

        t0 = Instant::now();
        normr = dot(nrow, &data.r, &data.r, comm, &mut stats.allreduce).sqrt();
        stats.dot += t0.elapsed();

        if !normr.is_finite() {
            return Err(MultigrainError::Solve(format!(
                "cg diverged at iteration {k}: residual norm is {normr}"
            )));
        }

        iterations = k;
        scaled_residuals.push(normr / normr0);
        tracing::debug!(iteration = k, scaled_residual = normr / normr0, "cg step");
    }

    stats.total += t_begin.elapsed();
    Ok(CgResult {
        iterations,
        normr,
        normr0,
        scaled_residuals,
    })
}
