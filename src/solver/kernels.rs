//! Dense vector kernels: dot products, scaled vector updates, and the
//! inf-norm difference used for the final solution check.
//!
//! All kernels operate on the owned prefix of length `n`; ghost tails are
//! never touched here. Row-parallel loops use rayon; the only cross-row
//! state is the reduction accumulator, which rayon combines from per-thread
//! partial sums.

use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::solver::comm::CommunicationBackend;

/// Globally-reduced dot product of the owned prefixes of `x` and `y`.
///
/// The blocking all-reduce is timed into `allreduce_time`, which the CG
/// driver accumulates into its fixed timing slot.
pub fn dot(
    n: usize,
    x: &[f64],
    y: &[f64],
    comm: &dyn CommunicationBackend,
    allreduce_time: &mut Duration,
) -> f64 {
    debug_assert!(x.len() >= n && y.len() >= n);
    let local: f64 = x[..n]
        .par_iter()
        .zip(&y[..n])
        .map(|(&a, &b)| a * b)
        .sum();

    let t0 = Instant::now();
    let global = comm.all_reduce_sum(local);
    *allreduce_time += t0.elapsed();
    global
}

/// w = alpha*x + beta*y over the owned prefix.
pub fn waxpby(n: usize, alpha: f64, x: &[f64], beta: f64, y: &[f64], w: &mut [f64]) {
    debug_assert!(x.len() >= n && y.len() >= n && w.len() >= n);
    // The unit-coefficient forms dominate the CG loop; skip the multiply.
    if alpha == 1.0 {
        w[..n]
            .par_iter_mut()
            .zip(&x[..n])
            .zip(&y[..n])
            .for_each(|((wi, &xi), &yi)| *wi = xi + beta * yi);
    } else if beta == 1.0 {
        w[..n]
            .par_iter_mut()
            .zip(&x[..n])
            .zip(&y[..n])
            .for_each(|((wi, &xi), &yi)| *wi = alpha * xi + yi);
    } else {
        w[..n]
            .par_iter_mut()
            .zip(&x[..n])
            .zip(&y[..n])
            .for_each(|((wi, &xi), &yi)| *wi = alpha * xi + beta * yi);
    }
}

/// y += alpha*x over the owned prefix.
pub fn axpy(n: usize, alpha: f64, x: &[f64], y: &mut [f64]) {
    debug_assert!(x.len() >= n && y.len() >= n);
    y[..n]
        .par_iter_mut()
        .zip(&x[..n])
        .for_each(|(yi, &xi)| *yi += alpha * xi);
}

/// y = x + beta*y over the owned prefix (the CG direction update, where the
/// output aliases the second operand).
pub fn xpby(n: usize, x: &[f64], beta: f64, y: &mut [f64]) {
    debug_assert!(x.len() >= n && y.len() >= n);
    y[..n]
        .par_iter_mut()
        .zip(&x[..n])
        .for_each(|(yi, &xi)| *yi = xi + beta * *yi);
}

/// Globally-reduced inf-norm of the difference between two vectors.
pub fn max_abs_diff(n: usize, x: &[f64], y: &[f64], comm: &dyn CommunicationBackend) -> f64 {
    debug_assert!(x.len() >= n && y.len() >= n);
    let local = x[..n]
        .par_iter()
        .zip(&y[..n])
        .map(|(&a, &b)| (a - b).abs())
        .reduce(|| 0.0, f64::max);
    comm.all_reduce_max(local)
}
