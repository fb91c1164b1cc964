//! Distributed multigrid-preconditioned conjugate gradient benchmark.
//!
//! Builds a synthetic sparse linear system from a 27-point stencil on a 3D
//! Cartesian grid, partitions it across processes, and solves it with CG
//! preconditioned by one geometric multigrid V-cycle using symmetric
//! Gauss-Seidel smoothing.

pub mod error;
pub mod geometry;
pub mod problem;
pub mod solver;
pub mod sparse;
pub mod stats;
pub mod verification;
