//! The solver core: communication, halo exchange, and the numerical kernels
//! composed into the multigrid-preconditioned conjugate gradient driver.

pub mod cg;
pub mod comm;
#[cfg(feature = "distributed")]
pub mod comm_mpi;
pub mod halo;
pub mod kernels;
pub mod mg;
pub mod spmv;
pub mod symgs;
