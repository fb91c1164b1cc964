//! MPI communication backend.
//!
//! Requires the `distributed` feature flag and an MPI installation. The
//! caller must initialize MPI before constructing `MpiComm`:
//!
//! ```ignore
//! let universe = mpi::initialize().expect("MPI init failed");
//! let comm = MpiComm::new();
//! ```
//!
//! Halo exchange posts one non-blocking receive per neighbor into that
//! neighbor's slice of the ghost region, then issues blocking sends, then
//! waits on all receives. Receives are posted first so the blocking sends
//! cannot deadlock against each other. A failed wait terminates the process;
//! the default MPI error handler aborts, which is the intended behavior.

use super::comm::{CommunicationBackend, HaloNeighbor};
use mpi::collective::SystemOperation;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

/// MPI-based communication backend over the world communicator.
///
/// Panics if MPI has not been initialized via `mpi::initialize()`.
pub struct MpiComm;

impl MpiComm {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MpiComm {
    fn default() -> Self {
        Self::new()
    }
}

impl CommunicationBackend for MpiComm {
    fn all_reduce_sum(&self, local: f64) -> f64 {
        let world = SimpleCommunicator::world();
        let mut global = 0.0f64;
        world.all_reduce_into(&local, &mut global, SystemOperation::sum());
        global
    }

    fn all_reduce_max(&self, local: f64) -> f64 {
        let world = SimpleCommunicator::world();
        let mut global = 0.0f64;
        world.all_reduce_into(&local, &mut global, SystemOperation::max());
        global
    }

    fn halo_exchange(&self, neighbors: &[HaloNeighbor], owned: &[f64], ghost: &mut [f64]) {
        let world = SimpleCommunicator::world();

        mpi::request::scope(|scope| {
            // Post all receives before any send. Neighbor regions tile the
            // ghost tail in order.
            let mut pending = Vec::with_capacity(neighbors.len());
            let mut rest = ghost;
            for nbr in neighbors {
                debug_assert!(nbr.recv_count <= rest.len());
                let (region, tail) = rest.split_at_mut(nbr.recv_count);
                rest = tail;
                let req = world
                    .process_at_rank(nbr.rank as i32)
                    .immediate_receive_into(scope, region);
                pending.push(req);
            }

            for nbr in neighbors {
                let send_data: Vec<f64> =
                    nbr.send_indices.iter().map(|&i| owned[i]).collect();
                world.process_at_rank(nbr.rank as i32).send(&send_data[..]);
            }

            for req in pending {
                req.wait();
            }
        });
    }

    fn rank(&self) -> usize {
        let world = SimpleCommunicator::world();
        world.rank() as usize
    }

    fn num_ranks(&self) -> usize {
        let world = SimpleCommunicator::world();
        world.size() as usize
    }

    fn barrier(&self) {
        let world = SimpleCommunicator::world();
        world.barrier();
    }
}
