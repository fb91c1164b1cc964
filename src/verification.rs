//! Solver acceptance check.
//!
//! Exaggerates the fine-matrix diagonal so the system is massively
//! diagonally dominant, then demands that CG converge within a small, known
//! iteration budget: 12 iterations unpreconditioned, 2 with the multigrid
//! preconditioner, at tolerance 1e-12. The counts hold regardless of problem
//! size, which makes this a cheap end-to-end check of the whole solver
//! stack. Matrix diagonal and right-hand side are restored afterwards.

use crate::error::Result;
use crate::problem::ProblemSetup;
use crate::solver::cg::{cg, CgData};
use crate::solver::comm::CommunicationBackend;
use crate::stats::SolveStats;

const VERIFY_MAX_ITERS: usize = 50;
const VERIFY_TOLERANCE: f64 = 1.0e-12;
const CALLS_PER_MODE: usize = 2;

/// Outcome of the acceptance check.
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub pass_count: usize,
    pub fail_count: usize,
    /// Worst iteration count seen without preconditioning (budget: 12).
    pub max_iters_unpreconditioned: usize,
    /// Worst iteration count seen with preconditioning (budget: 2).
    pub max_iters_preconditioned: usize,
    pub expected_unpreconditioned: usize,
    pub expected_preconditioned: usize,
    /// Residual norm of the last call.
    pub final_normr: f64,
}

impl VerificationOutcome {
    pub fn passed(&self) -> bool {
        self.fail_count == 0
    }
}

/// Run the acceptance check against `setup`, temporarily exaggerating its
/// diagonal. `x` is scratch (ghost-capable); its contents are overwritten.
pub fn verify_cg(
    setup: &mut ProblemSetup,
    data: &mut CgData,
    x: &mut [f64],
    comm: &dyn CommunicationBackend,
) -> Result<VerificationOutcome> {
    let expected_unpreconditioned = 12;
    let expected_preconditioned = 2;

    // Save the original diagonal and RHS, then scale both identically so the
    // solution is unchanged in character but the system becomes dominated by
    // its diagonal. The first 9 global rows get an extra per-row factor.
    let orig_diagonal = setup.hierarchy.fine().copy_diagonal();
    let orig_b = setup.b.clone();

    let mut exaggerated = orig_diagonal.clone();
    {
        let a = setup.hierarchy.fine();
        for i in 0..a.local_rows {
            let gid = a.local_to_global[i];
            let scale = if gid < 9 {
                (gid as f64 + 2.0) * 1.0e6
            } else {
                1.0e6
            };
            exaggerated[i] *= scale;
            setup.b[i] *= scale;
        }
    }
    setup.hierarchy.fine_mut().replace_diagonal(&exaggerated)?;

    let mut outcome = VerificationOutcome {
        pass_count: 0,
        fail_count: 0,
        max_iters_unpreconditioned: 0,
        max_iters_preconditioned: 0,
        expected_unpreconditioned,
        expected_preconditioned,
        final_normr: 0.0,
    };

    let mut stats = SolveStats::new();
    for precondition in [false, true] {
        let expected = if precondition {
            expected_preconditioned
        } else {
            expected_unpreconditioned
        };
        for call in 0..CALLS_PER_MODE {
            x.fill(0.0);
            let result = cg(
                &mut setup.hierarchy,
                data,
                &setup.b,
                x,
                VERIFY_MAX_ITERS,
                VERIFY_TOLERANCE,
                precondition,
                comm,
                &mut stats,
            )?;

            if result.iterations <= expected {
                outcome.pass_count += 1;
            } else {
                outcome.fail_count += 1;
            }
            if precondition {
                outcome.max_iters_preconditioned =
                    outcome.max_iters_preconditioned.max(result.iterations);
            } else {
                outcome.max_iters_unpreconditioned =
                    outcome.max_iters_unpreconditioned.max(result.iterations);
            }
            outcome.final_normr = result.normr;

            if comm.rank() == 0 {
                tracing::info!(
                    call,
                    precondition,
                    iterations = result.iterations,
                    scaled_residual = result.normr / result.normr0,
                    "verification cg call"
                );
                if result.iterations > expected {
                    tracing::warn!(
                        expected,
                        performed = result.iterations,
                        "verification call exceeded its iteration budget"
                    );
                }
            }
        }
    }

    // Restore the system for the benchmark proper.
    setup.hierarchy.fine_mut().replace_diagonal(&orig_diagonal)?;
    setup.b = orig_b;

    Ok(outcome)
}
