//! Symmetric Gauss-Seidel smoother.
//!
//! One forward sweep (row 0 to nrow-1) followed by one backward sweep, each
//! reading the partially-updated working vector for both lower- and
//! upper-triangular neighbor contributions. The sweeps are sequential by
//! construction: each row's update must observe earlier rows' new values in
//! exact row order, so these loops are never thread-parallel. Reordering via
//! graph coloring would change the iteration semantics, not just its speed.

use crate::error::{MultigrainError, Result};
use crate::solver::comm::CommunicationBackend;
use crate::solver::halo::exchange_halo;
use crate::sparse::SparseMatrix;

/// Perform one symmetric Gauss-Seidel sweep on x with RHS r.
///
/// `x` must provide ghost space; its ghost tail is refreshed before the
/// sweeps so off-process neighbor values are current. Per row, the update is
/// x[i] = (r[i] - sum_{j != i} A[i][j]*x[j]) / A[i][i], computed by summing
/// over all stored entries including the diagonal and re-adding the diagonal
/// contribution before dividing.
pub fn compute_symgs(
    a: &SparseMatrix,
    r: &[f64],
    x: &mut [f64],
    comm: &dyn CommunicationBackend,
) -> Result<()> {
    if x.len() < a.local_cols || r.len() < a.local_rows {
        return Err(MultigrainError::Solve(format!(
            "symgs dimension mismatch: x {} (need {}), r {} (need {})",
            x.len(),
            a.local_cols,
            r.len(),
            a.local_rows
        )));
    }

    exchange_halo(a, x, comm);

    let nrow = a.local_rows;

    for i in 0..nrow {
        let diagonal = a.diagonal(i);
        let mut sum = r[i];
        for (&col, &value) in a.row_cols(i).iter().zip(a.row_values(i)) {
            sum -= value * x[col];
        }
        sum += x[i] * diagonal;
        x[i] = sum / diagonal;
    }

    for i in (0..nrow).rev() {
        let diagonal = a.diagonal(i);
        let mut sum = r[i];
        for (&col, &value) in a.row_cols(i).iter().zip(a.row_values(i)) {
            sum -= value * x[col];
        }
        sum += x[i] * diagonal;
        x[i] = sum / diagonal;
    }

    Ok(())
}
