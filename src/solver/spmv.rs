//! Sparse matrix-vector product y = A*x.

use rayon::prelude::*;

use crate::error::{MultigrainError, Result};
use crate::solver::comm::CommunicationBackend;
use crate::solver::halo::exchange_halo;
use crate::sparse::SparseMatrix;

/// Compute y = A*x.
///
/// `x` must provide ghost space (`len >= local_cols`); its ghost tail is
/// refreshed here before the product, so callers never exchange manually.
/// Rows are independent: accumulation is per-row in storage order, with no
/// state shared across rows.
pub fn compute_spmv(
    a: &SparseMatrix,
    x: &mut [f64],
    y: &mut [f64],
    comm: &dyn CommunicationBackend,
) -> Result<()> {
    if x.len() < a.local_cols || y.len() < a.local_rows {
        return Err(MultigrainError::Solve(format!(
            "spmv dimension mismatch: x {} (need {}), y {} (need {})",
            x.len(),
            a.local_cols,
            y.len(),
            a.local_rows
        )));
    }

    exchange_halo(a, x, comm);

    let x = &x[..];
    y[..a.local_rows]
        .par_iter_mut()
        .enumerate()
        .for_each(|(i, yi)| {
            let lo = a.row_ptr[i];
            let hi = a.row_ptr[i + 1];
            let mut sum = 0.0;
            for (&col, &value) in a.cols[lo..hi].iter().zip(&a.values[lo..hi]) {
                sum += value * x[col];
            }
            *yi = sum;
        });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::comm::SingleProcessComm;
    use crate::sparse::SparseMatrix;

    #[test]
    fn hand_built_3x3_product() {
        // A = [[2, 1, 0], [1, 3, 1], [0, 1, 4]], x = [1, 2, 3]
        // A*x = [4, 10, 14], exactly, with no parallel or halo ambiguity.
        let a = SparseMatrix::from_local_rows(vec![
            vec![(0, 2.0), (1, 1.0)],
            vec![(0, 1.0), (1, 3.0), (2, 1.0)],
            vec![(1, 1.0), (2, 4.0)],
        ])
        .unwrap();

        let mut x = vec![1.0, 2.0, 3.0];
        let mut y = vec![0.0; 3];
        compute_spmv(&a, &mut x, &mut y, &SingleProcessComm).unwrap();
        assert_eq!(y, vec![4.0, 10.0, 14.0]);
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let a = SparseMatrix::from_local_rows(vec![vec![(0, 1.0)], vec![(1, 1.0)]]).unwrap();
        let mut x = vec![1.0];
        let mut y = vec![0.0; 2];
        assert!(compute_spmv(&a, &mut x, &mut y, &SingleProcessComm).is_err());

        let mut x = vec![1.0, 2.0];
        let mut y = vec![0.0];
        assert!(compute_spmv(&a, &mut x, &mut y, &SingleProcessComm).is_err());
    }

    #[test]
    fn identity_matrix_reproduces_input() {
        let a = SparseMatrix::from_local_rows(
            (0..4).map(|i| vec![(i, 1.0)]).collect::<Vec<_>>(),
        )
        .unwrap();
        let mut x = vec![3.0, -1.0, 0.5, 7.0];
        let mut y = vec![0.0; 4];
        compute_spmv(&a, &mut x, &mut y, &SingleProcessComm).unwrap();
        assert_eq!(y, x);
    }
}
