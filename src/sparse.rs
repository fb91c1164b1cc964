//! Compressed Sparse Row (CSR) matrix with local numbering.
//!
//! Rows owned by this rank are numbered 0..local_rows; columns referring to
//! neighbor-owned grid points get ghost indices local_rows..local_cols
//! assigned during halo setup. Each row caches the position of its diagonal
//! entry, which the Gauss-Seidel smoother reads on every row update.

use crate::error::{MultigrainError, Result};
use crate::geometry::Geometry;
use crate::solver::halo::HaloExchange;

/// Sparse matrix in CSR format, one subdomain of a distributed system.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    pub geometry: Geometry,
    /// Rows owned by this rank.
    pub local_rows: usize,
    /// Owned rows plus ghost columns referenced by local rows. Set by halo
    /// setup; equals `local_rows` until then.
    pub local_cols: usize,
    /// `row_ptr[i]` is the index into values/cols where row i starts.
    pub row_ptr: Vec<usize>,
    /// Column index for each non-zero, in local numbering (valid after halo
    /// setup).
    pub cols: Vec<usize>,
    /// Column index for each non-zero, in global numbering (as generated).
    pub cols_global: Vec<u64>,
    /// Non-zero values, stored row by row in ascending-column order.
    pub values: Vec<f64>,
    /// Index into values/cols of each row's diagonal entry.
    pub diag_idx: Vec<usize>,
    /// Global row index for each owned row.
    pub local_to_global: Vec<u64>,
    /// Total rows across all ranks.
    pub total_rows: u64,
    /// Precomputed neighbor communication metadata. Empty on a single rank.
    pub halo: HaloExchange,
}

impl SparseMatrix {
    /// Assemble a matrix from per-row (global column, value) entry lists.
    ///
    /// `rows[i]` holds row i's entries in ascending global-column order and
    /// must contain a non-zero entry at the row's own global index
    /// (`local_to_global[i]`). Column localization is left to halo setup.
    pub fn assemble(
        geometry: Geometry,
        local_to_global: Vec<u64>,
        rows: Vec<Vec<(u64, f64)>>,
    ) -> Result<Self> {
        let local_rows = rows.len();
        if local_to_global.len() != local_rows {
            return Err(MultigrainError::Setup(
                "row map length does not match row count".into(),
            ));
        }

        let nnz: usize = rows.iter().map(|r| r.len()).sum();
        let mut row_ptr = Vec::with_capacity(local_rows + 1);
        let mut cols_global = Vec::with_capacity(nnz);
        let mut values = Vec::with_capacity(nnz);
        let mut diag_idx = Vec::with_capacity(local_rows);

        row_ptr.push(0);
        for (i, row) in rows.iter().enumerate() {
            let row_gid = local_to_global[i];
            let mut diag = None;
            for &(col, value) in row {
                if col == row_gid {
                    if value == 0.0 {
                        return Err(MultigrainError::Setup(format!(
                            "zero diagonal in row {row_gid}"
                        )));
                    }
                    diag = Some(cols_global.len());
                }
                cols_global.push(col);
                values.push(value);
            }
            let diag = diag.ok_or_else(|| {
                MultigrainError::Setup(format!("missing diagonal in row {row_gid}"))
            })?;
            diag_idx.push(diag);
            row_ptr.push(cols_global.len());
        }

        let total_rows = geometry.total_points();
        Ok(Self {
            geometry,
            local_rows,
            local_cols: local_rows,
            row_ptr,
            cols: Vec::new(),
            cols_global,
            values,
            diag_idx,
            local_to_global,
            total_rows,
            halo: HaloExchange::default(),
        })
    }

    /// Build a single-process matrix directly from local column indices.
    ///
    /// Intended for hand-built systems in tests; the real pipeline goes
    /// through [`assemble`](Self::assemble) plus halo setup.
    pub fn from_local_rows(rows: Vec<Vec<(usize, f64)>>) -> Result<Self> {
        let n = rows.len();
        let geometry = Geometry::new(1, 0, n, 1, 1, None)?;
        let local_to_global: Vec<u64> = (0..n as u64).collect();
        let global_rows: Vec<Vec<(u64, f64)>> = rows
            .into_iter()
            .map(|r| r.into_iter().map(|(c, v)| (c as u64, v)).collect())
            .collect();
        let mut a = Self::assemble(geometry, local_to_global, global_rows)?;
        a.cols = a.cols_global.iter().map(|&c| c as usize).collect();
        a.local_cols = n;
        Ok(a)
    }

    /// Number of non-zero entries on this rank.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// This row's local column indices.
    pub fn row_cols(&self, i: usize) -> &[usize] {
        &self.cols[self.row_ptr[i]..self.row_ptr[i + 1]]
    }

    /// This row's non-zero values.
    pub fn row_values(&self, i: usize) -> &[f64] {
        &self.values[self.row_ptr[i]..self.row_ptr[i + 1]]
    }

    /// The diagonal value of row i.
    pub fn diagonal(&self, i: usize) -> f64 {
        self.values[self.diag_idx[i]]
    }

    /// Copy all diagonal values into a fresh vector.
    pub fn copy_diagonal(&self) -> Vec<f64> {
        self.diag_idx.iter().map(|&j| self.values[j]).collect()
    }

    /// Replace all diagonal values. Values must be non-zero to preserve the
    /// smoother's division invariant.
    pub fn replace_diagonal(&mut self, diagonal: &[f64]) -> Result<()> {
        if diagonal.len() != self.local_rows {
            return Err(MultigrainError::Setup(
                "diagonal length does not match row count".into(),
            ));
        }
        for (i, &d) in diagonal.iter().enumerate() {
            if d == 0.0 {
                return Err(MultigrainError::Setup(format!(
                    "zero diagonal in row {}",
                    self.local_to_global[i]
                )));
            }
            self.values[self.diag_idx[i]] = d;
        }
        Ok(())
    }

    /// Convert to a dense row-major matrix over local columns. For testing
    /// and small matrices only.
    pub fn to_dense(&self) -> Vec<Vec<f64>> {
        let mut dense = vec![vec![0.0; self.local_cols]; self.local_rows];
        for i in 0..self.local_rows {
            for (&c, &v) in self.row_cols(i).iter().zip(self.row_values(i)) {
                dense[i][c] = v;
            }
        }
        dense
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tridiagonal(n: usize) -> SparseMatrix {
        let rows: Vec<Vec<(usize, f64)>> = (0..n)
            .map(|i| {
                let mut row = Vec::new();
                if i > 0 {
                    row.push((i - 1, -1.0));
                }
                row.push((i, 4.0));
                if i + 1 < n {
                    row.push((i + 1, -1.0));
                }
                row
            })
            .collect();
        SparseMatrix::from_local_rows(rows).unwrap()
    }

    #[test]
    fn test_assemble_counts() {
        let a = tridiagonal(4);
        assert_eq!(a.local_rows, 4);
        assert_eq!(a.local_cols, 4);
        assert_eq!(a.nnz(), 10);
        assert_eq!(a.row_ptr, vec![0, 2, 5, 8, 10]);
    }

    #[test]
    fn test_diagonal_cache() {
        let a = tridiagonal(4);
        for i in 0..4 {
            assert_eq!(a.diagonal(i), 4.0);
            assert_eq!(a.cols[a.diag_idx[i]], i);
        }
    }

    #[test]
    fn test_copy_replace_diagonal() {
        let mut a = tridiagonal(3);
        let orig = a.copy_diagonal();
        assert_eq!(orig, vec![4.0, 4.0, 4.0]);

        a.replace_diagonal(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(a.copy_diagonal(), vec![1.0, 2.0, 3.0]);
        // Off-diagonal entries are untouched.
        assert_eq!(a.to_dense()[0][1], -1.0);

        a.replace_diagonal(&orig).unwrap();
        assert_eq!(a.copy_diagonal(), orig);
    }

    #[test]
    fn test_zero_diagonal_rejected() {
        let rows = vec![vec![(0usize, 0.0)]];
        assert!(SparseMatrix::from_local_rows(rows).is_err());
        let mut a = tridiagonal(2);
        assert!(a.replace_diagonal(&[1.0, 0.0]).is_err());
    }

    #[test]
    fn test_missing_diagonal_rejected() {
        let rows = vec![vec![(1usize, 1.0)], vec![(1usize, 1.0)]];
        assert!(SparseMatrix::from_local_rows(rows).is_err());
    }
}
