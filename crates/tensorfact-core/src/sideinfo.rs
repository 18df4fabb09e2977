//! Per-mode side-information matrices.
//!
//! A [`SideInfo`] block is a 2-D feature matrix attached to exactly one mode
//! of the main observation tensor: one feature row per entity in that mode.
//! The macau prior regresses latent factors on these features, so the block
//! exposes exactly the products that regression needs: FᵀF, FᵀX, Fβ and the
//! two matrix-vector products backing the conjugate-gradient solve.

use scirs2_core::ndarray_ext::{Array1, Array2};

use crate::error::BlockError;

/// An immutable 2-D feature matrix, dense or sparse.
#[derive(Debug, Clone)]
pub enum SideInfo {
    Dense(Array2<f64>),
    Sparse {
        rows: usize,
        cols: usize,
        /// `(row, col, value)` triplets.
        triplets: Vec<(usize, usize, f64)>,
    },
}

impl SideInfo {
    /// Wrap a dense feature matrix.
    pub fn dense(features: Array2<f64>) -> Self {
        SideInfo::Dense(features)
    }

    /// Build a sparse feature matrix from triplets, validating bounds and
    /// finiteness.
    pub fn sparse(
        rows: usize,
        cols: usize,
        triplets: Vec<(usize, usize, f64)>,
    ) -> Result<Self, BlockError> {
        if rows == 0 || cols == 0 {
            return Err(BlockError::InvalidShape {
                dims: vec![rows, cols],
            });
        }
        for (entry, &(r, c, v)) in triplets.iter().enumerate() {
            if r >= rows || c >= cols {
                return Err(BlockError::CoordOutOfBounds {
                    coords: vec![r, c],
                    dims: vec![rows, cols],
                });
            }
            if !v.is_finite() {
                return Err(BlockError::NonFinite { entry, value: v });
            }
        }
        Ok(SideInfo::Sparse {
            rows,
            cols,
            triplets,
        })
    }

    /// Number of entity rows.
    pub fn num_rows(&self) -> usize {
        match self {
            SideInfo::Dense(f) => f.nrows(),
            SideInfo::Sparse { rows, .. } => *rows,
        }
    }

    /// Feature dimensionality.
    pub fn num_features(&self) -> usize {
        match self {
            SideInfo::Dense(f) => f.ncols(),
            SideInfo::Sparse { cols, .. } => *cols,
        }
    }

    /// Validate that this block fits a mode of the given extent.
    pub fn validate_rows(&self, mode: usize, extent: usize) -> Result<(), BlockError> {
        if self.num_rows() != extent {
            return Err(BlockError::DimensionMismatch {
                mode,
                rows: self.num_rows(),
                extent,
            });
        }
        Ok(())
    }

    /// FᵀF, the normal-equation Gram matrix (num_features × num_features).
    pub fn ft_f(&self) -> Array2<f64> {
        match self {
            SideInfo::Dense(f) => f.t().dot(f),
            SideInfo::Sparse {
                cols, triplets, ..
            } => {
                // Accumulate per-row outer products over explicit entries.
                let mut gram = Array2::<f64>::zeros((*cols, *cols));
                let mut row_start = 0;
                let mut sorted: Vec<&(usize, usize, f64)> = triplets.iter().collect();
                sorted.sort_by_key(|t| t.0);
                while row_start < sorted.len() {
                    let row = sorted[row_start].0;
                    let mut row_end = row_start;
                    while row_end < sorted.len() && sorted[row_end].0 == row {
                        row_end += 1;
                    }
                    for a in row_start..row_end {
                        for b in row_start..row_end {
                            gram[[sorted[a].1, sorted[b].1]] += sorted[a].2 * sorted[b].2;
                        }
                    }
                    row_start = row_end;
                }
                gram
            }
        }
    }

    /// FᵀX for a (num_rows × k) matrix X, giving (num_features × k).
    pub fn ft_mul(&self, x: &Array2<f64>) -> Array2<f64> {
        debug_assert_eq!(x.nrows(), self.num_rows());
        match self {
            SideInfo::Dense(f) => f.t().dot(x),
            SideInfo::Sparse {
                cols, triplets, ..
            } => {
                let k = x.ncols();
                let mut out = Array2::<f64>::zeros((*cols, k));
                for &(r, c, v) in triplets {
                    for j in 0..k {
                        out[[c, j]] += v * x[[r, j]];
                    }
                }
                out
            }
        }
    }

    /// Fβ for a (num_features × k) link matrix β, giving (num_rows × k).
    pub fn mul(&self, beta: &Array2<f64>) -> Array2<f64> {
        debug_assert_eq!(beta.nrows(), self.num_features());
        match self {
            SideInfo::Dense(f) => f.dot(beta),
            SideInfo::Sparse {
                rows, triplets, ..
            } => {
                let k = beta.ncols();
                let mut out = Array2::<f64>::zeros((*rows, k));
                for &(r, c, v) in triplets {
                    for j in 0..k {
                        out[[r, j]] += v * beta[[c, j]];
                    }
                }
                out
            }
        }
    }

    /// Fx for a feature-space vector, giving an entity-space vector.
    pub fn mul_vec(&self, x: &Array1<f64>) -> Array1<f64> {
        debug_assert_eq!(x.len(), self.num_features());
        match self {
            SideInfo::Dense(f) => f.dot(x),
            SideInfo::Sparse {
                rows, triplets, ..
            } => {
                let mut out = Array1::<f64>::zeros(*rows);
                for &(r, c, v) in triplets {
                    out[r] += v * x[c];
                }
                out
            }
        }
    }

    /// Fᵀy for an entity-space vector, giving a feature-space vector.
    pub fn t_mul_vec(&self, y: &Array1<f64>) -> Array1<f64> {
        debug_assert_eq!(y.len(), self.num_rows());
        match self {
            SideInfo::Dense(f) => f.t().dot(y),
            SideInfo::Sparse {
                cols, triplets, ..
            } => {
                let mut out = Array1::<f64>::zeros(*cols);
                for &(r, c, v) in triplets {
                    out[c] += v * y[r];
                }
                out
            }
        }
    }
}
