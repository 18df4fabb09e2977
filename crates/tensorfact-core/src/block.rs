//! N-dimensional observation blocks.
//!
//! A [`Block`] is the uniform logical representation of observation data
//! consumed by the sampling engine: either dense (every coordinate
//! implicitly present) or sparse (explicit coordinate/value pairs). Sparse
//! blocks carry a `scarce` flag distinguishing "missing = unknown" from
//! "missing = zero".
//!
//! Blocks are validated once at construction and immutable afterwards; the
//! sampler only ever reads them. Each sparse block also builds a per-mode
//! entry index so that the per-entity Gibbs updates can slice all
//! observations touching one coordinate of one mode without scanning the
//! whole entry list.

use scirs2_core::ndarray_ext::ArrayD;

use crate::error::BlockError;

/// Storage behind a [`Block`].
#[derive(Debug, Clone)]
enum Storage {
    Dense(ArrayD<f64>),
    Sparse {
        indices: Vec<Vec<usize>>,
        values: Vec<f64>,
        scarce: bool,
    },
}

/// An immutable N-dimensional observation block.
#[derive(Debug, Clone)]
pub struct Block {
    dims: Vec<usize>,
    storage: Storage,
    /// `mode_index[mode][i]` lists entry ids whose coordinate along `mode`
    /// is `i`. Built for sparse blocks only; dense blocks synthesize fibers.
    mode_index: Vec<Vec<Vec<usize>>>,
}

impl Block {
    /// Build a dense block from an N-dimensional array.
    ///
    /// Fails if the shape is degenerate or any value is non-finite.
    pub fn dense(data: ArrayD<f64>) -> Result<Self, BlockError> {
        let dims = data.shape().to_vec();
        if dims.is_empty() || dims.contains(&0) {
            return Err(BlockError::InvalidShape { dims });
        }
        for (entry, &value) in data.iter().enumerate() {
            if !value.is_finite() {
                return Err(BlockError::NonFinite { entry, value });
            }
        }
        Ok(Self {
            dims,
            storage: Storage::Dense(data),
            mode_index: Vec::new(),
        })
    }

    /// Build a sparse block from explicit coordinate/value pairs.
    ///
    /// `scarce` controls whether absent coordinates are unknown (`true`)
    /// or implicit zeros (`false`).
    pub fn sparse(
        indices: Vec<Vec<usize>>,
        values: Vec<f64>,
        dims: Vec<usize>,
        scarce: bool,
    ) -> Result<Self, BlockError> {
        if dims.is_empty() || dims.contains(&0) {
            return Err(BlockError::InvalidShape { dims });
        }
        if indices.len() != values.len() {
            return Err(BlockError::ValueCount {
                indices: indices.len(),
                values: values.len(),
            });
        }
        for coords in &indices {
            if coords.len() != dims.len() {
                return Err(BlockError::CoordArity {
                    got: coords.len(),
                    expected: dims.len(),
                });
            }
            for (&c, &extent) in coords.iter().zip(&dims) {
                if c >= extent {
                    return Err(BlockError::CoordOutOfBounds {
                        coords: coords.clone(),
                        dims: dims.clone(),
                    });
                }
            }
        }
        for (entry, &value) in values.iter().enumerate() {
            if !value.is_finite() {
                return Err(BlockError::NonFinite { entry, value });
            }
        }

        let mut mode_index: Vec<Vec<Vec<usize>>> =
            dims.iter().map(|&d| vec![Vec::new(); d]).collect();
        for (id, coords) in indices.iter().enumerate() {
            for (mode, &c) in coords.iter().enumerate() {
                mode_index[mode][c].push(id);
            }
        }

        Ok(Self {
            dims,
            storage: Storage::Sparse {
                indices,
                values,
                scarce,
            },
            mode_index,
        })
    }

    /// Extent of every mode.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Number of modes.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Total number of cells (explicit and implicit).
    pub fn size(&self) -> usize {
        self.dims.iter().product()
    }

    /// Number of explicit entries.
    pub fn nnz(&self) -> usize {
        match &self.storage {
            Storage::Dense(data) => data.len(),
            Storage::Sparse { values, .. } => values.len(),
        }
    }

    /// Number of cells the likelihood treats as observed.
    ///
    /// Dense and non-scarce sparse blocks observe every cell; scarce blocks
    /// observe only their explicit entries.
    pub fn num_observed(&self) -> usize {
        if self.is_complete() {
            self.size()
        } else {
            self.nnz()
        }
    }

    /// True when every cell counts as observed (dense, or sparse with
    /// implicit zeros).
    pub fn is_complete(&self) -> bool {
        match &self.storage {
            Storage::Dense(_) => true,
            Storage::Sparse { scarce, .. } => !scarce,
        }
    }

    /// Iterate over explicit entries as `(coordinates, value)` pairs.
    ///
    /// Dense blocks synthesize coordinates lazily in row-major order.
    pub fn entries(&self) -> Box<dyn Iterator<Item = (Vec<usize>, f64)> + '_> {
        match &self.storage {
            Storage::Dense(data) => {
                let dims = self.dims.clone();
                Box::new(
                    data.iter()
                        .enumerate()
                        .map(move |(flat, &v)| (unravel(flat, &dims), v)),
                )
            }
            Storage::Sparse {
                indices, values, ..
            } => Box::new(
                indices
                    .iter()
                    .zip(values)
                    .map(|(coords, &v)| (coords.clone(), v)),
            ),
        }
    }

    /// Iterate over the explicit entries whose coordinate along `mode` is
    /// `index`.
    ///
    /// This is the access pattern of the per-entity Gibbs update: all
    /// observations in one fiber of one mode. For dense blocks this is the
    /// complete fiber; for sparse blocks it uses the prebuilt index.
    pub fn mode_entries(
        &self,
        mode: usize,
        index: usize,
    ) -> Box<dyn Iterator<Item = (Vec<usize>, f64)> + '_> {
        debug_assert!(mode < self.rank());
        debug_assert!(index < self.dims[mode]);
        match &self.storage {
            Storage::Dense(data) => {
                let dims = self.dims.clone();
                let other: usize = dims
                    .iter()
                    .enumerate()
                    .filter(|&(m, _)| m != mode)
                    .map(|(_, &d)| d)
                    .product();
                Box::new((0..other).map(move |flat| {
                    let coords = unravel_with_fixed(flat, &dims, mode, index);
                    let v = data[coords.as_slice()];
                    (coords, v)
                }))
            }
            Storage::Sparse {
                indices, values, ..
            } => Box::new(
                self.mode_index[mode][index]
                    .iter()
                    .map(move |&id| (indices[id].clone(), values[id])),
            ),
        }
    }

    /// Sum of all explicit values.
    pub fn sum(&self) -> f64 {
        match &self.storage {
            Storage::Dense(data) => data.iter().sum(),
            Storage::Sparse { values, .. } => values.iter().sum(),
        }
    }

    /// Mean over the observed cells.
    pub fn mean(&self) -> f64 {
        self.sum() / self.num_observed() as f64
    }

    /// Total variance of the observed cells, used to seed the adaptive
    /// noise model. Implicit zeros of non-scarce sparse blocks contribute.
    /// Falls back to 1.0 when the variance is degenerate.
    pub fn var_total(&self) -> f64 {
        let n = self.num_observed() as f64;
        let mean = self.mean();
        let mut se = 0.0;
        match &self.storage {
            Storage::Dense(data) => {
                for &v in data.iter() {
                    se += (v - mean) * (v - mean);
                }
            }
            Storage::Sparse { values, scarce, .. } => {
                for &v in values {
                    se += (v - mean) * (v - mean);
                }
                if !*scarce {
                    let implicit = self.size() - values.len();
                    se += implicit as f64 * mean * mean;
                }
            }
        }
        let var = se / n;
        if var <= 0.0 || var.is_nan() {
            1.0
        } else {
            var
        }
    }

    /// Check that another block declares the same shape.
    pub fn check_same_dims(&self, other: &Block) -> Result<(), BlockError> {
        if self.dims != other.dims {
            return Err(BlockError::ShapeDisagreement {
                left: self.dims.clone(),
                right: other.dims.to_vec(),
            });
        }
        Ok(())
    }
}

/// Row-major linear index to multi-index.
fn unravel(flat: usize, dims: &[usize]) -> Vec<usize> {
    let mut coords = vec![0; dims.len()];
    let mut remaining = flat;
    for (mode, &d) in dims.iter().enumerate().rev() {
        coords[mode] = remaining % d;
        remaining /= d;
    }
    coords
}

/// Unravel a linear index over all modes except `fixed_mode`, which is
/// pinned to `fixed_index`.
fn unravel_with_fixed(
    flat: usize,
    dims: &[usize],
    fixed_mode: usize,
    fixed_index: usize,
) -> Vec<usize> {
    let mut coords = vec![0; dims.len()];
    let mut remaining = flat;
    for (mode, &d) in dims.iter().enumerate().rev() {
        if mode == fixed_mode {
            continue;
        }
        coords[mode] = remaining % d;
        remaining /= d;
    }
    coords[fixed_mode] = fixed_index;
    coords
}
