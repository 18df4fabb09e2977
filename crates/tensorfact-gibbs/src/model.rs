//! Latent factor model.
//!
//! One factor matrix per mode, entities in rows and latent components in
//! columns. A prediction for a cell is the sum over components of the
//! entrywise product of the corresponding factor rows; for two modes this
//! is the usual dot product of a row of U and a row of V.

use scirs2_core::ndarray_ext::{Array1, Array2};
use scirs2_core::random::rngs::StdRng;

use tensorfact_core::Block;

use crate::rand::randn_matrix;

/// Per-mode latent factor matrices of shape `(extent, num_latent)`.
#[derive(Debug, Clone)]
pub struct Model {
    num_latent: usize,
    factors: Vec<Array2<f64>>,
}

impl Model {
    /// Initialize every factor entry from a standard normal.
    pub fn init(num_latent: usize, dims: &[usize], rng: &mut StdRng) -> Self {
        let factors = dims
            .iter()
            .map(|&extent| randn_matrix(rng, extent, num_latent))
            .collect();
        Self {
            num_latent,
            factors,
        }
    }

    /// Rebuild a model from stored factor matrices.
    pub fn from_factors(num_latent: usize, factors: Vec<Array2<f64>>) -> Self {
        debug_assert!(factors.iter().all(|f| f.ncols() == num_latent));
        Self {
            num_latent,
            factors,
        }
    }

    pub fn num_latent(&self) -> usize {
        self.num_latent
    }

    pub fn num_modes(&self) -> usize {
        self.factors.len()
    }

    /// Mode extents, in order.
    pub fn dims(&self) -> Vec<usize> {
        self.factors.iter().map(|f| f.nrows()).collect()
    }

    pub fn factor(&self, mode: usize) -> &Array2<f64> {
        &self.factors[mode]
    }

    pub fn factor_mut(&mut self, mode: usize) -> &mut Array2<f64> {
        &mut self.factors[mode]
    }

    /// Predict the value of one cell.
    pub fn predict(&self, coords: &[usize]) -> f64 {
        debug_assert_eq!(coords.len(), self.factors.len());
        // Two-mode fast path: plain row dot product.
        if let [u, v] = self.factors.as_slice() {
            let (i, j) = (coords[0], coords[1]);
            return (0..self.num_latent)
                .map(|k| u[[i, k]] * v[[j, k]])
                .sum();
        }
        (0..self.num_latent)
            .map(|k| {
                self.factors
                    .iter()
                    .zip(coords)
                    .map(|(f, &c)| f[[c, k]])
                    .product::<f64>()
            })
            .sum()
    }

    /// Entrywise product of factor rows over every mode except `mode`, the
    /// covariate vector of the per-entity likelihood term.
    pub fn other_rows_product(&self, mode: usize, coords: &[usize]) -> Array1<f64> {
        let mut v = Array1::<f64>::ones(self.num_latent);
        for (m, f) in self.factors.iter().enumerate() {
            if m == mode {
                continue;
            }
            let row = f.row(coords[m]);
            for k in 0..self.num_latent {
                v[k] *= row[k];
            }
        }
        v
    }

    /// Entrywise product of the Gram matrices of every mode except `mode`.
    ///
    /// For complete blocks the likelihood precision of each entity in
    /// `mode` is the noise precision times this matrix.
    pub fn other_gram_product(&self, mode: usize) -> Array2<f64> {
        let k = self.num_latent;
        let mut prod = Array2::<f64>::ones((k, k));
        for (m, f) in self.factors.iter().enumerate() {
            if m == mode {
                continue;
            }
            prod = &prod * &f.t().dot(f);
        }
        prod
    }

    /// Frobenius norm of each factor matrix.
    pub fn norms(&self) -> Vec<f64> {
        self.factors
            .iter()
            .map(|f| f.iter().map(|v| v * v).sum::<f64>().sqrt())
            .collect()
    }

    /// Sum of squared residuals over the observed cells of a block.
    ///
    /// Complete blocks use the Gram identity: the global sum of squared
    /// predictions is the total of the entrywise product of all mode Gram
    /// matrices, so only explicit entries need a pass.
    pub fn residual_sumsq(&self, block: &Block) -> f64 {
        if block.is_complete() {
            let k = self.num_latent;
            let mut prod = Array2::<f64>::ones((k, k));
            for f in &self.factors {
                prod = &prod * &f.t().dot(f);
            }
            let pred_sq_total = prod.sum();
            let mut correction = 0.0;
            for (coords, y) in block.entries() {
                let p = self.predict(&coords);
                correction += y * y - 2.0 * y * p;
            }
            (pred_sq_total + correction).max(0.0)
        } else {
            block
                .entries()
                .map(|(coords, y)| {
                    let r = y - self.predict(&coords);
                    r * r
                })
                .sum()
        }
    }

    /// Root mean squared error over the observed cells of a block.
    pub fn rmse(&self, block: &Block) -> f64 {
        (self.residual_sumsq(block) / block.num_observed() as f64).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::ndarray_ext::{array, ArrayD};
    use scirs2_core::random::SeedableRng;

    fn two_mode_model() -> Model {
        Model::from_factors(
            2,
            vec![
                array![[1.0, 2.0], [0.5, -1.0]],
                array![[3.0, 0.0], [1.0, 1.0], [0.0, 2.0]],
            ],
        )
    }

    #[test]
    fn predict_is_row_dot_product() {
        let model = two_mode_model();
        assert_eq!(model.predict(&[0, 0]), 3.0);
        assert_eq!(model.predict(&[0, 1]), 3.0);
        assert_eq!(model.predict(&[1, 2]), -2.0);
    }

    #[test]
    fn three_mode_predict_multiplies_all_rows() {
        let model = Model::from_factors(
            1,
            vec![array![[2.0]], array![[3.0]], array![[4.0]]],
        );
        assert_eq!(model.predict(&[0, 0, 0]), 24.0);
    }

    #[test]
    fn other_rows_product_skips_own_mode() {
        let model = two_mode_model();
        let v = model.other_rows_product(0, &[1, 1]);
        assert_eq!(v[0], 1.0);
        assert_eq!(v[1], 1.0);
        let u = model.other_rows_product(1, &[1, 0]);
        assert_eq!(u[0], 0.5);
        assert_eq!(u[1], -1.0);
    }

    #[test]
    fn residual_gram_identity_matches_direct_sum() {
        let mut rng = StdRng::seed_from_u64(9);
        let model = Model::init(3, &[4, 5], &mut rng);
        let data = ArrayD::from_shape_fn(vec![4, 5], |ix| (ix[0] + 2 * ix[1]) as f64 * 0.1);
        let block = Block::dense(data).unwrap();

        let direct: f64 = block
            .entries()
            .map(|(c, y)| {
                let r = y - model.predict(&c);
                r * r
            })
            .sum();
        assert!((model.residual_sumsq(&block) - direct).abs() < 1e-9);
    }

    #[test]
    fn init_shapes_follow_dims() {
        let mut rng = StdRng::seed_from_u64(1);
        let model = Model::init(4, &[3, 7, 2], &mut rng);
        assert_eq!(model.dims(), vec![3, 7, 2]);
        assert_eq!(model.factor(1).dim(), (7, 4));
        assert_eq!(model.norms().len(), 3);
    }
}
