//! Multivariate normal prior with a Normal-Wishart hyperprior.

use scirs2_core::ndarray_ext::{Array1, Array2};
use scirs2_core::random::rngs::StdRng;

use tensorfact_core::Block;

use crate::error::EngineError;
use crate::model::Model;
use crate::noise::NoiseModel;
use crate::rand::{cond_normal_wishart, sample_posterior};

use super::{block_grams, entity_rng, likelihood_stats, map_entities};

/// Shared-mean normal prior over all entities of one mode.
///
/// The mean and precision carry a conjugate Normal-Wishart hyperprior and
/// are resampled from the freshly drawn factor rows after each sweep.
#[derive(Debug)]
pub struct NormalPrior {
    mode: usize,
    mu: Array1<f64>,
    lambda: Array2<f64>,
    // Normal-Wishart hyperprior constants.
    mu0: Array1<f64>,
    b0: f64,
    wi: Array2<f64>,
    df: f64,
}

impl NormalPrior {
    pub fn new(mode: usize, num_latent: usize) -> Self {
        Self {
            mode,
            mu: Array1::zeros(num_latent),
            lambda: Array2::eye(num_latent) * 10.0,
            mu0: Array1::zeros(num_latent),
            b0: 2.0,
            wi: Array2::eye(num_latent),
            df: num_latent as f64,
        }
    }

    pub fn mu(&self) -> &Array1<f64> {
        &self.mu
    }

    pub fn lambda(&self) -> &Array2<f64> {
        &self.lambda
    }

    pub(crate) fn sample_mode(
        &mut self,
        model: &mut Model,
        blocks: &[(Block, NoiseModel)],
        iter: usize,
        seed: u64,
        rng: &mut StdRng,
    ) -> Result<Vec<String>, EngineError> {
        let mode = self.mode;
        let extent = model.dims()[mode];
        let grams = block_grams(model, mode, blocks);
        let lambda_mu = self.lambda.dot(&self.mu);

        let model_ref = &*model;
        let rows = map_entities(extent, |n| {
            let mut rng_n = entity_rng(seed, iter, mode, n);
            let (mut rr, mut mm) = likelihood_stats(model_ref, mode, n, blocks, &grams, &mut rng_n);
            rr += &lambda_mu;
            mm += &self.lambda;
            sample_posterior(&mut rng_n, &mm, &rr)
        })?;

        let factor = model.factor_mut(mode);
        for (n, row) in rows.iter().enumerate() {
            factor.row_mut(n).assign(row);
        }

        self.update_hyper(model.factor(mode), rng)
    }

    /// Conditional Normal-Wishart draw from the sufficient statistics of
    /// the current factor matrix.
    fn update_hyper(
        &mut self,
        factor: &Array2<f64>,
        rng: &mut StdRng,
    ) -> Result<Vec<String>, EngineError> {
        let n = factor.nrows();
        let nn_sum = factor.t().dot(factor);
        let nu_sum = factor.sum_axis(scirs2_core::ndarray_ext::Axis(0));
        let (mu, lambda) = cond_normal_wishart(
            rng, n, &nn_sum, &nu_sum, &self.mu0, self.b0, &self.wi, self.df,
        )?;
        self.mu = mu;
        self.lambda = lambda;
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::random::SeedableRng;

    #[test]
    fn sweep_pulls_factors_toward_data() {
        // 2x2 complete matrix of constant 2.0 with one latent component:
        // after a few sweeps under tight noise, predictions approach 2.0.
        let data = scirs2_core::ndarray_ext::ArrayD::from_elem(vec![2, 2], 2.0);
        let block = Block::dense(data).unwrap();
        let blocks = vec![(block, NoiseModel::Fixed { precision: 100.0 })];

        let mut rng = StdRng::seed_from_u64(11);
        let mut model = Model::init(1, &[2, 2], &mut rng);
        let mut priors = vec![NormalPrior::new(0, 1), NormalPrior::new(1, 1)];

        for iter in 0..50 {
            for p in priors.iter_mut() {
                p.sample_mode(&mut model, &blocks, iter, 11, &mut rng).unwrap();
            }
        }
        let pred = model.predict(&[0, 1]);
        assert!((pred - 2.0).abs() < 0.5, "pred {pred}");
    }

    #[test]
    fn hyper_update_tracks_factor_scale() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut prior = NormalPrior::new(0, 2);
        // Rows centered far from zero should drag mu along.
        let factor = Array2::from_shape_fn((200, 2), |(i, _)| 5.0 + (i % 3) as f64 * 0.01);
        prior.update_hyper(&factor, &mut rng).unwrap();
        assert!(prior.mu()[0] > 3.0, "mu {:?}", prior.mu());
        assert!(prior.mu()[1] > 3.0);
    }
}
