//! Spike-and-slab prior with per-component inclusion.
//!
//! Each latent component of each entity is either drawn from a normal slab
//! or pinned to exactly zero, with the inclusion probability learned per
//! component. Components that lose every entity in a sweep stay off for
//! the rest of the run.

use scirs2_core::ndarray_ext::Array1;
use scirs2_core::random::{rngs::StdRng, Rng};

use tensorfact_core::Block;

use crate::error::EngineError;
use crate::model::Model;
use crate::noise::NoiseModel;
use crate::rand::{rand_gamma, randn};

use super::{block_grams, entity_rng, likelihood_stats, map_entities};

// Beta-Bernoulli and gamma hyperprior constants.
const PRIOR_BETA: f64 = 1.0;
const PRIOR_ALPHA_0: f64 = 1.0;
const PRIOR_BETA_0: f64 = 1.0;

#[derive(Debug)]
pub struct SpikeAndSlabPrior {
    mode: usize,
    /// Slab precision per component.
    alpha: Array1<f64>,
    /// Log prior odds of exclusion per component.
    log_r: Array1<f64>,
    /// Entities that kept each component in the previous sweep.
    zkeep: Array1<f64>,
}

impl SpikeAndSlabPrior {
    pub fn new(mode: usize, num_latent: usize) -> Self {
        Self {
            mode,
            alpha: Array1::ones(num_latent),
            log_r: Array1::zeros(num_latent),
            zkeep: Array1::from_elem(num_latent, f64::INFINITY),
        }
    }

    /// Number of components still active.
    pub fn active_components(&self) -> usize {
        self.zkeep.iter().filter(|&&z| z > 0.0).count()
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
        let k = model.num_latent();
        let extent = model.dims()[mode];
        let grams = block_grams(model, mode, blocks);

        let model_ref = &*model;
        let alpha = &self.alpha;
        let log_r = &self.log_r;
        let zkeep = &self.zkeep;
        let results = map_entities(extent, |n| {
            let mut rng_n = entity_rng(seed, iter, mode, n);
            let (rr, mm) = likelihood_stats(model_ref, mode, n, blocks, &grams, &mut rng_n);

            let mut row = model_ref.factor(mode).row(n).to_owned();
            let mut zcol = Array1::<f64>::zeros(k);
            let mut w2col = Array1::<f64>::zeros(k);
            for j in 0..k {
                // Conditional slab posterior of component j given the rest
                // of the row.
                let lambda_j = alpha[j] + mm[[j, j]];
                let mut dot = 0.0;
                for l in 0..k {
                    dot += row[l] * mm[[l, j]];
                }
                let mu_j = (rr[j] - dot + row[j] * mm[[j, j]]) / lambda_j;

                let z1 = log_r[j]
                    - 0.5 * (lambda_j * mu_j * mu_j - lambda_j.ln() + alpha[j].ln());
                let include = 1.0 / (1.0 + z1.exp());
                if zkeep[j] > 0.0 && rng_n.random::<f64>() < include {
                    row[j] = mu_j + randn(&mut rng_n) / lambda_j.sqrt();
                    zcol[j] += 1.0;
                    w2col[j] += row[j] * row[j];
                } else {
                    row[j] = 0.0;
                }
            }
            Ok((row, zcol, w2col))
        })?;

        let mut zcol = Array1::<f64>::zeros(k);
        let mut w2col = Array1::<f64>::zeros(k);
        let factor = model.factor_mut(mode);
        for (n, (row, z, w2)) in results.iter().enumerate() {
            factor.row_mut(n).assign(row);
            zcol += z;
            w2col += w2;
        }

        self.update_hyper(extent, &zcol, &w2col, rng);
        Ok(Vec::new())
    }

    fn update_hyper(
        &mut self,
        extent: usize,
        zcol: &Array1<f64>,
        w2col: &Array1<f64>,
        rng: &mut StdRng,
    ) {
        let d = extent as f64;
        for j in 0..self.alpha.len() {
            let r = (zcol[j] + PRIOR_BETA) / (d + PRIOR_BETA * d);
            self.log_r[j] = (1.0 - r).ln() - r.ln();
            self.alpha[j] = rand_gamma(
                rng,
                0.5 * zcol[j] + PRIOR_ALPHA_0,
                1.0 / (0.5 * w2col[j] + PRIOR_BETA_0),
            ) + 1e-7;
        }
        self.zkeep = zcol.clone();
    }
}
