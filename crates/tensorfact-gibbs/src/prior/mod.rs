//! Per-mode latent priors.
//!
//! Every prior implements the same contract: given the current model and
//! the data blocks, resample every latent row of its mode, then resample
//! its own hyperparameters. The likelihood side of the conditional is
//! shared across priors and lives here; the prior families differ only in
//! what they add on top of it.

use scirs2_core::ndarray_ext::{Array1, Array2};
use scirs2_core::random::rngs::StdRng;

#[cfg(feature = "parallel")]
use scirs2_core::parallel_ops::*;

use tensorfact_core::Block;

use crate::config::PriorKind;
use crate::error::EngineError;
use crate::model::Model;
use crate::noise::NoiseModel;
use crate::rand::derive_rng;

pub mod macau;
pub mod normal;
pub mod spikeslab;

pub use macau::MacauPrior;
pub use normal::NormalPrior;
pub use spikeslab::SpikeAndSlabPrior;

/// A prior bound to one mode, dispatched statically.
#[derive(Debug)]
pub enum Updater {
    Normal(NormalPrior),
    Macau(MacauPrior),
    SpikeAndSlab(SpikeAndSlabPrior),
}

impl Updater {
    pub fn kind(&self) -> PriorKind {
        match self {
            Updater::Normal(_) => PriorKind::Normal,
            Updater::Macau(_) => PriorKind::Macau,
            Updater::SpikeAndSlab(_) => PriorKind::SpikeAndSlab,
        }
    }

    /// Resample every latent row of this prior's mode, then the prior's
    /// hyperparameters. Returns human-readable convergence warnings.
    pub fn sample_mode(
        &mut self,
        model: &mut Model,
        blocks: &[(Block, NoiseModel)],
        iter: usize,
        seed: u64,
        rng: &mut StdRng,
    ) -> Result<Vec<String>, EngineError> {
        match self {
            Updater::Normal(p) => p.sample_mode(model, blocks, iter, seed, rng),
            Updater::Macau(p) => p.sample_mode(model, blocks, iter, seed, rng),
            Updater::SpikeAndSlab(p) => p.sample_mode(model, blocks, iter, seed, rng),
        }
    }
}

/// Per-block precomputed likelihood Gram matrices.
///
/// For a complete block the likelihood precision contribution of every
/// entity in `mode` is the same noise-weighted entrywise product of the
/// other modes' Gram matrices; compute it once per sweep.
pub(crate) fn block_grams(
    model: &Model,
    mode: usize,
    blocks: &[(Block, NoiseModel)],
) -> Vec<Option<Array2<f64>>> {
    blocks
        .iter()
        .map(|(block, noise)| {
            if block.is_complete() {
                Some(model.other_gram_product(mode) * noise.precision())
            } else {
                None
            }
        })
        .collect()
}

/// Accumulate the likelihood terms `(rr, mm)` of one entity: the
/// precision-weighted covariate sum and the precision contribution of the
/// observations in its fiber.
pub(crate) fn likelihood_stats(
    model: &Model,
    mode: usize,
    entity: usize,
    blocks: &[(Block, NoiseModel)],
    grams: &[Option<Array2<f64>>],
    rng: &mut StdRng,
) -> (Array1<f64>, Array2<f64>) {
    let k = model.num_latent();
    let mut rr = Array1::<f64>::zeros(k);
    let mut mm = Array2::<f64>::zeros((k, k));
    let own = model.factor(mode).row(entity);

    for ((block, noise), gram) in blocks.iter().zip(grams) {
        let alpha = noise.precision();
        if let Some(gram) = gram {
            mm += gram;
        }
        for (coords, y) in block.mode_entries(mode, entity) {
            let v = model.other_rows_product(mode, &coords);
            let pred = v.dot(&own);
            let val = noise.weighted_response(pred, y, rng);
            for j in 0..k {
                rr[j] += v[j] * val;
            }
            if gram.is_none() {
                for j in 0..k {
                    for l in 0..k {
                        mm[[j, l]] += alpha * v[j] * v[l];
                    }
                }
            }
        }
    }
    (rr, mm)
}

/// Map a fallible per-entity computation over all entities of a mode,
/// in parallel when the `parallel` feature is enabled.
///
/// Results are returned in entity order regardless of scheduling; combined
/// with per-entity RNG streams this keeps sweeps deterministic.
pub(crate) fn map_entities<T, F>(extent: usize, f: F) -> Result<Vec<T>, EngineError>
where
    T: Send,
    F: Fn(usize) -> Result<T, EngineError> + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        (0..extent).into_par_iter().map(f).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        (0..extent).map(f).collect()
    }
}

/// Open the RNG stream of one entity update.
pub(crate) fn entity_rng(seed: u64, iter: usize, mode: usize, entity: usize) -> StdRng {
    derive_rng(seed, &[iter as u64, mode as u64, entity as u64])
}
