//! Observation-noise models.
//!
//! Each data block carries one noise model. The model contributes the
//! precision weighting of the per-entity likelihood terms, translates an
//! observed value into the value the Gaussian update consumes (identity for
//! real-valued noise, a truncated-normal latent draw for probit), and
//! resamples its own state from the residuals once per iteration.

use scirs2_core::random::rngs::StdRng;
use serde::{Deserialize, Serialize};

use tensorfact_core::Block;

use crate::rand::{rand_gamma, rand_truncated_normal};

/// User-facing noise configuration, one per data block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NoiseConfig {
    /// Constant known precision.
    Fixed { precision: f64 },
    /// Precision resampled each iteration from the residual sum of squares.
    Sampled { precision: f64 },
    /// Like `Sampled`, but anchored to the data variance through a
    /// signal-to-noise prior and clamped from above.
    Adaptive { sn_init: f64, sn_max: f64 },
    /// Binary observations through a probit link at `threshold`.
    Probit { threshold: f64 },
}

impl Default for NoiseConfig {
    fn default() -> Self {
        NoiseConfig::Fixed { precision: 5.0 }
    }
}

/// Live noise state attached to one block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NoiseModel {
    Fixed {
        precision: f64,
    },
    Sampled {
        precision: f64,
    },
    Adaptive {
        precision: f64,
        precision_max: f64,
        var_total: f64,
    },
    Probit {
        threshold: f64,
    },
}

impl NoiseModel {
    /// Instantiate the live state for one block.
    ///
    /// The adaptive model converts its signal-to-noise bounds into an
    /// initial and maximal precision using the block's total variance.
    pub fn init(config: &NoiseConfig, block: &Block) -> Self {
        match *config {
            NoiseConfig::Fixed { precision } => NoiseModel::Fixed { precision },
            NoiseConfig::Sampled { precision } => NoiseModel::Sampled { precision },
            NoiseConfig::Adaptive { sn_init, sn_max } => {
                let var_total = block.var_total();
                NoiseModel::Adaptive {
                    precision: (sn_init + 1.0) / var_total,
                    precision_max: (sn_max + 1.0) / var_total,
                    var_total,
                }
            }
            NoiseConfig::Probit { threshold } => NoiseModel::Probit { threshold },
        }
    }

    /// Current precision weighting of the likelihood.
    ///
    /// The probit latent response has unit variance by construction.
    pub fn precision(&self) -> f64 {
        match *self {
            NoiseModel::Fixed { precision }
            | NoiseModel::Sampled { precision }
            | NoiseModel::Adaptive { precision, .. } => precision,
            NoiseModel::Probit { .. } => 1.0,
        }
    }

    /// Classification threshold, when this model defines one.
    pub fn threshold(&self) -> Option<f64> {
        match *self {
            NoiseModel::Probit { threshold } => Some(threshold),
            _ => None,
        }
    }

    /// Precision-weighted response value for one observation.
    ///
    /// Real-valued models return `precision * observed`. Probit draws the
    /// Albert-Chib latent response: a unit-variance normal around the
    /// current prediction, truncated to the side of zero selected by
    /// thresholding the observation.
    pub fn weighted_response(&self, pred: f64, observed: f64, rng: &mut StdRng) -> f64 {
        match *self {
            NoiseModel::Probit { threshold } => {
                rand_truncated_normal(rng, pred, observed > threshold)
            }
            _ => self.precision() * observed,
        }
    }

    /// Resample the noise state from the residual sum of squares over `n`
    /// observed cells.
    ///
    /// With an empty residual set the precision is held at its previous
    /// value. Fixed and probit models have no state to update.
    pub fn update(&mut self, sumsq: f64, n: usize, rng: &mut StdRng) {
        if n == 0 {
            return;
        }
        match self {
            NoiseModel::Fixed { .. } | NoiseModel::Probit { .. } => {}
            NoiseModel::Sampled { precision } => {
                // Jeffreys-style weak prior on the precision.
                let shape = 1e-3 + 0.5 * n as f64;
                let scale = 1.0 / (1e-3 + 0.5 * sumsq);
                *precision = rand_gamma(rng, shape, scale);
            }
            NoiseModel::Adaptive {
                precision,
                precision_max,
                var_total,
            } => {
                // One pseudo-observation at the data variance anchors the
                // posterior, then clamp at the configured ceiling.
                let shape = 0.5 * (n as f64 + 1.0);
                let scale = 1.0 / (0.5 * (sumsq + *var_total));
                *precision = rand_gamma(rng, shape, scale).min(*precision_max);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::random::SeedableRng;

    fn sample_block() -> Block {
        Block::sparse(
            vec![vec![0, 0], vec![1, 1], vec![0, 1]],
            vec![1.0, 2.0, 3.0],
            vec![2, 2],
            true,
        )
        .unwrap()
    }

    #[test]
    fn adaptive_precisions_derive_from_variance() {
        let block = sample_block();
        let model = NoiseModel::init(
            &NoiseConfig::Adaptive {
                sn_init: 1.0,
                sn_max: 10.0,
            },
            &block,
        );
        let var = block.var_total();
        match model {
            NoiseModel::Adaptive {
                precision,
                precision_max,
                ..
            } => {
                assert!((precision - 2.0 / var).abs() < 1e-12);
                assert!((precision_max - 11.0 / var).abs() < 1e-12);
            }
            _ => panic!("expected adaptive model"),
        }
    }

    #[test]
    fn sampled_precision_tracks_residuals() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut model = NoiseModel::Sampled { precision: 1.0 };
        // Tiny residuals over many points drive the precision up.
        model.update(0.01, 1000, &mut rng);
        assert!(model.precision() > 100.0);
        // Large residuals drive it back down.
        model.update(1.0e4, 1000, &mut rng);
        assert!(model.precision() < 1.0);
    }

    #[test]
    fn adaptive_precision_is_clamped() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut model = NoiseModel::Adaptive {
            precision: 1.0,
            precision_max: 5.0,
            var_total: 1.0,
        };
        model.update(1e-9, 10_000, &mut rng);
        assert!(model.precision() <= 5.0);
    }

    #[test]
    fn empty_residual_set_holds_precision() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut model = NoiseModel::Sampled { precision: 7.5 };
        model.update(0.0, 0, &mut rng);
        assert_eq!(model.precision(), 7.5);
    }

    #[test]
    fn probit_response_lands_on_observed_side() {
        let mut rng = StdRng::seed_from_u64(4);
        let model = NoiseModel::Probit { threshold: 0.5 };
        for _ in 0..100 {
            assert!(model.weighted_response(-0.3, 1.0, &mut rng) > 0.0);
            assert!(model.weighted_response(0.3, 0.0, &mut rng) < 0.0);
        }
    }
}
