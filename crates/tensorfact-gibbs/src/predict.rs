//! Prediction sessions over saved checkpoints.
//!
//! A [`PredictSession`] is read-only: it restores the factor matrices from
//! a checkpoint and serves point predictions for single cells, coordinate
//! lists or the full reconstructed tensor. The training-time test
//! aggregate, if one was saved, rides along for entries that already have
//! posterior statistics.

use std::path::Path;

use scirs2_core::ndarray_ext::ArrayD;

use tensorfact_core::BlockError;

use crate::checkpoint::Checkpoint;
use crate::error::EngineError;
use crate::model::Model;
use crate::result::{PredictionEntry, Predictions};

pub struct PredictSession {
    model: Model,
    dims: Vec<usize>,
    predictions: Option<Predictions>,
}

impl PredictSession {
    /// Restore a session from a checkpoint file.
    pub fn from_checkpoint(path: &Path) -> Result<Self, EngineError> {
        let ckpt = Checkpoint::load(path)?;
        let model = ckpt.to_model()?;
        let dims = ckpt.dims();
        Ok(Self {
            model,
            dims,
            predictions: ckpt.predictions,
        })
    }

    /// Wrap an in-memory model directly.
    pub fn from_model(model: Model) -> Self {
        let dims = model.dims();
        Self {
            model,
            dims,
            predictions: None,
        }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Posterior aggregate collected during training, if it was saved.
    pub fn training_predictions(&self) -> Option<&Predictions> {
        self.predictions.as_ref()
    }

    /// Predict one cell from the restored factors.
    ///
    /// Always factor-derived, so it agrees with [`predict_all`] exactly;
    /// posterior statistics collected during training are available through
    /// [`training_predictions`].
    ///
    /// [`predict_all`]: Self::predict_all
    /// [`training_predictions`]: Self::training_predictions
    pub fn predict_one(&self, coords: &[usize]) -> Result<PredictionEntry, EngineError> {
        self.check_coords(coords)?;
        let value = self.model.predict(coords);
        Ok(PredictionEntry::from_point(coords.to_vec(), f64::NAN, value))
    }

    /// Predict a list of cells.
    pub fn predict_some(&self, coords: &[Vec<usize>]) -> Result<Vec<PredictionEntry>, EngineError> {
        coords.iter().map(|c| self.predict_one(c)).collect()
    }

    /// Reconstruct the full tensor of point predictions.
    pub fn predict_all(&self) -> ArrayD<f64> {
        ArrayD::from_shape_fn(self.dims.clone(), |ix| {
            let coords: Vec<usize> = (0..self.dims.len()).map(|m| ix[m]).collect();
            self.model.predict(&coords)
        })
    }

    fn check_coords(&self, coords: &[usize]) -> Result<(), EngineError> {
        if coords.len() != self.dims.len() {
            return Err(EngineError::Block(BlockError::CoordArity {
                got: coords.len(),
                expected: self.dims.len(),
            }));
        }
        for (&c, &extent) in coords.iter().zip(&self.dims) {
            if c >= extent {
                return Err(EngineError::Block(BlockError::CoordOutOfBounds {
                    coords: coords.to_vec(),
                    dims: self.dims.clone(),
                }));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::ndarray_ext::array;

    fn session() -> PredictSession {
        PredictSession::from_model(Model::from_factors(
            1,
            vec![array![[2.0], [3.0]], array![[1.0], [4.0]]],
        ))
    }

    #[test]
    fn point_predictions_follow_factors() {
        let s = session();
        let entry = s.predict_one(&[1, 1]).unwrap();
        assert_eq!(entry.pred_1sample, 12.0);
        assert_eq!(entry.pred_avg, 12.0);
        assert_eq!(entry.num_samples, 1);
    }

    #[test]
    fn predict_all_is_idempotent() {
        let s = session();
        let a = s.predict_all();
        let b = s.predict_all();
        assert_eq!(a, b);
        assert_eq!(a[[0, 1]], 8.0);
    }

    #[test]
    fn bad_coordinates_are_rejected() {
        let s = session();
        assert!(matches!(
            s.predict_one(&[0]),
            Err(EngineError::Block(BlockError::CoordArity { .. }))
        ));
        assert!(matches!(
            s.predict_one(&[0, 5]),
            Err(EngineError::Block(BlockError::CoordOutOfBounds { .. }))
        ));
    }
}
