//! Checkpoint persistence.
//!
//! A checkpoint captures everything needed to resume training or open a
//! prediction session: config, factor matrices, noise states, prediction
//! aggregates and the iteration counter. Files are written through a
//! temporary sibling and atomically renamed, and each save removes the
//! previous checkpoint once the new one is durable.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use scirs2_core::ndarray_ext::Array2;

use crate::config::SessionConfig;
use crate::model::Model;
use crate::noise::NoiseModel;
use crate::result::Predictions;

/// Bump on any incompatible layout change.
const FORMAT_VERSION: u32 = 1;
const MAGIC: &[u8; 8] = b"TFCKPT01";

/// Errors raised while persisting or recovering checkpoints.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint io: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt checkpoint: {0}")]
    Corrupt(String),

    #[error("checkpoint format version {found} is not supported (expected {expected})")]
    Version { found: u32, expected: u32 },
}

/// Serialized factor matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FactorData {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

/// A complete training snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    version: u32,
    pub config: SessionConfig,
    pub iter: usize,
    factors: Vec<FactorData>,
    pub noise: Vec<NoiseModel>,
    pub predictions: Option<Predictions>,
}

impl Checkpoint {
    pub fn new(
        config: SessionConfig,
        iter: usize,
        model: &Model,
        noise: Vec<NoiseModel>,
        predictions: Option<Predictions>,
    ) -> Self {
        let factors = (0..model.num_modes())
            .map(|m| {
                let f = model.factor(m);
                FactorData {
                    rows: f.nrows(),
                    cols: f.ncols(),
                    data: f.iter().copied().collect(),
                }
            })
            .collect();
        Self {
            version: FORMAT_VERSION,
            config,
            iter,
            factors,
            noise,
            predictions,
        }
    }

    /// Rebuild the latent model from the stored factors.
    pub fn to_model(&self) -> Result<Model, CheckpointError> {
        let mut factors = Vec::with_capacity(self.factors.len());
        for f in &self.factors {
            if f.cols != self.config.num_latent || f.data.len() != f.rows * f.cols {
                return Err(CheckpointError::Corrupt(format!(
                    "factor shape {}x{} disagrees with {} stored values",
                    f.rows,
                    f.cols,
                    f.data.len()
                )));
            }
            let arr = Array2::from_shape_vec((f.rows, f.cols), f.data.clone())
                .map_err(|e| CheckpointError::Corrupt(e.to_string()))?;
            factors.push(arr);
        }
        Ok(Model::from_factors(self.config.num_latent, factors))
    }

    /// Mode extents recorded in the snapshot.
    pub fn dims(&self) -> Vec<usize> {
        self.factors.iter().map(|f| f.rows).collect()
    }

    /// Write atomically: encode, write a temporary sibling, fsync, rename,
    /// then drop the previous checkpoint at `previous` if one is given.
    pub fn save(&self, path: &Path, previous: Option<&Path>) -> Result<(), CheckpointError> {
        let encoded = bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CheckpointError::Corrupt(e.to_string()))?;

        let tmp = tmp_sibling(path);
        {
            let mut bytes = Vec::with_capacity(MAGIC.len() + encoded.len());
            bytes.extend_from_slice(MAGIC);
            bytes.extend_from_slice(&encoded);
            fs::write(&tmp, &bytes)?;
            let f = fs::File::open(&tmp)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, path)?;

        if let Some(prev) = previous {
            if prev != path && prev.exists() {
                fs::remove_file(prev)?;
            }
        }
        Ok(())
    }

    /// Load and validate a checkpoint file.
    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        let bytes = fs::read(path)?;
        if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
            return Err(CheckpointError::Corrupt(
                "missing checkpoint header".to_string(),
            ));
        }
        let (ckpt, _): (Checkpoint, usize) =
            bincode::serde::decode_from_slice(&bytes[MAGIC.len()..], bincode::config::standard())
                .map_err(|e| CheckpointError::Corrupt(e.to_string()))?;
        if ckpt.version != FORMAT_VERSION {
            return Err(CheckpointError::Version {
                found: ckpt.version,
                expected: FORMAT_VERSION,
            });
        }
        // Shape sanity before anyone touches the factors.
        ckpt.to_model()?;
        Ok(ckpt)
    }
}

/// Checkpoint file name for one iteration.
pub fn checkpoint_file(dir: &Path, iter: usize) -> PathBuf {
    dir.join(format!("checkpoint-{iter:06}.bin"))
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_owned()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::random::{rngs::StdRng, SeedableRng};

    fn sample_checkpoint() -> Checkpoint {
        let mut rng = StdRng::seed_from_u64(3);
        let config = SessionConfig {
            num_latent: 2,
            ..Default::default()
        };
        let model = Model::init(2, &[3, 4], &mut rng);
        Checkpoint::new(
            config,
            17,
            &model,
            vec![NoiseModel::Fixed { precision: 5.0 }],
            None,
        )
    }

    #[test]
    fn roundtrip_preserves_factors() {
        let dir = tempfile::tempdir().unwrap();
        let path = checkpoint_file(dir.path(), 17);
        let ckpt = sample_checkpoint();
        ckpt.save(&path, None).unwrap();

        let loaded = Checkpoint::load(&path).unwrap();
        assert_eq!(loaded.iter, 17);
        assert_eq!(loaded.dims(), vec![3, 4]);
        let a = ckpt.to_model().unwrap();
        let b = loaded.to_model().unwrap();
        for m in 0..2 {
            assert_eq!(a.factor(m), b.factor(m));
        }
    }

    #[test]
    fn save_removes_previous_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let first = checkpoint_file(dir.path(), 10);
        let second = checkpoint_file(dir.path(), 20);
        let ckpt = sample_checkpoint();
        ckpt.save(&first, None).unwrap();
        ckpt.save(&second, Some(&first)).unwrap();
        assert!(!first.exists());
        assert!(second.exists());
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = checkpoint_file(dir.path(), 1);
        let ckpt = sample_checkpoint();
        ckpt.save(&path, None).unwrap();

        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        assert!(matches!(
            Checkpoint::load(&path),
            Err(CheckpointError::Corrupt(_))
        ));
    }

    #[test]
    fn wrong_header_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-checkpoint.bin");
        fs::write(&path, b"garbage").unwrap();
        assert!(matches!(
            Checkpoint::load(&path),
            Err(CheckpointError::Corrupt(_))
        ));
    }
}
