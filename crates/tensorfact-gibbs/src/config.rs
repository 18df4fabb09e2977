//! Session configuration.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::noise::NoiseConfig;

/// Prior family assigned to one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriorKind {
    /// Multivariate normal with a Normal-Wishart hyperprior.
    Normal,
    /// Normal prior whose mean is regressed on side information.
    Macau,
    /// Spike-and-slab prior with per-component inclusion.
    SpikeAndSlab,
}

impl FromStr for PriorKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(PriorKind::Normal),
            "macau" => Ok(PriorKind::Macau),
            "spikeandslab" | "spike-and-slab" => Ok(PriorKind::SpikeAndSlab),
            other => Err(EngineError::Config(format!("unknown prior '{other}'"))),
        }
    }
}

/// Solver for the macau link-matrix normal equations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MacauSolver {
    /// Materialize FᵀF once and solve by Cholesky. Fast for moderate
    /// feature counts.
    Direct,
    /// Matrix-free conjugate gradient. Never forms FᵀF, suited to wide
    /// sparse feature matrices.
    Cg { tol: f64, max_iter: usize },
}

impl Default for MacauSolver {
    fn default() -> Self {
        MacauSolver::Cg {
            tol: 1e-6,
            max_iter: 1000,
        }
    }
}

/// Full configuration of a training session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Latent dimensionality shared by all modes.
    pub num_latent: usize,
    /// One prior per mode of the training block.
    pub priors: Vec<PriorKind>,
    /// Iterations discarded before aggregation starts.
    pub burnin: usize,
    /// Posterior samples collected after burn-in.
    pub num_samples: usize,
    /// Seed for all random draws. Equal seeds give bit-identical runs.
    pub seed: u64,
    /// Worker threads for per-entity updates; 0 uses all available cores.
    pub num_threads: usize,
    /// Noise model for the training block (and any auxiliary blocks).
    pub noise: NoiseConfig,
    /// Classification threshold for AUC reporting on real-valued data.
    /// Probit noise brings its own threshold and ignores this.
    pub threshold: Option<f64>,
    /// Regularization strength of the macau link matrix.
    pub beta_precision: f64,
    /// Resample `beta_precision` from its gamma posterior each iteration.
    pub sample_beta_precision: bool,
    /// Solver for the macau link-matrix system.
    pub macau_solver: MacauSolver,
    /// Save a checkpoint every this many iterations.
    pub checkpoint_freq: Option<usize>,
    /// Where checkpoints are written. Required when `checkpoint_freq` is
    /// set.
    pub checkpoint_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            num_latent: 16,
            priors: Vec::new(),
            burnin: 200,
            num_samples: 800,
            seed: 0,
            num_threads: 0,
            noise: NoiseConfig::default(),
            threshold: None,
            beta_precision: 10.0,
            sample_beta_precision: false,
            macau_solver: MacauSolver::default(),
            checkpoint_freq: None,
            checkpoint_path: None,
        }
    }
}

impl SessionConfig {
    /// Validate the knobs that do not depend on the data.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.num_latent == 0 {
            return Err(EngineError::Config(
                "num_latent must be at least 1".to_string(),
            ));
        }
        if self.num_samples == 0 {
            return Err(EngineError::Config(
                "num_samples must be at least 1".to_string(),
            ));
        }
        if self.beta_precision <= 0.0 {
            return Err(EngineError::Config(format!(
                "beta_precision must be positive, got {}",
                self.beta_precision
            )));
        }
        if let MacauSolver::Cg { tol, max_iter } = self.macau_solver {
            if tol <= 0.0 || max_iter == 0 {
                return Err(EngineError::Config(format!(
                    "invalid cg solver settings: tol {tol}, max_iter {max_iter}"
                )));
            }
        }
        match &self.noise {
            NoiseConfig::Fixed { precision } | NoiseConfig::Sampled { precision } => {
                if *precision <= 0.0 {
                    return Err(EngineError::Config(format!(
                        "noise precision must be positive, got {precision}"
                    )));
                }
            }
            NoiseConfig::Adaptive { sn_init, sn_max } => {
                if *sn_init <= 0.0 || *sn_max < *sn_init {
                    return Err(EngineError::Config(format!(
                        "adaptive noise needs 0 < sn_init <= sn_max, got {sn_init}, {sn_max}"
                    )));
                }
            }
            NoiseConfig::Probit { .. } => {}
        }
        if self.checkpoint_freq.is_some() && self.checkpoint_path.is_none() {
            return Err(EngineError::Config(
                "checkpoint_freq is set but checkpoint_path is not".to_string(),
            ));
        }
        if self.checkpoint_freq == Some(0) {
            return Err(EngineError::Config(
                "checkpoint_freq must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Total number of Gibbs iterations.
    pub fn total_iters(&self) -> usize {
        self.burnin + self.num_samples
    }
}
