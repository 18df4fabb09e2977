//! Training sessions.
//!
//! A [`TrainSession`] owns the data, the latent model, one prior per mode
//! and the noise state, and advances them one blocked Gibbs iteration at a
//! time. Each step resamples every mode, updates the noise from the
//! residuals, folds the sample into the test-set aggregate, and emits a
//! [`StatusSnapshot`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use scirs2_core::random::{rngs::StdRng, SeedableRng};
#[cfg(feature = "parallel")]
use scirs2_core::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tensorfact_core::{Block, SideInfo};

use crate::checkpoint::{checkpoint_file, Checkpoint};
use crate::config::{PriorKind, SessionConfig};
use crate::error::EngineError;
use crate::model::Model;
use crate::noise::NoiseModel;
use crate::prior::{MacauPrior, NormalPrior, SpikeAndSlabPrior, Updater};
use crate::result::{PredictionEntry, Predictions};

/// Where a session currently is in its schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Burnin,
    Sampling,
}

/// Per-iteration progress report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub phase: Phase,
    /// Global iteration, counted from 1.
    pub iter: usize,
    /// Iteration within the current phase, counted from 1.
    pub phase_iter: usize,
    /// Frobenius norm of each factor matrix.
    pub model_norms: Vec<f64>,
    pub train_rmse: f64,
    pub rmse_1sample: Option<f64>,
    pub rmse_avg: Option<f64>,
    pub auc_1sample: Option<f64>,
    pub auc_avg: Option<f64>,
    pub noise_precision: f64,
    /// Observed training cells processed per second during this step.
    pub cells_per_sec: f64,
    /// Wall time of this step, seconds.
    pub elapsed_secs: f64,
    /// Wall time since the session started, seconds.
    pub total_secs: f64,
    /// Non-fatal convergence warnings raised during this step.
    pub warnings: Vec<String>,
}

impl StatusSnapshot {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Shared cancellation handle; setting it stops the session between steps.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Running,
    Finished,
}

type Observer = Box<dyn FnMut(&StatusSnapshot) + Send>;

/// A fully initialized Gibbs training session.
pub struct TrainSession {
    config: SessionConfig,
    /// Likelihood blocks with their noise state; index 0 is the training
    /// block, the rest are auxiliary.
    blocks: Vec<(Block, NoiseModel)>,
    model: Model,
    updaters: Vec<Updater>,
    predictions: Option<Predictions>,
    rng: StdRng,
    iter: usize,
    state: SessionState,
    cancel: CancelFlag,
    observer: Option<Observer>,
    started: Instant,
    last_checkpoint: Option<PathBuf>,
}

impl std::fmt::Debug for TrainSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainSession")
            .field("config", &self.config)
            .field("iter", &self.iter)
            .field("state", &self.state)
            .field("last_checkpoint", &self.last_checkpoint)
            .finish_non_exhaustive()
    }
}

impl TrainSession {
    /// Validate the configuration against the data and build the initial
    /// model state. All shape and configuration errors surface here;
    /// nothing is sampled yet.
    pub fn new(
        config: SessionConfig,
        train: Block,
        test: Option<Block>,
        side_info: Vec<Option<Arc<SideInfo>>>,
        aux: Vec<Block>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let num_modes = train.rank();
        if config.priors.len() != num_modes {
            return Err(EngineError::Config(format!(
                "{} priors configured for {} modes",
                config.priors.len(),
                num_modes
            )));
        }
        if side_info.len() != num_modes {
            return Err(EngineError::Config(format!(
                "{} side-info slots for {} modes",
                side_info.len(),
                num_modes
            )));
        }
        if let Some(test) = &test {
            train.check_same_dims(test)?;
        }
        for block in &aux {
            train.check_same_dims(block)?;
        }

        let dims = train.dims().to_vec();
        for (mode, (kind, side)) in config.priors.iter().zip(&side_info).enumerate() {
            match (kind, side) {
                (PriorKind::Macau, Some(side)) => side.validate_rows(mode, dims[mode])?,
                (PriorKind::Macau, None) => {
                    return Err(EngineError::Config(format!(
                        "macau prior on mode {mode} needs side information"
                    )));
                }
                (_, Some(_)) => {
                    return Err(EngineError::Config(format!(
                        "side information on mode {mode} requires the macau prior"
                    )));
                }
                (_, None) => {}
            }
        }

        #[cfg(feature = "parallel")]
        {
            if config.num_threads > 0 {
                ThreadPoolBuilder::new()
                    .num_threads(config.num_threads)
                    .build_global()
                    .ok(); // Ignore error if already initialized
            }
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let model = Model::init(config.num_latent, &dims, &mut rng);

        let updaters = config
            .priors
            .iter()
            .zip(side_info)
            .enumerate()
            .map(|(mode, (kind, side))| match kind {
                PriorKind::Normal => Updater::Normal(NormalPrior::new(mode, config.num_latent)),
                PriorKind::SpikeAndSlab => {
                    Updater::SpikeAndSlab(SpikeAndSlabPrior::new(mode, config.num_latent))
                }
                PriorKind::Macau => Updater::Macau(MacauPrior::new(
                    mode,
                    config.num_latent,
                    side.unwrap_or_else(|| unreachable!()),
                    config.beta_precision,
                    config.sample_beta_precision,
                    config.macau_solver,
                )),
            })
            .collect();

        let train_noise = NoiseModel::init(&config.noise, &train);
        let threshold = train_noise.threshold().or(config.threshold);
        let predictions = test.as_ref().map(|t| Predictions::from_block(t, threshold));

        let mut blocks = Vec::with_capacity(1 + aux.len());
        blocks.push((train, train_noise));
        for block in aux {
            let noise = NoiseModel::init(&config.noise, &block);
            blocks.push((block, noise));
        }

        info!(
            num_modes,
            num_latent = config.num_latent,
            burnin = config.burnin,
            num_samples = config.num_samples,
            seed = config.seed,
            num_threads = config.num_threads,
            "session initialized"
        );

        Ok(Self {
            config,
            blocks,
            model,
            updaters,
            predictions,
            rng,
            iter: 0,
            state: SessionState::Running,
            cancel: CancelFlag::default(),
            observer: None,
            started: Instant::now(),
            last_checkpoint: None,
        })
    }

    /// Handle for cooperative cancellation from another thread.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Register a per-step progress callback.
    pub fn set_observer<F>(&mut self, f: F)
    where
        F: FnMut(&StatusSnapshot) + Send + 'static,
    {
        self.observer = Some(Box::new(f));
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn predictions(&self) -> Option<&Predictions> {
        self.predictions.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Completed iterations.
    pub fn iter(&self) -> usize {
        self.iter
    }

    pub fn phase(&self) -> Phase {
        if self.iter < self.config.burnin {
            Phase::Burnin
        } else {
            Phase::Sampling
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == SessionState::Finished
    }

    /// Advance one blocked Gibbs iteration.
    ///
    /// Returns `Ok(None)` once the schedule is exhausted. A step that
    /// returns an error leaves the last completed iteration intact.
    pub fn step(&mut self) -> Result<Option<StatusSnapshot>, EngineError> {
        if self.state == SessionState::Finished {
            return Ok(None);
        }
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled { iter: self.iter });
        }
        let step_start = Instant::now();
        let burnin = self.iter < self.config.burnin;
        let seed = self.config.seed;
        let iter = self.iter;

        let mut warnings = Vec::new();
        for updater in self.updaters.iter_mut() {
            let w = updater.sample_mode(&mut self.model, &self.blocks, iter, seed, &mut self.rng)?;
            warnings.extend(w);
        }

        for (block, noise) in self.blocks.iter_mut() {
            let sumsq = self.model.residual_sumsq(block);
            noise.update(sumsq, block.num_observed(), &mut self.rng);
        }

        if let Some(pred) = self.predictions.as_mut() {
            pred.update(&self.model, burnin);
        }

        self.iter += 1;
        if self.iter >= self.config.total_iters() {
            self.state = SessionState::Finished;
        }

        let snapshot = self.snapshot(burnin, step_start.elapsed().as_secs_f64(), warnings);
        for w in &snapshot.warnings {
            warn!(iter = snapshot.iter, "{w}");
        }
        info!(
            phase = ?snapshot.phase,
            iter = snapshot.iter,
            train_rmse = snapshot.train_rmse,
            rmse_avg = snapshot.rmse_avg,
            noise_precision = snapshot.noise_precision,
            "step"
        );
        debug!(status = %snapshot.to_json(), "step detail");

        if let Some(obs) = self.observer.as_mut() {
            obs(&snapshot);
        }
        self.maybe_checkpoint()?;
        Ok(Some(snapshot))
    }

    /// Run the remaining schedule to completion and return the finalized
    /// prediction entries (empty without a test block).
    pub fn run(&mut self) -> Result<Vec<PredictionEntry>, EngineError> {
        while self.step()?.is_some() {}
        Ok(self
            .predictions
            .as_ref()
            .map(|p| p.entries().to_vec())
            .unwrap_or_default())
    }

    fn snapshot(&self, burnin: bool, elapsed_secs: f64, warnings: Vec<String>) -> StatusSnapshot {
        let phase = if burnin { Phase::Burnin } else { Phase::Sampling };
        let phase_iter = if burnin {
            self.iter
        } else {
            self.iter - self.config.burnin
        };
        let (rmse_1sample, rmse_avg, auc_1sample, auc_avg) = match &self.predictions {
            Some(p) => (
                (!p.rmse_1sample.is_nan()).then_some(p.rmse_1sample),
                (!p.rmse_avg.is_nan()).then_some(p.rmse_avg),
                p.auc_1sample,
                p.auc_avg,
            ),
            None => (None, None, None, None),
        };
        StatusSnapshot {
            phase,
            iter: self.iter,
            phase_iter,
            model_norms: self.model.norms(),
            train_rmse: self.model.rmse(&self.blocks[0].0),
            rmse_1sample,
            rmse_avg,
            auc_1sample,
            auc_avg,
            noise_precision: self.blocks[0].1.precision(),
            cells_per_sec: self.blocks[0].0.num_observed() as f64 / elapsed_secs.max(f64::EPSILON),
            elapsed_secs,
            total_secs: self.started.elapsed().as_secs_f64(),
            warnings,
        }
    }

    /// Capture the current state as a checkpoint value.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint::new(
            self.config.clone(),
            self.iter,
            &self.model,
            self.blocks.iter().map(|(_, n)| n.clone()).collect(),
            self.predictions.clone(),
        )
    }

    fn maybe_checkpoint(&mut self) -> Result<(), EngineError> {
        let Some(freq) = self.config.checkpoint_freq else {
            return Ok(());
        };
        let due = self.iter % freq == 0 || self.state == SessionState::Finished;
        if !due {
            return Ok(());
        }
        let Some(dir) = self.config.checkpoint_path.clone() else {
            return Ok(());
        };
        let path = checkpoint_file(&dir, self.iter);
        self.checkpoint()
            .save(&path, self.last_checkpoint.as_deref())?;
        debug!(path = %path.display(), iter = self.iter, "checkpoint saved");
        self.last_checkpoint = Some(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::NoiseConfig;
    use scirs2_core::ndarray_ext::ArrayD;

    fn small_config(priors: Vec<PriorKind>) -> SessionConfig {
        SessionConfig {
            num_latent: 2,
            priors,
            burnin: 2,
            num_samples: 3,
            seed: 7,
            noise: NoiseConfig::Fixed { precision: 10.0 },
            ..Default::default()
        }
    }

    fn train_block() -> Block {
        let data = ArrayD::from_shape_fn(vec![3, 3], |ix| (ix[0] * 3 + ix[1]) as f64 * 0.5);
        Block::dense(data).unwrap()
    }

    #[test]
    fn prior_count_must_match_modes() {
        let err = TrainSession::new(
            small_config(vec![PriorKind::Normal]),
            train_block(),
            None,
            vec![None],
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn macau_without_side_info_is_rejected() {
        let err = TrainSession::new(
            small_config(vec![PriorKind::Normal, PriorKind::Macau]),
            train_block(),
            None,
            vec![None, None],
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_block_shape_must_agree() {
        let test = Block::sparse(vec![vec![0, 0]], vec![1.0], vec![2, 2], true).unwrap();
        let err = TrainSession::new(
            small_config(vec![PriorKind::Normal, PriorKind::Normal]),
            train_block(),
            Some(test),
            vec![None, None],
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Block(_)));
    }

    #[test]
    fn step_counts_through_phases() {
        let mut session = TrainSession::new(
            small_config(vec![PriorKind::Normal, PriorKind::Normal]),
            train_block(),
            None,
            vec![None, None],
            Vec::new(),
        )
        .unwrap();

        let s1 = session.step().unwrap().unwrap();
        assert_eq!(s1.iter, 1);
        assert_eq!(s1.phase, Phase::Burnin);
        assert!(s1.cells_per_sec.is_finite() && s1.cells_per_sec > 0.0);

        let s2 = session.step().unwrap().unwrap();
        assert_eq!(s2.phase, Phase::Burnin);
        assert_eq!(s2.phase_iter, 2);

        let s3 = session.step().unwrap().unwrap();
        assert_eq!(s3.phase, Phase::Sampling);
        assert_eq!(s3.phase_iter, 1);

        assert!(session.step().unwrap().is_some());
        assert!(session.step().unwrap().is_some());
        assert!(session.is_finished());
        assert!(session.step().unwrap().is_none());
        assert_eq!(session.iter(), 5);
    }

    #[test]
    fn cancellation_surfaces_between_steps() {
        let mut session = TrainSession::new(
            small_config(vec![PriorKind::Normal, PriorKind::Normal]),
            train_block(),
            None,
            vec![None, None],
            Vec::new(),
        )
        .unwrap();
        session.step().unwrap();
        session.cancel_flag().cancel();
        let err = session.run().unwrap_err();
        assert!(matches!(err, EngineError::Cancelled { iter: 1 }));
        // State is still coherent: the completed iteration survives.
        assert_eq!(session.iter(), 1);
    }

    #[test]
    fn observer_sees_every_step() {
        use std::sync::atomic::AtomicUsize;
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let mut session = TrainSession::new(
            small_config(vec![PriorKind::Normal, PriorKind::Normal]),
            train_block(),
            None,
            vec![None, None],
            Vec::new(),
        )
        .unwrap();
        session.set_observer(move |_s| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        session.run().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }
}
