//! # TensorFact - Bayesian Factorization Stack
//!
//! **Bayesian matrix and tensor factorization** via blocked Gibbs sampling,
//! with side information, flexible noise models and full posterior
//! uncertainty over predictions.
//!
//! This is the **meta crate** that re-exports all TensorFact components for
//! convenient access.
//!
//! ## Quick Start
//!
//! ```
//! use scirs2_core::ndarray_ext::ArrayD;
//! use tensorfact::prelude::*;
//!
//! // A small complete training matrix and one held-out cell.
//! let data = ArrayD::from_shape_fn(vec![4, 4], |ix| (ix[0] * ix[1]) as f64);
//! let train = Block::dense(data).unwrap();
//! let test = Block::sparse(vec![vec![3, 3]], vec![9.0], vec![4, 4], true).unwrap();
//!
//! let config = SessionConfig {
//!     num_latent: 2,
//!     priors: vec![PriorKind::Normal, PriorKind::Normal],
//!     burnin: 10,
//!     num_samples: 20,
//!     seed: 1,
//!     ..Default::default()
//! };
//! let mut session =
//!     TrainSession::new(config, train, Some(test), vec![None, None], Vec::new()).unwrap();
//! session.run().unwrap();
//! assert!(session.predictions().unwrap().rmse_avg.is_finite());
//! ```
//!
//! ## Components
//!
//! ### Data Model ([`core`])
//!
//! Validated dense/sparse observation blocks with a scarce/complete
//! distinction, and per-mode side-information matrices.
//!
//! ### Sampling Engine ([`gibbs`])
//!
//! Training sessions, per-mode priors (normal, macau, spike-and-slab),
//! noise models (fixed, sampled, adaptive, probit), test-set aggregation,
//! checkpointing and prediction sessions.
//!
//! ## Features
//!
//! - `parallel` (default): per-entity latent updates run on a thread pool;
//!   results are bit-identical either way.

#![deny(warnings)]

// Re-export all components
pub use tensorfact_core as core;
pub use tensorfact_gibbs as gibbs;

pub mod prelude {
    //! Prelude module for convenient imports
    //!
    //! # Example
    //!
    //! ```
    //! use tensorfact::prelude::*;
    //!
    //! let block = Block::sparse(vec![vec![0, 0]], vec![1.0], vec![2, 2], true).unwrap();
    //! assert_eq!(block.nnz(), 1);
    //! ```

    // Data model
    pub use crate::core::{Block, BlockError, SideInfo};

    // Engine configuration
    pub use crate::gibbs::{MacauSolver, NoiseConfig, PriorKind, SessionConfig};

    // Sessions and results
    pub use crate::gibbs::{
        CancelFlag, EngineError, Phase, PredictSession, PredictionEntry, Predictions,
        StatusSnapshot, TrainSession,
    };

    // Persistence
    pub use crate::gibbs::{Checkpoint, CheckpointError};
}
