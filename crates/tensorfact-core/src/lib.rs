//! # tensorfact-core
//!
//! Observation-data model for the tensorfact stack: validated dense/sparse
//! N-dimensional observation blocks and per-mode side-information matrices.
//!
//! The sampling engine (`tensorfact-gibbs`) consumes these types read-only;
//! everything here is immutable after construction. On-disk codecs are out
//! of scope: blocks are built from already-parsed in-memory data.
//!
//! ## SciRS2 Integration
//!
//! All array operations use `scirs2_core::ndarray_ext`. Direct use of
//! `ndarray` is not permitted in this workspace.
//!
//! ## Quick start
//!
//! ```
//! use scirs2_core::ndarray_ext::ArrayD;
//! use tensorfact_core::Block;
//!
//! let data = ArrayD::from_shape_vec(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
//! let block = Block::dense(data).unwrap();
//! assert_eq!(block.dims(), &[2, 2]);
//! assert_eq!(block.nnz(), 4);
//! ```

#![deny(warnings)]

pub mod block;
pub mod error;
pub mod sideinfo;

pub use block::Block;
pub use error::BlockError;
pub use sideinfo::SideInfo;
