//! Validation errors for observation and side-information blocks.

use thiserror::Error;

/// Errors raised while constructing or attaching data blocks.
///
/// All of these are fatal at construction time: no partially validated
/// block is ever returned.
#[derive(Error, Debug)]
pub enum BlockError {
    #[error("coordinate {coords:?} outside declared extents {dims:?}")]
    CoordOutOfBounds {
        coords: Vec<usize>,
        dims: Vec<usize>,
    },

    #[error("coordinate tuple has {got} components but the tensor has {expected} modes")]
    CoordArity { got: usize, expected: usize },

    #[error("{indices} coordinate tuples but {values} values")]
    ValueCount { indices: usize, values: usize },

    #[error("non-finite value {value} at entry {entry}")]
    NonFinite { entry: usize, value: f64 },

    #[error("invalid shape {dims:?}: extents must be non-empty and non-zero")]
    InvalidShape { dims: Vec<usize> },

    #[error("side info for mode {mode} has {rows} rows but the mode extent is {extent}")]
    DimensionMismatch {
        mode: usize,
        rows: usize,
        extent: usize,
    },

    #[error("blocks disagree on shape: {left:?} vs {right:?}")]
    ShapeDisagreement {
        left: Vec<usize>,
        right: Vec<usize>,
    },
}
