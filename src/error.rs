// src/error.rs

use thiserror::Error;

use crate::evolve::LeapfrogPhase;

/// Everything that can go wrong while building or advancing a hierarchy.
///
/// Apart from the wrapped I/O and parse errors these are all precondition
/// violations: a malformed hierarchy or configuration that cannot be evolved.
#[derive(Debug, Error)]
pub enum PicError {
    #[error("level {level}: {field} has {found} ghost cells, expected {expected}")]
    GhostWidthMismatch {
        level: usize,
        field: String,
        expected: usize,
        found: usize,
    },

    #[error("level {level}: {field} is decomposed into {found} patches, expected {expected}")]
    LayoutMismatch {
        level: usize,
        field: String,
        expected: usize,
        found: usize,
    },

    #[error("level {level}: cell size {dx} along axis {axis} must be positive")]
    InvalidCellSize { level: usize, axis: usize, dx: f64 },

    #[error("level {level}: sub-cycling ratio must be positive, got {ratio}")]
    InvalidSubcycleRatio { level: usize, ratio: i64 },

    #[error("unsupported stencil order {0} (supported: 2, 4, 6)")]
    UnsupportedOrder(usize),

    #[error("stencil of order {order} along axis {axis} needs {needed} ghost cells, fields have {ghost}")]
    StencilTooWide {
        axis: usize,
        order: usize,
        needed: usize,
        ghost: usize,
    },

    #[error("leapfrog phase {found:?} requested, expected {expected:?}")]
    PhaseOutOfOrder {
        expected: Option<LeapfrogPhase>,
        found: LeapfrogPhase,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("plot error: {0}")]
    Plot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PicError>;
