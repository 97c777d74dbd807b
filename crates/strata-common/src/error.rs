//! Error types shared across Strata crates.

use thiserror::Error;

/// Top-level error type for Strata operations.
#[derive(Debug, Error)]
pub enum StrataError {
    /// World/chunk errors
    #[error("World error: {0}")]
    World(#[from] WorldError),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema version mismatch
    #[error("Schema version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Expected version
        expected: String,
        /// Actual version found
        actual: String,
    },
}

/// World and chunk errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    /// Local coordinate outside the sub-chunk extents.
    ///
    /// This is a programming error; callers must never rely on clamping or
    /// wrapping.
    #[error("Local coordinate out of bounds: ({x}, {y}, {z})")]
    OutOfBounds {
        /// Local X
        x: i64,
        /// Local Y
        y: i64,
        /// Local Z
        z: i64,
    },

    /// Query against a column that is not loaded
    #[error("Column not loaded at ({x}, {z})")]
    ColumnNotLoaded {
        /// Column X coordinate
        x: i32,
        /// Column Z coordinate
        z: i32,
    },

    /// World Y outside the column height
    #[error("World Y {y} outside column height")]
    HeightOutOfRange {
        /// World Y coordinate
        y: i64,
    },

    /// Invalid chunk data
    #[error("Invalid chunk data: {0}")]
    InvalidData(String),
}

/// Result type alias for Strata operations.
pub type StrataResult<T> = Result<T, StrataError>;

/// Result type alias for world operations.
pub type WorldResult<T> = Result<T, WorldError>;
