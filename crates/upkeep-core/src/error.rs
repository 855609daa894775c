//! # Error Types: Shared Error Hierarchy
//!
//! Errors shared by every crate in the workspace. All errors use `thiserror`
//! for derive-based `Display` and `Error` implementations.
//!
//! ## Design
//!
//! - Validation errors name the offending field and the rejected value.
//! - Lifecycle errors live next to the state machine that raises them
//!   (`upkeep-state`), not here.

use thiserror::Error;

/// Top-level error type for the foundational crate.
#[derive(Error, Debug)]
pub enum UpkeepError {
    /// Input failed domain validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Timestamp could not be parsed or constructed.
    #[error("invalid timestamp: {0}")]
    Timestamp(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A value failed domain validation at construction time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A required string was empty after trimming.
    #[error("{field} must not be empty")]
    Empty {
        /// Field name.
        field: &'static str,
    },

    /// A string exceeded its maximum length.
    #[error("{field} must not exceed {max} characters (got {actual})")]
    TooLong {
        /// Field name.
        field: &'static str,
        /// Maximum permitted length.
        max: usize,
        /// Actual length.
        actual: usize,
    },

    /// A coordinate was outside its valid range or not finite.
    #[error("{field} out of range: {value}")]
    CoordinateOutOfRange {
        /// `latitude` or `longitude`.
        field: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// An enumerated value was not recognised.
    #[error("unknown {field}: {value:?}")]
    UnknownValue {
        /// Field name.
        field: &'static str,
        /// The rejected value.
        value: String,
    },
}
