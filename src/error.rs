//! Error types for l2wrap.

use thiserror::Error;

use crate::l2wrap::BackwardStrategy;

/// Result type alias for l2wrap operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A device descriptor of the wrong kind was handed to an accelerator.
    #[error("Device should be of type '{expected}', got '{actual}' instead")]
    DeviceKindMismatch { expected: String, actual: String },

    #[error("Device index {index} is out of range ({count} devices visible)")]
    DeviceIndexOutOfRange { index: usize, count: usize },

    #[error("Cannot parse device descriptor: {0}")]
    InvalidDeviceDescriptor(String),

    #[error("Unknown device specification: {0}")]
    UnknownDeviceSpec(String),

    #[error("Accelerator '{0}' is already registered")]
    DuplicateAccelerator(String),

    #[error("No accelerator registered under '{0}'")]
    UnknownAccelerator(String),

    /// Two backward strategies disagreed beyond the allowed tolerance.
    #[error(
        "Gradients from {lhs} and {rhs} differ by {max_abs_diff:e} (tolerance {tolerance:e})"
    )]
    EquivalenceFailed {
        lhs: BackwardStrategy,
        rhs: BackwardStrategy,
        max_abs_diff: f32,
        tolerance: f32,
    },
}
