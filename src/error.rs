use thiserror::Error;

/// Errors raised while configuring or executing a reslice.
///
/// Samples that fall outside the input are not errors, they receive the
/// background value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResliceError {
    /// The source image is missing or malformed
    #[error("Invalid or missing input: {0}")]
    InvalidInput(String),

    /// The reslice axes do not span a usable output grid
    #[error("Degenerate reslice axes: {0}")]
    InvalidAxes(String),

    /// A storage kind tag outside the supported set
    #[error("Unsupported scalar kind: {0}")]
    UnsupportedScalarKind(String),

    /// Buffer or selection component counts disagree
    #[error("Component mismatch: expected {expected}, got {actual}")]
    ComponentMismatch { expected: usize, actual: usize },

    /// Settings that cannot be honored (unimplemented border modes, zero spacing, ...)
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Reslice was cancelled")]
    Cancelled,
}
