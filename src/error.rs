//! Error types for the fxchain crate.

use std::collections::TryReserveError;

use thiserror::Error;

/// Errors surfaced by the pipeline driver, the time-stretch engine, and
/// individual processors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FxError {
    /// Caller supplied an out-of-range or malformed value.
    #[error("bad parameter: {0}")]
    BadParameter(String),
    /// A processor in a pipeline returned an error.
    #[error("processor {index} ({name}) failed: {source}")]
    ProcessorFailed {
        /// Position of the failing processor in the pipeline.
        index: usize,
        /// Processor label, as reported by [`crate::Processor::name`].
        name: &'static str,
        #[source]
        source: Box<FxError>,
    },
    /// A post-condition or contract check inside the library failed.
    #[error("internal error: {0}")]
    Internal(String),
    /// An allocation could not be satisfied.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
}

impl FxError {
    pub(crate) fn bad_parameter(msg: impl Into<String>) -> Self {
        FxError::BadParameter(msg.into())
    }

    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        FxError::Internal(msg.into())
    }
}

impl From<TryReserveError> for FxError {
    fn from(err: TryReserveError) -> Self {
        FxError::ResourceExhausted(err.to_string())
    }
}
