//! Error types for ml-inspect crate.

use thiserror::Error;

/// Errors that can occur while inspecting a dataset.
///
/// Only some of these abort an inspection. See [`InspectError::is_fatal`]:
/// the engine converts every non-fatal error raised at a sample boundary
/// into an [`Anomaly`](crate::Anomaly) and keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InspectError {
    /// The identifier does not resolve to an existing dataset.
    #[error("dataset source not found: {0}")]
    SourceNotFound(String),

    /// The underlying stream raised while producing batches.
    #[error("failed to read from source: {0}")]
    SourceRead(String),

    /// A single sample could not be decoded.
    #[error("failed to read sample {index}: {reason}")]
    SampleRead {
        /// Position of the sample in the stream.
        index: usize,
        /// Reason for failure.
        reason: String,
    },

    /// The source produced fewer samples than requested.
    #[error("source exhausted after {produced} of {requested} samples")]
    SourceExhausted {
        /// Number of samples requested.
        requested: usize,
        /// Number of samples actually produced.
        produced: usize,
    },

    /// Invalid inspection configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A value could not be converted into a field value.
    #[error("invalid field value for '{field}': {reason}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Reason for failure.
        reason: String,
    },

    /// An operation was called in the wrong inspection state.
    #[error("invalid inspection state: {0}")]
    InvalidState(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl InspectError {
    /// Creates a source not found error.
    #[must_use]
    pub fn source_not_found(identifier: impl Into<String>) -> Self {
        Self::SourceNotFound(identifier.into())
    }

    /// Creates a source read error.
    #[must_use]
    pub fn source_read(reason: impl Into<String>) -> Self {
        Self::SourceRead(reason.into())
    }

    /// Creates a sample read error.
    #[must_use]
    pub fn sample_read(index: usize, reason: impl Into<String>) -> Self {
        Self::SampleRead {
            index,
            reason: reason.into(),
        }
    }

    /// Creates a source exhausted error.
    #[must_use]
    pub const fn source_exhausted(requested: usize, produced: usize) -> Self {
        Self::SourceExhausted {
            requested,
            produced,
        }
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid state error.
    #[must_use]
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState(reason.into())
    }

    /// Creates an IO error.
    #[must_use]
    pub fn io(reason: impl Into<String>) -> Self {
        Self::Io(reason.into())
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization(reason.into())
    }

    /// Returns `true` if this error must abort the inspection.
    ///
    /// Unreadable samples and early exhaustion are recoverable; a source
    /// that cannot be opened or a stream that raised is not.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::SampleRead { .. } | Self::SourceExhausted { .. } | Self::InvalidValue { .. }
        )
    }
}

impl From<std::io::Error> for InspectError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for InspectError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for ml-inspect operations.
pub type Result<T> = std::result::Result<T, InspectError>;
