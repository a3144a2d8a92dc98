//! Uniform error taxonomy surfaced by the conversion engine.
//!
//! Every failure a client can observe is one of these kinds. Backend-specific
//! errors never escape the orchestrator; they collapse into
//! [`ConversionError::ConversionFailed`] with the original text kept as a
//! diagnostic for operator logs.

use serde::Serialize;
use thiserror::Error;

/// Stable, serialisable error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedConversion,
    InvalidExtension,
    InvalidFilename,
    PayloadTooLarge,
    EmptyFile,
    InsufficientFileCount,
    TooManyFiles,
    ConversionFailed,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedConversion => "unsupported_conversion",
            ErrorKind::InvalidExtension => "invalid_extension",
            ErrorKind::InvalidFilename => "invalid_filename",
            ErrorKind::PayloadTooLarge => "payload_too_large",
            ErrorKind::EmptyFile => "empty_file",
            ErrorKind::InsufficientFileCount => "insufficient_file_count",
            ErrorKind::TooManyFiles => "too_many_files",
            ErrorKind::ConversionFailed => "conversion_failed",
            ErrorKind::InternalError => "internal_error",
        }
    }

    /// Whether this kind is detected before any converter runs.
    pub fn is_validation(&self) -> bool {
        !matches!(self, ErrorKind::ConversionFailed | ErrorKind::InternalError)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse reason attached to a failed conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// External tool exceeded its wall-clock limit and was killed.
    Timeout,
    /// External tool exited with a non-zero status.
    NonZeroExit,
    /// Required binary or native library is not installed.
    BackendUnavailable,
    /// The backend rejected the input as malformed.
    InvalidInput,
    /// The backend finished but produced nothing usable.
    EmptyOutput,
    /// The backend panicked.
    Panicked,
    /// Any other backend failure.
    Backend,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Timeout => "timeout",
            FailureReason::NonZeroExit => "non_zero_exit",
            FailureReason::BackendUnavailable => "backend_unavailable",
            FailureReason::InvalidInput => "invalid_input",
            FailureReason::EmptyOutput => "empty_output",
            FailureReason::Panicked => "panicked",
            FailureReason::Backend => "backend",
        }
    }
}

/// Errors returned to callers of the conversion engine.
#[derive(Debug, Clone, Error)]
pub enum ConversionError {
    #[error("Unsupported conversion type: {identifier}")]
    UnsupportedConversion { identifier: String },

    #[error("File '{filename}' is not accepted by {identifier} (expected: {expected})")]
    InvalidExtension {
        identifier: String,
        filename: String,
        expected: String,
    },

    #[error("Invalid filename: {reason}")]
    InvalidFilename { reason: String },

    #[error("File '{filename}' exceeds the {limit_bytes} byte upload limit")]
    PayloadTooLarge { filename: String, limit_bytes: u64 },

    #[error("File '{filename}' is empty")]
    EmptyFile { filename: String },

    #[error("At least {required} files are required, got {received}")]
    InsufficientFileCount { required: usize, received: usize },

    #[error("At most {max} files are allowed")]
    TooManyFiles { max: usize },

    #[error("Conversion failed: {message}")]
    ConversionFailed {
        reason: FailureReason,
        message: String,
        /// Backend output for operator logs. Never shown to clients.
        diagnostic: Option<String>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ConversionError {
    pub fn conversion_failed(
        reason: FailureReason,
        message: impl Into<String>,
        diagnostic: Option<String>,
    ) -> Self {
        Self::ConversionFailed {
            reason,
            message: message.into(),
            diagnostic,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn invalid_filename(reason: impl Into<String>) -> Self {
        Self::InvalidFilename {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedConversion { .. } => ErrorKind::UnsupportedConversion,
            Self::InvalidExtension { .. } => ErrorKind::InvalidExtension,
            Self::InvalidFilename { .. } => ErrorKind::InvalidFilename,
            Self::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            Self::EmptyFile { .. } => ErrorKind::EmptyFile,
            Self::InsufficientFileCount { .. } => ErrorKind::InsufficientFileCount,
            Self::TooManyFiles { .. } => ErrorKind::TooManyFiles,
            Self::ConversionFailed { .. } => ErrorKind::ConversionFailed,
            Self::Internal { .. } => ErrorKind::InternalError,
        }
    }

    /// Failure reason, for `ConversionFailed` only.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            Self::ConversionFailed { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Backend diagnostic text, for operator logs.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::ConversionFailed { diagnostic, .. } => diagnostic.as_deref(),
            _ => None,
        }
    }

    /// Message safe to show to an anonymous client.
    pub fn user_message(&self) -> String {
        match self {
            Self::ConversionFailed {
                reason: FailureReason::Timeout,
                ..
            } => "The conversion took too long and was stopped.".to_string(),
            Self::ConversionFailed {
                reason: FailureReason::BackendUnavailable,
                ..
            } => "This conversion is temporarily unavailable.".to_string(),
            Self::ConversionFailed { .. } => {
                "The file could not be converted. It may be damaged or in an unexpected format."
                    .to_string()
            }
            Self::Internal { .. } => "An unexpected error occurred. Please try again.".to_string(),
            other => other.to_string(),
        }
    }
}
