//! Error types for the converter module.

use std::path::PathBuf;
use thiserror::Error;

use crate::error::{ConversionError, FailureReason};
use crate::sandbox::SandboxError;

/// Errors that can occur inside a converter.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// External binary not found.
    #[error("Tool not found at path: {path}")]
    ToolNotFound { path: PathBuf },

    /// A native library or tool is installed but unusable.
    #[error("Backend unavailable: {reason}")]
    BackendUnavailable { reason: String },

    /// The input could not be parsed.
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// Conversion process failed.
    #[error("Conversion failed: {reason}")]
    ConversionFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// Conversion timed out.
    #[error("Conversion timed out after {timeout_secs} seconds")]
    Timeout {
        timeout_secs: u64,
        stderr: Option<String>,
    },

    /// The backend finished without producing anything usable.
    #[error("No output produced: {reason}")]
    EmptyOutput { reason: String },

    /// The backend panicked.
    #[error("Converter panicked: {reason}")]
    Panicked { reason: String },

    /// I/O error during conversion.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConverterError {
    /// Creates a new conversion failed error with stderr output.
    pub fn conversion_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::ConversionFailed {
            reason: reason.into(),
            stderr,
        }
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn empty_output(reason: impl Into<String>) -> Self {
        Self::EmptyOutput {
            reason: reason.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            reason: reason.into(),
        }
    }

    /// Coarse reason reported to callers.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Self::ToolNotFound { .. } | Self::BackendUnavailable { .. } => {
                FailureReason::BackendUnavailable
            }
            Self::InvalidInput { .. } => FailureReason::InvalidInput,
            Self::ConversionFailed { stderr: Some(_), .. } => FailureReason::NonZeroExit,
            Self::ConversionFailed { .. } | Self::Io(_) => FailureReason::Backend,
            Self::Timeout { .. } => FailureReason::Timeout,
            Self::EmptyOutput { .. } => FailureReason::EmptyOutput,
            Self::Panicked { .. } => FailureReason::Panicked,
        }
    }

    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Io(_))
    }
}

impl From<SandboxError> for ConverterError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::NotFound { program } => Self::ToolNotFound { path: program },
            SandboxError::Spawn { program, source } => Self::BackendUnavailable {
                reason: format!("failed to start {}: {}", program.display(), source),
            },
            SandboxError::Timeout { timeout, stderr } => Self::Timeout {
                timeout_secs: timeout.as_secs(),
                stderr: Some(stderr).filter(|s| !s.is_empty()),
            },
            SandboxError::NonZeroExit { code, stderr } => Self::ConversionFailed {
                reason: match code {
                    Some(code) => format!("process exited with code {code}"),
                    None => "process killed by signal".to_string(),
                },
                stderr: Some(stderr),
            },
            SandboxError::Io(e) => Self::Io(e),
        }
    }
}

impl From<ConverterError> for ConversionError {
    fn from(err: ConverterError) -> Self {
        let reason = err.failure_reason();
        let diagnostic = match &err {
            ConverterError::ConversionFailed {
                stderr: Some(stderr),
                ..
            }
            | ConverterError::Timeout {
                stderr: Some(stderr),
                ..
            } => Some(format!("{err}\n{stderr}")),
            _ => Some(err.to_string()),
        };
        ConversionError::conversion_failed(reason, err.to_string(), diagnostic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::time::Duration;

    #[test]
    fn test_sandbox_timeout_maps_to_timeout() {
        let err: ConverterError = SandboxError::Timeout {
            timeout: Duration::from_secs(5),
            stderr: String::new(),
        }
        .into();
        assert!(matches!(
            err,
            ConverterError::Timeout {
                timeout_secs: 5,
                stderr: None
            }
        ));
        assert_eq!(err.failure_reason(), FailureReason::Timeout);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_missing_tool_is_unavailable() {
        let err: ConverterError = SandboxError::NotFound {
            program: PathBuf::from("/nope/ffmpeg"),
        }
        .into();
        assert_eq!(err.failure_reason(), FailureReason::BackendUnavailable);
    }

    #[test]
    fn test_non_zero_exit_keeps_stderr_as_diagnostic() {
        let err: ConverterError = SandboxError::NonZeroExit {
            code: Some(1),
            stderr: "Invalid data found when processing input".to_string(),
        }
        .into();
        assert_eq!(err.failure_reason(), FailureReason::NonZeroExit);

        let public: ConversionError = err.into();
        assert_eq!(public.kind(), ErrorKind::ConversionFailed);
        assert_eq!(public.failure_reason(), Some(FailureReason::NonZeroExit));
        assert!(public
            .diagnostic()
            .unwrap()
            .contains("Invalid data found"));
        assert!(!public.user_message().contains("Invalid data found"));
    }

    #[test]
    fn test_library_errors_map_to_conversion_failed() {
        let public: ConversionError = ConverterError::invalid_input("bad xref").into();
        assert_eq!(public.kind(), ErrorKind::ConversionFailed);
        assert_eq!(public.failure_reason(), Some(FailureReason::InvalidInput));

        let public: ConversionError = ConverterError::empty_output("no pages").into();
        assert_eq!(public.failure_reason(), Some(FailureReason::EmptyOutput));
    }
}
