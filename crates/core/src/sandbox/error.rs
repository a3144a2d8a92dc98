use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from running an external tool.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The program could not be found.
    #[error("Program not found: {program}")]
    NotFound { program: PathBuf },

    /// The program exists but could not be started.
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The program ran past its wall-clock limit and was killed.
    #[error("Process timed out after {}s", timeout.as_secs())]
    Timeout { timeout: Duration, stderr: String },

    /// The program exited with a non-zero status.
    #[error("Process exited with code {code:?}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    /// I/O error while supervising the process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Metric label for this outcome.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Spawn { .. } => "spawn_error",
            Self::Timeout { .. } => "timeout",
            Self::NonZeroExit { .. } => "non_zero_exit",
            Self::Io(_) => "io_error",
        }
    }

    /// Captured stderr tail, when the process got far enough to produce one.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Timeout { stderr, .. } | Self::NonZeroExit { stderr, .. } => {
                Some(stderr.as_str()).filter(|s| !s.is_empty())
            }
            _ => None,
        }
    }
}
