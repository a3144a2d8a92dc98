use serde::Serialize;

use crate::error::ConversionError;
use crate::upload::ClientFilename;

/// How a conversion's outputs are handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// One output file, delivered as-is.
    SingleFile,
    /// Outputs are always packaged into a zip archive.
    ArchiveOfFiles,
}

/// Where the work happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-process library call.
    Library,
    /// External tool run through the execution sandbox.
    ExternalProcess,
}

/// Number of input files a conversion takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Arity {
    Single,
    Merge { min: usize, max: usize },
}

impl Arity {
    pub fn min_files(&self) -> usize {
        match self {
            Arity::Single => 1,
            Arity::Merge { min, .. } => *min,
        }
    }

    pub fn max_files(&self) -> usize {
        match self {
            Arity::Single => 1,
            Arity::Merge { max, .. } => *max,
        }
    }

    /// Fails once `count` goes past the maximum. Usable while files are still arriving.
    pub fn check_not_exceeded(&self, count: usize) -> Result<(), ConversionError> {
        if count > self.max_files() {
            return Err(ConversionError::TooManyFiles {
                max: self.max_files(),
            });
        }
        Ok(())
    }

    /// Full check once every file has been received.
    pub fn check(&self, count: usize) -> Result<(), ConversionError> {
        self.check_not_exceeded(count)?;
        if count < self.min_files() {
            return Err(ConversionError::InsufficientFileCount {
                required: self.min_files(),
                received: count,
            });
        }
        Ok(())
    }
}

/// Immutable description of one conversion capability.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionSpec {
    /// Unique, stable key such as `pdf_to_txt`.
    pub identifier: String,
    /// Lower-case extensions without the leading dot.
    pub accepted_extensions: Vec<String>,
    pub output_kind: OutputKind,
    pub backend_kind: BackendKind,
    pub arity: Arity,
}

impl ConversionSpec {
    pub fn new(
        identifier: impl Into<String>,
        accepted_extensions: &[&str],
        output_kind: OutputKind,
        backend_kind: BackendKind,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            accepted_extensions: accepted_extensions
                .iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
            output_kind,
            backend_kind,
            arity: Arity::Single,
        }
    }

    /// Single-output conversion run in-process.
    pub fn library(identifier: impl Into<String>, accepted_extensions: &[&str]) -> Self {
        Self::new(
            identifier,
            accepted_extensions,
            OutputKind::SingleFile,
            BackendKind::Library,
        )
    }

    /// Single-output conversion run by an external tool.
    pub fn external(identifier: impl Into<String>, accepted_extensions: &[&str]) -> Self {
        Self::new(
            identifier,
            accepted_extensions,
            OutputKind::SingleFile,
            BackendKind::ExternalProcess,
        )
    }

    pub fn with_arity(mut self, arity: Arity) -> Self {
        self.arity = arity;
        self
    }

    pub fn with_output_kind(mut self, output_kind: OutputKind) -> Self {
        self.output_kind = output_kind;
        self
    }

    pub fn is_merge(&self) -> bool {
        matches!(self.arity, Arity::Merge { .. })
    }

    pub fn accepts(&self, extension: &str) -> bool {
        self.accepted_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(extension))
    }

    /// Reject a filename whose extension this conversion does not take.
    pub fn check_extension(&self, filename: &ClientFilename) -> Result<(), ConversionError> {
        match filename.extension.as_deref() {
            Some(ext) if self.accepts(ext) => Ok(()),
            _ => Err(ConversionError::InvalidExtension {
                identifier: self.identifier.clone(),
                filename: filename.original.clone(),
                expected: self.accepted_extensions.join(", "),
            }),
        }
    }
}
