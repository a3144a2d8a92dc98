//! Mock converter for testing.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::converter::{ConversionContext, Converter, ConverterError};
use crate::upload::UploadedAsset;

/// A recorded `convert` call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedConversion {
    pub job_id: String,
    /// Original filenames, in the order the converter received them.
    pub inputs: Vec<String>,
    pub success: bool,
}

/// Mock implementation of the Converter trait.
///
/// By default every call writes one output named `{stem}.{extension}` whose
/// content is the inputs concatenated in order, so tests can check ordering.
///
/// Provides controllable behavior for testing:
/// - Several outputs per call
/// - Fail, panic, or return nothing
/// - Slow conversions
/// - Availability check result
#[derive(Debug, Clone)]
pub struct MockConverter {
    conversions: Arc<RwLock<Vec<RecordedConversion>>>,
    output_extension: Arc<RwLock<String>>,
    /// When set, these file names are written instead of the default single output.
    output_names: Arc<RwLock<Option<Vec<String>>>>,
    next_error: Arc<RwLock<Option<ConverterError>>>,
    delay: Arc<RwLock<Duration>>,
    panic: Arc<RwLock<bool>>,
    return_nothing: Arc<RwLock<bool>>,
    unavailable: Arc<RwLock<Option<String>>>,
}

impl Default for MockConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConverter {
    pub fn new() -> Self {
        Self {
            conversions: Arc::new(RwLock::new(Vec::new())),
            output_extension: Arc::new(RwLock::new("out".to_string())),
            output_names: Arc::new(RwLock::new(None)),
            next_error: Arc::new(RwLock::new(None)),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
            panic: Arc::new(RwLock::new(false)),
            return_nothing: Arc::new(RwLock::new(false)),
            unavailable: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn recorded_conversions(&self) -> Vec<RecordedConversion> {
        self.conversions.read().await.clone()
    }

    pub async fn conversion_count(&self) -> usize {
        self.conversions.read().await.len()
    }

    /// Extension of the default single output.
    pub async fn set_output_extension(&self, extension: &str) {
        *self.output_extension.write().await = extension.to_string();
    }

    /// Write these files on every call, each with the concatenated input.
    pub async fn set_outputs(&self, names: &[&str]) {
        *self.output_names.write().await = Some(names.iter().map(|n| n.to_string()).collect());
    }

    /// Configure the next call to fail with the given error.
    pub async fn set_next_error(&self, error: ConverterError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// Panic inside `convert` after writing outputs.
    pub async fn set_panic(&self, panic: bool) {
        *self.panic.write().await = panic;
    }

    /// Succeed without returning any output path.
    pub async fn set_return_nothing(&self, value: bool) {
        *self.return_nothing.write().await = value;
    }

    pub async fn set_unavailable(&self, reason: Option<&str>) {
        *self.unavailable.write().await = reason.map(String::from);
    }

    async fn record(&self, ctx: &ConversionContext, inputs: &[UploadedAsset], success: bool) {
        self.conversions.write().await.push(RecordedConversion {
            job_id: ctx.job_id.clone(),
            inputs: inputs.iter().map(|a| a.original_filename.clone()).collect(),
            success,
        });
    }
}

#[async_trait]
impl Converter for MockConverter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn convert(
        &self,
        inputs: &[UploadedAsset],
        ctx: &ConversionContext,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.next_error.write().await.take() {
            self.record(ctx, inputs, false).await;
            return Err(err);
        }

        let mut content = Vec::new();
        for input in inputs {
            content.extend(tokio::fs::read(&input.staged_path).await?);
        }

        let names = match self.output_names.read().await.clone() {
            Some(names) => names,
            None => {
                let stem = inputs.first().map(|a| a.stem.as_str()).unwrap_or("output");
                vec![format!("{}.{}", stem, self.output_extension.read().await)]
            }
        };

        tokio::fs::create_dir_all(&ctx.output_dir).await?;
        let mut outputs = Vec::with_capacity(names.len());
        for name in names {
            let path = ctx.output_dir.join(name);
            tokio::fs::write(&path, &content).await?;
            outputs.push(path);
        }

        if *self.panic.read().await {
            panic!("mock converter panicked");
        }

        self.record(ctx, inputs, true).await;
        if *self.return_nothing.read().await {
            return Ok(Vec::new());
        }
        Ok(outputs)
    }

    async fn check_available(&self) -> Result<(), ConverterError> {
        match self.unavailable.read().await.clone() {
            Some(reason) => Err(ConverterError::unavailable(reason)),
            None => Ok(()),
        }
    }
}
