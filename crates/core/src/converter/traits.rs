//! Trait definitions for the converter module.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error::ConverterError;
use crate::upload::UploadedAsset;

/// Where a converter may write while handling one job.
#[derive(Debug, Clone)]
pub struct ConversionContext {
    pub job_id: String,
    /// Final artifacts go here and nowhere else.
    pub output_dir: PathBuf,
    /// Scratch space, removed together with the job.
    pub work_dir: PathBuf,
}

/// A backend that turns staged inputs into output files.
///
/// Inputs arrive in upload order. Implementations write only under the
/// context's output and work directories and return the paths of the files
/// they produced, in order.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Returns the name of this converter implementation.
    fn name(&self) -> &str;

    async fn convert(
        &self,
        inputs: &[UploadedAsset],
        ctx: &ConversionContext,
    ) -> Result<Vec<PathBuf>, ConverterError>;

    /// Validates that the backend is installed and usable.
    async fn check_available(&self) -> Result<(), ConverterError> {
        Ok(())
    }
}

/// Synchronous, library-backed conversion.
///
/// Wrapped in [`BlockingConverter`] so the work runs on the blocking pool.
pub trait LibraryConversion: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn convert_blocking(
        &self,
        inputs: &[UploadedAsset],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, ConverterError>;

    fn check_blocking(&self) -> Result<(), ConverterError> {
        Ok(())
    }
}

/// Adapts a [`LibraryConversion`] to the async [`Converter`] interface.
pub struct BlockingConverter<C> {
    inner: Arc<C>,
}

impl<C: LibraryConversion> BlockingConverter<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn shared(inner: C) -> Arc<dyn Converter> {
        Arc::new(Self::new(inner))
    }
}

#[async_trait]
impl<C: LibraryConversion> Converter for BlockingConverter<C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn convert(
        &self,
        inputs: &[UploadedAsset],
        ctx: &ConversionContext,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let inner = Arc::clone(&self.inner);
        let inputs = inputs.to_vec();
        let output_dir = ctx.output_dir.clone();
        run_blocking(move || inner.convert_blocking(&inputs, &output_dir)).await
    }

    async fn check_available(&self) -> Result<(), ConverterError> {
        let inner = Arc::clone(&self.inner);
        run_blocking(move || inner.check_blocking()).await
    }
}

/// Run a closure on the blocking pool. A panic surfaces as `Panicked`.
pub async fn run_blocking<T, F>(f: F) -> Result<T, ConverterError>
where
    F: FnOnce() -> Result<T, ConverterError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(ConverterError::Panicked {
            reason: panic_message(e.into_panic()),
        }),
        Err(e) => Err(ConverterError::Panicked {
            reason: e.to_string(),
        }),
    }
}

pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// The one input of a single-file conversion.
pub fn single_input(inputs: &[UploadedAsset]) -> Result<&UploadedAsset, ConverterError> {
    match inputs {
        [input] => Ok(input),
        _ => Err(ConverterError::invalid_input(format!(
            "expected exactly one input, got {}",
            inputs.len()
        ))),
    }
}

/// `{output_dir}/{stem}.{extension}`
pub fn output_file(output_dir: &Path, stem: &str, extension: &str) -> PathBuf {
    output_dir.join(format!("{stem}.{extension}"))
}

/// Escape text for an XML or HTML text node or quoted attribute.
///
/// Control characters other than tab and line breaks are dropped, since
/// XML 1.0 cannot carry them at all.
pub(crate) fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c if c.is_ascii_control() && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}
