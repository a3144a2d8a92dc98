use futures::Stream;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::job::ConversionJob;
use super::types::ConversionResult;
use crate::converter::ConverterError;
use crate::error::ConversionError;
use crate::metrics::CONVERSIONS_TOTAL;
use crate::registry::FormatRegistry;
use crate::retention::RetentionHandle;
use crate::upload::UploadManager;

/// Whether a registered conversion's backend can run on this host.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub identifier: String,
    pub converter: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Entry point of the conversion engine.
///
/// Holds only read-only state and cheap handles, so one instance is shared
/// by every request and jobs never contend with each other.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    registry: Arc<FormatRegistry>,
    uploads: UploadManager,
    retention: RetentionHandle,
    retention_delay: Duration,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<FormatRegistry>,
        uploads: UploadManager,
        retention: RetentionHandle,
        retention_delay: Duration,
    ) -> Self {
        Self {
            registry,
            uploads,
            retention,
            retention_delay,
        }
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    pub fn uploads(&self) -> &UploadManager {
        &self.uploads
    }

    /// Start a job for `identifier`.
    ///
    /// Unknown identifiers are rejected here, before anything touches the disk.
    pub fn begin(&self, identifier: &str) -> Result<ConversionJob, ConversionError> {
        let conversion = self.registry.resolve(identifier).map_err(|e| {
            let err = ConversionError::from(e);
            CONVERSIONS_TOTAL
                .with_label_values(&["unknown", err.kind().as_str()])
                .inc();
            tracing::warn!(conversion = %identifier, "Rejected unsupported conversion");
            err
        })?;

        Ok(ConversionJob::new(
            Uuid::new_v4().simple().to_string(),
            conversion,
            self.uploads.clone(),
            self.retention.clone(),
            self.retention_delay,
        ))
    }

    /// Run a whole request: stage `files` in order, convert, package.
    pub async fn convert<S, B>(&self, identifier: &str, files: Vec<(String, S)>) -> ConversionResult
    where
        S: Stream<Item = Result<B, ConversionError>>,
        B: AsRef<[u8]>,
    {
        let mut job = match self.begin(identifier) {
            Ok(job) => job,
            Err(e) => return ConversionResult::failed(None, e),
        };
        for (filename, stream) in files {
            if let Err(e) = job.add_file(&filename, stream).await {
                return ConversionResult::failed(Some(job.id().to_string()), e);
            }
        }
        job.run().await
    }

    /// Check every registered backend; unavailable ones carry the bare reason.
    pub async fn backend_status(&self) -> Vec<BackendStatus> {
        let mut statuses = Vec::with_capacity(self.registry.len());
        for entry in self.registry.iter() {
            let result = entry.converter.check_available().await;
            statuses.push(BackendStatus {
                identifier: entry.spec.identifier.clone(),
                converter: entry.converter.name().to_string(),
                available: result.is_ok(),
                reason: result.err().map(|e| match e {
                    ConverterError::BackendUnavailable { reason } => reason,
                    other => other.to_string(),
                }),
            });
        }
        statuses
    }
}
