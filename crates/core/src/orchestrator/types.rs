//! Results handed from the orchestrator to the response layer.

use std::path::{Path, PathBuf};

use crate::error::ConversionError;
use crate::metrics::{DELIVERIES_TOTAL, DOWNLOADS_ABANDONED, JOBS_IN_FLIGHT};
use crate::retention::RetentionHandle;

/// Counts a job in `JOBS_IN_FLIGHT` for as long as it is alive.
#[derive(Debug)]
pub(crate) struct InFlight;

impl InFlight {
    pub(crate) fn start() -> Self {
        JOBS_IN_FLIGHT.inc();
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        JOBS_IN_FLIGHT.dec();
    }
}

/// Keeps a packaged artifact on disk until it is dropped.
///
/// Dropping the guard releases the artifact to the retention worker, which
/// removes the job directory. Move it into the response body so the
/// directory outlives streaming, and call [`DeliveryGuard::mark_delivered`]
/// once the last byte is out. A guard dropped unmarked is logged and counted
/// as an abandoned download.
#[derive(Debug)]
pub struct DeliveryGuard {
    job_id: String,
    conversion: String,
    retention: RetentionHandle,
    delivered: bool,
    _in_flight: InFlight,
}

impl DeliveryGuard {
    pub(crate) fn new(
        job_id: String,
        conversion: String,
        retention: RetentionHandle,
        in_flight: InFlight,
    ) -> Self {
        Self {
            job_id,
            conversion,
            retention,
            delivered: false,
            _in_flight: in_flight,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Record that the client received the whole artifact.
    pub fn mark_delivered(&mut self) {
        self.delivered = true;
    }

    /// `delivered` or `abandoned`, as logged on drop.
    pub fn outcome(&self) -> &'static str {
        if self.delivered {
            "delivered"
        } else {
            "abandoned"
        }
    }
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        if self.delivered {
            tracing::info!(
                job_id = %self.job_id,
                conversion = %self.conversion,
                state = self.outcome(),
                "Job delivered"
            );
            DELIVERIES_TOTAL.inc();
        } else {
            tracing::warn!(
                job_id = %self.job_id,
                conversion = %self.conversion,
                state = self.outcome(),
                "Download abandoned before completion"
            );
            DOWNLOADS_ABANDONED.inc();
        }
        // The artifact is released either way.
        self.retention.confirm(&self.job_id);
    }
}

/// A converted file ready to be streamed.
#[derive(Debug)]
pub struct Artifact {
    pub path: PathBuf,
    /// Name offered to the client, derived from the original filename stem.
    pub download_name: String,
    pub content_type: &'static str,
    pub size_bytes: u64,
    pub delivery: DeliveryGuard,
}

/// Outcome of one conversion request.
#[derive(Debug)]
pub struct ConversionResult {
    /// `None` when the request was rejected before a job existed.
    pub job_id: Option<String>,
    pub success: bool,
    pub artifact: Option<Artifact>,
    pub error: Option<ConversionError>,
}

impl ConversionResult {
    pub(crate) fn succeeded(job_id: String, artifact: Artifact) -> Self {
        Self {
            job_id: Some(job_id),
            success: true,
            artifact: Some(artifact),
            error: None,
        }
    }

    pub(crate) fn failed(job_id: Option<String>, error: ConversionError) -> Self {
        Self {
            job_id,
            success: false,
            artifact: None,
            error: Some(error),
        }
    }

    pub fn into_result(self) -> Result<Artifact, ConversionError> {
        match (self.artifact, self.error) {
            (Some(artifact), _) => Ok(artifact),
            (None, Some(error)) => Err(error),
            (None, None) => Err(ConversionError::internal("conversion produced no result")),
        }
    }
}

/// MIME type for an output file.
pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "txt" => "text/plain; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "html" => "text/html; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}
