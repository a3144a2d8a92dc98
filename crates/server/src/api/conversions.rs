//! Conversion catalogue and the upload-convert-download endpoint.

use axum::{
    body::{Body, Bytes},
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, Query, State,
    },
    http::{header, StatusCode},
    response::Response,
    Json,
};
use futures::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use convertino_core::{
    Artifact, BackendKind, ConversionError, ConversionJob, DeliveryGuard, OutputKind,
};

use super::error::ApiError;
use crate::metrics::ARTIFACT_BYTES_SENT;
use crate::state::AppState;

/// Read size when streaming an artifact back.
const CHUNK_SIZE: usize = 64 * 1024;

/// Header carrying the job id of a successful conversion.
pub const JOB_ID_HEADER: &str = "x-conversion-job";

#[derive(Debug, Serialize)]
pub struct ConversionInfo {
    pub identifier: String,
    pub accepted_extensions: Vec<String>,
    pub output_kind: OutputKind,
    pub backend_kind: BackendKind,
    pub min_files: usize,
    pub max_files: usize,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConversionListResponse {
    pub conversions: Vec<ConversionInfo>,
}

/// List registered conversions with their backend availability.
pub async fn list_conversions(State(state): State<Arc<AppState>>) -> Json<ConversionListResponse> {
    let conversions = state
        .orchestrator()
        .registry()
        .iter()
        .map(|entry| {
            let spec = &entry.spec;
            let backend = state.backend(&spec.identifier);
            ConversionInfo {
                identifier: spec.identifier.clone(),
                accepted_extensions: spec.accepted_extensions.clone(),
                output_kind: spec.output_kind,
                backend_kind: spec.backend_kind,
                min_files: spec.arity.min_files(),
                max_files: spec.arity.max_files(),
                available: backend.map(|b| b.available).unwrap_or(true),
                reason: backend.and_then(|b| b.reason.clone()),
            }
        })
        .collect();

    Json(ConversionListResponse { conversions })
}

#[derive(Debug, Deserialize)]
pub struct ConvertQuery {
    pub conversion_type: Option<String>,
}

/// Convert uploaded files and stream the result back.
///
/// The conversion is chosen by the `conversion_type` query parameter or by a
/// `conversion_type` form field sent before the files. Files are read from
/// `file` or `files` fields in the order they appear.
pub async fn convert(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConvertQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut multipart = multipart?;
    let limit_bytes = state.config().uploads.max_file_bytes;
    let orchestrator = state.orchestrator();

    let mut job: Option<ConversionJob> = match query.conversion_type.as_deref() {
        Some(identifier) => Some(orchestrator.begin(identifier.trim())?),
        None => None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::from_multipart(e, limit_bytes))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "conversion_type" => {
                let identifier = field
                    .text()
                    .await
                    .map_err(|e| ApiError::from_multipart(e, limit_bytes))?;
                if job.is_some() {
                    return Err(ApiError::BadRequest(
                        "conversion_type given more than once".to_string(),
                    ));
                }
                job = Some(orchestrator.begin(identifier.trim())?);
            }
            "file" | "files" => {
                let Some(job) = job.as_mut() else {
                    return Err(ApiError::BadRequest(
                        "conversion_type must precede files".to_string(),
                    ));
                };
                let filename = field.file_name().unwrap_or_default().to_string();
                let display_name = filename.clone();
                let chunks = field
                    .map(move |chunk| chunk.map_err(|e| upload_error(e, &display_name, limit_bytes)));
                job.add_file(&filename, chunks).await?;
            }
            other => {
                tracing::debug!(field = %other, "Ignoring unknown form field");
            }
        }
    }

    let Some(job) = job else {
        return Err(ApiError::BadRequest("missing conversion_type".to_string()));
    };

    let artifact = job.run().await.into_result()?;
    artifact_response(artifact).await
}

fn upload_error(err: MultipartError, filename: &str, limit_bytes: u64) -> ConversionError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ConversionError::PayloadTooLarge {
            filename: filename.to_string(),
            limit_bytes,
        }
    } else {
        ConversionError::internal(format!("upload of '{}' interrupted: {}", filename, err))
    }
}

async fn artifact_response(artifact: Artifact) -> Result<Response, ApiError> {
    let file = File::open(&artifact.path)
        .await
        .map_err(|e| ConversionError::internal(format!("failed to open artifact: {e}")))?;

    let Artifact {
        download_name,
        content_type,
        size_bytes,
        delivery,
        ..
    } = artifact;
    let job_id = delivery.job_id().to_string();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, size_bytes)
        .header(header::CONTENT_DISPOSITION, content_disposition(&download_name))
        .header(JOB_ID_HEADER, job_id)
        .body(Body::from_stream(artifact_stream(file, delivery)))
        .map_err(|e| ApiError::Conversion(ConversionError::internal(e.to_string())))
}

/// Stream a file in chunks.
///
/// The delivery guard is marked delivered only when end of file is reached.
/// A client that disconnects early drops the stream with the guard unmarked.
fn artifact_stream(
    file: File,
    delivery: DeliveryGuard,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    stream::unfold(Some((file, delivery)), |state| async move {
        let (mut file, mut delivery) = state?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        match file.read(&mut buf).await {
            Ok(0) => {
                delivery.mark_delivered();
                None
            }
            Ok(n) => {
                buf.truncate(n);
                ARTIFACT_BYTES_SENT.inc_by(n as u64);
                Some((Ok(Bytes::from(buf)), Some((file, delivery))))
            }
            Err(e) => {
                tracing::warn!(job_id = %delivery.job_id(), error = %e, "Failed to read artifact");
                Some((Err(e), None))
            }
        }
    })
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 UTF-8 name.
pub fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use convertino_core::metrics::{DELIVERIES_TOTAL, DOWNLOADS_ABANDONED};
    use convertino_core::testing::{fixtures, MockConverter};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Run a mock `txt_to_pdf` job whose output spans several chunks.
    ///
    /// The mock echoes its input, so the artifact is the upload.
    async fn artifact(staging: &TempDir) -> Artifact {
        let registry = fixtures::registry_with("txt_to_pdf", &["txt"], MockConverter::new());
        let (orchestrator, _retention) =
            fixtures::orchestrator(registry, staging.path(), Duration::from_secs(300));
        let upload = vec![b'x'; CHUNK_SIZE * 3];
        orchestrator
            .convert("txt_to_pdf", vec![("notes.txt".to_string(), fixtures::bytes(&upload))])
            .await
            .into_result()
            .unwrap()
    }

    #[tokio::test]
    async fn test_full_read_counts_as_delivery() {
        let staging = TempDir::new().unwrap();
        let artifact = artifact(&staging).await;
        let file = File::open(&artifact.path).await.unwrap();

        let before = DELIVERIES_TOTAL.get();
        let chunks: Vec<_> = artifact_stream(file, artifact.delivery).collect().await;
        let sent: usize = chunks.iter().map(|c| c.as_ref().unwrap().len()).sum();

        assert_eq!(sent, CHUNK_SIZE * 3);
        assert!(DELIVERIES_TOTAL.get() > before);
    }

    #[tokio::test]
    async fn test_disconnect_mid_stream_is_abandoned() {
        let staging = TempDir::new().unwrap();
        let artifact = artifact(&staging).await;
        let file = File::open(&artifact.path).await.unwrap();

        let before = DOWNLOADS_ABANDONED.get();
        let mut body = Box::pin(artifact_stream(file, artifact.delivery));
        let first = body.next().await.unwrap().unwrap();
        assert_eq!(first.len(), CHUNK_SIZE);
        drop(body);

        assert!(DOWNLOADS_ABANDONED.get() > before);
    }

    #[test]
    fn test_content_disposition_ascii() {
        assert_eq!(
            content_disposition("report.pdf"),
            "attachment; filename=\"report.pdf\"; filename*=UTF-8''report.pdf"
        );
    }

    #[test]
    fn test_content_disposition_non_ascii() {
        let value = content_disposition("résumé \"v2\".pdf");
        assert!(value.starts_with("attachment; filename=\"r_sum_ _v2_.pdf\""));
        assert!(value.ends_with("filename*=UTF-8''r%C3%A9sum%C3%A9%20%22v2%22.pdf"));
    }
}
