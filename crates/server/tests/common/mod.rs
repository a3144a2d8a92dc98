//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that builds the router in-process
//! with mock converters registered, so requests can be driven with
//! `tower::ServiceExt::oneshot` and no external tools.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use convertino_core::testing::MockConverter;
use convertino_core::{
    create_retention_system, Arity, Config, ConversionSpec, FormatRegistry, Orchestrator,
    OutputKind, RetentionHandle, UploadManager,
};
use convertino_server::api::create_router;
use convertino_server::state::AppState;

/// Re-export fixtures for test convenience
pub use convertino_core::testing::fixtures;

/// Per-file upload ceiling used by the fixture, small enough to exceed in tests.
pub const MAX_FILE_BYTES: u64 = 1024;

pub const BOUNDARY: &str = "convertino-test-boundary";

/// Mock converters backing the fixture's three conversions.
#[derive(Clone, Default)]
pub struct Converters {
    /// `txt_to_pdf`, single file.
    pub txt: MockConverter,
    /// `merge_pdfs`, 2 to 10 files.
    pub merge: MockConverter,
    /// `pdf_to_png`, always archived.
    pub pages: MockConverter,
}

/// Test fixture for API testing with mock converters.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_convert() {
///     let fixture = TestFixture::new().await;
///     let body = MultipartBody::new()
///         .text("conversion_type", "txt_to_pdf")
///         .file("file", "notes.txt", b"hello");
///     let response = fixture.post_multipart("/api/v1/convert", body).await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    pub router: Router,
    pub converters: Converters,
    pub retention: RetentionHandle,
    /// Temporary directory holding the staging root
    pub temp_dir: TempDir,
    pub staging_root: PathBuf,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl TestFixture {
    /// Create a fixture with default mocks.
    pub async fn new() -> Self {
        Self::with_converters(Converters::default()).await
    }

    /// Create a fixture around pre-configured mocks.
    ///
    /// Backend availability is probed here, as at server startup.
    pub async fn with_converters(converters: Converters) -> Self {
        converters.txt.set_output_extension("pdf").await;
        converters.merge.set_output_extension("pdf").await;

        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let staging_root = temp_dir.path().join("staging");

        let mut config = Config::default();
        config.uploads.staging_root = staging_root.clone();
        config.uploads.max_file_bytes = MAX_FILE_BYTES;

        let mut registry = FormatRegistry::new();
        registry
            .register(
                ConversionSpec::library("txt_to_pdf", &["txt"]),
                Arc::new(converters.txt.clone()),
            )
            .unwrap();
        registry
            .register(
                ConversionSpec::library("merge_pdfs", &["pdf"])
                    .with_arity(Arity::Merge { min: 2, max: 10 }),
                Arc::new(converters.merge.clone()),
            )
            .unwrap();
        registry
            .register(
                ConversionSpec::library("pdf_to_png", &["pdf"])
                    .with_output_kind(OutputKind::ArchiveOfFiles),
                Arc::new(converters.pages.clone()),
            )
            .unwrap();

        let (retention, worker) =
            create_retention_system(&config.retention, staging_root.clone());
        tokio::spawn(worker.run());

        let orchestrator = Orchestrator::new(
            Arc::new(registry),
            UploadManager::new(&config.uploads),
            retention.clone(),
            config.retention.delay(),
        );
        let backends = orchestrator.backend_status().await;
        let state = Arc::new(AppState::new(config, orchestrator, backends));

        Self {
            router: create_router(state),
            converters,
            retention,
            temp_dir,
            staging_root,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn post_multipart(&self, uri: &str, body: MultipartBody) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body.finish()))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_raw(&self, uri: &str, content_type: &str, body: &[u8]) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body.to_vec()))
            .unwrap();
        self.send(request).await
    }

    /// Send a request and read the whole body, which completes delivery.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Wait until the staging root holds no job directories.
    pub async fn wait_until_staging_empty(&self) -> bool {
        for _ in 0..100 {
            self.retention.flush().await;
            if fixtures::entry_count(&self.staging_root) == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }
}

/// Hand-built `multipart/form-data` body.
#[derive(Default)]
pub struct MultipartBody {
    buf: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.buf.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content: &[u8]) -> Self {
        self.buf.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, name, filename
            )
            .as_bytes(),
        );
        self.buf.extend_from_slice(content);
        self.buf.extend_from_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.buf
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        self.buf
    }
}
