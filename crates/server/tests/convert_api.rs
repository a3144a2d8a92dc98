//! API tests for the conversion endpoints, driven in-process against mocks.

mod common;

use std::io::Read;

use axum::http::StatusCode;
use convertino_core::ConverterError;

use common::{Converters, MultipartBody, TestFixture, MAX_FILE_BYTES};

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["status"], "ok");
}

#[tokio::test]
async fn test_config_reports_upload_limit() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/config").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["uploads"]["max_file_bytes"], MAX_FILE_BYTES);
}

#[tokio::test]
async fn test_list_conversions() {
    let converters = Converters::default();
    converters.pages.set_unavailable(Some("pdfium not found")).await;
    let fixture = TestFixture::with_converters(converters).await;

    let response = fixture.get("/api/v1/conversions").await;
    assert_eq!(response.status, StatusCode::OK);

    let json = response.json();
    let conversions = json["conversions"].as_array().unwrap();
    assert_eq!(conversions.len(), 3);

    let merge = conversions
        .iter()
        .find(|c| c["identifier"] == "merge_pdfs")
        .unwrap();
    assert_eq!(merge["min_files"], 2);
    assert_eq!(merge["max_files"], 10);
    assert_eq!(merge["accepted_extensions"][0], "pdf");
    assert_eq!(merge["available"], true);

    let pages = conversions
        .iter()
        .find(|c| c["identifier"] == "pdf_to_png")
        .unwrap();
    assert_eq!(pages["output_kind"], "archive_of_files");
    assert_eq!(pages["available"], false);
    assert_eq!(pages["reason"], "pdfium not found");
}

#[tokio::test]
async fn test_convert_returns_artifact() {
    let fixture = TestFixture::new().await;
    let body = MultipartBody::new()
        .text("conversion_type", "txt_to_pdf")
        .file("file", "My Notes.txt", b"hello world");

    let response = fixture.post_multipart("/api/v1/convert", body).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("application/pdf"));
    assert_eq!(response.header("content-length"), Some("11"));
    let disposition = response.header("content-disposition").unwrap();
    assert!(disposition.starts_with("attachment;"));
    assert!(disposition.contains("My_Notes.pdf"));
    assert!(response.header("x-conversion-job").is_some());
    assert_eq!(response.body, b"hello world");

    // Reading the body completes delivery, which removes the job directory.
    assert!(fixture.wait_until_staging_empty().await);
}

#[tokio::test]
async fn test_conversion_type_as_query_parameter() {
    let fixture = TestFixture::new().await;
    let body = MultipartBody::new().file("file", "a.txt", b"abc");

    let response = fixture
        .post_multipart("/api/v1/convert?conversion_type=txt_to_pdf", body)
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, b"abc");
}

#[tokio::test]
async fn test_unsupported_conversion() {
    let fixture = TestFixture::new().await;
    let body = MultipartBody::new()
        .text("conversion_type", "pdf_to_mp3")
        .file("file", "a.pdf", b"%PDF");

    let response = fixture.post_multipart("/api/v1/convert", body).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["kind"], "unsupported_conversion");
    assert_eq!(fixture.converters.txt.conversion_count().await, 0);
    assert_eq!(common::fixtures::entry_count(fixture.staging_root()), 0);
}

#[tokio::test]
async fn test_wrong_extension() {
    let fixture = TestFixture::new().await;
    let body = MultipartBody::new()
        .text("conversion_type", "txt_to_pdf")
        .file("file", "image.png", b"png");

    let response = fixture.post_multipart("/api/v1/convert", body).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["kind"], "invalid_extension");
    assert_eq!(fixture.converters.txt.conversion_count().await, 0);
}

#[tokio::test]
async fn test_oversized_file() {
    let fixture = TestFixture::new().await;
    let content = vec![b'x'; MAX_FILE_BYTES as usize + 1];
    let body = MultipartBody::new()
        .text("conversion_type", "txt_to_pdf")
        .file("file", "big.txt", &content);

    let response = fixture.post_multipart("/api/v1/convert", body).await;

    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.json()["kind"], "payload_too_large");
    assert_eq!(fixture.converters.txt.conversion_count().await, 0);
    assert!(fixture.wait_until_staging_empty().await);
}

#[tokio::test]
async fn test_converter_failure_hides_diagnostics() {
    let converters = Converters::default();
    converters
        .txt
        .set_next_error(ConverterError::invalid_input("parser exploded at /srv/secret"))
        .await;
    let fixture = TestFixture::with_converters(converters).await;
    let body = MultipartBody::new()
        .text("conversion_type", "txt_to_pdf")
        .file("file", "a.txt", b"abc");

    let response = fixture.post_multipart("/api/v1/convert", body).await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    let json = response.json();
    assert_eq!(json["kind"], "conversion_failed");
    assert!(!json["error"].as_str().unwrap().contains("/srv/secret"));
    assert!(fixture.wait_until_staging_empty().await);
}

#[tokio::test]
async fn test_merge_requires_two_files() {
    let fixture = TestFixture::new().await;
    let body = MultipartBody::new()
        .text("conversion_type", "merge_pdfs")
        .file("files", "only.pdf", b"A");

    let response = fixture.post_multipart("/api/v1/convert", body).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["kind"], "insufficient_file_count");
    assert_eq!(fixture.converters.merge.conversion_count().await, 0);
}

#[tokio::test]
async fn test_merge_keeps_upload_order() {
    let fixture = TestFixture::new().await;
    let body = MultipartBody::new()
        .text("conversion_type", "merge_pdfs")
        .file("files", "c.pdf", b"C")
        .file("files", "a.pdf", b"A")
        .file("files", "b.pdf", b"B");

    let response = fixture.post_multipart("/api/v1/convert", body).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, b"CAB");
    let calls = fixture.converters.merge.recorded_conversions().await;
    assert_eq!(calls[0].inputs, vec!["c.pdf", "a.pdf", "b.pdf"]);
}

#[tokio::test]
async fn test_multi_page_output_is_zipped() {
    let converters = Converters::default();
    converters
        .pages
        .set_outputs(&["page_001.png", "page_002.png"])
        .await;
    let fixture = TestFixture::with_converters(converters).await;
    let body = MultipartBody::new()
        .text("conversion_type", "pdf_to_png")
        .file("file", "deck.pdf", b"%PDF-1.4");

    let response = fixture.post_multipart("/api/v1/convert", body).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("application/zip"));
    assert!(response
        .header("content-disposition")
        .unwrap()
        .contains("deck_all_pages.zip"));

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(response.body.clone())).unwrap();
    assert_eq!(archive.len(), 2);
    let mut first = archive.by_index(0).unwrap();
    assert_eq!(first.name(), "page_001.png");
    let mut content = Vec::new();
    first.read_to_end(&mut content).unwrap();
    assert_eq!(content, b"%PDF-1.4");
}

#[tokio::test]
async fn test_missing_conversion_type() {
    let fixture = TestFixture::new().await;
    let body = MultipartBody::new().text("note", "hello");

    let response = fixture.post_multipart("/api/v1/convert", body).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["kind"], "bad_request");
}

#[tokio::test]
async fn test_files_before_conversion_type_rejected() {
    let fixture = TestFixture::new().await;
    let body = MultipartBody::new()
        .file("file", "a.txt", b"abc")
        .text("conversion_type", "txt_to_pdf");

    let response = fixture.post_multipart("/api/v1/convert", body).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["kind"], "bad_request");
    assert_eq!(fixture.converters.txt.conversion_count().await, 0);
}

#[tokio::test]
async fn test_non_multipart_body_rejected() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .post_raw("/api/v1/convert", "application/json", b"{}")
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["kind"], "bad_request");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    fixture.get("/api/v1/health").await;

    let response = fixture.get("/metrics").await;
    assert_eq!(response.status, StatusCode::OK);
    let text = String::from_utf8(response.body).unwrap();
    assert!(text.contains("convertino_http_requests_total"));
}
