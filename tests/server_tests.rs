//! HTTP tests driving the router in-process over fake tools.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{pipeline, residue, FailAt, FakeConverter, FakeMedia};
use http_body_util::BodyExt;
use revoice::server::{create_router, AppState};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "revoice-test-boundary";

fn router(
    media: FakeMedia,
    converter: Arc<FakeConverter>,
    root: &TempDir,
    request_timeout: Option<Duration>,
    max_upload_bytes: usize,
) -> Router {
    let pipeline = pipeline(Arc::new(media), converter, root, Duration::from_secs(180), 1);
    create_router(Arc::new(AppState {
        pipeline: Arc::new(pipeline),
        request_timeout,
        max_upload_bytes,
    }))
}

fn default_router(root: &TempDir) -> Router {
    router(
        FakeMedia::new(Duration::from_secs(400)),
        Arc::new(FakeConverter::new()),
        root,
        None,
        1024 * 1024,
    )
}

fn multipart_body(video: Option<&[u8]>, gender: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(video) = video {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"video\"; filename=\"in.mp4\"\r\nContent-Type: video/mp4\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(video);
        body.extend_from_slice(b"\r\n");
    }
    if let Some(gender) = gender {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"gender\"\r\n\r\n{gender}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn process_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/process")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

async fn error_message(response: axum::response::Response) -> String {
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    json["error"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let root = TempDir::new().unwrap();
    let response = default_router(&root)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json, serde_json::json!({ "status": "healthy" }));
}

#[tokio::test]
async fn test_process_returns_converted_video() {
    let root = TempDir::new().unwrap();
    let response = default_router(&root)
        .oneshot(process_request(multipart_body(Some(b"VIDEO"), Some("male"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"converted.mp4\""
    );
    let expected = b"VIDEO|v[0+180]v[180+180]v[360+40]".to_vec();
    assert_eq!(
        response.headers()[header::CONTENT_LENGTH],
        expected.len().to_string().as_str()
    );
    // The output lives in scratch until the body has been sent.
    assert_eq!(residue(&root), 1);
    assert_eq!(body_bytes(response).await, expected);
    assert_eq!(residue(&root), 0);
}

#[tokio::test]
async fn test_missing_gender_defaults_to_female() {
    let root = TempDir::new().unwrap();
    let converter = Arc::new(FakeConverter::new());
    let app = router(
        FakeMedia::new(Duration::from_secs(60)),
        converter.clone(),
        &root,
        None,
        1024 * 1024,
    );

    let response = app
        .oneshot(process_request(multipart_body(Some(b"VIDEO"), None)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(converter.models_used(), vec!["NikkiDorkDiaries.pth"]);
}

#[tokio::test]
async fn test_missing_video_is_bad_request() {
    let root = TempDir::new().unwrap();
    let response = default_router(&root)
        .oneshot(process_request(multipart_body(None, Some("female"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_message(response).await, "No video file provided");
    assert_eq!(residue(&root), 0);
}

#[tokio::test]
async fn test_non_multipart_is_bad_request() {
    let root = TempDir::new().unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/process")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let response = default_router(&root).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!error_message(response).await.is_empty());
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let root = TempDir::new().unwrap();
    let app = router(
        FakeMedia::new(Duration::from_secs(10)),
        Arc::new(FakeConverter::new()),
        &root,
        None,
        256,
    );

    let response = app
        .oneshot(process_request(multipart_body(Some(&[7u8; 4096]), None)))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    assert_eq!(residue(&root), 0);
}

#[tokio::test]
async fn test_conversion_failure_is_internal_error() {
    let root = TempDir::new().unwrap();
    let app = router(
        FakeMedia::new(Duration::from_secs(400)),
        Arc::new(FakeConverter::failing_on(1)),
        &root,
        None,
        1024 * 1024,
    );

    let response = app
        .oneshot(process_request(multipart_body(Some(b"VIDEO"), None)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_message(response).await, "Voice conversion failed");
    assert_eq!(residue(&root), 0);
}

#[tokio::test]
async fn test_media_failure_hides_details() {
    let root = TempDir::new().unwrap();
    let app = router(
        FakeMedia::failing(Duration::from_secs(400), FailAt::Remux),
        Arc::new(FakeConverter::new()),
        &root,
        None,
        1024 * 1024,
    );

    let response = app
        .oneshot(process_request(multipart_body(Some(b"VIDEO"), None)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_message(response).await, "Media processing failed");
}

#[tokio::test]
async fn test_timeout_is_internal_error_and_cleans_up() {
    let root = TempDir::new().unwrap();
    let app = router(
        FakeMedia::new(Duration::from_secs(400)),
        Arc::new(FakeConverter::slow(Duration::from_secs(30))),
        &root,
        Some(Duration::from_millis(100)),
        1024 * 1024,
    );

    let response = app
        .oneshot(process_request(multipart_body(Some(b"VIDEO"), None)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_message(response).await, "Request timed out");
    assert_eq!(residue(&root), 0);
}

/// Log sink shared with a test subscriber.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    fn lines_with(&self, level: &str, needle: &str) -> usize {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .filter(|l| l.contains(level) && l.contains(needle))
            .count()
    }
}

#[tokio::test]
async fn test_failed_request_is_logged_as_error_once() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let root = TempDir::new().unwrap();
    let app = router(
        FakeMedia::new(Duration::from_secs(400)),
        Arc::new(FakeConverter::failing_on(1)),
        &root,
        None,
        1024 * 1024,
    );
    let response = app
        .oneshot(process_request(multipart_body(Some(b"VIDEO"), None)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(logs.lines_with("ERROR", "fake failure on chunk 1"), 1);
    assert_eq!(logs.lines_with("DEBUG", "Request failed"), 1);
}
