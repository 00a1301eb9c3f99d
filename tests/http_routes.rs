//! HTTP Route Tests
//!
//! Signed URLs issued by a disk service are honoured by the HTTP server:
//! - Blob reads return the content with the signed headers
//! - Direct uploads are verified before anything is stored
//! - Metrics expose every mirror service

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use blobmirror::http_server::{HttpServer, HttpServerConfig};
use blobmirror::service::{
    checksum, DirectUploadOptions, Disposition, Registry, StorageBackend, StorageConfig,
    UploadOptions, UrlOptions,
};
use chrono::Duration;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const HOST: &str = "http://localhost:54321";

fn registry(temp: &TempDir) -> Arc<Registry> {
    let config = StorageConfig::from_json(
        &json!({
            "secret": "s",
            "host": HOST,
            "services": {
                "a": { "service": "Disk", "root": temp.path().join("a") },
                "b": { "service": "Disk", "root": temp.path().join("b") },
                "mirror": { "service": "Mirror", "primary": "a", "mirrors": ["b"] }
            }
        })
        .to_string(),
    )
    .unwrap();
    Arc::new(Registry::build(&config).unwrap())
}

fn router(registry: Arc<Registry>) -> Router {
    HttpServer::new(HttpServerConfig::default(), registry).router()
}

fn path_of(url: &str) -> &str {
    url.strip_prefix(HOST).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

#[tokio::test]
async fn test_health() {
    let temp = TempDir::new().unwrap();
    let response = router(registry(&temp))
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["services"], 3);
}

#[tokio::test]
async fn test_serve_signed_blob() {
    let temp = TempDir::new().unwrap();
    let registry = registry(&temp);
    let mirror = registry.get("mirror").unwrap();

    mirror
        .upload(
            "abc",
            &mut &b"hello"[..],
            &UploadOptions::with_checksum(checksum::compute(b"hello")),
        )
        .unwrap();
    let url = mirror
        .url(
            "abc",
            &UrlOptions {
                disposition: Disposition::Attachment,
                filename: Some("hello.txt".to_string()),
                content_type: Some("text/plain".to_string()),
                ..UrlOptions::default()
            },
        )
        .unwrap();

    let response = router(registry)
        .oneshot(Request::get(path_of(&url)).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"hello.txt\""
    );
    assert_eq!(body_bytes(response).await, b"hello");
}

#[tokio::test]
async fn test_expired_and_foreign_tokens_rejected() {
    let temp = TempDir::new().unwrap();
    let registry = registry(&temp);
    let disk = registry.disk("a").unwrap();

    let expired = disk
        .url(
            "abc",
            &UrlOptions {
                expires_in: Duration::seconds(-10),
                ..UrlOptions::default()
            },
        )
        .unwrap();
    let response = router(Arc::clone(&registry))
        .oneshot(Request::get(path_of(&expired)).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // A token for disk "a" is not valid on disk "b"
    let url = disk.url("abc", &UrlOptions::default()).unwrap();
    let foreign = path_of(&url).replace("/storage/a/", "/storage/b/");
    let response = router(Arc::clone(&registry))
        .oneshot(Request::get(foreign).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Mirror services have no routes of their own
    let response = router(registry)
        .oneshot(
            Request::get("/storage/mirror/blobs/anything")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_direct_upload_lands_on_primary_only() {
    let temp = TempDir::new().unwrap();
    let registry = registry(&temp);
    let mirror = registry.get("mirror").unwrap();

    let data = b"direct bytes";
    let options = DirectUploadOptions {
        expires_in: Duration::minutes(5),
        content_type: "application/octet-stream".to_string(),
        content_length: data.len() as u64,
        checksum: checksum::compute(data),
    };
    let url = mirror.url_for_direct_upload("up", &options).unwrap();

    let response = router(Arc::clone(&registry))
        .oneshot(
            Request::builder()
                .method(Method::PUT)
                .uri(path_of(&url))
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .body(Body::from(data.to_vec()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(mirror.download("up").unwrap(), data);
    assert!(!registry.disk("b").unwrap().exists("up").unwrap());
}

#[tokio::test]
async fn test_large_direct_upload_is_accepted() {
    let temp = TempDir::new().unwrap();
    let registry = registry(&temp);
    let mirror = registry.get("mirror").unwrap();

    let data: Vec<u8> = (0..3 * 1024 * 1024u32).map(|i| (i % 251) as u8).collect();
    let options = DirectUploadOptions {
        expires_in: Duration::minutes(5),
        content_type: "application/octet-stream".to_string(),
        content_length: data.len() as u64,
        checksum: checksum::compute(&data),
    };
    let url = mirror.url_for_direct_upload("large", &options).unwrap();

    let response = router(Arc::clone(&registry))
        .oneshot(
            Request::builder()
                .method(Method::PUT)
                .uri(path_of(&url))
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .body(Body::from(data.clone()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(registry.disk("a").unwrap().download("large").unwrap(), data);
}

#[tokio::test]
async fn test_configured_upload_limit_applies() {
    let temp = TempDir::new().unwrap();
    let registry = registry(&temp);
    let disk = registry.disk("a").unwrap();

    let data = vec![1u8; 4096];
    let options = DirectUploadOptions {
        expires_in: Duration::minutes(5),
        content_type: "application/octet-stream".to_string(),
        content_length: data.len() as u64,
        checksum: checksum::compute(&data),
    };
    let url = disk.url_for_direct_upload("capped", &options).unwrap();

    let config = HttpServerConfig {
        max_upload_bytes: Some(1024),
        ..HttpServerConfig::default()
    };
    let response = HttpServer::new(config, Arc::clone(&registry))
        .router()
        .oneshot(
            Request::builder()
                .method(Method::PUT)
                .uri(path_of(&url))
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .body(Body::from(data))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(!disk.exists("capped").unwrap());
}

#[tokio::test]
async fn test_direct_upload_rejects_tampered_body() {
    let temp = TempDir::new().unwrap();
    let registry = registry(&temp);
    let disk = registry.disk("a").unwrap();

    let options = DirectUploadOptions {
        expires_in: Duration::minutes(5),
        content_type: "text/plain".to_string(),
        content_length: 5,
        checksum: checksum::compute(b"hello"),
    };
    let url = disk.url_for_direct_upload("up", &options).unwrap();

    let response = router(Arc::clone(&registry))
        .oneshot(
            Request::builder()
                .method(Method::PUT)
                .uri(path_of(&url))
                .header(header::CONTENT_TYPE, "text/plain")
                .body(Body::from("jello"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["code"], 422);
    assert!(!disk.exists("up").unwrap());
}

#[tokio::test]
async fn test_metrics_per_mirror_service() {
    let temp = TempDir::new().unwrap();
    let registry = registry(&temp);
    registry
        .get("mirror")
        .unwrap()
        .upload("m", &mut &b"12345"[..], &UploadOptions::default())
        .unwrap();

    let response = router(registry)
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["mirror"]["uploads"], 1);
    assert_eq!(body["mirror"]["uploaded_bytes"], 5);
    assert_eq!(body["mirror"]["mirror_uploads"], 1);
}
