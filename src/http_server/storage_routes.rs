//! Storage HTTP Routes
//!
//! Endpoints behind the signed URLs that disk services hand out.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::Serialize;

use crate::observability::{log_event, Event};
use crate::service::{DiskBackend, Registry, StorageError, StorageResult};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

type ErrorReply = (StatusCode, Json<ErrorResponse>);

impl From<StorageError> for ErrorResponse {
    fn from(e: StorageError) -> Self {
        Self {
            code: e.status_code(),
            error: e.to_string(),
        }
    }
}

fn error_reply(e: StorageError) -> ErrorReply {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorResponse::from(e)))
}

/// Create storage routes
///
/// Direct uploads replace axum's default 2 MB body limit with
/// `max_upload_bytes`, or with no limit when it is unset.
pub fn storage_routes(registry: Arc<Registry>, max_upload_bytes: Option<usize>) -> Router {
    let upload_limit = match max_upload_bytes {
        Some(max) => DefaultBodyLimit::max(max),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .route("/:service/blobs/:token", get(serve_blob_handler))
        .route(
            "/:service/direct_uploads/:token",
            put(direct_upload_handler).layer(upload_limit),
        )
        .with_state(registry)
}

fn disk_for(registry: &Registry, service: &str) -> Result<Arc<DiskBackend>, ErrorReply> {
    registry.disk(service).ok_or_else(|| {
        error_reply(StorageError::UnknownService {
            name: service.to_string(),
            referenced_by: "url".to_string(),
        })
    })
}

/// Run blocking backend I/O off the async executor
async fn blocking<T, F>(f: F) -> StorageResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StorageResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Internal(format!("storage task failed: {}", e)))?
}

async fn serve_blob_handler(
    State(registry): State<Arc<Registry>>,
    Path((service, token)): Path<(String, String)>,
) -> Result<Response, ErrorReply> {
    let disk = disk_for(&registry, &service)?;
    let blob = blocking(move || disk.serve_blob(&token))
        .await
        .map_err(error_reply)?;

    let size = blob.data.len().to_string();
    log_event(
        Event::BlobServed,
        &[
            ("bytes", size.as_str()),
            ("key", blob.key.as_str()),
            ("service", service.as_str()),
        ],
    );

    Ok((
        [
            (header::CONTENT_TYPE, blob.content_type),
            (header::CONTENT_DISPOSITION, blob.content_disposition),
        ],
        blob.data,
    )
        .into_response())
}

async fn direct_upload_handler(
    State(registry): State<Arc<Registry>>,
    Path((service, token)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ErrorReply> {
    let disk = disk_for(&registry, &service)?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let result =
        blocking(move || disk.accept_direct_upload(&token, content_type.as_deref(), &body)).await;

    match result {
        Ok(_) => Ok(StatusCode::NO_CONTENT),
        Err(e) => {
            let reason = e.to_string();
            log_event(
                Event::DirectUploadRejected,
                &[("reason", reason.as_str()), ("service", service.as_str())],
            );
            Err(error_reply(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_reply_status() {
        let (status, Json(body)) = error_reply(StorageError::UrlExpired);
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.code, 403);
        assert_eq!(body.error, "URL expired");
    }
}
