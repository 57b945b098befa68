//! HTTP request handlers

use axum::{
    body::Body,
    extract::{multipart::MultipartRejection, Multipart, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{Result, RevoiceError};
use crate::pipeline::{Pipeline, StagedVideo};
use crate::server::AppState;

/// Voice used when the form carries no `gender` field.
const DEFAULT_GENDER: &str = "Female";

const OUTPUT_DISPOSITION: &str = "attachment; filename=\"converted.mp4\"";

/// HTTP error type
#[derive(Debug)]
pub enum HttpError {
    BadRequest(String),
    InternalError(String),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            HttpError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            HttpError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<RevoiceError> for HttpError {
    fn from(err: RevoiceError) -> Self {
        if err.is_client_error() {
            HttpError::BadRequest(err.public_message())
        } else {
            HttpError::InternalError(err.public_message())
        }
    }
}

/// Fields of a `/process` form.
struct ProcessForm {
    video: StagedVideo,
    gender: String,
}

/// Read the form, streaming the `video` field straight into a scratch area.
async fn read_form(pipeline: &Pipeline, mut multipart: Multipart) -> Result<ProcessForm> {
    let mut video = None;
    let mut gender = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RevoiceError::Upload(format!("Malformed upload: {}", e.body_text())))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("video") => {
                video = Some(pipeline.stage_upload(field).await?);
            }
            Some("gender") => {
                let text = field.text().await.map_err(|e| {
                    RevoiceError::Upload(format!("Unreadable gender field: {}", e.body_text()))
                })?;
                gender = Some(text);
            }
            _ => {}
        }
    }

    let video = video.ok_or_else(|| RevoiceError::Upload("No video file provided".to_string()))?;

    Ok(ProcessForm {
        video,
        gender: gender.unwrap_or_else(|| DEFAULT_GENDER.to_string()),
    })
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

/// Voice conversion endpoint
/// POST /process (multipart: `video` file, optional `gender`)
pub async fn process_video(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Response, HttpError> {
    let multipart = multipart.map_err(|e| {
        warn!("Rejected upload: {}", e.body_text());
        HttpError::BadRequest("Expected a multipart form upload".to_string())
    })?;

    let form = read_form(&state.pipeline, multipart).await.map_err(|e| {
        warn!("Rejected upload: {}", e);
        HttpError::from(e)
    })?;

    info!(
        "Processing {} byte upload (gender: {})",
        form.video.size(),
        form.gender
    );

    let work = state
        .pipeline
        .process_upload(form.video, Some(form.gender.as_str()));

    // A timed-out future is dropped, which removes its scratch area and
    // kills any running child process.
    let outcome = match state.request_timeout {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .unwrap_or(Err(RevoiceError::Timeout(limit))),
        None => work.await,
    };

    // Pipeline failures are already logged with their stage.
    let converted = outcome.map_err(|e| {
        match &e {
            RevoiceError::Timeout(_) => warn!("Request failed: {}", e),
            _ => debug!("Request failed: {}", e),
        }
        HttpError::from(e)
    })?;

    info!(
        "Returning converted video ({} chunks, {:.2}s)",
        converted.stats.chunks_converted,
        converted.stats.total_time.as_secs_f64()
    );

    let (len, stream) = converted.into_stream().await.map_err(|e| {
        error!("Cannot open converted video: {}", e);
        HttpError::from(e)
    })?;

    let mut response = Response::new(Body::from_stream(stream));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("video/mp4"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static(OUTPUT_DISPOSITION),
    );

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_error_maps_to_bad_request() {
        let response =
            HttpError::from(RevoiceError::Upload("No video file provided".to_string()))
                .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_pipeline_errors_map_to_internal() {
        for err in [
            RevoiceError::MediaTool("ffmpeg exploded".to_string()),
            RevoiceError::Inference("rvc exploded".to_string()),
            RevoiceError::Internal("boom".to_string()),
            RevoiceError::Timeout(std::time::Duration::from_secs(1)),
        ] {
            let response = HttpError::from(err).into_response();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}
