use std::{collections::HashSet, sync::Arc};

use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State, rejection::QueryRejection},
    http::{
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, error, info};
use url::Url;

use crate::{
    config::ConfigError, error::DownloadError, filename::build_content_disposition,
    service::AudioDownloader,
};

const TRACK_TITLE: HeaderName = HeaderName::from_static("x-track-title");
const TRACK_DURATION: HeaderName = HeaderName::from_static("x-track-duration");

#[derive(Clone)]
pub struct AppState {
    pub downloader: Arc<AudioDownloader>,
    pub api_version: Arc<str>,
}

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    url: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    status: u16,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    details: Option<String>,
}

impl ApiError {
    fn missing_url() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: "URL is required".to_string(),
            details: Some("Provide a valid YouTube URL as the url query parameter".to_string()),
        }
    }

    fn processing(details: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: "Failed to process download".to_string(),
            details: Some(details.into()),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: message.into(),
            details: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            success: false,
            status: self.status.as_u16(),
            error: self.error,
            details: self.details,
        });

        (self.status, body).into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/download", get(download));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest(&format!("/api/{}", state.api_version), api)
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "YouTube audio download API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "version": state.api_version.as_ref(),
    }))
}

async fn download(
    State(state): State<AppState>,
    query: Result<Query<DownloadQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    info!("New download request received");

    let url = query
        .ok()
        .and_then(|Query(query)| query.url)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            info!("Download request rejected: missing url parameter");
            ApiError::missing_url()
        })?;

    info!("Processing URL {:?}", url);
    let track = state.downloader.download(&url).await.map_err(|failure| {
        match failure.kind() {
            DownloadError::InvalidUrl { .. } => info!("Download rejected: {failure}"),
            _ => error!("Download failed for {:?}: {failure}", url),
        }
        ApiError::processing(failure.to_string())
    })?;
    info!(
        "Download finished: {:?} ({} bytes, {}s)",
        track.title, track.size, track.duration
    );

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(track.content_type));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(track.size));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&build_content_disposition(&track.filename))
            .map_err(|_| ApiError::internal("Could not build the download header."))?,
    );
    headers.insert(
        TRACK_TITLE,
        HeaderValue::from_str(&urlencoding::encode(&track.title))
            .map_err(|_| ApiError::internal("Could not build the title header."))?,
    );
    headers.insert(TRACK_DURATION, HeaderValue::from(track.duration));

    Ok((headers, Body::from(track.buffer)).into_response())
}

pub fn build_cors_layer(origins: &[String]) -> Result<CorsLayer, ConfigError> {
    let normalized_origins = origins
        .iter()
        .map(|origin| {
            normalize_origin(origin).ok_or_else(|| ConfigError::Invalid {
                key: "ALLOWED_ORIGINS",
                expected: "a list of origins like https://example.com",
                value: origin.clone(),
            })
        })
        .collect::<Result<HashSet<_>, _>>()?;
    info!(
        "CORS allow-list loaded with {} origin(s): {:?}",
        normalized_origins.len(),
        normalized_origins
    );

    let allowed_origins = Arc::new(normalized_origins);
    let allow_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let normalized = origin.to_str().ok().and_then(normalize_origin);
        let allowed = normalized
            .as_ref()
            .is_some_and(|value| allowed_origins.contains(value));
        debug!("CORS origin check raw={:?} allowed={}", origin, allowed);
        allowed
    });

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET])
        .allow_headers(Any)
        .expose_headers([CONTENT_DISPOSITION, TRACK_TITLE, TRACK_DURATION]))
}

fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let scheme = parsed.scheme();
    let default_port = match scheme {
        "http" => 80,
        "https" => 443,
        _ => return None,
    };

    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return None;
    }

    match parsed.port() {
        Some(port) if port != default_port => Some(format!("{scheme}://{host}:{port}")),
        _ => Some(format!("{scheme}://{host}")),
    }
}
