//! HTTP surface for the story lifecycle operations.
//!
//! The rendering client drives everything through this router: admin
//! verification, uploads, the story grid, media playback, views, likes, and
//! comments. Errors map to JSON envelopes with a machine-readable code.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::admin_gate::{AdminGate, AdminSession};
use crate::config::ApiConfig;
use crate::media_ingest::{IngestError, MediaIngest, MediaKind, RawUpload};
use crate::reaction_log::{CommentError, ReactionLog};
use crate::story_store::{Story, StoryId, StoryStore};
use crate::view_tracker::{ViewTracker, ViewedSet};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StoryStore>,
    pub ingest: Arc<MediaIngest>,
    pub views: Arc<ViewTracker>,
    pub reactions: Arc<ReactionLog>,
    pub gate: Arc<AdminGate>,
    pub session: Arc<AdminSession>,
    /// View-dedup state for the process-local viewer.
    pub viewed: Arc<Mutex<ViewedSet>>,
}

/// Story in API responses
#[derive(Debug, Serialize)]
pub struct StoryResponse {
    pub id: StoryId,
    pub kind: MediaKind,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub duration_secs: Option<f64>,
    pub view_count: u64,
    pub like_count: u64,
    pub comments: Vec<String>,
}

impl From<Story> for StoryResponse {
    fn from(story: Story) -> Self {
        Self {
            id: story.id,
            kind: story.media.kind(),
            content_type: story.media.content_type().to_string(),
            created_at: story.created_at,
            duration_secs: story.duration_secs,
            view_count: story.view_count,
            like_count: story.like_count,
            comments: story.comments,
        }
    }
}

/// Admin verification request
#[derive(Debug, Deserialize)]
pub struct VerifyAdminRequest {
    pub user_id: String,
}

/// Admin verification response
#[derive(Debug, Serialize)]
pub struct VerifyAdminResponse {
    pub granted: bool,
    pub user_id: String,
}

/// Comment submission request
#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub text: String,
}

/// Counter responses
#[derive(Debug, Serialize)]
pub struct ViewCountResponse {
    pub view_count: u64,
}

#[derive(Debug, Serialize)]
pub struct LikeCountResponse {
    pub like_count: u64,
}

#[derive(Debug, Serialize)]
pub struct CommentCountResponse {
    pub comment_count: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

fn not_found() -> ApiError {
    api_error(StatusCode::NOT_FOUND, "Story not found", "NOT_FOUND")
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<header::HeaderValue> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/admin/verify", post(verify_admin))
        .route("/api/v1/stories", get(list_stories).post(upload_story))
        .route("/api/v1/stories/:story_id", get(get_story))
        .route("/api/v1/stories/:story_id/media", get(get_story_media))
        .route("/api/v1/stories/:story_id/view", post(record_view))
        .route("/api/v1/stories/:story_id/like", post(like_story))
        .route("/api/v1/stories/:story_id/comments", post(comment_story))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "glimpse-stories"
    }))
}

/// Verify the caller against the authorization provider
#[instrument(skip(state, request))]
async fn verify_admin(
    State(state): State<AppState>,
    Json(request): Json<VerifyAdminRequest>,
) -> Result<Json<VerifyAdminResponse>, ApiError> {
    match state.gate.request_admin_capability(&request.user_id).await {
        Ok(capability) => {
            state.session.grant(capability);
            Ok(Json(VerifyAdminResponse {
                granted: true,
                user_id: request.user_id,
            }))
        }
        Err(denied) => {
            warn!(user_id = %request.user_id, reason = %denied, "Admin verification denied");
            Err(api_error(StatusCode::FORBIDDEN, denied.to_string(), "DENIED"))
        }
    }
}

/// Upload a story (raw body, classified by Content-Type)
#[instrument(skip(state, headers, body))]
async fn upload_story(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<StoryResponse>), ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();

    let capability = state.session.capability();
    let upload = RawUpload {
        content_type,
        data: body,
    };

    match state.ingest.ingest(capability.as_ref(), upload).await {
        Ok(story) => Ok((StatusCode::CREATED, Json(story.into()))),
        Err(IngestError::Unauthorized) => Err(api_error(
            StatusCode::FORBIDDEN,
            "Only verified admins can upload stories",
            "UNAUTHORIZED",
        )),
        Err(IngestError::NoFileSelected) => Err(api_error(
            StatusCode::BAD_REQUEST,
            "Upload body is empty",
            "NO_FILE_SELECTED",
        )),
        Err(e @ IngestError::UnsupportedType { .. }) => Err(api_error(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            e.to_string(),
            "UNSUPPORTED_TYPE",
        )),
        Err(e @ IngestError::Probe(_)) => Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            e.to_string(),
            "PROBE_ERROR",
        )),
    }
}

/// List live stories in admission order
async fn list_stories(State(state): State<AppState>) -> Json<Vec<StoryResponse>> {
    let stories: Vec<StoryResponse> = state.store.all().into_iter().map(Into::into).collect();
    Json(stories)
}

/// Get a single story
async fn get_story(
    State(state): State<AppState>,
    Path(story_id): Path<u64>,
) -> Result<Json<StoryResponse>, ApiError> {
    state
        .store
        .get(StoryId::from(story_id))
        .map(|story| Json(story.into()))
        .ok_or_else(not_found)
}

/// Serve a story's media bytes
async fn get_story_media(
    State(state): State<AppState>,
    Path(story_id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let story = state.store.get(StoryId::from(story_id)).ok_or_else(not_found)?;

    let data = story.media.blob().bytes().ok_or_else(not_found)?;
    let content_type = story
        .media
        .content_type()
        .parse::<header::HeaderValue>()
        .unwrap_or_else(|_| header::HeaderValue::from_static("application/octet-stream"));

    Ok(([(header::CONTENT_TYPE, content_type)], data))
}

/// Record a view for the process-local viewer
#[instrument(skip(state))]
async fn record_view(
    State(state): State<AppState>,
    Path(story_id): Path<u64>,
) -> Result<Json<ViewCountResponse>, ApiError> {
    let mut viewed = state.viewed.lock();
    state
        .views
        .record_view(&mut viewed, StoryId::from(story_id))
        .map(|view_count| Json(ViewCountResponse { view_count }))
        .ok_or_else(not_found)
}

/// Like a story
#[instrument(skip(state))]
async fn like_story(
    State(state): State<AppState>,
    Path(story_id): Path<u64>,
) -> Result<Json<LikeCountResponse>, ApiError> {
    state
        .reactions
        .like(StoryId::from(story_id))
        .map(|like_count| Json(LikeCountResponse { like_count }))
        .ok_or_else(not_found)
}

/// Comment on a story
#[instrument(skip(state, request))]
async fn comment_story(
    State(state): State<AppState>,
    Path(story_id): Path<u64>,
    Json(request): Json<CommentRequest>,
) -> Result<Json<CommentCountResponse>, ApiError> {
    match state.reactions.comment(StoryId::from(story_id), &request.text) {
        Ok(Some(comment_count)) => Ok(Json(CommentCountResponse { comment_count })),
        Ok(None) => Err(not_found()),
        Err(CommentError::EmptyComment) => Err(api_error(
            StatusCode::BAD_REQUEST,
            "Comment text is empty",
            "EMPTY_COMMENT",
        )),
    }
}

/// Start the API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> anyhow::Result<()> {
    use anyhow::Context;

    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting stories API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_ingest::MediaAsset;

    #[test]
    fn story_response_from_story() {
        let store = StoryStore::new(chrono::Duration::hours(24));
        let asset = MediaAsset::new(MediaKind::Video, "video/mp4", Bytes::from_static(b"mp4"));
        let story = store.admit(asset, Some(42.0), Utc::now());

        let response: StoryResponse = story.into();
        assert_eq!(response.kind, MediaKind::Video);
        assert_eq!(response.content_type, "video/mp4");
        assert_eq!(response.duration_secs, Some(42.0));
        assert_eq!(response.view_count, 0);
        assert!(response.comments.is_empty());
    }
}
