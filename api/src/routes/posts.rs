//! Scheduled post endpoints (/posts/*)

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::AuthUser;
use super::dto::PostResponse;
use crate::AppState;
use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::domain::PostStatus;
use crate::services::error::{ApiError, LogErr};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/posts", get(list_posts))
        .route("/posts/{id}", delete(cancel_post))
        .route("/posts/{id}/retry", post(retry_post))
}

#[derive(Deserialize)]
struct ListPostsQuery {
    status: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListPostsResponse {
    posts: Vec<PostResponse>,
    total: i64,
    has_more: bool,
}

/// GET /posts - List user's posts, newest first
async fn list_posts(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<ListPostsQuery>,
) -> Result<Json<ListPostsResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);
    let status = query
        .status
        .as_deref()
        .map(str::parse::<PostStatus>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let (posts, total) = state
        .store
        .list_posts(user_id, status, limit, offset)
        .await
        .log_500("List posts error")?;

    let has_more = offset.saturating_add(posts.len() as i64) < total;

    Ok(Json(ListPostsResponse {
        posts: posts.into_iter().map(PostResponse::from).collect(),
        total,
        has_more,
    }))
}

/// DELETE /posts/:id - Cancel a post that has not started publishing
async fn cancel_post(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(post_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let cancelled = state
        .store
        .cancel_post(user_id, post_id)
        .await
        .log_500("Cancel post error")?;

    if !cancelled {
        return Err(ApiError::NotFound);
    }

    tracing::info!(post_id, user_id, "[posts] Scheduled post cancelled");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /posts/:id/retry - Reschedule a failed post for the next sweep
async fn retry_post(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(post_id): Path<i64>,
) -> Result<Json<PostResponse>, ApiError> {
    let post = state
        .store
        .retry_post(user_id, post_id, Utc::now())
        .await
        .log_500("Retry post error")?
        .ok_or_else(|| ApiError::Conflict("Only failed posts can be retried".to_string()))?;

    tracing::info!(post_id, user_id, "[posts] Failed post rescheduled");
    Ok(Json(post.into()))
}
