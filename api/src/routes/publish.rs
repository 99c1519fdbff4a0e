//! Publish endpoint (/publish)

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    routing::post,
};
use serde::Serialize;
use std::sync::Arc;

use super::auth::AuthUser;
use super::dto::PostResponse;
use crate::AppState;
use crate::dispatch::{DispatchOutcome, PublishRequest};
use crate::domain::{PlatformFailure, PlatformSuccess};
use crate::services::error::ApiError;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/publish", post(publish))
}

/// `partial` is reported here only; the stored status is `posted`
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum PublishResponse {
    Scheduled {
        post: PostResponse,
    },
    Posted {
        post: PostResponse,
        results: Vec<PlatformSuccess>,
    },
    Partial {
        post: PostResponse,
        results: Vec<PlatformSuccess>,
        errors: Vec<PlatformFailure>,
    },
    Failed {
        post: PostResponse,
        errors: Vec<PlatformFailure>,
    },
}

impl PublishResponse {
    fn from_outcome(outcome: DispatchOutcome) -> (StatusCode, Self) {
        match outcome {
            DispatchOutcome::Scheduled(post) => (
                StatusCode::CREATED,
                PublishResponse::Scheduled { post: post.into() },
            ),
            DispatchOutcome::Published(post) => {
                let results = post.platform_responses.results.clone();
                (
                    StatusCode::OK,
                    PublishResponse::Posted {
                        post: post.into(),
                        results,
                    },
                )
            }
            DispatchOutcome::PartiallyPublished(post) => {
                let responses = post.platform_responses.0.clone();
                (
                    StatusCode::OK,
                    PublishResponse::Partial {
                        post: post.into(),
                        results: responses.results,
                        errors: responses.errors,
                    },
                )
            }
            DispatchOutcome::Failed(post) => {
                let errors = post.platform_responses.errors.clone();
                (
                    StatusCode::BAD_GATEWAY,
                    PublishResponse::Failed {
                        post: post.into(),
                        errors,
                    },
                )
            }
        }
    }
}

/// POST /publish - Publish now or schedule for later
async fn publish(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<PublishRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PublishResponse>), ApiError> {
    let Json(payload) = payload?;
    let outcome = state.dispatcher.publish(user_id, payload).await?;
    let (status, body) = PublishResponse::from_outcome(outcome);
    Ok((status, Json(body)))
}
