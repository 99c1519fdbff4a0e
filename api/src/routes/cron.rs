//! Sweep trigger for external schedulers (/cron/scheduled-posts)

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, header::AUTHORIZATION},
    routing::get,
};
use chrono::Utc;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::AppState;
use crate::services::error::{ApiError, LogErr};
use crate::sweep::{SweepSummary, run_sweep};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/cron/scheduled-posts",
        get(trigger_sweep).post(trigger_sweep),
    )
}

/// Shared-secret check for the cron endpoint
#[derive(Clone)]
pub struct CronAuth {
    secret: Option<String>,
    allow_unauthenticated: bool,
}

impl CronAuth {
    pub fn new(secret: Option<String>, allow_unauthenticated: bool) -> Self {
        Self {
            secret,
            allow_unauthenticated,
        }
    }

    /// Without a configured secret only development mode is let through
    pub fn authorize(&self, headers: &HeaderMap) -> bool {
        if self.allow_unauthenticated {
            return true;
        }
        let Some(secret) = self.secret.as_deref() else {
            return false;
        };

        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token.as_bytes().ct_eq(secret.as_bytes()).into())
    }
}

/// GET|POST /cron/scheduled-posts - Run one sweep
async fn trigger_sweep(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SweepSummary>, ApiError> {
    if !state.cron.authorize(&headers) {
        tracing::warn!("[sweep] Rejected unauthorized cron trigger");
        return Err(ApiError::Unauthorized);
    }

    let summary = run_sweep(&state.dispatcher, Utc::now(), state.sweep_batch_size)
        .await
        .log_500("Sweep claim error")?;

    tracing::info!(
        claimed = summary.claimed,
        posted = summary.posted,
        failed = summary.failed,
        "[sweep] Cron trigger complete"
    );
    Ok(Json(summary))
}
