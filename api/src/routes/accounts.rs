//! Connected account endpoints (/accounts)

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::get,
};
use std::sync::Arc;

use super::auth::AuthUser;
use super::dto::{AccountResponse, AccountUpsertRequest};
use crate::AppState;
use crate::domain::{NewConnectedAccount, Platform};
use crate::services::error::{ApiError, LogErr};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/accounts", get(list_accounts).put(upsert_account))
}

/// GET /accounts - List the caller's connected accounts
async fn list_accounts(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<AccountResponse>>, ApiError> {
    let accounts = state
        .store
        .list_accounts(user_id)
        .await
        .log_500("List accounts error")?;

    Ok(Json(accounts.into_iter().map(AccountResponse::from).collect()))
}

/// PUT /accounts - Store or refresh credentials after an OAuth callback
async fn upsert_account(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<AccountUpsertRequest>, JsonRejection>,
) -> Result<Json<AccountResponse>, ApiError> {
    let Json(payload) = payload?;
    let platform: Platform = payload
        .platform
        .parse()
        .map_err(|e: crate::domain::platform::UnknownPlatform| {
            ApiError::BadRequest(e.to_string())
        })?;

    let external_account_id = payload.external_account_id.trim().to_string();
    if external_account_id.is_empty() || payload.access_token.is_empty() {
        return Err(ApiError::BadRequest(
            "External account id and access token are required".to_string(),
        ));
    }

    let account = state
        .store
        .upsert_account(&NewConnectedAccount {
            user_id,
            platform,
            external_account_id,
            access_token: payload.access_token,
            display_name: payload.display_name,
        })
        .await
        .log_500("Upsert account error")?;

    tracing::info!(
        user_id,
        platform = %account.platform,
        account_id = %account.external_account_id,
        "[accounts] Account connected"
    );
    Ok(Json(account.into()))
}
