pub mod accounts;
pub mod auth;
pub mod cron;
pub mod dto;
pub mod health;
pub mod posts;
pub mod publish;

use axum::Router;
use std::sync::Arc;

use crate::AppState;

/// Build all routes for the API
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(accounts::routes())
        .merge(cron::routes())
        .merge(health::routes())
        .merge(posts::routes())
        .merge(publish::routes())
}
