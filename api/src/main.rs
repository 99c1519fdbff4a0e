//! Publish dispatcher service.
//!
//! Accepts publish requests for an uploaded asset, fans them out to the
//! caller's connected social accounts now or at a scheduled time, and records
//! one outcome per post.
//!
//! ## Environment Variables
//! - `DATABASE_URL` - Postgres connection string
//! - `PORT` - port to listen on (default: `3000`)
//! - `APP_ENV` - `development` opens the cron endpoint without a secret
//! - `CRON_SECRET` - bearer token required by `/cron/scheduled-posts`
//! - `SWEEP_WORKER_ENABLED`, `SWEEP_CRON`, `SWEEP_BATCH_SIZE` - in-process sweep
//! - `LOG_FORMAT` - `compact` (default) or `json`; `RUST_LOG` sets the level

mod config;
mod constants;
mod dispatch;
mod domain;
mod platforms;
mod routes;
mod services;
mod sweep;
#[cfg(test)]
mod testing;

use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use config::Config;
use dispatch::Dispatcher;
use domain::{PgStore, PublishStore};
use platforms::Publishers;
use routes::cron::CronAuth;

struct AppState {
    store: Arc<dyn PublishStore>,
    dispatcher: Dispatcher,
    cron: CronAuth,
    sweep_batch_size: i64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    services::logging::init(config.log_format);

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    let store: Arc<dyn PublishStore> = Arc::new(PgStore::new(pool.clone()));
    let dispatcher = Dispatcher::new(
        store.clone(),
        Arc::new(Publishers::from_config(&config, http)),
        config.adapter_timeout,
    );

    if config.cron_secret.is_none() && !config.environment.is_development() {
        tracing::warn!("CRON_SECRET is not set; /cron/scheduled-posts will reject every call");
    }

    if config.sweep.worker_enabled {
        tokio::spawn(sweep::run_sweep_worker(
            pool,
            dispatcher.clone(),
            config.sweep.clone(),
        ));
    }

    let state = Arc::new(AppState {
        store,
        dispatcher,
        cron: CronAuth::new(
            config.cron_secret.clone(),
            config.environment.is_development(),
        ),
        sweep_batch_size: config.sweep.batch_size,
    });

    let app = routes::build_routes()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        addr = %addr,
        environment = ?config.environment,
        sweep_worker = config.sweep.worker_enabled,
        "Listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
