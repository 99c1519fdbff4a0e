//! Scheduled post sweep
//!
//! Claims due posts and runs each through the dispatcher. Triggered by the
//! in-process apalis cron worker or by the `/cron/scheduled-posts` endpoint.

use apalis::prelude::*;
use apalis_cron::{CronStream, Schedule};
use apalis_sql::postgres::PostgresStorage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::str::FromStr;

use crate::config::SweepConfig;
use crate::dispatch::{Dispatcher, PostContent};
use crate::domain::{PlatformResponses, PostStatus, ScheduledPost, StoreError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub claimed: usize,
    pub posted: usize,
    pub failed: usize,
}

/// Run one sweep: claim up to `batch_size` due posts and publish each.
///
/// Per-post failures are recorded on the post and never abort the batch.
/// Only a failed claim is returned as an error.
pub async fn run_sweep(
    dispatcher: &Dispatcher,
    now: DateTime<Utc>,
    batch_size: i64,
) -> Result<SweepSummary, StoreError> {
    let posts = dispatcher.store().claim_due_posts(now, batch_size).await?;
    let mut summary = SweepSummary {
        claimed: posts.len(),
        ..Default::default()
    };

    for post in posts {
        let (status, responses) = publish_due_post(dispatcher, &post).await;

        if let Err(e) = dispatcher
            .store()
            .finish_post(post.id, status, &responses)
            .await
        {
            // Post stays in `publishing` and needs manual attention
            tracing::error!(
                post_id = post.id,
                error = %e,
                "[sweep] CRITICAL: failed to record outcome"
            );
            summary.failed += 1;
            continue;
        }

        match status {
            PostStatus::Failed => summary.failed += 1,
            _ => summary.posted += 1,
        }
    }

    Ok(summary)
}

async fn publish_due_post(
    dispatcher: &Dispatcher,
    post: &ScheduledPost,
) -> (PostStatus, PlatformResponses) {
    let content = PostContent::from(post);
    match dispatcher
        .attempt(post.user_id, &post.platforms, &content)
        .await
    {
        Ok(responses) => {
            let status = responses.overall_status();
            tracing::info!(
                post_id = post.id,
                user_id = post.user_id,
                status = status.as_str(),
                "[sweep] Post processed"
            );
            (status, responses)
        }
        Err(e) => {
            tracing::warn!(
                post_id = post.id,
                user_id = post.user_id,
                error = %e,
                "[sweep] Post failed before publishing"
            );
            (
                PostStatus::Failed,
                PlatformResponses::dispatch_failure(e.to_string()),
            )
        }
    }
}

/// Job input - marker for one sweep tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepJob {
    pub scheduled_at: DateTime<Utc>,
}

impl From<DateTime<Utc>> for SweepJob {
    fn from(dt: DateTime<Utc>) -> Self {
        SweepJob { scheduled_at: dt }
    }
}

#[derive(Clone)]
pub struct SweepContext {
    pub dispatcher: Dispatcher,
    pub batch_size: i64,
}

/// Always returns Ok - a failed claim is retried on the next tick
async fn process_sweep_job(_job: SweepJob, ctx: Data<SweepContext>) -> Result<(), Error> {
    match run_sweep(&ctx.dispatcher, Utc::now(), ctx.batch_size).await {
        Ok(summary) => {
            if summary.claimed > 0 {
                tracing::info!(
                    claimed = summary.claimed,
                    posted = summary.posted,
                    failed = summary.failed,
                    "[sweep] Batch complete"
                );
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "[sweep] Claim failed (will retry)");
        }
    }
    Ok(())
}

/// Start the in-process sweep worker. Returns when the monitor stops.
pub async fn run_sweep_worker(pool: PgPool, dispatcher: Dispatcher, config: SweepConfig) {
    let schedule = match Schedule::from_str(&config.schedule) {
        Ok(schedule) => schedule,
        Err(e) => {
            tracing::error!(schedule = %config.schedule, error = %e, "[sweep] Invalid schedule");
            return;
        }
    };

    if let Err(e) = PostgresStorage::setup(&pool).await {
        tracing::error!(error = %e, "[sweep] Failed to set up apalis storage");
        return;
    }

    let storage: PostgresStorage<SweepJob> = PostgresStorage::new(pool);
    let backend = CronStream::new(schedule).pipe_to_storage(storage);

    tracing::info!(
        schedule = %config.schedule,
        batch_size = config.batch_size,
        "[sweep] Apalis worker starting"
    );

    let worker = WorkerBuilder::new("scheduled-post-sweep")
        .data(SweepContext {
            dispatcher,
            batch_size: config.batch_size,
        })
        .backend(backend)
        .build_fn(process_sweep_job);

    if let Err(e) = Monitor::new().register(worker).run().await {
        tracing::error!(error = %e, "[sweep] Worker monitor failed");
    }
}
