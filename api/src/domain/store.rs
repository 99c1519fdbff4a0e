//! Persistence seam for the dispatcher
//!
//! `PublishStore` covers every read and write the dispatcher, sweep worker and
//! routes perform. `PgStore` is the production implementation on top of the
//! query functions in `accounts` and `posts`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::accounts::{self, ConnectedAccount, NewConnectedAccount};
use super::platform::Platform;
use super::posts::{self, NewPost, PlatformResponses, PostStatus, ScheduledPost};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Post {0} is not claimed for publishing")]
    NotClaimed(i64),
}

#[async_trait]
pub trait PublishStore: Send + Sync {
    /// Connected accounts of `user_id` matching any of `platforms`. Read-only.
    async fn resolve_accounts(
        &self,
        user_id: i64,
        platforms: &[Platform],
    ) -> Result<Vec<ConnectedAccount>, StoreError>;

    async fn list_accounts(&self, user_id: i64) -> Result<Vec<ConnectedAccount>, StoreError>;

    async fn upsert_account(
        &self,
        account: &NewConnectedAccount,
    ) -> Result<ConnectedAccount, StoreError>;

    async fn insert_post(&self, post: NewPost) -> Result<ScheduledPost, StoreError>;

    /// Claim up to `limit` posts due at `now`. A post is returned to at most
    /// one caller, even when claims run concurrently.
    async fn claim_due_posts(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ScheduledPost>, StoreError>;

    async fn finish_post(
        &self,
        post_id: i64,
        status: PostStatus,
        responses: &PlatformResponses,
    ) -> Result<(), StoreError>;

    /// One page of posts plus the total count for the filter
    async fn list_posts(
        &self,
        user_id: i64,
        status: Option<PostStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ScheduledPost>, i64), StoreError>;

    async fn cancel_post(&self, user_id: i64, post_id: i64) -> Result<bool, StoreError>;

    async fn retry_post(
        &self,
        user_id: i64,
        post_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<ScheduledPost>, StoreError>;
}

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PublishStore for PgStore {
    async fn resolve_accounts(
        &self,
        user_id: i64,
        platforms: &[Platform],
    ) -> Result<Vec<ConnectedAccount>, StoreError> {
        Ok(accounts::resolve_accounts(&self.db, user_id, platforms).await?)
    }

    async fn list_accounts(&self, user_id: i64) -> Result<Vec<ConnectedAccount>, StoreError> {
        Ok(accounts::list_accounts(&self.db, user_id).await?)
    }

    async fn upsert_account(
        &self,
        account: &NewConnectedAccount,
    ) -> Result<ConnectedAccount, StoreError> {
        Ok(accounts::upsert_account(&self.db, account).await?)
    }

    async fn insert_post(&self, post: NewPost) -> Result<ScheduledPost, StoreError> {
        Ok(posts::insert_post(&self.db, &post).await?)
    }

    async fn claim_due_posts(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ScheduledPost>, StoreError> {
        Ok(posts::claim_due_posts(&self.db, now, limit).await?)
    }

    async fn finish_post(
        &self,
        post_id: i64,
        status: PostStatus,
        responses: &PlatformResponses,
    ) -> Result<(), StoreError> {
        if posts::finish_post(&self.db, post_id, status, responses).await? {
            Ok(())
        } else {
            Err(StoreError::NotClaimed(post_id))
        }
    }

    async fn list_posts(
        &self,
        user_id: i64,
        status: Option<PostStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ScheduledPost>, i64), StoreError> {
        let total = posts::count_posts(&self.db, user_id, status).await?;
        let page = posts::list_posts_paginated(&self.db, user_id, status, limit, offset).await?;
        Ok((page, total))
    }

    async fn cancel_post(&self, user_id: i64, post_id: i64) -> Result<bool, StoreError> {
        Ok(posts::cancel_post(&self.db, post_id, user_id).await?)
    }

    async fn retry_post(
        &self,
        user_id: i64,
        post_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<ScheduledPost>, StoreError> {
        Ok(posts::retry_post(&self.db, post_id, user_id, now).await?)
    }
}
