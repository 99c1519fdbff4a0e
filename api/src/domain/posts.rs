//! Scheduled post model and queries
//!
//! A scheduled post is the durable record of one publish attempt, immediate or
//! deferred. All functions use the generic Executor pattern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef};
use sqlx::types::Json;
use sqlx::{Decode, Encode, Executor, Postgres, Type};
use std::str::FromStr;

use super::platform::{MediaKind, Platform};

/// Post lifecycle: scheduled -> publishing -> posted | failed.
/// `Posted` means at least one platform accepted the content.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Scheduled,
    Publishing,
    Posted,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Scheduled => "scheduled",
            PostStatus::Publishing => "publishing",
            PostStatus::Posted => "posted",
            PostStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown post status: {0}")]
pub struct UnknownPostStatus(pub String);

impl FromStr for PostStatus {
    type Err = UnknownPostStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(PostStatus::Scheduled),
            "publishing" => Ok(PostStatus::Publishing),
            "posted" => Ok(PostStatus::Posted),
            "failed" => Ok(PostStatus::Failed),
            _ => Err(UnknownPostStatus(s.to_string())),
        }
    }
}

impl Type<Postgres> for PostStatus {
    fn type_info() -> PgTypeInfo {
        <String as Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <String as Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for PostStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <String as Decode<Postgres>>::decode(value)?;
        Ok(s.parse::<PostStatus>()?)
    }
}

impl Encode<'_, Postgres> for PostStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        <String as Encode<Postgres>>::encode_by_ref(&self.as_str().to_owned(), buf)
    }
}

/// One platform that accepted the content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformSuccess {
    pub platform: Platform,
    pub account_id: String,
    /// Platform-native response body, kept as-is
    pub response: serde_json::Value,
}

/// One platform (or the dispatch itself, when `platform` is absent) that failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformFailure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    pub error: String,
}

/// Aggregated per-platform outcome, persisted verbatim as JSONB
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformResponses {
    #[serde(default)]
    pub results: Vec<PlatformSuccess>,
    #[serde(default)]
    pub errors: Vec<PlatformFailure>,
}

impl PlatformResponses {
    /// Record for a dispatch that failed before any adapter ran
    pub fn dispatch_failure(error: impl Into<String>) -> Self {
        Self {
            results: Vec::new(),
            errors: vec![PlatformFailure {
                platform: None,
                account_id: None,
                error: error.into(),
            }],
        }
    }

    /// `Failed` only when nothing succeeded and something failed.
    pub fn overall_status(&self) -> PostStatus {
        if self.results.is_empty() && !self.errors.is_empty() {
            PostStatus::Failed
        } else {
            PostStatus::Posted
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.results.is_empty() && !self.errors.is_empty()
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScheduledPost {
    pub id: i64,
    pub user_id: i64,
    pub asset_id: Option<String>,
    pub asset_url: String,
    pub caption: String,
    pub media_type: MediaKind,
    pub platforms: Vec<Platform>,
    pub scheduled_for: DateTime<Utc>,
    pub status: PostStatus,
    pub platform_responses: Json<PlatformResponses>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: i64,
    pub asset_id: Option<String>,
    pub asset_url: String,
    pub caption: String,
    pub media_type: MediaKind,
    pub platforms: Vec<Platform>,
    pub scheduled_for: DateTime<Utc>,
    pub status: PostStatus,
    pub platform_responses: PlatformResponses,
}

const POST_COLUMNS: &str = "id, user_id, asset_id, asset_url, caption, media_type, platforms, \
     scheduled_for, status, platform_responses, created_at, updated_at";

pub async fn insert_post<'e, E>(executor: E, post: &NewPost) -> Result<ScheduledPost, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"
        INSERT INTO scheduled_posts
            (user_id, asset_id, asset_url, caption, media_type, platforms, scheduled_for, status, platform_responses)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {POST_COLUMNS}
        "#
    );

    sqlx::query_as(&query)
        .bind(post.user_id)
        .bind(post.asset_id.as_deref())
        .bind(&post.asset_url)
        .bind(&post.caption)
        .bind(post.media_type)
        .bind(post.platforms.clone())
        .bind(post.scheduled_for)
        .bind(post.status)
        .bind(Json(&post.platform_responses))
        .fetch_one(executor)
        .await
}

/// Atomically claim up to `limit` due posts, moving them to `publishing`.
/// Rows locked by a concurrent claim are skipped, so each post has one owner.
pub async fn claim_due_posts<'e, E>(
    executor: E,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<ScheduledPost>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"
        WITH due AS (
            SELECT id
            FROM scheduled_posts
            WHERE status = 'scheduled' AND scheduled_for <= $1
            ORDER BY scheduled_for ASC, id ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
        )
        UPDATE scheduled_posts p
        SET status = 'publishing', updated_at = NOW()
        FROM due
        WHERE p.id = due.id AND p.status = 'scheduled'
        RETURNING {}
        "#,
        prefixed_columns("p")
    );

    let mut posts: Vec<ScheduledPost> = sqlx::query_as(&query)
        .bind(now)
        .bind(limit)
        .fetch_all(executor)
        .await?;

    // UPDATE ... RETURNING does not preserve the CTE ordering
    posts.sort_by(|a, b| a.scheduled_for.cmp(&b.scheduled_for).then(a.id.cmp(&b.id)));
    Ok(posts)
}

/// Write the terminal status of a claimed post.
/// Returns false if the post was not in `publishing`.
pub async fn finish_post<'e, E>(
    executor: E,
    post_id: i64,
    status: PostStatus,
    responses: &PlatformResponses,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE scheduled_posts
        SET status = $2, platform_responses = $3, updated_at = NOW()
        WHERE id = $1 AND status = 'publishing'
        "#,
    )
    .bind(post_id)
    .bind(status)
    .bind(Json(responses))
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn count_posts<'e, E>(
    executor: E,
    user_id: i64,
    status: Option<PostStatus>,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM scheduled_posts
         WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)",
    )
    .bind(user_id)
    .bind(status)
    .fetch_one(executor)
    .await?;

    Ok(count)
}

pub async fn list_posts_paginated<'e, E>(
    executor: E,
    user_id: i64,
    status: Option<PostStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<ScheduledPost>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"SELECT {POST_COLUMNS}
           FROM scheduled_posts
           WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
           ORDER BY created_at DESC, id DESC
           LIMIT $3 OFFSET $4"#
    );

    sqlx::query_as(&query)
        .bind(user_id)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(executor)
        .await
}

/// Delete a post that has not started publishing
pub async fn cancel_post<'e, E>(executor: E, post_id: i64, user_id: i64) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        "DELETE FROM scheduled_posts WHERE id = $1 AND user_id = $2 AND status = 'scheduled'",
    )
    .bind(post_id)
    .bind(user_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Move a failed post back to `scheduled` so the next sweep picks it up
pub async fn retry_post<'e, E>(
    executor: E,
    post_id: i64,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<Option<ScheduledPost>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"
        UPDATE scheduled_posts
        SET status = 'scheduled',
            scheduled_for = $3,
            platform_responses = '{{"results": [], "errors": []}}'::jsonb,
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2 AND status = 'failed'
        RETURNING {POST_COLUMNS}
        "#
    );

    sqlx::query_as(&query)
        .bind(post_id)
        .bind(user_id)
        .bind(now)
        .fetch_optional(executor)
        .await
}

fn prefixed_columns(alias: &str) -> String {
    POST_COLUMNS
        .split(',')
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}
