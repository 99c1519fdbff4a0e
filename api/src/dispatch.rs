//! Dispatch orchestrator
//!
//! Decides between scheduling and publishing now, fans a post out to every
//! connected account for the requested platforms, and records one outcome row.
//! The sweep worker reuses [`Dispatcher::attempt`] for due posts.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{
    ConnectedAccount, MediaKind, NewPost, Platform, PlatformFailure, PlatformResponses,
    PlatformSuccess, PostStatus, PublishStore, ScheduledPost, StoreError,
};
use crate::platforms::{PublishError, PublishJob, Publishers};

/// Publish request as submitted by the web layer
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub asset_url: Option<String>,
    pub asset_id: Option<String>,
    pub caption: Option<String>,
    #[serde(default)]
    pub platforms: Vec<String>,
    pub media_type: Option<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// What gets published, independent of where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct PostContent {
    pub asset_url: String,
    pub caption: String,
    pub media_kind: MediaKind,
}

impl From<&ScheduledPost> for PostContent {
    fn from(post: &ScheduledPost) -> Self {
        Self {
            asset_url: post.asset_url.clone(),
            caption: post.caption.clone(),
            media_kind: post.media_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ValidRequest {
    content: PostContent,
    asset_id: Option<String>,
    platforms: Vec<Platform>,
    scheduled_for: Option<DateTime<Utc>>,
}

impl PublishRequest {
    fn validate(self) -> Result<ValidRequest, DispatchError> {
        let asset_url = self
            .asset_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| DispatchError::Validation("Asset URL is required".to_string()))?;

        if self.platforms.is_empty() {
            return Err(DispatchError::Validation(
                "At least one platform is required".to_string(),
            ));
        }

        let mut platforms = Vec::with_capacity(self.platforms.len());
        for name in &self.platforms {
            let platform: Platform = name
                .parse()
                .map_err(|e: crate::domain::platform::UnknownPlatform| {
                    DispatchError::Validation(e.to_string())
                })?;
            if !platforms.contains(&platform) {
                platforms.push(platform);
            }
        }

        let media_kind = match self.media_type.as_deref() {
            Some(raw) => raw
                .parse()
                .map_err(|e: crate::domain::platform::UnknownMediaKind| {
                    DispatchError::Validation(e.to_string())
                })?,
            None => MediaKind::default(),
        };

        Ok(ValidRequest {
            content: PostContent {
                asset_url,
                caption: self.caption.unwrap_or_default(),
                media_kind,
            },
            asset_id: self.asset_id.filter(|id| !id.is_empty()),
            platforms,
            scheduled_for: self.scheduled_for,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("{0}")]
    Validation(String),

    #[error("No connected accounts found for the selected platforms")]
    NoConnectedAccounts,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DispatchError {
    /// Caller mistakes, as opposed to infrastructure failures
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DispatchError::Validation(_) | DispatchError::NoConnectedAccounts
        )
    }
}

/// Result of one `publish` call. Every variant carries the persisted row;
/// per-platform results and errors are in `platform_responses`.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// Deferred; no adapter ran
    Scheduled(ScheduledPost),
    /// Every account succeeded
    Published(ScheduledPost),
    /// At least one account succeeded and at least one failed
    PartiallyPublished(ScheduledPost),
    /// Every account failed
    Failed(ScheduledPost),
}

impl DispatchOutcome {
    fn from_attempt(post: ScheduledPost) -> Self {
        let responses = &post.platform_responses.0;
        if responses.overall_status() == PostStatus::Failed {
            DispatchOutcome::Failed(post)
        } else if responses.is_partial() {
            DispatchOutcome::PartiallyPublished(post)
        } else {
            DispatchOutcome::Published(post)
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn PublishStore>,
    publishers: Arc<Publishers>,
    adapter_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn PublishStore>,
        publishers: Arc<Publishers>,
        adapter_timeout: Duration,
    ) -> Self {
        Self {
            store,
            publishers,
            adapter_timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn PublishStore> {
        &self.store
    }

    pub async fn publish(
        &self,
        user_id: i64,
        request: PublishRequest,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.publish_at(user_id, request, Utc::now()).await
    }

    /// `publish` with an explicit clock
    pub async fn publish_at(
        &self,
        user_id: i64,
        request: PublishRequest,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let request = request.validate()?;

        if let Some(scheduled_for) = request.scheduled_for.filter(|at| *at > now) {
            let post = self
                .store
                .insert_post(NewPost {
                    user_id,
                    asset_id: request.asset_id,
                    asset_url: request.content.asset_url,
                    caption: request.content.caption,
                    media_type: request.content.media_kind,
                    platforms: request.platforms,
                    scheduled_for,
                    status: PostStatus::Scheduled,
                    platform_responses: PlatformResponses::default(),
                })
                .await?;

            tracing::info!(
                post_id = post.id,
                user_id,
                scheduled_for = %post.scheduled_for,
                "[dispatch] Post scheduled"
            );
            return Ok(DispatchOutcome::Scheduled(post));
        }

        let responses = self
            .attempt(user_id, &request.platforms, &request.content)
            .await?;
        let status = responses.overall_status();

        let post = self
            .store
            .insert_post(NewPost {
                user_id,
                asset_id: request.asset_id,
                asset_url: request.content.asset_url,
                caption: request.content.caption,
                media_type: request.content.media_kind,
                platforms: request.platforms,
                scheduled_for: now,
                status,
                platform_responses: responses,
            })
            .await?;

        tracing::info!(
            post_id = post.id,
            user_id,
            status = status.as_str(),
            succeeded = post.platform_responses.results.len(),
            failed = post.platform_responses.errors.len(),
            "[dispatch] Post published"
        );
        Ok(DispatchOutcome::from_attempt(post))
    }

    /// Resolve accounts and run one adapter call per account.
    ///
    /// Adapter failures become `errors` entries and never abort sibling calls.
    /// Fails only when no account matches or the store is unavailable.
    pub async fn attempt(
        &self,
        user_id: i64,
        platforms: &[Platform],
        content: &PostContent,
    ) -> Result<PlatformResponses, DispatchError> {
        let accounts = self.store.resolve_accounts(user_id, platforms).await?;
        if accounts.is_empty() {
            return Err(DispatchError::NoConnectedAccounts);
        }

        let outcomes = join_all(
            accounts
                .iter()
                .map(|account| self.publish_to_account(account, content)),
        )
        .await;

        let mut responses = PlatformResponses::default();
        for (account, outcome) in accounts.iter().zip(outcomes) {
            match outcome {
                Ok(response) => responses.results.push(PlatformSuccess {
                    platform: account.platform,
                    account_id: account.external_account_id.clone(),
                    response,
                }),
                Err(e) => {
                    tracing::warn!(
                        user_id,
                        platform = %account.platform,
                        account_id = %account.external_account_id,
                        error = %e,
                        "[dispatch] Platform publish failed"
                    );
                    responses.errors.push(PlatformFailure {
                        platform: Some(account.platform),
                        account_id: Some(account.external_account_id.clone()),
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(responses)
    }

    async fn publish_to_account(
        &self,
        account: &ConnectedAccount,
        content: &PostContent,
    ) -> Result<serde_json::Value, PublishError> {
        let publisher = self
            .publishers
            .get(account.platform)
            .ok_or(PublishError::NotRegistered(account.platform))?;

        let job = PublishJob {
            external_account_id: &account.external_account_id,
            access_token: &account.access_token,
            asset_url: &content.asset_url,
            caption: &content.caption,
            media_kind: content.media_kind,
        };

        match tokio::time::timeout(self.adapter_timeout, publisher.publish(&job)).await {
            Ok(result) => result,
            Err(_) => Err(PublishError::Timeout(self.adapter_timeout)),
        }
    }
}
