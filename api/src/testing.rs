//! Test doubles shared across modules: an in-memory store, scripted
//! publishers and a throwaway HTTP server for adapter mocks.

use async_trait::async_trait;
use axum::Router;
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::AppState;
use crate::dispatch::Dispatcher;
use crate::domain::{
    ConnectedAccount, MediaKind, NewConnectedAccount, NewPost, Platform, PlatformResponses,
    PostStatus, PublishStore, ScheduledPost, StoreError,
};
use crate::platforms::{PublishError, PublishJob, Publisher, Publishers};
use crate::routes::{build_routes, cron::CronAuth};

/// Serve `router` on an ephemeral local port, returns its base URL
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Full router over `store`, with the cron endpoint open
pub fn test_app(store: Arc<MemoryStore>, publishers: Publishers) -> Router {
    test_app_with(store, publishers, CronAuth::new(None, true))
}

pub fn test_app_with(store: Arc<MemoryStore>, publishers: Publishers, cron: CronAuth) -> Router {
    let dispatcher = Dispatcher::new(store.clone(), Arc::new(publishers), Duration::from_secs(5));
    let state = Arc::new(AppState {
        store,
        dispatcher,
        cron,
        sweep_batch_size: 20,
    });
    build_routes().with_state(state)
}

pub async fn read_json(resp: Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn account(user_id: i64, platform: Platform, external_id: &str) -> ConnectedAccount {
    ConnectedAccount {
        id: 0,
        user_id,
        platform,
        external_account_id: external_id.to_string(),
        access_token: format!("{}-token", external_id),
        display_name: None,
        updated_at: Utc::now(),
    }
}

#[derive(Default)]
struct MemoryState {
    accounts: Vec<ConnectedAccount>,
    posts: Vec<ScheduledPost>,
    next_id: i64,
}

/// `PublishStore` held in a single mutex. Every operation runs under the lock,
/// so a claim is atomic with respect to concurrent claims.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    broken_users: Mutex<HashSet<i64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_account(&self, mut account: ConnectedAccount) {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        account.id = state.next_id;
        state.accounts.push(account);
    }

    /// Make account lookups for `user_id` fail as if the database errored
    pub fn break_user(&self, user_id: i64) {
        self.broken_users.lock().unwrap().insert(user_id);
    }

    pub fn posts(&self) -> Vec<ScheduledPost> {
        self.state.lock().unwrap().posts.clone()
    }

    pub fn post(&self, post_id: i64) -> Option<ScheduledPost> {
        self.posts().into_iter().find(|p| p.id == post_id)
    }

    /// Insert a `scheduled` post directly, bypassing validation
    pub fn insert_scheduled(
        &self,
        user_id: i64,
        platforms: Vec<Platform>,
        media_type: MediaKind,
        scheduled_for: DateTime<Utc>,
    ) -> ScheduledPost {
        let mut state = self.state.lock().unwrap();
        let post = state.build(NewPost {
            user_id,
            asset_id: None,
            asset_url: "https://cdn.example.com/asset".to_string(),
            caption: "Scheduled caption".to_string(),
            media_type,
            platforms,
            scheduled_for,
            status: PostStatus::Scheduled,
            platform_responses: PlatformResponses::default(),
        });
        state.posts.push(post.clone());
        post
    }

    pub fn set_status(&self, post_id: i64, status: PostStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(post) = state.posts.iter_mut().find(|p| p.id == post_id) {
            post.status = status;
        }
    }
}

impl MemoryState {
    fn build(&mut self, post: NewPost) -> ScheduledPost {
        self.next_id += 1;
        let now = Utc::now();
        ScheduledPost {
            id: self.next_id,
            user_id: post.user_id,
            asset_id: post.asset_id,
            asset_url: post.asset_url,
            caption: post.caption,
            media_type: post.media_type,
            platforms: post.platforms,
            scheduled_for: post.scheduled_for,
            status: post.status,
            platform_responses: sqlx::types::Json(post.platform_responses),
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl PublishStore for MemoryStore {
    async fn resolve_accounts(
        &self,
        user_id: i64,
        platforms: &[Platform],
    ) -> Result<Vec<ConnectedAccount>, StoreError> {
        if self.broken_users.lock().unwrap().contains(&user_id) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .accounts
            .iter()
            .filter(|a| a.user_id == user_id && platforms.contains(&a.platform))
            .cloned()
            .collect())
    }

    async fn list_accounts(&self, user_id: i64) -> Result<Vec<ConnectedAccount>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .accounts
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert_account(
        &self,
        account: &NewConnectedAccount,
    ) -> Result<ConnectedAccount, StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.accounts.iter_mut().find(|a| {
            a.user_id == account.user_id
                && a.platform == account.platform
                && a.external_account_id == account.external_account_id
        }) {
            existing.access_token = account.access_token.clone();
            if account.display_name.is_some() {
                existing.display_name = account.display_name.clone();
            }
            existing.updated_at = Utc::now();
            return Ok(existing.clone());
        }

        state.next_id += 1;
        let created = ConnectedAccount {
            id: state.next_id,
            user_id: account.user_id,
            platform: account.platform,
            external_account_id: account.external_account_id.clone(),
            access_token: account.access_token.clone(),
            display_name: account.display_name.clone(),
            updated_at: Utc::now(),
        };
        state.accounts.push(created.clone());
        Ok(created)
    }

    async fn insert_post(&self, post: NewPost) -> Result<ScheduledPost, StoreError> {
        let mut state = self.state.lock().unwrap();
        let post = state.build(post);
        state.posts.push(post.clone());
        Ok(post)
    }

    async fn claim_due_posts(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ScheduledPost>, StoreError> {
        let mut state = self.state.lock().unwrap();
        let mut due: Vec<&mut ScheduledPost> = state
            .posts
            .iter_mut()
            .filter(|p| p.status == PostStatus::Scheduled && p.scheduled_for <= now)
            .collect();
        due.sort_by(|a, b| a.scheduled_for.cmp(&b.scheduled_for).then(a.id.cmp(&b.id)));

        Ok(due
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|post| {
                post.status = PostStatus::Publishing;
                post.clone()
            })
            .collect())
    }

    async fn finish_post(
        &self,
        post_id: i64,
        status: PostStatus,
        responses: &PlatformResponses,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        match state
            .posts
            .iter_mut()
            .find(|p| p.id == post_id && p.status == PostStatus::Publishing)
        {
            Some(post) => {
                post.status = status;
                post.platform_responses = sqlx::types::Json(responses.clone());
                post.updated_at = Utc::now();
                Ok(())
            }
            None => Err(StoreError::NotClaimed(post_id)),
        }
    }

    async fn list_posts(
        &self,
        user_id: i64,
        status: Option<PostStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ScheduledPost>, i64), StoreError> {
        let state = self.state.lock().unwrap();
        let mut matching: Vec<ScheduledPost> = state
            .posts
            .iter()
            .filter(|p| p.user_id == user_id && status.is_none_or(|s| p.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn cancel_post(&self, user_id: i64, post_id: i64) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        let before = state.posts.len();
        state.posts.retain(|p| {
            !(p.id == post_id && p.user_id == user_id && p.status == PostStatus::Scheduled)
        });
        Ok(state.posts.len() < before)
    }

    async fn retry_post(
        &self,
        user_id: i64,
        post_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<ScheduledPost>, StoreError> {
        let mut state = self.state.lock().unwrap();
        Ok(state
            .posts
            .iter_mut()
            .find(|p| p.id == post_id && p.user_id == user_id && p.status == PostStatus::Failed)
            .map(|post| {
                post.status = PostStatus::Scheduled;
                post.scheduled_for = now;
                post.platform_responses = sqlx::types::Json(PlatformResponses::default());
                post.updated_at = Utc::now();
                post.clone()
            }))
    }
}

/// Publisher with a scripted outcome that records the accounts it was called for
pub struct FakePublisher {
    platform: Platform,
    failure: Option<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl FakePublisher {
    pub fn succeeding(platform: Platform) -> Self {
        Self {
            platform,
            failure: None,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(platform: Platform, message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::succeeding(platform)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn publish(&self, job: &PublishJob<'_>) -> Result<Value, PublishError> {
        self.calls
            .lock()
            .unwrap()
            .push(job.external_account_id.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.failure {
            Some(message) => Err(PublishError::Api(message.clone())),
            None => Ok(json!({
                "id": format!("{}-{}", self.platform, job.external_account_id),
            })),
        }
    }
}
