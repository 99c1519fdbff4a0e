//! Platform adapters
//!
//! Each destination implements [`Publisher`]. The dispatcher looks publishers
//! up by [`Platform`] in a [`Publishers`] table, so adding a destination means
//! one new implementation and one `register` call.

mod discord;
mod facebook;
mod graph;
mod instagram;
mod tiktok;

pub use discord::DiscordPublisher;
pub use facebook::FacebookPublisher;
pub use instagram::InstagramPublisher;
pub use tiktok::TikTokPublisher;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::domain::{MediaKind, Platform};

/// Everything an adapter needs for one publish call
#[derive(Debug, Clone, Copy)]
pub struct PublishJob<'a> {
    pub external_account_id: &'a str,
    pub access_token: &'a str,
    pub asset_url: &'a str,
    pub caption: &'a str,
    pub media_kind: MediaKind,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Built through `From`, which drops the request URL so tokens carried
    /// in a path or query string never reach a stored error message
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// Message reported by the platform, surfaced verbatim
    #[error("{0}")]
    Api(String),

    /// Failure inside a named step of a multi-step protocol
    #[error("{phase}: {message}")]
    Phase {
        phase: &'static str,
        message: String,
    },

    /// Rejected before any network call
    #[error("{0}")]
    Unsupported(String),

    #[error("Timed out after {:?}", .0)]
    Timeout(Duration),

    #[error("No publisher registered for {0}")]
    NotRegistered(Platform),
}

impl PublishError {
    /// Prefix the error with the protocol step it happened in
    pub fn in_phase(self, phase: &'static str) -> Self {
        match self {
            PublishError::Phase { .. } => self,
            other => PublishError::Phase {
                phase,
                message: other.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for PublishError {
    fn from(e: reqwest::Error) -> Self {
        PublishError::Http(e.without_url())
    }
}

#[async_trait]
pub trait Publisher: Send + Sync {
    fn platform(&self) -> Platform;

    /// Publish one asset to one account. Returns the platform-native response.
    async fn publish(&self, job: &PublishJob<'_>) -> Result<serde_json::Value, PublishError>;
}

/// Lookup table from platform to its publisher
#[derive(Clone, Default)]
pub struct Publishers {
    by_platform: HashMap<Platform, Arc<dyn Publisher>>,
}

impl Publishers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.by_platform.insert(publisher.platform(), publisher);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn Publisher>> {
        self.by_platform.get(&platform).cloned()
    }

    /// All built-in publishers sharing one HTTP client
    pub fn from_config(config: &Config, http: Client) -> Self {
        Self::new()
            .register(Arc::new(InstagramPublisher::new(
                http.clone(),
                &config.endpoints.graph_api,
                config.instagram_poll,
            )))
            .register(Arc::new(FacebookPublisher::new(
                http.clone(),
                &config.endpoints.graph_api,
            )))
            .register(Arc::new(TikTokPublisher::new(
                http.clone(),
                &config.endpoints.tiktok_api,
                config.tiktok_max_upload_bytes,
            )))
            .register(Arc::new(DiscordPublisher::new(
                http,
                &config.endpoints.discord_api,
            )))
    }
}

/// Read a response body as JSON, keeping the raw text for error messages.
/// A body that is not JSON is returned as `None`.
pub(crate) async fn read_json(
    resp: reqwest::Response,
) -> Result<(StatusCode, String, Option<serde_json::Value>), PublishError> {
    let status = resp.status();
    let text = resp.text().await?;
    let body = serde_json::from_str(&text).ok();
    Ok((status, text, body))
}
