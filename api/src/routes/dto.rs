//! API request and response DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    ConnectedAccount, MediaKind, Platform, PlatformResponses, PostStatus, ScheduledPost,
};

/// Scheduled post API response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub id: i64,
    pub asset_id: Option<String>,
    pub asset_url: String,
    pub caption: String,
    pub media_type: MediaKind,
    pub platforms: Vec<Platform>,
    pub scheduled_for: DateTime<Utc>,
    pub status: PostStatus,
    pub platform_responses: PlatformResponses,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ScheduledPost> for PostResponse {
    fn from(p: ScheduledPost) -> Self {
        Self {
            id: p.id,
            asset_id: p.asset_id,
            asset_url: p.asset_url,
            caption: p.caption,
            media_type: p.media_type,
            platforms: p.platforms,
            scheduled_for: p.scheduled_for,
            status: p.status,
            platform_responses: p.platform_responses.0,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Connected account API response. Never includes the access token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub id: i64,
    pub platform: Platform,
    pub external_account_id: String,
    pub display_name: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<ConnectedAccount> for AccountResponse {
    fn from(a: ConnectedAccount) -> Self {
        Self {
            id: a.id,
            platform: a.platform,
            external_account_id: a.external_account_id,
            display_name: a.display_name,
            updated_at: a.updated_at,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpsertRequest {
    pub platform: String,
    pub external_account_id: String,
    pub access_token: String,
    pub display_name: Option<String>,
}
