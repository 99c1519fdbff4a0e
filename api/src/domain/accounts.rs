//! Connected account model and queries
//!
//! All functions use the generic Executor pattern, allowing them to work with
//! both `&PgPool` and `&mut PgConnection` (transactions).

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};
use std::fmt;

use super::platform::Platform;

/// Stored OAuth credential linking a user to one external platform identity
#[derive(Clone, sqlx::FromRow)]
pub struct ConnectedAccount {
    pub id: i64,
    pub user_id: i64,
    pub platform: Platform,
    pub external_account_id: String,
    pub access_token: String,
    pub display_name: Option<String>,
    pub updated_at: DateTime<Utc>,
}

// Manual impl keeps access tokens out of logs
impl fmt::Debug for ConnectedAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectedAccount")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("platform", &self.platform)
            .field("external_account_id", &self.external_account_id)
            .field("access_token", &"<redacted>")
            .field("display_name", &self.display_name)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Input for the OAuth-callback upsert
#[derive(Clone)]
pub struct NewConnectedAccount {
    pub user_id: i64,
    pub platform: Platform,
    pub external_account_id: String,
    pub access_token: String,
    pub display_name: Option<String>,
}

const ACCOUNT_COLUMNS: &str =
    "id, user_id, platform, external_account_id, access_token, display_name, updated_at";

/// Accounts owned by `user_id` on any of `platforms`
pub async fn resolve_accounts<'e, E>(
    executor: E,
    user_id: i64,
    platforms: &[Platform],
) -> Result<Vec<ConnectedAccount>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        "SELECT {ACCOUNT_COLUMNS} FROM connected_accounts
         WHERE user_id = $1 AND platform = ANY($2)
         ORDER BY platform, id"
    );

    sqlx::query_as(&query)
        .bind(user_id)
        .bind(platforms.to_vec())
        .fetch_all(executor)
        .await
}

pub async fn list_accounts<'e, E>(
    executor: E,
    user_id: i64,
) -> Result<Vec<ConnectedAccount>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        "SELECT {ACCOUNT_COLUMNS} FROM connected_accounts
         WHERE user_id = $1
         ORDER BY platform, id"
    );

    sqlx::query_as(&query)
        .bind(user_id)
        .fetch_all(executor)
        .await
}

/// Insert or refresh an account, keyed on (user, platform, external id)
pub async fn upsert_account<'e, E>(
    executor: E,
    account: &NewConnectedAccount,
) -> Result<ConnectedAccount, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"
        INSERT INTO connected_accounts (user_id, platform, external_account_id, access_token, display_name)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id, platform, external_account_id) DO UPDATE SET
            access_token = EXCLUDED.access_token,
            display_name = COALESCE(EXCLUDED.display_name, connected_accounts.display_name),
            updated_at = NOW()
        RETURNING {ACCOUNT_COLUMNS}
        "#
    );

    sqlx::query_as(&query)
        .bind(account.user_id)
        .bind(account.platform)
        .bind(&account.external_account_id)
        .bind(&account.access_token)
        .bind(account.display_name.as_deref())
        .fetch_one(executor)
        .await
}
