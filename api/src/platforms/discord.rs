use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use super::{PublishError, PublishJob, Publisher, read_json};
use crate::domain::Platform;

/// Discord channel webhook. A connected Discord account stores the webhook id
/// as its external account id and the webhook token as its access token.
pub struct DiscordPublisher {
    http: Client,
    api_base: String,
}

impl DiscordPublisher {
    pub fn new(http: Client, api_base: &str) -> Self {
        Self {
            http,
            api_base: api_base.to_string(),
        }
    }
}

fn message_content(caption: &str, asset_url: &str) -> String {
    let caption = caption.trim();
    if caption.is_empty() {
        asset_url.to_string()
    } else {
        format!("{}\n{}", caption, asset_url)
    }
}

#[async_trait]
impl Publisher for DiscordPublisher {
    fn platform(&self) -> Platform {
        Platform::Discord
    }

    async fn publish(&self, job: &PublishJob<'_>) -> Result<Value, PublishError> {
        let url = format!(
            "{}/api/webhooks/{}/{}",
            self.api_base, job.external_account_id, job.access_token
        );

        let resp = self
            .http
            .post(url)
            .query(&[("wait", "true")])
            .json(&json!({ "content": message_content(job.caption, job.asset_url) }))
            .send()
            .await?;

        let (status, text, body) = read_json(resp).await?;
        if !status.is_success() {
            let message = body
                .as_ref()
                .and_then(|b| b.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Status {}: {}", status, text));
            return Err(PublishError::Api(message));
        }

        body.ok_or_else(|| PublishError::Api(format!("Failed to parse response: {}", text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MediaKind;
    use crate::testing::spawn_server;
    use axum::{Json, Router, extract::Path, http::StatusCode, routing::post};

    async fn webhook(
        Path((id, token)): Path<(String, String)>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        if token != "hook-token" {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "message": "Invalid Webhook Token", "code": 50027 })),
            );
        }
        (
            StatusCode::OK,
            Json(json!({ "id": "msg-1", "webhook_id": id, "content": body["content"] })),
        )
    }

    fn job(token: &str) -> PublishJob<'_> {
        PublishJob {
            external_account_id: "hook-1",
            access_token: token,
            asset_url: "https://cdn.example.com/a.png",
            caption: "Fresh post",
            media_kind: MediaKind::Image,
        }
    }

    #[test]
    fn test_message_content() {
        assert_eq!(message_content("Hi ", "https://x/y"), "Hi\nhttps://x/y");
        assert_eq!(message_content("  ", "https://x/y"), "https://x/y");
    }

    #[tokio::test]
    async fn test_posts_to_webhook() {
        let base = spawn_server(
            Router::new().route("/api/webhooks/{id}/{token}", post(webhook)),
        )
        .await;
        let publisher = DiscordPublisher::new(Client::new(), &base);

        let body = publisher.publish(&job("hook-token")).await.unwrap();

        assert_eq!(body["webhook_id"], "hook-1");
        assert_eq!(body["content"], "Fresh post\nhttps://cdn.example.com/a.png");
    }

    #[tokio::test]
    async fn test_error_message_is_surfaced() {
        let base = spawn_server(
            Router::new().route("/api/webhooks/{id}/{token}", post(webhook)),
        )
        .await;
        let publisher = DiscordPublisher::new(Client::new(), &base);

        let err = publisher.publish(&job("bad")).await.unwrap_err();

        assert_eq!(err.to_string(), "Invalid Webhook Token");
    }

    #[tokio::test]
    async fn test_unreachable_webhook_error_omits_token() {
        let publisher = DiscordPublisher::new(Client::new(), "http://127.0.0.1:9");

        let err = publisher.publish(&job("webhook-secret")).await.unwrap_err();

        assert!(matches!(err, PublishError::Http(_)));
        assert!(!err.to_string().contains("webhook-secret"));
    }
}
