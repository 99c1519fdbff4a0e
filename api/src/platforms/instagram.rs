use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio::time::Instant;

use super::{PublishError, PublishJob, Publisher, graph};
use crate::config::PollConfig;
use crate::domain::{MediaKind, Platform};

/// Instagram Graph publishing: create a media container, wait for video
/// containers to finish processing, then publish the container.
pub struct InstagramPublisher {
    http: Client,
    graph_base: String,
    poll: PollConfig,
}

impl InstagramPublisher {
    pub fn new(http: Client, graph_base: &str, poll: PollConfig) -> Self {
        Self {
            http,
            graph_base: graph_base.to_string(),
            poll,
        }
    }

    /// Step 1: create the media container, returns its creation id
    async fn create_container(&self, job: &PublishJob<'_>) -> Result<String, PublishError> {
        let mut params: Vec<(&str, &str)> = vec![
            ("caption", job.caption),
            ("access_token", job.access_token),
        ];
        match job.media_kind {
            MediaKind::Image => params.push(("image_url", job.asset_url)),
            MediaKind::Video => {
                params.push(("media_type", "REELS"));
                params.push(("video_url", job.asset_url));
            }
        }

        let url = graph::endpoint(
            &self.graph_base,
            &format!("{}/media", job.external_account_id),
        );
        let resp = self.http.post(url).form(&params).send().await?;
        let body = graph::read_response(resp).await?;
        graph::object_id(&body)
    }

    /// Step 2 (video only): poll the container until it is FINISHED.
    /// Delay doubles from `initial_delay` up to `max_delay`; giving up after
    /// `timeout` is an adapter error.
    async fn wait_until_ready(
        &self,
        container_id: &str,
        access_token: &str,
    ) -> Result<(), PublishError> {
        let url = graph::endpoint(&self.graph_base, container_id);
        let deadline = Instant::now() + self.poll.timeout;
        let mut delay = self.poll.initial_delay;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(PublishError::Api(format!(
                    "Container {} not ready after {}s",
                    container_id,
                    self.poll.timeout.as_secs()
                )));
            }
            tokio::time::sleep(delay.min(deadline - now)).await;

            let resp = self
                .http
                .get(&url)
                .query(&[("fields", "status_code"), ("access_token", access_token)])
                .send()
                .await?;
            let body = graph::read_response(resp).await?;

            match body.get("status_code").and_then(Value::as_str) {
                Some("FINISHED") => return Ok(()),
                Some(state @ ("ERROR" | "EXPIRED")) => {
                    return Err(PublishError::Api(format!(
                        "Container processing {}",
                        state.to_ascii_lowercase()
                    )));
                }
                state => {
                    tracing::debug!(
                        container_id,
                        state = state.unwrap_or("unknown"),
                        "[instagram] Container still processing"
                    );
                }
            }

            delay = (delay * 2).min(self.poll.max_delay);
        }
    }

    /// Step 3: publish the container
    async fn publish_container(
        &self,
        job: &PublishJob<'_>,
        container_id: &str,
    ) -> Result<Value, PublishError> {
        let url = graph::endpoint(
            &self.graph_base,
            &format!("{}/media_publish", job.external_account_id),
        );
        let resp = self
            .http
            .post(url)
            .form(&[
                ("creation_id", container_id),
                ("access_token", job.access_token),
            ])
            .send()
            .await?;
        graph::read_response(resp).await
    }
}

#[async_trait]
impl Publisher for InstagramPublisher {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn publish(&self, job: &PublishJob<'_>) -> Result<Value, PublishError> {
        let container_id = self
            .create_container(job)
            .await
            .map_err(|e| e.in_phase("Container"))?;

        if job.media_kind.is_video() {
            self.wait_until_ready(&container_id, job.access_token)
                .await
                .map_err(|e| e.in_phase("Container"))?;
        }

        self.publish_container(job, &container_id)
            .await
            .map_err(|e| e.in_phase("Publish"))
    }
}
