use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{PublishError, PublishJob, Publisher, graph};
use crate::domain::{MediaKind, Platform};

/// Facebook Page publishing: one call to the page's `photos` or `videos` edge
pub struct FacebookPublisher {
    http: Client,
    graph_base: String,
}

impl FacebookPublisher {
    pub fn new(http: Client, graph_base: &str) -> Self {
        Self {
            http,
            graph_base: graph_base.to_string(),
        }
    }
}

/// (edge, url parameter, caption parameter) for a media kind
fn edge_for(media_kind: MediaKind) -> (&'static str, &'static str, &'static str) {
    match media_kind {
        MediaKind::Image => ("photos", "url", "message"),
        MediaKind::Video => ("videos", "file_url", "description"),
    }
}

#[async_trait]
impl Publisher for FacebookPublisher {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    async fn publish(&self, job: &PublishJob<'_>) -> Result<Value, PublishError> {
        let (edge, url_param, caption_param) = edge_for(job.media_kind);
        let url = graph::endpoint(
            &self.graph_base,
            &format!("{}/{}", job.external_account_id, edge),
        );

        let resp = self
            .http
            .post(url)
            .form(&[
                (url_param, job.asset_url),
                (caption_param, job.caption),
                ("access_token", job.access_token),
            ])
            .send()
            .await?;

        graph::read_response(resp).await
    }
}
