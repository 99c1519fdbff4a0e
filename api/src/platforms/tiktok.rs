use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_RANGE, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{PublishError, PublishJob, Publisher, read_json};
use crate::constants::TIKTOK_TITLE_MAX_CHARS;
use crate::domain::Platform;

/// TikTok Direct Post. The whole video goes up as a single chunk, and
/// success means TikTok accepted it for processing; the returned
/// `publish_id` is not polled.
pub struct TikTokPublisher {
    http: Client,
    api_base: String,
    max_upload_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct InitResponse {
    data: Option<InitData>,
    error: Option<TikTokErrorBody>,
}

#[derive(Debug, Deserialize)]
struct InitData {
    publish_id: String,
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct TikTokErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

impl TikTokPublisher {
    pub fn new(http: Client, api_base: &str, max_upload_bytes: u64) -> Self {
        Self {
            http,
            api_base: api_base.to_string(),
            max_upload_bytes,
        }
    }

    /// Step 1: fetch the asset; its size is required by the init call.
    /// The body is read chunk by chunk and abandoned once it passes the limit.
    async fn download(&self, asset_url: &str) -> Result<Bytes, PublishError> {
        let mut resp = self.http.get(asset_url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PublishError::Api(format!(
                "Failed to download asset - Status {}",
                status
            )));
        }

        if let Some(len) = resp.content_length().filter(|len| *len > self.max_upload_bytes) {
            return Err(PublishError::Unsupported(format!(
                "Video is {} bytes; single-chunk upload limit is {} bytes",
                len, self.max_upload_bytes
            )));
        }

        let mut data = BytesMut::new();
        while let Some(chunk) = resp.chunk().await? {
            if (data.len() + chunk.len()) as u64 > self.max_upload_bytes {
                return Err(PublishError::Unsupported(format!(
                    "Video exceeds single-chunk upload limit of {} bytes",
                    self.max_upload_bytes
                )));
            }
            data.extend_from_slice(&chunk);
        }

        if data.is_empty() {
            return Err(PublishError::Api("Downloaded asset is empty".to_string()));
        }
        Ok(data.freeze())
    }

    /// Step 2: declare one chunk spanning the whole file
    async fn init_upload(
        &self,
        access_token: &str,
        caption: &str,
        video_size: usize,
    ) -> Result<InitData, PublishError> {
        let title: String = caption.chars().take(TIKTOK_TITLE_MAX_CHARS).collect();
        let body = json!({
            "post_info": {
                "title": title,
                "privacy_level": "PUBLIC_TO_EVERYONE",
            },
            "source_info": {
                "source": "FILE_UPLOAD",
                "video_size": video_size,
                "chunk_size": video_size,
                "total_chunk_count": 1,
            },
        });

        let resp = self
            .http
            .post(format!("{}/v2/post/publish/video/init/", self.api_base))
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .json(&body)
            .send()
            .await?;

        let (status, text, _) = read_json(resp).await?;
        let parsed: InitResponse = serde_json::from_str(&text).map_err(|e| {
            PublishError::Api(format!(
                "Failed to parse init response: {} - Status {}: {}",
                e, status, text
            ))
        })?;

        if let Some(error) = parsed.error.filter(|e| e.code != "ok") {
            let message = if error.message.is_empty() {
                error.code
            } else {
                error.message
            };
            return Err(PublishError::Api(message));
        }

        parsed
            .data
            .ok_or_else(|| PublishError::Api(format!("Init response missing data: {}", text)))
    }

    /// Step 3: PUT the raw bytes to the upload URL
    async fn upload(&self, upload_url: &str, data: Bytes) -> Result<(), PublishError> {
        let size = data.len();
        let resp = self
            .http
            .put(upload_url)
            .header(CONTENT_TYPE, "video/mp4")
            .header(CONTENT_RANGE, content_range(size))
            .body(data)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(PublishError::Api(format!(
                "Upload failed - Status {}: {}",
                status, text
            )));
        }
        Ok(())
    }
}

fn content_range(size: usize) -> String {
    format!("bytes 0-{}/{}", size.saturating_sub(1), size)
}

#[async_trait]
impl Publisher for TikTokPublisher {
    fn platform(&self) -> Platform {
        Platform::Tiktok
    }

    async fn publish(&self, job: &PublishJob<'_>) -> Result<Value, PublishError> {
        if !job.media_kind.is_video() {
            return Err(PublishError::Unsupported(
                "TikTok requires video content".to_string(),
            ));
        }

        let data = self.download(job.asset_url).await?;
        let init = self
            .init_upload(job.access_token, job.caption, data.len())
            .await?;

        tracing::debug!(
            publish_id = %init.publish_id,
            bytes = data.len(),
            "[tiktok] Uploading video"
        );
        self.upload(&init.upload_url, data).await?;

        Ok(json!({ "publish_id": init.publish_id }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MediaKind;
    use crate::testing::spawn_server;
    use axum::{
        Json, Router,
        body::Body,
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::{get, post, put},
    };
    use std::sync::{Arc, Mutex};

    const VIDEO: &[u8] = b"\x00\x00\x00\x18ftypmp42 fake video bytes";

    #[derive(Default)]
    struct TikTokMock {
        base: Mutex<String>,
        init_bodies: Mutex<Vec<Value>>,
        uploads: Mutex<Vec<(String, usize)>>,
    }

    async fn video_file() -> &'static [u8] {
        VIDEO
    }

    /// Same bytes as `video_file`, sent chunked with no Content-Length
    async fn streamed_video_file() -> Body {
        let chunks: Vec<Result<Bytes, std::io::Error>> = VIDEO
            .chunks(4)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        Body::from_stream(futures::stream::iter(chunks))
    }

    async fn init(
        State(mock): State<Arc<TikTokMock>>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer tt-token") {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": { "code": "access_token_invalid", "message": "The access token is invalid or not found in the request.", "log_id": "x" } })),
            );
        }
        mock.init_bodies.lock().unwrap().push(body);
        let upload_url = format!("{}/upload/abc", mock.base.lock().unwrap());
        (
            StatusCode::OK,
            Json(json!({
                "data": { "publish_id": "v_pub_123", "upload_url": upload_url },
                "error": { "code": "ok", "message": "", "log_id": "y" }
            })),
        )
    }

    async fn upload(
        State(mock): State<Arc<TikTokMock>>,
        headers: HeaderMap,
        body: axum::body::Bytes,
    ) -> StatusCode {
        let range = headers
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        mock.uploads.lock().unwrap().push((range, body.len()));
        StatusCode::CREATED
    }

    async fn start(mock: Arc<TikTokMock>) -> String {
        let router = Router::new()
            .route("/video.mp4", get(video_file))
            .route("/streamed.mp4", get(streamed_video_file))
            .route("/v2/post/publish/video/init/", post(init))
            .route("/upload/abc", put(upload))
            .with_state(mock.clone());
        let base = spawn_server(router).await;
        *mock.base.lock().unwrap() = base.clone();
        base
    }

    fn job<'a>(asset_url: &'a str, token: &'a str, media_kind: MediaKind) -> PublishJob<'a> {
        PublishJob {
            external_account_id: "open-id-1",
            access_token: token,
            asset_url,
            caption: "New drop",
            media_kind,
        }
    }

    #[test]
    fn test_content_range_spans_whole_file() {
        assert_eq!(content_range(1000), "bytes 0-999/1000");
        assert_eq!(content_range(1), "bytes 0-0/1");
    }

    #[tokio::test]
    async fn test_rejects_images_before_network() {
        // Nothing listens on this port; an attempted call would fail with an HTTP error
        let publisher = TikTokPublisher::new(Client::new(), "http://127.0.0.1:9", 1024);

        let err = publisher
            .publish(&job("http://127.0.0.1:9/a.png", "tt-token", MediaKind::Image))
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::Unsupported(_)));
        assert_eq!(err.to_string(), "TikTok requires video content");
    }

    #[tokio::test]
    async fn test_single_chunk_upload() {
        let mock = Arc::new(TikTokMock::default());
        let base = start(mock.clone()).await;
        let publisher = TikTokPublisher::new(Client::new(), &base, 1024 * 1024);
        let asset = format!("{}/video.mp4", base);

        let result = publisher
            .publish(&job(&asset, "tt-token", MediaKind::Video))
            .await
            .unwrap();

        assert_eq!(result, json!({ "publish_id": "v_pub_123" }));

        let init_bodies = mock.init_bodies.lock().unwrap();
        let source = &init_bodies[0]["source_info"];
        assert_eq!(source["source"], "FILE_UPLOAD");
        assert_eq!(source["video_size"], VIDEO.len());
        assert_eq!(source["chunk_size"], VIDEO.len());
        assert_eq!(source["total_chunk_count"], 1);
        assert_eq!(init_bodies[0]["post_info"]["privacy_level"], "PUBLIC_TO_EVERYONE");
        assert_eq!(init_bodies[0]["post_info"]["title"], "New drop");

        let uploads = mock.uploads.lock().unwrap();
        assert_eq!(
            *uploads,
            vec![(content_range(VIDEO.len()), VIDEO.len())]
        );
    }

    #[tokio::test]
    async fn test_init_error_message_is_surfaced() {
        let mock = Arc::new(TikTokMock::default());
        let base = start(mock.clone()).await;
        let publisher = TikTokPublisher::new(Client::new(), &base, 1024 * 1024);
        let asset = format!("{}/video.mp4", base);

        let err = publisher
            .publish(&job(&asset, "stale", MediaKind::Video))
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "The access token is invalid or not found in the request."
        );
        assert!(mock.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_oversized_video() {
        let mock = Arc::new(TikTokMock::default());
        let base = start(mock.clone()).await;
        let publisher = TikTokPublisher::new(Client::new(), &base, 8);
        let asset = format!("{}/video.mp4", base);

        let err = publisher
            .publish(&job(&asset, "tt-token", MediaKind::Video))
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::Unsupported(_)));
        assert!(mock.init_bodies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_streamed_download_stops_at_limit() {
        let mock = Arc::new(TikTokMock::default());
        let base = start(mock.clone()).await;
        let asset = format!("{}/streamed.mp4", base);

        let limited = TikTokPublisher::new(Client::new(), &base, 8);
        let err = limited
            .publish(&job(&asset, "tt-token", MediaKind::Video))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Video exceeds single-chunk upload limit of 8 bytes"
        );
        assert!(mock.init_bodies.lock().unwrap().is_empty());

        let roomy = TikTokPublisher::new(Client::new(), &base, 1024 * 1024);
        roomy
            .publish(&job(&asset, "tt-token", MediaKind::Video))
            .await
            .unwrap();
        let uploads = mock.uploads.lock().unwrap();
        assert_eq!(*uploads, vec![(content_range(VIDEO.len()), VIDEO.len())]);
    }
}
