//! Shared Graph API helpers for the Instagram and Facebook adapters

use serde_json::Value;

use super::{PublishError, read_json};
use crate::constants::GRAPH_API_VERSION;

pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}/{}", base, GRAPH_API_VERSION, path)
}

/// Parse a Graph API response. `error.message` is surfaced verbatim.
pub(crate) async fn read_response(resp: reqwest::Response) -> Result<Value, PublishError> {
    let (status, text, body) = read_json(resp).await?;

    if let Some(message) = body
        .as_ref()
        .and_then(|b| b.pointer("/error/message"))
        .and_then(Value::as_str)
    {
        return Err(PublishError::Api(message.to_string()));
    }

    if !status.is_success() {
        return Err(PublishError::Api(format!("Status {}: {}", status, text)));
    }

    body.ok_or_else(|| PublishError::Api(format!("Failed to parse response: {}", text)))
}

/// The `id` field every Graph create call returns
pub(crate) fn object_id(body: &Value) -> Result<String, PublishError> {
    match body.get("id") {
        Some(Value::String(id)) => Ok(id.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(PublishError::Api(format!("Response missing id: {}", body))),
    }
}
