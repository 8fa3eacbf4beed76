//! Slack adapter.
//!
//! Shapes a `chat.postMessage` call. Slack reports auth failures as
//! `ok: false` error codes on HTTP 200, so the known auth codes are
//! folded into the auth class here: classification on the structured
//! code, with the retry wrapper's substring scan as the fallback.

use px_domain::credentials::EnrichedRequest;
use px_domain::error::{Error, Result};
use px_domain::tool::ToolResponse;
use serde_json::Value;

use crate::traits::Caller;
use crate::util::{from_reqwest, truncate_body};

const DEFAULT_BASE_URL: &str = "https://slack.com/api";

/// Slack error codes that mean the token itself was rejected.
const AUTH_ERROR_CODES: &[&str] = &[
    "not_authed",
    "invalid_auth",
    "account_inactive",
    "token_revoked",
    "token_expired",
];

/// Caller for the `slack_send_message` tool.
pub struct SlackCaller {
    client: reqwest::Client,
    base_url: String,
}

impl SlackCaller {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn build_body(req: &EnrichedRequest) -> Result<Value> {
        let channel = req
            .arguments
            .get("channel")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("field 'channel' is required".into()))?;
        let text = req
            .arguments
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("field 'text' is required".into()))?;

        Ok(serde_json::json!({ "channel": channel, "text": text }))
    }
}

#[async_trait::async_trait]
impl Caller for SlackCaller {
    async fn execute(&self, req: &EnrichedRequest) -> Result<ToolResponse> {
        let body = Self::build_body(req)?;
        let url = format!("{}/chat.postMessage", self.base_url);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(req.credentials.api_key())
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(Error::Upstream {
                provider: "slack".into(),
                message: format!("{}: {}", status.as_u16(), truncate_body(&text, 200)),
            });
        }

        let value: Value = serde_json::from_str(&text)?;
        if value["ok"].as_bool() != Some(true) {
            let code = value["error"].as_str().unwrap_or("unknown_error");
            let message = if AUTH_ERROR_CODES.contains(&code) {
                format!("unauthorized: {code}")
            } else {
                format!("chat.postMessage failed: {code}")
            };
            return Err(Error::Upstream {
                provider: "slack".into(),
                message,
            });
        }

        let ts = value["ts"].as_str().unwrap_or_default();
        Ok(ToolResponse::text(format!("message sent (ts {ts})")))
    }

    fn name(&self) -> &str {
        "slack"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use px_domain::credentials::Credentials;
    use serde_json::Map;

    fn req_with(args: Value) -> EnrichedRequest {
        let arguments: Map<String, Value> =
            args.as_object().cloned().unwrap_or_default();
        EnrichedRequest::new(
            "slack_send_message",
            arguments,
            Credentials::new("xoxb-test".into(), "bot"),
        )
    }

    #[test]
    fn body_requires_channel_and_text() {
        let req = req_with(serde_json::json!({ "channel": "#general", "text": "hi" }));
        let body = SlackCaller::build_body(&req).unwrap();
        assert_eq!(body["channel"], "#general");
        assert_eq!(body["text"], "hi");

        let req = req_with(serde_json::json!({ "channel": "#general" }));
        assert!(matches!(
            SlackCaller::build_body(&req),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn auth_codes_classify_as_auth_errors() {
        let err = Error::Upstream {
            provider: "slack".into(),
            message: "unauthorized: invalid_auth".into(),
        };
        assert!(err.is_auth_error());

        let err = Error::Upstream {
            provider: "slack".into(),
            message: "chat.postMessage failed: channel_not_found".into(),
        };
        assert!(!err.is_auth_error());
    }
}
