//! Google Gemini adapter.
//!
//! Shapes a `generateContent` request from the tool arguments. The API
//! key goes in the `x-goog-api-key` header so it can never appear in a
//! URL or in reqwest error text.

use px_domain::credentials::EnrichedRequest;
use px_domain::error::{Error, Result};
use px_domain::tool::ToolResponse;
use serde_json::Value;

use crate::traits::Caller;
use crate::util::{from_reqwest, truncate_body};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Caller for the `gemini_generate` tool.
pub struct GeminiCaller {
    client: reqwest::Client,
    base_url: String,
    default_model: String,
}

impl GeminiCaller {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Point the adapter at a different endpoint (tests, regional hosts).
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            default_model: DEFAULT_MODEL.to_owned(),
        })
    }

    fn build_body(&self, req: &EnrichedRequest) -> Result<(String, Value)> {
        let prompt = req
            .arguments
            .get("prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("field 'prompt' is required".into()))?;

        let model = req
            .arguments
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&self.default_model)
            .to_owned();

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });
        Ok((model, body))
    }
}

#[async_trait::async_trait]
impl Caller for GeminiCaller {
    async fn execute(&self, req: &EnrichedRequest) -> Result<ToolResponse> {
        let (model, body) = self.build_body(req)?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, model
        );

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", req.credentials.api_key())
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(Error::Upstream {
                provider: "gemini".into(),
                message: format!("{}: {}", status.as_u16(), truncate_body(&text, 200)),
            });
        }

        let value: Value = serde_json::from_str(&text)?;
        let combined = extract_text(&value);
        if combined.is_empty() {
            return Err(Error::Upstream {
                provider: "gemini".into(),
                message: "response contained no text parts".into(),
            });
        }
        Ok(ToolResponse::text(combined))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_text(value: &Value) -> String {
    value["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
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
            "gemini_generate",
            arguments,
            Credentials::new("AIza_test".into(), "bot"),
        )
    }

    #[test]
    fn body_shapes_prompt_and_model() {
        let caller = GeminiCaller::new().unwrap();
        let req = req_with(serde_json::json!({
            "prompt": "hello",
            "model": "gemini-2.5-pro"
        }));
        let (model, body) = caller.build_body(&req).unwrap();
        assert_eq!(model, "gemini-2.5-pro");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
    }

    #[test]
    fn missing_prompt_is_validation_error() {
        let caller = GeminiCaller::new().unwrap();
        let req = req_with(serde_json::json!({}));
        assert!(matches!(
            caller.build_body(&req),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn extract_text_joins_parts() {
        let value = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "a" }, { "text": "b" }] }
            }]
        });
        assert_eq!(extract_text(&value), "ab");
        assert_eq!(extract_text(&serde_json::json!({})), "");
    }
}
