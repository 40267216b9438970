use std::time::Duration;

use async_trait::async_trait;
use relay_common::BackendError;
use serde_json::{json, Value};

use super::{ModelBackend, ModelRequest, ModelResponse};

/// Model backend speaking the OpenAI chat-completions dialect, which most
/// providers and local inference servers expose.
#[derive(Debug, Clone)]
pub struct OpenAiCompatBackend {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl OpenAiCompatBackend {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .build()?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            http,
        })
    }

    fn request_body(req: &ModelRequest) -> Value {
        let mut body = json!({
            "model": req.model,
            "messages": [{"role": "user", "content": req.prompt}],
            "stream": false,
        });
        if let Value::Object(map) = &mut body {
            for (k, v) in &req.parameters {
                // Keep the fields that define the call under our control.
                if matches!(k.as_str(), "model" | "messages" | "stream") {
                    continue;
                }
                map.insert(k.clone(), v.clone());
            }
        }
        body
    }

    fn parse_response(v: &Value) -> Result<ModelResponse, BackendError> {
        let text = v
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c0| {
                c0.get("message")
                    .and_then(|m| m.get("content"))
                    .and_then(|t| t.as_str())
                    .or_else(|| c0.get("text").and_then(|t| t.as_str()))
            })
            .ok_or_else(|| BackendError::InvalidResponse("missing choices[0] content".into()))?;

        let token_count = v
            .get("usage")
            .and_then(|u| {
                u.get("total_tokens").and_then(|t| t.as_u64()).or_else(|| {
                    let p = u.get("prompt_tokens").and_then(|t| t.as_u64())?;
                    let c = u.get("completion_tokens").and_then(|t| t.as_u64())?;
                    Some(p + c)
                })
            });

        Ok(ModelResponse {
            text: text.to_string(),
            token_count,
        })
    }
}

#[async_trait]
impl ModelBackend for OpenAiCompatBackend {
    async fn complete(&self, req: ModelRequest) -> Result<ModelResponse, BackendError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let mut rb = self.http.post(url).json(&Self::request_body(&req));
        if let Some(key) = &self.api_key {
            rb = rb.bearer_auth(key);
        }

        let resp = rb
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            tracing::warn!(%status, provider = %req.provider, "model backend returned error");
            return Err(BackendError::upstream(status.as_u16(), &text));
        }

        let v: Value = resp
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        Self::parse_response(&v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn test_request_body_merges_parameters() {
        let mut parameters = Map::new();
        parameters.insert("temperature".into(), json!(0.2));
        parameters.insert("model".into(), json!("sneaky"));
        let body = OpenAiCompatBackend::request_body(&ModelRequest {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            prompt: "Hello Ada".into(),
            parameters,
        });
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["temperature"], 0.2);
        assert_eq!(body["messages"][0]["content"], "Hello Ada");
    }

    #[test]
    fn test_parse_response_total_tokens() {
        let v = json!({
            "choices": [{"message": {"role": "assistant", "content": "hi"}}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
        });
        let r = OpenAiCompatBackend::parse_response(&v).unwrap();
        assert_eq!(r.text, "hi");
        assert_eq!(r.token_count, Some(4));
    }

    #[test]
    fn test_parse_response_sums_partial_usage() {
        let v = json!({
            "choices": [{"text": "legacy"}],
            "usage": {"prompt_tokens": 7, "completion_tokens": 5}
        });
        let r = OpenAiCompatBackend::parse_response(&v).unwrap();
        assert_eq!(r.text, "legacy");
        assert_eq!(r.token_count, Some(12));
    }

    #[test]
    fn test_parse_response_without_choices_is_invalid() {
        let err = OpenAiCompatBackend::parse_response(&json!({"error": "x"})).unwrap_err();
        assert!(matches!(err, BackendError::InvalidResponse(_)));
    }
}
