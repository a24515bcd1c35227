use crate::constants::{endpoints, limits};
use crate::error::TollgateError;
use crate::llm::http::{self, token_count};
use crate::llm::retry::RetryPolicy;
use crate::llm::traits::*;
use crate::llm::ProviderId;
use serde_json::Value;

pub struct ClaudeClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    max_tokens: u32,
    retry: RetryPolicy,
}

impl ClaudeClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: http::generation_client(),
            api_key: api_key.into(),
            base_url: endpoints::CLAUDE_BASE_URL.to_string(),
            max_tokens: limits::MAX_TOKENS,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = max;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn build_request_body(&self, model: &str, prompt: &str, images: &[ImageBlob]) -> Value {
        // Images go before the text block, as the messages API recommends.
        let mut content: Vec<Value> = images
            .iter()
            .map(|img| {
                serde_json::json!({
                    "type": "image",
                    "source": {
                        "type": "base64",
                        "media_type": img.mime_type,
                        "data": img.to_base64(),
                    }
                })
            })
            .collect();
        content.push(serde_json::json!({
            "type": "text",
            "text": prompt,
        }));

        serde_json::json!({
            "model": model,
            "max_tokens": self.max_tokens,
            "messages": [{
                "role": "user",
                "content": content,
            }],
        })
    }
}

#[async_trait::async_trait]
impl ChatAdapter for ClaudeClient {
    fn provider(&self) -> ProviderId {
        ProviderId::Claude
    }

    async fn chat(
        &self,
        model: &str,
        prompt: &str,
        images: &[ImageBlob],
    ) -> Result<Completion, TollgateError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_request_body(model, prompt, images);

        let response = self
            .retry
            .run("Claude messages", || {
                http::send_json(
                    ProviderId::Claude,
                    self.client
                        .post(&url)
                        .header("x-api-key", &self.api_key)
                        .header("anthropic-version", endpoints::ANTHROPIC_VERSION)
                        .header("content-type", "application/json")
                        .json(&body),
                )
            })
            .await?;

        let text = response
            .get("content")
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| TollgateError::provider(ProviderId::Claude, "No content in response"))?;

        Ok(Completion {
            text,
            usage: TokenUsage::new(
                token_count(&response, "/usage/input_tokens"),
                token_count(&response, "/usage/output_tokens"),
            ),
        })
    }
}
