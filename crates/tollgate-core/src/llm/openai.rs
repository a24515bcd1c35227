use crate::constants::{endpoints, limits};
use crate::error::TollgateError;
use crate::llm::http::{self, token_count};
use crate::llm::retry::RetryPolicy;
use crate::llm::traits::*;
use crate::llm::ProviderId;
use base64::Engine;
use serde::Serialize;
use serde_json::Value;

pub struct OpenAIClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    max_tokens: u32,
    retry: RetryPolicy,
}

impl OpenAIClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: http::generation_client(),
            api_key: api_key.into(),
            base_url: endpoints::OPENAI_BASE_URL.to_string(),
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

    fn build_chat_body(&self, model: &str, prompt: &str, images: &[ImageBlob]) -> ChatRequest {
        let content = if images.is_empty() {
            Value::String(prompt.to_string())
        } else {
            let mut parts: Vec<Value> = vec![serde_json::json!({
                "type": "text",
                "text": prompt,
            })];
            parts.extend(images.iter().map(|img| {
                serde_json::json!({
                    "type": "image_url",
                    "image_url": { "url": img.data_url() },
                })
            }));
            Value::Array(parts)
        };

        ChatRequest {
            model: model.to_string(),
            messages: vec![serde_json::json!({
                "role": "user",
                "content": content,
            })],
            max_tokens: self.max_tokens,
        }
    }

    fn build_image_body(model: &str, request: &ImageRequest) -> Value {
        let mut body = serde_json::json!({
            "model": model,
            "prompt": request.prompt,
            "n": 1,
        });
        if let Some(size) = &request.size {
            body["size"] = Value::String(size.clone());
        }
        if let Some(quality) = &request.quality {
            body["quality"] = Value::String(quality.clone());
        }
        // dall-e models default to URLs; gpt-image models always return base64.
        if model.starts_with("dall-e") {
            body["response_format"] = Value::String("b64_json".into());
        }
        body
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Value>,
    max_tokens: u32,
}

#[async_trait::async_trait]
impl ChatAdapter for OpenAIClient {
    fn provider(&self) -> ProviderId {
        ProviderId::OpenAI
    }

    async fn chat(
        &self,
        model: &str,
        prompt: &str,
        images: &[ImageBlob],
    ) -> Result<Completion, TollgateError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_chat_body(model, prompt, images);

        let response = self
            .retry
            .run("OpenAI chat", || {
                http::send_json(
                    ProviderId::OpenAI,
                    self.client
                        .post(&url)
                        .bearer_auth(&self.api_key)
                        .json(&body),
                )
            })
            .await?;

        let text = response
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| TollgateError::provider(ProviderId::OpenAI, "No response from API"))?
            .to_string();

        Ok(Completion {
            text,
            usage: TokenUsage::new(
                token_count(&response, "/usage/prompt_tokens"),
                token_count(&response, "/usage/completion_tokens"),
            ),
        })
    }
}

#[async_trait::async_trait]
impl ImageAdapter for OpenAIClient {
    fn provider(&self) -> ProviderId {
        ProviderId::OpenAI
    }

    async fn generate(
        &self,
        model: &str,
        request: &ImageRequest,
    ) -> Result<GeneratedImage, TollgateError> {
        if request.reference.is_some() {
            tracing::debug!("OpenAI image generation ignores the reference image");
        }
        let url = format!("{}/v1/images/generations", self.base_url);
        let body = Self::build_image_body(model, request);

        let response = self
            .retry
            .run("OpenAI image generation", || {
                http::send_json(
                    ProviderId::OpenAI,
                    self.client
                        .post(&url)
                        .bearer_auth(&self.api_key)
                        .json(&body),
                )
            })
            .await?;

        let encoded = response
            .pointer("/data/0/b64_json")
            .and_then(Value::as_str)
            .ok_or_else(|| TollgateError::provider(ProviderId::OpenAI, "No image in response"))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| TollgateError::provider(ProviderId::OpenAI, format!("Bad image data: {e}")))?;

        Ok(GeneratedImage {
            image: ImageBlob::new(bytes, "image/png"),
            usage: TokenUsage::new(
                token_count(&response, "/usage/input_tokens"),
                token_count(&response, "/usage/output_tokens"),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_only_prompt_is_plain_string_content() {
        let client = OpenAIClient::new("sk-test");
        let body = client.build_chat_body("gpt-4o", "hello", &[]);
        assert_eq!(body.messages[0]["content"], "hello");
        assert_eq!(body.max_tokens, limits::MAX_TOKENS);
    }

    #[test]
    fn images_become_data_url_parts() {
        let client = OpenAIClient::new("sk-test");
        let image = ImageBlob::new(vec![1, 2, 3], "image/jpeg");
        let body = client.build_chat_body("gpt-4o", "describe", &[image]);
        let parts = body.messages[0]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/jpeg;base64,AQID");
    }

    #[test]
    fn dalle_requests_base64_output() {
        let request = ImageRequest {
            prompt: "a cat".into(),
            size: Some("1024x1024".into()),
            ..Default::default()
        };
        let body = OpenAIClient::build_image_body("dall-e-3", &request);
        assert_eq!(body["response_format"], "b64_json");
        assert_eq!(body["size"], "1024x1024");

        let body = OpenAIClient::build_image_body("gpt-image-1", &request);
        assert!(body.get("response_format").is_none());
    }
}
