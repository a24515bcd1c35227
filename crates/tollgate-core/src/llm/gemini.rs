use crate::constants::endpoints;
use crate::error::TollgateError;
use crate::llm::http::{self, token_count};
use crate::llm::retry::RetryPolicy;
use crate::llm::traits::*;
use crate::llm::ProviderId;
use base64::Engine;
use serde_json::Value;

/// Gemini `generateContent` client, used for text, vision and image output.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: http::generation_client(),
            api_key: api_key.into(),
            base_url: endpoints::GEMINI_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    fn parts(prompt: &str, images: &[ImageBlob]) -> Vec<Value> {
        let mut parts = vec![serde_json::json!({ "text": prompt })];
        parts.extend(images.iter().map(|img| {
            serde_json::json!({
                "inlineData": {
                    "mimeType": img.mime_type,
                    "data": img.to_base64(),
                }
            })
        }));
        parts
    }

    fn build_image_body(request: &ImageRequest) -> Value {
        let mut body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": Self::parts(&request.prompt, request.reference.as_slice()),
            }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
            },
        });
        if let Some(ratio) = request.size.as_deref().and_then(aspect_ratio) {
            body["generationConfig"]["imageConfig"] = serde_json::json!({ "aspectRatio": ratio });
        }
        body
    }

    async fn generate_content(
        &self,
        label: &str,
        model: &str,
        body: &Value,
    ) -> Result<Value, TollgateError> {
        let url = self.url(model);
        self.retry
            .run(label, || {
                http::send_json(
                    ProviderId::Gemini,
                    self.client
                        .post(&url)
                        .header("x-goog-api-key", &self.api_key)
                        .json(body),
                )
            })
            .await
    }

    fn usage(response: &Value) -> TokenUsage {
        TokenUsage::new(
            token_count(response, "/usageMetadata/promptTokenCount"),
            token_count(response, "/usageMetadata/candidatesTokenCount"),
        )
    }

    fn candidate_parts(response: &Value) -> Result<&Vec<Value>, TollgateError> {
        response
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                let reason = response
                    .pointer("/promptFeedback/blockReason")
                    .and_then(Value::as_str)
                    .unwrap_or("no candidates returned");
                TollgateError::provider(ProviderId::Gemini, reason)
            })
    }
}

/// Aspect ratios the image models accept.
const SUPPORTED_RATIOS: [(u32, u32); 10] = [
    (1, 1),
    (2, 3),
    (3, 2),
    (3, 4),
    (4, 3),
    (4, 5),
    (5, 4),
    (9, 16),
    (16, 9),
    (21, 9),
];

/// Map a `WIDTHxHEIGHT` size onto the closest supported ratio, e.g.
/// `1792x1024` becomes `16:9`.
fn aspect_ratio(size: &str) -> Option<String> {
    let (w, h) = size.split_once('x')?;
    let (w, h): (u32, u32) = (w.trim().parse().ok()?, h.trim().parse().ok()?);
    if w == 0 || h == 0 {
        return None;
    }
    let wanted = (w as f64 / h as f64).ln();
    SUPPORTED_RATIOS
        .iter()
        .min_by(|a, b| {
            let da = ((a.0 as f64 / a.1 as f64).ln() - wanted).abs();
            let db = ((b.0 as f64 / b.1 as f64).ln() - wanted).abs();
            da.total_cmp(&db)
        })
        .map(|(rw, rh)| format!("{rw}:{rh}"))
}

#[async_trait::async_trait]
impl ChatAdapter for GeminiClient {
    fn provider(&self) -> ProviderId {
        ProviderId::Gemini
    }

    async fn chat(
        &self,
        model: &str,
        prompt: &str,
        images: &[ImageBlob],
    ) -> Result<Completion, TollgateError> {
        let body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": Self::parts(prompt, images),
            }],
        });
        let response = self.generate_content("Gemini generateContent", model, &body).await?;

        let text = Self::candidate_parts(&response)?
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("");

        Ok(Completion {
            text,
            usage: Self::usage(&response),
        })
    }
}

#[async_trait::async_trait]
impl ImageAdapter for GeminiClient {
    fn provider(&self) -> ProviderId {
        ProviderId::Gemini
    }

    async fn generate(
        &self,
        model: &str,
        request: &ImageRequest,
    ) -> Result<GeneratedImage, TollgateError> {
        let body = Self::build_image_body(request);
        let response = self.generate_content("Gemini image generation", model, &body).await?;

        let inline = Self::candidate_parts(&response)?
            .iter()
            .find_map(|p| p.get("inlineData"))
            .ok_or_else(|| TollgateError::provider(ProviderId::Gemini, "No image in response"))?;
        let mime_type = inline
            .get("mimeType")
            .and_then(Value::as_str)
            .unwrap_or("image/png");
        let encoded = inline
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| TollgateError::provider(ProviderId::Gemini, "No image data in response"))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| TollgateError::provider(ProviderId::Gemini, format!("Bad image data: {e}")))?;
        if bytes.is_empty() {
            return Err(TollgateError::provider(ProviderId::Gemini, "Empty image in response"));
        }

        Ok(GeneratedImage {
            image: ImageBlob::new(bytes, mime_type),
            usage: Self::usage(&response),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_ratio_snaps_to_supported_values() {
        assert_eq!(aspect_ratio("1024x1024").as_deref(), Some("1:1"));
        assert_eq!(aspect_ratio("1792x1024").as_deref(), Some("16:9"));
        assert_eq!(aspect_ratio("1024x1792").as_deref(), Some("9:16"));
        assert_eq!(aspect_ratio("1536x1024").as_deref(), Some("3:2"));
        assert_eq!(aspect_ratio("1920x1080").as_deref(), Some("16:9"));
        assert_eq!(aspect_ratio("2560x1080").as_deref(), Some("21:9"));
        assert_eq!(aspect_ratio("auto"), None);
        assert_eq!(aspect_ratio("0x10"), None);
    }

    #[test]
    fn image_body_carries_reference_image() {
        let request = ImageRequest {
            prompt: "make it blue".into(),
            size: Some("1024x1024".into()),
            reference: Some(ImageBlob::new(vec![1], "image/png")),
            ..Default::default()
        };
        let body = GeminiClient::build_image_body(&request);
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(body["generationConfig"]["imageConfig"]["aspectRatio"], "1:1");
    }
}
