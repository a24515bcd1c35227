use crate::error::TollgateError;
use crate::llm::provider::ProviderId;
use base64::Engine;
use std::path::Path;

/// An inline image attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImageBlob {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Read an image file, guessing its MIME type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self, TollgateError> {
        let bytes = tokio::fs::read(path).await?;
        let mime_type = mime_guess::from_path(path)
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| "image/png".to_string());
        Ok(Self { bytes, mime_type })
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }

    /// File extension matching the MIME type, `png` when unknown.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        }
    }
}

/// Token counts as reported by the vendor. Zero when the response carries none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0
    }
}

/// Generated text plus the usage it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// A request for a generated image.
#[derive(Debug, Clone, Default)]
pub struct ImageRequest {
    pub prompt: String,
    pub size: Option<String>,
    pub quality: Option<String>,
    pub reference: Option<ImageBlob>,
}

/// Raw image bytes returned by a generation vendor.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub image: ImageBlob,
    pub usage: TokenUsage,
}

/// Text generation with optional inline images.
#[async_trait::async_trait]
pub trait ChatAdapter: Send + Sync {
    fn provider(&self) -> ProviderId;

    async fn chat(
        &self,
        model: &str,
        prompt: &str,
        images: &[ImageBlob],
    ) -> Result<Completion, TollgateError>;
}

/// Analysis of a single image.
#[async_trait::async_trait]
pub trait VisionAdapter: Send + Sync {
    fn provider(&self) -> ProviderId;

    async fn analyze(
        &self,
        model: &str,
        image: &ImageBlob,
        prompt: &str,
    ) -> Result<Completion, TollgateError>;
}

/// Every chat vendor analyses an image as a chat turn carrying that image.
#[async_trait::async_trait]
impl<T: ChatAdapter> VisionAdapter for T {
    fn provider(&self) -> ProviderId {
        ChatAdapter::provider(self)
    }

    async fn analyze(
        &self,
        model: &str,
        image: &ImageBlob,
        prompt: &str,
    ) -> Result<Completion, TollgateError> {
        self.chat(model, prompt, std::slice::from_ref(image)).await
    }
}

/// Prompt (and optionally a reference image) to image bytes.
#[async_trait::async_trait]
pub trait ImageAdapter: Send + Sync {
    fn provider(&self) -> ProviderId;

    async fn generate(
        &self,
        model: &str,
        request: &ImageRequest,
    ) -> Result<GeneratedImage, TollgateError>;
}
