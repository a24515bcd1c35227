use crate::llm::provider::{CredentialSet, ProviderConfig, ProviderId};
use crate::llm::retry::RetryPolicy;
use crate::llm::{ChatAdapter, ClaudeClient, GeminiClient, ImageAdapter, OpenAIClient, VisionAdapter};
use std::collections::HashMap;
use std::sync::Arc;

/// Lookup table from vendor to the adapter serving each capability.
#[derive(Default, Clone)]
pub struct AdapterTable {
    chat: HashMap<ProviderId, Arc<dyn ChatAdapter>>,
    vision: HashMap<ProviderId, Arc<dyn VisionAdapter>>,
    image: HashMap<ProviderId, Arc<dyn ImageAdapter>>,
}

impl AdapterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build real HTTP clients for every vendor that has a credential.
    /// `max_tokens` caps replies from vendors that require a limit.
    pub fn from_credentials(
        credentials: &CredentialSet,
        configs: &[ProviderConfig],
        max_tokens: u32,
        retry: RetryPolicy,
    ) -> Self {
        let mut table = Self::new();

        for &id in ProviderId::all() {
            let Some(api_key) = credentials.get(id) else {
                tracing::debug!("No credential for {}, adapter not built", id);
                continue;
            };
            let base_url = configs
                .iter()
                .find(|c| c.id == id)
                .map(|c| c.base_url.clone())
                .unwrap_or_else(|| id.default_base_url().to_string());

            match id {
                ProviderId::OpenAI => {
                    let client = Arc::new(
                        OpenAIClient::new(api_key)
                            .with_base_url(base_url)
                            .with_max_tokens(max_tokens)
                            .with_retry(retry.clone()),
                    );
                    table.chat.insert(id, client.clone());
                    table.vision.insert(id, client.clone());
                    table.image.insert(id, client);
                }
                ProviderId::Claude => {
                    let client = Arc::new(
                        ClaudeClient::new(api_key)
                            .with_base_url(base_url)
                            .with_max_tokens(max_tokens)
                            .with_retry(retry.clone()),
                    );
                    table.chat.insert(id, client.clone());
                    table.vision.insert(id, client);
                }
                ProviderId::Gemini => {
                    let client = Arc::new(
                        GeminiClient::new(api_key)
                            .with_base_url(base_url)
                            .with_retry(retry.clone()),
                    );
                    table.chat.insert(id, client.clone());
                    table.vision.insert(id, client.clone());
                    table.image.insert(id, client);
                }
            }
        }

        table
    }

    pub fn with_chat(mut self, provider: ProviderId, adapter: Arc<dyn ChatAdapter>) -> Self {
        self.chat.insert(provider, adapter);
        self
    }

    pub fn with_vision(mut self, provider: ProviderId, adapter: Arc<dyn VisionAdapter>) -> Self {
        self.vision.insert(provider, adapter);
        self
    }

    pub fn with_image(mut self, provider: ProviderId, adapter: Arc<dyn ImageAdapter>) -> Self {
        self.image.insert(provider, adapter);
        self
    }

    pub fn chat(&self, provider: ProviderId) -> Option<Arc<dyn ChatAdapter>> {
        self.chat.get(&provider).cloned()
    }

    pub fn vision(&self, provider: ProviderId) -> Option<Arc<dyn VisionAdapter>> {
        self.vision.get(&provider).cloned()
    }

    pub fn image(&self, provider: ProviderId) -> Option<Arc<dyn ImageAdapter>> {
        self.image.get(&provider).cloned()
    }
}
