mod traits;
mod claude;
mod openai;
mod gemini;
mod http;
pub mod provider;
pub mod discovery;
pub mod retry;
pub mod adapters;

pub use traits::*;
pub use claude::ClaudeClient;
pub use openai::OpenAIClient;
pub use gemini::GeminiClient;
pub use provider::{provider_key, CredentialSet, ProviderConfig, ProviderId};
pub use discovery::ModelDiscovery;
pub use retry::RetryPolicy;
pub use adapters::AdapterTable;
