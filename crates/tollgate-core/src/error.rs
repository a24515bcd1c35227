use crate::llm::ProviderId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TollgateError {
    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: ProviderId,
        status: u16,
        body: String,
    },

    #[error("{provider}: {message}")]
    Provider { provider: ProviderId, message: String },

    #[error("No API credential configured for {0}")]
    MissingCredential(ProviderId),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pricing error: {0}")]
    Pricing(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TollgateError {
    pub fn provider(provider: ProviderId, message: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
        }
    }

    /// Whether a retry against the same vendor can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => crate::llm::retry::is_retryable_status(*status),
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}
