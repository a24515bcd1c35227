use crate::constants::{endpoints, models};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Identifies one external AI vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// GPT family. Vendor A in the fallback chain.
    OpenAI,
    /// Anthropic. Vendor B in the fallback chain.
    Claude,
    /// Google. Vendor C, the cloud vision-capable vendor tried first.
    Gemini,
}

impl ProviderId {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAI => "OpenAI",
            Self::Claude => "Claude",
            Self::Gemini => "Gemini",
        }
    }

    /// Stable lowercase identifier used in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
        }
    }

    /// Canonical ledger bucket for this vendor.
    pub fn key(&self) -> &'static str {
        match self {
            Self::OpenAI => "gpt",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAI => endpoints::OPENAI_BASE_URL,
            Self::Claude => endpoints::CLAUDE_BASE_URL,
            Self::Gemini => endpoints::GEMINI_BASE_URL,
        }
    }

    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI_API_KEY",
            Self::Claude => "ANTHROPIC_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAI => models::DEFAULT_OPENAI_MODEL,
            Self::Claude => models::DEFAULT_CLAUDE_MODEL,
            Self::Gemini => models::DEFAULT_GEMINI_MODEL,
        }
    }

    /// Default image model, `None` for vendors without image generation.
    pub fn default_image_model(&self) -> Option<&'static str> {
        match self {
            Self::OpenAI => Some(models::DEFAULT_OPENAI_IMAGE_MODEL),
            Self::Gemini => Some(models::DEFAULT_GEMINI_IMAGE_MODEL),
            Self::Claude => None,
        }
    }

    pub fn supports_image_generation(&self) -> bool {
        self.default_image_model().is_some()
    }

    pub fn all() -> &'static [ProviderId] {
        &[Self::OpenAI, Self::Claude, Self::Gemini]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ProviderId {
    type Err = crate::error::TollgateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "gpt" => Ok(Self::OpenAI),
            "claude" | "anthropic" => Ok(Self::Claude),
            "gemini" | "google" => Ok(Self::Gemini),
            other => Err(crate::error::TollgateError::Config(format!(
                "Unknown provider '{other}'"
            ))),
        }
    }
}

/// Map any vendor or model name onto its ledger bucket.
///
/// Matching is by substring and case-insensitive. Names that match no bucket
/// pass through unchanged, so the function is idempotent.
pub fn provider_key(name: &str) -> String {
    let lower = name.to_lowercase();
    if lower.contains("claude") || lower.contains("anthropic") {
        "claude".to_string()
    } else if lower.contains("gpt") || lower.contains("openai") || lower.contains("dall-e") {
        "gpt".to_string()
    } else if lower.contains("gemini") || lower.contains("google") {
        "gemini".to_string()
    } else {
        name.to_string()
    }
}

/// One optional secret per vendor. Presence drives routing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialSet {
    pub openai: Option<String>,
    pub claude: Option<String>,
    pub gemini: Option<String>,
}

impl CredentialSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read each vendor's key from the environment variable its config names.
    pub fn from_env(configs: &[ProviderConfig]) -> Self {
        let mut set = Self::default();
        for config in configs {
            set.set(config.id, config.api_key());
        }
        set
    }

    pub fn with(mut self, provider: ProviderId, key: impl Into<String>) -> Self {
        self.set(provider, Some(key.into()));
        self
    }

    pub fn set(&mut self, provider: ProviderId, key: Option<String>) {
        let key = key.filter(|k| !k.trim().is_empty());
        match provider {
            ProviderId::OpenAI => self.openai = key,
            ProviderId::Claude => self.claude = key,
            ProviderId::Gemini => self.gemini = key,
        }
    }

    pub fn get(&self, provider: ProviderId) -> Option<&str> {
        match provider {
            ProviderId::OpenAI => self.openai.as_deref(),
            ProviderId::Claude => self.claude.as_deref(),
            ProviderId::Gemini => self.gemini.as_deref(),
        }
    }

    pub fn has(&self, provider: ProviderId) -> bool {
        self.get(provider).is_some()
    }

    pub fn is_empty(&self) -> bool {
        ProviderId::all().iter().all(|p| !self.has(*p))
    }
}

/// Connection settings for a single vendor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: ProviderId,
    pub api_key_env: String,
    pub base_url: String,
    pub default_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_image_model: Option<String>,
}

impl ProviderConfig {
    pub fn builtin(id: ProviderId) -> Self {
        Self {
            id,
            api_key_env: id.default_api_key_env().to_string(),
            base_url: id.default_base_url().to_string(),
            default_model: id.default_model().to_string(),
            default_image_model: id.default_image_model().map(str::to_string),
        }
    }

    pub fn api_key(&self) -> Option<String> {
        if self.api_key_env.is_empty() {
            return None;
        }
        std::env::var(&self.api_key_env).ok()
    }

    pub fn image_model(&self) -> Option<&str> {
        self.default_image_model
            .as_deref()
            .or_else(|| self.id.default_image_model())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_key_buckets_vendor_and_model_names() {
        assert_eq!(provider_key("GPT-4o"), "gpt");
        assert_eq!(provider_key("openai-anything"), "gpt");
        assert_eq!(provider_key("Anthropic"), "claude");
        assert_eq!(provider_key("claude-sonnet-4-5"), "claude");
        assert_eq!(provider_key("Google"), "gemini");
        assert_eq!(provider_key("gemini-2.5-flash-image"), "gemini");
        assert_eq!(provider_key("dall-e-3"), "gpt");
        assert_eq!(provider_key("mistral-large"), "mistral-large");
    }

    #[test]
    fn vendor_names_bucket_to_their_key() {
        for id in ProviderId::all() {
            assert_eq!(provider_key(id.as_str()), id.key());
            assert_eq!(provider_key(id.name()), id.key());
        }
    }

    #[test]
    fn builtin_configs_compare_by_value() {
        let mut custom = ProviderConfig::builtin(ProviderId::Claude);
        assert_eq!(custom, ProviderConfig::builtin(ProviderId::Claude));
        custom.base_url = "http://localhost:9000".into();
        assert_ne!(custom, ProviderConfig::builtin(ProviderId::Claude));
    }

    #[test]
    fn provider_key_is_idempotent() {
        for name in [
            "GPT-4o",
            "openai",
            "ANTHROPIC",
            "claude",
            "Google Vertex",
            "dall-e-3",
            "Mistral",
            "",
        ] {
            let once = provider_key(name);
            assert_eq!(provider_key(&once), once, "not idempotent for {name:?}");
        }
    }

    #[test]
    fn provider_id_parses_aliases() {
        assert_eq!("anthropic".parse::<ProviderId>().unwrap(), ProviderId::Claude);
        assert_eq!("Google".parse::<ProviderId>().unwrap(), ProviderId::Gemini);
        assert_eq!("gpt".parse::<ProviderId>().unwrap(), ProviderId::OpenAI);
        assert!("ollama".parse::<ProviderId>().is_err());
    }

    #[test]
    fn blank_credentials_count_as_absent() {
        let mut creds = CredentialSet::new().with(ProviderId::OpenAI, "sk-test");
        creds.set(ProviderId::Gemini, Some("   ".into()));
        assert!(creds.has(ProviderId::OpenAI));
        assert!(!creds.has(ProviderId::Gemini));
        assert!(!creds.is_empty());
        assert!(CredentialSet::new().is_empty());
    }

    #[test]
    fn only_openai_and_gemini_generate_images() {
        assert!(ProviderId::OpenAI.supports_image_generation());
        assert!(ProviderId::Gemini.supports_image_generation());
        assert!(!ProviderId::Claude.supports_image_generation());
    }
}
