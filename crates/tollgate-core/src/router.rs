use crate::config::{Settings, SettingsStore};
use crate::constants::{messages, tasks};
use crate::error::TollgateError;
use crate::llm::{
    provider_key, AdapterTable, CredentialSet, ImageBlob, ImageRequest, ModelDiscovery,
    ProviderId, RetryPolicy, TokenUsage,
};
use crate::session::SessionContext;
use crate::storage::{ContentStore, FsContentStore};
use crate::usage::{DailyLedgerEntry, PricingSource, UsageEvent, UsageLedger, UsageRecord};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Vendors tried, in order, when the chat provider has no credential.
pub const CHAT_FALLBACK_ORDER: [ProviderId; 3] =
    [ProviderId::Gemini, ProviderId::OpenAI, ProviderId::Claude];

/// Vendors tried, in order, when the image provider has no credential.
pub const IMAGE_FALLBACK_ORDER: [ProviderId; 2] = [ProviderId::Gemini, ProviderId::OpenAI];

/// A resolved provider/model pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub provider: ProviderId,
    pub model: String,
    /// The configured vendor had no credential and another was picked.
    pub fell_back: bool,
}

fn first_credentialed(order: &[ProviderId], credentials: &CredentialSet) -> Option<ProviderId> {
    order.iter().copied().find(|p| credentials.has(*p))
}

/// Pick the vendor and model for a chat request.
///
/// Image-bearing requests honour the `image_analysis_provider` override, then
/// the task's own override, then the default provider. An uncredentialed
/// choice falls back along [`CHAT_FALLBACK_ORDER`]. `None` means no vendor has
/// a credential.
pub fn resolve_chat_route(
    settings: &Settings,
    credentials: &CredentialSet,
    task: &str,
    has_images: bool,
) -> Option<Route> {
    let image_route = if has_images {
        settings.task_route(tasks::IMAGE_ANALYSIS_PROVIDER)
    } else {
        None
    };

    let (provider, model) = match image_route.or_else(|| settings.task_route(task)) {
        Some(route) => (
            route.provider,
            route
                .model
                .clone()
                .unwrap_or_else(|| settings.provider_config(route.provider).default_model),
        ),
        None => (settings.llm.provider, settings.llm.model.clone()),
    };

    if credentials.has(provider) {
        return Some(Route {
            provider,
            model,
            fell_back: false,
        });
    }

    let fallback = first_credentialed(&CHAT_FALLBACK_ORDER, credentials)?;
    tracing::warn!(
        "No credential for {}, falling back to {} for task '{}'",
        provider,
        fallback,
        task
    );
    Some(Route {
        provider: fallback,
        model: settings.provider_config(fallback).default_model,
        fell_back: true,
    })
}

/// Pick the vendor and model for image generation.
///
/// The model comes from the explicit `llm.image_model` setting, then the
/// `image_generation` task override, then the vendor default. After a
/// fallback an explicit or task model is kept only when it belongs to the
/// vendor actually chosen.
pub fn resolve_image_route(settings: &Settings, credentials: &CredentialSet) -> Option<Route> {
    let task_route = settings
        .task_route(tasks::IMAGE_GENERATION)
        .filter(|r| r.provider.supports_image_generation());
    let preferred = task_route
        .map(|r| r.provider)
        .or_else(|| Some(settings.llm.provider).filter(|p| p.supports_image_generation()))
        .unwrap_or(IMAGE_FALLBACK_ORDER[0]);

    let (provider, fell_back) = if credentials.has(preferred) {
        (preferred, false)
    } else {
        let fallback = first_credentialed(&IMAGE_FALLBACK_ORDER, credentials)?;
        tracing::warn!(
            "No credential for {}, generating images with {}",
            preferred,
            fallback
        );
        (fallback, true)
    };

    let explicit = settings
        .llm
        .image_model
        .clone()
        .filter(|m| !fell_back || provider_key(m) == provider.key());
    let from_task = task_route
        .filter(|r| r.provider == provider)
        .and_then(|r| r.model.clone());
    let model = explicit.or(from_task).unwrap_or_else(|| {
        settings
            .provider_config(provider)
            .image_model()
            .map(str::to_string)
            .unwrap_or_default()
    });

    Some(Route {
        provider,
        model,
        fell_back,
    })
}

/// Vision analysis always uses the default provider. No fallback.
pub fn resolve_vision_route(settings: &Settings) -> Route {
    Route {
        provider: settings.llm.provider,
        model: settings.llm.model.clone(),
        fell_back: false,
    }
}

/// Result of an image-generation request: a stored image or an error text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ImageOutcome {
    Saved { path: PathBuf },
    Failed { error: String },
}

impl ImageOutcome {
    fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Saved { path } => Some(path),
            Self::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Saved { .. } => None,
            Self::Failed { error } => Some(error),
        }
    }
}

/// Human-readable failure detail without repeating the vendor name.
fn error_detail(e: &TollgateError) -> String {
    match e {
        TollgateError::Status { status, body, .. } => format!("HTTP {status}: {body}"),
        TollgateError::Provider { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

fn vendor_error(provider: ProviderId, e: &TollgateError) -> String {
    format!("{} error: {}", provider.name(), error_detail(e))
}

/// Routes capability requests to vendor adapters and meters what they cost.
///
/// Primary failures come back inside the result (an error string or
/// [`ImageOutcome::Failed`]). Accounting failures are logged and dropped.
pub struct ProviderRouter {
    settings: Arc<dyn SettingsStore>,
    credentials: CredentialSet,
    adapters: AdapterTable,
    content: Arc<dyn ContentStore>,
    ledger: Arc<UsageLedger>,
    session: Arc<SessionContext>,
}

impl ProviderRouter {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        credentials: CredentialSet,
        adapters: AdapterTable,
        content: Arc<dyn ContentStore>,
        ledger: Arc<UsageLedger>,
    ) -> Self {
        Self {
            settings,
            credentials,
            adapters,
            content,
            ledger,
            session: Arc::new(SessionContext::new()),
        }
    }

    /// Wire up real vendor clients, file storage and the ledger from settings.
    pub fn from_store(store: Arc<dyn SettingsStore>) -> Self {
        let settings = store.get_settings();
        let credentials = settings.credentials();
        let adapters = AdapterTable::from_credentials(
            &credentials,
            &settings.provider_configs(),
            settings.llm.max_tokens,
            RetryPolicy::default(),
        );
        let content = Arc::new(FsContentStore::new(settings.image_dir()));
        let ledger = Arc::new(UsageLedger::new(
            settings.ledger_path(),
            PricingSource::File(settings.pricing_path()),
        ));
        Self::new(store, credentials, adapters, content, ledger)
    }

    pub fn with_session(mut self, session: Arc<SessionContext>) -> Self {
        self.session = session;
        self
    }

    pub fn ledger(&self) -> &Arc<UsageLedger> {
        &self.ledger
    }

    pub fn credentials(&self) -> &CredentialSet {
        &self.credentials
    }

    /// Generate text. Never fails: errors come back as the returned text.
    pub async fn ask(&self, prompt: &str, task: &str, images: &[ImageBlob]) -> String {
        let settings = self.settings.get_settings();
        let Some(route) = resolve_chat_route(&settings, &self.credentials, task, !images.is_empty())
        else {
            return messages::NO_CREDENTIAL.to_string();
        };

        let Some(adapter) = self.adapters.chat(route.provider) else {
            return vendor_error(
                route.provider,
                &TollgateError::MissingCredential(route.provider),
            );
        };

        tracing::info!("ask: task={} -> {} / {}", task, route.provider, route.model);
        match adapter.chat(&route.model, prompt, images).await {
            Ok(completion) => {
                self.charge(route.provider, &route.model, task, completion.usage);
                completion.text
            }
            Err(e) => {
                tracing::warn!("{} chat failed: {}", route.provider, e);
                vendor_error(route.provider, &e)
            }
        }
    }

    /// Describe an image file. Failures come back as `Analysis error: ...`.
    pub async fn analyze_image(&self, image_path: &Path, prompt: &str) -> String {
        match ImageBlob::from_path(image_path).await {
            Ok(image) => self.analyze_image_blob(&image, prompt).await,
            Err(e) => format!("Analysis error: {}", error_detail(&e)),
        }
    }

    pub async fn analyze_image_blob(&self, image: &ImageBlob, prompt: &str) -> String {
        match self.try_analyze(image, prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Image analysis failed: {}", e);
                format!("Analysis error: {}", error_detail(&e))
            }
        }
    }

    async fn try_analyze(&self, image: &ImageBlob, prompt: &str) -> Result<String, TollgateError> {
        let settings = self.settings.get_settings();
        let route = resolve_vision_route(&settings);

        if !self.credentials.has(route.provider) {
            return Err(TollgateError::MissingCredential(route.provider));
        }
        let adapter = self
            .adapters
            .vision(route.provider)
            .ok_or(TollgateError::MissingCredential(route.provider))?;

        let completion = adapter.analyze(&route.model, image, prompt).await?;
        self.charge(
            route.provider,
            &route.model,
            tasks::IMAGE_ANALYSIS,
            completion.usage,
        );
        Ok(completion.text)
    }

    /// Generate an image and store it. Never fails: errors come back as
    /// [`ImageOutcome::Failed`].
    pub async fn generate_image(
        &self,
        prompt: &str,
        size: Option<&str>,
        reference_image: Option<&Path>,
    ) -> ImageOutcome {
        let reference = match reference_image {
            Some(path) => match ImageBlob::from_path(path).await {
                Ok(blob) => Some(blob),
                Err(e) => {
                    return ImageOutcome::failed(format!(
                        "Cannot read reference image {}: {}",
                        path.display(),
                        error_detail(&e)
                    ))
                }
            },
            None => None,
        };

        self.generate_image_with(ImageRequest {
            prompt: prompt.to_string(),
            size: size.map(str::to_string),
            quality: None,
            reference,
        })
        .await
    }

    pub async fn generate_image_with(&self, request: ImageRequest) -> ImageOutcome {
        let settings = self.settings.get_settings();
        let Some(route) = resolve_image_route(&settings, &self.credentials) else {
            return ImageOutcome::failed(messages::NO_CREDENTIAL);
        };
        let Some(adapter) = self.adapters.image(route.provider) else {
            return ImageOutcome::failed(vendor_error(
                route.provider,
                &TollgateError::MissingCredential(route.provider),
            ));
        };

        tracing::info!("generate_image -> {} / {}", route.provider, route.model);
        let generated = match adapter.generate(&route.model, &request).await {
            Ok(generated) => generated,
            Err(e) => {
                tracing::warn!("{} image generation failed: {}", route.provider, e);
                return ImageOutcome::failed(vendor_error(route.provider, &e));
            }
        };

        let path = match self.content.save_image(&generated.image).await {
            Ok(path) => path,
            Err(e) => return ImageOutcome::failed(error_detail(&e)),
        };

        if generated.usage.is_zero() {
            let charged = self.ledger.record_image_generation(
                route.provider.key(),
                &route.model,
                request.size.as_deref(),
                request.quality.as_deref(),
            );
            self.remember(charged);
        } else {
            self.charge(
                route.provider,
                &route.model,
                tasks::IMAGE_GENERATION,
                generated.usage,
            );
        }

        ImageOutcome::Saved { path }
    }

    /// Today's ledger entry, zeroed when empty or unreadable.
    pub fn today_usage(&self) -> DailyLedgerEntry {
        self.ledger.today_usage().unwrap_or_else(|e| {
            tracing::warn!("Cannot read usage ledger: {}", e);
            DailyLedgerEntry::default()
        })
    }

    /// Ledger entry for `date`, zeroed when empty or unreadable.
    pub fn usage_by_date(&self, date: NaiveDate) -> DailyLedgerEntry {
        self.ledger.usage_by_date(date).unwrap_or_else(|e| {
            tracing::warn!("Cannot read usage ledger: {}", e);
            DailyLedgerEntry::default()
        })
    }

    pub fn last_usage(&self) -> Option<UsageRecord> {
        self.session.last_usage()
    }

    /// Models the vendor account can use.
    pub async fn list_models(&self, provider: ProviderId) -> Result<Vec<String>, TollgateError> {
        let api_key = self
            .credentials
            .get(provider)
            .ok_or(TollgateError::MissingCredential(provider))?;
        let config = self.settings.get_settings().provider_config(provider);
        ModelDiscovery::list_models(&config, api_key).await
    }

    fn charge(&self, provider: ProviderId, model: &str, task: &str, usage: TokenUsage) {
        let charged = self.ledger.record_usage(&UsageEvent {
            provider: provider.key(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            function: task,
            model,
        });
        self.remember(charged);
    }

    fn remember(&self, charged: Result<UsageRecord, TollgateError>) {
        match charged {
            Ok(record) => self.session.set_last_usage(record),
            Err(e) => tracing::warn!("Usage accounting failed: {}", e),
        }
    }
}
