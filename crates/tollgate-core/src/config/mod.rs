use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::constants::{limits, paths};
use crate::error::TollgateError;
use crate::llm::provider::{CredentialSet, ProviderConfig, ProviderId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub llm: LlmSettings,
    /// Task label → provider/model to use for that task.
    #[serde(default)]
    pub task_overrides: HashMap<String, TaskRoute>,
    /// Per-vendor overrides of key variable, base URL and default models.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    pub provider: ProviderId,
    pub model: String,
    /// Explicit image-generation model, wins over task and vendor defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    limits::MAX_TOKENS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRoute {
    pub provider: ProviderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl TaskRoute {
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm: LlmSettings {
                provider: ProviderId::Gemini,
                model: ProviderId::Gemini.default_model().to_string(),
                image_model: None,
                max_tokens: limits::MAX_TOKENS,
            },
            task_overrides: HashMap::new(),
            providers: Vec::new(),
            storage: StorageSettings::default(),
        }
    }
}

impl Settings {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(paths::CONFIG_DIR)
            .join(paths::CONFIG_FILE)
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(paths::CONFIG_DIR)
    }

    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Read settings from `path`, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!("Ignoring invalid config {}: {}", path.display(), e),
                },
                Err(e) => tracing::warn!("Cannot read config {}: {}", path.display(), e),
            }
        }
        Self::default()
    }

    pub fn save(&self) -> Result<(), TollgateError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), TollgateError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| TollgateError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Effective connection settings for one vendor.
    pub fn provider_config(&self, id: ProviderId) -> ProviderConfig {
        self.providers
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .unwrap_or_else(|| ProviderConfig::builtin(id))
    }

    pub fn provider_configs(&self) -> Vec<ProviderConfig> {
        ProviderId::all()
            .iter()
            .map(|id| self.provider_config(*id))
            .collect()
    }

    /// Read every vendor key from the environment.
    pub fn credentials(&self) -> CredentialSet {
        CredentialSet::from_env(&self.provider_configs())
    }

    pub fn task_route(&self, task: &str) -> Option<&TaskRoute> {
        self.task_overrides.get(task)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.storage
            .ledger_path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join(paths::LEDGER_FILE))
    }

    pub fn pricing_path(&self) -> PathBuf {
        self.storage
            .pricing_path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join(paths::PRICING_FILE))
    }

    pub fn image_dir(&self) -> PathBuf {
        self.storage
            .image_dir
            .clone()
            .unwrap_or_else(|| Self::data_dir().join(paths::IMAGES_DIR))
    }
}

/// A partial settings change. Unset fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub provider: Option<ProviderId>,
    pub model: Option<String>,
    /// `Some(None)` clears the explicit image model.
    pub image_model: Option<Option<String>>,
    /// `Some(route)` sets a task override, `None` removes it.
    pub task_overrides: HashMap<String, Option<TaskRoute>>,
}

impl SettingsUpdate {
    pub fn apply(self, settings: &mut Settings) {
        if let Some(provider) = self.provider {
            settings.llm.provider = provider;
        }
        if let Some(model) = self.model {
            settings.llm.model = model;
        }
        if let Some(image_model) = self.image_model {
            settings.llm.image_model = image_model;
        }
        for (task, route) in self.task_overrides {
            match route {
                Some(route) => {
                    settings.task_overrides.insert(task, route);
                }
                None => {
                    settings.task_overrides.remove(&task);
                }
            }
        }
    }
}

/// Source of routing configuration, read once per request.
pub trait SettingsStore: Send + Sync {
    fn get_settings(&self) -> Settings;
    fn update_settings(&self, update: SettingsUpdate) -> Result<Settings, TollgateError>;
}

/// Settings kept in a TOML file and re-read on every call.
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Self {
        Self::new(Settings::config_path())
    }
}

impl SettingsStore for FileSettingsStore {
    fn get_settings(&self) -> Settings {
        Settings::load_from(&self.path)
    }

    fn update_settings(&self, update: SettingsUpdate) -> Result<Settings, TollgateError> {
        let mut settings = Settings::load_from(&self.path);
        update.apply(&mut settings);
        settings.save_to(&self.path)?;
        Ok(settings)
    }
}

/// Settings held in memory, for embedding and tests.
#[derive(Default)]
pub struct MemorySettingsStore {
    settings: RwLock<Settings>,
}

impl MemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get_settings(&self) -> Settings {
        match self.settings.read() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn update_settings(&self, update: SettingsUpdate) -> Result<Settings, TollgateError> {
        let mut guard = self
            .settings
            .write()
            .map_err(|_| TollgateError::Config("settings lock poisoned".into()))?;
        update.apply(&mut guard);
        Ok(guard.clone())
    }
}
