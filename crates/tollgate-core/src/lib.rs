pub mod config;
pub mod constants;
pub mod error;
pub mod llm;
pub mod router;
pub mod session;
pub mod storage;
pub mod usage;

// Re-export key types
pub use config::{FileSettingsStore, MemorySettingsStore, Settings, SettingsStore, SettingsUpdate, TaskRoute};
pub use error::TollgateError;
pub use llm::{
    provider_key, AdapterTable, ChatAdapter, Completion, CredentialSet, ImageAdapter, ImageBlob,
    ImageRequest, ProviderId, TokenUsage, VisionAdapter,
};
pub use router::{ImageOutcome, ProviderRouter, Route};
pub use session::SessionContext;
pub use storage::{ContentStore, FsContentStore};
pub use usage::{DailyLedgerEntry, PricingSource, PricingTable, UsageLedger, UsageRecord};
