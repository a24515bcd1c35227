//! Shared constants for routing, vendors and storage.
//! Vendor endpoints, default models, timeouts and file locations live here.

// ─── Models ───────────────────────────────────────────────────────────────────

pub mod models {
    pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
    pub const DEFAULT_CLAUDE_MODEL: &str = "claude-sonnet-4-5";
    pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

    pub const DEFAULT_OPENAI_IMAGE_MODEL: &str = "gpt-image-1";
    pub const DEFAULT_GEMINI_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
}

// ─── API Endpoints ────────────────────────────────────────────────────────────

pub mod endpoints {
    pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
    pub const CLAUDE_BASE_URL: &str = "https://api.anthropic.com";
    pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

    pub const ANTHROPIC_VERSION: &str = "2023-06-01";
}

// ─── Task labels ──────────────────────────────────────────────────────────────

pub mod tasks {
    pub const CHAT: &str = "chat";
    pub const IMAGE_ANALYSIS: &str = "image_analysis";
    pub const IMAGE_GENERATION: &str = "image_generation";
    pub const STRUCTURE_GENERATION: &str = "structure_generation";

    /// Override key consulted for chat requests that carry images.
    pub const IMAGE_ANALYSIS_PROVIDER: &str = "image_analysis_provider";
}

// ─── Network ──────────────────────────────────────────────────────────────────

pub mod limits {
    pub const GENERATION_TIMEOUT_SECS: u64 = 120;
    pub const METADATA_TIMEOUT_SECS: u64 = 30;
    pub const RETRY_ATTEMPTS: u32 = 3;
    pub const RETRY_DELAY_MS: u64 = 2_000;
    pub const MAX_TOKENS: u32 = 4096;
}

// ─── Messages ─────────────────────────────────────────────────────────────────

pub mod messages {
    pub const NO_CREDENTIAL: &str = "Error: no API credential configured. Check settings.";
}

// ─── Config Paths ─────────────────────────────────────────────────────────────

pub mod paths {
    pub const CONFIG_DIR: &str = "tollgate";
    pub const CONFIG_FILE: &str = "config.toml";
    pub const LEDGER_FILE: &str = "usage_ledger.json";
    pub const PRICING_FILE: &str = "pricing.json";
    pub const IMAGES_DIR: &str = "images";
}
