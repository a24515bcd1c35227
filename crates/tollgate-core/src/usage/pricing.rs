use crate::error::TollgateError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Per-million-token rates for one text model, in USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRate {
    pub input: f64,
    pub output: f64,
    /// Marks the rate used for unlisted models of the same provider.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
}

impl ModelRate {
    pub fn new(input: f64, output: f64) -> Self {
        Self {
            input,
            output,
            default: false,
        }
    }

    fn as_default(mut self) -> Self {
        self.default = true;
        self
    }
}

/// Rates for one image model, in USD.
///
/// Token-reporting vendors are charged through `input`/`output`. Flows that
/// only know size and quality use `quality[quality][size]`, then
/// `sizes[size]`, then `flat`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRate {
    #[serde(default)]
    pub input: f64,
    #[serde(default)]
    pub output: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flat: Option<f64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub sizes: HashMap<String, f64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub quality: HashMap<String, HashMap<String, f64>>,
}

impl ImageRate {
    /// Per-image USD price for a size/quality pair, zero when nothing matches.
    pub fn per_image(&self, size: Option<&str>, quality: Option<&str>) -> f64 {
        if let (Some(q), Some(s)) = (quality, size) {
            if let Some(price) = self.quality.get(q).and_then(|m| m.get(s)) {
                return *price;
            }
        }
        size.and_then(|s| self.sizes.get(s).copied())
            .or(self.flat)
            .unwrap_or(0.0)
    }
}

/// Hand-editable price list, re-read on every cost computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingTable {
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_usd_to_local")]
    pub usd_to_local: f64,
    /// Provider key → model id → rates. Declaration order is kept.
    #[serde(default)]
    pub text_generation: HashMap<String, IndexMap<String, ModelRate>>,
    #[serde(default)]
    pub image_generation: HashMap<String, ImageRate>,
}

/// Currency label used when the pricing file does not name one.
pub const DEFAULT_CURRENCY: &str = "JPY";

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_usd_to_local() -> f64 {
    150.0
}

/// Result of pricing one event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricedEvent {
    pub cost_local: f64,
    /// The model is an image-generation model.
    pub is_image: bool,
}

pub fn round_cost(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl Default for PricingTable {
    fn default() -> Self {
        let mut text_generation = HashMap::new();

        let mut claude = IndexMap::new();
        claude.insert("claude-sonnet-4-5".into(), ModelRate::new(3.0, 15.0).as_default());
        claude.insert("claude-opus-4-1".into(), ModelRate::new(15.0, 75.0));
        claude.insert("claude-haiku-4-5".into(), ModelRate::new(1.0, 5.0));
        text_generation.insert("claude".to_string(), claude);

        let mut gpt = IndexMap::new();
        gpt.insert("gpt-4o".into(), ModelRate::new(2.5, 10.0).as_default());
        gpt.insert("gpt-4o-mini".into(), ModelRate::new(0.15, 0.6));
        gpt.insert("gpt-4.1".into(), ModelRate::new(2.0, 8.0));
        text_generation.insert("gpt".to_string(), gpt);

        let mut gemini = IndexMap::new();
        gemini.insert("gemini-2.5-flash".into(), ModelRate::new(0.3, 2.5).as_default());
        gemini.insert("gemini-2.5-pro".into(), ModelRate::new(1.25, 10.0));
        text_generation.insert("gemini".to_string(), gemini);

        let mut image_generation = HashMap::new();
        image_generation.insert(
            "gemini-2.5-flash-image".to_string(),
            ImageRate {
                input: 0.3,
                output: 30.0,
                flat: Some(0.039),
                ..Default::default()
            },
        );
        image_generation.insert(
            "gpt-image-1".to_string(),
            ImageRate {
                input: 5.0,
                output: 40.0,
                quality: HashMap::from([
                    (
                        "low".to_string(),
                        HashMap::from([("1024x1024".to_string(), 0.011)]),
                    ),
                    (
                        "medium".to_string(),
                        HashMap::from([("1024x1024".to_string(), 0.042)]),
                    ),
                    (
                        "high".to_string(),
                        HashMap::from([("1024x1024".to_string(), 0.167)]),
                    ),
                ]),
                flat: Some(0.042),
                ..Default::default()
            },
        );
        image_generation.insert(
            "dall-e-3".to_string(),
            ImageRate {
                flat: Some(0.04),
                sizes: HashMap::from([
                    ("1024x1024".to_string(), 0.04),
                    ("1024x1792".to_string(), 0.08),
                    ("1792x1024".to_string(), 0.08),
                ]),
                quality: HashMap::from([(
                    "hd".to_string(),
                    HashMap::from([
                        ("1024x1024".to_string(), 0.08),
                        ("1024x1792".to_string(), 0.12),
                        ("1792x1024".to_string(), 0.12),
                    ]),
                )]),
                ..Default::default()
            },
        );

        Self {
            currency: default_currency(),
            usd_to_local: default_usd_to_local(),
            text_generation,
            image_generation,
        }
    }
}

impl PricingTable {
    pub fn from_json(content: &str) -> Result<Self, TollgateError> {
        serde_json::from_str(content)
            .map_err(|e| TollgateError::Pricing(format!("Invalid pricing table: {e}")))
    }

    /// Rates for a text model: exact id, then the marked default, then the
    /// first declared model.
    pub fn text_rate(&self, provider_key: &str, model: &str) -> Option<&ModelRate> {
        let models = self.text_generation.get(provider_key)?;
        models
            .get(model)
            .or_else(|| models.values().find(|r| r.default))
            .or_else(|| models.values().next())
    }

    pub fn image_rate(&self, model: &str) -> Option<&ImageRate> {
        self.image_generation.get(model)
    }

    fn token_cost(&self, input_rate: f64, output_rate: f64, input: u64, output: u64) -> f64 {
        let input_cost = (input as f64 / 1_000_000.0) * input_rate * self.usd_to_local;
        let output_cost = (output as f64 / 1_000_000.0) * output_rate * self.usd_to_local;
        round_cost(input_cost + output_cost)
    }

    /// Price a token-count event. Unknown providers cost nothing.
    pub fn price(&self, provider_key: &str, model: &str, input: u64, output: u64) -> PricedEvent {
        if let Some(rate) = self.image_rate(model) {
            return PricedEvent {
                cost_local: self.token_cost(rate.input, rate.output, input, output),
                is_image: true,
            };
        }

        let cost_local = match self.text_rate(provider_key, model) {
            Some(rate) => self.token_cost(rate.input, rate.output, input, output),
            None => {
                tracing::debug!("No pricing for provider '{}', charging 0", provider_key);
                0.0
            }
        };
        PricedEvent {
            cost_local,
            is_image: false,
        }
    }

    /// Local-currency price of one image priced by size and quality.
    pub fn image_cost(&self, model: &str, size: Option<&str>, quality: Option<&str>) -> f64 {
        self.image_rate(model)
            .map(|rate| round_cost(rate.per_image(size, quality) * self.usd_to_local))
            .unwrap_or(0.0)
    }
}

/// Where the pricing table comes from.
#[derive(Debug, Clone)]
pub enum PricingSource {
    /// JSON file re-read on every lookup; missing file means built-in prices.
    File(PathBuf),
    Fixed(PricingTable),
}

impl PricingSource {
    pub fn load(&self) -> Result<PricingTable, TollgateError> {
        match self {
            Self::Fixed(table) => Ok(table.clone()),
            Self::File(path) => match std::fs::read_to_string(path) {
                Ok(content) => PricingTable::from_json(&content),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PricingTable::default()),
                Err(e) => Err(TollgateError::Pricing(format!(
                    "Failed to read {}: {e}",
                    path.display()
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(json: &str) -> PricingTable {
        PricingTable::from_json(json).unwrap()
    }

    #[test]
    fn test_exact_model_rate() {
        let t = table(
            r#"{"usdToLocal": 150,
                "textGeneration": {"claude": {"model-x": {"input": 3.0, "output": 15.0}}}}"#,
        );
        let priced = t.price("claude", "model-x", 1_000_000, 0);
        assert_eq!(priced.cost_local, 450.0);
        assert!(!priced.is_image);
    }

    #[test]
    fn test_marked_default_beats_declaration_order() {
        let t = table(
            r#"{"textGeneration": {"gpt": {
                "gpt-a": {"input": 1.0, "output": 1.0},
                "gpt-b": {"input": 2.0, "output": 2.0, "default": true}
            }}}"#,
        );
        assert_eq!(t.text_rate("gpt", "unknown").unwrap().input, 2.0);
    }

    #[test]
    fn test_first_declared_model_when_unmarked() {
        let t = table(
            r#"{"textGeneration": {"gpt": {
                "gpt-z": {"input": 9.0, "output": 1.0},
                "gpt-a": {"input": 1.0, "output": 1.0}
            }}}"#,
        );
        assert_eq!(t.text_rate("gpt", "unknown").unwrap().input, 9.0);
    }

    #[test]
    fn test_unknown_provider_is_free() {
        let t = PricingTable::default();
        assert_eq!(t.price("mistral", "mistral-large", 5_000_000, 5_000_000).cost_local, 0.0);
    }

    #[test]
    fn test_cost_rounds_to_two_decimals() {
        let t = table(
            r#"{"usdToLocal": 150,
                "textGeneration": {"gemini": {"g": {"input": 0.3, "output": 2.5}}}}"#,
        );
        // 1234 * 0.3e-6 * 150 + 567 * 2.5e-6 * 150 = 0.05553 + 0.212625
        assert_eq!(t.price("gemini", "g", 1234, 567).cost_local, 0.27);
    }

    #[test]
    fn test_image_model_priced_per_token() {
        let t = PricingTable::default();
        let priced = t.price("gemini", "gemini-2.5-flash-image", 0, 1_000_000);
        assert!(priced.is_image);
        assert_eq!(priced.cost_local, 4500.0);
    }

    #[test]
    fn test_image_cost_lookup_order() {
        let t = PricingTable::default();
        assert_eq!(t.image_cost("dall-e-3", Some("1024x1792"), Some("hd")), 18.0);
        assert_eq!(t.image_cost("dall-e-3", Some("1024x1792"), None), 12.0);
        assert_eq!(t.image_cost("dall-e-3", None, None), 6.0);
        assert_eq!(t.image_cost("no-such-model", None, None), 0.0);
    }

    #[test]
    fn test_missing_file_uses_builtin_prices() {
        let dir = tempfile::tempdir().unwrap();
        let source = PricingSource::File(dir.path().join("pricing.json"));
        assert_eq!(source.load().unwrap(), PricingTable::default());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pricing.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(PricingSource::File(path).load().is_err());
    }
}
