use crate::error::TollgateError;
use crate::llm::provider_key;
use crate::usage::pricing::{round_cost, PricingSource};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const DATE_FORMAT: &str = "%Y-%m-%d";
const IMAGE_GENERATION_FUNCTION: &str = crate::constants::tasks::IMAGE_GENERATION;

/// Cost of one accounted call, handed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_local: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_local: f64,
    #[serde(default)]
    pub requests: u64,
}

/// Per-function or per-provider accumulator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageBucket {
    pub input: u64,
    pub output: u64,
    pub cost: f64,
    #[serde(default)]
    pub requests: u64,
}

impl UsageBucket {
    fn add(&mut self, record: &UsageRecord) {
        self.input += record.input_tokens;
        self.output += record.output_tokens;
        self.cost = round_cost(self.cost + record.cost_local);
        self.requests += 1;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageGenerationTotals {
    pub count: u64,
    pub cost_local: f64,
}

/// Everything charged on one calendar day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLedgerEntry {
    pub total: UsageTotals,
    #[serde(default)]
    pub by_function: HashMap<String, UsageBucket>,
    #[serde(default)]
    pub by_provider: HashMap<String, UsageBucket>,
    #[serde(default)]
    pub image_generation: ImageGenerationTotals,
}

impl DailyLedgerEntry {
    /// No call was recorded. Distinguishes "no data" from "free calls".
    pub fn is_empty(&self) -> bool {
        self.total.requests == 0
    }

    fn apply(&mut self, provider_key: &str, function: &str, record: &UsageRecord) {
        self.total.input_tokens += record.input_tokens;
        self.total.output_tokens += record.output_tokens;
        self.total.cost_local = round_cost(self.total.cost_local + record.cost_local);
        self.total.requests += 1;

        self.by_function
            .entry(function.to_string())
            .or_default()
            .add(record);
        self.by_provider
            .entry(provider_key.to_string())
            .or_default()
            .add(record);
    }

    fn add_image(&mut self, cost_local: f64) {
        self.image_generation.count += 1;
        self.image_generation.cost_local =
            round_cost(self.image_generation.cost_local + cost_local);
    }
}

/// One usage event as reported by an adapter.
#[derive(Debug, Clone)]
pub struct UsageEvent<'a> {
    /// Vendor or model name; normalised to a provider key before use.
    pub provider: &'a str,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub function: &'a str,
    pub model: &'a str,
}

/// Date-partitioned cost ledger backed by a JSON document.
///
/// The document is loaded once into memory and rewritten in full after every
/// event. All access goes through one mutex, so concurrent writers never lose
/// each other's updates.
pub struct UsageLedger {
    path: PathBuf,
    pricing: PricingSource,
    days: Mutex<Option<BTreeMap<String, DailyLedgerEntry>>>,
}

impl UsageLedger {
    pub fn new(path: impl Into<PathBuf>, pricing: PricingSource) -> Self {
        Self {
            path: path.into(),
            pricing,
            days: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record_usage(&self, event: &UsageEvent<'_>) -> Result<UsageRecord, TollgateError> {
        self.record_usage_on(today(), event)
    }

    /// Price an event and add it to the entry for `date`.
    pub fn record_usage_on(
        &self,
        date: NaiveDate,
        event: &UsageEvent<'_>,
    ) -> Result<UsageRecord, TollgateError> {
        let pricing = self.pricing.load()?;
        let key = provider_key(event.provider);
        let priced = pricing.price(&key, event.model, event.input_tokens, event.output_tokens);
        let record = UsageRecord {
            input_tokens: event.input_tokens,
            output_tokens: event.output_tokens,
            cost_local: priced.cost_local,
        };

        self.update(date, |entry| {
            entry.apply(&key, event.function, &record);
            if priced.is_image {
                entry.add_image(record.cost_local);
            }
        })?;

        tracing::debug!(
            "Recorded {} in / {} out tokens for {} ({}) = {:.2}",
            record.input_tokens,
            record.output_tokens,
            event.function,
            key,
            record.cost_local
        );
        Ok(record)
    }

    pub fn record_image_generation(
        &self,
        provider: &str,
        model: &str,
        size: Option<&str>,
        quality: Option<&str>,
    ) -> Result<UsageRecord, TollgateError> {
        self.record_image_generation_on(today(), provider, model, size, quality)
    }

    /// Charge one image priced by size/quality instead of tokens.
    pub fn record_image_generation_on(
        &self,
        date: NaiveDate,
        provider: &str,
        model: &str,
        size: Option<&str>,
        quality: Option<&str>,
    ) -> Result<UsageRecord, TollgateError> {
        let pricing = self.pricing.load()?;
        let record = UsageRecord {
            input_tokens: 0,
            output_tokens: 0,
            cost_local: pricing.image_cost(model, size, quality),
        };
        let key = provider_key(provider);

        self.update(date, |entry| {
            entry.apply(&key, IMAGE_GENERATION_FUNCTION, &record);
            entry.add_image(record.cost_local);
        })?;
        Ok(record)
    }

    pub fn today_usage(&self) -> Result<DailyLedgerEntry, TollgateError> {
        self.usage_by_date(today())
    }

    /// The entry for `date`, zeroed when nothing was recorded.
    pub fn usage_by_date(&self, date: NaiveDate) -> Result<DailyLedgerEntry, TollgateError> {
        Ok(self.entry_for(date)?.unwrap_or_default())
    }

    /// The entry for `date`, `None` when nothing was recorded.
    pub fn entry_for(&self, date: NaiveDate) -> Result<Option<DailyLedgerEntry>, TollgateError> {
        self.with_days(|days| days.get(&date_key(date)).cloned())
    }

    /// Entries between `from` and `to` inclusive, oldest first.
    pub fn usage_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<(NaiveDate, DailyLedgerEntry)>, TollgateError> {
        if from > to {
            return Ok(Vec::new());
        }
        let (from, to) = (date_key(from), date_key(to));
        self.with_days(|days| {
            days.range(from..=to)
                .filter_map(|(k, v)| {
                    NaiveDate::parse_from_str(k, DATE_FORMAT)
                        .ok()
                        .map(|d| (d, v.clone()))
                })
                .collect()
        })
    }

    fn with_days<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, DailyLedgerEntry>) -> T,
    ) -> Result<T, TollgateError> {
        let mut guard = self
            .days
            .lock()
            .map_err(|_| TollgateError::Ledger("ledger lock poisoned".into()))?;
        if guard.is_none() {
            *guard = Some(self.load()?);
        }
        match guard.as_mut() {
            Some(days) => Ok(f(days)),
            None => Err(TollgateError::Ledger("ledger not loaded".into())),
        }
    }

    fn update(
        &self,
        date: NaiveDate,
        mutate: impl FnOnce(&mut DailyLedgerEntry),
    ) -> Result<(), TollgateError> {
        self.with_days(|days| {
            let key = date_key(date);
            let mut entry = days.get(&key).cloned().unwrap_or_default();
            mutate(&mut entry);
            let previous = days.insert(key.clone(), entry);
            if let Err(e) = self.persist(days) {
                // Keep memory in step with the file.
                match previous {
                    Some(previous) => days.insert(key, previous),
                    None => days.remove(&key),
                };
                return Err(e);
            }
            Ok(())
        })?
    }

    fn load(&self) -> Result<BTreeMap<String, DailyLedgerEntry>, TollgateError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                TollgateError::Ledger(format!("Corrupt ledger {}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the whole document through a temp file so readers never see half of it.
    fn persist(&self, days: &BTreeMap<String, DailyLedgerEntry>) -> Result<(), TollgateError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(days)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::pricing::PricingTable;
    use tempfile::TempDir;

    fn ledger(dir: &TempDir) -> UsageLedger {
        let pricing = PricingTable::from_json(
            r#"{"usdToLocal": 150,
                "textGeneration": {"claude": {"model-x": {"input": 3.0, "output": 15.0}}},
                "imageGeneration": {"img-1": {"input": 1.0, "output": 2.0, "flat": 0.04}}}"#,
        )
        .unwrap();
        UsageLedger::new(dir.path().join("ledger.json"), PricingSource::Fixed(pricing))
    }

    fn event<'a>(provider: &'a str, input: u64, output: u64, function: &'a str, model: &'a str) -> UsageEvent<'a> {
        UsageEvent {
            provider,
            input_tokens: input,
            output_tokens: output,
            function,
            model,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    #[test]
    fn test_record_usage_prices_tokens() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        let record = ledger
            .record_usage_on(day(), &event("claude", 1_000_000, 0, "chat", "model-x"))
            .unwrap();
        assert_eq!(record.cost_local, 450.0);
        assert_eq!(record.input_tokens, 1_000_000);
    }

    #[test]
    fn test_repeated_events_accumulate() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        for _ in 0..2 {
            ledger
                .record_usage_on(day(), &event("claude", 1_000_000, 0, "chat", "model-x"))
                .unwrap();
        }
        let entry = ledger.usage_by_date(day()).unwrap();
        assert_eq!(entry.total.input_tokens, 2_000_000);
        assert_eq!(entry.total.cost_local, 900.0);
        assert_eq!(entry.by_function["chat"].requests, 2);
        assert_eq!(entry.by_function["chat"].input, 2_000_000);
        assert_eq!(entry.by_provider["claude"].cost, 900.0);
    }

    #[test]
    fn test_provider_names_are_normalised() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        ledger
            .record_usage_on(day(), &event("Anthropic", 1000, 1000, "chat", "model-x"))
            .unwrap();
        let entry = ledger.usage_by_date(day()).unwrap();
        assert!(entry.by_provider.contains_key("claude"));
        assert!(!entry.by_provider.contains_key("Anthropic"));
    }

    #[test]
    fn test_totals_match_breakdowns() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        ledger
            .record_usage_on(day(), &event("claude", 123_456, 7_890, "chat", "model-x"))
            .unwrap();
        ledger
            .record_usage_on(day(), &event("claude", 50_000, 2_000, "structure_generation", "other"))
            .unwrap();
        ledger
            .record_usage_on(day(), &event("mistral", 10, 10, "chat", "m"))
            .unwrap();

        let entry = ledger.usage_by_date(day()).unwrap();
        let by_function: f64 = entry.by_function.values().map(|b| b.cost).sum();
        let by_provider: f64 = entry.by_provider.values().map(|b| b.cost).sum();
        assert!((entry.total.cost_local - by_function).abs() < 0.005);
        assert!((entry.total.cost_local - by_provider).abs() < 0.005);
        assert_eq!(entry.by_provider["mistral"].cost, 0.0);
    }

    #[test]
    fn test_image_models_bump_image_count() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        ledger
            .record_usage_on(day(), &event("gemini", 0, 1_000_000, "image_generation", "img-1"))
            .unwrap();
        ledger
            .record_usage_on(day(), &event("claude", 100, 100, "chat", "model-x"))
            .unwrap();
        let entry = ledger.usage_by_date(day()).unwrap();
        assert_eq!(entry.image_generation.count, 1);
        assert_eq!(entry.image_generation.cost_local, 300.0);
    }

    #[test]
    fn test_record_image_generation_uses_flat_rate() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        let record = ledger
            .record_image_generation_on(day(), "OpenAI", "img-1", Some("1024x1024"), None)
            .unwrap();
        assert_eq!(record.cost_local, 6.0);
        let entry = ledger.usage_by_date(day()).unwrap();
        assert_eq!(entry.image_generation.count, 1);
        assert_eq!(entry.by_function["image_generation"].cost, 6.0);
        assert_eq!(entry.by_provider["gpt"].cost, 6.0);
        assert_eq!(entry.total.cost_local, 6.0);
    }

    #[test]
    fn test_unknown_date_is_zeroed() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        let entry = ledger.usage_by_date(day()).unwrap();
        assert_eq!(entry, DailyLedgerEntry::default());
        assert!(entry.is_empty());
        assert!(ledger.entry_for(day()).unwrap().is_none());
    }

    #[test]
    fn test_ledger_survives_reopen() {
        let dir = TempDir::new().unwrap();
        ledger(&dir)
            .record_usage_on(day(), &event("claude", 1_000_000, 0, "chat", "model-x"))
            .unwrap();

        let reopened = ledger(&dir);
        let entry = reopened.usage_by_date(day()).unwrap();
        assert_eq!(entry.total.cost_local, 450.0);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(reopened.path()).unwrap()).unwrap();
        assert_eq!(raw["2026-03-14"]["total"]["costLocal"], 450.0);
        assert_eq!(raw["2026-03-14"]["byFunction"]["chat"]["input"], 1_000_000);
    }

    #[test]
    fn test_corrupt_ledger_is_left_untouched() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        std::fs::write(ledger.path(), "{ broken").unwrap();

        let result = ledger.record_usage_on(day(), &event("claude", 1, 1, "chat", "model-x"));
        assert!(matches!(result, Err(TollgateError::Ledger(_))));
        assert_eq!(std::fs::read_to_string(ledger.path()).unwrap(), "{ broken");
    }

    #[test]
    fn test_failed_write_is_not_kept_in_memory() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        ledger
            .record_usage_on(day(), &event("claude", 1_000_000, 0, "chat", "model-x"))
            .unwrap();

        // A directory in place of the temp file makes the next write fail.
        let blocker = ledger.path().with_extension("json.tmp");
        std::fs::create_dir(&blocker).unwrap();
        assert!(ledger
            .record_usage_on(day(), &event("claude", 1_000_000, 0, "chat", "model-x"))
            .is_err());
        assert!(ledger
            .record_usage_on(day() + chrono::Days::new(1), &event("claude", 5, 5, "chat", "model-x"))
            .is_err());

        let entry = ledger.usage_by_date(day()).unwrap();
        assert_eq!(entry.total.requests, 1);
        assert_eq!(entry.total.cost_local, 450.0);
        assert!(ledger.entry_for(day() + chrono::Days::new(1)).unwrap().is_none());

        std::fs::remove_dir(&blocker).unwrap();
        ledger
            .record_usage_on(day(), &event("claude", 1_000_000, 0, "chat", "model-x"))
            .unwrap();
        let reopened = UsageLedger::new(
            ledger.path().to_path_buf(),
            PricingSource::Fixed(PricingTable::default()),
        );
        let entry = reopened.usage_by_date(day()).unwrap();
        assert_eq!(entry.total.requests, 2);
        assert_eq!(entry.total.cost_local, 900.0);
    }

    #[test]
    fn test_usage_range_is_inclusive() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        for d in [10, 12, 20] {
            let date = NaiveDate::from_ymd_opt(2026, 3, d).unwrap();
            ledger
                .record_usage_on(date, &event("claude", 1, 1, "chat", "model-x"))
                .unwrap();
        }
        let range = ledger
            .usage_range(
                NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
                NaiveDate::from_ymd_opt(2026, 3, 12).unwrap(),
            )
            .unwrap();
        assert_eq!(range.len(), 2);
        assert_eq!(range[0].0, NaiveDate::from_ymd_opt(2026, 3, 10).unwrap());
    }

    #[test]
    fn test_concurrent_writers_do_not_lose_updates() {
        let dir = TempDir::new().unwrap();
        let ledger = std::sync::Arc::new(ledger(&dir));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        ledger
                            .record_usage_on(day(), &event("claude", 10, 0, "chat", "model-x"))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let entry = ledger.usage_by_date(day()).unwrap();
        assert_eq!(entry.total.requests, 40);
        assert_eq!(entry.total.input_tokens, 400);
    }
}
