use chrono::NaiveDate;
use tempfile::TempDir;
use tollgate_cli::commands::{
    format_last_usage, format_usage, parse_date, parse_task_override, report_currency,
};
use tollgate_core::usage::{UsageBucket, UsageTotals, DEFAULT_CURRENCY};
use tollgate_core::{DailyLedgerEntry, PricingSource, ProviderId, UsageRecord};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ========================================================================
// Date parsing
// ========================================================================

#[test]
fn test_parse_date_shorthands() {
    let today = day(2024, 3, 1);
    assert_eq!(parse_date("today", today).unwrap(), today);
    assert_eq!(parse_date("yesterday", today).unwrap(), day(2024, 2, 29));
}

#[test]
fn test_parse_date_iso() {
    assert_eq!(parse_date("2023-12-31", day(2024, 1, 1)).unwrap(), day(2023, 12, 31));
}

#[test]
fn test_parse_date_rejects_garbage() {
    let err = parse_date("31/12/2023", day(2024, 1, 1)).unwrap_err();
    assert!(err.contains("YYYY-MM-DD"));
}

// ========================================================================
// Route overrides
// ========================================================================

#[test]
fn test_parse_override_with_model() {
    let (task, route) = parse_task_override("structure_generation=claude:claude-opus-4-1").unwrap();
    assert_eq!(task, "structure_generation");
    let route = route.unwrap();
    assert_eq!(route.provider, ProviderId::Claude);
    assert_eq!(route.model.as_deref(), Some("claude-opus-4-1"));
}

#[test]
fn test_parse_override_provider_alias() {
    let (_, route) = parse_task_override("image_analysis_provider=gpt").unwrap();
    let route = route.unwrap();
    assert_eq!(route.provider, ProviderId::OpenAI);
    assert!(route.model.is_none());
}

#[test]
fn test_parse_override_clear() {
    let (task, route) = parse_task_override("chat=").unwrap();
    assert_eq!(task, "chat");
    assert!(route.is_none());
}

#[test]
fn test_parse_override_errors() {
    assert!(parse_task_override("chat").is_err());
    assert!(parse_task_override("=gemini").is_err());
    assert!(parse_task_override("chat=mistral").unwrap_err().contains("mistral"));
}

// ========================================================================
// Reports
// ========================================================================

#[test]
fn test_empty_day_report() {
    let report = format_usage(day(2024, 5, 1), &DailyLedgerEntry::default(), "JPY");
    assert_eq!(report, "No usage recorded for 2024-05-01.");
}

#[test]
fn test_usage_report_lists_buckets() {
    let mut entry = DailyLedgerEntry {
        total: UsageTotals {
            input_tokens: 1500,
            output_tokens: 300,
            cost_local: 12.5,
            requests: 2,
        },
        ..Default::default()
    };
    entry.by_function.insert(
        "chat".into(),
        UsageBucket {
            input: 1500,
            output: 300,
            cost: 12.5,
            requests: 2,
        },
    );
    entry.by_provider.insert(
        "gpt".into(),
        UsageBucket {
            input: 1500,
            output: 300,
            cost: 12.5,
            requests: 2,
        },
    );

    let report = format_usage(day(2024, 5, 1), &entry, "JPY");
    assert!(report.starts_with("Usage for 2024-05-01"));
    assert!(report.contains("2 requests, 12.50 JPY"));
    assert!(report.contains("By task:"));
    assert!(report.contains("chat"));
    assert!(report.contains("gpt"));
    assert!(!report.contains("Images generated"));
}

#[test]
fn test_usage_report_shows_images() {
    let mut entry = DailyLedgerEntry::default();
    entry.total.requests = 1;
    entry.total.cost_local = 6.0;
    entry.image_generation.count = 1;
    entry.image_generation.cost_local = 6.0;
    let report = format_usage(day(2024, 5, 1), &entry, "JPY");
    assert!(report.contains("Images generated: 1 (6.00 JPY)"));
}

#[test]
fn test_last_usage_line() {
    let record = UsageRecord {
        input_tokens: 10,
        output_tokens: 20,
        cost_local: 0.456,
    };
    assert_eq!(
        format_last_usage(&record, "USD"),
        "[10 in / 20 out tokens, 0.46 USD]"
    );
}

// ========================================================================
// Currency
// ========================================================================

#[test]
fn test_currency_from_pricing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pricing.json");
    std::fs::write(&path, r#"{"currency": "EUR", "usdToLocal": 0.92}"#).unwrap();
    assert_eq!(report_currency(&PricingSource::File(path)), "EUR");
}

#[test]
fn test_currency_defaults_when_pricing_missing_or_broken() {
    let dir = TempDir::new().unwrap();
    let missing = PricingSource::File(dir.path().join("absent.json"));
    assert_eq!(report_currency(&missing), DEFAULT_CURRENCY);

    let broken = dir.path().join("pricing.json");
    std::fs::write(&broken, "{ not json").unwrap();
    assert_eq!(report_currency(&PricingSource::File(broken)), DEFAULT_CURRENCY);
}
