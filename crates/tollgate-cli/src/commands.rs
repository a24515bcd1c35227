use chrono::NaiveDate;
use tollgate_core::usage::DEFAULT_CURRENCY;
use tollgate_core::{DailyLedgerEntry, PricingSource, ProviderId, TaskRoute, UsageRecord};

/// Parse a `YYYY-MM-DD` date, or the shorthands `today` and `yesterday`.
pub fn parse_date(input: &str, today: NaiveDate) -> Result<NaiveDate, String> {
    match input.trim() {
        "today" => Ok(today),
        "yesterday" => today
            .pred_opt()
            .ok_or_else(|| "date out of range".to_string()),
        other => NaiveDate::parse_from_str(other, "%Y-%m-%d")
            .map_err(|_| format!("Invalid date '{other}', expected YYYY-MM-DD")),
    }
}

/// Parse `task=provider` or `task=provider:model`. An empty right-hand side
/// (`task=`) clears the override.
pub fn parse_task_override(input: &str) -> Result<(String, Option<TaskRoute>), String> {
    let (task, target) = input
        .split_once('=')
        .ok_or_else(|| format!("Invalid override '{input}', expected task=provider[:model]"))?;
    let task = task.trim();
    if task.is_empty() {
        return Err(format!("Missing task name in '{input}'"));
    }

    let target = target.trim();
    if target.is_empty() {
        return Ok((task.to_string(), None));
    }

    let (provider, model) = match target.split_once(':') {
        Some((p, m)) => (p, Some(m.trim())),
        None => (target, None),
    };
    let provider: ProviderId = provider.trim().parse().map_err(|e| format!("{e}"))?;
    let mut route = TaskRoute::new(provider);
    if let Some(model) = model.filter(|m| !m.is_empty()) {
        route = route.with_model(model);
    }
    Ok((task.to_string(), Some(route)))
}

/// Render one day of the ledger as a plain-text report.
pub fn format_usage(date: NaiveDate, entry: &DailyLedgerEntry, currency: &str) -> String {
    if entry.is_empty() {
        return format!("No usage recorded for {date}.");
    }

    let mut out = format!(
        "Usage for {date}\n  Total: {} in / {} out tokens, {} requests, {:.2} {currency}\n",
        entry.total.input_tokens, entry.total.output_tokens, entry.total.requests, entry.total.cost_local,
    );

    for (title, buckets) in [("By task", &entry.by_function), ("By provider", &entry.by_provider)] {
        out.push_str(&format!("  {title}:\n"));
        let mut names: Vec<&String> = buckets.keys().collect();
        names.sort();
        for name in names {
            let b = &buckets[name];
            out.push_str(&format!(
                "    {:<20} {:>10} in {:>10} out {:>10.2} {currency}\n",
                name, b.input, b.output, b.cost
            ));
        }
    }

    if entry.image_generation.count > 0 {
        out.push_str(&format!(
            "  Images generated: {} ({:.2} {currency})\n",
            entry.image_generation.count, entry.image_generation.cost_local
        ));
    }
    out
}

/// One-line summary of the cost of the last call.
pub fn format_last_usage(record: &UsageRecord, currency: &str) -> String {
    format!(
        "[{} in / {} out tokens, {:.2} {currency}]",
        record.input_tokens, record.output_tokens, record.cost_local
    )
}

/// Currency label for reports, from the pricing file when it loads.
pub fn report_currency(pricing: &PricingSource) -> String {
    match pricing.load() {
        Ok(table) => table.currency,
        Err(e) => {
            tracing::warn!("Cannot read pricing table: {}", e);
            DEFAULT_CURRENCY.to_string()
        }
    }
}
