pub mod ledger;
pub mod pricing;

pub use ledger::{
    DailyLedgerEntry, ImageGenerationTotals, UsageBucket, UsageEvent, UsageLedger, UsageRecord,
    UsageTotals,
};
pub use pricing::{
    ImageRate, ModelRate, PricedEvent, PricingSource, PricingTable, DEFAULT_CURRENCY,
};
