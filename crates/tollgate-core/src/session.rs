use crate::usage::UsageRecord;
use std::sync::Mutex;

/// Per-request scratch slot holding the cost of the most recent charged call.
#[derive(Debug, Default)]
pub struct SessionContext {
    last_usage: Mutex<Option<UsageRecord>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_last_usage(&self, record: UsageRecord) {
        match self.last_usage.lock() {
            Ok(mut slot) => *slot = Some(record),
            Err(poisoned) => *poisoned.into_inner() = Some(record),
        }
    }

    pub fn last_usage(&self) -> Option<UsageRecord> {
        match self.last_usage.lock() {
            Ok(slot) => *slot,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
