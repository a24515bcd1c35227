// Library interface for tollgate-cli so integration tests can reach the
// report formatting and argument parsing helpers.

#[path = "commands.rs"]
pub mod commands;

pub use commands::{
    format_last_usage, format_usage, parse_date, parse_task_override, report_currency,
};
