mod filter;
mod launch;
mod sync_run;

pub use filter::{
    FilterError, FilterParams, FilterSpec, SortDirection, SortField, DEFAULT_LIMIT, MAX_LIMIT,
};
pub(crate) use filter::SEARCH_COLUMNS;
pub use launch::Launch;
pub use sync_run::{SyncRun, SyncStatus, SyncType};

use chrono::{DateTime, SecondsFormat, Utc};

/// Canonical text form for stored timestamps.
///
/// Fixed precision and a `Z` suffix keep the stored strings lexicographically
/// ordered, which the time-window filters and sorts rely on.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses an RFC 3339 timestamp into UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Case folding shared by the stored shadow columns and filter values.
///
/// SQLite's `LOWER()` only folds ASCII, so both sides are folded here.
pub fn fold_text(s: &str) -> String {
    s.to_lowercase()
}
