use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncType {
    Full,
    Incremental,
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncType::Full => write!(f, "full"),
            SyncType::Incremental => write!(f, "incremental"),
        }
    }
}

impl FromStr for SyncType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(SyncType::Full),
            "incremental" => Ok(SyncType::Incremental),
            _ => Err(format!(
                "Invalid sync type '{}'. Valid options: full, incremental",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Running,
    Success,
    Failed,
}

impl SyncStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SyncStatus::Running)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Running => write!(f, "running"),
            SyncStatus::Success => write!(f, "success"),
            SyncStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(SyncStatus::Running),
            "success" => Ok(SyncStatus::Success),
            "failed" => Ok(SyncStatus::Failed),
            _ => Err(format!("Invalid sync status '{}'", s)),
        }
    }
}

/// One execution of a full load or incremental sync, as kept in the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: Uuid,
    pub sync_type: SyncType,
    pub status: SyncStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub fetched: u64,
    pub added: u64,
    pub updated: u64,
    pub unchanged: u64,
    /// Records dropped because they failed mapping.
    pub skipped: u64,
    pub api_calls_made: u64,
    pub page_size: u32,
    /// Offset of the last page whose results were fully applied.
    pub last_offset: Option<u64>,
    /// Lower bound on `last_updated` for incremental runs.
    pub changed_since: Option<DateTime<Utc>>,
    /// Failed run whose checkpoint this run continued from.
    pub resumed_from: Option<Uuid>,
    pub error_message: Option<String>,
    /// Process currently driving the run.
    pub owner: Option<Uuid>,
    /// When the owner's claim lapses unless it is extended.
    pub lease_expires_at: Option<DateTime<Utc>>,
}

impl SyncRun {
    pub fn new(
        sync_type: SyncType,
        page_size: u32,
        changed_since: Option<DateTime<Utc>>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sync_type,
            status: SyncStatus::Running,
            started_at,
            completed_at: None,
            fetched: 0,
            added: 0,
            updated: 0,
            unchanged: 0,
            skipped: 0,
            api_calls_made: 0,
            page_size,
            last_offset: None,
            changed_since,
            resumed_from: None,
            error_message: None,
            owner: None,
            lease_expires_at: None,
        }
    }

    /// Starts a new run that picks up where a failed run's checkpoint left off.
    pub fn continuing(failed: &SyncRun, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sync_type: failed.sync_type,
            status: SyncStatus::Running,
            started_at,
            completed_at: None,
            fetched: failed.fetched,
            added: failed.added,
            updated: failed.updated,
            unchanged: failed.unchanged,
            skipped: failed.skipped,
            api_calls_made: failed.api_calls_made,
            page_size: failed.page_size,
            last_offset: failed.last_offset,
            changed_since: failed.changed_since,
            resumed_from: Some(failed.id),
            error_message: None,
            owner: None,
            lease_expires_at: None,
        }
    }

    /// Offset of the next page to fetch.
    pub fn next_offset(&self) -> u64 {
        match self.last_offset {
            Some(offset) => offset + u64::from(self.page_size),
            None => 0,
        }
    }

    /// Whether the record counters add up.
    pub fn counts_balance(&self) -> bool {
        self.fetched == self.added + self.updated + self.unchanged
    }

    /// Whether some process still holds this run at `now`.
    pub fn lease_live(&self, now: DateTime<Utc>) -> bool {
        self.lease_expires_at.is_some_and(|expires| expires >= now)
    }

    /// Whether this failed run left a checkpoint worth continuing from.
    pub fn has_checkpoint(&self) -> bool {
        self.last_offset.is_some()
    }
}

impl fmt::Display for SyncRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}] started {}",
            self.sync_type,
            self.id,
            self.status,
            self.started_at.format("%Y-%m-%d %H:%M:%S")
        )?;
        if let Some(completed) = &self.completed_at {
            write!(f, ", completed {}", completed.format("%Y-%m-%d %H:%M:%S"))?;
        }
        write!(
            f,
            "\n  fetched {} (added {}, updated {}, unchanged {}), skipped {}, api calls {}",
            self.fetched, self.added, self.updated, self.unchanged, self.skipped, self.api_calls_made
        )?;
        if let Some(offset) = self.last_offset {
            write!(f, ", checkpoint offset {}", offset)?;
        }
        if let (SyncStatus::Running, Some(expires)) = (self.status, &self.lease_expires_at) {
            write!(f, "\n  held until {}", expires.format("%Y-%m-%d %H:%M:%S"))?;
        }
        if let Some(message) = &self.error_message {
            write!(f, "\n  error: {}", message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sync_type_from_str() {
        assert_eq!(SyncType::from_str("full").unwrap(), SyncType::Full);
        assert_eq!(
            SyncType::from_str("INCREMENTAL").unwrap(),
            SyncType::Incremental
        );
        assert!(SyncType::from_str("partial").is_err());
    }

    #[test]
    fn test_sync_status_terminal() {
        assert!(!SyncStatus::Running.is_terminal());
        assert!(SyncStatus::Success.is_terminal());
        assert!(SyncStatus::Failed.is_terminal());
    }

    #[test]
    fn test_next_offset_follows_checkpoint() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut run = SyncRun::new(SyncType::Full, 100, None, now);
        assert_eq!(run.next_offset(), 0);

        run.last_offset = Some(0);
        assert_eq!(run.next_offset(), 100);

        run.last_offset = Some(300);
        assert_eq!(run.next_offset(), 400);
    }

    #[test]
    fn test_continuing_carries_progress() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let since = Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap();
        let mut failed = SyncRun::new(SyncType::Incremental, 50, Some(since), now);
        failed.status = SyncStatus::Failed;
        failed.fetched = 100;
        failed.added = 60;
        failed.updated = 40;
        failed.api_calls_made = 5;
        failed.last_offset = Some(50);
        failed.error_message = Some("throttled".to_string());

        let later = Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();
        let next = SyncRun::continuing(&failed, later);

        assert_ne!(next.id, failed.id);
        assert_eq!(next.status, SyncStatus::Running);
        assert_eq!(next.resumed_from, Some(failed.id));
        assert_eq!(next.next_offset(), 100);
        assert_eq!(next.fetched, 100);
        assert_eq!(next.changed_since, Some(since));
        assert_eq!(next.page_size, 50);
        assert!(next.error_message.is_none());
        assert!(next.counts_balance());
        assert!(next.owner.is_none());
    }

    #[test]
    fn test_lease_live() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut run = SyncRun::new(SyncType::Full, 100, None, now);
        assert!(!run.lease_live(now));

        run.owner = Some(Uuid::new_v4());
        run.lease_expires_at = Some(now + chrono::Duration::seconds(30));
        assert!(run.lease_live(now));
        assert!(run.lease_live(now + chrono::Duration::seconds(30)));
        assert!(!run.lease_live(now + chrono::Duration::seconds(31)));
    }
}
