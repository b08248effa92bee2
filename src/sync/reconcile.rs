//! Mapping raw payloads into launches and classifying them against the store.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::db::LaunchRepository;
use crate::models::{parse_timestamp, Launch, SyncRun};
use crate::source::payload::RawLaunch;

/// A payload that could not be turned into a launch.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingError {
    MissingField(&'static str),
    InvalidTimestamp { field: &'static str, value: String },
    Schema(String),
}

impl std::fmt::Display for MappingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MappingError::MissingField(field) => write!(f, "Missing required field '{}'", field),
            MappingError::InvalidTimestamp { field, value } => {
                write!(f, "Invalid timestamp in '{}': '{}'", field, value)
            }
            MappingError::Schema(e) => write!(f, "Unexpected payload shape: {}", e),
        }
    }
}

impl std::error::Error for MappingError {}

/// Maps one raw payload into a launch.
///
/// Absent fields become `None`. A missing or empty `id`, a missing
/// `last_updated`, or any timestamp that is present but unparseable fails the
/// whole record.
pub fn map_to_record(payload: &Value) -> Result<Launch, MappingError> {
    let raw = RawLaunch::deserialize(payload).map_err(|e| MappingError::Schema(e.to_string()))?;

    let id = raw
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or(MappingError::MissingField("id"))?;
    let last_updated = raw
        .last_updated
        .ok_or(MappingError::MissingField("last_updated"))?;
    let change_timestamp = required_timestamp("last_updated", &last_updated)?;

    let mut launch = Launch::new(id, change_timestamp);
    launch.name = raw.name;
    launch.net = optional_timestamp("net", raw.net)?;
    launch.window_start = optional_timestamp("window_start", raw.window_start)?;
    launch.window_end = optional_timestamp("window_end", raw.window_end)?;
    launch.status = raw.status.and_then(|s| s.abbrev);

    if let Some(provider) = raw.launch_service_provider {
        launch.provider = provider.name;
        launch.provider_type = provider.kind;
    }

    launch.rocket = raw
        .rocket
        .and_then(|r| r.configuration)
        .and_then(|c| c.full_name.or(c.name));

    if let Some(mission) = raw.mission {
        launch.mission = mission.name;
        launch.mission_type = mission.kind;
        launch.mission_description = mission.description;
        launch.orbit = mission.orbit.and_then(|o| o.abbrev);
    }

    if let Some(pad) = raw.pad {
        launch.pad = pad.name;
        if let Some(location) = pad.location {
            launch.location = location.name;
            launch.country = location.country_code;
        }
    }

    launch.probability = raw.probability;
    launch.webcast_live = raw.webcast_live;
    launch.image_url = raw.image;

    Ok(launch)
}

fn required_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, MappingError> {
    parse_timestamp(value).ok_or_else(|| MappingError::InvalidTimestamp {
        field,
        value: value.to_string(),
    })
}

fn optional_timestamp(
    field: &'static str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, MappingError> {
    value.map(|v| required_timestamp(field, &v)).transpose()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Added,
    Updated,
    Unchanged,
}

/// Classifies a mapped launch given the stored version marker for its id.
pub fn classify(stored: Option<DateTime<Utc>>, launch: &Launch) -> Classification {
    match stored {
        None => Classification::Added,
        Some(ts) if ts == launch.change_timestamp => Classification::Unchanged,
        Some(_) => Classification::Updated,
    }
}

/// Counts for one reconciled page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageTally {
    pub fetched: u64,
    pub added: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub skipped: u64,
}

impl PageTally {
    fn record(&mut self, classification: Classification) {
        self.fetched += 1;
        match classification {
            Classification::Added => self.added += 1,
            Classification::Updated => self.updated += 1,
            Classification::Unchanged => self.unchanged += 1,
        }
    }

    /// Adds this page's counts to a run's running totals.
    pub fn apply_to(&self, run: &mut SyncRun) {
        run.fetched += self.fetched;
        run.added += self.added;
        run.updated += self.updated;
        run.unchanged += self.unchanged;
        run.skipped += self.skipped;
    }
}

#[derive(Clone)]
pub struct Reconciler {
    launches: LaunchRepository,
}

impl Reconciler {
    pub fn new(launches: LaunchRepository) -> Self {
        Self { launches }
    }

    /// Classifies a launch and writes it unless it is unchanged.
    pub async fn reconcile(&self, launch: &Launch) -> Result<Classification, sqlx::Error> {
        let stored = self.launches.change_timestamp(&launch.id).await?;
        let classification = classify(stored, launch);
        if classification != Classification::Unchanged {
            self.launches.upsert(launch).await?;
        }
        Ok(classification)
    }

    /// Reconciles every payload of a page.
    ///
    /// Payloads that fail mapping are logged and counted as skipped; a store
    /// failure aborts the page.
    pub async fn reconcile_page(&self, payloads: &[Value]) -> Result<PageTally, sqlx::Error> {
        let mut tally = PageTally::default();

        for payload in payloads {
            let launch = match map_to_record(payload) {
                Ok(launch) => launch,
                Err(e) => {
                    let id = payload.get("id").and_then(Value::as_str).unwrap_or("?");
                    warn!(launch_id = %id, error = %e, "Skipping launch that failed mapping");
                    tally.skipped += 1;
                    continue;
                }
            };
            let classification = self.reconcile(&launch).await?;
            tally.record(classification);
        }

        Ok(tally)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_pool;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    struct TestContext {
        reconciler: Reconciler,
        launches: LaunchRepository,
        _temp_dir: TempDir,
    }

    async fn setup() -> TestContext {
        let (pool, temp_dir) = temp_pool().await;
        let launches = LaunchRepository::new(pool);
        TestContext {
            reconciler: Reconciler::new(launches.clone()),
            launches,
            _temp_dir: temp_dir,
        }
    }

    fn full_payload() -> Value {
        json!({
            "id": "e3df2ecd-c239-472f-95e4-2b89b4f75800",
            "name": "Falcon 9 Block 5 | Starlink Group 6-1",
            "last_updated": "2024-04-02T10:15:00Z",
            "net": "2024-04-10T08:00:00Z",
            "window_start": "2024-04-10T08:00:00Z",
            "window_end": "2024-04-10T12:00:00+02:00",
            "status": { "id": 1, "name": "Go for Launch", "abbrev": "Go" },
            "launch_service_provider": { "name": "SpaceX", "type": "Commercial" },
            "rocket": { "configuration": { "name": "Falcon 9", "full_name": "Falcon 9 Block 5" } },
            "mission": {
                "name": "Starlink Group 6-1",
                "type": "Communications",
                "description": "Batch of Starlink satellites.",
                "orbit": { "name": "Low Earth Orbit", "abbrev": "LEO" }
            },
            "pad": {
                "name": "Space Launch Complex 40",
                "location": { "name": "Cape Canaveral, FL, USA", "country_code": "USA" }
            },
            "probability": 90,
            "webcast_live": false,
            "image": "https://example.com/f9.png"
        })
    }

    #[test]
    fn test_map_full_payload() {
        let launch = map_to_record(&full_payload()).unwrap();

        assert_eq!(launch.id, "e3df2ecd-c239-472f-95e4-2b89b4f75800");
        assert_eq!(launch.status.as_deref(), Some("Go"));
        assert_eq!(launch.provider.as_deref(), Some("SpaceX"));
        assert_eq!(launch.provider_type.as_deref(), Some("Commercial"));
        assert_eq!(launch.rocket.as_deref(), Some("Falcon 9 Block 5"));
        assert_eq!(launch.mission_type.as_deref(), Some("Communications"));
        assert_eq!(launch.orbit.as_deref(), Some("LEO"));
        assert_eq!(launch.location.as_deref(), Some("Cape Canaveral, FL, USA"));
        assert_eq!(launch.country.as_deref(), Some("USA"));
        assert_eq!(launch.probability, Some(90));
        assert_eq!(launch.webcast_live, Some(false));
        assert_eq!(
            launch.window_end,
            Some(Utc.with_ymd_and_hms(2024, 4, 10, 10, 0, 0).unwrap())
        );
        assert_eq!(
            launch.change_timestamp,
            Utc.with_ymd_and_hms(2024, 4, 2, 10, 15, 0).unwrap()
        );
    }

    #[test]
    fn test_map_minimal_payload_defaults_to_none() {
        let launch =
            map_to_record(&json!({ "id": "x", "last_updated": "2024-01-01T00:00:00Z" })).unwrap();
        assert!(launch.name.is_none());
        assert!(launch.net.is_none());
        assert!(launch.provider.is_none());
        // false is kept, not treated as absent
        let launch = map_to_record(&json!({
            "id": "x",
            "last_updated": "2024-01-01T00:00:00Z",
            "webcast_live": false,
            "probability": 0
        }))
        .unwrap();
        assert_eq!(launch.webcast_live, Some(false));
        assert_eq!(launch.probability, Some(0));
    }

    #[test]
    fn test_rocket_falls_back_to_short_name() {
        let launch = map_to_record(&json!({
            "id": "x",
            "last_updated": "2024-01-01T00:00:00Z",
            "rocket": { "configuration": { "name": "Electron" } }
        }))
        .unwrap();
        assert_eq!(launch.rocket.as_deref(), Some("Electron"));
    }

    #[test]
    fn test_map_rejects_invalid_payloads() {
        assert_eq!(
            map_to_record(&json!({ "last_updated": "2024-01-01T00:00:00Z" })),
            Err(MappingError::MissingField("id"))
        );
        assert_eq!(
            map_to_record(&json!({ "id": "  ", "last_updated": "2024-01-01T00:00:00Z" })),
            Err(MappingError::MissingField("id"))
        );
        assert_eq!(
            map_to_record(&json!({ "id": "x" })),
            Err(MappingError::MissingField("last_updated"))
        );
        assert_eq!(
            map_to_record(&json!({
                "id": "x",
                "last_updated": "2024-01-01T00:00:00Z",
                "net": "soon"
            })),
            Err(MappingError::InvalidTimestamp {
                field: "net",
                value: "soon".to_string()
            })
        );
        assert!(matches!(
            map_to_record(&json!({ "id": 42, "last_updated": "2024-01-01T00:00:00Z" })),
            Err(MappingError::Schema(_))
        ));
        assert!(matches!(
            map_to_record(&json!("not an object")),
            Err(MappingError::Schema(_))
        ));
    }

    #[test]
    fn test_classify() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let launch = Launch::new("x", ts);

        assert_eq!(classify(None, &launch), Classification::Added);
        assert_eq!(classify(Some(ts), &launch), Classification::Unchanged);
        assert_eq!(
            classify(Some(ts - chrono::Duration::seconds(1)), &launch),
            Classification::Updated
        );
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let ctx = setup().await;
        let launch = map_to_record(&full_payload()).unwrap();

        assert_eq!(
            ctx.reconciler.reconcile(&launch).await.unwrap(),
            Classification::Added
        );
        let stored = ctx.launches.get_by_id(&launch.id).await.unwrap().unwrap();

        assert_eq!(
            ctx.reconciler.reconcile(&launch).await.unwrap(),
            Classification::Unchanged
        );
        let again = ctx.launches.get_by_id(&launch.id).await.unwrap().unwrap();
        assert_eq!(stored, again);
        assert_eq!(ctx.launches.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_newer_change_timestamp_replaces_all_fields() {
        let ctx = setup().await;
        let original = map_to_record(&full_payload()).unwrap();
        ctx.reconciler.reconcile(&original).await.unwrap();

        let mut payload = full_payload();
        payload["last_updated"] = json!("2024-04-03T10:15:00Z");
        payload["mission"] = Value::Null;
        let newer = map_to_record(&payload).unwrap();

        assert_eq!(
            ctx.reconciler.reconcile(&newer).await.unwrap(),
            Classification::Updated
        );
        let stored = ctx.launches.get_by_id(&newer.id).await.unwrap().unwrap();
        assert!(stored.mission.is_none());
        assert!(stored.orbit.is_none());
        assert_eq!(stored.change_timestamp, newer.change_timestamp);
    }

    #[tokio::test]
    async fn test_reconcile_page_skips_bad_records() {
        let ctx = setup().await;
        let payloads = vec![
            full_payload(),
            json!({ "name": "no id", "last_updated": "2024-01-01T00:00:00Z" }),
            json!({ "id": "y", "last_updated": "2024-01-01T00:00:00Z" }),
        ];

        let tally = ctx.reconciler.reconcile_page(&payloads).await.unwrap();
        assert_eq!(
            tally,
            PageTally {
                fetched: 2,
                added: 2,
                updated: 0,
                unchanged: 0,
                skipped: 1
            }
        );

        let tally = ctx.reconciler.reconcile_page(&payloads).await.unwrap();
        assert_eq!(tally.unchanged, 2);
        assert_eq!(tally.skipped, 1);
    }
}
