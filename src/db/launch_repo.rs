use chrono::{DateTime, Utc};
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::models::{fold_text, format_timestamp, parse_timestamp, FilterSpec, Launch};
use crate::query::compile;

/// Result of a single upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// True when no row existed for the id before the write.
    pub created: bool,
}

#[derive(Clone)]
pub struct LaunchRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct LaunchRow {
    id: String,
    name: Option<String>,
    status: Option<String>,
    net: Option<String>,
    window_start: Option<String>,
    window_end: Option<String>,
    provider: Option<String>,
    provider_type: Option<String>,
    rocket: Option<String>,
    mission: Option<String>,
    mission_type: Option<String>,
    mission_description: Option<String>,
    orbit: Option<String>,
    pad: Option<String>,
    location: Option<String>,
    country: Option<String>,
    probability: Option<i64>,
    webcast_live: Option<bool>,
    image_url: Option<String>,
    change_timestamp: String,
}

impl LaunchRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts the launch or replaces every column of the existing row.
    ///
    /// The transaction opens with a write so it holds the write lock from the
    /// start instead of upgrading a read snapshot.
    pub async fn upsert(&self, launch: &Launch) -> Result<UpsertOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let inserted = bind_launch(sqlx::query(
            r#"
            INSERT INTO launches (
                id, name, status, net, window_start, window_end, provider, provider_type,
                rocket, mission, mission_type, mission_description, orbit, pad, location,
                country, probability, webcast_live, image_url, change_timestamp,
                name_folded, provider_folded, rocket_folded, mission_folded, pad_folded,
                location_folded
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        ), launch)
        .execute(&mut *tx)
        .await?;

        let created = inserted.rows_affected() == 1;
        if !created {
            bind_launch(sqlx::query(
                r#"
                UPDATE launches SET
                    id = ?, name = ?, status = ?, net = ?, window_start = ?, window_end = ?,
                    provider = ?, provider_type = ?, rocket = ?, mission = ?, mission_type = ?,
                    mission_description = ?, orbit = ?, pad = ?, location = ?, country = ?,
                    probability = ?, webcast_live = ?, image_url = ?, change_timestamp = ?,
                    name_folded = ?, provider_folded = ?, rocket_folded = ?,
                    mission_folded = ?, pad_folded = ?, location_folded = ?
                WHERE id = ?
                "#,
            ), launch)
            .bind(&launch.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(UpsertOutcome { created })
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Launch>, sqlx::Error> {
        let row: Option<LaunchRow> = sqlx::query_as("SELECT * FROM launches WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(hydrate_launch).transpose()
    }

    /// Stored version marker for `id`, if the launch is known.
    pub async fn change_timestamp(&self, id: &str) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT change_timestamp FROM launches WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(ts,)| decode_timestamp("change_timestamp", &ts))
            .transpose()
    }

    /// Returns one page of matching launches and the total number of matches.
    ///
    /// Both reads run inside one transaction so they see the same snapshot.
    pub async fn query(&self, spec: &FilterSpec) -> Result<(Vec<Launch>, u64), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let mut count: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM launches");
        compile::push_predicates(&mut count, spec);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&mut *tx)
            .await?;

        let mut select: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM launches");
        compile::push_predicates(&mut select, spec);
        compile::push_order(&mut select, spec);
        compile::push_page(&mut select, spec);
        let rows = select
            .build_query_as::<LaunchRow>()
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        let launches = rows
            .into_iter()
            .map(hydrate_launch)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((launches, total.max(0) as u64))
    }

    pub async fn count(&self) -> Result<u64, sqlx::Error> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM launches")
            .fetch_one(&self.pool)
            .await?;
        Ok(total.max(0) as u64)
    }
}

/// Binds every stored column, the folded text copies last.
fn bind_launch<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    launch: &'q Launch,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    let folded = |value: &Option<String>| value.as_deref().map(fold_text);

    query
        .bind(&launch.id)
        .bind(&launch.name)
        .bind(&launch.status)
        .bind(launch.net.as_ref().map(format_timestamp))
        .bind(launch.window_start.as_ref().map(format_timestamp))
        .bind(launch.window_end.as_ref().map(format_timestamp))
        .bind(&launch.provider)
        .bind(&launch.provider_type)
        .bind(&launch.rocket)
        .bind(&launch.mission)
        .bind(&launch.mission_type)
        .bind(&launch.mission_description)
        .bind(&launch.orbit)
        .bind(&launch.pad)
        .bind(&launch.location)
        .bind(&launch.country)
        .bind(launch.probability)
        .bind(launch.webcast_live)
        .bind(&launch.image_url)
        .bind(format_timestamp(&launch.change_timestamp))
        .bind(folded(&launch.name))
        .bind(folded(&launch.provider))
        .bind(folded(&launch.rocket))
        .bind(folded(&launch.mission))
        .bind(folded(&launch.pad))
        .bind(folded(&launch.location))
}

fn decode_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    parse_timestamp(value).ok_or_else(|| {
        sqlx::Error::Decode(format!("invalid timestamp in {}: '{}'", column, value).into())
    })
}

fn decode_optional(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    value.map(|v| decode_timestamp(column, &v)).transpose()
}

fn hydrate_launch(row: LaunchRow) -> Result<Launch, sqlx::Error> {
    Ok(Launch {
        net: decode_optional("net", row.net)?,
        window_start: decode_optional("window_start", row.window_start)?,
        window_end: decode_optional("window_end", row.window_end)?,
        change_timestamp: decode_timestamp("change_timestamp", &row.change_timestamp)?,
        id: row.id,
        name: row.name,
        status: row.status,
        provider: row.provider,
        provider_type: row.provider_type,
        rocket: row.rocket,
        mission: row.mission,
        mission_type: row.mission_type,
        mission_description: row.mission_description,
        orbit: row.orbit,
        pad: row.pad,
        location: row.location,
        country: row.country,
        probability: row.probability,
        webcast_live: row.webcast_live,
        image_url: row.image_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_pool;
    use chrono::TimeZone;
    use tempfile::TempDir;

    struct TestContext {
        repo: LaunchRepository,
        _temp_dir: TempDir, // Keep alive for duration of test
    }

    async fn setup_repo() -> TestContext {
        let (pool, temp_dir) = temp_pool().await;
        TestContext {
            repo: LaunchRepository::new(pool),
            _temp_dir: temp_dir,
        }
    }

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, day, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_and_get_launch() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let mut launch = Launch::new("l-1", ts(1))
            .with_name("Electron | Return to Sender")
            .with_provider("Rocket Lab")
            .with_net(ts(20))
            .with_country("NZL");
        launch.probability = Some(80);
        launch.webcast_live = Some(false);

        let outcome = repo.upsert(&launch).await.unwrap();
        assert!(outcome.created);

        let fetched = repo.get_by_id("l-1").await.unwrap().unwrap();
        assert_eq!(fetched, launch);
    }

    #[tokio::test]
    async fn test_get_missing_launch() {
        let ctx = setup_repo().await;
        assert!(ctx.repo.get_by_id("nope").await.unwrap().is_none());
        assert!(ctx.repo.change_timestamp("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_all_attributes() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let original = Launch::new("l-1", ts(1))
            .with_name("Original")
            .with_provider("Acme")
            .with_country("USA");
        repo.upsert(&original).await.unwrap();

        // The replacement drops provider and country entirely
        let replacement = Launch::new("l-1", ts(2)).with_name("Renamed");
        let outcome = repo.upsert(&replacement).await.unwrap();
        assert!(!outcome.created);

        let fetched = repo.get_by_id("l-1").await.unwrap().unwrap();
        assert_eq!(fetched.name.as_deref(), Some("Renamed"));
        assert!(fetched.provider.is_none());
        assert!(fetched.country.is_none());
        assert_eq!(fetched.change_timestamp, ts(2));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_same_record_twice_is_stable() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let launch = Launch::new("l-1", ts(1)).with_name("Same");
        assert!(repo.upsert(&launch).await.unwrap().created);
        assert!(!repo.upsert(&launch).await.unwrap().created);

        assert_eq!(repo.get_by_id("l-1").await.unwrap().unwrap(), launch);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_change_timestamp_lookup() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        repo.upsert(&Launch::new("l-1", ts(3))).await.unwrap();
        assert_eq!(repo.change_timestamp("l-1").await.unwrap(), Some(ts(3)));
    }
}
