use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{format_timestamp, parse_timestamp, SyncRun, SyncStatus, SyncType};

/// Journal of sync runs.
#[derive(Clone)]
pub struct SyncRunRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct SyncRunRow {
    id: String,
    sync_type: String,
    status: String,
    started_at: String,
    completed_at: Option<String>,
    fetched: i64,
    added: i64,
    updated: i64,
    unchanged: i64,
    skipped: i64,
    api_calls_made: i64,
    page_size: i64,
    last_offset: Option<i64>,
    changed_since: Option<String>,
    resumed_from: Option<String>,
    error_message: Option<String>,
    owner: Option<String>,
    lease_expires_at: Option<String>,
}

impl SyncRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Records a new running run.
    ///
    /// Fails with a unique-constraint violation if another run is already
    /// running.
    pub async fn create(&self, run: &SyncRun) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO sync_runs (
                id, sync_type, status, started_at, completed_at, fetched, added, updated,
                unchanged, skipped, api_calls_made, page_size, last_offset, changed_since,
                resumed_from, error_message, owner, lease_expires_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.id.to_string())
        .bind(run.sync_type.to_string())
        .bind(run.status.to_string())
        .bind(format_timestamp(&run.started_at))
        .bind(run.completed_at.as_ref().map(format_timestamp))
        .bind(run.fetched as i64)
        .bind(run.added as i64)
        .bind(run.updated as i64)
        .bind(run.unchanged as i64)
        .bind(run.skipped as i64)
        .bind(run.api_calls_made as i64)
        .bind(i64::from(run.page_size))
        .bind(run.last_offset.map(|o| o as i64))
        .bind(run.changed_since.as_ref().map(format_timestamp))
        .bind(run.resumed_from.map(|id| id.to_string()))
        .bind(&run.error_message)
        .bind(run.owner.map(|id| id.to_string()))
        .bind(run.lease_expires_at.as_ref().map(format_timestamp))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Takes over a running run whose lease has lapsed or was released.
    ///
    /// Returns false when another owner still holds a live lease, or the run
    /// is no longer running.
    pub async fn claim(
        &self,
        id: Uuid,
        owner: Uuid,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE sync_runs
            SET owner = ?, lease_expires_at = ?
            WHERE id = ? AND status = 'running'
              AND (lease_expires_at IS NULL OR lease_expires_at < ?)
            "#,
        )
        .bind(owner.to_string())
        .bind(format_timestamp(&expires_at))
        .bind(id.to_string())
        .bind(format_timestamp(&now))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Pushes the lease of an owned run out to `run.lease_expires_at`.
    pub async fn extend_lease(&self, run: &SyncRun) -> Result<(), sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE sync_runs
            SET lease_expires_at = ?
            WHERE id = ? AND status = 'running' AND owner IS ?
            "#,
        )
        .bind(run.lease_expires_at.as_ref().map(format_timestamp))
        .bind(run.id.to_string())
        .bind(run.owner.map(|id| id.to_string()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    /// Drops the lease so the next invocation can pick the run up at once.
    pub async fn release(&self, run: &SyncRun) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE sync_runs
            SET lease_expires_at = NULL
            WHERE id = ? AND status = 'running' AND owner IS ?
            "#,
        )
        .bind(run.id.to_string())
        .bind(run.owner.map(|id| id.to_string()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<SyncRun>, sqlx::Error> {
        let row: Option<SyncRunRow> = sqlx::query_as("SELECT * FROM sync_runs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(hydrate_run).transpose()
    }

    /// The run currently holding the writer slot, of any type.
    pub async fn find_running(&self) -> Result<Option<SyncRun>, sqlx::Error> {
        let row: Option<SyncRunRow> =
            sqlx::query_as("SELECT * FROM sync_runs WHERE status = 'running' LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        row.map(hydrate_run).transpose()
    }

    /// Most recently started run of the given type.
    pub async fn latest(&self, sync_type: SyncType) -> Result<Option<SyncRun>, sqlx::Error> {
        let row: Option<SyncRunRow> = sqlx::query_as(
            "SELECT * FROM sync_runs WHERE sync_type = ? ORDER BY started_at DESC, rowid DESC LIMIT 1",
        )
        .bind(sync_type.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(hydrate_run).transpose()
    }

    pub async fn list_recent(&self, limit: u32) -> Result<Vec<SyncRun>, sqlx::Error> {
        let rows: Vec<SyncRunRow> = sqlx::query_as(
            "SELECT * FROM sync_runs ORDER BY started_at DESC, rowid DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(hydrate_run).collect()
    }

    /// Persists counters, the page offset and the renewed lease of a running
    /// run in one statement.
    ///
    /// Only the run's current owner may checkpoint; anyone else gets
    /// `RowNotFound`.
    pub async fn checkpoint(&self, run: &SyncRun) -> Result<(), sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE sync_runs
            SET fetched = ?, added = ?, updated = ?, unchanged = ?, skipped = ?,
                api_calls_made = ?, last_offset = ?, lease_expires_at = ?
            WHERE id = ? AND status = 'running' AND owner IS ?
            "#,
        )
        .bind(run.fetched as i64)
        .bind(run.added as i64)
        .bind(run.updated as i64)
        .bind(run.unchanged as i64)
        .bind(run.skipped as i64)
        .bind(run.api_calls_made as i64)
        .bind(run.last_offset.map(|o| o as i64))
        .bind(run.lease_expires_at.as_ref().map(format_timestamp))
        .bind(run.id.to_string())
        .bind(run.owner.map(|id| id.to_string()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    /// Moves a running run to its terminal status.
    ///
    /// Record counters and the offset are left as last checkpointed; only the
    /// call count, which includes failed attempts, is refreshed.
    pub async fn finish(&self, run: &SyncRun) -> Result<(), sqlx::Error> {
        if !run.status.is_terminal() {
            return Err(sqlx::Error::Protocol(format!(
                "sync run {} cannot finish with status {}",
                run.id, run.status
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE sync_runs
            SET status = ?, completed_at = ?, error_message = ?, api_calls_made = ?,
                lease_expires_at = NULL
            WHERE id = ? AND status = 'running' AND owner IS ?
            "#,
        )
        .bind(run.status.to_string())
        .bind(run.completed_at.as_ref().map(format_timestamp))
        .bind(&run.error_message)
        .bind(run.api_calls_made as i64)
        .bind(run.id.to_string())
        .bind(run.owner.map(|id| id.to_string()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }
}

fn decode_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    parse_timestamp(value).ok_or_else(|| {
        sqlx::Error::Decode(format!("invalid timestamp in {}: '{}'", column, value).into())
    })
}

fn decode_uuid(column: &str, value: &str) -> Result<Uuid, sqlx::Error> {
    Uuid::parse_str(value).map_err(|e| {
        sqlx::Error::Decode(format!("invalid uuid in {}: {}", column, e).into())
    })
}

fn hydrate_run(row: SyncRunRow) -> Result<SyncRun, sqlx::Error> {
    Ok(SyncRun {
        id: decode_uuid("id", &row.id)?,
        sync_type: row
            .sync_type
            .parse::<SyncType>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?,
        status: row
            .status
            .parse::<SyncStatus>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?,
        started_at: decode_timestamp("started_at", &row.started_at)?,
        completed_at: row
            .completed_at
            .map(|v| decode_timestamp("completed_at", &v))
            .transpose()?,
        fetched: row.fetched.max(0) as u64,
        added: row.added.max(0) as u64,
        updated: row.updated.max(0) as u64,
        unchanged: row.unchanged.max(0) as u64,
        skipped: row.skipped.max(0) as u64,
        api_calls_made: row.api_calls_made.max(0) as u64,
        page_size: row.page_size.clamp(1, i64::from(u32::MAX)) as u32,
        last_offset: row.last_offset.map(|o| o.max(0) as u64),
        changed_since: row
            .changed_since
            .map(|v| decode_timestamp("changed_since", &v))
            .transpose()?,
        resumed_from: row
            .resumed_from
            .map(|v| decode_uuid("resumed_from", &v))
            .transpose()?,
        error_message: row.error_message,
        owner: row
            .owner
            .map(|v| decode_uuid("owner", &v))
            .transpose()?,
        lease_expires_at: row
            .lease_expires_at
            .map(|v| decode_timestamp("lease_expires_at", &v))
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_pool;
    use chrono::TimeZone;
    use tempfile::TempDir;

    struct TestContext {
        repo: SyncRunRepository,
        _temp_dir: TempDir,
    }

    async fn setup_repo() -> TestContext {
        let (pool, temp_dir) = temp_pool().await;
        TestContext {
            repo: SyncRunRepository::new(pool),
            _temp_dir: temp_dir,
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_run() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let run = SyncRun::new(SyncType::Incremental, 100, Some(at(0)), at(1));
        repo.create(&run).await.unwrap();

        let fetched = repo.get_by_id(run.id).await.unwrap().unwrap();
        assert_eq!(fetched, run);
    }

    #[tokio::test]
    async fn test_only_one_running_run() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let first = SyncRun::new(SyncType::Full, 100, None, at(1));
        repo.create(&first).await.unwrap();

        let second = SyncRun::new(SyncType::Incremental, 100, None, at(2));
        let err = repo.create(&second).await.unwrap_err();
        let is_unique = err
            .as_database_error()
            .map(|e| e.is_unique_violation())
            .unwrap_or(false);
        assert!(is_unique, "expected unique violation, got {}", err);

        let running = repo.find_running().await.unwrap().unwrap();
        assert_eq!(running.id, first.id);
    }

    #[tokio::test]
    async fn test_checkpoint_persists_progress() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let mut run = SyncRun::new(SyncType::Full, 100, None, at(1));
        repo.create(&run).await.unwrap();

        run.fetched = 100;
        run.added = 90;
        run.updated = 10;
        run.api_calls_made = 1;
        run.last_offset = Some(0);
        repo.checkpoint(&run).await.unwrap();

        let fetched = repo.get_by_id(run.id).await.unwrap().unwrap();
        assert_eq!(fetched.last_offset, Some(0));
        assert_eq!(fetched.added, 90);
        assert_eq!(fetched.next_offset(), 100);
    }

    #[tokio::test]
    async fn test_finish_is_exactly_once() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let mut run = SyncRun::new(SyncType::Full, 100, None, at(1));
        repo.create(&run).await.unwrap();

        run.status = SyncStatus::Success;
        run.completed_at = Some(at(2));
        repo.finish(&run).await.unwrap();

        // A second finish, or a checkpoint after finishing, touches nothing
        run.status = SyncStatus::Failed;
        assert!(matches!(
            repo.finish(&run).await,
            Err(sqlx::Error::RowNotFound)
        ));
        assert!(matches!(
            repo.checkpoint(&run).await,
            Err(sqlx::Error::RowNotFound)
        ));

        let fetched = repo.get_by_id(run.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, SyncStatus::Success);
        assert_eq!(fetched.completed_at, Some(at(2)));
        assert!(repo.find_running().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_respects_live_lease() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let holder = Uuid::new_v4();
        let mut run = SyncRun::new(SyncType::Full, 100, None, at(1));
        run.owner = Some(holder);
        run.lease_expires_at = Some(at(2));
        repo.create(&run).await.unwrap();

        // Live until the lease time passes
        let other = Uuid::new_v4();
        assert!(!repo.claim(run.id, other, at(1), at(3)).await.unwrap());
        assert!(!repo.claim(run.id, other, at(2), at(3)).await.unwrap());

        // The old holder can no longer write once someone else claims
        assert!(repo.claim(run.id, other, at(3), at(4)).await.unwrap());
        run.last_offset = Some(0);
        assert!(matches!(
            repo.checkpoint(&run).await,
            Err(sqlx::Error::RowNotFound)
        ));
        assert!(matches!(
            repo.extend_lease(&run).await,
            Err(sqlx::Error::RowNotFound)
        ));

        let stored = repo.get_by_id(run.id).await.unwrap().unwrap();
        assert_eq!(stored.owner, Some(other));
        assert_eq!(stored.lease_expires_at, Some(at(4)));
        assert_eq!(stored.last_offset, None);
    }

    #[tokio::test]
    async fn test_released_run_can_be_claimed_at_once() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let mut run = SyncRun::new(SyncType::Incremental, 100, None, at(1));
        run.owner = Some(Uuid::new_v4());
        run.lease_expires_at = Some(at(10));
        repo.create(&run).await.unwrap();

        run.lease_expires_at = Some(at(12));
        repo.extend_lease(&run).await.unwrap();
        assert_eq!(
            repo.get_by_id(run.id).await.unwrap().unwrap().lease_expires_at,
            Some(at(12))
        );

        repo.release(&run).await.unwrap();
        let stored = repo.get_by_id(run.id).await.unwrap().unwrap();
        assert!(!stored.lease_live(at(2)));
        assert!(repo.claim(run.id, Uuid::new_v4(), at(2), at(3)).await.unwrap());
    }

    #[tokio::test]
    async fn test_finish_rejects_running_status() {
        let ctx = setup_repo().await;
        let run = SyncRun::new(SyncType::Full, 100, None, at(1));
        ctx.repo.create(&run).await.unwrap();
        assert!(ctx.repo.finish(&run).await.is_err());
    }

    #[tokio::test]
    async fn test_latest_and_recent() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        for hour in [1, 3] {
            let mut run = SyncRun::new(SyncType::Full, 100, None, at(hour));
            repo.create(&run).await.unwrap();
            run.status = SyncStatus::Success;
            run.completed_at = Some(at(hour + 1));
            repo.finish(&run).await.unwrap();
        }
        let mut incremental = SyncRun::new(SyncType::Incremental, 100, None, at(5));
        repo.create(&incremental).await.unwrap();
        incremental.status = SyncStatus::Failed;
        incremental.error_message = Some("boom".to_string());
        repo.finish(&incremental).await.unwrap();

        let latest_full = repo.latest(SyncType::Full).await.unwrap().unwrap();
        assert_eq!(latest_full.started_at, at(3));

        let latest_inc = repo.latest(SyncType::Incremental).await.unwrap().unwrap();
        assert_eq!(latest_inc.status, SyncStatus::Failed);
        assert_eq!(latest_inc.error_message.as_deref(), Some("boom"));

        let recent = repo.list_recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].started_at, at(5));
        assert_eq!(recent[1].started_at, at(3));
    }
}
