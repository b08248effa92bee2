use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::clock::Clock;
use super::reconcile::{map_to_record, Classification, MappingError, Reconciler};
use crate::db::{LaunchRepository, SyncRunRepository};
use crate::models::{Launch, SyncRun, SyncStatus, SyncType};
use crate::source::{FetchParams, Page, RemoteSource, SourceError, MAX_PAGE_SIZE};

/// Tuning for the fetch loop.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub page_size: u32,
    /// Pause between successful page fetches.
    pub request_delay: Duration,
    /// How far back an incremental run looks for changes.
    pub lookback: chrono::Duration,
    /// Retries per page, shared by throttles and transient failures.
    pub max_retries: u32,
    /// Cool-down for a throttle that gives no hint.
    pub default_cooldown: Duration,
    /// Base of the exponential backoff for transient failures.
    pub retry_backoff: Duration,
    /// How long a run stays claimed without a checkpoint or pause renewing it.
    pub lease_ttl: chrono::Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            request_delay: Duration::from_secs(1),
            lookback: chrono::Duration::hours(24),
            max_retries: 5,
            default_cooldown: Duration::from_secs(60),
            retry_backoff: Duration::from_secs(2),
            lease_ttl: chrono::Duration::minutes(5),
        }
    }
}

#[derive(Debug)]
pub enum SyncError {
    /// Another run holds the writer slot.
    RunInProgress { sync_type: SyncType, run_id: Uuid },
    Source(SourceError),
    RetriesExhausted { attempts: u32, last: SourceError },
    Store(sqlx::Error),
    Mapping(MappingError),
    /// Stopped by the cancellation token; the run stays resumable.
    Cancelled,
    /// Another process took the run over after this one's lease lapsed.
    LeaseLost { run_id: Uuid },
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::RunInProgress { sync_type, run_id } => {
                write!(f, "A {} sync run ({}) is already running", sync_type, run_id)
            }
            SyncError::Source(e) => write!(f, "{}", e),
            SyncError::RetriesExhausted { attempts, last } => {
                write!(f, "Gave up after {} attempts: {}", attempts, last)
            }
            SyncError::Store(e) => write!(f, "Database error: {}", e),
            SyncError::Mapping(e) => write!(f, "{}", e),
            SyncError::Cancelled => write!(f, "Sync cancelled"),
            SyncError::LeaseLost { run_id } => {
                write!(f, "Sync run {} was taken over by another process", run_id)
            }
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Source(e) => Some(e),
            SyncError::RetriesExhausted { last, .. } => Some(last),
            SyncError::Store(e) => Some(e),
            SyncError::Mapping(e) => Some(e),
            SyncError::RunInProgress { .. }
            | SyncError::Cancelled
            | SyncError::LeaseLost { .. } => None,
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        SyncError::Store(e)
    }
}

impl From<SourceError> for SyncError {
    fn from(e: SourceError) -> Self {
        SyncError::Source(e)
    }
}

impl From<MappingError> for SyncError {
    fn from(e: MappingError) -> Self {
        SyncError::Mapping(e)
    }
}

/// Result of refreshing one launch outside a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Reconciled {
        launch: Launch,
        classification: Classification,
    },
    NotFound,
}

/// Drives full loads and incremental syncs.
///
/// Runs are strictly sequential: each page is fetched, reconciled and
/// checkpointed before the next request goes out. Only one run may be
/// `running` at a time across the whole store, and only the orchestrator
/// holding its lease may drive it.
pub struct SyncOrchestrator<S, C> {
    /// Lease holder id for runs this orchestrator drives.
    owner: Uuid,
    source: S,
    clock: C,
    runs: SyncRunRepository,
    reconciler: Reconciler,
    settings: SyncSettings,
    cancel: CancellationToken,
}

impl<S: RemoteSource, C: Clock> SyncOrchestrator<S, C> {
    pub fn new(
        launches: LaunchRepository,
        runs: SyncRunRepository,
        source: S,
        clock: C,
        settings: SyncSettings,
    ) -> Self {
        Self {
            owner: Uuid::new_v4(),
            source,
            clock,
            runs,
            reconciler: Reconciler::new(launches),
            settings,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn full_load(&self) -> Result<SyncRun, SyncError> {
        self.run(SyncType::Full).await
    }

    pub async fn incremental_sync(&self) -> Result<SyncRun, SyncError> {
        self.run(SyncType::Incremental).await
    }

    /// Runs (or resumes) a sync of the given type to a terminal status.
    ///
    /// A run that ends `failed` is still returned as `Ok`; the journal row is
    /// the outcome. `Err` means the run never started, was cancelled, or its
    /// final status could not be recorded or is no longer this process's to
    /// record.
    pub async fn run(&self, sync_type: SyncType) -> Result<SyncRun, SyncError> {
        let mut run = self.admit(sync_type).await?;

        match self.drive(&mut run).await {
            Ok(()) => {
                run.status = SyncStatus::Success;
                run.completed_at = Some(self.clock.now());
                self.runs
                    .finish(&run)
                    .await
                    .map_err(|e| lease_error(&run, e))?;
                info!(
                    run_id = %run.id,
                    sync_type = %run.sync_type,
                    fetched = run.fetched,
                    added = run.added,
                    updated = run.updated,
                    unchanged = run.unchanged,
                    skipped = run.skipped,
                    api_calls = run.api_calls_made,
                    "Sync run succeeded"
                );
            }
            Err(SyncError::Cancelled) => {
                if let Err(e) = self.runs.release(&run).await {
                    warn!(run_id = %run.id, error = %e, "Could not release lease of cancelled run");
                }
                info!(
                    run_id = %run.id,
                    offset = ?run.last_offset,
                    "Sync run cancelled; it will resume on the next invocation"
                );
                return Err(SyncError::Cancelled);
            }
            Err(SyncError::LeaseLost { run_id }) => {
                warn!(run_id = %run_id, "Stopped driving sync run after losing its lease");
                return Err(SyncError::LeaseLost { run_id });
            }
            Err(e) => {
                error!(run_id = %run.id, sync_type = %run.sync_type, error = %e, "Sync run failed");
                run.status = SyncStatus::Failed;
                run.completed_at = Some(self.clock.now());
                run.error_message = Some(e.to_string());
                self.runs
                    .finish(&run)
                    .await
                    .map_err(|e| lease_error(&run, e))?;
            }
        }

        // Counters are returned as checkpointed, not as last held in memory
        self.runs
            .get_by_id(run.id)
            .await?
            .ok_or(SyncError::Store(sqlx::Error::RowNotFound))
    }

    /// Fetches one launch by id and reconciles it without a journal entry.
    ///
    /// Refused while a run is actively held; an abandoned run does not block.
    pub async fn refresh(&self, id: &str) -> Result<RefreshOutcome, SyncError> {
        if let Some(running) = self.runs.find_running().await? {
            if running.lease_live(self.clock.now()) {
                return Err(SyncError::RunInProgress {
                    sync_type: running.sync_type,
                    run_id: running.id,
                });
            }
        }

        let Some(payload) = self.source.fetch_by_id(id).await? else {
            return Ok(RefreshOutcome::NotFound);
        };
        let launch = map_to_record(&payload)?;
        let classification = self.reconciler.reconcile(&launch).await?;
        info!(launch_id = %launch.id, ?classification, "Refreshed launch");

        Ok(RefreshOutcome::Reconciled {
            launch,
            classification,
        })
    }

    /// Picks the run to drive: the one already running if its lease has
    /// lapsed, a continuation of a failed run's checkpoint, or a fresh run.
    async fn admit(&self, sync_type: SyncType) -> Result<SyncRun, SyncError> {
        let now = self.clock.now();

        if let Some(mut running) = self.runs.find_running().await? {
            let in_progress = SyncError::RunInProgress {
                sync_type: running.sync_type,
                run_id: running.id,
            };
            if running.sync_type != sync_type || running.lease_live(now) {
                return Err(in_progress);
            }

            let expires_at = now + self.settings.lease_ttl;
            if !self.runs.claim(running.id, self.owner, now, expires_at).await? {
                return Err(in_progress);
            }
            running.owner = Some(self.owner);
            running.lease_expires_at = Some(expires_at);

            info!(
                run_id = %running.id,
                offset = running.next_offset(),
                "Resuming interrupted sync run"
            );
            return Ok(running);
        }

        let mut run = match self.runs.latest(sync_type).await? {
            Some(previous) if previous.status == SyncStatus::Failed && previous.has_checkpoint() => {
                info!(
                    failed_run = %previous.id,
                    offset = previous.next_offset(),
                    "Continuing from checkpoint of failed run"
                );
                SyncRun::continuing(&previous, now)
            }
            _ => {
                let changed_since = match sync_type {
                    SyncType::Full => None,
                    SyncType::Incremental => Some(now - self.settings.lookback),
                };
                let page_size = self.settings.page_size.clamp(1, MAX_PAGE_SIZE);
                SyncRun::new(sync_type, page_size, changed_since, now)
            }
        };
        run.owner = Some(self.owner);
        run.lease_expires_at = Some(now + self.settings.lease_ttl);

        if let Err(e) = self.runs.create(&run).await {
            let is_unique = e
                .as_database_error()
                .map(|db| db.is_unique_violation())
                .unwrap_or(false);
            if is_unique {
                if let Some(holder) = self.runs.find_running().await? {
                    return Err(SyncError::RunInProgress {
                        sync_type: holder.sync_type,
                        run_id: holder.id,
                    });
                }
            }
            return Err(e.into());
        }

        info!(
            run_id = %run.id,
            sync_type = %run.sync_type,
            changed_since = ?run.changed_since,
            "Started sync run"
        );
        Ok(run)
    }

    async fn drive(&self, run: &mut SyncRun) -> Result<(), SyncError> {
        let mut params = FetchParams::new(run.page_size, run.next_offset(), ordering(run.sync_type))
            .with_changed_since(run.changed_since);

        loop {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let page = self.fetch_with_retry(run, &params).await?;
            let tally = self.reconciler.reconcile_page(&page.results).await?;
            tally.apply_to(run);
            run.last_offset = Some(params.offset);
            run.lease_expires_at = Some(self.clock.now() + self.settings.lease_ttl);
            self.runs
                .checkpoint(run)
                .await
                .map_err(|e| lease_error(run, e))?;

            info!(
                run_id = %run.id,
                offset = params.offset,
                remote_count = page.count,
                added = tally.added,
                updated = tally.updated,
                unchanged = tally.unchanged,
                skipped = tally.skipped,
                "Applied page"
            );

            if !page.has_more {
                return Ok(());
            }
            if page.results.is_empty() {
                warn!(
                    run_id = %run.id,
                    offset = params.offset,
                    "Remote returned an empty page that claims more; treating it as the end"
                );
                return Ok(());
            }
            self.pause(run, self.settings.request_delay).await?;
            params = params.next();
        }
    }

    async fn fetch_with_retry(
        &self,
        run: &mut SyncRun,
        params: &FetchParams,
    ) -> Result<Page, SyncError> {
        let mut attempt = 0;
        loop {
            run.api_calls_made += 1;
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
                result = self.source.fetch_page(params) => result,
            };

            let err = match result {
                Ok(page) => return Ok(page),
                Err(e) if !e.is_retryable() => return Err(SyncError::Source(e)),
                Err(e) => e,
            };
            if attempt >= self.settings.max_retries {
                return Err(SyncError::RetriesExhausted {
                    attempts: attempt + 1,
                    last: err,
                });
            }

            let wait = self.retry_delay(&err, attempt);
            warn!(
                run_id = %run.id,
                offset = params.offset,
                attempt = attempt + 1,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "Retrying page"
            );
            self.pause(run, wait).await?;
            attempt += 1;
        }
    }

    fn retry_delay(&self, err: &SourceError, attempt: u32) -> Duration {
        match err {
            SourceError::Throttled { retry_after } => {
                retry_after.unwrap_or(self.settings.default_cooldown)
            }
            _ => self
                .settings
                .retry_backoff
                .saturating_mul(2u32.saturating_pow(attempt)),
        }
    }

    /// Sleeps on the clock unless cancelled first.
    ///
    /// The lease is pushed past the end of the wait so a long cool-down does
    /// not let another process take the run over.
    async fn pause(&self, run: &mut SyncRun, duration: Duration) -> Result<(), SyncError> {
        if duration.is_zero() {
            return Ok(());
        }

        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|wait| wait.checked_add(&self.settings.lease_ttl))
            .and_then(|span| now.checked_add_signed(span))
            .unwrap_or(now + self.settings.lease_ttl);
        run.lease_expires_at = Some(expires_at);
        self.runs
            .extend_lease(run)
            .await
            .map_err(|e| lease_error(run, e))?;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SyncError::Cancelled),
            _ = self.clock.sleep(duration) => Ok(()),
        }
    }
}

/// A write guarded on ownership that touched no row means the lease is gone.
fn lease_error(run: &SyncRun, e: sqlx::Error) -> SyncError {
    match e {
        sqlx::Error::RowNotFound => SyncError::LeaseLost { run_id: run.id },
        e => SyncError::Store(e),
    }
}

/// Remote ordering per run type. Both keys are stable so offsets stay valid
/// across a resume.
fn ordering(sync_type: SyncType) -> &'static str {
    match sync_type {
        SyncType::Full => "id",
        SyncType::Incremental => "last_updated",
    }
}
