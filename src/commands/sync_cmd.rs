//! Sync CLI commands for mirroring the remote launch catalog.

use clap::{Args, Subcommand};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use super::OutputFormat;
use launchsync::config::Config;
use launchsync::db::{LaunchRepository, SyncRunRepository};
use launchsync::models::{SyncStatus, SyncType};
use launchsync::source::HttpSource;
use launchsync::sync::{RefreshOutcome, SyncError, SyncOrchestrator, SystemClock};

/// Mirror launches from the remote API
#[derive(Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: SyncSubcommand,
}

#[derive(Subcommand)]
enum SyncSubcommand {
    /// Page through the whole remote catalog
    Full,

    /// Fetch launches changed within the lookback window
    Incremental,

    /// Show recent sync runs
    Status {
        /// Number of runs to show
        #[arg(long, short, default_value = "10")]
        limit: u32,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Re-fetch a single launch by id
    Refresh {
        /// Launch ID
        id: String,
    },
}

impl SyncCommand {
    pub async fn run(
        &self,
        pool: &SqlitePool,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            SyncSubcommand::Full => self.sync(pool, config, SyncType::Full).await,
            SyncSubcommand::Incremental => self.sync(pool, config, SyncType::Incremental).await,
            SyncSubcommand::Status { limit, format } => self.status(pool, *limit, format).await,
            SyncSubcommand::Refresh { id } => self.refresh(pool, config, id).await,
        }
    }

    async fn sync(
        &self,
        pool: &SqlitePool,
        config: &Config,
        sync_type: SyncType,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let cancel = CancellationToken::new();
        let orchestrator = orchestrator(pool, config)?.with_cancellation(cancel.clone());

        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupted; finishing the current page...");
                cancel.cancel();
            }
        });

        println!("Running {} sync against {}...", sync_type, config.api_url.value);
        let result = orchestrator.run(sync_type).await;
        ctrl_c.abort();

        match result {
            Ok(run) => {
                println!();
                println!("{}", run);
                if run.status == SyncStatus::Failed {
                    return Err(format!("{} sync failed", sync_type).into());
                }
                Ok(())
            }
            Err(SyncError::Cancelled) => {
                println!("Progress saved. Run the same command again to resume.");
                Err("sync cancelled".into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn status(
        &self,
        pool: &SqlitePool,
        limit: u32,
        format: &OutputFormat,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let runs = SyncRunRepository::new(pool.clone()).list_recent(limit).await?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&runs)?);
            }
            OutputFormat::Text => {
                let total = LaunchRepository::new(pool.clone()).count().await?;
                println!("Sync Status");
                println!("===========");
                println!();
                println!("Launches stored: {}", total);
                println!();

                if runs.is_empty() {
                    println!("No sync runs yet. Run 'launchsync sync full' to start.");
                    return Ok(());
                }
                for run in &runs {
                    println!("{}", run);
                    println!();
                }
            }
        }
        Ok(())
    }

    async fn refresh(
        &self,
        pool: &SqlitePool,
        config: &Config,
        id: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match orchestrator(pool, config)?.refresh(id).await? {
            RefreshOutcome::Reconciled {
                launch,
                classification,
            } => {
                println!("Launch {} ({:?}):", launch.id, classification);
                println!("{}", launch);
                Ok(())
            }
            RefreshOutcome::NotFound => Err(format!("Launch not found remotely: {}", id).into()),
        }
    }
}

fn orchestrator(
    pool: &SqlitePool,
    config: &Config,
) -> Result<SyncOrchestrator<HttpSource, SystemClock>, Box<dyn std::error::Error>> {
    let source = HttpSource::new(
        config.sync.api_url.clone(),
        config.sync.api_token.clone(),
        config.sync.request_timeout(),
    )?;

    Ok(SyncOrchestrator::new(
        LaunchRepository::new(pool.clone()),
        SyncRunRepository::new(pool.clone()),
        source,
        SystemClock,
        config.sync.settings(),
    ))
}
