use chrono::Utc;
use clap::{Args, Subcommand};

use super::OutputFormat;
use launchsync::db::LaunchRepository;
use launchsync::models::FilterParams;
use launchsync::query::{QueryEngine, SearchResult};

#[derive(Args)]
pub struct LaunchCommand {
    #[command(subcommand)]
    pub command: LaunchSubcommand,
}

#[derive(Subcommand)]
pub enum LaunchSubcommand {
    /// List stored launches
    List {
        #[command(flatten)]
        filters: ListFilters,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a launch's details
    Show {
        /// Launch ID
        id: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

/// Filter flags; values are validated by the query engine.
#[derive(Args)]
pub struct ListFilters {
    /// Earliest NET (RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    net_from: Option<String>,

    /// Latest NET (RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    net_to: Option<String>,

    /// Only launches from now on
    #[arg(long)]
    upcoming: bool,

    /// Name contains
    #[arg(long)]
    name: Option<String>,

    /// Provider contains
    #[arg(long)]
    provider: Option<String>,

    /// Rocket contains
    #[arg(long)]
    rocket: Option<String>,

    /// Mission contains
    #[arg(long)]
    mission: Option<String>,

    /// Pad contains
    #[arg(long)]
    pad: Option<String>,

    /// Location contains
    #[arg(long)]
    location: Option<String>,

    /// Status abbreviation (exact, e.g. Go, TBD)
    #[arg(long)]
    status: Option<String>,

    /// Country code (exact, e.g. USA)
    #[arg(long)]
    country: Option<String>,

    /// Orbit abbreviation (exact, e.g. LEO)
    #[arg(long)]
    orbit: Option<String>,

    /// Mission type (exact)
    #[arg(long)]
    mission_type: Option<String>,

    /// Provider type (exact)
    #[arg(long)]
    provider_type: Option<String>,

    /// Search name, provider, rocket, mission and location
    #[arg(long, short)]
    search: Option<String>,

    /// Sort field: net, name, provider, status, window_start, last_updated
    #[arg(long)]
    sort: Option<String>,

    /// Sort direction: asc or desc
    #[arg(long)]
    direction: Option<String>,

    /// Page size (1-100)
    #[arg(long)]
    limit: Option<String>,

    /// Number of launches to skip
    #[arg(long)]
    offset: Option<String>,
}

impl ListFilters {
    fn to_params(&self) -> FilterParams {
        let mut params = FilterParams::new();
        let fields = [
            ("net_from", &self.net_from),
            ("net_to", &self.net_to),
            ("name", &self.name),
            ("provider", &self.provider),
            ("rocket", &self.rocket),
            ("mission", &self.mission),
            ("pad", &self.pad),
            ("location", &self.location),
            ("status", &self.status),
            ("country", &self.country),
            ("orbit", &self.orbit),
            ("mission_type", &self.mission_type),
            ("provider_type", &self.provider_type),
            ("search", &self.search),
            ("sort", &self.sort),
            ("direction", &self.direction),
            ("limit", &self.limit),
            ("offset", &self.offset),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                params.insert(key.to_string(), value.clone());
            }
        }
        if self.upcoming {
            params.insert("upcoming".to_string(), "true".to_string());
        }
        params
    }
}

impl LaunchCommand {
    pub async fn run(&self, repo: &LaunchRepository) -> Result<(), Box<dyn std::error::Error>> {
        let engine = QueryEngine::new(repo.clone());

        match &self.command {
            LaunchSubcommand::List { filters, format } => {
                let result = engine.search_params(&filters.to_params(), Utc::now()).await?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&result)?);
                    }
                    OutputFormat::Text => print_list(&result),
                }
                Ok(())
            }

            LaunchSubcommand::Show { id, format } => {
                let launch = engine
                    .get(id)
                    .await?
                    .ok_or_else(|| format!("Launch not found: {}", id))?;

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&launch)?);
                    }
                    OutputFormat::Text => {
                        println!("{}", launch);
                    }
                }
                Ok(())
            }
        }
    }
}

fn print_list(result: &SearchResult) {
    if result.records.is_empty() {
        println!("No launches found.");
        return;
    }

    for launch in &result.records {
        let net = launch
            .net
            .map(|n| n.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "TBD".to_string());
        println!(
            "{}  {:<8} {}",
            net,
            launch.status.as_deref().unwrap_or("-"),
            launch.name.as_deref().unwrap_or("(unnamed)")
        );
        if let Some(provider) = &launch.provider {
            println!("                  {}  [{}]", provider, launch.id);
        } else {
            println!("                  [{}]", launch.id);
        }
    }

    let page = &result.pagination;
    println!();
    println!(
        "Showing {}-{} of {}{}",
        page.offset + 1,
        page.offset + result.records.len() as u64,
        page.total,
        if page.has_more {
            format!(" (next: --offset {})", page.offset + result.records.len() as u64)
        } else {
            String::new()
        }
    );
}
