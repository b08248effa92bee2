use clap::{Args, Subcommand};
use std::fs;
use std::io::Write;

use super::OutputFormat;
use launchsync::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                // Never print the token itself
                let mut shown = config.clone();
                if shown.sync.api_token.is_some() {
                    shown.sync.api_token = Some("********".to_string());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&shown)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &shown.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("database_path: {}", shown.database_path.value.display());
                        println!("  source: {}", shown.database_path.source);
                        println!();

                        println!("api_url: {}", shown.api_url.value);
                        println!("  source: {}", shown.api_url.source);
                        println!();

                        let sync = &shown.sync;
                        println!(
                            "api_token: {}",
                            sync.api_token.as_deref().unwrap_or("(none, anonymous limits apply)")
                        );
                        println!("page_size: {}", sync.page_size);
                        println!("request_delay_ms: {}", sync.request_delay_ms);
                        println!("lookback_hours: {}", sync.lookback_hours);
                        println!("max_retries: {}", sync.max_retries);
                        println!("default_cooldown_secs: {}", sync.default_cooldown_secs);
                        println!("retry_backoff_ms: {}", sync.retry_backoff_ms);
                        println!("request_timeout_secs: {}", sync.request_timeout_secs);
                        println!("lease_ttl_secs: {}", sync.lease_ttl_secs);
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = Config::default_config_path();

                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'launchsync config show' to view current configuration.");
                    return Ok(());
                }

                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let default_config = r#"# launchsync configuration

# Path to SQLite database (default: ~/.local/share/launchsync/launches.db)
# database_path: launches.db

sync:
  api_url: https://ll.thespacedevs.com/2.2.0
  # api_token: your-token
  page_size: 100
  request_delay_ms: 1000
  lookback_hours: 24
  max_retries: 5
  default_cooldown_secs: 60
  retry_backoff_ms: 2000
  request_timeout_secs: 30
  lease_ttl_secs: 300
"#;

                let mut file = fs::File::create(&config_path)?;
                file.write_all(default_config.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}
