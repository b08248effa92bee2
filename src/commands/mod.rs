use clap::ValueEnum;

mod config_cmd;
mod launch_cmd;
mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use launch_cmd::LaunchCommand;
pub use sync_cmd::SyncCommand;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
