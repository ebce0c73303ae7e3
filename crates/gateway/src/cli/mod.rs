pub mod config_cmd;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use sr_domain::config::Config;

#[derive(Parser)]
#[command(name = "subrelay", about = "Live-broadcast transcription and translation relay")]
pub struct Cli {
    /// Path to the YAML config file.
    #[arg(short, long, default_value = "config.yaml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the relay (the default when no subcommand is given).
    Serve,
    /// Inspect or validate the configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print the version and exit.
    Version,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Check the config file and report problems.
    Validate,
    /// Print the effective config with secrets masked.
    Show,
}

pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    Ok(config)
}
