pub mod analyze;
pub mod config;
pub mod decode;
pub mod replay;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use cs_domain::config::{Config, CONFIG_ENV};

/// chatsync: mutation-synchronised chat state with streamed director
/// analysis.
#[derive(Debug, Parser)]
#[command(name = "chatsync", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply a JSON-lines mutation log to a stored chat and print the result.
    Replay {
        /// One mutation per line.
        file: PathBuf,
        /// Chat to replay into (defaults to the root of the first mutation).
        /// Created empty when it does not exist.
        #[arg(long)]
        chat: Option<String>,
    },
    /// Decode a possibly truncated JSON object read from stdin.
    Decode {
        /// Print the closed-off text instead of the decoded fields.
        #[arg(long)]
        closed: bool,
    },
    /// Run one director analysis step and print mirrored mutations as
    /// JSON lines.
    Analyze {
        #[arg(long)]
        chat: String,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `CHATSYNC_CONFIG` (or
/// `config.toml` by default). Returns the parsed [`Config`] and the path
/// that was used.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "config.toml".into());
    let config = Config::load_or_default(&config_path)
        .map_err(|e| anyhow::anyhow!("loading {config_path}: {e}"))?;
    Ok((config, config_path))
}
