//! CLI argument parsing and command dispatch

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;

/// Conf Center - Versioned configuration store and renderer
#[derive(Parser, Debug)]
#[command(name = "conf-center")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Path to the server configuration file.
    ///
    /// Defaults to `conf-center.yaml` in the current directory; a missing
    /// default file means built-in defaults.
    #[arg(long, global = true, value_name = "FILE", env = "CONF_CENTER_CONFIG")]
    config: Option<PathBuf>,

    /// Directory of the file-backed store (overrides `store_root`)
    #[arg(long, global = true, value_name = "DIR", env = "CONF_CENTER_STORE")]
    store: Option<PathBuf>,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read a version list, document, or rendered configuration
    Get(commands::get::GetArgs),

    /// Stage a document under your namespace
    Put(commands::put::PutArgs),

    /// Discard everything you have staged
    Delete(commands::delete::DeleteArgs),

    /// Commit your staged batch as a new version, or replace the infrastructure
    Commit(commands::commit::CommitArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        // RUST_LOG wins over --log-level when set
        env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(self.log_level.as_str()),
        )
        .format_timestamp(None)
        .try_init()
        .ok();

        let ctx = commands::Context::new(self.config.as_deref(), self.store, &self.color)?;
        match self.command {
            Commands::Get(args) => commands::get::execute(args, &ctx),
            Commands::Put(args) => commands::put::execute(args, &ctx),
            Commands::Delete(args) => commands::delete::execute(args, &ctx),
            Commands::Commit(args) => commands::commit::execute(args, &ctx),
        }
    }
}
