//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the
//! `conf-center` command-line tool. Each subcommand is defined in its own file
//! and maps onto one request of the `conf_center` library.
//!
//! ## Structure
//!
//! Each command module contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that builds the request, hands it to the shared
//!   [`Context`], and reports the response.
//!
//! Responses are reported the same way everywhere: the status line goes to
//! stderr, versions and file payloads go to stdout (or to `--output`), and a
//! status other than `ok` becomes a non-zero exit.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context as _, Result};
use log::debug;

use conf_center::config::{self, ServerConfig};
use conf_center::defaults::CONFIG_FILE;
use conf_center::output::{status_line, OutputConfig};
use conf_center::server::{Response, Server};
use conf_center::storage::{FileStore, Storage};

pub mod commit;
pub mod delete;
pub mod get;
pub mod put;

/// Everything a command needs: the server and output settings.
pub struct Context {
    pub server: Server,
    pub out: OutputConfig,
}

impl Context {
    /// Load the configuration, open the store, and build the server.
    pub fn new(config_path: Option<&Path>, store: Option<PathBuf>, color_flag: &str) -> Result<Self> {
        let config = load_config(config_path)?;
        let config = ServerConfig {
            store_root: store.unwrap_or(config.store_root),
            ..config
        };
        debug!("using store at {}", config.store_root.display());

        let store = FileStore::open(&config.store_root).with_context(|| {
            format!("failed to open store at {}", config.store_root.display())
        })?;
        let store: Arc<dyn Storage> = Arc::new(store);
        Ok(Self {
            server: Server::new(store, config)?,
            out: OutputConfig::from_env_and_flag(color_flag),
        })
    }

    /// Print a response, writing any file payload to `output` or stdout.
    pub fn report(&self, response: &Response, output: Option<&Path>) -> Result<()> {
        eprintln!("{}", status_line(&self.out, &response.status));
        if !response.is_ok() {
            return Err(anyhow!("{}", response.status));
        }

        let mut stdout = std::io::stdout().lock();
        for info in &response.versions {
            writeln!(stdout, "{}\t{}\t{}", info.tag, info.user, info.commit_time_ms)?;
        }
        if let Some(file) = &response.file {
            match output {
                Some(path) => fs::write(path, file)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => stdout.write_all(file)?,
            }
        }
        stdout.flush()?;
        Ok(())
    }
}

fn load_config(path: Option<&Path>) -> Result<ServerConfig> {
    let loaded = match path {
        Some(path) => config::load(path, true)?,
        None => config::load(Path::new(CONFIG_FILE), false)?,
    };
    Ok(loaded)
}

/// Read a file given on the command line.
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}
