//! # Server Configuration
//!
//! This module defines [`ServerConfig`], read from `conf-center.yaml`. Every
//! field has a default, so an empty file (or no file at all) is a valid
//! configuration.
//!
//! ```yaml
//! store_root: /var/lib/conf-center
//! lock_timeout_ms: 10000
//! lock_name: conf-center/commit
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};

/// Settings shared by every request handled by a [`crate::server::Server`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Directory of the file-backed store
    pub store_root: PathBuf,
    /// Lease TTL and lock-acquisition timeout
    pub lock_timeout_ms: u64,
    /// Name of the process-wide commit mutex
    pub lock_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            store_root: defaults::default_store_root(),
            lock_timeout_ms: defaults::LOCK_TIMEOUT_MS,
            lock_name: defaults::LOCK_NAME.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.lock_timeout_ms == 0 {
            return Err(Error::validation("lock_timeout_ms", "must be greater than 0"));
        }
        if self.lock_name.trim().is_empty() {
            return Err(Error::validation("lock_name", "must not be empty"));
        }
        Ok(())
    }
}

/// Parse a configuration from YAML text.
pub fn parse(yaml: &str) -> Result<ServerConfig> {
    let config: ServerConfig = if yaml.trim().is_empty() {
        ServerConfig::default()
    } else {
        serde_yaml::from_str(yaml)?
    };
    config.validate()?;
    Ok(config)
}

/// Load the configuration at `path`.
///
/// A missing file yields the defaults unless `required` is set.
pub fn load(path: &Path, required: bool) -> Result<ServerConfig> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            debug!("loading configuration from {}", path.display());
            parse(&text)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
            debug!("no configuration at {}, using defaults", path.display());
            Ok(ServerConfig::default())
        }
        Err(e) => Err(Error::NotFound {
            resource: "configuration".to_string(),
            key: format!("{} ({})", path.display(), e),
        }),
    }
}
