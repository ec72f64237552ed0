//! Default values for conf-center configuration.
//!
//! This module provides centralized default values used by the server
//! configuration and the CLI, ensuring consistency and avoiding duplication.

use std::path::PathBuf;

/// Default name of the configuration file.
pub const CONFIG_FILE: &str = "conf-center.yaml";

/// Default lease TTL and lock-acquisition timeout, in milliseconds.
pub const LOCK_TIMEOUT_MS: u64 = 10_000;

/// Default name of the process-wide commit mutex.
pub const LOCK_NAME: &str = "conf-center/commit";

/// Returns the default store root directory.
///
/// Uses the platform-appropriate data directory:
/// - Linux: `~/.local/share/conf-center` (XDG Base Directory)
/// - macOS: `~/Library/Application Support/conf-center`
/// - Windows: `{FOLDERID_RoamingAppData}\conf-center`
///
/// Falls back to `.conf-center` in the current directory if the platform
/// data directory cannot be determined.
///
/// This can be overridden by `store_root` in the configuration file or the
/// `--store` CLI flag.
pub fn default_store_root() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("conf-center"))
        .unwrap_or_else(|| PathBuf::from(".conf-center"))
}
