//! Phase 5: Atomic Commit
//!
//! Builds one transaction that moves the staged batch into its version
//! namespace and records the commit:
//!
//! 1.  **Rebase**: every staged key `<user>/...` is written as `<tag>/...`.
//! 2.  **Delete**: the original staged keys are removed.
//! 3.  **Record**: `(tag, user, commitTimeMillis)` is appended to the version
//!     record.
//!
//! The storage backend applies all of it or none of it.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;

use super::StagedSet;
use crate::error::Result;
use crate::path::{ConfigKey, VERSION_RECORD_KEY};
use crate::storage::Storage;
use crate::version::{VersionHistory, VersionInfo};

/// Execute Phase 5: promote `staged` from `user` to `tag`.
pub fn execute(
    store: &dyn Storage,
    user: &str,
    tag: &str,
    staged: &StagedSet,
    mut history: VersionHistory,
    commit_time_ms: u64,
) -> Result<VersionInfo> {
    let mut puts = BTreeMap::new();
    for (key, value) in staged {
        let rebased = ConfigKey::parse(key)?.rebase(user, tag)?;
        puts.insert(rebased.to_string(), value.clone());
    }

    let info = VersionInfo {
        tag: tag.to_string(),
        user: user.to_string(),
        commit_time_ms,
    };
    history.push(info.clone());
    puts.insert(
        VERSION_RECORD_KEY.to_string(),
        history.serialize().into_bytes(),
    );

    let deletes: Vec<String> = staged.keys().cloned().collect();
    store.atomic_commit(&puts, &deletes)?;

    info!(
        "committed {} documents from {} as {}",
        staged.len(),
        user,
        tag
    );
    Ok(info)
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
