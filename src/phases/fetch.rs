//! Phase 1: Fetch Staged
//!
//! Reads everything under the caller's staging namespace. An empty namespace
//! is a hard failure: there is nothing to commit.

use log::debug;

use super::StagedSet;
use crate::error::{Error, Result};
use crate::path::namespace_prefix;
use crate::storage::Storage;

/// Execute Phase 1: collect the staged documents of `user`.
pub fn execute(store: &dyn Storage, user: &str) -> Result<StagedSet> {
    let prefix = namespace_prefix(user)?;
    let staged = store.get_by_prefix(&prefix)?;
    if staged.is_empty() {
        return Err(Error::NoStagedData {
            user: user.to_string(),
        });
    }
    debug!("{} staged documents under {}", staged.len(), prefix);
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_fetch_only_own_namespace() {
        let store = MemoryStore::new();
        store.put("alice/1/web/service_list", b"{}").unwrap();
        store.put("alicia/1/web/service_list", b"{}").unwrap();

        let staged = execute(&store, "alice").unwrap();
        assert_eq!(staged.len(), 1);
        assert!(staged.contains_key("alice/1/web/service_list"));
    }

    #[test]
    fn test_empty_namespace_fails() {
        let store = MemoryStore::new();
        assert!(matches!(
            execute(&store, "alice"),
            Err(Error::NoStagedData { .. })
        ));
    }
}
