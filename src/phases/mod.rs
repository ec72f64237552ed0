//! Phases of the commit operation.
//!
//! ## Overview
//!
//! A COMMIT either replaces the infrastructure document (a single put, no
//! lock) or turns a user's staged batch into a new immutable version:
//!
//! 1. Fetch Staged - Prefix-scan the caller's staging namespace
//! 2. Compute Version - Validate the requested tag or compute the next one
//! 3. Dry Run - Render every staged template; nothing is written
//! 4. Acquire Lock - Lease plus the process-wide named mutex
//! 5. Atomic Commit - Rebase staged keys, delete originals, append the record
//! 6. Release Lock - Always runs once the lock was taken
//!
//! Any failure moves the state machine to `Failed` and nothing is written.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

pub mod fetch;
pub mod lock;
pub mod orchestrator;
pub mod validate;
pub mod write;

pub use orchestrator::{CommitOutcome, Coordinator};

/// Staged documents keyed by their full storage key.
pub type StagedSet = BTreeMap<String, Vec<u8>>;

/// What a COMMIT request targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitTarget {
    /// Promote the staged batch, optionally under an explicit tag.
    Config { version: Option<String> },
    /// Replace the infrastructure document.
    Infrastructure(Vec<u8>),
}

/// States of one commit execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    Idle,
    ValidateRequest,
    FastPath,
    FetchStaged,
    ComputeVersion,
    DryRunTemplates,
    AcquireLock,
    AtomicCommit,
    ReleaseLock,
    Done,
    Failed,
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommitState::Idle => "idle",
            CommitState::ValidateRequest => "validate-request",
            CommitState::FastPath => "fast-path",
            CommitState::FetchStaged => "fetch-staged",
            CommitState::ComputeVersion => "compute-version",
            CommitState::DryRunTemplates => "dry-run-templates",
            CommitState::AcquireLock => "acquire-lock",
            CommitState::AtomicCommit => "atomic-commit",
            CommitState::ReleaseLock => "release-lock",
            CommitState::Done => "done",
            CommitState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Check a username before it is used as a staging namespace.
///
/// Usernames are non-empty and contain none of `,` (the version record
/// separator), `.` (reserved for tags), or `/` (the key separator).
pub fn validate_username(user: &str) -> Result<()> {
    if user.is_empty() {
        return Err(Error::validation("username", "must not be empty"));
    }
    if let Some(bad) = user.chars().find(|c| matches!(c, ',' | '.' | '/')) {
        return Err(Error::validation(
            "username",
            format!("'{}' must not contain '{}'", user, bad),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("bob_2").is_ok());
        for bad in ["", "a.b", "a,b", "a/b"] {
            assert!(
                matches!(validate_username(bad), Err(Error::Validation { .. })),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CommitState::DryRunTemplates.to_string(), "dry-run-templates");
        assert_eq!(CommitState::Failed.to_string(), "failed");
    }
}
