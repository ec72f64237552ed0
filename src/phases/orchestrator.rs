//! Orchestrator for the commit operation
//!
//! Drives one COMMIT request through the state machine described in
//! [`crate::phases`], logging every transition.
//!
//! The version is computed before the lock is taken so that bad requests fail
//! without waiting on other committers. Once the lock is held the version
//! record and the staged set are read again: an explicit tag that was taken
//! meanwhile is a repeated version, an automatic tag is recomputed, and a
//! staged set that changed since the dry run fails the commit. The lock is
//! confirmed once more immediately before the write.

use std::time::Duration;

use log::{debug, warn};

use super::lock::CommitLock;
use super::{fetch, validate, validate_username, write, CommitState, CommitTarget, StagedSet};
use crate::error::{Error, Result};
use crate::path::INFRASTRUCTURE_KEY;
use crate::storage::Storage;
use crate::version::{TagPolicy, VersionHistory, VersionInfo};

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Infrastructure,
    Version(VersionInfo),
}

/// Everything a commit needs besides the request itself.
pub struct Coordinator<'a> {
    pub store: &'a dyn Storage,
    pub tags: &'a TagPolicy,
    pub lock_name: &'a str,
    pub lock_timeout: Duration,
}

/// Tracks the current state for logging.
struct Machine<'u> {
    user: &'u str,
    state: CommitState,
}

impl Machine<'_> {
    fn enter(&mut self, next: CommitState) {
        debug!("commit {}: {} -> {}", self.user, self.state, next);
        self.state = next;
    }

    fn fail(&mut self, err: &Error) {
        warn!("commit {} failed in {}: {}", self.user, self.state, err);
        self.state = CommitState::Failed;
    }
}

impl Coordinator<'_> {
    /// Execute one COMMIT request.
    pub fn commit(&self, user: &str, target: CommitTarget) -> Result<CommitOutcome> {
        let mut machine = Machine {
            user,
            state: CommitState::Idle,
        };
        let result = self.run(&mut machine, target);
        match &result {
            Ok(_) => machine.enter(CommitState::Done),
            Err(e) => machine.fail(e),
        }
        result
    }

    fn run(&self, machine: &mut Machine<'_>, target: CommitTarget) -> Result<CommitOutcome> {
        machine.enter(CommitState::ValidateRequest);
        validate_username(machine.user)?;

        match target {
            CommitTarget::Infrastructure(bytes) => {
                machine.enter(CommitState::FastPath);
                self.store.put(INFRASTRUCTURE_KEY, &bytes)?;
                Ok(CommitOutcome::Infrastructure)
            }
            CommitTarget::Config { version } => self
                .commit_config(machine, version.as_deref())
                .map(CommitOutcome::Version),
        }
    }

    fn commit_config(
        &self,
        machine: &mut Machine<'_>,
        requested: Option<&str>,
    ) -> Result<VersionInfo> {
        let user = machine.user;

        machine.enter(CommitState::FetchStaged);
        let staged = fetch::execute(self.store, user)?;

        machine.enter(CommitState::ComputeVersion);
        let history = read_history(self.store)?;
        let tag = self.tags.resolve(&history, requested)?;
        debug!("commit {}: candidate tag {}", user, tag);

        machine.enter(CommitState::DryRunTemplates);
        let rendered = validate::execute(self.store, user, &staged)?;
        debug!("commit {}: {} templates rendered", user, rendered);

        machine.enter(CommitState::AcquireLock);
        let lock = CommitLock::acquire(self.store, self.lock_name, self.lock_timeout)?;

        machine.enter(CommitState::AtomicCommit);
        let committed = self.commit_locked(&lock, user, requested, &staged);

        machine.enter(CommitState::ReleaseLock);
        if let Err(e) = lock.release() {
            // the lease still expires on its own
            warn!("commit {}: releasing lock failed: {}", user, e);
        }
        committed
    }

    /// Re-check and write; must run while the commit lock is held.
    fn commit_locked(
        &self,
        lock: &CommitLock<'_>,
        user: &str,
        requested: Option<&str>,
        validated: &StagedSet,
    ) -> Result<VersionInfo> {
        let history = read_history(self.store)?;
        let tag = self.tags.resolve(&history, requested)?;

        let current = fetch::execute(self.store, user)?;
        if &current != validated {
            return Err(Error::StagedDataChanged {
                user: user.to_string(),
            });
        }

        lock.check()?;
        write::execute(self.store, user, &tag, validated, history, write::now_ms())
    }
}

fn read_history(store: &dyn Storage) -> Result<VersionHistory> {
    Ok(VersionHistory::read(store)?.unwrap_or_default())
}
