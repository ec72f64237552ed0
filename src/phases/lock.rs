//! Phases 4 and 6: Acquire Lock / Release Lock
//!
//! The commit lock is a named mutex attached to a lease whose TTL equals the
//! configured lock timeout, so a crashed committer cannot hold it forever.
//! The lease is renewed to a full TTL once the mutex is won, and the holder
//! calls [`CommitLock::check`] right before writing so a lapsed lease never
//! writes. Backends without a lock capability are refused rather than skipped.

use std::time::Duration;

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::storage::{Lease, LockProvider, Storage};

/// A held commit lock. Dropping it releases the lock on a best-effort basis;
/// [`CommitLock::release`] reports failures instead.
pub struct CommitLock<'a> {
    provider: &'a dyn LockProvider,
    name: String,
    lease: Lease,
    released: bool,
}

impl<'a> CommitLock<'a> {
    /// Grant a lease of `timeout`, wait up to `timeout` for mutex `name`, then
    /// renew the lease so the holder keeps a full TTL.
    pub fn acquire(store: &'a dyn Storage, name: &str, timeout: Duration) -> Result<Self> {
        let provider = store.lock_provider().ok_or_else(|| Error::LockUnavailable {
            message: "storage backend does not support locking".to_string(),
        })?;

        let lease = provider.grant_lease(timeout)?;
        if let Err(e) = provider.lock(name, &lease, timeout) {
            if let Err(revoke) = provider.revoke_lease(&lease) {
                warn!("failed to revoke lease {}: {}", lease.id, revoke);
            }
            return Err(e);
        }
        let lock = Self {
            provider,
            name: name.to_string(),
            lease,
            released: false,
        };
        // waiting used up part of the lease
        lock.provider.keep_alive(&lock.lease)?;

        info!("acquired commit lock '{}' (lease {})", name, lock.lease.id);
        Ok(lock)
    }

    pub fn lease(&self) -> &Lease {
        &self.lease
    }

    /// Confirm the lock is still held and renew its lease.
    ///
    /// Fails with `LockUnavailable` once the lease has lapsed or the mutex has
    /// passed to another holder.
    pub fn check(&self) -> Result<()> {
        if !self.provider.holds(&self.name, &self.lease)? {
            return Err(Error::LockUnavailable {
                message: format!(
                    "commit lock '{}' was lost (lease {} expired)",
                    self.name, self.lease.id
                ),
            });
        }
        self.provider.keep_alive(&self.lease)
    }

    /// Unlock the mutex and end the lease.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.release_inner()
    }

    fn release_inner(&self) -> Result<()> {
        // revoke even when unlock fails
        let unlocked = self.provider.unlock(&self.name, &self.lease);
        let revoked = self.provider.revoke_lease(&self.lease);
        debug!("released commit lock '{}' (lease {})", self.name, self.lease.id);
        unlocked.and(revoked)
    }
}

impl Drop for CommitLock<'_> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.release_inner() {
                warn!("failed to release commit lock '{}': {}", self.name, e);
            }
        }
    }
}
