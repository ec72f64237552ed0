//! # Storage Backends
//!
//! This module defines the key-value contract every component reads and
//! writes through, and the two backends shipped with the crate.
//!
//! ## Design
//!
//! - **`Storage`**: get/put/delete, prefix scan, and an all-or-nothing
//!   multi-key commit. Absence is `Ok(None)`, never an error.
//!
//! - **`LockProvider`**: leases with a TTL and named mutexes bound to a
//!   lease. A backend advertises it through [`Storage::lock_provider`];
//!   callers that need the lock fail closed when it returns `None`.
//!
//! `MemoryStore` is used by tests and embedders, `FileStore` by the CLI so
//! state survives between invocations.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::Result;

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Key-value backend contract.
pub trait Storage: Send + Sync {
    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Fetch the value under `key`; `Ok(None)` when absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Remove `key`. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// All entries whose key starts with `prefix`; empty when none match.
    fn get_by_prefix(&self, prefix: &str) -> Result<BTreeMap<String, Vec<u8>>>;

    /// Remove all entries whose key starts with `prefix`.
    fn delete_by_prefix(&self, prefix: &str) -> Result<()>;

    /// Apply every put and every delete, or none of them.
    ///
    /// Deletes are applied before puts, so a key present in both ends up
    /// holding the new value.
    fn atomic_commit(&self, puts: &BTreeMap<String, Vec<u8>>, deletes: &[String]) -> Result<()>;

    /// The backend's lock capability, if it has one.
    fn lock_provider(&self) -> Option<&dyn LockProvider> {
        None
    }
}

/// A time-limited grant that locks are attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub id: u64,
    pub ttl: Duration,
}

/// Lease and named-mutex capability of a backend.
pub trait LockProvider: Send + Sync {
    /// Grant a lease that expires `ttl` from now.
    fn grant_lease(&self, ttl: Duration) -> Result<Lease>;

    /// Acquire the mutex `name` on behalf of `lease`, waiting at most `timeout`.
    ///
    /// A mutex whose holder's lease has expired is free.
    fn lock(&self, name: &str, lease: &Lease, timeout: Duration) -> Result<()>;

    /// Push the expiry of a live `lease` out to a full TTL from now.
    ///
    /// Fails with `LockUnavailable` when the lease has already expired.
    fn keep_alive(&self, lease: &Lease) -> Result<()>;

    /// Whether `lease` is live and currently holds the mutex `name`.
    fn holds(&self, name: &str, lease: &Lease) -> Result<bool>;

    /// Release `name` if `lease` holds it.
    fn unlock(&self, name: &str, lease: &Lease) -> Result<()>;

    /// End the lease, releasing everything still attached to it.
    fn revoke_lease(&self, lease: &Lease) -> Result<()>;
}
