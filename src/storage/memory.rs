//! In-memory storage backend with lease-aware named mutexes

use std::collections::{BTreeMap, HashMap};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::debug;

use super::{Lease, LockProvider, Storage};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct LockTable {
    /// Live leases and when they expire
    leases: HashMap<u64, Instant>,
    /// Mutex name -> holding lease
    held: HashMap<String, u64>,
    next_lease: u64,
}

impl LockTable {
    /// Drop expired leases and every mutex they held.
    fn expire(&mut self, now: Instant) {
        self.leases.retain(|_, deadline| *deadline > now);
        let leases = &self.leases;
        self.held.retain(|_, lease| leases.contains_key(lease));
    }
}

/// Thread-safe in-memory key-value store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
    locks: Mutex<LockTable>,
    released: Condvar,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored keys
    pub fn len(&self) -> Result<usize> {
        Ok(self.entries()?.len())
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.entries()?.is_empty())
    }

    /// Snapshot of every key currently stored
    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries()?.keys().cloned().collect())
    }

    fn entries(&self) -> Result<MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.entries.lock().map_err(|_| Error::LockPoisoned {
            context: "memory store entries".to_string(),
        })
    }

    fn lock_table(&self) -> Result<MutexGuard<'_, LockTable>> {
        self.locks.lock().map_err(|_| Error::LockPoisoned {
            context: "memory store lock table".to_string(),
        })
    }
}

impl Storage for MemoryStore {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }

    fn get_by_prefix(&self, prefix: &str) -> Result<BTreeMap<String, Vec<u8>>> {
        let entries = self.entries()?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn delete_by_prefix(&self, prefix: &str) -> Result<()> {
        self.entries()?.retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }

    fn atomic_commit(&self, puts: &BTreeMap<String, Vec<u8>>, deletes: &[String]) -> Result<()> {
        // One guard for the whole batch: readers see all of it or none.
        let mut entries = self.entries()?;
        for key in deletes {
            entries.remove(key);
        }
        for (key, value) in puts {
            entries.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn lock_provider(&self) -> Option<&dyn LockProvider> {
        Some(self)
    }
}

impl LockProvider for MemoryStore {
    fn grant_lease(&self, ttl: Duration) -> Result<Lease> {
        let mut table = self.lock_table()?;
        table.next_lease += 1;
        let id = table.next_lease;
        table.leases.insert(id, Instant::now() + ttl);
        Ok(Lease { id, ttl })
    }

    fn lock(&self, name: &str, lease: &Lease, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut table = self.lock_table()?;
        loop {
            let now = Instant::now();
            table.expire(now);

            let Some(&own_expiry) = table.leases.get(&lease.id) else {
                return Err(Error::LockUnavailable {
                    message: format!("lease {} expired before '{}' was acquired", lease.id, name),
                });
            };

            let holder = table.held.get(name).copied();
            match holder {
                None => {
                    table.held.insert(name.to_string(), lease.id);
                    debug!("lease {} acquired '{}'", lease.id, name);
                    return Ok(());
                }
                Some(holder) if holder == lease.id => return Ok(()),
                Some(holder) => {
                    if now >= deadline {
                        return Err(Error::LockUnavailable {
                            message: format!(
                                "timed out after {}ms waiting for '{}' (held by lease {})",
                                timeout.as_millis(),
                                name,
                                holder
                            ),
                        });
                    }
                    // Wake up no later than when the holder's lease runs out.
                    let holder_expiry = table.leases.get(&holder).copied().unwrap_or(now);
                    let wake = deadline.min(holder_expiry).min(own_expiry).max(now);
                    let wait = (wake - now).max(Duration::from_millis(1));
                    let (guard, _) =
                        self.released
                            .wait_timeout(table, wait)
                            .map_err(|_| Error::LockPoisoned {
                                context: "memory store lock table".to_string(),
                            })?;
                    table = guard;
                }
            }
        }
    }

    fn keep_alive(&self, lease: &Lease) -> Result<()> {
        let now = Instant::now();
        let mut table = self.lock_table()?;
        table.expire(now);
        match table.leases.get_mut(&lease.id) {
            Some(deadline) => {
                *deadline = now + lease.ttl;
                Ok(())
            }
            None => Err(Error::LockUnavailable {
                message: format!("lease {} expired", lease.id),
            }),
        }
    }

    fn holds(&self, name: &str, lease: &Lease) -> Result<bool> {
        let mut table = self.lock_table()?;
        table.expire(Instant::now());
        Ok(table.held.get(name) == Some(&lease.id))
    }

    fn unlock(&self, name: &str, lease: &Lease) -> Result<()> {
        let mut table = self.lock_table()?;
        if table.held.get(name) == Some(&lease.id) {
            table.held.remove(name);
            debug!("lease {} released '{}'", lease.id, name);
        }
        drop(table);
        self.released.notify_all();
        Ok(())
    }

    fn revoke_lease(&self, lease: &Lease) -> Result<()> {
        let mut table = self.lock_table()?;
        table.leases.remove(&lease.id);
        table.held.retain(|_, holder| *holder != lease.id);
        drop(table);
        self.released.notify_all();
        Ok(())
    }
}
