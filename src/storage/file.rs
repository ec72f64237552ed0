//! File-backed storage backend
//!
//! The whole key space lives in one JSON document, `store.json`, under the
//! store root. Every mutation rewrites it through a per-writer temporary file
//! and a rename, so a multi-key commit lands completely or not at all.
//! Writers in different processes take `store.json.lock` around each
//! read-modify-write cycle.
//!
//! Named mutexes are lock files under `locks/`. Each records the owning
//! lease and the wall-clock instant it expires. Lock files are published
//! with a hard link from a fully written temporary file, so they are never
//! seen half-written. An expired lock file is free; one that cannot be parsed
//! counts as held until its mtime is older than the claimant's TTL.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::{Lease, LockProvider, Storage};
use crate::error::{Error, Result};

const DATA_FILE: &str = "store.json";
const DATA_LOCK: &str = "store.json.lock";
const LOCK_DIR: &str = "locks";
const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// How long one writer may keep `store.json.lock` before others reap it
const DATA_LOCK_TTL: Duration = Duration::from_secs(10);
const DATA_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

static UNIQUE: AtomicU64 = AtomicU64::new(0);

/// Stored values are kept readable when they are UTF-8.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredValue {
    Text(String),
    Bytes(Vec<u8>),
}

impl StoredValue {
    fn from_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => StoredValue::Text(text.to_string()),
            Err(_) => StoredValue::Bytes(bytes.to_vec()),
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        match self {
            StoredValue::Text(text) => text.into_bytes(),
            StoredValue::Bytes(bytes) => bytes,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockRecord {
    lease: u64,
    expires_at_ms: u128,
}

/// What currently sits at a lock file path, from one owner's point of view.
#[derive(Debug)]
enum Holder {
    Vacant,
    Owned,
    Live,
    /// Expired or abandoned; carries the bytes that were inspected
    Stale(Vec<u8>),
}

#[derive(Debug)]
struct LeaseState {
    expires_at_ms: u128,
    held: HashSet<String>,
}

/// Key-value store persisted under a directory
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    /// Serialises read-modify-write cycles within this process
    write_guard: Mutex<()>,
    /// Leases granted by this process and the locks they hold
    leases: Mutex<BTreeMap<u64, LeaseState>>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(LOCK_DIR))?;
        Ok(Self {
            root,
            write_guard: Mutex::new(()),
            leases: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn data_path(&self) -> PathBuf {
        self.root.join(DATA_FILE)
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        let encoded: String = name
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(LOCK_DIR).join(format!("{}.lock", encoded))
    }

    fn load(&self) -> Result<BTreeMap<String, StoredValue>> {
        match fs::read(self.data_path()) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, entries: &BTreeMap<String, StoredValue>) -> Result<()> {
        let tmp = sibling(&self.data_path(), "tmp");
        let serialized = serde_json::to_vec_pretty(entries)?;
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&serialized)?;
        file.sync_all()?;
        fs::rename(&tmp, self.data_path())?;
        Ok(())
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_guard.lock().map_err(|_| Error::LockPoisoned {
            context: "file store write guard".to_string(),
        })
    }

    fn lease_table(&self) -> Result<MutexGuard<'_, BTreeMap<u64, LeaseState>>> {
        self.leases.lock().map_err(|_| Error::LockPoisoned {
            context: "file store leases".to_string(),
        })
    }

    /// Apply `mutate` to the loaded entries and persist the result.
    fn modify<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, StoredValue>),
    {
        let _guard = self.guard()?;
        let _data = DataLock::acquire(self.root.join(DATA_LOCK))?;
        let mut entries = self.load()?;
        mutate(&mut entries);
        self.save(&entries)
    }

    /// Expiry of a live lease granted by this store.
    fn live_lease(&self, lease: &Lease) -> Result<u128> {
        match self.lease_table()?.get(&lease.id) {
            Some(state) if state.expires_at_ms > now_ms() => Ok(state.expires_at_ms),
            Some(_) => Err(Error::LockUnavailable {
                message: format!("lease {} expired", lease.id),
            }),
            None => Err(Error::LockUnavailable {
                message: format!("unknown lease {}", lease.id),
            }),
        }
    }
}

/// A path next to `path` that no other writer will pick.
fn sibling(path: &Path, tag: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(
        ".{}.{}.{}",
        process::id(),
        UNIQUE.fetch_add(1, Ordering::Relaxed),
        tag
    ));
    path.with_file_name(name)
}

fn fresh_id() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    nanos ^ (u64::from(process::id()) << 32) ^ UNIQUE.fetch_add(1, Ordering::Relaxed)
}

fn ignore_missing(err: std::io::Error) -> std::io::Result<()> {
    if err.kind() == ErrorKind::NotFound {
        Ok(())
    } else {
        Err(err)
    }
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Classify the lock file at `path` for the owner `lease`.
fn inspect(path: &Path, lease: u64, unreadable_ttl: Duration) -> Result<Holder> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Holder::Vacant),
        Err(err) => return Err(err.into()),
    };
    match serde_json::from_slice::<LockRecord>(&bytes) {
        Ok(held) if held.expires_at_ms <= now_ms() => Ok(Holder::Stale(bytes)),
        Ok(held) if held.lease == lease => Ok(Holder::Owned),
        Ok(_) => Ok(Holder::Live),
        Err(_) => {
            let modified = match fs::metadata(path).and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Holder::Vacant),
                Err(err) => return Err(err.into()),
            };
            if modified + unreadable_ttl > SystemTime::now() {
                Ok(Holder::Live)
            } else {
                Ok(Holder::Stale(bytes))
            }
        }
    }
}

/// Write `record` to a private file and move it to `path`.
///
/// With `replace` unset the move fails with `AlreadyExists` if `path` exists.
fn publish(path: &Path, record: &LockRecord, replace: bool) -> std::io::Result<()> {
    let tmp = sibling(path, "new");
    let mut file = fs::File::create(&tmp)?;
    file.write_all(&serde_json::to_vec(record)?)?;
    file.sync_all()?;
    drop(file);

    let moved = if replace {
        fs::rename(&tmp, path)
    } else {
        fs::hard_link(&tmp, path)
    };
    fs::remove_file(&tmp).or_else(ignore_missing)?;
    moved
}

/// Remove a stale lock file unless it changed since it was inspected.
fn reap(path: &Path, inspected: &[u8]) -> Result<()> {
    let tomb = sibling(path, "stale");
    match fs::rename(path, &tomb) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    }
    if fs::read(&tomb)? == inspected {
        warn!("removed stale lock file {}", path.display());
    } else if let Err(err) = fs::hard_link(&tomb, path) {
        // someone published a fresh lock in between; hand it back
        warn!("could not restore lock file {}: {}", path.display(), err);
    }
    fs::remove_file(&tomb).or_else(ignore_missing)?;
    Ok(())
}

/// Try once to own the lock file at `path`; `Ok(false)` while someone else does.
fn claim(path: &Path, record: &LockRecord, unreadable_ttl: Duration) -> Result<bool> {
    match publish(path, record, false) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            match inspect(path, record.lease, unreadable_ttl)? {
                Holder::Owned => Ok(true),
                Holder::Vacant | Holder::Live => Ok(false),
                Holder::Stale(bytes) => {
                    reap(path, &bytes)?;
                    Ok(false)
                }
            }
        }
        Err(err) => Err(err.into()),
    }
}

/// Cross-process guard around one read-modify-write of `store.json`.
struct DataLock {
    path: PathBuf,
    token: u64,
}

impl DataLock {
    fn acquire(path: PathBuf) -> Result<Self> {
        let token = fresh_id();
        let deadline = Instant::now() + DATA_LOCK_TIMEOUT;
        loop {
            let record = LockRecord {
                lease: token,
                expires_at_ms: now_ms() + DATA_LOCK_TTL.as_millis(),
            };
            if claim(&path, &record, DATA_LOCK_TTL)? {
                return Ok(Self { path, token });
            }
            if Instant::now() >= deadline {
                return Err(Error::storage(
                    "write",
                    format!("timed out waiting for {}", path.display()),
                ));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Drop for DataLock {
    fn drop(&mut self) {
        let owned = matches!(
            inspect(&self.path, self.token, DATA_LOCK_TTL),
            Ok(Holder::Owned)
        );
        if owned {
            if let Err(err) = fs::remove_file(&self.path).or_else(ignore_missing) {
                warn!("failed to remove {}: {}", self.path.display(), err);
            }
        }
    }
}

impl Storage for FileStore {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.modify(|entries| {
            entries.insert(key.to_string(), StoredValue::from_bytes(value));
        })
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.load()?.remove(key).map(StoredValue::into_bytes))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.modify(|entries| {
            entries.remove(key);
        })
    }

    fn get_by_prefix(&self, prefix: &str) -> Result<BTreeMap<String, Vec<u8>>> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key, value.into_bytes()))
            .collect())
    }

    fn delete_by_prefix(&self, prefix: &str) -> Result<()> {
        self.modify(|entries| entries.retain(|key, _| !key.starts_with(prefix)))
    }

    fn atomic_commit(&self, puts: &BTreeMap<String, Vec<u8>>, deletes: &[String]) -> Result<()> {
        self.modify(|entries| {
            for key in deletes {
                entries.remove(key);
            }
            for (key, value) in puts {
                entries.insert(key.clone(), StoredValue::from_bytes(value));
            }
        })
    }

    fn lock_provider(&self) -> Option<&dyn LockProvider> {
        Some(self)
    }
}

impl LockProvider for FileStore {
    fn grant_lease(&self, ttl: Duration) -> Result<Lease> {
        let mut table = self.lease_table()?;
        let mut id = fresh_id();
        while table.contains_key(&id) {
            id = id.wrapping_add(1);
        }
        table.insert(
            id,
            LeaseState {
                expires_at_ms: now_ms() + ttl.as_millis(),
                held: HashSet::new(),
            },
        );
        Ok(Lease { id, ttl })
    }

    fn lock(&self, name: &str, lease: &Lease, timeout: Duration) -> Result<()> {
        let path = self.lock_path(name);
        let deadline = Instant::now() + timeout;
        loop {
            let record = LockRecord {
                lease: lease.id,
                expires_at_ms: self.live_lease(lease)?,
            };
            if claim(&path, &record, lease.ttl)? {
                if let Some(state) = self.lease_table()?.get_mut(&lease.id) {
                    state.held.insert(name.to_string());
                }
                debug!("lease {} acquired lock file for '{}'", lease.id, name);
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::LockUnavailable {
                    message: format!(
                        "timed out after {}ms waiting for '{}'",
                        timeout.as_millis(),
                        name
                    ),
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn keep_alive(&self, lease: &Lease) -> Result<()> {
        self.live_lease(lease)?;
        let expires_at_ms = now_ms() + lease.ttl.as_millis();
        let held: Vec<String> = {
            let mut table = self.lease_table()?;
            match table.get_mut(&lease.id) {
                Some(state) => {
                    state.expires_at_ms = expires_at_ms;
                    state.held.iter().cloned().collect()
                }
                None => Vec::new(),
            }
        };

        for name in held {
            let path = self.lock_path(&name);
            match inspect(&path, lease.id, lease.ttl)? {
                Holder::Owned => {
                    let record = LockRecord {
                        lease: lease.id,
                        expires_at_ms,
                    };
                    publish(&path, &record, true)?;
                }
                _ => {
                    return Err(Error::LockUnavailable {
                        message: format!("lease {} no longer holds '{}'", lease.id, name),
                    })
                }
            }
        }
        Ok(())
    }

    fn holds(&self, name: &str, lease: &Lease) -> Result<bool> {
        if self.live_lease(lease).is_err() {
            return Ok(false);
        }
        let path = self.lock_path(name);
        Ok(matches!(inspect(&path, lease.id, lease.ttl)?, Holder::Owned))
    }

    fn unlock(&self, name: &str, lease: &Lease) -> Result<()> {
        let path = self.lock_path(name);
        if let Holder::Owned = inspect(&path, lease.id, lease.ttl)? {
            fs::remove_file(&path).or_else(ignore_missing)?;
            debug!("lease {} released lock file for '{}'", lease.id, name);
        }
        if let Some(state) = self.lease_table()?.get_mut(&lease.id) {
            state.held.remove(name);
        }
        Ok(())
    }

    fn revoke_lease(&self, lease: &Lease) -> Result<()> {
        let held = self
            .lease_table()?
            .remove(&lease.id)
            .map(|state| state.held)
            .unwrap_or_default();
        for name in held {
            self.unlock(&name, lease)?;
        }
        Ok(())
    }
}
