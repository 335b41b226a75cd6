//! Key-value store adapter
//!
//! Every component persists its state as a JSON string under its own
//! namespaced key. The adapter only moves strings; encoding is handled by
//! the `load_*` / `save_json` helpers, which also implement the recovery
//! rules: unreadable values are treated as absent and failed writes degrade
//! to session-only results instead of errors.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sled::Db;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tracing::{debug, warn};

use crate::errors::{SafeReadLock, SafeWriteLock, StoreError, StoreResult};

const SLED_TREE: &str = "medprompt";

/// Persistent string store shared by all components.
pub trait KvStore: Send + Sync {
    /// Returns the stored string, or `None` when absent or unreadable.
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    fn remove(&self, key: &str) -> StoreResult<()>;
}

fn validate_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::validation("key", "must not be empty"));
    }
    Ok(())
}

/// Whether a mutation reached durable storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Durability {
    Persisted,
    /// The result holds for the current session only.
    SessionOnly { reason: String },
}

impl Durability {
    pub fn is_persisted(&self) -> bool {
        matches!(self, Durability::Persisted)
    }

    fn from_result(result: StoreResult<()>) -> Self {
        match result {
            Ok(()) => Durability::Persisted,
            Err(e) => Durability::SessionOnly {
                reason: e.to_string(),
            },
        }
    }
}

/// Result of a mutating operation together with its durability.
#[derive(Debug, Clone, PartialEq)]
pub struct Tracked<T> {
    pub value: T,
    pub durability: Durability,
}

impl<T> Tracked<T> {
    pub fn new(value: T, durability: Durability) -> Self {
        Self { value, durability }
    }

    pub fn persisted(value: T) -> Self {
        Self::new(value, Durability::Persisted)
    }

    pub fn is_persisted(&self) -> bool {
        self.durability.is_persisted()
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Tracked<U> {
        Tracked {
            value: f(self.value),
            durability: self.durability,
        }
    }
}

/// Decode the JSON value under `key`. Absent and malformed values both
/// yield `None`; malformed ones are logged.
pub fn load_opt<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key = %key, error = %e, "discarding malformed stored value");
            None
        }
    }
}

/// Decode the JSON array under `key` one element at a time.
///
/// Elements that do not decode are logged and skipped. A value that is not
/// an array reads as empty.
pub fn load_list<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Vec<T> {
    let Some(items) = load_opt::<Vec<Value>>(store, key) else {
        return Vec::new();
    };
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, index, error = %e, "skipping unreadable stored entry");
                None
            }
        })
        .collect()
}

pub fn load_or_default<T: DeserializeOwned + Default>(store: &dyn KvStore, key: &str) -> T {
    load_opt(store, key).unwrap_or_default()
}

/// Encode `value` as JSON and write it under `key`.
pub fn save_json<T: Serialize + ?Sized>(store: &dyn KvStore, key: &str, value: &T) -> Durability {
    let result = serde_json::to_string(value)
        .map_err(|e| StoreError::serialization(format!("encoding {key}"), e))
        .and_then(|encoded| store.set(key, &encoded));

    if let Err(e) = &result {
        warn!(key = %key, error = %e, "write failed, keeping result for this session only");
    }
    Durability::from_result(result)
}

pub fn remove_key(store: &dyn KvStore, key: &str) -> Durability {
    let result = store.remove(key);
    if let Err(e) = &result {
        warn!(key = %key, error = %e, "remove failed");
    }
    Durability::from_result(result)
}

/// Session-scoped store. Data lives as long as the value.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, String>>,
    reject_writes: AtomicBool,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes always fail, as with exhausted quota.
    pub fn failing_writes() -> Self {
        let store = Self::default();
        store.set_reject_writes(true);
        store
    }

    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.safe_read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self, operation: &str) -> StoreResult<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(operation));
        }
        Ok(())
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Option<String> {
        if key.is_empty() {
            return None;
        }
        self.entries.safe_read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        validate_key(key)?;
        self.check_writable("set")?;
        self.entries
            .safe_write()?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        self.check_writable("remove")?;
        self.entries.safe_write()?.remove(key);
        Ok(())
    }
}

/// sled-backed store that survives restarts.
pub struct SledKvStore {
    db: Db,
}

impl SledKvStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .map_err(|e| StoreError::database(format!("open {}", path.display()), e))?;
        debug!(path = %path.display(), "opened sled store");
        Ok(Self { db })
    }

    fn tree(&self) -> StoreResult<sled::Tree> {
        self.db
            .open_tree(SLED_TREE)
            .map_err(|e| StoreError::database("open tree", e))
    }
}

impl KvStore for SledKvStore {
    fn get(&self, key: &str) -> Option<String> {
        if key.is_empty() {
            return None;
        }
        let tree = match self.tree() {
            Ok(tree) => tree,
            Err(e) => {
                warn!(key = %key, error = %e, "read failed");
                return None;
            }
        };
        match tree.get(key.as_bytes()) {
            Ok(Some(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = %key, error = %e, "stored value is not UTF-8");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "read failed");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        validate_key(key)?;
        let tree = self.tree()?;
        tree.insert(key.as_bytes(), value.as_bytes())?;
        tree.flush()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        let tree = self.tree()?;
        tree.remove(key.as_bytes())?;
        tree.flush()?;
        Ok(())
    }
}
