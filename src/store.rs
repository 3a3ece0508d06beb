//! Key-value store abstraction
//!
//! The store is the system of record: a durable, process-local,
//! string-keyed store of string values with no transactions. Change
//! notification is best-effort and same-process only - a broadcast of
//! changed key names that consumers may miss, which is why the sync
//! layer also re-polls.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::RouteError;

/// Capacity of the changed-key broadcast channel.
const WATCH_CAPACITY: usize = 64;

/// Durable string-keyed store of string values.
///
/// `compare_and_swap` is the only multi-writer primitive: it succeeds
/// iff the stored value still equals `current`, with `None` meaning
/// "key absent".
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, RouteError>;

    fn set(&self, key: &str, value: &str) -> Result<(), RouteError>;

    fn compare_and_swap(
        &self,
        key: &str,
        current: Option<&str>,
        new: Option<&str>,
    ) -> Result<bool, RouteError>;

    fn delete(&self, key: &str) -> Result<(), RouteError>;

    /// Subscribe to best-effort changed-key notifications. Delivery is
    /// not guaranteed; consumers must still re-poll.
    fn watch(&self) -> broadcast::Receiver<String>;
}

/// Sled-backed store.
pub struct SledStore {
    db: sled::Db,
    changes: broadcast::Sender<String>,
}

impl SledStore {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RouteError> {
        let db = sled::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "Opened route store");
        let (changes, _) = broadcast::channel(WATCH_CAPACITY);
        Ok(Self { db, changes })
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), RouteError> {
        self.db.flush()?;
        Ok(())
    }

    fn notify(&self, key: &str) {
        // Ignore send errors (no subscribers)
        let _ = self.changes.send(key.to_string());
    }
}

impl KvStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<String>, RouteError> {
        Ok(self
            .db
            .get(key.as_bytes())?
            .map(|value| String::from_utf8_lossy(&value).into_owned()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), RouteError> {
        self.db.insert(key.as_bytes(), value.as_bytes())?;
        self.notify(key);
        Ok(())
    }

    fn compare_and_swap(
        &self,
        key: &str,
        current: Option<&str>,
        new: Option<&str>,
    ) -> Result<bool, RouteError> {
        let outcome = self.db.compare_and_swap(
            key.as_bytes(),
            current.map(str::as_bytes),
            new.map(|v| sled::IVec::from(v.as_bytes())),
        )?;
        match outcome {
            Ok(()) => {
                self.notify(key);
                Ok(true)
            }
            Err(conflict) => {
                debug!(key = %key, current = ?conflict.current, "Compare-and-swap lost");
                Ok(false)
            }
        }
    }

    fn delete(&self, key: &str) -> Result<(), RouteError> {
        if self.db.remove(key.as_bytes())?.is_some() {
            self.notify(key);
        }
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }
}

/// In-memory store for tests and ephemeral use.
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
    changes: broadcast::Sender<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            map: Mutex::new(HashMap::new()),
            changes,
        }
    }

    fn notify(&self, key: &str) {
        let _ = self.changes.send(key.to_string());
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, RouteError> {
        let map = self.map.lock().expect("store lock poisoned");
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), RouteError> {
        let mut map = self.map.lock().expect("store lock poisoned");
        map.insert(key.to_string(), value.to_string());
        drop(map);
        self.notify(key);
        Ok(())
    }

    fn compare_and_swap(
        &self,
        key: &str,
        current: Option<&str>,
        new: Option<&str>,
    ) -> Result<bool, RouteError> {
        let mut map = self.map.lock().expect("store lock poisoned");
        let stored = map.get(key).map(String::as_str);
        if stored != current {
            return Ok(false);
        }
        match new {
            Some(value) => {
                map.insert(key.to_string(), value.to_string());
            }
            None => {
                map.remove(key);
            }
        }
        drop(map);
        self.notify(key);
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<(), RouteError> {
        let mut map = self.map.lock().expect("store lock poisoned");
        let existed = map.remove(key).is_some();
        drop(map);
        if existed {
            self.notify(key);
        }
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }
}
