//! Key-value persistence and the authoritative timer record.
//!
//! [`KeyValueStore`] is the narrow storage collaborator: a flat map of JSON
//! values with a change stream. [`TimerStateStore`] sits on top of it and
//! holds the one [`PomodoroState`] the coordinator mutates.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::types::PomodoroState;

// ============================================================================
// Constants
// ============================================================================

/// Store key holding the serialized timer record.
pub const STATE_KEY: &str = "pomodoroState";

/// Capacity of the change broadcast channel.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// StoreError
// ============================================================================

/// Errors raised by key-value stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed
    #[error("storage I/O failed for {}: {source}", .path.display())]
    Io {
        /// Backing file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The backing file does not hold valid JSON
    #[error("invalid storage file {}: {source}", .path.display())]
    Parse {
        /// Backing file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// The backing file holds JSON that is not an object
    #[error("storage file {} does not contain a JSON object", .0.display())]
    NotAnObject(PathBuf),

    /// A stored value could not be encoded
    #[error("failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),

    /// Injected failure (test doubles)
    #[error("store unavailable")]
    Unavailable,
}

// ============================================================================
// KeyValueStore
// ============================================================================

/// A write observed on a store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
    /// Key written
    pub key: String,
    /// New value
    pub value: Value,
}

/// Flat JSON key-value storage with change notification.
pub trait KeyValueStore: Send + Sync {
    /// Reads one key.
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Writes one key and notifies subscribers.
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Returns every stored key.
    fn snapshot(&self) -> Result<Map<String, Value>, StoreError>;

    /// Subscribes to writes made after this call.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory store. Writes can be made to fail for tests.
pub struct MemoryStore {
    entries: Mutex<Map<String, Value>>,
    changes: broadcast::Sender<StoreChange>,
    fail_writes: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            entries: Mutex::new(Map::new()),
            changes,
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Creates a store pre-populated with `entries`.
    pub fn with_entries(entries: Map<String, Value>) -> Self {
        let store = Self::new();
        *lock(&store.entries) = entries;
        store
    }

    /// Makes every subsequent `set` fail with [`StoreError::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        lock(&self.entries).insert(key.to_string(), value.clone());
        let _ = self.changes.send(StoreChange {
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    fn snapshot(&self) -> Result<Map<String, Value>, StoreError> {
        Ok(lock(&self.entries).clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

// ============================================================================
// JsonFileStore
// ============================================================================

/// Store backed by a single JSON object file.
///
/// The whole map is cached in memory; every write rewrites the file through
/// a temporary sibling and an atomic rename. The cache only changes once the
/// file write succeeded.
///
/// Writes are not fsynced: the timer record is rewritten on every tick, and
/// the rename alone keeps the file whole if the process dies mid-write.
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<Map<String, Value>>,
    changes: broadcast::Sender<StoreChange>,
}

impl JsonFileStore {
    /// Opens the store at `path`. A missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => Map::new(),
            Ok(contents) => {
                let value: Value =
                    serde_json::from_str(&contents).map_err(|source| StoreError::Parse {
                        path: path.clone(),
                        source,
                    })?;
                match value {
                    Value::Object(map) => map,
                    _ => return Err(StoreError::NotAnObject(path)),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No storage file at {}, starting empty", path.display());
                Map::new()
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        info!("Opened storage {} ({} keys)", path.display(), entries.len());

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            path,
            entries: Mutex::new(entries),
            changes,
        })
    }

    fn write_file(&self, entries: &Map<String, Value>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let bytes = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp).map_err(io_err)?;
            file.write_all(&bytes).map_err(io_err)?;
        }
        fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        {
            let mut entries = lock(&self.entries);
            let mut next = entries.clone();
            next.insert(key.to_string(), value.clone());
            self.write_file(&next)?;
            *entries = next;
        }
        let _ = self.changes.send(StoreChange {
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    fn snapshot(&self) -> Result<Map<String, Value>, StoreError> {
        Ok(lock(&self.entries).clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

// ============================================================================
// TimerStateStore
// ============================================================================

/// Holder of the single authoritative [`PomodoroState`].
///
/// Only the coordinator owns one. Persistence failures are logged and the
/// in-memory record stays authoritative.
pub struct TimerStateStore {
    kv: Arc<dyn KeyValueStore>,
    state: PomodoroState,
}

impl TimerStateStore {
    /// Loads the record from `kv`, falling back to defaults.
    ///
    /// A record that violates the state invariants is repaired.
    pub fn load(kv: Arc<dyn KeyValueStore>) -> Self {
        let state = match kv.get(STATE_KEY) {
            Ok(Some(value)) => match serde_json::from_value::<PomodoroState>(value) {
                Ok(stored) => {
                    let state = stored.clone().normalized();
                    if state != stored {
                        warn!("Repaired inconsistent stored timer state: {:?}", stored);
                    }
                    state
                }
                Err(e) => {
                    warn!("Ignoring unreadable stored timer state: {}", e);
                    PomodoroState::default()
                }
            },
            Ok(None) => PomodoroState::default(),
            Err(e) => {
                warn!("Failed to read stored timer state: {}", e);
                PomodoroState::default()
            }
        };

        Self { kv, state }
    }

    /// Returns the current record.
    pub fn state(&self) -> &PomodoroState {
        &self.state
    }

    /// Returns the underlying key-value store.
    pub fn kv(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }

    /// Replaces the record and persists it.
    ///
    /// Returns false (and writes nothing) when `next` equals the current
    /// record.
    pub fn commit(&mut self, next: PomodoroState) -> bool {
        if next == self.state {
            return false;
        }
        self.state = next;
        self.persist();
        true
    }

    /// Writes the current record to the key-value store.
    pub fn persist(&self) {
        let result = serde_json::to_value(&self.state)
            .map_err(StoreError::from)
            .and_then(|value| self.kv.set(STATE_KEY, value));

        if let Err(e) = result {
            warn!("Failed to persist timer state: {}", e);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TimerMode;
    use serde_json::json;
    use tempfile::TempDir;

    // ------------------------------------------------------------------------
    // MemoryStore Tests
    // ------------------------------------------------------------------------

    mod memory_store_tests {
        use super::*;

        #[test]
        fn test_get_missing_key() {
            let store = MemoryStore::new();
            assert_eq!(store.get("theme").unwrap(), None);
        }

        #[test]
        fn test_set_then_get() {
            let store = MemoryStore::new();
            store.set("theme", json!("dark")).unwrap();
            assert_eq!(store.get("theme").unwrap(), Some(json!("dark")));
        }

        #[test]
        fn test_set_notifies_subscribers() {
            let store = MemoryStore::new();
            let mut rx = store.subscribe();

            store.set("dotSize", json!(4)).unwrap();

            let change = rx.try_recv().unwrap();
            assert_eq!(change.key, "dotSize");
            assert_eq!(change.value, json!(4));
        }

        #[test]
        fn test_failing_writes() {
            let store = MemoryStore::new();
            store.set_fail_writes(true);

            assert!(matches!(
                store.set("theme", json!("dark")),
                Err(StoreError::Unavailable)
            ));
            assert_eq!(store.get("theme").unwrap(), None);
        }
    }

    // ------------------------------------------------------------------------
    // JsonFileStore Tests
    // ------------------------------------------------------------------------

    mod json_file_store_tests {
        use super::*;

        #[test]
        fn test_open_missing_file_is_empty() {
            let dir = TempDir::new().unwrap();
            let store = JsonFileStore::open(dir.path().join("storage.json")).unwrap();
            assert!(store.snapshot().unwrap().is_empty());
        }

        #[test]
        fn test_set_persists_across_reopen() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("nested").join("storage.json");

            let store = JsonFileStore::open(&path).unwrap();
            store.set("theme", json!("dark")).unwrap();
            store.set("tasks", json!(["write tests"])).unwrap();
            drop(store);

            let reopened = JsonFileStore::open(&path).unwrap();
            assert_eq!(reopened.get("theme").unwrap(), Some(json!("dark")));
            assert_eq!(reopened.get("tasks").unwrap(), Some(json!(["write tests"])));
            assert!(!path.with_extension("json.tmp").exists());
        }

        #[test]
        fn test_open_invalid_json_fails() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("storage.json");
            fs::write(&path, "{not json").unwrap();

            assert!(matches!(
                JsonFileStore::open(&path),
                Err(StoreError::Parse { .. })
            ));
        }

        #[test]
        fn test_open_non_object_fails() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("storage.json");
            fs::write(&path, "[1, 2, 3]").unwrap();

            assert!(matches!(
                JsonFileStore::open(&path),
                Err(StoreError::NotAnObject(_))
            ));
        }

        #[test]
        fn test_failed_write_leaves_store_unchanged() {
            let dir = TempDir::new().unwrap();
            let parent = dir.path().join("data");
            let path = parent.join("storage.json");

            let store = JsonFileStore::open(&path).unwrap();
            store.set("theme", json!("auto")).unwrap();
            let mut rx = store.subscribe();

            // Replace the storage directory with a plain file.
            fs::remove_dir_all(&parent).unwrap();
            fs::write(&parent, "not a directory").unwrap();

            let result = store.set("theme", json!("dark"));

            assert!(matches!(result, Err(StoreError::Io { .. })));
            assert_eq!(store.get("theme").unwrap(), Some(json!("auto")));
            assert_eq!(store.snapshot().unwrap().len(), 1);
            assert!(rx.try_recv().is_err());
        }
    }

    // ------------------------------------------------------------------------
    // TimerStateStore Tests
    // ------------------------------------------------------------------------

    mod timer_state_store_tests {
        use super::*;

        #[test]
        fn test_load_defaults_when_absent() {
            let store = TimerStateStore::load(Arc::new(MemoryStore::new()));
            assert_eq!(*store.state(), PomodoroState::default());
        }

        #[test]
        fn test_load_existing_record() {
            let mut entries = Map::new();
            entries.insert(
                STATE_KEY.to_string(),
                json!({"mode":"longBreak","isRunning":false,"durationSeconds":900,"timeLeftSeconds":420}),
            );
            let store = TimerStateStore::load(Arc::new(MemoryStore::with_entries(entries)));

            assert_eq!(store.state().mode, TimerMode::LongBreak);
            assert_eq!(store.state().time_left_seconds, 420);
        }

        #[test]
        fn test_load_repairs_inconsistent_record() {
            let mut entries = Map::new();
            entries.insert(
                STATE_KEY.to_string(),
                json!({"mode":"pomodoro","isRunning":true,"durationSeconds":60,"timeLeftSeconds":0}),
            );
            let store = TimerStateStore::load(Arc::new(MemoryStore::with_entries(entries)));

            assert_eq!(store.state().mode, TimerMode::Focus);
            assert!(!store.state().is_running);
            assert!(store.state().is_consistent());
        }

        #[test]
        fn test_load_ignores_garbage() {
            let mut entries = Map::new();
            entries.insert(STATE_KEY.to_string(), json!("garbage"));
            let store = TimerStateStore::load(Arc::new(MemoryStore::with_entries(entries)));

            assert_eq!(*store.state(), PomodoroState::default());
        }

        #[test]
        fn test_commit_persists_changes_only() {
            let kv = Arc::new(MemoryStore::new());
            let mut rx = kv.subscribe();
            let mut store = TimerStateStore::load(kv.clone());

            assert!(!store.commit(PomodoroState::default()));
            assert!(rx.try_recv().is_err());

            let next = PomodoroState::idle(TimerMode::ShortBreak, 300);
            assert!(store.commit(next.clone()));
            assert_eq!(rx.try_recv().unwrap().key, STATE_KEY);
            assert_eq!(
                kv.get(STATE_KEY).unwrap(),
                Some(serde_json::to_value(&next).unwrap())
            );
        }

        #[test]
        fn test_commit_survives_store_failure() {
            let kv = Arc::new(MemoryStore::new());
            kv.set_fail_writes(true);
            let mut store = TimerStateStore::load(kv.clone());

            let next = PomodoroState::idle(TimerMode::LongBreak, 900);
            assert!(store.commit(next.clone()));
            assert_eq!(*store.state(), next);
            assert_eq!(kv.get(STATE_KEY).unwrap(), None);
        }
    }
}
