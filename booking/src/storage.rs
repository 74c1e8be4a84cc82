//! Durable storage for the booking session.
//!
//! The session survives restarts as JSON values under four well-known keys.
//! [`FileStorage`] keeps them in a single JSON file; [`Persisted`] writes them
//! after every reduce that changed the persisted state.

use cinebook_core::effect::Effect;
use cinebook_core::environment::{KeyValueStorage, StorageError};
use cinebook_core::reducer::Reducer;
use serde::de::DeserializeOwned;
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Key of the booking session snapshot
pub const SESSION_KEY: &str = "bookingSession";

/// Key of the current booking step
pub const STEP_KEY: &str = "bookingStep";

/// Key of the payment window start marker
pub const PAYMENT_TIMER_KEY: &str = "paymentTimerStart";

/// Key of the payment-session-active marker
pub const PAYMENT_ACTIVE_KEY: &str = "paymentSessionActive";

/// Read and decode the JSON value under `key`
///
/// Missing, unreadable and corrupt entries all yield `None`; the latter two are
/// logged.
pub fn read_json<T: DeserializeOwned>(storage: &dyn KeyValueStorage, key: &str) -> Option<T> {
    let raw = match storage.get(key) {
        Ok(raw) => raw?,
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to read stored value");
            return None;
        },
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "Discarding corrupt stored value");
            None
        },
    }
}

/// Write `value` as JSON under `key`, or remove the key when `value` is `None`
///
/// Failures are logged and otherwise ignored.
pub fn write_json<T: Serialize>(storage: &dyn KeyValueStorage, key: &str, value: Option<&T>) {
    let result = match value {
        Some(value) => serde_json::to_string(value)
            .map_err(|e| StorageError::Serialization(e.to_string()))
            .and_then(|json| storage.set(key, &json)),
        None => storage.remove(key),
    };

    if let Err(e) = result {
        tracing::warn!(key, error = %e, "Failed to persist booking state");
    }
}

/// State with a durable part
pub trait PersistentState {
    /// Counter bumped by every mutation of the durable part
    fn revision(&self) -> u64;

    /// Write the durable part to `storage`
    fn persist(&self, storage: &dyn KeyValueStorage);
}

/// Environment that provides durable storage
pub trait HasStorage {
    /// The storage backend
    fn storage(&self) -> &dyn KeyValueStorage;
}

/// Reducer decorator that persists the state after each changing reduce
///
/// Writes happen synchronously while the store holds its write lock, so
/// snapshots land in the order the actions were reduced.
#[derive(Debug, Clone)]
pub struct Persisted<R> {
    inner: R,
}

impl<R> Persisted<R> {
    /// Wrap `inner`
    #[must_use]
    pub const fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R> Reducer for Persisted<R>
where
    R: Reducer,
    R::State: PersistentState,
    R::Environment: HasStorage,
{
    type State = R::State;
    type Action = R::Action;
    type Environment = R::Environment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let before = state.revision();
        let effects = self.inner.reduce(state, action, env);

        if state.revision() != before {
            state.persist(env.storage());
        }

        effects
    }
}

/// [`KeyValueStorage`] backed by a JSON object in a single file
///
/// The file is read once on open and rewritten (via a temporary file and
/// rename) on every change. There is no lock across processes.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open `path`, starting empty if the file is missing or unreadable as JSON
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the file exists but cannot be read.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Storage file is corrupt, starting empty");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "Opened session storage");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Location of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.flush(&entries)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use cinebook_testing::InMemoryStorage;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("cinebook-{name}-{}.json", std::process::id()))
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let path = temp_path("reopen");
        let _ = std::fs::remove_file(&path);

        let storage = FileStorage::open(&path).unwrap();
        storage.set(STEP_KEY, "\"payment\"").unwrap();
        storage.set(PAYMENT_ACTIVE_KEY, "true").unwrap();
        storage.remove(PAYMENT_ACTIVE_KEY).unwrap();
        drop(storage);

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get(STEP_KEY).unwrap().as_deref(), Some("\"payment\""));
        assert_eq!(reopened.get(PAYMENT_ACTIVE_KEY).unwrap(), None);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_file_storage_tolerates_corrupt_file() {
        let path = temp_path("corrupt");
        std::fs::write(&path, "{not json").unwrap();

        let storage = FileStorage::open(&path).unwrap();
        assert_eq!(storage.get(SESSION_KEY).unwrap(), None);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_read_json_discards_corrupt_values() {
        let storage = InMemoryStorage::new();
        storage.set(STEP_KEY, "not-json").unwrap();
        assert_eq!(read_json::<String>(&storage, STEP_KEY), None);
        assert_eq!(read_json::<String>(&storage, SESSION_KEY), None);
    }

    #[test]
    fn test_write_json_removes_absent_values_and_survives_failures() {
        let storage = InMemoryStorage::new();
        write_json(&storage, PAYMENT_TIMER_KEY, Some(&42_i64));
        assert_eq!(storage.get(PAYMENT_TIMER_KEY).unwrap().as_deref(), Some("42"));

        write_json::<i64>(&storage, PAYMENT_TIMER_KEY, None);
        assert!(storage.keys().is_empty());

        storage.fail_writes(true);
        write_json(&storage, PAYMENT_TIMER_KEY, Some(&7_i64));
        assert!(storage.keys().is_empty());
    }
}
