//! # Cinebook Testing
//!
//! Testing utilities and helpers for the Cinebook booking flow.
//!
//! This crate provides:
//! - Mock implementations of Environment traits (clocks, storage)
//! - A Given-When-Then harness for reducers
//! - Assertion helpers for effects
//!
//! ## Example
//!
//! ```
//! use cinebook_testing::mocks::{InMemoryStorage, ManualClock};
//! use cinebook_core::environment::{Clock, KeyValueStorage};
//! use chrono::Duration;
//!
//! let clock = ManualClock::at_rfc3339("2025-01-14T19:00:00Z");
//! let start = clock.now();
//! clock.advance(Duration::seconds(30));
//! assert_eq!((clock.now() - start).num_seconds(), 30);
//!
//! let storage = InMemoryStorage::new();
//! storage.set("bookingStep", "\"payment\"").unwrap();
//! assert_eq!(storage.get("bookingStep").unwrap().as_deref(), Some("\"payment\""));
//! ```

use chrono::{DateTime, Utc};
use cinebook_core::environment::Clock;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use cinebook_core::environment::{KeyValueStorage, StorageError};
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::days(20_089))
    }

    /// Simulated clock that only moves when told to
    ///
    /// Clones share the same time, so a test can keep one handle while the
    /// environment holds another.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Create a clock from an RFC 3339 timestamp
        ///
        /// # Panics
        ///
        /// Panics if the timestamp does not parse.
        #[must_use]
        #[allow(clippy::expect_used)]
        pub fn at_rfc3339(timestamp: &str) -> Self {
            Self::new(
                DateTime::parse_from_rfc3339(timestamp)
                    .expect("test timestamp should parse")
                    .with_timezone(&Utc),
            )
        }

        /// Move the clock forward
        ///
        /// # Panics
        ///
        /// Panics if the lock is poisoned.
        #[allow(clippy::unwrap_used)]
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.write().unwrap();
            *time += by;
        }

        /// Jump the clock to `time`
        ///
        /// # Panics
        ///
        /// Panics if the lock is poisoned.
        #[allow(clippy::unwrap_used)]
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.write().unwrap() = time;
        }
    }

    impl Clock for ManualClock {
        #[allow(clippy::unwrap_used)]
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap()
        }
    }

    /// In-memory [`KeyValueStorage`], shareable between a store and a test
    #[derive(Debug, Clone, Default)]
    pub struct InMemoryStorage {
        entries: Arc<Mutex<BTreeMap<String, String>>>,
        fail_writes: Arc<Mutex<bool>>,
    }

    impl InMemoryStorage {
        /// Create empty storage
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Snapshot of every stored key
        #[must_use]
        #[allow(clippy::unwrap_used)]
        pub fn keys(&self) -> Vec<String> {
            self.entries.lock().unwrap().keys().cloned().collect()
        }

        /// Make every subsequent write fail (simulates a full or read-only backend)
        #[allow(clippy::unwrap_used)]
        pub fn fail_writes(&self, fail: bool) {
            *self.fail_writes.lock().unwrap() = fail;
        }

        fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, StorageError> {
            self.entries
                .lock()
                .map_err(|_| StorageError::Backend("storage lock poisoned".to_string()))
        }

        fn check_writable(&self) -> Result<(), StorageError> {
            let failing = self
                .fail_writes
                .lock()
                .map_err(|_| StorageError::Backend("storage lock poisoned".to_string()))?;
            if *failing {
                return Err(StorageError::Backend("writes disabled".to_string()));
            }
            Ok(())
        }
    }

    impl KeyValueStorage for InMemoryStorage {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            Ok(self.lock()?.get(key).cloned())
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.check_writable()?;
            self.lock()?.insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.check_writable()?;
            self.lock()?.remove(key);
            Ok(())
        }
    }
}


pub use mocks::{test_clock, FixedClock, InMemoryStorage, ManualClock};
pub use reducer_test::{assertions, ReducerTest};
