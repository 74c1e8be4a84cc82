//! # Cinebook Runtime
//!
//! Runtime implementation for the Cinebook booking flow.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: The runtime that manages state and executes effects
//! - **Effect Executor**: Executes effect descriptions on tokio and feeds actions back to the reducer
//! - **Cancellation Registry**: Tracks effects registered with [`Effect::Cancellable`] so a later
//!   [`Effect::Cancel`] can stop them (the payment countdown relies on this)
//!
//! ## Example
//!
//! ```ignore
//! use cinebook_runtime::Store;
//!
//! let store = Store::new(initial_state, my_reducer, environment);
//!
//! // Send an action
//! store.send(Action::DoSomething).await?;
//!
//! // Read state
//! let value = store.state(|s| s.some_field).await;
//! ```

use cinebook_core::effect::{Effect, EffectId};
use cinebook_core::reducer::Reducer;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::AbortHandle;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        ///
        /// Some effects were still running when the timeout elapsed.
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for terminal action
        ///
        /// Returned by `send_and_wait_for` when the timeout expires before
        /// a matching action is received.
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Configuration for Store instances
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Capacity of the action broadcast channel
    pub broadcast_capacity: usize,
    /// Default timeout for graceful shutdown
    pub default_shutdown_timeout: Duration,
}

impl StoreConfig {
    /// Set the action broadcast capacity
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Set the default shutdown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.default_shutdown_timeout = timeout;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 16,
            default_shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Decrements the pending-effect counter when dropped, including on abort.
struct PendingGuard(Arc<AtomicUsize>);

impl PendingGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

type EffectFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Store module - the runtime coordinator
pub mod store {
    use super::{
        broadcast, AbortHandle, Arc, AtomicBool, AtomicUsize, Duration, Effect, EffectFuture,
        EffectId, HashMap, Mutex, Ordering, PendingGuard, Reducer, RwLock, StoreConfig,
        StoreError,
    };

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop and cancellation)
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        environment: Arc<E>,
        config: StoreConfig,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        cancellables: Arc<Mutex<HashMap<EffectId, AbortHandle>>>,
        /// Actions produced by effects are broadcast to observers.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: Arc::clone(&self.reducer),
                environment: Arc::clone(&self.environment),
                config: self.config.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                cancellables: Arc::clone(&self.cancellables),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Sync + Clone + std::fmt::Debug + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Create a new Store with custom configuration
        #[must_use]
        pub fn with_config(initial_state: S, reducer: R, environment: E, config: StoreConfig) -> Self {
            let (action_broadcast, _) = broadcast::channel(config.broadcast_capacity.max(1));

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
                config,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                cancellables: Arc::new(Mutex::new(HashMap::new())),
                action_broadcast,
            }
        }

        /// The injected environment
        #[must_use]
        pub fn environment(&self) -> &E {
            &self.environment
        }

        /// Number of effects currently executing (including pending delays)
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::Acquire)
        }

        /// Returns true if an effect is registered under `id` and still running
        #[must_use]
        pub fn is_running(&self, id: EffectId) -> bool {
            self.cancellables
                .lock()
                .map(|registry| registry.get(&id).is_some_and(|handle| !handle.is_finished()))
                .unwrap_or(false)
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Starts the returned effects asynchronously
        ///
        /// Returns after effects are started, not after they complete.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<(), StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            tracing::debug!(?action, "Processing action");
            metrics::counter!("store.commands.total").increment(1);

            let effects = {
                let mut state = self.state.write().await;

                let start = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(start.elapsed().as_secs_f64());

                tracing::trace!("Reducer completed, returned {} effects", effects.len());
                effects
            };

            for effect in effects {
                self.execute_effect(effect);
            }

            Ok(())
        }

        /// Send an action and wait for a matching result action
        ///
        /// Subscribes to the action broadcast before sending, so a fast effect
        /// cannot slip past the observer.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: Timeout expired before matching action received
        /// - [`StoreError::ChannelClosed`]: Action broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: Store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            let mut rx = self.action_broadcast.subscribe();
            self.send(action).await?;
            Self::wait_on(&mut rx, predicate, timeout).await
        }

        /// Wait for the next effect-produced action matching `predicate`
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: Timeout expired before matching action received
        /// - [`StoreError::ChannelClosed`]: Action broadcast channel closed
        pub async fn wait_for<F>(&self, predicate: F, timeout: Duration) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            let mut rx = self.action_broadcast.subscribe();
            Self::wait_on(&mut rx, predicate, timeout).await
        }

        async fn wait_on<F>(
            rx: &mut broadcast::Receiver<A>,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged, {} actions skipped", skipped);
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to all actions produced by effects
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let seat_count = store.state(|s| s.selected_seats.len()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Initiate graceful shutdown of the store
        ///
        /// Rejects new actions, aborts every cancellable effect (timers would
        /// otherwise keep the store alive forever) and waits for the remaining
        /// effects to finish.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            self.shutdown.store(true, Ordering::Release);

            if let Ok(mut registry) = self.cancellables.lock() {
                for (id, handle) in registry.drain() {
                    tracing::debug!(effect_id = %id, "Aborting cancellable effect for shutdown");
                    handle.abort();
                }
            }

            let start = tokio::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);
                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(pending_effects = pending, "Shutdown timeout: {} effects still running", pending);
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Shut down using the configured default timeout
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if effects are still running when
        /// the timeout expires.
        pub async fn shutdown_default(&self) -> Result<(), StoreError> {
            self.shutdown(self.config.default_shutdown_timeout).await
        }

        /// Start executing an effect
        ///
        /// `Cancel` is handled synchronously so that a cancel returned by a reducer
        /// takes effect before any later action is processed.
        #[tracing::instrument(skip(self, effect), name = "execute_effect")]
        fn execute_effect(&self, effect: Effect<A>) {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Cancel(id) => self.cancel(id),
                Effect::Cancellable { id, effect } => {
                    metrics::counter!("store.effects.executed", "type" => "cancellable").increment(1);
                    let store = self.clone();
                    let guard = PendingGuard::new(&self.pending_effects);

                    let task = tokio::spawn(async move {
                        let _guard = guard;
                        store.run_effect(*effect).await;
                        store.unregister(id);
                    });

                    self.register(id, task.abort_handle());
                },
                other => {
                    let store = self.clone();
                    let guard = PendingGuard::new(&self.pending_effects);
                    tokio::spawn(async move {
                        let _guard = guard;
                        store.run_effect(other).await;
                    });
                },
            }
        }

        /// Run an effect to completion, feeding produced actions back into the store
        fn run_effect(&self, effect: Effect<A>) -> EffectFuture {
            let store = self.clone();

            Box::pin(async move {
                match effect {
                    Effect::None => {},
                    Effect::Cancel(id) => store.cancel(id),
                    Effect::Future(fut) => {
                        metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                        if let Some(action) = fut.await {
                            store.feedback(action).await;
                        } else {
                            tracing::trace!("Effect::Future completed with no action");
                        }
                    },
                    Effect::Delay { duration, action } => {
                        metrics::counter!("store.effects.executed", "type" => "delay").increment(1);
                        tokio::time::sleep(duration).await;
                        store.feedback(*action).await;
                    },
                    Effect::Parallel(effects) => {
                        metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                        let running: Vec<_> = effects.into_iter().map(|e| store.run_effect(e)).collect();
                        futures::future::join_all(running).await;
                    },
                    Effect::Sequential(effects) => {
                        metrics::counter!("store.effects.executed", "type" => "sequential").increment(1);
                        for effect in effects {
                            store.run_effect(effect).await;
                        }
                    },
                    Effect::Cancellable { id, effect } => {
                        // Nested registration: hand it to the executor so it gets its own task
                        store.execute_effect(Effect::Cancellable { id, effect });
                    },
                }
            })
        }

        /// Reduce an effect-produced action, then broadcast it
        ///
        /// Observers therefore always see state that already reflects the action.
        async fn feedback(&self, action: A) {
            let observed = action.clone();
            if let Err(error) = self.send(action).await {
                tracing::debug!(%error, "Dropped effect-produced action");
                return;
            }
            let _ = self.action_broadcast.send(observed);
        }

        fn register(&self, id: EffectId, handle: AbortHandle) {
            let Ok(mut registry) = self.cancellables.lock() else {
                tracing::error!(effect_id = %id, "Cancellation registry poisoned");
                return;
            };

            if let Some(previous) = registry.insert(id, handle) {
                // The previous task may be the one whose feedback produced this registration
                if tokio::task::try_id() != Some(previous.id()) {
                    previous.abort();
                }
            }
        }

        fn unregister(&self, id: EffectId) {
            let Ok(mut registry) = self.cancellables.lock() else {
                return;
            };

            let own = tokio::task::try_id();
            if registry.get(&id).is_some_and(|handle| Some(handle.id()) == own) {
                registry.remove(&id);
            }
        }

        fn cancel(&self, id: EffectId) {
            let Ok(mut registry) = self.cancellables.lock() else {
                tracing::error!(effect_id = %id, "Cancellation registry poisoned");
                return;
            };

            if let Some(handle) = registry.remove(&id) {
                tracing::debug!(effect_id = %id, "Cancelling effect");
                metrics::counter!("store.effects.cancelled").increment(1);
                if tokio::task::try_id() != Some(handle.id()) {
                    handle.abort();
                }
            }
        }
    }
}

pub use store::Store;
