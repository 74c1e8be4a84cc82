//! # Cinebook Core
//!
//! Core traits and types for the Cinebook booking flow.
//!
//! The booking flow is written as a set of reducers: pure functions that take the
//! current state and an action, mutate the state in place and return descriptions
//! of side effects. The runtime crate executes those descriptions and feeds the
//! resulting actions back in.
//!
//! ## Core Concepts
//!
//! - **State**: Domain state for a feature (the in-progress booking)
//! - **Action**: All possible inputs to a reducer (user input, API responses, timer ticks)
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies via traits (clock, storage, HTTP backend)
//!
//! ## Example
//!
//! ```
//! use cinebook_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
//!
//! #[derive(Clone, Debug, Default)]
//! struct CartState {
//!     seats: u32,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum CartAction {
//!     AddSeat,
//! }
//!
//! struct CartReducer;
//!
//! impl Reducer for CartReducer {
//!     type State = CartState;
//!     type Action = CartAction;
//!     type Environment = ();
//!
//!     fn reduce(
//!         &self,
//!         state: &mut CartState,
//!         action: CartAction,
//!         _env: &(),
//!     ) -> SmallVec<[Effect<CartAction>; 4]> {
//!         match action {
//!             CartAction::AddSeat => state.seats += 1,
//!         }
//!         smallvec![Effect::None]
//!     }
//! }
//!
//! let mut state = CartState::default();
//! let _ = CartReducer.reduce(&mut state, CartAction::AddSeat, &());
//! assert_eq!(state.seats, 1);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{smallvec, SmallVec};

/// Reducer composition utilities
pub mod composition;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// # Arguments
        ///
        /// - `state`: Mutable reference to current state
        /// - `action`: The action to process
        /// - `env`: Reference to injected dependencies
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution) and are composable and cancellable.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Identifier under which a long-running effect is registered so that a later
    /// [`Effect::Cancel`] can stop it.
    ///
    /// Registering a new effect under an id that is still running replaces (and
    /// aborts) the previous one.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct EffectId(&'static str);

    impl EffectId {
        /// Create an effect id from a static name
        #[must_use]
        pub const fn new(name: &'static str) -> Self {
            Self(name)
        }

        /// The name this id was created with
        #[must_use]
        pub const fn name(&self) -> &'static str {
            self.0
        }
    }

    impl std::fmt::Display for EffectId {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Delayed action (for timeouts, countdown ticks)
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),

        /// Run `effect` registered under `id` so it can be cancelled later
        Cancellable {
            /// Registration id
            id: EffectId,
            /// The wrapped effect
            effect: Box<Effect<Action>>,
        },

        /// Cancel the in-flight effect registered under the given id (no-op if none)
        Cancel(EffectId),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
                Effect::Cancellable { id, effect } => f
                    .debug_struct("Effect::Cancellable")
                    .field("id", id)
                    .field("effect", effect)
                    .finish(),
                Effect::Cancel(id) => f.debug_tuple("Effect::Cancel").field(id).finish(),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Wrap this effect so it can be cancelled with [`Effect::Cancel`]
        #[must_use]
        pub fn cancellable(self, id: EffectId) -> Effect<Action> {
            Effect::Cancellable {
                id,
                effect: Box::new(self),
            }
        }

        /// Dispatch `action` after `duration`
        #[must_use]
        pub fn delay(duration: Duration, action: Action) -> Effect<Action> {
            Effect::Delay {
                duration,
                action: Box::new(action),
            }
        }

        /// Returns true if this is [`Effect::None`]
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }

        /// Transform the actions this effect produces
        ///
        /// Used to lift a child reducer's effects into a parent action type.
        #[must_use]
        pub fn map<B, F>(self, f: F) -> Effect<B>
        where
            Action: Send + 'static,
            B: Send + 'static,
            F: Fn(Action) -> B + Clone + Send + Sync + 'static,
        {
            match self {
                Effect::None => Effect::None,
                Effect::Parallel(effects) => Effect::Parallel(
                    effects.into_iter().map(|e| e.map(f.clone())).collect(),
                ),
                Effect::Sequential(effects) => Effect::Sequential(
                    effects.into_iter().map(|e| e.map(f.clone())).collect(),
                ),
                Effect::Delay { duration, action } => Effect::Delay {
                    duration,
                    action: Box::new(f(*action)),
                },
                Effect::Future(fut) => Effect::Future(Box::pin(async move { fut.await.map(f) })),
                Effect::Cancellable { id, effect } => Effect::Cancellable {
                    id,
                    effect: Box::new(effect.map(f)),
                },
                Effect::Cancel(id) => Effect::Cancel(id),
            }
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, Utc};
    use thiserror::Error;

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use cinebook_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Errors raised by a [`KeyValueStorage`] backend
    #[derive(Error, Debug)]
    pub enum StorageError {
        /// Underlying I/O failed
        #[error("Storage I/O failed: {0}")]
        Io(#[from] std::io::Error),

        /// Stored data could not be encoded or decoded
        #[error("Storage serialization failed: {0}")]
        Serialization(String),

        /// Backend rejected the operation
        #[error("Storage backend error: {0}")]
        Backend(String),
    }

    /// Durable string-keyed storage
    ///
    /// The booking flow persists JSON snapshots under a handful of well-known keys
    /// so that a restarted shell can restore an in-progress booking.
    ///
    /// # Errors
    ///
    /// Implementations return [`StorageError`] when the backend fails. Callers in the
    /// booking flow log these and carry on; losing a snapshot never aborts a booking.
    pub trait KeyValueStorage: Send + Sync {
        /// Read the value stored under `key`
        ///
        /// # Errors
        ///
        /// Returns [`StorageError`] if the backend cannot be read.
        fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

        /// Store `value` under `key`, replacing any previous value
        ///
        /// # Errors
        ///
        /// Returns [`StorageError`] if the backend cannot be written.
        fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

        /// Remove `key` (no-op if absent)
        ///
        /// # Errors
        ///
        /// Returns [`StorageError`] if the backend cannot be written.
        fn remove(&self, key: &str) -> Result<(), StorageError>;
    }
}

#[cfg(test)]
mod tests {
    use super::effect::{Effect, EffectId};
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq)]
    enum Child {
        Tick,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum Parent {
        Child(Child),
    }

    #[test]
    fn map_rewrites_delayed_action() {
        let effect = Effect::delay(Duration::from_secs(1), Child::Tick).cancellable(EffectId::new("t"));
        let mapped = effect.map(Parent::Child);

        match mapped {
            Effect::Cancellable { id, effect } => {
                assert_eq!(id.name(), "t");
                match *effect {
                    Effect::Delay { duration, action } => {
                        assert_eq!(duration, Duration::from_secs(1));
                        assert_eq!(*action, Parent::Child(Child::Tick));
                    },
                    other => unreachable!("unexpected effect {other:?}"),
                }
            },
            other => unreachable!("unexpected effect {other:?}"),
        }
    }

    #[test]
    fn map_keeps_cancel_ids() {
        let mapped: Effect<Parent> = Effect::<Child>::Cancel(EffectId::new("timer")).map(Parent::Child);
        assert!(matches!(mapped, Effect::Cancel(id) if id == EffectId::new("timer")));
    }

    #[test]
    fn map_wraps_future_output() {
        let effect: Effect<Child> = Effect::Future(Box::pin(async { Some(Child::Tick) }));
        let Effect::Future(fut) = effect.map(Parent::Child) else {
            unreachable!("map must keep futures as futures");
        };
        let output = futures::executor::block_on(fut);
        assert_eq!(output, Some(Parent::Child(Child::Tick)));
    }
}
