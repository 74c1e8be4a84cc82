//! Reducer composition utilities
//!
//! This module provides utilities for composing reducers:
//! - **`combine_reducers`**: Run multiple reducers on the same state/action
//! - **`scope_action`**: Lift a reducer written against a child action type into a
//!   parent action type, so feature reducers can share one state
//!
//! # Examples
//!
//! ```
//! use cinebook_core::{composition::scope_action, effect::Effect, reducer::Reducer, smallvec, SmallVec};
//!
//! #[derive(Clone, Default)]
//! struct FlowState {
//!     seats: u32,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum SeatAction {
//!     Add,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum FlowAction {
//!     Seat(SeatAction),
//!     Reset,
//! }
//!
//! struct SeatReducer;
//!
//! impl Reducer for SeatReducer {
//!     type State = FlowState;
//!     type Action = SeatAction;
//!     type Environment = ();
//!
//!     fn reduce(&self, state: &mut FlowState, action: SeatAction, _env: &()) -> SmallVec<[Effect<SeatAction>; 4]> {
//!         match action {
//!             SeatAction::Add => state.seats += 1,
//!         }
//!         smallvec![Effect::None]
//!     }
//! }
//!
//! let scoped = scope_action(
//!     SeatReducer,
//!     |action: FlowAction| match action {
//!         FlowAction::Seat(seat) => Some(seat),
//!         FlowAction::Reset => None,
//!     },
//!     FlowAction::Seat,
//! );
//!
//! let mut state = FlowState::default();
//! let _ = scoped.reduce(&mut state, FlowAction::Seat(SeatAction::Add), &());
//! let _ = scoped.reduce(&mut state, FlowAction::Reset, &());
//! assert_eq!(state.seats, 1);
//! ```

use crate::effect::Effect;
use crate::reducer::Reducer;
use smallvec::SmallVec;

/// Combines multiple reducers that operate on the same state and action types.
///
/// Each reducer is run in sequence, and all effects are collected and concatenated.
#[must_use]
pub fn combine_reducers<S, A, E>(
    reducers: Vec<Box<dyn Reducer<State = S, Action = A, Environment = E> + Send + Sync>>,
) -> CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    CombinedReducer { reducers }
}

/// A combined reducer that runs multiple reducers in sequence.
///
/// Created by [`combine_reducers`].
pub struct CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    reducers: Vec<Box<dyn Reducer<State = S, Action = A, Environment = E> + Send + Sync>>,
}

impl<S, A, E> Reducer for CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let mut all_effects = SmallVec::new();

        for reducer in &self.reducers {
            let effects = reducer.reduce(state, action.clone(), env);
            all_effects.extend(effects);
        }

        all_effects
    }
}

/// Lifts a reducer over a child action type into a parent action type.
///
/// `extract` picks the child action out of a parent action (returning `None` for
/// actions the child does not handle); `embed` wraps the child's effect outputs
/// back into the parent type. State and environment are shared unchanged.
pub fn scope_action<A, SubA, R>(
    reducer: R,
    extract: fn(A) -> Option<SubA>,
    embed: fn(SubA) -> A,
) -> ActionScopedReducer<A, SubA, R>
where
    R: Reducer<Action = SubA>,
    A: Send + 'static,
    SubA: Send + 'static,
{
    ActionScopedReducer {
        reducer,
        extract,
        embed,
    }
}

/// A reducer scoped to a subset of a larger action type.
///
/// Created by [`scope_action`].
pub struct ActionScopedReducer<A, SubA, R>
where
    R: Reducer<Action = SubA>,
{
    reducer: R,
    extract: fn(A) -> Option<SubA>,
    embed: fn(SubA) -> A,
}

impl<A, SubA, R> Reducer for ActionScopedReducer<A, SubA, R>
where
    R: Reducer<Action = SubA>,
    A: Send + 'static,
    SubA: Send + 'static,
{
    type State = R::State;
    type Action = A;
    type Environment = R::Environment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let Some(child_action) = (self.extract)(action) else {
            return SmallVec::new();
        };

        let embed = self.embed;
        self.reducer
            .reduce(state, child_action, env)
            .into_iter()
            .map(|effect| effect.map(embed))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{smallvec, SmallVec};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct TestState {
        counter: i32,
        name: String,
    }

    #[derive(Clone, Debug)]
    enum TestAction {
        Increment,
        Decrement,
        SetName(String),
    }

    struct CounterReducer;

    impl Reducer for CounterReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Increment => state.counter += 1,
                TestAction::Decrement => state.counter -= 1,
                TestAction::SetName(_) => {},
            }
            smallvec![Effect::None]
        }
    }

    struct NameReducer;

    impl Reducer for NameReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            if let TestAction::SetName(name) = action {
                state.name = name;
            }
            smallvec![Effect::None]
        }
    }

    #[test]
    fn test_combine_reducers() {
        let reducers: Vec<
            Box<dyn Reducer<State = TestState, Action = TestAction, Environment = ()> + Send + Sync>,
        > = vec![Box::new(CounterReducer), Box::new(NameReducer)];
        let combined = combine_reducers(reducers);

        let mut state = TestState::default();

        let _ = combined.reduce(&mut state, TestAction::Increment, &());
        assert_eq!(state.counter, 1);

        let effects = combined.reduce(&mut state, TestAction::SetName("Alice".to_string()), &());
        assert_eq!(state.name, "Alice");
        assert_eq!(effects.len(), 2);

        let _ = combined.reduce(&mut state, TestAction::Decrement, &());
        assert_eq!(state.counter, 0);
        assert_eq!(state.name, "Alice");
    }

    #[derive(Clone, Debug, PartialEq)]
    enum TimerAction {
        Tick,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum AppAction {
        Timer(TimerAction),
        Other,
    }

    struct TimerReducer;

    impl Reducer for TimerReducer {
        type State = TestState;
        type Action = TimerAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            state.counter += 1;
            smallvec![Effect::delay(Duration::from_secs(1), action)]
        }
    }

    fn extract_timer(action: AppAction) -> Option<TimerAction> {
        match action {
            AppAction::Timer(timer) => Some(timer),
            AppAction::Other => None,
        }
    }

    #[test]
    fn test_scope_action_routes_and_embeds() {
        let scoped = scope_action(TimerReducer, extract_timer, AppAction::Timer);
        let mut state = TestState::default();

        let effects = scoped.reduce(&mut state, AppAction::Timer(TimerAction::Tick), &());
        assert_eq!(state.counter, 1);
        assert_eq!(effects.len(), 1);
        match &effects[0] {
            Effect::Delay { action, .. } => assert_eq!(**action, AppAction::Timer(TimerAction::Tick)),
            other => unreachable!("unexpected effect {other:?}"),
        }

        let effects = scoped.reduce(&mut state, AppAction::Other, &());
        assert_eq!(state.counter, 1);
        assert!(effects.is_empty());
    }
}
