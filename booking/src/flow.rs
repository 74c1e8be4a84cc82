//! Top-level booking flow.
//!
//! The feature reducers share one [`BookingFlowState`] and are composed with
//! [`scope_action`] into [`BookingFlowReducer`], which also persists the session
//! and drives the page guard after each action.

use crate::api::{AuthProvider, BookingApi};
use crate::config::Config;
use crate::guard::PageGuard;
use crate::payment::{PaymentAction, PaymentReducer, PaymentState, PriceBreakdown};
use crate::seat_selector::{SeatAction, SeatSelectorReducer, SeatSelectorState};
use crate::session::{SessionAction, SessionReducer, SessionState};
use crate::show_selector::{ShowAction, ShowSelectorReducer, ShowSelectorState};
use crate::storage::{HasStorage, PersistentState, Persisted};
use crate::types::{BookingStep, Notice, Route};
use cinebook_core::composition::{combine_reducers, scope_action, CombinedReducer};
use cinebook_core::effect::Effect;
use cinebook_core::environment::{Clock, KeyValueStorage};
use cinebook_core::reducer::Reducer;
use cinebook_core::SmallVec;
use cinebook_runtime::Store;
use std::sync::Arc;
use std::time::Duration;

/// Tunables of the booking flow
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowSettings {
    /// Maximum seats per booking
    pub ticket_limit: usize,
    /// Length of the payment window
    pub payment_window: Duration,
    /// Wait before judging a freshly mounted payment page empty
    pub hydration_grace: Duration,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for FlowSettings {
    fn from(config: &Config) -> Self {
        Self {
            ticket_limit: config.ticket_limit,
            payment_window: config.payment_window,
            hydration_grace: config.hydration_grace,
        }
    }
}

/// Dependencies of the booking flow
#[derive(Clone)]
pub struct BookingFlowEnvironment {
    /// Booking backend
    pub api: Arc<dyn BookingApi>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Durable session storage
    pub storage: Arc<dyn KeyValueStorage>,
    /// Credentials of the current user
    pub auth: Arc<dyn AuthProvider>,
    /// Navigation interception
    pub page_guard: Arc<dyn PageGuard>,
    /// Tunables
    pub settings: FlowSettings,
}

impl HasStorage for BookingFlowEnvironment {
    fn storage(&self) -> &dyn KeyValueStorage {
        self.storage.as_ref()
    }
}

/// Everything the shell renders
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BookingFlowState {
    /// Durable booking session
    pub session: SessionState,
    /// Show picker
    pub show: ShowSelectorState,
    /// Seat page
    pub seats: SeatSelectorState,
    /// Payment page
    pub payment: PaymentState,
    /// Page the shell should show
    pub route: Route,
    /// Latest transient notification
    pub notice: Option<Notice>,
}

impl BookingFlowState {
    /// Restore the flow from `storage`, resuming on the page of the stored step
    #[must_use]
    pub fn hydrate(storage: &dyn KeyValueStorage) -> Self {
        let session = SessionState::hydrate(storage);
        let movie_id = session.booking().and_then(|b| b.movie_id().cloned());

        let route = match (session.step(), movie_id) {
            (BookingStep::SeatSelection, Some(movie_id)) => Route::SeatSelection { movie_id },
            (BookingStep::Payment, Some(movie_id)) => Route::Payment { movie_id },
            (BookingStep::MovieSelection, Some(movie_id)) => Route::MovieDetail { movie_id },
            _ => Route::Home,
        };

        Self {
            session,
            route,
            ..Self::default()
        }
    }

    /// Amounts for the payment page, once seats are reserved
    #[must_use]
    pub fn price_breakdown(&self) -> Option<PriceBreakdown> {
        self.session
            .booking()?
            .booking_response
            .as_ref()
            .map(PriceBreakdown::from_response)
    }

    pub(crate) fn notify(&mut self, notice: Notice) {
        tracing::debug!(level = ?notice.level, message = %notice.message, "Notice");
        self.notice = Some(notice);
    }
}

impl PersistentState for BookingFlowState {
    fn revision(&self) -> u64 {
        self.session.revision()
    }

    fn persist(&self, storage: &dyn KeyValueStorage) {
        self.session.persist(storage);
    }
}

/// Every input of the booking flow
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookingAction {
    /// Session store operations
    Session(SessionAction),
    /// Show selector input
    Show(ShowAction),
    /// Seat selector input
    Seats(SeatAction),
    /// Payment controller input
    Payment(PaymentAction),
    /// The shell navigated on its own (links, address bar)
    Navigated(Route),
    /// The user closed the current notice
    NoticeDismissed,
}

fn session_action(action: BookingAction) -> Option<SessionAction> {
    match action {
        BookingAction::Session(action) => Some(action),
        _ => None,
    }
}

fn show_action(action: BookingAction) -> Option<ShowAction> {
    match action {
        BookingAction::Show(action) => Some(action),
        _ => None,
    }
}

fn seat_action(action: BookingAction) -> Option<SeatAction> {
    match action {
        BookingAction::Seats(action) => Some(action),
        _ => None,
    }
}

fn payment_action(action: BookingAction) -> Option<PaymentAction> {
    match action {
        BookingAction::Payment(action) => Some(action),
        _ => None,
    }
}

/// Handles the shell-level actions
#[derive(Clone, Copy, Debug, Default)]
struct ShellReducer;

impl Reducer for ShellReducer {
    type State = BookingFlowState;
    type Action = BookingAction;
    type Environment = BookingFlowEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            BookingAction::Navigated(route) => state.route = route,
            BookingAction::NoticeDismissed => state.notice = None,
            _ => {},
        }
        SmallVec::new()
    }
}

type FlowReducer = Box<
    dyn Reducer<State = BookingFlowState, Action = BookingAction, Environment = BookingFlowEnvironment>
        + Send
        + Sync,
>;

/// The complete booking flow reducer
pub struct BookingFlowReducer {
    inner: Persisted<CombinedReducer<BookingFlowState, BookingAction, BookingFlowEnvironment>>,
}

impl BookingFlowReducer {
    /// Compose the feature reducers
    #[must_use]
    pub fn new() -> Self {
        let reducers: Vec<FlowReducer> = vec![
            Box::new(scope_action(SessionReducer, session_action, BookingAction::Session)) as FlowReducer,
            Box::new(scope_action(ShowSelectorReducer, show_action, BookingAction::Show)) as FlowReducer,
            Box::new(scope_action(SeatSelectorReducer, seat_action, BookingAction::Seats)) as FlowReducer,
            Box::new(scope_action(PaymentReducer, payment_action, BookingAction::Payment)) as FlowReducer,
            Box::new(ShellReducer) as FlowReducer,
        ];

        Self {
            inner: Persisted::new(combine_reducers(reducers)),
        }
    }
}

impl Default for BookingFlowReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for BookingFlowReducer {
    type State = BookingFlowState;
    type Action = BookingAction;
    type Environment = BookingFlowEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let was_armed = state.payment.guard_armed();
        let effects = self.inner.reduce(state, action, env);

        match (was_armed, state.payment.guard_armed()) {
            (false, true) => env.page_guard.arm(),
            (true, false) => env.page_guard.disarm(),
            _ => {},
        }

        effects
    }
}

/// Store running the booking flow
pub type BookingFlowStore =
    Store<BookingFlowState, BookingAction, BookingFlowEnvironment, BookingFlowReducer>;

/// Hydrate the flow from the environment's storage and start a store
#[must_use]
pub fn booking_store(env: BookingFlowEnvironment) -> BookingFlowStore {
    let state = BookingFlowState::hydrate(env.storage.as_ref());
    Store::new(state, BookingFlowReducer::new(), env)
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::test_support::{flow_env, state_at_payment};
    use super::*;
    use crate::storage::{PAYMENT_ACTIVE_KEY, STEP_KEY};
    use crate::types::{Money, MovieId, NoticeLevel};
    use cinebook_testing::ReducerTest;

    #[test]
    fn test_hydrate_resumes_on_stored_step() {
        let (_, handles) = flow_env();
        state_at_payment().session.persist(&handles.storage);

        let state = BookingFlowState::hydrate(&handles.storage);
        assert_eq!(state.route, Route::Payment { movie_id: MovieId::new("m1") });
        assert_eq!(state.price_breakdown().unwrap().final_total, Money::from_major(440));
    }

    #[test]
    fn test_hydrate_empty_storage() {
        let (_, handles) = flow_env();
        let state = BookingFlowState::hydrate(&handles.storage);
        assert_eq!(state.route, Route::Home);
        assert!(state.session.booking().is_none());
        assert!(state.price_breakdown().is_none());
    }

    #[test]
    fn test_persists_payment_marker_and_arms_guard() {
        let (env, handles) = flow_env();
        let storage = handles.storage.clone();

        ReducerTest::new(BookingFlowReducer::new())
            .with_env(env)
            .given_state(state_at_payment())
            .when_action(BookingAction::Payment(PaymentAction::Mounted))
            .then_state(move |_| {
                assert_eq!(storage.get(PAYMENT_ACTIVE_KEY).unwrap().as_deref(), Some("true"));
                assert_eq!(storage.get(STEP_KEY).unwrap().as_deref(), Some("\"payment\""));
            })
            .run();

        assert!(handles.guard.is_armed());
    }

    #[test]
    fn test_shell_actions() {
        let (env, _) = flow_env();
        let mut state = BookingFlowState::default();
        state.notify(Notice::warning("careful"));

        ReducerTest::new(BookingFlowReducer::new())
            .with_env(env)
            .given_state(state)
            .when_action(BookingAction::Navigated(Route::Movies))
            .when_action(BookingAction::NoticeDismissed)
            .then_state(|state| {
                assert_eq!(state.route, Route::Movies);
                assert!(state.notice.is_none());
            })
            .run();

        assert_eq!(Notice::warning("x").level, NoticeLevel::Warning);
    }
}
