//! Booking session store.
//!
//! [`SessionState`] is the single source of truth for the in-progress booking and
//! the only part of the flow that is persisted. Every mutation goes through one
//! of its methods, which keep the seat invariants and bump the revision that
//! [`Persisted`](crate::storage::Persisted) watches.

use crate::flow::{BookingAction, BookingFlowEnvironment, BookingFlowState};
use crate::storage::{
    read_json, write_json, PersistentState, PAYMENT_ACTIVE_KEY, PAYMENT_TIMER_KEY, SESSION_KEY,
    STEP_KEY,
};
use crate::types::{BookingPatch, BookingSession, BookingStep, Money, PaymentTimer, Seat};
use cinebook_core::effect::Effect;
use cinebook_core::environment::KeyValueStorage;
use cinebook_core::reducer::Reducer;
use cinebook_core::{smallvec, SmallVec};
use std::collections::HashSet;

/// Durable booking state
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    booking: Option<BookingSession>,
    step: BookingStep,
    payment_timer: Option<PaymentTimer>,
    payment_active: bool,
    revision: u64,
}

impl SessionState {
    /// Restore the session from `storage`
    ///
    /// Absent or corrupt entries fall back to no session at `MovieSelection`.
    #[must_use]
    pub fn hydrate(storage: &dyn KeyValueStorage) -> Self {
        let booking: Option<BookingSession> = read_json(storage, SESSION_KEY);
        let step = read_json(storage, STEP_KEY).unwrap_or_default();
        let payment_timer = read_json(storage, PAYMENT_TIMER_KEY);
        let payment_active = read_json(storage, PAYMENT_ACTIVE_KEY).unwrap_or(false);

        tracing::info!(
            has_booking = booking.is_some(),
            ?step,
            payment_active,
            "Hydrated booking session"
        );

        Self {
            booking,
            step,
            payment_timer,
            payment_active,
            revision: 0,
        }
    }

    /// The in-progress booking, if any
    #[must_use]
    pub const fn booking(&self) -> Option<&BookingSession> {
        self.booking.as_ref()
    }

    /// Current step
    #[must_use]
    pub const fn step(&self) -> BookingStep {
        self.step
    }

    /// Payment window marker
    #[must_use]
    pub const fn payment_timer(&self) -> Option<&PaymentTimer> {
        self.payment_timer.as_ref()
    }

    /// Returns true if a payment page claimed the session and has not released it
    #[must_use]
    pub const fn payment_active(&self) -> bool {
        self.payment_active
    }

    /// Selected seats (empty without a session)
    #[must_use]
    pub fn selected_seats(&self) -> &[Seat] {
        self.booking
            .as_ref()
            .map(|b| b.selected_seats.as_slice())
            .unwrap_or_default()
    }

    /// Shallow-merge `patch` into the session, creating it if absent
    ///
    /// A patch naming a different movie than the current session starts a new
    /// session, since the movie is fixed for the lifetime of a booking attempt.
    pub fn set_booking_data(&mut self, patch: BookingPatch) {
        let switching_movie = match (&patch.movie, self.booking.as_ref().and_then(BookingSession::movie_id)) {
            (Some(movie), Some(current)) => &movie.id != current,
            _ => false,
        };
        if switching_movie {
            tracing::info!("Movie changed, starting a new booking session");
            self.booking = None;
        }

        let booking = self.booking.get_or_insert_with(BookingSession::default);
        if let Some(movie) = patch.movie {
            booking.movie = Some(movie);
        }
        if let Some(date) = patch.selected_date {
            booking.selected_date = Some(date);
        }
        if let Some(time) = patch.selected_time_with_am_pm {
            booking.selected_time_with_am_pm = Some(time);
        }
        if let Some(cinema) = patch.selected_cinema {
            booking.selected_cinema = Some(cinema);
        }
        if let Some(response) = patch.booking_response {
            if booking.selected_seats.is_empty() {
                tracing::warn!("Ignoring provisional booking for an empty seat selection");
            } else {
                booking.booking_response = Some(response);
            }
        }
        self.touch();
    }

    /// Set the current step
    pub fn set_step(&mut self, step: BookingStep) {
        if self.step != step {
            tracing::debug!(from = ?self.step, to = ?step, "Booking step changed");
            self.step = step;
            self.touch();
        }
    }

    /// Replace the selected seats
    ///
    /// Later duplicates of a seat number are dropped, the total is recomputed and
    /// any provisional booking is invalidated.
    pub fn update_selected_seats(&mut self, seats: Vec<Seat>) {
        let mut seen = HashSet::new();
        let seats: Vec<Seat> = seats
            .into_iter()
            .filter(|seat| seen.insert(seat.seat_number.clone()))
            .collect();

        let booking = self.booking.get_or_insert_with(BookingSession::default);
        booking.total_amount = seats.iter().map(|seat| seat.price).sum();
        booking.selected_seats = seats;
        booking.booking_response = None;
        self.touch();
    }

    /// Empty the seat selection, zero the total and drop the provisional booking
    pub fn clear_selected_seats(&mut self) {
        if let Some(booking) = self.booking.as_mut() {
            booking.selected_seats.clear();
            booking.total_amount = Money::ZERO;
            booking.booking_response = None;
            self.touch();
        }
    }

    /// Discard the session and every payment marker
    pub fn clear_booking(&mut self) {
        self.booking = None;
        self.step = BookingStep::MovieSelection;
        self.payment_timer = None;
        self.payment_active = false;
        self.touch();
    }

    /// Record the start of a payment window
    pub fn start_payment_timer(&mut self, timer: PaymentTimer) {
        self.payment_timer = Some(timer);
        self.touch();
    }

    /// Remove the payment window marker
    pub fn clear_payment_timer(&mut self) {
        if self.payment_timer.take().is_some() {
            self.touch();
        }
    }

    /// Set or clear the payment-session-active marker
    pub fn set_payment_active(&mut self, active: bool) {
        if self.payment_active != active {
            self.payment_active = active;
            self.touch();
        }
    }

    const fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

impl PersistentState for SessionState {
    fn revision(&self) -> u64 {
        self.revision
    }

    fn persist(&self, storage: &dyn KeyValueStorage) {
        write_json(storage, SESSION_KEY, self.booking.as_ref());

        let step = (self.booking.is_some() || self.step != BookingStep::MovieSelection).then_some(&self.step);
        write_json(storage, STEP_KEY, step);

        write_json(storage, PAYMENT_TIMER_KEY, self.payment_timer.as_ref());
        write_json(storage, PAYMENT_ACTIVE_KEY, self.payment_active.then_some(&true));
    }
}

/// Session store operations
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionAction {
    /// Shallow-merge booking data
    SetBookingData(BookingPatch),
    /// Set the current step
    SetBookingStep(BookingStep),
    /// Replace the selected seats
    UpdateSelectedSeats(Vec<Seat>),
    /// Empty the seat selection
    ClearSelectedSeats,
    /// Discard the session
    ClearBooking,
}

/// Reducer exposing the session store operations as actions
#[derive(Clone, Copy, Debug, Default)]
pub struct SessionReducer;

impl Reducer for SessionReducer {
    type State = BookingFlowState;
    type Action = SessionAction;
    type Environment = BookingFlowEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let session = &mut state.session;
        match action {
            SessionAction::SetBookingData(patch) => session.set_booking_data(patch),
            SessionAction::SetBookingStep(step) => session.set_step(step),
            SessionAction::UpdateSelectedSeats(seats) => session.update_selected_seats(seats),
            SessionAction::ClearSelectedSeats => session.clear_selected_seats(),
            SessionAction::ClearBooking => session.clear_booking(),
        }
        smallvec![Effect::None]
    }
}

impl From<SessionAction> for BookingAction {
    fn from(action: SessionAction) -> Self {
        Self::Session(action)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::flow::test_support::{flow_env, sample_movie, seat};
    use crate::types::{BookingResponse, SlotId};
    use cinebook_testing::{assertions, InMemoryStorage, ReducerTest};
    use proptest::prelude::*;

    fn response() -> BookingResponse {
        BookingResponse {
            slot_id: Some(SlotId::new(42)),
            seat_numbers: vec!["A1".into()],
            ticket_fee: Money::from_major(200),
            convenience_fee: Money::from_major(20),
        }
    }

    #[test]
    fn test_update_selected_seats_dedupes_and_totals() {
        let mut session = SessionState::default();
        session.update_selected_seats(vec![seat("A1", 200), seat("A2", 150), seat("A1", 999)]);

        let booking = session.booking().unwrap();
        assert_eq!(booking.selected_seats.len(), 2);
        assert_eq!(booking.total_amount, Money::from_major(350));
    }

    #[test]
    fn test_seat_mutation_invalidates_provisional_booking() {
        let mut session = SessionState::default();
        session.update_selected_seats(vec![seat("A1", 200)]);
        session.set_booking_data(BookingPatch { booking_response: Some(response()), ..BookingPatch::default() });
        assert!(session.booking().unwrap().booking_response.is_some());

        session.update_selected_seats(vec![seat("A1", 200), seat("A2", 200)]);
        assert!(session.booking().unwrap().booking_response.is_none());
    }

    #[test]
    fn test_provisional_booking_needs_seats() {
        let mut session = SessionState::default();
        session.set_booking_data(BookingPatch { booking_response: Some(response()), ..BookingPatch::default() });
        assert!(session.booking().unwrap().booking_response.is_none());
    }

    #[test]
    fn test_set_booking_data_merges_and_resets_on_new_movie() {
        let movie = sample_movie();
        let mut session = SessionState::default();
        session.set_booking_data(BookingPatch { movie: Some(movie.clone()), ..BookingPatch::default() });
        session.update_selected_seats(vec![seat("A1", 200)]);
        session.set_booking_data(BookingPatch {
            selected_time_with_am_pm: Some("07 : 30 PM".into()),
            ..BookingPatch::default()
        });

        let booking = session.booking().unwrap();
        assert_eq!(booking.movie.as_ref(), Some(&movie));
        assert_eq!(booking.selected_seats.len(), 1);

        let mut other = movie;
        other.id = crate::types::MovieId::new("other");
        session.set_booking_data(BookingPatch { movie: Some(other), ..BookingPatch::default() });
        let booking = session.booking().unwrap();
        assert!(booking.selected_seats.is_empty());
        assert!(booking.selected_time_with_am_pm.is_none());
    }

    #[test]
    fn test_persist_and_hydrate() {
        let storage = InMemoryStorage::new();
        let mut session = SessionState::default();
        session.set_booking_data(BookingPatch { movie: Some(sample_movie()), ..BookingPatch::default() });
        session.update_selected_seats(vec![seat("C3", 180)]);
        session.set_step(BookingStep::Payment);
        session.set_payment_active(true);
        session.persist(&storage);

        assert_eq!(storage.get(STEP_KEY).unwrap().as_deref(), Some("\"payment\""));
        assert_eq!(storage.get(PAYMENT_ACTIVE_KEY).unwrap().as_deref(), Some("true"));
        assert!(storage.get(SESSION_KEY).unwrap().unwrap().contains("\"selectedSeats\""));

        let restored = SessionState::hydrate(&storage);
        assert_eq!(restored.booking(), session.booking());
        assert_eq!(restored.step(), BookingStep::Payment);
        assert!(restored.payment_active());

        session.clear_booking();
        session.persist(&storage);
        assert!(storage.keys().is_empty());
    }

    #[test]
    fn test_hydrate_tolerates_corruption() {
        let storage = InMemoryStorage::new();
        storage.set(SESSION_KEY, "{\"movie\": 12").unwrap();
        storage.set(STEP_KEY, "\"checkout\"").unwrap();

        let session = SessionState::hydrate(&storage);
        assert!(session.booking().is_none());
        assert_eq!(session.step(), BookingStep::MovieSelection);
    }

    #[test]
    fn test_reducer_persists_through_flow_storage() {
        let (env, handles) = flow_env();
        let storage = handles.storage.clone();

        ReducerTest::new(crate::flow::BookingFlowReducer::new())
            .with_env(env)
            .given_state(BookingFlowState::default())
            .when_action(BookingAction::Session(SessionAction::UpdateSelectedSeats(vec![seat("A1", 200)])))
            .when_action(BookingAction::Session(SessionAction::SetBookingStep(BookingStep::SeatSelection)))
            .then_state(move |state| {
                assert_eq!(state.session.step(), BookingStep::SeatSelection);
                assert_eq!(storage.get(STEP_KEY).unwrap().as_deref(), Some("\"seat-selection\""));
                assert!(storage.get(SESSION_KEY).unwrap().is_some());
            })
            .then_effects(|effects| assertions::assert_no_effects(effects))
            .run();
    }

    #[test]
    fn test_clear_booking_removes_persisted_entries() {
        let (env, handles) = flow_env();
        let storage = handles.storage.clone();
        let mut state = BookingFlowState::default();
        state.session.update_selected_seats(vec![seat("A1", 200)]);
        state.session.set_payment_active(true);

        ReducerTest::new(crate::flow::BookingFlowReducer::new())
            .with_env(env)
            .given_state(state)
            .when_action(BookingAction::Session(SessionAction::ClearBooking))
            .then_state(move |state| {
                assert!(state.session.booking().is_none());
                assert!(!state.session.payment_active());
                assert!(storage.keys().is_empty());
            })
            .run();
    }

    fn seat_strategy() -> impl Strategy<Value = Seat> {
        ("[A-E]", 1_u32..15, 1_u64..500).prop_map(|(row, n, price)| seat(&format!("{row}{n}"), price))
    }

    proptest! {
        #[test]
        fn prop_total_matches_selected_seats(batches in prop::collection::vec(prop::collection::vec(seat_strategy(), 0..12), 1..6)) {
            let mut session = SessionState::default();
            for batch in batches {
                session.update_selected_seats(batch);
                let booking = session.booking().unwrap();
                let expected: Money = booking.selected_seats.iter().map(|s| s.price).sum();
                prop_assert_eq!(booking.total_amount, expected);

                let unique: HashSet<&str> = booking.selected_seats.iter().map(|s| s.seat_number.as_str()).collect();
                prop_assert_eq!(unique.len(), booking.selected_seats.len());
            }
        }

        #[test]
        fn prop_clear_selected_seats_always_empties(seats in prop::collection::vec(seat_strategy(), 0..12), with_response in any::<bool>()) {
            let mut session = SessionState::default();
            session.update_selected_seats(seats);
            if with_response {
                session.set_booking_data(BookingPatch { booking_response: Some(response()), ..BookingPatch::default() });
            }

            session.clear_selected_seats();

            let booking = session.booking().unwrap();
            prop_assert!(booking.selected_seats.is_empty());
            prop_assert_eq!(booking.total_amount, Money::ZERO);
            prop_assert!(booking.booking_response.is_none());
        }
    }
}
