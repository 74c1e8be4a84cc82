//! Payment controller.
//!
//! Runs the time-boxed payment window:
//!
//! ```text
//! Idle ──Mounted──▶ FormEntry ──Submit──▶ Processing ──PaymentSucceeded──▶ Success
//!                     ▲    │                  │
//!                     └────┼──PaymentFailed───┘
//!                          ├──Tick at 0 s───────────▶ TimedOut
//!                          └──Leave/Refresh confirmed─▶ Abandoned
//! ```
//!
//! The countdown is a chain of one-second delays registered under
//! [`PAYMENT_TIMER`], so every exit cancels it with a single
//! [`Effect::Cancel`]. Remaining time is always derived from the persisted
//! window start and the injected clock, never from the number of ticks.

use crate::api::PaymentRequest;
use crate::error::ApiError;
use crate::flow::{BookingAction, BookingFlowEnvironment, BookingFlowState};
use crate::types::{
    BookingConfirmation, BookingResponse, BookingStep, ConfirmationSnapshot, Money, Notice,
    PaymentTimer, Route,
};
use crate::validation::{validate, PaymentForm};
use cinebook_core::effect::{Effect, EffectId};
use cinebook_core::reducer::Reducer;
use cinebook_core::{smallvec, SmallVec};
use std::time::Duration;

/// Registration id of the payment countdown
pub const PAYMENT_TIMER: EffectId = EffectId::new("payment-timer");

/// Countdown resolution
const TICK: Duration = Duration::from_secs(1);

/// Where the payment controller is in its lifecycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PaymentPhase {
    /// Not started (or waiting for the session to hydrate)
    #[default]
    Idle,
    /// Collecting payment details
    FormEntry,
    /// Payment request in flight
    Processing,
    /// Payment accepted
    Success,
    /// Payment window ran out
    TimedOut,
    /// The user left or reloaded
    Abandoned,
}

impl PaymentPhase {
    /// Returns true while the window is open and guarded
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::FormEntry | Self::Processing)
    }
}

/// Modal shown over the payment page
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentDialog {
    /// "Leave payment?" after a back attempt
    ConfirmLeave,
    /// "Reload and lose booking?" after a refresh attempt
    ConfirmRefresh,
    /// Window expired; must pick an exit
    TimedOut,
}

/// Where to go after acknowledging a timeout
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeoutExit {
    /// Landing page
    Home,
    /// Movie list
    Movies,
}

/// Amounts shown on the payment page
///
/// `base` and `taxes` are informational and not part of `final_total`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriceBreakdown {
    /// Ticket total from the provisional booking
    pub seat_total: Money,
    /// Backend surcharge
    pub convenience_fee: Money,
    /// 7% of the seat total
    pub base: Money,
    /// 18% of `base`
    pub taxes: Money,
    /// Amount charged: seat total plus convenience fee
    pub final_total: Money,
}

impl PriceBreakdown {
    /// Derive the display amounts from a provisional booking
    #[must_use]
    pub const fn from_response(response: &BookingResponse) -> Self {
        let seat_total = response.ticket_fee;
        let base = seat_total.percent(7);
        Self {
            seat_total,
            convenience_fee: response.convenience_fee,
            base,
            taxes: base.percent(18),
            final_total: seat_total.saturating_add(response.convenience_fee),
        }
    }
}

/// Local state of the payment page
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PaymentState {
    /// Lifecycle phase
    pub phase: PaymentPhase,
    /// Seconds left in the window
    pub remaining_seconds: u64,
    /// Inline form error
    pub form_error: Option<String>,
    /// Open modal
    pub dialog: Option<PaymentDialog>,
    /// What the confirmation screen shows
    pub confirmation: Option<ConfirmationSnapshot>,
    guard_armed: bool,
    mounted: bool,
    /// Booking captured at submission, held until the backend answers
    in_flight: Option<ConfirmationSnapshot>,
}

impl PaymentState {
    /// Returns true if navigation away should be intercepted
    #[must_use]
    pub const fn guard_armed(&self) -> bool {
        self.guard_armed
    }

    /// Returns true while a submitted payment awaits the backend's answer
    #[must_use]
    pub const fn awaiting_payment(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Remaining time as `MM:SS`
    #[must_use]
    pub fn countdown(&self) -> String {
        format!("{:02}:{:02}", self.remaining_seconds / 60, self.remaining_seconds % 60)
    }
}

/// Payment controller input
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentAction {
    /// The payment page was opened
    Mounted,
    /// Re-check the session after the hydration grace delay
    EntryRechecked,
    /// One countdown second passed
    Tick,
    /// The shell intercepted a reload or tab close
    RefreshAttempted,
    /// The shell intercepted back navigation
    BackAttempted,
    /// The user confirmed leaving for seat selection
    LeaveConfirmed,
    /// The user confirmed the reload
    RefreshConfirmed,
    /// The user closed the leave/refresh dialog
    DialogDismissed,
    /// The user submitted the payment form
    Submit(PaymentForm),
    /// The backend accepted the payment
    PaymentSucceeded(BookingConfirmation),
    /// The backend rejected the payment
    PaymentFailed(ApiError),
    /// The user picked an exit from the timeout dialog
    TimeoutAcknowledged(TimeoutExit),
    /// Post-success: open the bookings list
    ViewBookings,
    /// Post-success: share the booking
    Share,
    /// Post-success: go to the landing page
    GoHome,
    /// The payment page was closed
    Unmounted,
}

/// User-facing message for a rejected payment
#[must_use]
pub fn payment_failure_message(error: &ApiError) -> String {
    match error {
        ApiError::Forbidden => "You are not authorized to make this payment".to_string(),
        ApiError::BadRequest(message) | ApiError::Conflict(message) => message.clone(),
        ApiError::Unauthorized => "Your session has expired. Please login again".to_string(),
        ApiError::Server { .. } => "Server error. Please try again later".to_string(),
        ApiError::Network(_) => {
            "Network error. Please check your connection and try again".to_string()
        },
        ApiError::Status { .. } | ApiError::Decode(_) => "Payment failed. Please try again".to_string(),
    }
}

/// Reducer for the payment controller
#[derive(Clone, Copy, Debug, Default)]
pub struct PaymentReducer;

impl PaymentReducer {
    fn tick() -> Effect<PaymentAction> {
        Effect::delay(TICK, PaymentAction::Tick).cancellable(PAYMENT_TIMER)
    }

    fn session_ready(state: &BookingFlowState) -> bool {
        state
            .session
            .booking()
            .is_some_and(|b| b.movie.is_some() && !b.selected_seats.is_empty())
    }

    fn movie_route(state: &BookingFlowState, page: fn(crate::types::MovieId) -> Route) -> Route {
        state
            .session
            .booking()
            .and_then(|b| b.movie_id().cloned())
            .map_or(Route::Movies, page)
    }

    /// Close the window: stop the countdown, release the markers and the guard
    fn close_window(state: &mut BookingFlowState) -> Effect<PaymentAction> {
        state.session.clear_payment_timer();
        state.session.set_payment_active(false);
        state.payment.guard_armed = false;
        Effect::Cancel(PAYMENT_TIMER)
    }

    /// Throw the booking away and send the user to the movie list
    fn abort(state: &mut BookingFlowState, message: &str) -> SmallVec<[Effect<PaymentAction>; 4]> {
        let cancel = Self::close_window(state);
        state.session.clear_booking();
        state.payment.phase = PaymentPhase::Abandoned;
        state.payment.dialog = None;
        state.route = Route::Movies;
        state.notify(Notice::error(message));
        smallvec![cancel]
    }

    fn open_window(
        state: &mut BookingFlowState,
        env: &BookingFlowEnvironment,
    ) -> SmallVec<[Effect<PaymentAction>; 4]> {
        let window = env.settings.payment_window.as_secs();
        let timer = PaymentTimer::started_at(env.clock.now(), window);

        state.session.set_payment_active(true);
        state.session.start_payment_timer(timer);
        state.payment.phase = PaymentPhase::FormEntry;
        state.payment.remaining_seconds = window;
        state.payment.form_error = None;
        state.payment.dialog = None;
        state.payment.confirmation = None;
        state.payment.guard_armed = true;

        tracing::info!(window_seconds = window, "Payment window opened");
        smallvec![Self::tick()]
    }

    fn submit(
        state: &mut BookingFlowState,
        env: &BookingFlowEnvironment,
        form: &PaymentForm,
    ) -> SmallVec<[Effect<PaymentAction>; 4]> {
        if state.payment.phase != PaymentPhase::FormEntry {
            tracing::warn!(phase = ?state.payment.phase, "Ignoring payment submission");
            return SmallVec::new();
        }

        let card = match validate(form, env.clock.now()) {
            Ok(card) => card,
            Err(error) => {
                state.payment.form_error = Some(error.to_string());
                return SmallVec::new();
            },
        };

        let response = state
            .session
            .booking()
            .and_then(|b| b.booking_response.clone())
            .filter(|r| !r.seat_numbers.is_empty());
        let Some((response, slot_id)) = response.and_then(|r| r.slot_id.map(|id| (r, id))) else {
            tracing::warn!("Payment submitted without a provisional booking");
            let route = Self::movie_route(state, |movie_id| Route::MovieDetail { movie_id });
            let effects = Self::abort(state, "Booking details are missing. Please restart your booking");
            state.route = route;
            return effects;
        };

        let request = PaymentRequest {
            slot_id,
            seat_numbers: response.seat_numbers.clone(),
            total_amount: PriceBreakdown::from_response(&response).final_total,
            card_number: card.digits(),
            card_holder_name: card.card_holder_name.trim().to_string(),
            expiry_date: card.expiry_date.trim().to_string(),
            cvv: card.cvv.trim().to_string(),
        };

        state.payment.in_flight = Self::snapshot(state);
        state.payment.phase = PaymentPhase::Processing;
        state.payment.form_error = None;
        tracing::info!(%slot_id, amount = %request.total_amount, "Submitting payment");

        let api = env.api.clone();
        smallvec![Effect::Future(Box::pin(async move {
            Some(match api.submit_payment(request).await {
                Ok(confirmation) => PaymentAction::PaymentSucceeded(confirmation),
                Err(error) => PaymentAction::PaymentFailed(error),
            })
        }))]
    }

    /// What the confirmation screen would show for the current session
    fn snapshot(state: &BookingFlowState) -> Option<ConfirmationSnapshot> {
        let booking = state.session.booking()?;
        let total = booking
            .booking_response
            .as_ref()
            .map_or(booking.total_amount, |r| PriceBreakdown::from_response(r).final_total);
        Some(ConfirmationSnapshot {
            movie: booking.movie.clone()?,
            selected_date: booking.selected_date.clone(),
            selected_time_with_am_pm: booking.selected_time_with_am_pm.clone(),
            selected_cinema: booking.selected_cinema.clone(),
            selected_seats: booking.selected_seats.clone(),
            total_amount: total,
            booking_id: None,
        })
    }

    fn succeed(
        state: &mut BookingFlowState,
        confirmation: BookingConfirmation,
    ) -> SmallVec<[Effect<PaymentAction>; 4]> {
        let cancel = Self::close_window(state);

        // The session may already be gone (timeout, unmount) while the charge went through
        let snapshot = state.payment.in_flight.take().or_else(|| Self::snapshot(state));
        state.payment.confirmation = snapshot.map(|snapshot| ConfirmationSnapshot {
            booking_id: confirmation.booking_id.clone(),
            ..snapshot
        });
        state.payment.phase = PaymentPhase::Success;
        state.payment.dialog = None;
        if state.session.booking().is_some() {
            state.session.set_step(BookingStep::Confirmation);
        }
        state.notify(Notice::success(
            confirmation.message.unwrap_or_else(|| "Booking confirmed!".to_string()),
        ));

        tracing::info!(booking_id = ?state.payment.confirmation.as_ref().and_then(|c| c.booking_id.as_deref()), "Payment succeeded");
        smallvec![cancel]
    }

    fn share_text(snapshot: &ConfirmationSnapshot) -> String {
        let seats: Vec<&str> = snapshot.selected_seats.iter().map(|s| s.seat_number.as_str()).collect();
        let mut text = format!("I just booked {} for {}", seats.join(", "), snapshot.movie.title);
        if let Some(date) = &snapshot.selected_date {
            text.push_str(&format!(" on {} {} {}", date.day_name, date.day, date.month_name));
        }
        if let Some(time) = &snapshot.selected_time_with_am_pm {
            text.push_str(&format!(" at {time}"));
        }
        if let Some(cinema) = &snapshot.selected_cinema {
            if !cinema.theater_name.is_empty() {
                text.push_str(&format!(", {}", cinema.theater_name));
            }
        }
        text.push('!');
        text
    }
}

impl Reducer for PaymentReducer {
    type State = BookingFlowState;
    type Action = PaymentAction;
    type Environment = BookingFlowEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per payment page event
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Entry ==========
            PaymentAction::Mounted => {
                state.payment = PaymentState {
                    mounted: true,
                    in_flight: state.payment.in_flight.take(),
                    ..PaymentState::default()
                };

                // The marker only survives a mount that never unmounted cleanly: a reload
                if state.session.payment_active() {
                    tracing::warn!("Payment page reloaded mid-session, cancelling transaction");
                    return Self::abort(
                        state,
                        "Payment session was interrupted by a page refresh. Please start your booking again",
                    );
                }

                if Self::session_ready(state) {
                    return Self::open_window(state, env);
                }

                tracing::debug!("Booking session not ready, waiting for hydration");
                smallvec![Effect::delay(env.settings.hydration_grace, PaymentAction::EntryRechecked)]
            },

            PaymentAction::EntryRechecked => {
                if !state.payment.mounted || state.payment.phase != PaymentPhase::Idle {
                    return SmallVec::new();
                }
                if Self::session_ready(state) {
                    return Self::open_window(state, env);
                }

                tracing::warn!("No booking in progress on payment page");
                Self::abort(state, "No booking in progress. Please select your seats first")
            },

            // ========== Countdown ==========
            PaymentAction::Tick => {
                if !state.payment.phase.is_active() {
                    return SmallVec::new();
                }
                let Some(timer) = state.session.payment_timer().copied() else {
                    return SmallVec::new();
                };

                let remaining = timer.remaining_at(env.clock.now());
                state.payment.remaining_seconds = remaining;
                if remaining > 0 {
                    return smallvec![Self::tick()];
                }

                tracing::info!("Payment window expired, discarding booking");
                let cancel = Self::close_window(state);
                state.session.clear_booking();
                state.payment.phase = PaymentPhase::TimedOut;
                state.payment.dialog = Some(PaymentDialog::TimedOut);
                smallvec![cancel]
            },

            PaymentAction::TimeoutAcknowledged(exit) => {
                if state.payment.phase != PaymentPhase::TimedOut {
                    return SmallVec::new();
                }
                state.payment.dialog = None;
                state.route = match exit {
                    TimeoutExit::Home => Route::Home,
                    TimeoutExit::Movies => Route::Movies,
                };
                SmallVec::new()
            },

            // ========== Navigation guard ==========
            PaymentAction::RefreshAttempted | PaymentAction::BackAttempted => {
                let protected = state.payment.phase.is_active() && !state.session.selected_seats().is_empty();
                if protected {
                    state.payment.dialog = Some(if action == PaymentAction::RefreshAttempted {
                        PaymentDialog::ConfirmRefresh
                    } else {
                        PaymentDialog::ConfirmLeave
                    });
                } else if action == PaymentAction::BackAttempted {
                    state.route = Self::movie_route(state, |movie_id| Route::SeatSelection { movie_id });
                }
                SmallVec::new()
            },

            PaymentAction::LeaveConfirmed => {
                if state.payment.dialog != Some(PaymentDialog::ConfirmLeave) {
                    return SmallVec::new();
                }
                let cancel = Self::close_window(state);
                state.session.clear_selected_seats();
                state.session.set_step(BookingStep::SeatSelection);
                state.payment.phase = PaymentPhase::Abandoned;
                state.payment.dialog = None;
                state.route = Self::movie_route(state, |movie_id| Route::SeatSelection { movie_id });

                tracing::info!("Payment abandoned, back to seat selection");
                smallvec![cancel]
            },

            PaymentAction::RefreshConfirmed => {
                if state.payment.dialog != Some(PaymentDialog::ConfirmRefresh) {
                    return SmallVec::new();
                }
                tracing::info!("Payment abandoned by reload");
                Self::abort(state, "Your booking was cancelled")
            },

            PaymentAction::DialogDismissed => {
                if matches!(
                    state.payment.dialog,
                    Some(PaymentDialog::ConfirmLeave | PaymentDialog::ConfirmRefresh)
                ) {
                    state.payment.dialog = None;
                }
                SmallVec::new()
            },

            // ========== Submission ==========
            PaymentAction::Submit(form) => Self::submit(state, env, &form),

            PaymentAction::PaymentSucceeded(confirmation) => {
                if state.payment.phase != PaymentPhase::Processing && !state.payment.awaiting_payment() {
                    tracing::warn!(phase = ?state.payment.phase, "Ignoring unexpected payment confirmation");
                    return SmallVec::new();
                }
                Self::succeed(state, confirmation)
            },

            PaymentAction::PaymentFailed(error) => {
                let submitted = state.payment.in_flight.take();
                if state.payment.phase != PaymentPhase::Processing {
                    if submitted.is_some() {
                        tracing::info!(%error, phase = ?state.payment.phase, "Late payment rejection");
                    }
                    return SmallVec::new();
                }
                tracing::warn!(%error, "Payment rejected");
                state.payment.phase = PaymentPhase::FormEntry;
                state.notify(Notice::error(payment_failure_message(&error)));
                SmallVec::new()
            },

            // ========== After success ==========
            PaymentAction::ViewBookings | PaymentAction::GoHome => {
                if state.payment.phase != PaymentPhase::Success {
                    return SmallVec::new();
                }
                state.session.clear_booking();
                state.route = if action == PaymentAction::ViewBookings {
                    Route::Bookings
                } else {
                    Route::Home
                };
                SmallVec::new()
            },

            PaymentAction::Share => {
                if let Some(snapshot) = &state.payment.confirmation {
                    let text = Self::share_text(snapshot);
                    state.notify(Notice::info(text));
                }
                SmallVec::new()
            },

            PaymentAction::Unmounted => {
                state.payment.mounted = false;
                state.payment.dialog = None;
                if state.payment.phase.is_active() {
                    state.payment.phase = PaymentPhase::Idle;
                }
                let cancel = Self::close_window(state);
                smallvec![cancel]
            },
        }
    }
}

impl From<PaymentAction> for BookingAction {
    fn from(action: PaymentAction) -> Self {
        Self::Payment(action)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::flow::test_support::{flow_env, state_at_payment};
    use crate::flow::BookingFlowReducer;
    use crate::types::{NoticeLevel, SlotId};
    use crate::validation::CardDetails;
    use cinebook_core::environment::Clock;
    use cinebook_testing::{assertions, ReducerTest};

    fn pay(action: PaymentAction) -> BookingAction {
        BookingAction::Payment(action)
    }

    fn valid_card() -> PaymentForm {
        PaymentForm::Card(CardDetails {
            card_number: "4111 1111 1111 1111".into(),
            card_holder_name: "Asha Rao".into(),
            expiry_date: "12/30".into(),
            cvv: "123".into(),
        })
    }

    #[test]
    fn test_price_breakdown() {
        let response = BookingResponse {
            slot_id: Some(SlotId::new(42)),
            seat_numbers: vec!["A1".into(), "A2".into()],
            ticket_fee: Money::from_major(400),
            convenience_fee: Money::from_major(40),
        };
        let price = PriceBreakdown::from_response(&response);
        assert_eq!(price.seat_total, Money::from_major(400));
        assert_eq!(price.base, Money::from_major(28));
        assert_eq!(price.taxes, Money::from_minor(504));
        assert_eq!(price.final_total, Money::from_major(440));
    }

    #[test]
    fn test_failure_messages() {
        assert_eq!(payment_failure_message(&ApiError::BadRequest("Invalid CVV".into())), "Invalid CVV");
        assert_eq!(payment_failure_message(&ApiError::Forbidden), "You are not authorized to make this payment");
        assert!(payment_failure_message(&ApiError::Network("x".into())).contains("connection"));
        assert!(payment_failure_message(&ApiError::Server { status: 503, message: String::new() }).contains("Server error"));
        assert!(payment_failure_message(&ApiError::Unauthorized).contains("login again"));
    }

    #[test]
    fn test_mount_opens_window() {
        let (env, handles) = flow_env();
        let now = handles.clock.now();

        ReducerTest::new(BookingFlowReducer::new())
            .with_env(env)
            .given_state(state_at_payment())
            .when_action(pay(PaymentAction::Mounted))
            .then_state(move |state| {
                assert_eq!(state.payment.phase, PaymentPhase::FormEntry);
                assert_eq!(state.payment.remaining_seconds, 600);
                assert_eq!(state.payment.countdown(), "10:00");
                assert!(state.session.payment_active());
                assert_eq!(state.session.payment_timer().unwrap().start_epoch_seconds, now.timestamp());
                assert!(state.payment.guard_armed());
            })
            .then_effects(|effects| assertions::assert_registers(effects, PAYMENT_TIMER))
            .run();
        assert!(handles.guard.is_armed());
    }

    #[test]
    fn test_mount_with_active_marker_cancels() {
        let (env, handles) = flow_env();
        let mut state = state_at_payment();
        state.session.set_payment_active(true);

        ReducerTest::new(BookingFlowReducer::new())
            .with_env(env)
            .given_state(state)
            .when_action(pay(PaymentAction::Mounted))
            .then_state(|state| {
                assert_eq!(state.payment.phase, PaymentPhase::Abandoned);
                assert!(state.session.booking().is_none());
                assert_eq!(state.route, Route::Movies);
                assert_eq!(state.notice.as_ref().unwrap().level, NoticeLevel::Error);
            })
            .then_effects(|effects| assertions::assert_cancels(effects, PAYMENT_TIMER))
            .run();
        assert!(!handles.guard.is_armed());
    }

    #[test]
    fn test_empty_session_waits_then_rejects() {
        let (env, _) = flow_env();

        ReducerTest::new(BookingFlowReducer::new())
            .with_env(env.clone())
            .given_state(BookingFlowState::default())
            .when_action(pay(PaymentAction::Mounted))
            .then_state(|state| assert_eq!(state.payment.phase, PaymentPhase::Idle))
            .then_effects(|effects| {
                assert!(matches!(
                    effects[0],
                    Effect::Delay { duration, .. } if duration == Duration::from_millis(300)
                ));
            })
            .run();

        ReducerTest::new(BookingFlowReducer::new())
            .with_env(env)
            .given_state(BookingFlowState::default())
            .when_action(pay(PaymentAction::Mounted))
            .when_action(pay(PaymentAction::EntryRechecked))
            .then_state(|state| {
                assert_eq!(state.route, Route::Movies);
                assert_eq!(state.notice.as_ref().unwrap().level, NoticeLevel::Error);
            })
            .run();
    }

    #[test]
    fn test_session_hydrated_during_grace_opens_window() {
        let (env, _) = flow_env();
        let ready = state_at_payment();
        let booking = ready.session.booking().unwrap().clone();

        ReducerTest::new(BookingFlowReducer::new())
            .with_env(env)
            .given_state(BookingFlowState::default())
            .when_action(pay(PaymentAction::Mounted))
            .when_action(BookingAction::Session(crate::session::SessionAction::SetBookingData(
                crate::types::BookingPatch { movie: booking.movie.clone(), ..Default::default() },
            )))
            .when_action(BookingAction::Session(crate::session::SessionAction::UpdateSelectedSeats(
                booking.selected_seats.clone(),
            )))
            .when_action(pay(PaymentAction::EntryRechecked))
            .then_state(|state| assert_eq!(state.payment.phase, PaymentPhase::FormEntry))
            .then_effects(|effects| assertions::assert_registers(effects, PAYMENT_TIMER))
            .run();
    }

    #[test]
    fn test_tick_counts_down_from_clock() {
        let (env, handles) = flow_env();
        let clock = handles.clock.clone();

        let reducer = BookingFlowReducer::new();
        let mut state = state_at_payment();
        let _ = reducer.reduce(&mut state, pay(PaymentAction::Mounted), &env);

        clock.advance(chrono::Duration::seconds(125));
        let effects = reducer.reduce(&mut state, pay(PaymentAction::Tick), &env);
        assert_eq!(state.payment.remaining_seconds, 475);
        assert_eq!(state.payment.countdown(), "07:55");
        assertions::assert_registers(&effects, PAYMENT_TIMER);
    }

    #[test]
    fn test_timeout_fires_once() {
        let (env, handles) = flow_env();
        let reducer = BookingFlowReducer::new();
        let mut state = state_at_payment();
        let _ = reducer.reduce(&mut state, pay(PaymentAction::Mounted), &env);

        handles.clock.advance(chrono::Duration::seconds(600));
        let effects = reducer.reduce(&mut state, pay(PaymentAction::Tick), &env);
        assert_eq!(state.payment.phase, PaymentPhase::TimedOut);
        assert_eq!(state.payment.dialog, Some(PaymentDialog::TimedOut));
        assert!(state.session.payment_timer().is_none());
        assertions::assert_cancels(&effects, PAYMENT_TIMER);
        assert!(!handles.guard.is_armed());

        let again = reducer.reduce(&mut state, pay(PaymentAction::Tick), &env);
        assertions::assert_no_effects(&again);

        // The timeout dialog cannot be dismissed, only acknowledged
        let _ = reducer.reduce(&mut state, pay(PaymentAction::DialogDismissed), &env);
        assert_eq!(state.payment.dialog, Some(PaymentDialog::TimedOut));

        let _ = reducer.reduce(&mut state, pay(PaymentAction::TimeoutAcknowledged(TimeoutExit::Home)), &env);
        assert_eq!(state.route, Route::Home);
        assert!(state.session.booking().is_none());
    }

    #[test]
    fn test_refresh_confirmed_destroys_session() {
        let (env, _) = flow_env();

        ReducerTest::new(BookingFlowReducer::new())
            .with_env(env)
            .given_state(state_at_payment())
            .when_action(pay(PaymentAction::Mounted))
            .when_action(pay(PaymentAction::RefreshAttempted))
            .when_action(pay(PaymentAction::RefreshConfirmed))
            .then_state(|state| {
                assert_eq!(state.payment.phase, PaymentPhase::Abandoned);
                assert!(state.session.booking().is_none());
                assert!(!state.session.payment_active());
                assert_eq!(state.route, Route::Movies);
            })
            .then_effects(|effects| assertions::assert_cancels(effects, PAYMENT_TIMER))
            .run();
    }

    #[test]
    fn test_dialog_dismissed_keeps_window() {
        let (env, _) = flow_env();

        ReducerTest::new(BookingFlowReducer::new())
            .with_env(env)
            .given_state(state_at_payment())
            .when_action(pay(PaymentAction::Mounted))
            .when_action(pay(PaymentAction::BackAttempted))
            .when_action(pay(PaymentAction::DialogDismissed))
            .when_action(pay(PaymentAction::LeaveConfirmed))
            .then_state(|state| {
                assert_eq!(state.payment.phase, PaymentPhase::FormEntry);
                assert!(state.payment.dialog.is_none());
                assert!(!state.session.selected_seats().is_empty());
            })
            .run();
    }

    #[test]
    fn test_submit_without_provisional_booking_restarts() {
        let (env, handles) = flow_env();
        let mut state = state_at_payment();
        let seats = state.session.selected_seats().to_vec();
        // Re-setting the seats drops the provisional booking
        state.session.update_selected_seats(seats);
        let api = handles.api.clone();

        ReducerTest::new(BookingFlowReducer::new())
            .with_env(env)
            .given_state(state)
            .when_action(pay(PaymentAction::Mounted))
            .when_action(pay(PaymentAction::Submit(valid_card())))
            .then_state(|state| {
                assert!(state.session.booking().is_none());
                assert!(matches!(state.route, Route::MovieDetail { .. }));
                assert!(state.notice.as_ref().unwrap().message.contains("restart"));
            })
            .then_effects(|effects| assertions::assert_no_future_effect(effects))
            .run();
        assert_eq!(api.payment_calls(), 0);
    }

    #[test]
    fn test_submit_and_success() {
        let (env, _) = flow_env();

        ReducerTest::new(BookingFlowReducer::new())
            .with_env(env)
            .given_state(state_at_payment())
            .when_action(pay(PaymentAction::Mounted))
            .when_action(pay(PaymentAction::Submit(valid_card())))
            .then_state(|state| assert_eq!(state.payment.phase, PaymentPhase::Processing))
            .then_effects(|effects| assertions::assert_has_future_effect(effects))
            .run();

        let reducer = BookingFlowReducer::new();
        let (env, _) = flow_env();
        let mut state = state_at_payment();
        let _ = reducer.reduce(&mut state, pay(PaymentAction::Mounted), &env);
        let _ = reducer.reduce(&mut state, pay(PaymentAction::Submit(valid_card())), &env);
        let effects = reducer.reduce(
            &mut state,
            pay(PaymentAction::PaymentSucceeded(BookingConfirmation {
                booking_id: Some("BK-1".into()),
                status: Some("CONFIRMED".into()),
                message: None,
            })),
            &env,
        );

        assertions::assert_cancels(&effects, PAYMENT_TIMER);
        assert_eq!(state.payment.phase, PaymentPhase::Success);
        assert_eq!(state.session.step(), BookingStep::Confirmation);
        assert!(!state.session.payment_active());
        let snapshot = state.payment.confirmation.clone().unwrap();
        assert_eq!(snapshot.booking_id.as_deref(), Some("BK-1"));
        assert_eq!(snapshot.total_amount, Money::from_major(440));

        let _ = reducer.reduce(&mut state, pay(PaymentAction::Share), &env);
        assert!(state.notice.as_ref().unwrap().message.starts_with("I just booked A1, A2 for"));

        let _ = reducer.reduce(&mut state, pay(PaymentAction::ViewBookings), &env);
        assert_eq!(state.route, Route::Bookings);
        assert!(state.session.booking().is_none());
        assert!(state.payment.confirmation.is_some());
    }

    #[test]
    fn test_double_submit_is_ignored() {
        let (env, _) = flow_env();

        ReducerTest::new(BookingFlowReducer::new())
            .with_env(env)
            .given_state(state_at_payment())
            .when_action(pay(PaymentAction::Mounted))
            .when_action(pay(PaymentAction::Submit(valid_card())))
            .when_action(pay(PaymentAction::Submit(valid_card())))
            .then_effects(|effects| assertions::assert_no_future_effect(effects))
            .run();
    }

    #[test]
    fn test_unmount_releases_everything() {
        let (env, handles) = flow_env();

        ReducerTest::new(BookingFlowReducer::new())
            .with_env(env)
            .given_state(state_at_payment())
            .when_action(pay(PaymentAction::Mounted))
            .when_action(pay(PaymentAction::Unmounted))
            .then_state(|state| {
                assert!(!state.session.payment_active());
                assert_eq!(state.payment.phase, PaymentPhase::Idle);
            })
            .then_effects(|effects| assertions::assert_cancels(effects, PAYMENT_TIMER))
            .run();
        assert!(!handles.guard.is_armed());
        assert_eq!(handles.guard.arm_calls(), 1);
    }

    fn confirmed(booking_id: &str) -> PaymentAction {
        PaymentAction::PaymentSucceeded(BookingConfirmation {
            booking_id: Some(booking_id.into()),
            status: Some("CONFIRMED".into()),
            message: None,
        })
    }

    #[test]
    fn test_timeout_discards_stored_session() {
        let (env, handles) = flow_env();
        let reducer = BookingFlowReducer::new();
        let mut state = state_at_payment();
        let _ = reducer.reduce(&mut state, pay(PaymentAction::Mounted), &env);
        assert!(!handles.storage.keys().is_empty());

        handles.clock.advance(chrono::Duration::seconds(600));
        let _ = reducer.reduce(&mut state, pay(PaymentAction::Tick), &env);
        assert_eq!(state.payment.phase, PaymentPhase::TimedOut);
        assert!(state.session.booking().is_none());
        assert!(handles.storage.keys().is_empty());

        // Reloading before the dialog is acknowledged must not reopen the window
        let mut reloaded = BookingFlowState::hydrate(&handles.storage);
        assert_eq!(reloaded.route, Route::Home);

        let effects = reducer.reduce(&mut reloaded, pay(PaymentAction::Mounted), &env);
        assertions::assert_no_future_effect(&effects);
        assert_eq!(reloaded.payment.phase, PaymentPhase::Idle);
        assert!(reloaded.session.payment_timer().is_none());

        let _ = reducer.reduce(&mut reloaded, pay(PaymentAction::EntryRechecked), &env);
        assert_eq!(reloaded.payment.phase, PaymentPhase::Abandoned);
        assert_eq!(reloaded.route, Route::Movies);
        assert!(!handles.guard.is_armed());
    }

    #[test]
    fn test_success_after_timeout_while_processing() {
        let (env, handles) = flow_env();
        let reducer = BookingFlowReducer::new();
        let mut state = state_at_payment();
        let _ = reducer.reduce(&mut state, pay(PaymentAction::Mounted), &env);
        let _ = reducer.reduce(&mut state, pay(PaymentAction::Submit(valid_card())), &env);

        handles.clock.advance(chrono::Duration::seconds(600));
        let _ = reducer.reduce(&mut state, pay(PaymentAction::Tick), &env);
        assert_eq!(state.payment.phase, PaymentPhase::TimedOut);
        assert!(state.session.booking().is_none());

        let _ = reducer.reduce(&mut state, pay(confirmed("BK-7")), &env);
        assert_eq!(state.payment.phase, PaymentPhase::Success);
        assert!(state.payment.dialog.is_none());
        let snapshot = state.payment.confirmation.clone().unwrap();
        assert_eq!(snapshot.booking_id.as_deref(), Some("BK-7"));
        assert_eq!(snapshot.selected_seats.len(), 2);
        assert_eq!(snapshot.total_amount, Money::from_major(440));
        // Nothing comes back to life in storage
        assert!(handles.storage.keys().is_empty());
    }

    #[test]
    fn test_success_after_unmount_while_processing() {
        let (env, _) = flow_env();

        ReducerTest::new(BookingFlowReducer::new())
            .with_env(env)
            .given_state(state_at_payment())
            .when_action(pay(PaymentAction::Mounted))
            .when_action(pay(PaymentAction::Submit(valid_card())))
            .when_action(pay(PaymentAction::Unmounted))
            .when_action(pay(confirmed("BK-9")))
            .then_state(|state| {
                assert_eq!(state.payment.phase, PaymentPhase::Success);
                assert!(!state.payment.awaiting_payment());
                assert_eq!(state.session.step(), BookingStep::Confirmation);
                let snapshot = state.payment.confirmation.as_ref().unwrap();
                assert_eq!(snapshot.booking_id.as_deref(), Some("BK-9"));
            })
            .run();
    }

    #[test]
    fn test_confirmation_without_submission_is_ignored() {
        let (env, _) = flow_env();

        ReducerTest::new(BookingFlowReducer::new())
            .with_env(env)
            .given_state(state_at_payment())
            .when_action(pay(PaymentAction::Mounted))
            .when_action(pay(PaymentAction::Unmounted))
            .when_action(pay(confirmed("BK-3")))
            .then_state(|state| {
                assert_eq!(state.payment.phase, PaymentPhase::Idle);
                assert!(state.payment.confirmation.is_none());
            })
            .run();
    }

    #[test]
    fn test_upi_form_is_rejected_inline() {
        let (env, handles) = flow_env();
        let api = handles.api.clone();

        ReducerTest::new(BookingFlowReducer::new())
            .with_env(env)
            .given_state(state_at_payment())
            .when_action(pay(PaymentAction::Mounted))
            .when_action(pay(PaymentAction::Submit(PaymentForm::Upi { upi_id: "asha@okbank".into() })))
            .then_state(|state| {
                assert_eq!(state.payment.phase, PaymentPhase::FormEntry);
                assert!(state.payment.form_error.as_ref().unwrap().contains("UPI"));
            })
            .then_effects(|effects| assertions::assert_no_future_effect(effects))
            .run();
        assert_eq!(api.payment_calls(), 0);
    }
}
