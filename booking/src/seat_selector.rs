//! Seat selector: loads a slot's seat layout, keeps a bounded selection and
//! reserves it with the backend.

use crate::api::SelectSeatsRequest;
use crate::error::ApiError;
use crate::flow::{BookingAction, BookingFlowEnvironment, BookingFlowState};
use crate::payment::PAYMENT_TIMER;
use crate::types::{BookingPatch, BookingResponse, BookingStep, Notice, Route, Seat, SlotId};
use cinebook_core::effect::Effect;
use cinebook_core::reducer::Reducer;
use cinebook_core::{smallvec, SmallVec};
use std::collections::BTreeMap;

/// One row of the seat map
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeatRow {
    /// Row key (leading character of the seat numbers)
    pub row: char,
    /// Seats ordered by number
    pub seats: Vec<Seat>,
    /// Placeholder slots on each side to centre the row
    pub padding: usize,
}

/// Seat map grouped into centred rows
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeatLayout {
    /// Rows in row-key order
    pub rows: Vec<SeatRow>,
}

/// Group seats into rows keyed by the first character of the seat number
///
/// Seats within a row are ordered by their numeric suffix. Rows shorter than the
/// longest one get `(longest - len) / 2` placeholders on each side.
#[must_use]
pub fn group_rows(seats: &[Seat]) -> SeatLayout {
    let mut rows: BTreeMap<char, Vec<Seat>> = BTreeMap::new();
    for seat in seats {
        if let Some(row) = seat.row() {
            rows.entry(row).or_default().push(seat.clone());
        }
    }

    let widest = rows.values().map(Vec::len).max().unwrap_or(0);
    SeatLayout {
        rows: rows
            .into_iter()
            .map(|(row, mut seats)| {
                seats.sort_by_key(Seat::position);
                let padding = (widest - seats.len()) / 2;
                SeatRow { row, seats, padding }
            })
            .collect(),
    }
}

/// Local state of the seat selection page
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeatSelectorState {
    /// Seat layout of the current slot
    pub seats: Vec<Seat>,
    /// Selected seat numbers in click order
    pub selected: Vec<String>,
    /// A layout fetch is in flight
    pub loading: bool,
    /// A reservation request is in flight
    pub submitting: bool,
    /// Layout load failure shown in place of the map
    pub error: Option<String>,
    generation: u64,
    mounted: bool,
}

impl SeatSelectorState {
    /// The layout grouped into rows
    #[must_use]
    pub fn layout(&self) -> SeatLayout {
        group_rows(&self.seats)
    }

    /// Returns true if `seat_number` is selected
    #[must_use]
    pub fn is_selected(&self, seat_number: &str) -> bool {
        self.selected.iter().any(|s| s == seat_number)
    }

    /// Generation of the most recent layout request
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns true while the seat page is mounted
    #[must_use]
    pub const fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn selected_seats(&self) -> Vec<Seat> {
        self.selected
            .iter()
            .filter_map(|number| self.seats.iter().find(|seat| &seat.seat_number == number))
            .cloned()
            .collect()
    }
}

/// Seat selector input
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SeatAction {
    /// The seat page was opened
    Mounted,
    /// The seat page was closed
    Unmounted,
    /// A layout response arrived
    LayoutLoaded {
        /// Request generation the response belongs to
        generation: u64,
        /// Seats of the slot
        seats: Vec<Seat>,
    },
    /// A layout request failed
    LayoutFailed {
        /// Request generation the response belongs to
        generation: u64,
        /// What went wrong
        error: ApiError,
    },
    /// The user clicked a seat
    SeatClicked(String),
    /// The user confirmed the selection
    ConfirmSeats,
    /// The backend locked the seats
    SeatsReserved(BookingResponse),
    /// The backend refused the reservation
    ReservationFailed(ApiError),
}

/// Reducer for the seat selector
#[derive(Clone, Copy, Debug, Default)]
pub struct SeatSelectorReducer;

impl SeatSelectorReducer {
    fn fetch_layout(
        state: &mut BookingFlowState,
        env: &BookingFlowEnvironment,
        slot_id: SlotId,
    ) -> Effect<SeatAction> {
        let seats = &mut state.seats;
        seats.generation += 1;
        seats.loading = true;
        seats.error = None;

        let generation = seats.generation;
        let api = env.api.clone();
        Effect::Future(Box::pin(async move {
            Some(match api.fetch_seats(slot_id).await {
                Ok(seats) => SeatAction::LayoutLoaded { generation, seats },
                Err(error) => SeatAction::LayoutFailed { generation, error },
            })
        }))
    }

    fn is_current(state: &BookingFlowState, generation: u64) -> bool {
        state.seats.mounted && state.seats.generation == generation
    }

    /// Route back to show selection when the session has no chosen showing
    fn reject_entry(state: &mut BookingFlowState) {
        tracing::warn!("Seat selection opened without a chosen show");
        state.notify(Notice::error("Please select a show time first"));
        state.route = state
            .session
            .booking()
            .and_then(|b| b.movie_id().cloned())
            .map_or(Route::Movies, |movie_id| Route::MovieDetail { movie_id });
    }

    /// Slot of the chosen showing; `None` until movie, date, time and cinema are all set
    fn slot_id(state: &BookingFlowState) -> Option<SlotId> {
        let booking = state.session.booking().filter(|b| b.show_chosen())?;
        booking.selected_cinema.as_ref().map(|slot| slot.slot_id)
    }
}

impl Reducer for SeatSelectorReducer {
    type State = BookingFlowState;
    type Action = SeatAction;
    type Environment = BookingFlowEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per seat page event
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            SeatAction::Mounted => {
                let Some(slot_id) = Self::slot_id(state) else {
                    Self::reject_entry(state);
                    return SmallVec::new();
                };

                // A new pass over seat selection never inherits an old selection or payment window
                state.seats.selected.clear();
                state.seats.seats.clear();
                state.seats.submitting = false;
                state.seats.mounted = true;
                state.session.clear_selected_seats();
                state.session.clear_payment_timer();
                state.session.set_payment_active(false);

                tracing::info!(%slot_id, "Loading seat layout");
                smallvec![Effect::Cancel(PAYMENT_TIMER), Self::fetch_layout(state, env, slot_id)]
            },

            SeatAction::Unmounted => {
                state.seats.mounted = false;
                state.seats.loading = false;
                SmallVec::new()
            },

            SeatAction::LayoutLoaded { generation, seats } => {
                if !Self::is_current(state, generation) {
                    tracing::debug!(generation, "Ignoring stale seat layout");
                    return SmallVec::new();
                }
                state.seats.loading = false;
                state.seats.seats = seats;

                // Drop selections the fresh layout shows as taken
                let before = state.seats.selected.len();
                let layout = &state.seats.seats;
                state.seats.selected.retain(|number| {
                    layout.iter().any(|seat| &seat.seat_number == number && !seat.is_booked())
                });
                if state.seats.selected.len() != before {
                    let seats = state.seats.selected_seats();
                    state.session.update_selected_seats(seats);
                }
                SmallVec::new()
            },

            SeatAction::LayoutFailed { generation, error } => {
                if !Self::is_current(state, generation) {
                    tracing::debug!(generation, "Ignoring stale seat layout failure");
                    return SmallVec::new();
                }
                tracing::warn!(%error, "Failed to load seat layout");
                state.seats.loading = false;
                state.seats.error = Some("Failed to load seats".to_string());
                state.notify(Notice::error("Failed to load seats. Please try again"));
                SmallVec::new()
            },

            SeatAction::SeatClicked(seat_number) => {
                if state.seats.submitting {
                    return SmallVec::new();
                }
                let Some(seat) = state.seats.seats.iter().find(|s| s.seat_number == seat_number) else {
                    tracing::warn!(%seat_number, "Click on a seat that is not in the layout");
                    return SmallVec::new();
                };
                if seat.is_booked() {
                    return SmallVec::new();
                }

                if state.seats.is_selected(&seat_number) {
                    state.seats.selected.retain(|s| s != &seat_number);
                } else if state.seats.selected.len() >= env.settings.ticket_limit {
                    state.notify(Notice::warning(format!(
                        "You can only select up to {} seats",
                        env.settings.ticket_limit
                    )));
                    return SmallVec::new();
                } else {
                    state.seats.selected.push(seat_number);
                }

                let seats = state.seats.selected_seats();
                state.session.update_selected_seats(seats);
                SmallVec::new()
            },

            SeatAction::ConfirmSeats => {
                if state.seats.submitting {
                    return SmallVec::new();
                }
                if !env.auth.is_authenticated() {
                    state.notify(Notice::info("Please login to continue booking"));
                    state.route = Route::Login;
                    return SmallVec::new();
                }
                if state.seats.selected.is_empty() {
                    state.notify(Notice::warning("Please select at least one seat"));
                    return SmallVec::new();
                }
                let Some(slot_id) = Self::slot_id(state) else {
                    Self::reject_entry(state);
                    return SmallVec::new();
                };

                state.seats.submitting = true;
                let request = SelectSeatsRequest {
                    slot_id,
                    seat_numbers: state.seats.selected.clone(),
                };
                tracing::info!(%slot_id, seats = request.seat_numbers.len(), "Reserving seats");

                let api = env.api.clone();
                smallvec![Effect::Future(Box::pin(async move {
                    Some(match api.select_seats(request).await {
                        Ok(response) => SeatAction::SeatsReserved(response),
                        Err(error) => SeatAction::ReservationFailed(error),
                    })
                }))]
            },

            SeatAction::SeatsReserved(response) => {
                state.seats.submitting = false;
                let Some(movie_id) = state.session.booking().and_then(|b| b.movie_id().cloned()) else {
                    tracing::warn!("Seats reserved after the session was discarded");
                    return SmallVec::new();
                };

                state.session.set_booking_data(BookingPatch {
                    booking_response: Some(response),
                    ..BookingPatch::default()
                });
                state.session.set_step(BookingStep::Payment);
                state.route = Route::Payment { movie_id };

                tracing::info!("Seats reserved, moving to payment");
                SmallVec::new()
            },

            SeatAction::ReservationFailed(error) => {
                state.seats.submitting = false;
                tracing::warn!(%error, "Seat reservation failed");

                match error {
                    ApiError::Conflict(message) => {
                        state.notify(Notice::error(message));
                        // Show the seats that were taken so the user can pick others
                        match Self::slot_id(state) {
                            Some(slot_id) if state.seats.mounted => {
                                smallvec![Self::fetch_layout(state, env, slot_id)]
                            },
                            _ => SmallVec::new(),
                        }
                    },
                    ApiError::Unauthorized => {
                        state.notify(Notice::error("Your session has expired. Please login again"));
                        SmallVec::new()
                    },
                    _ => {
                        state.notify(Notice::error("Failed to reserve seats. Please try again"));
                        SmallVec::new()
                    },
                }
            },
        }
    }
}

impl From<SeatAction> for BookingAction {
    fn from(action: SeatAction) -> Self {
        Self::Seats(action)
    }
}
