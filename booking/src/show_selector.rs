//! Show selector: resolves a movie's slots into a date → theater → time picker
//! and commits the chosen showing to the session.

use crate::api::ApiResult;
use crate::flow::{BookingAction, BookingFlowEnvironment, BookingFlowState};
use crate::types::{BookingPatch, BookingStep, Movie, MovieId, Notice, Route, ShowDate, Slot, SlotId};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime};
use cinebook_core::effect::Effect;
use cinebook_core::reducer::Reducer;
use cinebook_core::{smallvec, SmallVec};
use std::collections::BTreeMap;
use std::fmt;

/// Theater name shown for slots that carry none
pub const DEFAULT_THEATER_NAME: &str = "Cinema Name";

/// Half of the 12-hour clock
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Meridiem {
    /// Before noon
    Am,
    /// Noon onwards
    Pm,
}

impl fmt::Display for Meridiem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Am => "AM",
            Self::Pm => "PM",
        })
    }
}

/// One bookable showtime
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Showtime {
    /// `"hh : mm"`
    pub display_time: String,
    /// AM/PM
    pub meridiem: Meridiem,
    /// Slot to book
    pub slot_id: SlotId,
    /// The raw slot record
    pub slot: Slot,
    minutes: u32,
}

impl Showtime {
    /// Full label, e.g. `"07 : 30 PM"`
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.display_time, self.meridiem)
    }

    /// Minutes since midnight of the 24-hour start time
    #[must_use]
    pub const fn minutes(&self) -> u32 {
        self.minutes
    }
}

/// Showtimes of one theater on one date
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TheaterShowtimes {
    /// Theater name
    pub theater_name: String,
    /// Theater location (from the first slot seen)
    pub location: String,
    /// Showtimes, ascending by time of day
    pub showtimes: Vec<Showtime>,
}

// ============================================================================
// Slot resolution
// ============================================================================

fn parse_hour_minute(start_time: &str) -> Option<(u32, u32)> {
    let mut parts = start_time.trim().split(':');
    let hour: u32 = parts.next()?.trim().parse().ok()?;
    let minute: u32 = parts.next()?.trim().parse().ok()?;
    (hour < 24 && minute < 60).then_some((hour, minute))
}

/// Convert a 24-hour `"HH:MM"` start time to a 12-hour display time
///
/// Hours above 12 are shifted down by 12 and everything from 12:00 is PM, so
/// noon reads `"12 : mm PM"` and midnight reads `"00 : mm AM"`.
#[must_use]
pub fn format_show_time(start_time: &str) -> Option<(String, Meridiem)> {
    let (hour, minute) = parse_hour_minute(start_time)?;
    let display_hour = if hour > 12 { hour - 12 } else { hour };
    let meridiem = if hour >= 12 { Meridiem::Pm } else { Meridiem::Am };
    Some((format!("{display_hour:02} : {minute:02}"), meridiem))
}

/// Calendar date of a slot's `show_date` (`YYYY-MM-DD` or RFC 3339)
#[must_use]
pub fn parse_show_date(show_date: &str) -> Option<NaiveDate> {
    let show_date = show_date.trim();
    NaiveDate::parse_from_str(show_date, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(show_date).ok().map(|dt| dt.date_naive()))
}

/// Display descriptor of a calendar date
#[must_use]
pub fn show_date(date: NaiveDate) -> ShowDate {
    ShowDate {
        day: date.day(),
        month_name: date.format("%b").to_string(),
        day_name: date.format("%a").to_string(),
        iso_date: date.format("%Y-%m-%d").to_string(),
        sort_key: date.and_time(NaiveTime::MIN).and_utc().timestamp(),
    }
}

/// Unique show dates of `slots`, ascending
#[must_use]
pub fn extract_dates(slots: &[Slot]) -> Vec<ShowDate> {
    let mut dates = BTreeMap::new();
    for slot in slots {
        match parse_show_date(&slot.show_date) {
            Some(date) => {
                dates.entry(date).or_insert_with(|| show_date(date));
            },
            None => tracing::debug!(slot_id = %slot.slot_id, show_date = %slot.show_date, "Skipping slot with unparseable date"),
        }
    }
    dates.into_values().collect()
}

/// Showtimes on `iso_date`, grouped by theater in first-seen order
#[must_use]
pub fn group_showtimes(slots: &[Slot], iso_date: &str) -> Vec<TheaterShowtimes> {
    let Ok(wanted) = NaiveDate::parse_from_str(iso_date, "%Y-%m-%d") else {
        return Vec::new();
    };

    let mut theaters: Vec<TheaterShowtimes> = Vec::new();
    for slot in slots.iter().filter(|slot| parse_show_date(&slot.show_date) == Some(wanted)) {
        let Some((hour, minute)) = parse_hour_minute(&slot.start_time) else {
            tracing::debug!(slot_id = %slot.slot_id, start_time = %slot.start_time, "Skipping slot with unparseable time");
            continue;
        };
        let Some((display_time, meridiem)) = format_show_time(&slot.start_time) else {
            continue;
        };

        let name = match slot.theater_name.trim() {
            "" => DEFAULT_THEATER_NAME,
            name => name,
        };

        let showtime = Showtime {
            display_time,
            meridiem,
            slot_id: slot.slot_id,
            slot: slot.clone(),
            minutes: hour * 60 + minute,
        };

        match theaters.iter_mut().find(|t| t.theater_name == name) {
            Some(theater) => theater.showtimes.push(showtime),
            None => theaters.push(TheaterShowtimes {
                theater_name: name.to_string(),
                location: slot.location.clone(),
                showtimes: vec![showtime],
            }),
        }
    }

    for theater in &mut theaters {
        theater.showtimes.sort_by_key(Showtime::minutes);
    }
    theaters
}

// ============================================================================
// State and actions
// ============================================================================

/// Picker state for the movie being browsed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShowSelectorState {
    /// Movie being browsed
    pub movie: Option<Movie>,
    /// Available dates, ascending
    pub dates: Vec<ShowDate>,
    /// Selected ISO date
    pub selected_date: Option<String>,
    /// Showtimes for the selected date
    pub theaters: Vec<TheaterShowtimes>,
    /// Selected showtime
    pub selected_slot: Option<SlotId>,
    /// A movie fetch is in flight
    pub loading: bool,
}

impl ShowSelectorState {
    fn refresh_showtimes(&mut self) {
        self.theaters = match (&self.movie, &self.selected_date) {
            (Some(movie), Some(date)) => group_showtimes(&movie.slots, date),
            _ => Vec::new(),
        };
    }

    fn find_showtime(&self, slot_id: SlotId) -> Option<&Showtime> {
        self.theaters
            .iter()
            .flat_map(|theater| &theater.showtimes)
            .find(|showtime| showtime.slot_id == slot_id)
    }
}

/// Show selector input
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShowAction {
    /// Fetch a movie and open its detail page
    LoadMovie(MovieId),
    /// A movie (with slots) is available
    MovieLoaded(Movie),
    /// The movie fetch failed
    MovieLoadFailed(crate::error::ApiError),
    /// The user picked a date (ISO)
    DateSelected(String),
    /// The user picked a showtime
    TimeSelected {
        /// Slot of the chosen showtime
        slot_id: SlotId,
    },
}

/// Reducer for the show selector
#[derive(Clone, Copy, Debug, Default)]
pub struct ShowSelectorReducer;

impl Reducer for ShowSelectorReducer {
    type State = BookingFlowState;
    type Action = ShowAction;
    type Environment = BookingFlowEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            ShowAction::LoadMovie(movie_id) => {
                state.show.loading = true;
                state.route = Route::MovieDetail { movie_id: movie_id.clone() };

                let api = env.api.clone();
                smallvec![Effect::Future(Box::pin(async move {
                    let result: ApiResult<Movie> = api.fetch_movie(&movie_id).await;
                    Some(match result {
                        Ok(movie) => ShowAction::MovieLoaded(movie),
                        Err(error) => ShowAction::MovieLoadFailed(error),
                    })
                }))]
            },

            ShowAction::MovieLoaded(movie) => {
                let show = &mut state.show;
                let same_movie = show.movie.as_ref().is_some_and(|m| m.id == movie.id);
                if !same_movie {
                    show.selected_date = None;
                    show.selected_slot = None;
                }

                show.loading = false;
                show.dates = extract_dates(&movie.slots);
                state.route = Route::MovieDetail { movie_id: movie.id.clone() };
                show.movie = Some(movie);

                let still_listed = show
                    .selected_date
                    .as_ref()
                    .is_some_and(|iso| show.dates.iter().any(|d| &d.iso_date == iso));
                if !still_listed {
                    show.selected_date = show.dates.first().map(|d| d.iso_date.clone());
                    show.selected_slot = None;
                }
                show.refresh_showtimes();

                tracing::debug!(dates = show.dates.len(), "Movie loaded into show selector");
                SmallVec::new()
            },

            ShowAction::MovieLoadFailed(error) => {
                tracing::warn!(%error, "Failed to load movie");
                state.show.loading = false;
                state.notify(Notice::error("Failed to load movie details. Please try again"));
                SmallVec::new()
            },

            ShowAction::DateSelected(iso_date) => {
                let show = &mut state.show;
                if !show.dates.iter().any(|d| d.iso_date == iso_date) {
                    tracing::warn!(%iso_date, "Ignoring selection of an unavailable date");
                    return SmallVec::new();
                }

                show.selected_date = Some(iso_date);
                show.selected_slot = None;
                show.refresh_showtimes();
                SmallVec::new()
            },

            ShowAction::TimeSelected { slot_id } => {
                let (Some(movie), Some(showtime)) = (state.show.movie.clone(), state.show.find_showtime(slot_id).cloned())
                else {
                    tracing::warn!(%slot_id, "Ignoring selection of an unknown showtime");
                    return SmallVec::new();
                };
                let Some(date) = parse_show_date(&showtime.slot.show_date) else {
                    return SmallVec::new();
                };

                state.show.selected_slot = Some(slot_id);
                let movie_id = movie.id.clone();
                state.session.set_booking_data(BookingPatch {
                    movie: Some(movie),
                    selected_date: Some(show_date(date)),
                    selected_time_with_am_pm: Some(showtime.label()),
                    selected_cinema: Some(showtime.slot),
                    booking_response: None,
                });
                state.session.set_step(BookingStep::SeatSelection);
                state.route = Route::SeatSelection { movie_id };

                tracing::info!(%slot_id, "Showtime selected");
                SmallVec::new()
            },
        }
    }
}

impl From<ShowAction> for BookingAction {
    fn from(action: ShowAction) -> Self {
        Self::Show(action)
    }
}
