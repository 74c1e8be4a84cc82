//! Domain types for the booking flow.
//!
//! Value objects, backend records and the persisted booking session. Wire and
//! storage formats use camelCase JSON, matching the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of a movie
///
/// The backend sends either a string or a number; both are kept as text.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MovieId(String);

impl MovieId {
    /// Create a movie id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for MovieId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => Self(text),
            Raw::Number(number) => Self(number.to_string()),
        })
    }
}

impl fmt::Display for MovieId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a show slot (a date/time/theater showing)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(u64);

impl SlotId {
    /// Create a slot id
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Numeric value
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Money Value Object (minor units to avoid floating point errors)
// ============================================================================

/// Money amount in minor units (paise)
///
/// On the wire amounts are plain decimal numbers of whole rupees (`200`, `40.5`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(u64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from minor units
    #[must_use]
    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// Creates a `Money` value from whole rupees, saturating on overflow
    #[must_use]
    pub const fn from_major(major: u64) -> Self {
        Self(major.saturating_mul(100))
    }

    /// Returns the amount in minor units
    #[must_use]
    pub const fn minor(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts, saturating on overflow
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Takes `percent`% of this amount, rounding half up to the nearest minor unit
    #[must_use]
    pub const fn percent(self, percent: u64) -> Self {
        Self(self.0.saturating_mul(percent).saturating_add(50) / 100)
    }

    /// The amount as a decimal number of whole units
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // amounts stay far below 2^52 minor units
    pub fn as_major_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Convert a decimal number of whole units, rounding to the nearest minor unit
    ///
    /// Negative and non-finite inputs map to zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_major_f64(value: f64) -> Self {
        if !value.is_finite() || value <= 0.0 {
            return Self::ZERO;
        }
        Self((value * 100.0).round() as u64)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::saturating_add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (major, minor) = (self.0 / 100, self.0 % 100);
        if minor == 0 {
            write!(f, "₹{major}")
        } else {
            write!(f, "₹{major}.{minor:02}")
        }
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0 % 100 == 0 {
            serializer.serialize_u64(self.0 / 100)
        } else {
            serializer.serialize_f64(self.as_major_f64())
        }
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Ok(Self::from_major_f64(value))
    }
}

// ============================================================================
// Backend records
// ============================================================================

/// A specific (date, time, theater) showing of a movie
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    /// Slot identifier
    pub slot_id: SlotId,
    /// Show date, `YYYY-MM-DD` or an RFC 3339 timestamp
    pub show_date: String,
    /// 24-hour start time, `HH:MM`
    pub start_time: String,
    /// Theater name (may be empty)
    #[serde(default)]
    pub theater_name: String,
    /// Theater location
    #[serde(default)]
    pub location: String,
}

/// A movie with the slots it is showing in
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    /// Movie identifier
    pub id: MovieId,
    /// Title
    pub title: String,
    /// Poster thumbnail URL
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Running time in minutes
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    /// Show slots
    #[serde(default)]
    pub slots: Vec<Slot>,
}

/// Availability of a seat as reported by the backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    /// Free to select
    #[default]
    Available,
    /// Sold or held by another session
    Booked,
    /// Any status this client does not know; treated as available
    #[serde(other)]
    Unknown,
}

/// A seat in a slot's layout
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    /// Seat label, row letter followed by a number (`"A12"`)
    pub seat_number: String,
    /// Ticket price
    pub price: Money,
    /// Availability
    #[serde(default)]
    pub status: SeatStatus,
    /// Alternate "booked" signal: the seat is locked by another session
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub locked_by_session: bool,
}

impl Seat {
    /// Create an available seat
    #[must_use]
    pub fn available(seat_number: impl Into<String>, price: Money) -> Self {
        Self {
            seat_number: seat_number.into(),
            price,
            status: SeatStatus::Available,
            locked_by_session: false,
        }
    }

    /// Returns true if the seat cannot be selected
    #[must_use]
    pub fn is_booked(&self) -> bool {
        self.status == SeatStatus::Booked || self.locked_by_session
    }

    /// Row key: the leading character of the seat number
    #[must_use]
    pub fn row(&self) -> Option<char> {
        self.seat_number.chars().next()
    }

    /// Numeric suffix after the row character (0 if absent)
    #[must_use]
    pub fn position(&self) -> u32 {
        self.seat_number
            .chars()
            .skip(1)
            .filter(char::is_ascii_digit)
            .collect::<String>()
            .parse()
            .unwrap_or(0)
    }
}

/// Server-issued provisional booking returned after seat submission
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    /// Slot the seats were locked in
    #[serde(default)]
    pub slot_id: Option<SlotId>,
    /// Locked seat numbers
    #[serde(default)]
    pub seat_numbers: Vec<String>,
    /// Ticket total for the locked seats
    #[serde(default)]
    pub ticket_fee: Money,
    /// Backend-computed surcharge
    #[serde(default)]
    pub convenience_fee: Money,
}

/// Confirmation returned by the payment endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfirmation {
    /// Booking identifier, if the backend issues one
    #[serde(default, alias = "id")]
    pub booking_id: Option<String>,
    /// Booking status text
    #[serde(default)]
    pub status: Option<String>,
    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,
}

// ============================================================================
// Booking session
// ============================================================================

/// Calendar date descriptor derived from a slot's show date
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowDate {
    /// Day of month
    pub day: u32,
    /// Short month name (`"Jan"`)
    pub month_name: String,
    /// Short weekday name (`"Tue"`)
    pub day_name: String,
    /// ISO date (`"2025-01-14"`)
    pub iso_date: String,
    /// Sortable timestamp (UTC midnight, epoch seconds)
    pub sort_key: i64,
}

/// Step of the booking flow
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BookingStep {
    /// Picking movie, date and showtime
    #[default]
    MovieSelection,
    /// Picking seats
    SeatSelection,
    /// Paying
    Payment,
    /// Booking confirmed
    Confirmation,
}

/// The in-progress booking attempt
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingSession {
    /// Movie being booked
    #[serde(default)]
    pub movie: Option<Movie>,
    /// Selected show date
    #[serde(default, rename = "selectedDateObj")]
    pub selected_date: Option<ShowDate>,
    /// Selected show time, e.g. `"07 : 30 PM"`
    #[serde(default)]
    pub selected_time_with_am_pm: Option<String>,
    /// Selected slot
    #[serde(default)]
    pub selected_cinema: Option<Slot>,
    /// Selected seats, unique by seat number
    #[serde(default)]
    pub selected_seats: Vec<Seat>,
    /// Provisional booking for the submitted seat set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_response: Option<BookingResponse>,
    /// Sum of selected seat prices
    #[serde(default)]
    pub total_amount: Money,
}

impl BookingSession {
    /// Returns true once movie, date, time and cinema are all chosen
    #[must_use]
    pub const fn show_chosen(&self) -> bool {
        self.movie.is_some()
            && self.selected_date.is_some()
            && self.selected_time_with_am_pm.is_some()
            && self.selected_cinema.is_some()
    }

    /// Movie id of the session, if a movie is set
    #[must_use]
    pub fn movie_id(&self) -> Option<&MovieId> {
        self.movie.as_ref().map(|movie| &movie.id)
    }
}

/// Partial update merged into the booking session
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BookingPatch {
    /// New movie
    pub movie: Option<Movie>,
    /// New show date
    pub selected_date: Option<ShowDate>,
    /// New show time
    pub selected_time_with_am_pm: Option<String>,
    /// New slot
    pub selected_cinema: Option<Slot>,
    /// Provisional booking
    pub booking_response: Option<BookingResponse>,
}

/// Payment window start marker
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTimer {
    /// When the window opened (epoch seconds)
    pub start_epoch_seconds: i64,
    /// Window length
    pub duration_seconds: u64,
}

impl PaymentTimer {
    /// Open a window at `now`
    #[must_use]
    pub fn started_at(now: DateTime<Utc>, duration_seconds: u64) -> Self {
        Self {
            start_epoch_seconds: now.timestamp(),
            duration_seconds,
        }
    }

    /// Seconds left at `now`: `max(0, duration - elapsed)`
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> u64 {
        let elapsed = u64::try_from(now.timestamp() - self.start_epoch_seconds).unwrap_or(0);
        self.duration_seconds.saturating_sub(elapsed)
    }
}

// ============================================================================
// Shell-facing state
// ============================================================================

/// Where the shell should be showing the user
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "page", rename_all = "kebab-case")]
pub enum Route {
    /// Landing page
    #[default]
    Home,
    /// Movie list
    Movies,
    /// A movie's detail page (show selection)
    MovieDetail {
        /// Movie
        movie_id: MovieId,
    },
    /// Seat selection for a movie
    SeatSelection {
        /// Movie
        movie_id: MovieId,
    },
    /// Payment for a movie
    Payment {
        /// Movie
        movie_id: MovieId,
    },
    /// Login prompt
    Login,
    /// The user's bookings
    Bookings,
}

impl Route {
    /// URL path for this route
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Home => "/".to_string(),
            Self::Movies => "/movies".to_string(),
            Self::MovieDetail { movie_id } => format!("/movies/{movie_id}"),
            Self::SeatSelection { movie_id } => format!("/movies/{movie_id}/seat-selection"),
            Self::Payment { movie_id } => format!("/movies/{movie_id}/payment"),
            Self::Login => "/login".to_string(),
            Self::Bookings => "/bookings".to_string(),
        }
    }
}

/// Severity of a transient notification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    /// Informational
    Info,
    /// Completed successfully
    Success,
    /// Recoverable problem
    Warning,
    /// Failure
    Error,
}

/// A transient notification for the user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Severity
    pub level: NoticeLevel,
    /// Message text
    pub message: String,
}

impl Notice {
    /// Informational notice
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, message: message.into() }
    }

    /// Success notice
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, message: message.into() }
    }

    /// Warning notice
    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Warning, message: message.into() }
    }

    /// Error notice
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, message: message.into() }
    }
}

/// What the confirmation screen shows, kept apart from the live session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationSnapshot {
    /// Movie
    pub movie: Movie,
    /// Show date
    pub selected_date: Option<ShowDate>,
    /// Show time
    pub selected_time_with_am_pm: Option<String>,
    /// Slot
    pub selected_cinema: Option<Slot>,
    /// Seats
    pub selected_seats: Vec<Seat>,
    /// Amount charged
    pub total_amount: Money,
    /// Backend booking id
    pub booking_id: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn money_wire_format_uses_whole_units() {
        let json = serde_json::to_string(&Money::from_major(440)).unwrap();
        assert_eq!(json, "440");

        let parsed: Money = serde_json::from_str("40.5").unwrap();
        assert_eq!(parsed, Money::from_minor(4050));
        assert_eq!(parsed.to_string(), "₹40.50");
    }

    #[test]
    fn money_percent_rounds_half_up() {
        assert_eq!(Money::from_major(400).percent(7), Money::from_major(28));
        assert_eq!(Money::from_major(28).percent(18), Money::from_minor(504));
        assert_eq!(Money::from_minor(5).percent(10), Money::from_minor(1));
    }

    #[test]
    fn seat_decodes_locked_flag_and_unknown_status() {
        let seat: Seat =
            serde_json::from_str(r#"{"seatNumber":"B7","price":180,"status":"held","lockedBySession":true}"#).unwrap();
        assert_eq!(seat.status, SeatStatus::Unknown);
        assert!(seat.is_booked());
        assert_eq!(seat.row(), Some('B'));
        assert_eq!(seat.position(), 7);
    }

    #[test]
    fn movie_id_accepts_numbers() {
        let movie: Movie = serde_json::from_str(r#"{"id":7,"title":"Dune"}"#).unwrap();
        assert_eq!(movie.id, MovieId::new("7"));
        assert!(movie.slots.is_empty());
    }

    #[test]
    fn booking_step_uses_kebab_case() {
        assert_eq!(serde_json::to_string(&BookingStep::SeatSelection).unwrap(), "\"seat-selection\"");
    }

    #[test]
    fn timer_remaining_is_clamped() {
        let start = DateTime::parse_from_rfc3339("2025-01-14T19:00:00Z").unwrap().with_timezone(&Utc);
        let timer = PaymentTimer::started_at(start, 600);
        assert_eq!(timer.remaining_at(start), 600);
        assert_eq!(timer.remaining_at(start + chrono::Duration::seconds(599)), 1);
        assert_eq!(timer.remaining_at(start + chrono::Duration::seconds(900)), 0);
        assert_eq!(timer.remaining_at(start - chrono::Duration::seconds(5)), 600);
    }

    #[test]
    fn route_paths() {
        let movie_id = MovieId::new("m1");
        assert_eq!(Route::SeatSelection { movie_id }.path(), "/movies/m1/seat-selection");
        assert_eq!(Route::Movies.path(), "/movies");
    }
}
