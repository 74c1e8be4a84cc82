//! Booking backend client.
//!
//! [`BookingApi`] is the seam the reducers call through. [`HttpBookingApi`] talks
//! to the REST backend; [`MockBookingApi`] replays scripted responses for tests
//! and the offline demo.

use crate::error::ApiError;
use crate::types::{BookingConfirmation, BookingResponse, Money, Movie, MovieId, Seat, SlotId};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Result type for backend calls
pub type ApiResult<T> = Result<T, ApiError>;

/// Boxed future returned by [`BookingApi`] methods
pub type ApiFuture<T> = BoxFuture<'static, ApiResult<T>>;

/// Body of `POST /api/bookings/select-seats`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectSeatsRequest {
    /// Slot to lock seats in
    pub slot_id: SlotId,
    /// Seats to lock
    pub seat_numbers: Vec<String>,
}

/// Body of `POST /api/bookings/payment`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    /// Slot of the provisional booking
    pub slot_id: SlotId,
    /// Seats of the provisional booking
    pub seat_numbers: Vec<String>,
    /// Amount to charge (seat total plus convenience fee)
    pub total_amount: Money,
    /// Card number, digits only
    pub card_number: String,
    /// Name on the card
    pub card_holder_name: String,
    /// `MM/YY`
    pub expiry_date: String,
    /// Card verification value
    pub cvv: String,
}

impl std::fmt::Debug for PaymentRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let last_four: String = self
            .card_number
            .chars()
            .skip(self.card_number.len().saturating_sub(4))
            .collect();
        f.debug_struct("PaymentRequest")
            .field("slot_id", &self.slot_id)
            .field("seat_numbers", &self.seat_numbers)
            .field("total_amount", &self.total_amount)
            .field("card_number", &format_args!("****{last_four}"))
            .field("card_holder_name", &self.card_holder_name)
            .field("expiry_date", &self.expiry_date)
            .field("cvv", &"***")
            .finish()
    }
}

/// Booking backend
///
/// Methods return boxed futures so the trait stays object-safe and the reducers
/// can hold an `Arc<dyn BookingApi>`.
pub trait BookingApi: Send + Sync {
    /// Fetch a movie with its show slots
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on network failure or a non-success status.
    fn fetch_movie(&self, movie_id: &MovieId) -> ApiFuture<Movie>;

    /// Fetch the seat layout of a slot
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on network failure or a non-success status.
    fn fetch_seats(&self, slot_id: SlotId) -> ApiFuture<Vec<Seat>>;

    /// Lock seats and obtain a provisional booking
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Conflict`] when a seat was taken by another session.
    fn select_seats(&self, request: SelectSeatsRequest) -> ApiFuture<BookingResponse>;

    /// Pay for a provisional booking
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] carrying the server's message on rejection.
    fn submit_payment(&self, request: PaymentRequest) -> ApiFuture<BookingConfirmation>;
}

/// Source of the user's credentials
pub trait AuthProvider: Send + Sync {
    /// Bearer token of the signed-in user
    fn token(&self) -> Option<String>;

    /// Returns true if a user is signed in
    fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }
}

/// Fixed credentials
#[derive(Clone, Debug, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    /// Signed in with `token`
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    /// Not signed in
    #[must_use]
    pub const fn anonymous() -> Self {
        Self(None)
    }
}

impl AuthProvider for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

#[derive(Deserialize)]
struct SeatsEnvelope {
    #[serde(default)]
    seats: Vec<Seat>,
}

/// Extract the human-readable message from an error body
///
/// Accepts `{"message": ...}`, `{"error": ...}` or a plain-text body.
fn error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => ["message", "error"]
            .iter()
            .find_map(|key| value.get(key).and_then(serde_json::Value::as_str))
            .map(str::to_string),
        Err(_) => Some(body.to_string()),
    }
}

/// REST client for the booking backend
#[derive(Clone)]
pub struct HttpBookingApi {
    client: Client,
    base_url: String,
    auth: Arc<dyn AuthProvider>,
}

impl HttpBookingApi {
    /// Create a client for `base_url` (e.g. `http://localhost:8080`)
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        auth: Arc<dyn AuthProvider>,
        timeout: Duration,
    ) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let request = match self.auth.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ApiError::Decode(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });

        tracing::warn!(status = status.as_u16(), %message, "Backend rejected request");
        Err(ApiError::from_status(status.as_u16(), message))
    }
}

impl std::fmt::Debug for HttpBookingApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBookingApi")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl BookingApi for HttpBookingApi {
    fn fetch_movie(&self, movie_id: &MovieId) -> ApiFuture<Movie> {
        let this = self.clone();
        let url = self.url(&format!("/api/movies/{movie_id}"));
        async move { this.execute(this.client.get(url)).await }.boxed()
    }

    fn fetch_seats(&self, slot_id: SlotId) -> ApiFuture<Vec<Seat>> {
        let this = self.clone();
        let url = self.url(&format!("/api/seats/slot/{slot_id}"));
        async move {
            let envelope: SeatsEnvelope = this.execute(this.client.get(url)).await?;
            tracing::debug!(slot_id = %slot_id, seats = envelope.seats.len(), "Fetched seat layout");
            Ok(envelope.seats)
        }
        .boxed()
    }

    fn select_seats(&self, request: SelectSeatsRequest) -> ApiFuture<BookingResponse> {
        let this = self.clone();
        let url = self.url("/api/bookings/select-seats");
        async move { this.execute(this.client.post(url).json(&request)).await }.boxed()
    }

    fn submit_payment(&self, request: PaymentRequest) -> ApiFuture<BookingConfirmation> {
        let this = self.clone();
        let url = self.url("/api/bookings/payment");
        async move { this.execute(this.client.post(url).json(&request)).await }.boxed()
    }
}

// ============================================================================
// Scripted backend
// ============================================================================

/// A call received by [`MockBookingApi`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiCall {
    /// `fetch_movie`
    FetchMovie(MovieId),
    /// `fetch_seats`
    FetchSeats(SlotId),
    /// `select_seats`
    SelectSeats(SelectSeatsRequest),
    /// `submit_payment`
    SubmitPayment(PaymentRequest),
}

#[derive(Default)]
struct MockScript {
    movies: Vec<Movie>,
    seats: Option<ApiResult<Vec<Seat>>>,
    reservations: VecDeque<ApiResult<BookingResponse>>,
    payments: VecDeque<ApiResult<BookingConfirmation>>,
    latency: Duration,
    calls: Vec<ApiCall>,
}

/// Backend that replays scripted responses and records every call
///
/// Clones share the script, so a test can keep a handle to inspect calls after
/// handing one to the environment. Seat reservations and payments are answered
/// from FIFO queues; an exhausted queue answers with [`ApiError::Network`].
#[derive(Clone, Default)]
pub struct MockBookingApi {
    script: Arc<Mutex<MockScript>>,
}

impl MockBookingApi {
    /// Create an empty script
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, MockScript> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve `movie` from `fetch_movie`
    #[must_use]
    pub fn with_movie(self, movie: Movie) -> Self {
        self.script().movies.push(movie);
        self
    }

    /// Answer `fetch_seats` with `seats`
    #[must_use]
    pub fn with_seats(self, seats: Vec<Seat>) -> Self {
        self.script().seats = Some(Ok(seats));
        self
    }

    /// Answer `fetch_seats` with `error`
    #[must_use]
    pub fn with_seats_error(self, error: ApiError) -> Self {
        self.script().seats = Some(Err(error));
        self
    }

    /// Delay every answer by `latency`
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.script().latency = latency;
        self
    }

    /// Queue the next `select_seats` answer
    pub fn push_reservation(&self, result: ApiResult<BookingResponse>) {
        self.script().reservations.push_back(result);
    }

    /// Queue the next `submit_payment` answer
    pub fn push_payment(&self, result: ApiResult<BookingConfirmation>) {
        self.script().payments.push_back(result);
    }

    /// Every call received so far
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        self.script().calls.clone()
    }

    /// Number of `submit_payment` calls received so far
    #[must_use]
    pub fn payment_calls(&self) -> usize {
        self.script()
            .calls
            .iter()
            .filter(|call| matches!(call, ApiCall::SubmitPayment(_)))
            .count()
    }

    fn answer<T: Send + 'static>(&self, result: ApiResult<T>) -> ApiFuture<T> {
        let latency = self.script().latency;
        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            result
        }
        .boxed()
    }
}

fn unscripted(call: &str) -> ApiError {
    ApiError::Network(format!("no scripted response for {call}"))
}

impl BookingApi for MockBookingApi {
    fn fetch_movie(&self, movie_id: &MovieId) -> ApiFuture<Movie> {
        let result = {
            let mut script = self.script();
            script.calls.push(ApiCall::FetchMovie(movie_id.clone()));
            script
                .movies
                .iter()
                .find(|movie| &movie.id == movie_id)
                .cloned()
                .ok_or_else(|| ApiError::from_status(404, format!("Movie {movie_id} not found")))
        };
        self.answer(result)
    }

    fn fetch_seats(&self, slot_id: SlotId) -> ApiFuture<Vec<Seat>> {
        let result = {
            let mut script = self.script();
            script.calls.push(ApiCall::FetchSeats(slot_id));
            script.seats.clone().unwrap_or_else(|| Ok(Vec::new()))
        };
        self.answer(result)
    }

    fn select_seats(&self, request: SelectSeatsRequest) -> ApiFuture<BookingResponse> {
        let result = {
            let mut script = self.script();
            script.calls.push(ApiCall::SelectSeats(request));
            script
                .reservations
                .pop_front()
                .unwrap_or_else(|| Err(unscripted("select_seats")))
        };
        self.answer(result)
    }

    fn submit_payment(&self, request: PaymentRequest) -> ApiFuture<BookingConfirmation> {
        let result = {
            let mut script = self.script();
            script.calls.push(ApiCall::SubmitPayment(request));
            script
                .payments
                .pop_front()
                .unwrap_or_else(|| Err(unscripted("submit_payment")))
        };
        self.answer(result)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, auth: StaticToken) -> HttpBookingApi {
        HttpBookingApi::new(server.uri(), Arc::new(auth), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_seats_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/seats/slot/42"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "seats": [
                    { "seatNumber": "A1", "price": 200, "status": "available" },
                    { "seatNumber": "A2", "price": 200, "status": "booked" },
                    { "seatNumber": "A3", "price": 200, "lockedBySession": true }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let seats = client(&server, StaticToken::new("secret"))
            .fetch_seats(SlotId::new(42))
            .await
            .unwrap();

        assert_eq!(seats.len(), 3);
        assert_eq!(seats[0].price, Money::from_major(200));
        assert!(!seats[0].is_booked());
        assert!(seats[1].is_booked());
        assert!(seats[2].is_booked());
    }

    #[tokio::test]
    async fn test_select_seats_conflict_keeps_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/bookings/select-seats"))
            .and(body_json(json!({ "slotId": 42, "seatNumbers": ["A1", "A2"] })))
            .respond_with(
                ResponseTemplate::new(409).set_body_json(json!({ "message": "Seat A2 is no longer available" })),
            )
            .mount(&server)
            .await;

        let error = client(&server, StaticToken::new("t"))
            .select_seats(SelectSeatsRequest {
                slot_id: SlotId::new(42),
                seat_numbers: vec!["A1".into(), "A2".into()],
            })
            .await
            .unwrap_err();

        assert_eq!(error, ApiError::Conflict("Seat A2 is no longer available".into()));
    }

    #[tokio::test]
    async fn test_select_seats_decodes_provisional_booking() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/bookings/select-seats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "slotId": 42,
                "seatNumbers": ["A1", "A2"],
                "ticketFee": 400,
                "convenienceFee": 40,
                "lockExpiresAt": "2025-01-14T19:10:00Z"
            })))
            .mount(&server)
            .await;

        let response = client(&server, StaticToken::new("t"))
            .select_seats(SelectSeatsRequest {
                slot_id: SlotId::new(42),
                seat_numbers: vec!["A1".into(), "A2".into()],
            })
            .await
            .unwrap();

        assert_eq!(response.slot_id, Some(SlotId::new(42)));
        assert_eq!(response.ticket_fee, Money::from_major(400));
        assert_eq!(response.convenience_fee, Money::from_major(40));
    }

    #[tokio::test]
    async fn test_payment_error_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/bookings/payment"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "Invalid CVV" })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/bookings/payment"))
            .respond_with(ResponseTemplate::new(502).set_body_string(""))
            .mount(&server)
            .await;

        let api = client(&server, StaticToken::anonymous());
        let request = PaymentRequest {
            slot_id: SlotId::new(42),
            seat_numbers: vec!["A1".into()],
            total_amount: Money::from_major(220),
            card_number: "4111111111111111".into(),
            card_holder_name: "Asha Rao".into(),
            expiry_date: "12/30".into(),
            cvv: "12".into(),
        };

        let first = api.submit_payment(request.clone()).await.unwrap_err();
        assert_eq!(first, ApiError::BadRequest("Invalid CVV".into()));

        let second = api.submit_payment(request).await.unwrap_err();
        assert!(matches!(second, ApiError::Server { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let api = HttpBookingApi::new(
            "http://127.0.0.1:9",
            Arc::new(StaticToken::anonymous()),
            Duration::from_secs(2),
        )
        .unwrap();

        let error = api.fetch_seats(SlotId::new(1)).await.unwrap_err();
        assert!(matches!(error, ApiError::Network(_)));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"message":"Seat taken"}"#).as_deref(), Some("Seat taken"));
        assert_eq!(error_message(r#"{"error":"Invalid CVV"}"#).as_deref(), Some("Invalid CVV"));
        assert_eq!(error_message("Bad Gateway").as_deref(), Some("Bad Gateway"));
        assert_eq!(error_message("   "), None);
        assert_eq!(error_message(r#"{"code":7}"#), None);
    }

    #[test]
    fn test_payment_request_debug_masks_card() {
        let request = PaymentRequest {
            slot_id: SlotId::new(1),
            seat_numbers: vec![],
            total_amount: Money::ZERO,
            card_number: "4111111111111234".into(),
            card_holder_name: "A".into(),
            expiry_date: "01/30".into(),
            cvv: "999".into(),
        };
        let debug = format!("{request:?}");
        assert!(debug.contains("****1234"));
        assert!(!debug.contains("4111"));
        assert!(!debug.contains("999"));
    }

    #[test]
    fn test_mock_records_calls_and_drains_queue() {
        let api = MockBookingApi::new();
        api.push_reservation(Err(ApiError::Conflict("taken".into())));
        let request = SelectSeatsRequest { slot_id: SlotId::new(7), seat_numbers: vec!["B1".into()] };

        let first = tokio_test::block_on(api.select_seats(request.clone()));
        let second = tokio_test::block_on(api.select_seats(request.clone()));

        assert_eq!(first.unwrap_err(), ApiError::Conflict("taken".into()));
        assert!(matches!(second.unwrap_err(), ApiError::Network(_)));
        assert_eq!(api.calls(), vec![ApiCall::SelectSeats(request.clone()), ApiCall::SelectSeats(request)]);
    }
}
