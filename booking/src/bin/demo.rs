//! Booking Flow Demo
//!
//! Walks one booking through show selection, seat selection, payment and
//! confirmation using the same store the UI shell drives.
//!
//! # Usage
//!
//! ```bash
//! # Offline, against a scripted backend
//! cargo run --bin booking-demo
//!
//! # Against a running backend
//! CINEBOOK_API_URL=http://localhost:8080 CINEBOOK_API_TOKEN=... cargo run --bin booking-demo -- <movie-id>
//! ```

use anyhow::Context;
use cinebook::api::{BookingApi, HttpBookingApi, MockBookingApi, StaticToken};
use cinebook::guard::NoopPageGuard;
use cinebook::payment::{PaymentAction, PaymentPhase};
use cinebook::seat_selector::SeatAction;
use cinebook::show_selector::ShowAction;
use cinebook::storage::FileStorage;
use cinebook::types::{
    BookingConfirmation, BookingResponse, Money, Movie, MovieId, Seat, SeatStatus, Slot, SlotId,
};
use cinebook::validation::{CardDetails, PaymentForm};
use cinebook::{booking_store, BookingAction, BookingFlowEnvironment, Config, FlowSettings};
use cinebook_core::environment::SystemClock;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const WAIT: Duration = Duration::from_secs(10);

fn offline_backend(movie_id: &MovieId) -> MockBookingApi {
    let slot = |id, date: &str, time: &str, theater: &str| Slot {
        slot_id: SlotId::new(id),
        show_date: date.to_string(),
        start_time: time.to_string(),
        theater_name: theater.to_string(),
        location: "MG Road".to_string(),
    };

    let movie = Movie {
        id: movie_id.clone(),
        title: "Interstellar".to_string(),
        thumbnail: None,
        duration_minutes: Some(169),
        slots: vec![
            slot(1, "2025-01-14", "13:15", "PVR Forum"),
            slot(2, "2025-01-14", "19:30", "PVR Forum"),
            slot(3, "2025-01-15", "21:00", "INOX Garuda"),
        ],
    };

    let seats = ["A1", "A2", "A3", "A4", "B1", "B2", "B3", "B4", "B5", "B6"]
        .iter()
        .map(|number| Seat {
            status: if *number == "A1" { SeatStatus::Booked } else { SeatStatus::Available },
            ..Seat::available(*number, Money::from_major(200))
        })
        .collect();

    let api = MockBookingApi::new()
        .with_movie(movie)
        .with_seats(seats)
        .with_latency(Duration::from_millis(50));
    api.push_reservation(Ok(BookingResponse {
        slot_id: Some(SlotId::new(1)),
        seat_numbers: vec!["A2".to_string(), "A3".to_string()],
        ticket_fee: Money::from_major(400),
        convenience_fee: Money::from_major(40),
    }));
    api.push_payment(Ok(BookingConfirmation {
        booking_id: Some("BK-1001".to_string()),
        status: Some("CONFIRMED".to_string()),
        message: None,
    }));
    api
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cinebook=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let movie_id = MovieId::new(std::env::args().nth(1).unwrap_or_else(|| "1".to_string()));

    let auth = Arc::new(match &config.api_token {
        Some(token) => StaticToken::new(token.clone()),
        None if config.api_url.is_none() => StaticToken::new("offline"),
        None => StaticToken::anonymous(),
    });

    let api: Arc<dyn BookingApi> = match &config.api_url {
        Some(url) => Arc::new(HttpBookingApi::new(url.clone(), auth.clone(), config.http_timeout)?),
        None => {
            tracing::info!("CINEBOOK_API_URL not set, using the offline backend");
            Arc::new(offline_backend(&movie_id))
        },
    };

    let storage = FileStorage::open(&config.storage_path)
        .with_context(|| format!("opening {}", config.storage_path.display()))?;

    let store = booking_store(BookingFlowEnvironment {
        api,
        clock: Arc::new(SystemClock),
        storage: Arc::new(storage),
        auth,
        page_guard: Arc::new(NoopPageGuard),
        settings: FlowSettings::from(&config),
    });

    // ========== Show selection ==========

    store
        .send_and_wait_for(
            BookingAction::Show(ShowAction::LoadMovie(movie_id)),
            |a| matches!(a, BookingAction::Show(ShowAction::MovieLoaded(_) | ShowAction::MovieLoadFailed(_))),
            WAIT,
        )
        .await?;

    let (title, first_date) = store
        .state(|s| {
            (
                s.show.movie.as_ref().map(|m| m.title.clone()),
                s.show.dates.first().map(|d| d.iso_date.clone()),
            )
        })
        .await;
    let title = title.context("movie could not be loaded")?;
    let date = first_date.context("movie has no showtimes")?;
    println!("🎬 {title}");

    store.send(BookingAction::Show(ShowAction::DateSelected(date.clone()))).await?;
    let showtime = store
        .state(|s| s.show.theaters.first().and_then(|t| t.showtimes.first().cloned()))
        .await
        .context("no showtimes on the first date")?;
    println!("   {date} {} at {}", showtime.label(), showtime.slot.theater_name);

    store
        .send(BookingAction::Show(ShowAction::TimeSelected { slot_id: showtime.slot_id }))
        .await?;

    // ========== Seat selection ==========

    store
        .send_and_wait_for(
            BookingAction::Seats(SeatAction::Mounted),
            |a| matches!(a, BookingAction::Seats(SeatAction::LayoutLoaded { .. } | SeatAction::LayoutFailed { .. })),
            WAIT,
        )
        .await?;

    let free: Vec<String> = store
        .state(|s| {
            s.seats
                .seats
                .iter()
                .filter(|seat| !seat.is_booked())
                .take(2)
                .map(|seat| seat.seat_number.clone())
                .collect()
        })
        .await;
    anyhow::ensure!(!free.is_empty(), "no free seats left");

    for seat in &free {
        store.send(BookingAction::Seats(SeatAction::SeatClicked(seat.clone()))).await?;
    }
    let total = store
        .state(|s| s.session.booking().map(|b| b.total_amount).unwrap_or_default())
        .await;
    println!("💺 {} for {total}", free.join(", "));

    store
        .send_and_wait_for(
            BookingAction::Seats(SeatAction::ConfirmSeats),
            |a| matches!(a, BookingAction::Seats(SeatAction::SeatsReserved(_) | SeatAction::ReservationFailed(_))),
            WAIT,
        )
        .await?;
    store.send(BookingAction::Seats(SeatAction::Unmounted)).await?;

    // ========== Payment ==========

    store.send(BookingAction::Payment(PaymentAction::Mounted)).await?;
    let (phase, price) = store.state(|s| (s.payment.phase, s.price_breakdown())).await;
    anyhow::ensure!(phase == PaymentPhase::FormEntry, "payment window did not open ({phase:?})");
    if let Some(price) = price {
        println!("💳 {} (taxes {})", price.final_total, price.taxes);
    }

    let form = PaymentForm::Card(CardDetails {
        card_number: "4111 1111 1111 1111".to_string(),
        card_holder_name: "Demo User".to_string(),
        expiry_date: "12/30".to_string(),
        cvv: "123".to_string(),
    });
    store
        .send_and_wait_for(
            BookingAction::Payment(PaymentAction::Submit(form)),
            |a| {
                matches!(
                    a,
                    BookingAction::Payment(PaymentAction::PaymentSucceeded(_) | PaymentAction::PaymentFailed(_))
                )
            },
            WAIT,
        )
        .await?;

    let (confirmation, notice) = store
        .state(|s| (s.payment.confirmation.clone(), s.notice.clone()))
        .await;
    match confirmation {
        Some(snapshot) => println!(
            "✅ Booking {} confirmed: {} seats, {}",
            snapshot.booking_id.as_deref().unwrap_or("-"),
            snapshot.selected_seats.len(),
            snapshot.total_amount
        ),
        None => println!("❌ {}", notice.map(|n| n.message).unwrap_or_default()),
    }

    store.send(BookingAction::Payment(PaymentAction::GoHome)).await?;
    store.shutdown_default().await?;
    Ok(())
}
