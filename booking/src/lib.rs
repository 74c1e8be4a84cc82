//! # Cinebook
//!
//! Client-side booking flow for a movie ticketing service.
//!
//! A booking moves through four pages: show selection, seat selection, a
//! time-boxed payment window and a confirmation. Each page is a reducer over the
//! shared [`BookingFlowState`]; [`BookingFlowReducer`] composes them and the
//! session they build up survives restarts through a [`KeyValueStorage`].
//!
//! ## Example
//!
//! ```no_run
//! use cinebook::{booking_store, BookingAction, BookingFlowEnvironment, Config, FlowSettings};
//! use cinebook::api::{HttpBookingApi, StaticToken};
//! use cinebook::guard::NoopPageGuard;
//! use cinebook::show_selector::ShowAction;
//! use cinebook::storage::FileStorage;
//! use cinebook::types::MovieId;
//! use cinebook_core::environment::SystemClock;
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let auth = Arc::new(StaticToken::new("token"));
//! let api = HttpBookingApi::new("http://localhost:8080", auth.clone(), config.http_timeout)?;
//!
//! let store = booking_store(BookingFlowEnvironment {
//!     api: Arc::new(api),
//!     clock: Arc::new(SystemClock),
//!     storage: Arc::new(FileStorage::open(&config.storage_path)?),
//!     auth,
//!     page_guard: Arc::new(NoopPageGuard),
//!     settings: FlowSettings::from(&config),
//! });
//!
//! store.send(BookingAction::Show(ShowAction::LoadMovie(MovieId::new("m1")))).await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`KeyValueStorage`]: cinebook_core::environment::KeyValueStorage

pub mod api;
pub mod config;
pub mod error;
pub mod flow;
pub mod guard;
pub mod payment;
pub mod seat_selector;
pub mod session;
pub mod show_selector;
pub mod storage;
pub mod types;
pub mod validation;

pub use config::Config;
pub use error::{ApiError, ConfigError, ValidationError};
pub use flow::{
    booking_store, BookingAction, BookingFlowEnvironment, BookingFlowReducer, BookingFlowState,
    BookingFlowStore, FlowSettings,
};
