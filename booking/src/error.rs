//! Error types for the booking flow

use thiserror::Error;

/// Errors returned by the booking backend
///
/// Cloneable so failures can travel inside actions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Seat lock lost to another session (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing or expired credentials (401)
    #[error("Unauthorized")]
    Unauthorized,

    /// Authenticated but not allowed (403)
    #[error("Forbidden")]
    Forbidden,

    /// Request rejected by server-side validation (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Server failure (5xx)
    #[error("Server error (status {status}): {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Error message from the server
        message: String,
    },

    /// Any other non-success status
    #[error("Unexpected status {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Error message from the server
        message: String,
    },

    /// The request never got a response
    #[error("Network error: {0}")]
    Network(String),

    /// The response body was not what we expected
    #[error("Response parsing failed: {0}")]
    Decode(String),
}

impl ApiError {
    /// Classify a non-success status with the server's message
    #[must_use]
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            400 => Self::BadRequest(message),
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            409 => Self::Conflict(message),
            500..=599 => Self::Server { status, message },
            _ => Self::Status { status, message },
        }
    }

    /// HTTP status behind this error, if there was a response
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Conflict(_) => Some(409),
            Self::Unauthorized => Some(401),
            Self::Forbidden => Some(403),
            Self::BadRequest(_) => Some(400),
            Self::Server { status, .. } | Self::Status { status, .. } => Some(*status),
            Self::Network(_) | Self::Decode(_) => None,
        }
    }
}

/// Payment form validation failures
///
/// The `Display` text is what the user sees next to the form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Card number is not 16 digits
    #[error("Please enter a valid 16-digit card number")]
    InvalidCardNumber,

    /// Expiry is not `MM/YY` or the month is out of range
    #[error("Please enter a valid expiry date (MM/YY)")]
    InvalidExpiry,

    /// Expiry is before the current month
    #[error("Card has expired")]
    CardExpired,

    /// CVV shorter than three digits
    #[error("Please enter a valid CVV")]
    InvalidCvv,

    /// Cardholder name is blank
    #[error("Please enter the cardholder name")]
    MissingCardHolder,

    /// UPI id without `@`
    #[error("Please enter a valid UPI ID")]
    InvalidUpiId,

    /// UPI is disabled in this build
    #[error("UPI payments are not available yet. Please pay by card")]
    UpiUnavailable,
}

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed
    #[error("Invalid value for {name}: {value}")]
    InvalidValue {
        /// Variable name
        name: &'static str,
        /// Raw value
        value: String,
    },

    /// A value parsed but is outside the accepted range
    #[error("{name} must be {requirement}")]
    OutOfRange {
        /// Variable name
        name: &'static str,
        /// Human-readable constraint
        requirement: &'static str,
    },
}
