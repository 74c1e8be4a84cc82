//! Payment form validation.

use crate::error::ValidationError;
use chrono::{DateTime, Datelike, Utc};

/// Card details as typed by the user
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CardDetails {
    /// Card number, spaces allowed
    pub card_number: String,
    /// Name on the card
    pub card_holder_name: String,
    /// `MM/YY`
    pub expiry_date: String,
    /// Card verification value
    pub cvv: String,
}

impl CardDetails {
    /// Card number with spaces removed
    #[must_use]
    pub fn digits(&self) -> String {
        self.card_number.chars().filter(|c| !c.is_whitespace()).collect()
    }
}

impl std::fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardDetails")
            .field("card_holder_name", &self.card_holder_name)
            .field("expiry_date", &self.expiry_date)
            .finish_non_exhaustive()
    }
}

/// Payment method selector
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentMethod {
    /// Credit or debit card
    Card,
    /// UPI transfer (disabled in this build)
    Upi,
}

/// A submitted payment form
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentForm {
    /// Pay by card
    Card(CardDetails),
    /// Pay by UPI
    Upi {
        /// UPI id, `name@bank`
        upi_id: String,
    },
}

impl PaymentForm {
    /// Which method the form uses
    #[must_use]
    pub const fn method(&self) -> PaymentMethod {
        match self {
            Self::Card(_) => PaymentMethod::Card,
            Self::Upi { .. } => PaymentMethod::Upi,
        }
    }
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// Parse `MM/YY` into `(year, month)`
fn parse_expiry(expiry: &str) -> Option<(i32, u32)> {
    let (month, year) = expiry.trim().split_once('/')?;
    let (month, year) = (month.trim(), year.trim());
    if month.len() != 2 || year.len() != 2 || !all_digits(month) || !all_digits(year) {
        return None;
    }

    let month: u32 = month.parse().ok()?;
    let year: i32 = year.parse().ok()?;
    (1..=12).contains(&month).then_some((2000 + year, month))
}

/// Validate card details against the current date
///
/// # Errors
///
/// Returns the first rule the details break.
pub fn validate_card(card: &CardDetails, now: DateTime<Utc>) -> Result<(), ValidationError> {
    let digits = card.digits();
    if digits.len() != 16 || !all_digits(&digits) {
        return Err(ValidationError::InvalidCardNumber);
    }

    if card.card_holder_name.trim().is_empty() {
        return Err(ValidationError::MissingCardHolder);
    }

    let (year, month) = parse_expiry(&card.expiry_date).ok_or(ValidationError::InvalidExpiry)?;
    if (year, month) < (now.year(), now.month()) {
        return Err(ValidationError::CardExpired);
    }

    let cvv = card.cvv.trim();
    if cvv.len() < 3 || !all_digits(cvv) {
        return Err(ValidationError::InvalidCvv);
    }

    Ok(())
}

/// Validate a UPI id
///
/// # Errors
///
/// Returns [`ValidationError::InvalidUpiId`] if the id has no `@`.
pub fn validate_upi(upi_id: &str) -> Result<(), ValidationError> {
    if upi_id.trim().contains('@') {
        Ok(())
    } else {
        Err(ValidationError::InvalidUpiId)
    }
}

/// Validate a payment form, returning the card to charge
///
/// A well-formed UPI form still fails with [`ValidationError::UpiUnavailable`].
///
/// # Errors
///
/// Returns the first rule the form breaks.
pub fn validate(form: &PaymentForm, now: DateTime<Utc>) -> Result<&CardDetails, ValidationError> {
    match form {
        PaymentForm::Card(card) => validate_card(card, now).map(|()| card),
        PaymentForm::Upi { upi_id } => {
            validate_upi(upi_id)?;
            Err(ValidationError::UpiUnavailable)
        },
    }
}
