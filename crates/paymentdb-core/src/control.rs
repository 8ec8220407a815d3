//! Pure transition rules of the payment control tower.
//!
//! The store crate performs the read and the write inside one transaction;
//! the decision in between lives here so it can be tested without a database.

use crate::PaymentStatus;

#[derive(Debug, Clone, Copy, thiserror::Error, Eq, PartialEq, Hash)]
pub enum ControlTowerError {
    #[error("payment is in transition")]
    PaymentInFlight,
    #[error("invoice is already paid")]
    AlreadyPaid,
    #[error("payment isn't initiated")]
    PaymentNotInitiated,
    #[error("payment is already completed")]
    PaymentAlreadyCompleted,
    #[error("payment has already failed")]
    PaymentAlreadyFailed,
    #[error("unknown payment status")]
    UnknownPaymentStatus,
}

impl ControlTowerError {
    /// Stable machine-readable code, used by the CLI output.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::PaymentInFlight => "payment_in_flight",
            Self::AlreadyPaid => "already_paid",
            Self::PaymentNotInitiated => "payment_not_initiated",
            Self::PaymentAlreadyCompleted => "payment_already_completed",
            Self::PaymentAlreadyFailed => "payment_already_failed",
            Self::UnknownPaymentStatus => "unknown_payment_status",
        }
    }
}

/// Status as found in the store. A value that does not decode is kept as
/// `Unknown` so the caller refuses to act on it instead of overwriting it.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StoredStatus {
    Known(PaymentStatus),
    Unknown,
}

impl StoredStatus {
    /// Absent status reads as Grounded.
    #[must_use]
    pub fn from_raw(raw: Option<&[u8]>) -> Self {
        match raw {
            None => Self::Known(PaymentStatus::Grounded),
            Some(bytes) => PaymentStatus::from_bytes(bytes).map_or(Self::Unknown, Self::Known),
        }
    }
}

/// Decides `ClearForTakeoff`: returns the status to write.
pub fn takeoff(current: StoredStatus) -> Result<PaymentStatus, ControlTowerError> {
    match current {
        StoredStatus::Known(PaymentStatus::Grounded | PaymentStatus::Failed) => {
            Ok(PaymentStatus::InFlight)
        }
        StoredStatus::Known(PaymentStatus::InFlight) => Err(ControlTowerError::PaymentInFlight),
        StoredStatus::Known(PaymentStatus::Succeeded) => Err(ControlTowerError::AlreadyPaid),
        StoredStatus::Unknown => Err(ControlTowerError::UnknownPaymentStatus),
    }
}

/// Precondition shared by every operation that completes or extends an
/// attempt.
pub fn ensure_in_flight(current: StoredStatus) -> Result<(), ControlTowerError> {
    match current {
        StoredStatus::Known(PaymentStatus::InFlight) => Ok(()),
        StoredStatus::Known(PaymentStatus::Grounded) => Err(ControlTowerError::PaymentNotInitiated),
        StoredStatus::Known(PaymentStatus::Succeeded) => {
            Err(ControlTowerError::PaymentAlreadyCompleted)
        }
        StoredStatus::Known(PaymentStatus::Failed) => Err(ControlTowerError::PaymentAlreadyFailed),
        StoredStatus::Unknown => Err(ControlTowerError::UnknownPaymentStatus),
    }
}

pub fn success_transition(current: StoredStatus) -> Result<PaymentStatus, ControlTowerError> {
    ensure_in_flight(current)?;
    Ok(PaymentStatus::Succeeded)
}

/// A failed attempt returns the payment to Grounded so it can be retried.
pub fn fail_transition(current: StoredStatus) -> Result<PaymentStatus, ControlTowerError> {
    ensure_in_flight(current)?;
    Ok(PaymentStatus::Grounded)
}
