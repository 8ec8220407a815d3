use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::CodecError;

/// Lifecycle state of an outgoing payment as persisted under its hash.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// No attempt in flight. Also the value reported for hashes never seen.
    #[default]
    Grounded,
    InFlight,
    Succeeded,
    Failed,
}

impl PaymentStatus {
    #[must_use]
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Grounded => 0,
            Self::InFlight => 1,
            Self::Succeeded => 2,
            Self::Failed => 3,
        }
    }

    #[must_use]
    pub fn to_bytes(self) -> [u8; 1] {
        [self.to_byte()]
    }

    pub fn from_byte(value: u8) -> Result<Self, CodecError> {
        match value {
            0 => Ok(Self::Grounded),
            1 => Ok(Self::InFlight),
            2 => Ok(Self::Succeeded),
            3 => Ok(Self::Failed),
            other => Err(CodecError::UnknownPaymentStatus(other)),
        }
    }

    pub fn from_bytes(value: &[u8]) -> Result<Self, CodecError> {
        match value {
            [byte] => Self::from_byte(*byte),
            other => Err(CodecError::PaymentStatusLength(other.len())),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grounded => "grounded",
            Self::InFlight => "in_flight",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            Self::Grounded | Self::Failed => 0,
            Self::InFlight => 1,
            Self::Succeeded => 2,
        }
    }

    /// Whether `self` wins over `other` when two historical sources disagree
    /// about the same hash: Succeeded over InFlight over everything else.
    #[must_use]
    pub fn supersedes(self, other: Self) -> bool {
        self.precedence() > other.precedence()
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_bytes_are_stable() {
        let all = [
            PaymentStatus::Grounded,
            PaymentStatus::InFlight,
            PaymentStatus::Succeeded,
            PaymentStatus::Failed,
        ];
        let bytes: Vec<u8> = all.iter().map(|s| s.to_byte()).collect();
        assert_eq!(bytes, vec![0, 1, 2, 3]);
        for status in all {
            assert_eq!(PaymentStatus::from_bytes(&status.to_bytes()), Ok(status));
        }
        assert_eq!(PaymentStatus::InFlight.to_string(), "in_flight");
    }

    #[test]
    fn unknown_or_misshapen_status_is_an_error() {
        assert_eq!(
            PaymentStatus::from_bytes(&[4]),
            Err(CodecError::UnknownPaymentStatus(4))
        );
        assert_eq!(
            PaymentStatus::from_bytes(&[]),
            Err(CodecError::PaymentStatusLength(0))
        );
        assert_eq!(
            PaymentStatus::from_bytes(&[1, 1]),
            Err(CodecError::PaymentStatusLength(2))
        );
    }

    #[test]
    fn precedence_never_downgrades_in_flight() {
        assert!(PaymentStatus::Succeeded.supersedes(PaymentStatus::InFlight));
        assert!(PaymentStatus::InFlight.supersedes(PaymentStatus::Grounded));
        assert!(!PaymentStatus::Grounded.supersedes(PaymentStatus::InFlight));
        assert!(!PaymentStatus::InFlight.supersedes(PaymentStatus::Succeeded));
        assert!(!PaymentStatus::InFlight.supersedes(PaymentStatus::InFlight));
    }
}
