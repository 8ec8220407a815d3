#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum CodecError {
    #[error("{context}: unexpected end of input (needed {needed} bytes, {available} available)")]
    UnexpectedEof {
        context: &'static str,
        needed: usize,
        available: usize,
    },
    #[error("{context}: expected {expected} bytes, found {actual}")]
    InvalidLength {
        context: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{context}: {count} trailing bytes after record")]
    TrailingBytes { context: &'static str, count: usize },
    #[error("{context}: {count} elements exceed the encodable maximum")]
    TooManyElements { context: &'static str, count: usize },
    #[error("{context}: invalid boolean marker {value:#04x}")]
    InvalidBool { context: &'static str, value: u8 },
    #[error("unknown payment status byte {0:#04x}")]
    UnknownPaymentStatus(u8),
    #[error("payment status must be exactly one byte, found {0}")]
    PaymentStatusLength(usize),
    #[error("unknown channel close type {0}")]
    UnknownCloseType(u8),
    #[error(
        "legacy close summary carries {0} optional bytes, which is not a field boundary (0, 33, 234 or 267)"
    )]
    LegacyCloseSummaryLength(usize),
    #[error("close summary field {field} is present after an absent field and has no legacy encoding")]
    NonCumulativeOptionalFields { field: &'static str },
    #[error("timestamp out of range: {0}")]
    TimestampOutOfRange(String),
    #[error("expected message type {expected}, found {actual}")]
    UnexpectedMessageType { expected: u16, actual: u16 },
    #[error("invalid hex identifier: {0}")]
    InvalidHex(String),
}
