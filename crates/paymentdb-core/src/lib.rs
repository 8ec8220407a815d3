#![allow(clippy::missing_errors_doc)]

//! Storage-free types and byte codecs for the payment database.

pub mod circuit;
pub mod close_summary;
pub mod codec;
pub mod control;
mod error;
pub mod identifiers;
pub mod payment;
mod status;
pub mod wire;

pub use circuit::{circuit_payment_hash, CircuitKey};
pub use close_summary::{ChannelCloseSummary, ChannelConfig, CloseType, OutPoint};
pub use control::{ControlTowerError, StoredStatus};
pub use error::CodecError;
pub use identifiers::{PaymentHash, Preimage, Vertex};
pub use payment::{
    Hop, LegacyOutgoingPayment, Payment, PaymentAttemptInfo, PaymentCreationInfo, Route,
};
pub use status::PaymentStatus;
pub use wire::{MessageType, ShortChannelId};
