//! Bucket and key names shared with the rest of the node database.

pub const META_BUCKET: &[u8] = b"metadata";
pub const DB_VERSION_KEY: &[u8] = b"dbp";

pub const CIRCUIT_ADD_BUCKET: &[u8] = b"circuit-adds";
pub const LEGACY_PAYMENTS_BUCKET: &[u8] = b"payments";
pub const PAYMENT_STATUS_BUCKET: &[u8] = b"payment-status";
pub const CLOSED_CHANNEL_BUCKET: &[u8] = b"closed-chan-bucket";
pub const MESSAGE_STORE_BUCKET: &[u8] = b"message-store";

pub const NODE_BUCKET: &[u8] = b"graph-node";
pub const SOURCE_KEY: &[u8] = b"source";

/// One sub-bucket per payment hash; its sequence assigns payment numbers.
pub const PAYMENTS_ROOT_BUCKET: &[u8] = b"payments-root-bucket";
pub const PAYMENT_STATUS_KEY: &[u8] = b"payment-status-key";
pub const PAYMENT_SEQUENCE_KEY: &[u8] = b"payment-sequence-key";
pub const PAYMENT_CREATION_INFO_KEY: &[u8] = b"payment-creation-info";
pub const PAYMENT_ATTEMPT_INFO_KEY: &[u8] = b"payment-attempt-info";
pub const PAYMENT_SETTLE_INFO_KEY: &[u8] = b"payment-settle-info";
pub const PAYMENT_DUPLICATE_BUCKET: &[u8] = b"payment-duplicate-bucket";
