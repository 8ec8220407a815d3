use paymentdb_core::{CodecError, ControlTowerError, PaymentHash};

use crate::migration::MigrationReport;

/// Failures of the bucket store itself.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("bucket not found: {0}")]
    BucketNotFound(String),
    #[error("bucket already exists: {0}")]
    BucketExists(String),
    #[error("incompatible value: {0} names both a bucket and a value")]
    IncompatibleValue(String),
    #[error("transaction not writable")]
    TxNotWritable,
    #[error("key required")]
    KeyRequired,
    #[error("bucket sequence overflow")]
    SequenceOverflow,
    #[error("batch commit failed: {0}")]
    BatchCommit(String),
    #[error("batch dropped before the call completed")]
    BatchDropped,
    #[error("database lock poisoned")]
    LockPoisoned,
}

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("malformed key in {bucket}: expected {expected} bytes, found {actual}")]
    MalformedKey {
        bucket: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("source node is not set; legacy payments cannot be migrated without it")]
    SourceNodeNotSet,
}

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum RegistryError {
    #[error("migration at position {position} targets version {actual}, expected {expected}")]
    NonContiguous {
        position: usize,
        expected: u32,
        actual: u32,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("meta record not found")]
    MetaNotFound,
    #[error("refusing to revert from db version {db_version} to latest known version {latest_version}")]
    Reversion { db_version: u32, latest_version: u32 },
    #[error("db version {db_version} is not the latest version {latest_version}; migrate first")]
    SchemaNotCurrent { db_version: u32, latest_version: u32 },
    #[error("migration to version {version} ({name}) failed: {source}")]
    Migration {
        version: u32,
        name: &'static str,
        #[source]
        source: MigrationError,
    },
    #[error(
        "dry run: migrations from version {} to {} rolled back",
        .0.from_version,
        .0.to_version
    )]
    DryRunMigration(MigrationReport),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(StoreError::Sqlite(err))
    }
}

/// Result of a control-tower call that did not go through.
#[derive(Debug, thiserror::Error)]
pub enum PaymentControlError {
    #[error(transparent)]
    Violation(#[from] ControlTowerError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("creation info is for payment {actual}, not {expected}")]
    HashMismatch {
        expected: PaymentHash,
        actual: PaymentHash,
    },
}

impl PaymentControlError {
    /// The state-machine violation, if that is what this is.
    #[must_use]
    pub fn violation(&self) -> Option<ControlTowerError> {
        match self {
            Self::Violation(kind) => Some(*kind),
            Self::Store(_) | Self::Codec(_) | Self::HashMismatch { .. } => None,
        }
    }
}
