//! The payment control tower: each operation reads the stored status,
//! decides the transition and writes the result within one savepoint of a
//! (possibly shared) write transaction.

use paymentdb_core::control::{self, ControlTowerError, StoredStatus};
use paymentdb_core::{PaymentAttemptInfo, PaymentCreationInfo, PaymentHash, PaymentStatus, Preimage};
use tracing::debug;

use crate::buckets::{
    PAYMENTS_ROOT_BUCKET, PAYMENT_ATTEMPT_INFO_KEY, PAYMENT_CREATION_INFO_KEY,
    PAYMENT_SEQUENCE_KEY,
};
use crate::payments::{payment_bucket, put_preimage, put_sequence, put_status, stored_status};
use crate::{Bucket, DbError, MigrationSet, PaymentControlError, PaymentDb, StoreError};

type Decision = fn(StoredStatus) -> Result<PaymentStatus, ControlTowerError>;

/// Guards against sending the same payment twice.
pub struct PaymentControl<'db> {
    db: &'db PaymentDb,
}

impl PaymentDb {
    /// Hands out the control tower once the schema is at the latest
    /// version. A database opened with `connect` and never upgraded may
    /// still keep paid hashes in the legacy layout, so it is refused.
    pub fn payment_control(&self) -> Result<PaymentControl<'_>, DbError> {
        let latest_version = MigrationSet::latest().latest_version();
        let db_version = match self.current_version() {
            Ok(version) => version,
            Err(DbError::MetaNotFound) => 0,
            Err(err) => return Err(err),
        };
        if db_version != latest_version {
            return Err(DbError::SchemaNotCurrent {
                db_version,
                latest_version,
            });
        }
        Ok(PaymentControl { db: self })
    }
}

impl PaymentControl<'_> {
    /// Moves a Grounded or Failed payment to InFlight. `info` is stored
    /// when given, and the first registration of a hash assigns it a
    /// sequence number. Attempt info of an earlier try is cleared.
    /// `info` must describe `hash`.
    pub fn clear_for_takeoff(
        &self,
        hash: PaymentHash,
        info: Option<&PaymentCreationInfo>,
    ) -> Result<(), PaymentControlError> {
        if let Some(info) = info {
            if info.payment_hash != hash {
                return Err(PaymentControlError::HashMismatch {
                    expected: hash,
                    actual: info.payment_hash,
                });
            }
        }
        let encoded_info = info.map(PaymentCreationInfo::encode).transpose()?;
        let outcome = self.db.batch(move |tx| {
            let existing = payment_bucket(tx, &hash)?;
            let current = stored_status(existing.as_ref())?;
            let next = match control::takeoff(current) {
                Ok(next) => next,
                Err(violation) => return Ok(Err(violation)),
            };

            let root = tx.create_bucket_if_not_exists(PAYMENTS_ROOT_BUCKET)?;
            let bucket = match existing {
                Some(bucket) => bucket,
                None => root.create_bucket(hash.as_bytes())?,
            };
            if let Some(encoded) = &encoded_info {
                if bucket.get(PAYMENT_SEQUENCE_KEY)?.is_none() {
                    put_sequence(&bucket, root.next_sequence()?)?;
                }
                bucket.put(PAYMENT_CREATION_INFO_KEY, encoded)?;
            }
            if bucket.get(PAYMENT_ATTEMPT_INFO_KEY)?.is_some() {
                bucket.delete(PAYMENT_ATTEMPT_INFO_KEY)?;
            }
            put_status(&bucket, next)?;
            Ok(Ok((current, next)))
        })?;
        finish("clear_for_takeoff", hash, outcome)
    }

    /// Records the route of the attempt currently in flight.
    pub fn register_attempt(
        &self,
        hash: PaymentHash,
        attempt: &PaymentAttemptInfo,
    ) -> Result<(), PaymentControlError> {
        let encoded = attempt.encode()?;
        self.transition("register_attempt", hash, in_flight, move |bucket| {
            bucket.put(PAYMENT_ATTEMPT_INFO_KEY, &encoded)
        })
    }

    pub fn success(&self, hash: PaymentHash) -> Result<(), PaymentControlError> {
        self.transition("success", hash, control::success_transition, |_| Ok(()))
    }

    /// `success` that also keeps the preimage proving payment.
    pub fn settle(&self, hash: PaymentHash, preimage: Preimage) -> Result<(), PaymentControlError> {
        self.transition("settle", hash, control::success_transition, move |bucket| {
            put_preimage(bucket, &preimage)
        })
    }

    /// Returns an InFlight payment to Grounded so it may be retried.
    pub fn fail(&self, hash: PaymentHash) -> Result<(), PaymentControlError> {
        self.transition("fail", hash, control::fail_transition, |_| Ok(()))
    }

    pub fn fetch_payment_status(
        &self,
        hash: &PaymentHash,
    ) -> Result<PaymentStatus, PaymentControlError> {
        self.db.view(|tx| {
            let bucket = payment_bucket(tx, hash)?;
            match stored_status(bucket.as_ref())? {
                StoredStatus::Known(status) => Ok(status),
                StoredStatus::Unknown => Err(ControlTowerError::UnknownPaymentStatus.into()),
            }
        })
    }

    /// Shared shape of every operation that requires an existing InFlight
    /// payment. An absent hash bucket is never created.
    fn transition<W>(
        &self,
        op: &'static str,
        hash: PaymentHash,
        decide: Decision,
        write: W,
    ) -> Result<(), PaymentControlError>
    where
        W: FnOnce(&Bucket<'_>) -> Result<(), StoreError> + Send + 'static,
    {
        let outcome = self.db.batch(move |tx| {
            let existing = payment_bucket(tx, &hash)?;
            let current = stored_status(existing.as_ref())?;
            let next = match decide(current) {
                Ok(next) => next,
                Err(violation) => return Ok(Err(violation)),
            };
            let Some(bucket) = existing else {
                return Ok(Err(ControlTowerError::PaymentNotInitiated));
            };
            write(&bucket)?;
            if current != StoredStatus::Known(next) {
                put_status(&bucket, next)?;
            }
            Ok(Ok((current, next)))
        })?;
        finish(op, hash, outcome)
    }
}

fn in_flight(current: StoredStatus) -> Result<PaymentStatus, ControlTowerError> {
    control::ensure_in_flight(current)?;
    Ok(PaymentStatus::InFlight)
}

fn finish(
    op: &'static str,
    hash: PaymentHash,
    outcome: Result<(StoredStatus, PaymentStatus), ControlTowerError>,
) -> Result<(), PaymentControlError> {
    match outcome {
        Ok((from, to)) => {
            debug!(op, payment_hash = %hash, from = ?from, to = %to, "payment transition");
            Ok(())
        }
        Err(violation) => {
            debug!(op, payment_hash = %hash, error = violation.code(), "payment transition refused");
            Err(violation.into())
        }
    }
}
