//! Version 1: builds the flat `payment-status` index from the circuit map
//! and the completed legacy payments.

use std::collections::BTreeMap;

use paymentdb_core::{
    circuit_payment_hash, CircuitKey, LegacyOutgoingPayment, PaymentHash, PaymentStatus,
};
use tracing::debug;

use crate::buckets::{CIRCUIT_ADD_BUCKET, LEGACY_PAYMENTS_BUCKET, PAYMENT_STATUS_BUCKET};
use crate::{DbError, MigrationError, Tx};

pub(super) fn migrate(tx: &Tx<'_>) -> Result<(), MigrationError> {
    let mut statuses: BTreeMap<PaymentHash, PaymentStatus> = BTreeMap::new();

    if let Some(circuits) = tx.bucket(CIRCUIT_ADD_BUCKET)? {
        for (key, value) in circuits.entries()? {
            if !CircuitKey::decode(&key)?.is_locally_sourced() {
                continue;
            }
            let hash = circuit_payment_hash(&value)?;
            merge(&mut statuses, hash, PaymentStatus::InFlight);
        }
    }

    if let Some(payments) = tx.bucket(LEGACY_PAYMENTS_BUCKET)? {
        for (_, value) in payments.entries()? {
            let payment = LegacyOutgoingPayment::decode(&value)?;
            merge(&mut statuses, payment.payment_hash(), PaymentStatus::Succeeded);
        }
    }

    if statuses.is_empty() {
        return Ok(());
    }

    let index = tx.create_bucket_if_not_exists(PAYMENT_STATUS_BUCKET)?;
    let mut written = 0_usize;
    for (hash, status) in statuses {
        if let Some(raw) = index.get(hash.as_bytes())? {
            if !status.supersedes(PaymentStatus::from_bytes(&raw)?) {
                continue;
            }
        }
        index.put(hash.as_bytes(), &status.to_bytes())?;
        written += 1;
    }
    debug!(written, "backfilled payment statuses");
    Ok(())
}

fn merge(
    statuses: &mut BTreeMap<PaymentHash, PaymentStatus>,
    hash: PaymentHash,
    status: PaymentStatus,
) {
    let entry = statuses.entry(hash).or_default();
    if status.supersedes(*entry) {
        *entry = status;
    }
}

/// Status recorded for `hash` in the flat index; Grounded when absent.
pub fn fetch_legacy_payment_status(
    tx: &Tx<'_>,
    hash: &PaymentHash,
) -> Result<PaymentStatus, DbError> {
    let Some(index) = tx.bucket(PAYMENT_STATUS_BUCKET)? else {
        return Ok(PaymentStatus::Grounded);
    };
    match index.get(hash.as_bytes())? {
        Some(raw) => Ok(PaymentStatus::from_bytes(&raw)?),
        None => Ok(PaymentStatus::Grounded),
    }
}
