//! Version 4: moves flat legacy payments into one bucket per payment hash,
//! numbered by the root bucket's sequence in stored key order.

use paymentdb_core::{
    LegacyOutgoingPayment, Payment, PaymentAttemptInfo, PaymentCreationInfo, PaymentHash,
    PaymentStatus, Route, Vertex,
};
use tracing::debug;

use crate::buckets::{
    LEGACY_PAYMENTS_BUCKET, NODE_BUCKET, PAYMENTS_ROOT_BUCKET, PAYMENT_DUPLICATE_BUCKET,
    PAYMENT_STATUS_BUCKET, SOURCE_KEY,
};
use crate::payments::{put_status, write_payment};
use crate::{MigrationError, Tx};

pub(super) fn migrate(tx: &Tx<'_>) -> Result<(), MigrationError> {
    let legacy = match tx.bucket(LEGACY_PAYMENTS_BUCKET)? {
        Some(bucket) => bucket.entries()?,
        None => Vec::new(),
    };
    let in_flight = in_flight_hashes(tx)?;

    if !legacy.is_empty() || !in_flight.is_empty() {
        let root = tx.create_bucket_if_not_exists(PAYMENTS_ROOT_BUCKET)?;

        if !legacy.is_empty() {
            let source = source_node(tx)?;
            for (_, value) in &legacy {
                let legacy_payment = LegacyOutgoingPayment::decode(value)?;
                let sequence_num = root.next_sequence()?;
                let hash = legacy_payment.payment_hash();

                let bucket = match root.bucket(hash.as_bytes())? {
                    None => root.create_bucket(hash.as_bytes())?,
                    Some(first) => first
                        .create_bucket_if_not_exists(PAYMENT_DUPLICATE_BUCKET)?
                        .create_bucket(&sequence_num.to_be_bytes())?,
                };

                let payment = Payment {
                    sequence_num,
                    status: PaymentStatus::Succeeded,
                    info: PaymentCreationInfo {
                        payment_hash: hash,
                        value_msat: legacy_payment.value_msat,
                        creation_date: legacy_payment.creation_date,
                        payment_request: legacy_payment.payment_request.clone(),
                    },
                    attempt: Some(PaymentAttemptInfo {
                        payment_id: sequence_num,
                        route: Route::from_legacy(&legacy_payment, source),
                    }),
                    preimage: Some(legacy_payment.preimage),
                };
                write_payment::<MigrationError>(&bucket, &payment)?;
            }
        }

        // Payments that were in flight must keep blocking a second takeoff.
        for hash in &in_flight {
            if root.bucket(hash.as_bytes())?.is_none() {
                put_status(&root.create_bucket(hash.as_bytes())?, PaymentStatus::InFlight)?;
            }
        }
    }

    for name in [PAYMENT_STATUS_BUCKET, LEGACY_PAYMENTS_BUCKET] {
        if tx.bucket(name)?.is_some() {
            tx.delete_bucket(name)?;
        }
    }

    debug!(
        payments = legacy.len(),
        in_flight = in_flight.len(),
        "restructured outgoing payments"
    );
    Ok(())
}

fn in_flight_hashes(tx: &Tx<'_>) -> Result<Vec<PaymentHash>, MigrationError> {
    let Some(index) = tx.bucket(PAYMENT_STATUS_BUCKET)? else {
        return Ok(Vec::new());
    };
    let mut hashes = Vec::new();
    for (key, value) in index.entries()? {
        if PaymentStatus::from_bytes(&value)? == PaymentStatus::InFlight {
            hashes.push(PaymentHash::from_slice(&key)?);
        }
    }
    Ok(hashes)
}

fn source_node(tx: &Tx<'_>) -> Result<Vertex, MigrationError> {
    let raw = match tx.bucket(NODE_BUCKET)? {
        Some(nodes) => nodes.get(SOURCE_KEY)?,
        None => None,
    };
    let raw = raw.ok_or(MigrationError::SourceNodeNotSet)?;
    Ok(Vertex::from_slice(&raw)?)
}
