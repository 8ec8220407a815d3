//! Layout of a payment inside its hash bucket, and read accessors.

use paymentdb_core::codec::Reader;
use paymentdb_core::{
    CodecError, Payment, PaymentAttemptInfo, PaymentCreationInfo, PaymentHash, PaymentStatus,
    Preimage, StoredStatus,
};

use crate::buckets::{
    PAYMENTS_ROOT_BUCKET, PAYMENT_ATTEMPT_INFO_KEY, PAYMENT_CREATION_INFO_KEY,
    PAYMENT_DUPLICATE_BUCKET, PAYMENT_SEQUENCE_KEY, PAYMENT_SETTLE_INFO_KEY, PAYMENT_STATUS_KEY,
};
use crate::{Bucket, DbError, PaymentDb, StoreError, Tx};

pub(crate) fn payment_bucket<'conn>(
    tx: &Tx<'conn>,
    hash: &PaymentHash,
) -> Result<Option<Bucket<'conn>>, StoreError> {
    match tx.bucket(PAYMENTS_ROOT_BUCKET)? {
        Some(root) => root.bucket(hash.as_bytes()),
        None => Ok(None),
    }
}

pub(crate) fn stored_status(bucket: Option<&Bucket<'_>>) -> Result<StoredStatus, StoreError> {
    let raw = match bucket {
        Some(bucket) => bucket.get(PAYMENT_STATUS_KEY)?,
        None => None,
    };
    Ok(StoredStatus::from_raw(raw.as_deref()))
}

pub(crate) fn put_status(bucket: &Bucket<'_>, status: PaymentStatus) -> Result<(), StoreError> {
    bucket.put(PAYMENT_STATUS_KEY, &status.to_bytes())
}

pub(crate) fn put_sequence(bucket: &Bucket<'_>, sequence_num: u64) -> Result<(), StoreError> {
    bucket.put(PAYMENT_SEQUENCE_KEY, &sequence_num.to_be_bytes())
}

pub(crate) fn put_creation_info<E>(bucket: &Bucket<'_>, info: &PaymentCreationInfo) -> Result<(), E>
where
    E: From<StoreError> + From<CodecError>,
{
    bucket.put(PAYMENT_CREATION_INFO_KEY, &info.encode()?)?;
    Ok(())
}

pub(crate) fn put_attempt_info<E>(bucket: &Bucket<'_>, attempt: &PaymentAttemptInfo) -> Result<(), E>
where
    E: From<StoreError> + From<CodecError>,
{
    bucket.put(PAYMENT_ATTEMPT_INFO_KEY, &attempt.encode()?)?;
    Ok(())
}

pub(crate) fn put_preimage(bucket: &Bucket<'_>, preimage: &Preimage) -> Result<(), StoreError> {
    bucket.put(PAYMENT_SETTLE_INFO_KEY, preimage.as_bytes())
}

/// Writes every field of `payment` into `bucket`.
pub(crate) fn write_payment<E>(bucket: &Bucket<'_>, payment: &Payment) -> Result<(), E>
where
    E: From<StoreError> + From<CodecError>,
{
    put_sequence(bucket, payment.sequence_num)?;
    put_status(bucket, payment.status)?;
    put_creation_info::<E>(bucket, &payment.info)?;
    if let Some(attempt) = &payment.attempt {
        put_attempt_info::<E>(bucket, attempt)?;
    }
    if let Some(preimage) = &payment.preimage {
        put_preimage(bucket, preimage)?;
    }
    Ok(())
}

/// Reads a payment back. Buckets without creation info (status-only
/// entries) yield `None`.
fn read_payment(bucket: &Bucket<'_>) -> Result<Option<Payment>, DbError> {
    let Some(raw_info) = bucket.get(PAYMENT_CREATION_INFO_KEY)? else {
        return Ok(None);
    };
    let info = PaymentCreationInfo::decode(&raw_info)?;

    let raw_sequence = bucket.get(PAYMENT_SEQUENCE_KEY)?.unwrap_or_default();
    let mut reader = Reader::new(&raw_sequence, "payment sequence");
    let sequence_num = reader.read_u64()?;
    reader.finish()?;

    let status = match bucket.get(PAYMENT_STATUS_KEY)? {
        Some(raw) => PaymentStatus::from_bytes(&raw)?,
        None => PaymentStatus::Grounded,
    };
    let attempt = match bucket.get(PAYMENT_ATTEMPT_INFO_KEY)? {
        Some(raw) => Some(PaymentAttemptInfo::decode(&raw)?),
        None => None,
    };
    let preimage = match bucket.get(PAYMENT_SETTLE_INFO_KEY)? {
        Some(raw) => Some(Preimage::from_slice(&raw)?),
        None => None,
    };

    Ok(Some(Payment {
        sequence_num,
        status,
        info,
        attempt,
        preimage,
    }))
}

impl PaymentDb {
    /// Grounded when the hash has never been registered.
    pub fn fetch_payment_status(&self, hash: &PaymentHash) -> Result<PaymentStatus, DbError> {
        self.view(|tx| {
            let Some(bucket) = payment_bucket(tx, hash)? else {
                return Ok(PaymentStatus::Grounded);
            };
            match bucket.get(PAYMENT_STATUS_KEY)? {
                Some(raw) => Ok(PaymentStatus::from_bytes(&raw)?),
                None => Ok(PaymentStatus::Grounded),
            }
        })
    }

    /// The first payment registered under `hash`, without its duplicates.
    pub fn fetch_payment(&self, hash: &PaymentHash) -> Result<Option<Payment>, DbError> {
        self.view(|tx| match payment_bucket(tx, hash)? {
            Some(bucket) => read_payment(&bucket),
            None => Ok(None),
        })
    }

    /// Every registered payment, duplicates included, in sequence order.
    pub fn fetch_payments(&self) -> Result<Vec<Payment>, DbError> {
        self.view(|tx| {
            let Some(root) = tx.bucket(PAYMENTS_ROOT_BUCKET)? else {
                return Ok(Vec::new());
            };

            let mut payments = Vec::new();
            for name in root.bucket_names()? {
                let Some(bucket) = root.bucket(&name)? else {
                    continue;
                };
                payments.extend(read_payment(&bucket)?);

                let Some(duplicates) = bucket.bucket(PAYMENT_DUPLICATE_BUCKET)? else {
                    continue;
                };
                for seq in duplicates.bucket_names()? {
                    if let Some(duplicate) = duplicates.bucket(&seq)? {
                        payments.extend(read_payment(&duplicate)?);
                    }
                }
            }
            payments.sort_by_key(|payment| payment.sequence_num);
            Ok(payments)
        })
    }
}
