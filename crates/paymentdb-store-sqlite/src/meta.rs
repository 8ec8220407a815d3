use paymentdb_core::codec::Reader;
use serde::{Deserialize, Serialize};

use crate::buckets::{DB_VERSION_KEY, META_BUCKET};
use crate::{DbError, StoreError, Tx};

/// Schema version record, written only by the migration runner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct Meta {
    pub db_version: u32,
}

pub fn fetch_meta(tx: &Tx<'_>) -> Result<Meta, DbError> {
    let Some(meta) = tx.bucket(META_BUCKET)? else {
        return Err(DbError::MetaNotFound);
    };
    let Some(raw) = meta.get(DB_VERSION_KEY)? else {
        return Err(DbError::MetaNotFound);
    };
    let mut reader = Reader::new(&raw, "db version");
    let db_version = reader.read_u32()?;
    reader.finish()?;
    Ok(Meta { db_version })
}

pub(crate) fn put_meta(tx: &Tx<'_>, meta: Meta) -> Result<(), StoreError> {
    tx.create_bucket_if_not_exists(META_BUCKET)?
        .put(DB_VERSION_KEY, &meta.db_version.to_be_bytes())
}
