//! Version 2: rewrites closed-channel summaries with explicit presence
//! markers for the optional trailing fields.

use paymentdb_core::ChannelCloseSummary;
use tracing::debug;

use crate::buckets::CLOSED_CHANNEL_BUCKET;
use crate::{MigrationError, Tx};

pub(super) fn migrate(tx: &Tx<'_>) -> Result<(), MigrationError> {
    let Some(closed) = tx.bucket(CLOSED_CHANNEL_BUCKET)? else {
        return Ok(());
    };

    let entries = closed.entries()?;
    for (key, value) in &entries {
        let summary = ChannelCloseSummary::decode_legacy(value)?;
        closed.put(key, &summary.encode())?;
    }
    debug!(summaries = entries.len(), "rewrote channel close summaries");
    Ok(())
}
