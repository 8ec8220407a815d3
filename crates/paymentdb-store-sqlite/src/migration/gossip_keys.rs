//! Version 3: appends the message type to every gossip message-store key so
//! that two message types for the same peer and channel no longer collide.

use paymentdb_core::wire::{read_message_type, LEGACY_MESSAGE_STORE_KEY_LEN};
use tracing::debug;

use crate::buckets::MESSAGE_STORE_BUCKET;
use crate::{MigrationError, Tx};

pub(super) fn migrate(tx: &Tx<'_>) -> Result<(), MigrationError> {
    let Some(store) = tx.bucket(MESSAGE_STORE_BUCKET)? else {
        return Ok(());
    };

    let entries = store.entries()?;
    for (key, _) in &entries {
        if key.len() != LEGACY_MESSAGE_STORE_KEY_LEN {
            return Err(MigrationError::MalformedKey {
                bucket: "message-store",
                expected: LEGACY_MESSAGE_STORE_KEY_LEN,
                actual: key.len(),
            });
        }
    }

    for (key, message) in &entries {
        let msg_type = read_message_type(message)?;
        let mut new_key = Vec::with_capacity(key.len() + 2);
        new_key.extend_from_slice(key);
        new_key.extend_from_slice(&msg_type.to_be_bytes());

        store.delete(key)?;
        store.put(&new_key, message)?;
    }
    debug!(messages = entries.len(), "widened gossip message store keys");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::{MigrationKind, MigrationSet};
    use crate::{DbConfig, DbError, PaymentDb, StoreError};
    use paymentdb_core::wire::{
        legacy_message_store_key, message_store_key, AnnounceSignatures, MessageType,
    };
    use paymentdb_core::{ShortChannelId, Vertex};

    fn must<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err}"),
        }
    }

    fn migration() -> MigrationSet {
        MigrationSet::from_kinds(&[MigrationKind::GossipMessageStoreKeys])
    }

    fn seeded_db(entries: Vec<(Vec<u8>, Vec<u8>)>) -> PaymentDb {
        let db = must(PaymentDb::connect_in_memory(DbConfig::default()));
        must(db.update(|tx| -> Result<(), StoreError> {
            let store = tx.create_bucket(MESSAGE_STORE_BUCKET)?;
            for (key, value) in &entries {
                store.put(key, value)?;
            }
            Ok(())
        }));
        db
    }

    fn stored_entries(db: &PaymentDb) -> Vec<(Vec<u8>, Vec<u8>)> {
        must(db.view(|tx| -> Result<_, StoreError> {
            match tx.bucket(MESSAGE_STORE_BUCKET)? {
                Some(bucket) => bucket.entries(),
                None => Ok(Vec::new()),
            }
        }))
    }

    #[test]
    fn key_gains_message_type_and_payload_is_unchanged() {
        let peer = Vertex([2; 33]);
        let scid = ShortChannelId {
            block_height: 1,
            tx_index: 2,
            tx_position: 3,
        };
        let msg = AnnounceSignatures {
            channel_id: [4; 32],
            short_channel_id: scid,
            node_signature: [5; 64],
            bitcoin_signature: [6; 64],
        };
        let payload = msg.encode_message();
        let db = seeded_db(vec![(legacy_message_store_key(&peer, scid), payload.clone())]);

        must(db.upgrade(&migration()));

        let new_key = message_store_key(&peer, scid, MessageType::ANNOUNCE_SIGNATURES);
        let entries = stored_entries(&db);
        assert_eq!(entries, vec![(new_key, payload.clone())]);
        assert_eq!(must(AnnounceSignatures::decode_message(&payload)), msg);
    }

    #[test]
    fn distinct_peers_keep_distinct_entries() {
        let scid = ShortChannelId::from_u64(77);
        let mut update = MessageType::CHANNEL_UPDATE.to_be_bytes().to_vec();
        update.extend_from_slice(b"update body");
        let db = seeded_db(vec![
            (legacy_message_store_key(&Vertex([2; 33]), scid), update.clone()),
            (legacy_message_store_key(&Vertex([3; 33]), scid), update.clone()),
        ]);

        must(db.upgrade(&migration()));

        let keys: Vec<_> = stored_entries(&db).into_iter().map(|(key, _)| key).collect();
        assert_eq!(
            keys,
            vec![
                message_store_key(&Vertex([2; 33]), scid, MessageType::CHANNEL_UPDATE),
                message_store_key(&Vertex([3; 33]), scid, MessageType::CHANNEL_UPDATE),
            ]
        );
    }

    #[test]
    fn malformed_key_leaves_store_untouched() {
        let scid = ShortChannelId::from_u64(9);
        let good = legacy_message_store_key(&Vertex([2; 33]), scid);
        let payload = MessageType::NODE_ANNOUNCEMENT.to_be_bytes().to_vec();
        let db = seeded_db(vec![
            (good.clone(), payload.clone()),
            (vec![1; 40], payload.clone()),
        ]);

        let err = match db.upgrade(&migration()) {
            Ok(_) => panic!("short key should fail the migration"),
            Err(err) => err,
        };
        assert!(matches!(
            err,
            DbError::Migration {
                source: MigrationError::MalformedKey { actual: 40, .. },
                ..
            }
        ));
        assert_eq!(
            stored_entries(&db),
            vec![(vec![1; 40], payload.clone()), (good, payload)]
        );
    }
}
