#![allow(clippy::missing_errors_doc)]

//! SQLite-backed payment database: a nested bucket store, the versioned
//! migrations that bring historical layouts forward, and the payment
//! control tower that runs on top of the current layout.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

mod batch;
pub mod buckets;
mod config;
mod control_tower;
mod error;
mod kv;
mod meta;
pub mod migration;
mod payments;

use batch::Batcher;
pub use config::DbConfig;
pub use control_tower::PaymentControl;
pub use error::{DbError, MigrationError, PaymentControlError, RegistryError, StoreError};
pub use kv::{Bucket, DumpEntry, Tx};
pub use meta::{fetch_meta, Meta};
pub use migration::{
    fetch_legacy_payment_status, AppliedMigration, Migration, MigrationKind, MigrationReport,
    MigrationSet,
};

pub struct PaymentDb {
    conn: Mutex<Connection>,
    config: DbConfig,
    batcher: Batcher,
}

impl PaymentDb {
    /// Opens the database at `path` and applies every pending migration.
    pub fn open(path: &Path, config: DbConfig) -> Result<Self, DbError> {
        Self::open_with_migrations(path, config, &MigrationSet::latest())
    }

    pub fn open_with_migrations(
        path: &Path,
        config: DbConfig,
        migrations: &MigrationSet,
    ) -> Result<Self, DbError> {
        let db = Self::connect(path, config)?;
        db.upgrade(migrations)?;
        Ok(db)
    }

    pub fn open_in_memory(config: DbConfig) -> Result<Self, DbError> {
        let db = Self::connect_in_memory(config)?;
        db.upgrade(&MigrationSet::latest())?;
        Ok(db)
    }

    /// Opens the database without touching its schema version.
    pub fn connect(path: &Path, config: DbConfig) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self::from_connection(conn, config)?;
        info!(path = %path.display(), "opened payment database");
        Ok(db)
    }

    pub fn connect_in_memory(config: DbConfig) -> Result<Self, DbError> {
        Self::from_connection(Connection::open_in_memory()?, config)
    }

    fn from_connection(conn: Connection, config: DbConfig) -> Result<Self, DbError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;",
        )?;
        conn.busy_timeout(config.busy_timeout())?;
        conn.execute_batch(kv::SCHEMA_KV_V1)?;

        Ok(Self {
            conn: Mutex::new(conn),
            batcher: Batcher::new(&config),
            config,
        })
    }

    /// Brings the schema to the last version of `migrations`, honouring
    /// `dry_run_migrations`.
    pub fn upgrade(&self, migrations: &MigrationSet) -> Result<MigrationReport, DbError> {
        migration::sync_versions(self, migrations, self.config.dry_run_migrations)
    }

    pub fn current_version(&self) -> Result<u32, DbError> {
        self.view(|tx| fetch_meta(tx)).map(|meta| meta.db_version)
    }

    /// Runs `f` in a read-write transaction. Commits if `f` returns `Ok`,
    /// rolls back otherwise.
    pub fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Tx<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let value = f(&Tx::new(&tx, true))?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }

    /// Runs `f` in a read-only transaction that is always rolled back.
    pub fn view<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Tx<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(StoreError::from)?;
        f(&Tx::new(&tx, false))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buckets::META_BUCKET;
    use ulid::Ulid;

    fn must<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err}"),
        }
    }

    #[test]
    fn failed_update_rolls_back() {
        let db = must(PaymentDb::connect_in_memory(DbConfig::default()));
        let result: Result<(), StoreError> = db.update(|tx| {
            tx.create_bucket(b"doomed")?;
            Err(StoreError::KeyRequired)
        });
        assert!(matches!(result, Err(StoreError::KeyRequired)));

        let names = must(db.view(|tx| tx.bucket_names()));
        assert!(names.is_empty());
    }

    #[test]
    fn view_rejects_writes() {
        let db = must(PaymentDb::connect_in_memory(DbConfig::default()));
        let result: Result<_, StoreError> = db.view(|tx| tx.create_bucket(b"b").map(|_| ()));
        assert!(matches!(result, Err(StoreError::TxNotWritable)));
    }

    #[test]
    fn open_writes_meta_and_reopen_keeps_data() {
        let db_path =
            std::env::temp_dir().join(format!("paymentdb-reopen-test-{}.sqlite3", Ulid::new()));

        let db = must(PaymentDb::open(&db_path, DbConfig::default()));
        let latest = MigrationSet::latest().latest_version();
        assert_eq!(must(db.current_version()), latest);
        must(db.update(|tx| -> Result<(), StoreError> {
            tx.create_bucket(b"kept")?.put(b"k", b"v")
        }));
        drop(db);

        let reopened = must(PaymentDb::open(&db_path, DbConfig::default()));
        assert_eq!(must(reopened.current_version()), latest);
        let value = must(reopened.view(|tx| -> Result<_, StoreError> {
            match tx.bucket(b"kept")? {
                Some(bucket) => bucket.get(b"k"),
                None => Ok(None),
            }
        }));
        assert_eq!(value, Some(b"v".to_vec()));
        assert!(must(
            reopened.view(|tx| tx.bucket(META_BUCKET).map(|bucket| bucket.is_some()))
        ));

        drop(reopened);
        let _ = std::fs::remove_file(&db_path);
    }
}
