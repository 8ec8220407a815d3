//! Versioned schema migrations.
//!
//! Every pending migration runs inside one write transaction together with
//! the version bump, so a store is always at exactly one known version.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::meta::{fetch_meta, put_meta, Meta};
use crate::{DbError, MigrationError, PaymentDb, RegistryError, Tx};

mod close_summary;
mod gossip_keys;
mod outgoing_payments;
mod payment_statuses;

pub use payment_statuses::fetch_legacy_payment_status;

/// The closed set of historical schema changes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MigrationKind {
    PaymentStatuses,
    OptionalCloseSummaryFields,
    GossipMessageStoreKeys,
    OutgoingPayments,
}

impl MigrationKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::PaymentStatuses => "payment_statuses",
            Self::OptionalCloseSummaryFields => "optional_close_summary_fields",
            Self::GossipMessageStoreKeys => "gossip_message_store_keys",
            Self::OutgoingPayments => "outgoing_payments",
        }
    }

    pub fn apply(self, tx: &Tx<'_>) -> Result<(), MigrationError> {
        match self {
            Self::PaymentStatuses => payment_statuses::migrate(tx),
            Self::OptionalCloseSummaryFields => close_summary::migrate(tx),
            Self::GossipMessageStoreKeys => gossip_keys::migrate(tx),
            Self::OutgoingPayments => outgoing_payments::migrate(tx),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Migration {
    pub version: u32,
    pub kind: MigrationKind,
}

/// Ordered migrations whose versions run 1, 2, .. without gaps.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MigrationSet {
    migrations: Vec<Migration>,
}

impl MigrationSet {
    pub fn new(migrations: Vec<Migration>) -> Result<Self, RegistryError> {
        for (position, (migration, expected)) in migrations.iter().zip(1_u32..).enumerate() {
            if migration.version != expected {
                return Err(RegistryError::NonContiguous {
                    position,
                    expected,
                    actual: migration.version,
                });
            }
        }
        Ok(Self { migrations })
    }

    /// Numbers `kinds` from version 1 in the given order.
    #[must_use]
    pub fn from_kinds(kinds: &[MigrationKind]) -> Self {
        Self {
            migrations: (1_u32..)
                .zip(kinds.iter().copied())
                .map(|(version, kind)| Migration { version, kind })
                .collect(),
        }
    }

    /// Every migration this build knows about.
    #[must_use]
    pub fn latest() -> Self {
        Self::from_kinds(&[
            MigrationKind::PaymentStatuses,
            MigrationKind::OptionalCloseSummaryFields,
            MigrationKind::GossipMessageStoreKeys,
            MigrationKind::OutgoingPayments,
        ])
    }

    #[must_use]
    pub fn latest_version(&self) -> u32 {
        self.migrations.last().map_or(0, |migration| migration.version)
    }

    pub fn pending(&self, db_version: u32) -> impl Iterator<Item = &Migration> {
        self.migrations
            .iter()
            .filter(move |migration| migration.version > db_version)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct AppliedMigration {
    pub version: u32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    pub applied: Vec<AppliedMigration>,
}

pub(crate) fn sync_versions(
    db: &PaymentDb,
    migrations: &MigrationSet,
    dry_run: bool,
) -> Result<MigrationReport, DbError> {
    let latest_version = migrations.latest_version();

    db.update(|tx| {
        let db_version = match fetch_meta(tx) {
            Ok(meta) => meta.db_version,
            Err(DbError::MetaNotFound) => {
                put_meta(tx, Meta { db_version: 0 })?;
                0
            }
            Err(err) => return Err(err),
        };
        info!(db_version, latest_version, "checking database schema version");

        if db_version > latest_version {
            warn!(
                db_version,
                latest_version, "refusing to open database written by a newer version"
            );
            return Err(DbError::Reversion {
                db_version,
                latest_version,
            });
        }

        let mut report = MigrationReport {
            from_version: db_version,
            to_version: db_version,
            applied: Vec::new(),
        };
        if db_version == latest_version {
            return Ok(report);
        }

        for migration in migrations.pending(db_version) {
            let name = migration.kind.name();
            info!(version = migration.version, name, "applying migration");
            if let Err(source) = migration.kind.apply(tx) {
                warn!(version = migration.version, name, error = %source, "migration failed");
                return Err(DbError::Migration {
                    version: migration.version,
                    name,
                    source,
                });
            }
            report.applied.push(AppliedMigration {
                version: migration.version,
                name: name.to_string(),
            });
        }

        put_meta(
            tx,
            Meta {
                db_version: latest_version,
            },
        )?;
        report.to_version = latest_version;

        if dry_run {
            warn!(
                from_version = report.from_version,
                to_version = report.to_version,
                "dry run enabled, rolling back migrations"
            );
            return Err(DbError::DryRunMigration(report));
        }

        info!(
            from_version = report.from_version,
            to_version = report.to_version,
            applied = report.applied.len(),
            "database migrations complete"
        );
        Ok(report)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_rejects_gaps_and_wrong_start() {
        let gap = MigrationSet::new(vec![
            Migration {
                version: 1,
                kind: MigrationKind::PaymentStatuses,
            },
            Migration {
                version: 3,
                kind: MigrationKind::OutgoingPayments,
            },
        ]);
        assert_eq!(
            gap,
            Err(RegistryError::NonContiguous {
                position: 1,
                expected: 2,
                actual: 3,
            })
        );

        let zero = MigrationSet::new(vec![Migration {
            version: 0,
            kind: MigrationKind::PaymentStatuses,
        }]);
        assert!(zero.is_err());
    }

    #[test]
    fn latest_set_is_numbered_in_order() {
        let set = MigrationSet::latest();
        assert_eq!(set.latest_version(), 4);
        let names: Vec<_> = set.pending(2).map(|m| m.kind.name()).collect();
        assert_eq!(names, vec!["gossip_message_store_keys", "outgoing_payments"]);
        assert_eq!(MigrationSet::from_kinds(&[]).latest_version(), 0);
    }
}
