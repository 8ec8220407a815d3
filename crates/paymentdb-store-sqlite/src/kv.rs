//! Nested buckets of ordered byte keys, stored in two SQLite tables.
//!
//! A bucket is a row in `kv_buckets`; its values live in `kv_entries`.
//! Top-level buckets have parent 0. Within one bucket a key names either a
//! value or a child bucket, never both.

use rusqlite::{params, Connection, OptionalExtension};

use crate::StoreError;

pub(crate) const ROOT_BUCKET_ID: i64 = 0;

pub(crate) const SCHEMA_KV_V1: &str = r"
CREATE TABLE IF NOT EXISTS kv_buckets (
  bucket_id INTEGER PRIMARY KEY AUTOINCREMENT,
  parent_id INTEGER NOT NULL,
  name BLOB NOT NULL CHECK (length(name) > 0),
  sequence INTEGER NOT NULL DEFAULT 0 CHECK (sequence >= 0),
  UNIQUE (parent_id, name)
);

CREATE TABLE IF NOT EXISTS kv_entries (
  bucket_id INTEGER NOT NULL REFERENCES kv_buckets(bucket_id) ON DELETE CASCADE,
  key BLOB NOT NULL CHECK (length(key) > 0),
  value BLOB NOT NULL,
  PRIMARY KEY (bucket_id, key)
) WITHOUT ROWID;
";

/// One line of [`Tx::dump`]: a bucket header or a value inside it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DumpEntry {
    Bucket {
        path: Vec<Vec<u8>>,
        sequence: u64,
    },
    Value {
        path: Vec<Vec<u8>>,
        key: Vec<u8>,
        value: Vec<u8>,
    },
}

/// Handle on an open transaction. Obtained from `PaymentDb::update`,
/// `PaymentDb::view` or `PaymentDb::batch`.
#[derive(Debug, Clone, Copy)]
pub struct Tx<'conn> {
    conn: &'conn Connection,
    writable: bool,
}

impl<'conn> Tx<'conn> {
    pub(crate) fn new(conn: &'conn Connection, writable: bool) -> Self {
        Self { conn, writable }
    }

    pub fn bucket(&self, name: &[u8]) -> Result<Option<Bucket<'conn>>, StoreError> {
        self.root().bucket(name)
    }

    pub fn create_bucket(&self, name: &[u8]) -> Result<Bucket<'conn>, StoreError> {
        self.root().create_bucket(name)
    }

    pub fn create_bucket_if_not_exists(&self, name: &[u8]) -> Result<Bucket<'conn>, StoreError> {
        self.root().create_bucket_if_not_exists(name)
    }

    pub fn delete_bucket(&self, name: &[u8]) -> Result<(), StoreError> {
        self.root().delete_bucket(name)
    }

    pub fn bucket_names(&self) -> Result<Vec<Vec<u8>>, StoreError> {
        self.root().bucket_names()
    }

    /// Walks the whole bucket tree depth first, children in name order and
    /// values in key order.
    pub fn dump(&self) -> Result<Vec<DumpEntry>, StoreError> {
        let mut out = Vec::new();
        dump_children(&self.root(), &mut Vec::new(), &mut out)?;
        Ok(out)
    }

    fn root(&self) -> Bucket<'conn> {
        Bucket {
            conn: self.conn,
            id: ROOT_BUCKET_ID,
            writable: self.writable,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Bucket<'conn> {
    conn: &'conn Connection,
    id: i64,
    writable: bool,
}

impl<'conn> Bucket<'conn> {
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM kv_entries WHERE bucket_id = ?1 AND key = ?2",
                params![self.id, key],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.ensure_writable()?;
        ensure_key(key)?;
        if self.child_id(key)?.is_some() {
            return Err(StoreError::IncompatibleValue(display_key(key)));
        }
        self.conn.execute(
            "INSERT INTO kv_entries(bucket_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(bucket_id, key) DO UPDATE SET value = excluded.value",
            params![self.id, key, value],
        )?;
        Ok(())
    }

    /// Deleting a missing key is not an error.
    pub fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.ensure_writable()?;
        if self.child_id(key)?.is_some() {
            return Err(StoreError::IncompatibleValue(display_key(key)));
        }
        self.conn.execute(
            "DELETE FROM kv_entries WHERE bucket_id = ?1 AND key = ?2",
            params![self.id, key],
        )?;
        Ok(())
    }

    /// Snapshot of every value in key order. Child buckets are not included.
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM kv_entries WHERE bucket_id = ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![self.id], |row| {
            Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn bucket(&self, name: &[u8]) -> Result<Option<Bucket<'conn>>, StoreError> {
        Ok(self.child_id(name)?.map(|id| self.child(id)))
    }

    pub fn create_bucket(&self, name: &[u8]) -> Result<Bucket<'conn>, StoreError> {
        self.ensure_writable()?;
        ensure_key(name)?;
        if self.child_id(name)?.is_some() {
            return Err(StoreError::BucketExists(display_key(name)));
        }
        self.insert_child(name)
    }

    pub fn create_bucket_if_not_exists(&self, name: &[u8]) -> Result<Bucket<'conn>, StoreError> {
        self.ensure_writable()?;
        ensure_key(name)?;
        match self.child_id(name)? {
            Some(id) => Ok(self.child(id)),
            None => self.insert_child(name),
        }
    }

    /// Removes a child bucket with everything nested below it.
    pub fn delete_bucket(&self, name: &[u8]) -> Result<(), StoreError> {
        self.ensure_writable()?;
        let Some(id) = self.child_id(name)? else {
            if self.get(name)?.is_some() {
                return Err(StoreError::IncompatibleValue(display_key(name)));
            }
            return Err(StoreError::BucketNotFound(display_key(name)));
        };

        self.conn.execute(
            "WITH RECURSIVE doomed(id) AS (
               SELECT ?1
               UNION ALL
               SELECT b.bucket_id FROM kv_buckets b JOIN doomed d ON b.parent_id = d.id
             )
             DELETE FROM kv_entries WHERE bucket_id IN (SELECT id FROM doomed)",
            params![id],
        )?;
        self.conn.execute(
            "WITH RECURSIVE doomed(id) AS (
               SELECT ?1
               UNION ALL
               SELECT b.bucket_id FROM kv_buckets b JOIN doomed d ON b.parent_id = d.id
             )
             DELETE FROM kv_buckets WHERE bucket_id IN (SELECT id FROM doomed)",
            params![id],
        )?;
        Ok(())
    }

    pub fn bucket_names(&self) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM kv_buckets WHERE parent_id = ?1 ORDER BY name")?;
        let rows = stmt.query_map(params![self.id], |row| row.get::<_, Vec<u8>>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn sequence(&self) -> Result<u64, StoreError> {
        let raw: i64 = self.conn.query_row(
            "SELECT sequence FROM kv_buckets WHERE bucket_id = ?1",
            params![self.id],
            |row| row.get(0),
        )?;
        u64::try_from(raw).map_err(|_| StoreError::SequenceOverflow)
    }

    /// Increments and returns the bucket's sequence counter; the first call
    /// on a fresh bucket returns 1.
    pub fn next_sequence(&self) -> Result<u64, StoreError> {
        self.ensure_writable()?;
        let next = self
            .sequence()?
            .checked_add(1)
            .ok_or(StoreError::SequenceOverflow)?;
        self.set_sequence(next)?;
        Ok(next)
    }

    pub fn set_sequence(&self, value: u64) -> Result<(), StoreError> {
        self.ensure_writable()?;
        let raw = i64::try_from(value).map_err(|_| StoreError::SequenceOverflow)?;
        self.conn.execute(
            "UPDATE kv_buckets SET sequence = ?2 WHERE bucket_id = ?1",
            params![self.id, raw],
        )?;
        Ok(())
    }

    fn child(&self, id: i64) -> Bucket<'conn> {
        Bucket {
            conn: self.conn,
            id,
            writable: self.writable,
        }
    }

    fn child_id(&self, name: &[u8]) -> Result<Option<i64>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT bucket_id FROM kv_buckets WHERE parent_id = ?1 AND name = ?2",
                params![self.id, name],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn insert_child(&self, name: &[u8]) -> Result<Bucket<'conn>, StoreError> {
        if self.get(name)?.is_some() {
            return Err(StoreError::IncompatibleValue(display_key(name)));
        }
        self.conn.execute(
            "INSERT INTO kv_buckets(parent_id, name) VALUES (?1, ?2)",
            params![self.id, name],
        )?;
        Ok(self.child(self.conn.last_insert_rowid()))
    }

    fn ensure_writable(&self) -> Result<(), StoreError> {
        if self.writable {
            Ok(())
        } else {
            Err(StoreError::TxNotWritable)
        }
    }
}

fn ensure_key(key: &[u8]) -> Result<(), StoreError> {
    if key.is_empty() {
        Err(StoreError::KeyRequired)
    } else {
        Ok(())
    }
}

fn dump_children(
    bucket: &Bucket<'_>,
    path: &mut Vec<Vec<u8>>,
    out: &mut Vec<DumpEntry>,
) -> Result<(), StoreError> {
    for name in bucket.bucket_names()? {
        let Some(child) = bucket.bucket(&name)? else {
            continue;
        };
        path.push(name);
        out.push(DumpEntry::Bucket {
            path: path.clone(),
            sequence: child.sequence()?,
        });
        for (key, value) in child.entries()? {
            out.push(DumpEntry::Value {
                path: path.clone(),
                key,
                value,
            });
        }
        dump_children(&child, path, out)?;
        path.pop();
    }
    Ok(())
}

/// Readable rendering of a key for error messages.
pub(crate) fn display_key(key: &[u8]) -> String {
    match std::str::from_utf8(key) {
        Ok(text) if text.chars().all(|c| c.is_ascii_graphic()) => text.to_string(),
        _ => hex::encode(key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn must<T>(result: Result<T, StoreError>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err}"),
        }
    }

    fn must_some<T>(value: Option<T>) -> T {
        match value {
            Some(value) => value,
            None => panic!("test failure: expected a value"),
        }
    }

    fn fixture_conn() -> Connection {
        let conn = match Connection::open_in_memory() {
            Ok(conn) => conn,
            Err(err) => panic!("failed to open sqlite: {err}"),
        };
        if let Err(err) = conn.execute_batch("PRAGMA foreign_keys = ON;") {
            panic!("failed to configure sqlite: {err}");
        }
        if let Err(err) = conn.execute_batch(SCHEMA_KV_V1) {
            panic!("failed to apply kv schema: {err}");
        }
        conn
    }

    #[test]
    fn nested_buckets_hold_ordered_values() {
        let conn = fixture_conn();
        let tx = Tx::new(&conn, true);

        let outer = must(tx.create_bucket(b"outer"));
        let inner = must(outer.create_bucket(b"inner"));
        must(inner.put(&[2], b"two"));
        must(inner.put(&[1], b"one"));
        must(inner.put(&[1, 0], b"one-zero"));
        must(inner.put(&[1], b"uno"));

        let reopened = must_some(must(must_some(must(tx.bucket(b"outer"))).bucket(b"inner")));
        assert_eq!(
            must(reopened.entries()),
            vec![
                (vec![1], b"uno".to_vec()),
                (vec![1, 0], b"one-zero".to_vec()),
                (vec![2], b"two".to_vec()),
            ]
        );

        must(reopened.delete(&[1]));
        must(reopened.delete(&[9]));
        assert_eq!(must(reopened.get(&[1])), None);
        assert!(must(tx.bucket(b"missing")).is_none());
    }

    #[test]
    fn key_names_either_value_or_bucket() {
        let conn = fixture_conn();
        let tx = Tx::new(&conn, true);
        let bucket = must(tx.create_bucket(b"b"));

        must(bucket.put(b"value", b"x"));
        assert!(matches!(
            bucket.create_bucket(b"value"),
            Err(StoreError::IncompatibleValue(_))
        ));

        must(bucket.create_bucket(b"child"));
        assert!(matches!(
            bucket.put(b"child", b"x"),
            Err(StoreError::IncompatibleValue(_))
        ));
        assert!(matches!(
            bucket.create_bucket(b"child"),
            Err(StoreError::BucketExists(_))
        ));
        assert!(matches!(bucket.put(b"", b"x"), Err(StoreError::KeyRequired)));
    }

    #[test]
    fn read_only_transaction_rejects_writes() {
        let conn = fixture_conn();
        must(Tx::new(&conn, true).create_bucket(b"b"));

        let tx = Tx::new(&conn, false);
        let bucket = must_some(must(tx.bucket(b"b")));
        assert!(matches!(bucket.put(b"k", b"v"), Err(StoreError::TxNotWritable)));
        assert!(matches!(bucket.next_sequence(), Err(StoreError::TxNotWritable)));
        assert!(matches!(tx.create_bucket(b"c"), Err(StoreError::TxNotWritable)));
        assert!(matches!(tx.delete_bucket(b"b"), Err(StoreError::TxNotWritable)));
    }

    #[test]
    fn delete_bucket_removes_whole_subtree() {
        let conn = fixture_conn();
        let tx = Tx::new(&conn, true);
        let top = must(tx.create_bucket(b"top"));
        let mid = must(top.create_bucket(b"mid"));
        let leaf = must(mid.create_bucket(b"leaf"));
        must(leaf.put(b"k", b"v"));
        must(mid.put(b"k", b"v"));

        must(tx.delete_bucket(b"top"));

        let remaining: i64 = match conn.query_row("SELECT COUNT(*) FROM kv_entries", [], |row| {
            row.get(0)
        }) {
            Ok(count) => count,
            Err(err) => panic!("count failed: {err}"),
        };
        assert_eq!(remaining, 0);
        assert!(must(tx.bucket_names()).is_empty());
        assert!(matches!(
            tx.delete_bucket(b"top"),
            Err(StoreError::BucketNotFound(_))
        ));
    }

    #[test]
    fn sequence_counts_from_one() {
        let conn = fixture_conn();
        let tx = Tx::new(&conn, true);
        let bucket = must(tx.create_bucket(b"seq"));

        assert_eq!(must(bucket.sequence()), 0);
        assert_eq!(must(bucket.next_sequence()), 1);
        assert_eq!(must(bucket.next_sequence()), 2);
        must(bucket.set_sequence(41));
        assert_eq!(must(bucket.next_sequence()), 42);
        assert!(matches!(
            bucket.set_sequence(u64::MAX),
            Err(StoreError::SequenceOverflow)
        ));
    }

    #[test]
    fn dump_walks_tree_in_byte_order() {
        let conn = fixture_conn();
        let tx = Tx::new(&conn, true);
        let b = must(tx.create_bucket(b"b"));
        let a = must(tx.create_bucket(b"a"));
        must(b.put(b"k", b"v"));
        let nested = must(a.create_bucket(b"n"));
        must(nested.next_sequence());

        assert_eq!(
            must(tx.dump()),
            vec![
                DumpEntry::Bucket {
                    path: vec![b"a".to_vec()],
                    sequence: 0,
                },
                DumpEntry::Bucket {
                    path: vec![b"a".to_vec(), b"n".to_vec()],
                    sequence: 1,
                },
                DumpEntry::Bucket {
                    path: vec![b"b".to_vec()],
                    sequence: 0,
                },
                DumpEntry::Value {
                    path: vec![b"b".to_vec()],
                    key: b"k".to_vec(),
                    value: b"v".to_vec(),
                },
            ]
        );
    }
}
