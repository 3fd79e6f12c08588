//! The reference container: compare-and-swap updates over the `refs` table,
//! symbolic refs, peeled refs, and a reflog kept in lockstep with every
//! mutation.
//!
//! Ported from `refs.py`'s `SqliteRefsContainer`. CAS failures are always
//! `Ok(false)`, never an `Err` — only a genuine database error surfaces as
//! one, per spec's contract that losing a race is not exceptional. A reflog
//! entry is written only when `RefLogOptions.message` is `Some`, matching
//! dulwich's `_log` early return when `message is None`.

pub mod reflog;
pub mod traits;

pub use traits::{RefsReader, RefsWriter};

use crate::error::Result;
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::rc::Rc;

/// The all-zero sha Git uses to mean "this ref does not yet exist", matching
/// `dulwich.objects.ZERO_SHA`.
pub const ZERO_SHA: [u8; 20] = [0u8; 20];

const SYMREF_PREFIX: &[u8] = b"ref: ";

/// Options threaded through every mutating call, mirroring the
/// `committer`/`timestamp`/`timezone`/`message` reflog parameters every
/// `RefsContainer` method in the original accepts.
#[derive(Debug, Clone, Default)]
pub struct RefLogOptions<'a> {
    pub committer: Option<&'a [u8]>,
    pub timestamp: Option<i64>,
    pub timezone: Option<i32>,
    pub message: Option<&'a [u8]>,
}

pub struct RefsContainer {
    conn: Rc<Connection>,
}

impl RefsContainer {
    pub fn new(conn: Rc<Connection>) -> Self {
        Self { conn }
    }

    pub fn all_keys(&self) -> Result<BTreeSet<Vec<u8>>> {
        let mut stmt = self.conn.prepare("SELECT name FROM refs")?;
        let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;
        let mut keys = BTreeSet::new();
        for row in rows {
            keys.insert(row?);
        }
        Ok(keys)
    }

    pub fn read_loose_ref(&self, name: &[u8]) -> Result<Option<Vec<u8>>> {
        self.conn
            .query_row("SELECT value FROM refs WHERE name = ?1", [name], |row| row.get(0))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other.into()),
            })
    }

    pub fn get_peeled(&self, name: &[u8]) -> Result<Option<Vec<u8>>> {
        self.conn
            .query_row("SELECT value FROM peeled_refs WHERE name = ?1", [name], |row| row.get(0))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other.into()),
            })
    }

    /// Follow a chain of symbolic refs (each stored as `ref: <target>`) down
    /// to a concrete value, for reflog "old value" bookkeeping. Bounded to
    /// guard against a cyclic chain.
    fn follow(&self, name: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut current = name.to_vec();
        for _ in 0..10 {
            match self.read_loose_ref(&current)? {
                Some(value) if value.starts_with(SYMREF_PREFIX) => {
                    current = value[SYMREF_PREFIX.len()..].to_vec();
                }
                other => return Ok(other),
            }
        }
        Ok(None)
    }

    pub fn set_symbolic_ref(&self, name: &[u8], target: &[u8], opts: RefLogOptions<'_>) -> Result<()> {
        let mut new = SYMREF_PREFIX.to_vec();
        new.extend_from_slice(target);

        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        let old = match self.follow(name) {
            Ok(old) => old,
            Err(e) => {
                self.conn.execute_batch("ROLLBACK")?;
                return Err(e);
            }
        };
        self.conn.execute(
            "INSERT OR REPLACE INTO refs (name, value) VALUES (?1, ?2)",
            rusqlite::params![name, new],
        )?;
        self.conn.execute_batch("COMMIT")?;

        if let Some(message) = opts.message {
            reflog::append(
                &self.conn,
                name,
                old.as_deref().unwrap_or(&ZERO_SHA),
                &new,
                opts.committer,
                opts.timestamp,
                opts.timezone,
                message,
            )?;
        }
        Ok(())
    }

    /// Atomic compare-and-swap: set `name` to `new_ref` only if its current
    /// value equals `old_ref` (or, when `old_ref` is `None`, unconditionally).
    /// `old_ref == Some(ZERO_SHA)` means "the ref must not currently exist".
    pub fn set_if_equals(
        &self,
        name: &[u8],
        old_ref: Option<&[u8]>,
        new_ref: &[u8],
        opts: RefLogOptions<'_>,
    ) -> Result<bool> {
        let old = match old_ref {
            None => {
                self.conn.execute_batch("BEGIN IMMEDIATE")?;
                let old = match self.read_loose_ref(name) {
                    Ok(old) => old,
                    Err(e) => {
                        self.conn.execute_batch("ROLLBACK")?;
                        return Err(e);
                    }
                };
                self.conn.execute(
                    "INSERT OR REPLACE INTO refs (name, value) VALUES (?1, ?2)",
                    rusqlite::params![name, new_ref],
                )?;
                self.conn.execute_batch("COMMIT")?;
                old
            }
            Some(old_ref) => {
                let updated = self.conn.execute(
                    "UPDATE refs SET value = ?1 WHERE name = ?2 AND value = ?3",
                    rusqlite::params![new_ref, name, old_ref],
                )?;
                if updated == 0 {
                    if old_ref == ZERO_SHA {
                        let inserted = self.conn.execute(
                            "INSERT OR IGNORE INTO refs (name, value) VALUES (?1, ?2)",
                            rusqlite::params![name, new_ref],
                        )?;
                        if inserted == 0 {
                            return Ok(false);
                        }
                        None
                    } else {
                        tracing::debug!(ref_name = ?String::from_utf8_lossy(name), "set_if_equals: stale old value");
                        return Ok(false);
                    }
                } else {
                    Some(old_ref.to_vec())
                }
            }
        };

        if let Some(message) = opts.message {
            reflog::append(
                &self.conn,
                name,
                old.as_deref().unwrap_or(&ZERO_SHA),
                new_ref,
                opts.committer,
                opts.timestamp,
                opts.timezone,
                message,
            )?;
        }
        tracing::debug!(ref_name = ?String::from_utf8_lossy(name), "set_if_equals: applied");
        Ok(true)
    }

    /// Atomic insert — relies on the primary key constraint to reject an
    /// already-existing ref without a separate read.
    pub fn add_if_new(&self, name: &[u8], new_ref: &[u8], opts: RefLogOptions<'_>) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO refs (name, value) VALUES (?1, ?2)",
            rusqlite::params![name, new_ref],
        )?;
        if inserted == 0 {
            return Ok(false);
        }
        if let Some(message) = opts.message {
            reflog::append(
                &self.conn,
                name,
                &ZERO_SHA,
                new_ref,
                opts.committer,
                opts.timestamp,
                opts.timezone,
                message,
            )?;
        }
        Ok(true)
    }

    pub fn remove_if_equals(
        &self,
        name: &[u8],
        old_ref: Option<&[u8]>,
        opts: RefLogOptions<'_>,
    ) -> Result<bool> {
        let old = match old_ref {
            None => {
                self.conn.execute_batch("BEGIN IMMEDIATE")?;
                let old = match self.read_loose_ref(name) {
                    Ok(old) => old,
                    Err(e) => {
                        self.conn.execute_batch("ROLLBACK")?;
                        return Err(e);
                    }
                };
                self.conn.execute("DELETE FROM refs WHERE name = ?1", [name])?;
                self.conn.execute_batch("COMMIT")?;
                old
            }
            Some(old_ref) => {
                let deleted = self.conn.execute(
                    "DELETE FROM refs WHERE name = ?1 AND value = ?2",
                    rusqlite::params![name, old_ref],
                )?;
                if deleted == 0 {
                    return Ok(false);
                }
                Some(old_ref.to_vec())
            }
        };

        if let (Some(old), Some(message)) = (old, opts.message) {
            reflog::append(
                &self.conn,
                name,
                &old,
                &ZERO_SHA,
                opts.committer,
                opts.timestamp,
                opts.timezone,
                message,
            )?;
        }
        Ok(true)
    }
}

impl RefsReader for RefsContainer {
    fn all_keys(&self) -> Result<BTreeSet<Vec<u8>>> {
        RefsContainer::all_keys(self)
    }

    fn read_loose_ref(&self, name: &[u8]) -> Result<Option<Vec<u8>>> {
        RefsContainer::read_loose_ref(self, name)
    }

    fn get_peeled(&self, name: &[u8]) -> Result<Option<Vec<u8>>> {
        RefsContainer::get_peeled(self, name)
    }
}

impl RefsWriter for RefsContainer {
    fn set_if_equals(
        &self,
        name: &[u8],
        old_ref: Option<&[u8]>,
        new_ref: &[u8],
        opts: RefLogOptions<'_>,
    ) -> Result<bool> {
        RefsContainer::set_if_equals(self, name, old_ref, new_ref, opts)
    }

    fn add_if_new(&self, name: &[u8], new_ref: &[u8], opts: RefLogOptions<'_>) -> Result<bool> {
        RefsContainer::add_if_new(self, name, new_ref, opts)
    }

    fn remove_if_equals(&self, name: &[u8], old_ref: Option<&[u8]>, opts: RefLogOptions<'_>) -> Result<bool> {
        RefsContainer::remove_if_equals(self, name, old_ref, opts)
    }

    fn set_symbolic_ref(&self, name: &[u8], target: &[u8], opts: RefLogOptions<'_>) -> Result<()> {
        RefsContainer::set_symbolic_ref(self, name, target, opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_db;

    fn open_refs() -> RefsContainer {
        let conn = Rc::new(Connection::open_in_memory().unwrap());
        init_db(&conn).unwrap();
        RefsContainer::new(conn)
    }

    fn opts(message: &'static [u8]) -> RefLogOptions<'static> {
        RefLogOptions {
            message: Some(message),
            ..Default::default()
        }
    }

    #[test]
    fn add_if_new_rejects_existing_ref() {
        let refs = open_refs();
        assert!(refs.add_if_new(b"refs/heads/main", &[1; 20], opts(b"init")).unwrap());
        assert!(!refs.add_if_new(b"refs/heads/main", &[2; 20], opts(b"again")).unwrap());
        assert_eq!(refs.read_loose_ref(b"refs/heads/main").unwrap(), Some(vec![1u8; 20]));
    }

    #[test]
    fn set_if_equals_cas_succeeds_and_fails() {
        let refs = open_refs();
        refs.add_if_new(b"refs/heads/main", &[1; 20], opts(b"init")).unwrap();

        assert!(refs
            .set_if_equals(b"refs/heads/main", Some(&[1; 20]), &[2; 20], opts(b"fast-forward"))
            .unwrap());
        assert!(!refs
            .set_if_equals(b"refs/heads/main", Some(&[1; 20]), &[3; 20], opts(b"stale"))
            .unwrap());
        assert_eq!(refs.read_loose_ref(b"refs/heads/main").unwrap(), Some(vec![2u8; 20]));
    }

    #[test]
    fn set_if_equals_with_zero_sha_acts_as_create() {
        let refs = open_refs();
        assert!(refs
            .set_if_equals(b"refs/heads/new", Some(&ZERO_SHA), &[9; 20], opts(b"create"))
            .unwrap());
        assert!(!refs
            .set_if_equals(b"refs/heads/new", Some(&ZERO_SHA), &[8; 20], opts(b"create-again"))
            .unwrap());
    }

    #[test]
    fn remove_if_equals_cas_and_reflog() {
        let refs = open_refs();
        refs.add_if_new(b"refs/heads/main", &[1; 20], opts(b"init")).unwrap();
        assert!(!refs
            .remove_if_equals(b"refs/heads/main", Some(&[9; 20]), opts(b"wrong"))
            .unwrap());
        assert!(refs
            .remove_if_equals(b"refs/heads/main", Some(&[1; 20]), opts(b"delete"))
            .unwrap());
        assert_eq!(refs.read_loose_ref(b"refs/heads/main").unwrap(), None);

        let entries = reflog::read(&refs.conn, b"refs/heads/main").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].new_sha, ZERO_SHA);
    }

    #[test]
    fn symbolic_ref_round_trips() {
        let refs = open_refs();
        refs.set_symbolic_ref(b"HEAD", b"refs/heads/main", opts(b"set HEAD")).unwrap();
        assert_eq!(
            refs.read_loose_ref(b"HEAD").unwrap(),
            Some(b"ref: refs/heads/main".to_vec())
        );
    }

    #[test]
    fn no_message_skips_reflog_entry() {
        let refs = open_refs();
        refs.add_if_new(b"refs/heads/main", &[1; 20], RefLogOptions::default())
            .unwrap();
        assert!(reflog::read(&refs.conn, b"refs/heads/main").unwrap().is_empty());

        refs.set_if_equals(
            b"refs/heads/main",
            Some(&[1; 20]),
            &[2; 20],
            RefLogOptions::default(),
        )
        .unwrap();
        assert!(reflog::read(&refs.conn, b"refs/heads/main").unwrap().is_empty());
    }

    #[test]
    fn all_keys_lists_every_ref() {
        let refs = open_refs();
        refs.add_if_new(b"refs/heads/main", &[1; 20], opts(b"init")).unwrap();
        refs.add_if_new(b"refs/tags/v1", &[2; 20], opts(b"tag")).unwrap();
        let keys = refs.all_keys().unwrap();
        assert!(keys.contains(b"refs/heads/main".as_slice()));
        assert!(keys.contains(b"refs/tags/v1".as_slice()));
    }
}
