//! Reflog: an append-only, auto-increment-ordered history of every change
//! made to a ref, independent of wall-clock ordering.
//!
//! Ported from `repo.py`'s `_write_reflog`/`read_reflog`.

use crate::error::Result;
use rusqlite::Connection;

/// Default committer identity stamped on reflog entries when the caller
/// doesn't supply one, matching the reference container's default logger.
pub const DEFAULT_COMMITTER: &[u8] = b"gitlake <gitlake@localhost>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflogEntry {
    pub old_sha: Vec<u8>,
    pub new_sha: Vec<u8>,
    pub committer: Vec<u8>,
    pub timestamp: i64,
    pub timezone: i32,
    pub message: Vec<u8>,
}

/// Append one reflog entry. `old_sha`/`new_sha` are the ref's raw 20-byte
/// values (the all-zero sha stands in for "ref did not exist").
#[allow(clippy::too_many_arguments)]
pub fn append(
    conn: &Connection,
    ref_name: &[u8],
    old_sha: &[u8],
    new_sha: &[u8],
    committer: Option<&[u8]>,
    timestamp: Option<i64>,
    timezone: Option<i32>,
    message: &[u8],
) -> Result<()> {
    let committer = committer.unwrap_or(DEFAULT_COMMITTER);
    let timestamp = timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp());
    let timezone = timezone.unwrap_or(0);

    conn.execute(
        "INSERT INTO reflog (ref_name, old_sha, new_sha, committer, timestamp, timezone, message) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![ref_name, old_sha, new_sha, committer, timestamp, timezone, message],
    )?;
    Ok(())
}

/// Read a ref's full history in append order (oldest first).
pub fn read(conn: &Connection, ref_name: &[u8]) -> Result<Vec<ReflogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT old_sha, new_sha, committer, timestamp, timezone, message \
         FROM reflog WHERE ref_name = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([ref_name], |row| {
        Ok(ReflogEntry {
            old_sha: row.get(0)?,
            new_sha: row.get(1)?,
            committer: row.get(2)?,
            timestamp: row.get(3)?,
            timezone: row.get(4)?,
            message: row.get(5)?,
        })
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_db;

    #[test]
    fn appended_entries_read_back_in_order() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();

        append(&conn, b"refs/heads/main", &[0; 20], &[1; 20], None, Some(1000), None, b"first").unwrap();
        append(&conn, b"refs/heads/main", &[1; 20], &[2; 20], None, Some(2000), None, b"second").unwrap();

        let entries = read(&conn, b"refs/heads/main").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, b"first");
        assert_eq!(entries[1].message, b"second");
        assert_eq!(entries[0].committer, DEFAULT_COMMITTER);
    }
}
