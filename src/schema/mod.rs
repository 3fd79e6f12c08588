//! Schema creation, PRAGMA setup, and version migration.
//!
//! Ported from `_schema.py`: `init_db` creates the current schema directly;
//! [`migrations`] carries the historical `v3..v11` chain forward so a
//! database created by an earlier schema generation still opens and
//! migrates in place.

pub mod migrations;

use crate::error::Result;
use rusqlite::Connection;

/// The schema version this crate reads and writes. A database whose
/// `metadata.schema_version` exceeds this is fatal ("unsupported schema
/// version"); one below it is migrated forward on open.
pub const CURRENT_SCHEMA_VERSION: i64 = 11;

const PRAGMAS: &[&str] = &[
    "PRAGMA journal_mode=WAL",
    "PRAGMA synchronous=NORMAL",
    "PRAGMA busy_timeout=5000",
];

const CREATE_TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS objects (
        sha BLOB PRIMARY KEY NOT NULL,
        type_num INTEGER NOT NULL,
        data BLOB,
        chunk_refs BLOB,
        total_size INTEGER,
        compression TEXT NOT NULL DEFAULT 'none',
        sha_hex TEXT GENERATED ALWAYS AS (lower(hex(sha))) VIRTUAL,
        type_name TEXT GENERATED ALWAYS AS (
            CASE type_num
                WHEN 1 THEN 'commit'
                WHEN 2 THEN 'tree'
                WHEN 3 THEN 'blob'
                WHEN 4 THEN 'tag'
            END
        ) VIRTUAL,
        size_bytes INTEGER GENERATED ALWAYS AS (total_size) VIRTUAL,
        is_chunked INTEGER GENERATED ALWAYS AS (data IS NULL) VIRTUAL
    )",
    "CREATE TABLE IF NOT EXISTS chunks (
        chunk_sha BLOB PRIMARY KEY NOT NULL,
        data BLOB NOT NULL,
        compression TEXT NOT NULL DEFAULT 'none',
        raw_size INTEGER,
        chunk_sha_hex TEXT GENERATED ALWAYS AS (lower(hex(chunk_sha))) VIRTUAL,
        stored_size INTEGER GENERATED ALWAYS AS (length(data)) VIRTUAL
    )",
    "CREATE TABLE IF NOT EXISTS refs (
        name BLOB PRIMARY KEY NOT NULL,
        value BLOB NOT NULL,
        name_hex TEXT GENERATED ALWAYS AS (hex(name)) VIRTUAL,
        value_hex TEXT GENERATED ALWAYS AS (hex(value)) VIRTUAL,
        name_text TEXT GENERATED ALWAYS AS (cast(name AS TEXT)) VIRTUAL,
        value_text TEXT GENERATED ALWAYS AS (cast(value AS TEXT)) VIRTUAL
    )",
    "CREATE TABLE IF NOT EXISTS peeled_refs (
        name BLOB PRIMARY KEY NOT NULL,
        value BLOB NOT NULL,
        name_hex TEXT GENERATED ALWAYS AS (hex(name)) VIRTUAL,
        value_hex TEXT GENERATED ALWAYS AS (hex(value)) VIRTUAL,
        name_text TEXT GENERATED ALWAYS AS (cast(name AS TEXT)) VIRTUAL,
        value_text TEXT GENERATED ALWAYS AS (cast(value AS TEXT)) VIRTUAL
    )",
    "CREATE TABLE IF NOT EXISTS named_files (
        path TEXT PRIMARY KEY NOT NULL,
        contents BLOB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS metadata (
        key TEXT PRIMARY KEY NOT NULL,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS reflog (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ref_name BLOB NOT NULL,
        old_sha BLOB NOT NULL,
        new_sha BLOB NOT NULL,
        committer BLOB NOT NULL,
        timestamp INTEGER NOT NULL,
        timezone INTEGER NOT NULL,
        message BLOB NOT NULL,
        ref_name_text TEXT GENERATED ALWAYS AS (cast(ref_name AS TEXT)) VIRTUAL,
        old_sha_text TEXT GENERATED ALWAYS AS (cast(old_sha AS TEXT)) VIRTUAL,
        new_sha_text TEXT GENERATED ALWAYS AS (cast(new_sha AS TEXT)) VIRTUAL,
        committer_text TEXT GENERATED ALWAYS AS (cast(committer AS TEXT)) VIRTUAL,
        message_text TEXT GENERATED ALWAYS AS (cast(message AS TEXT)) VIRTUAL,
        datetime_text TEXT GENERATED ALWAYS AS (datetime(timestamp, 'unixepoch')) VIRTUAL
    )",
    "CREATE INDEX IF NOT EXISTS idx_reflog_ref ON reflog (ref_name, id)",
];

/// Apply the connection-scoped PRAGMAs this schema relies on (WAL
/// journaling, relaxed fsync durability, and a busy timeout so contended
/// writers wait rather than fail immediately).
pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    for pragma in PRAGMAS {
        conn.execute_batch(pragma)?;
    }
    Ok(())
}

/// Create the current schema on a fresh database and seed required
/// metadata (`schema_version`, default `compression`).
pub fn init_db(conn: &Connection) -> Result<()> {
    apply_pragmas(conn)?;
    for stmt in CREATE_TABLES {
        conn.execute_batch(stmt)?;
    }
    conn.execute(
        "INSERT OR IGNORE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [CURRENT_SCHEMA_VERSION.to_string()],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO metadata (key, value) VALUES ('compression', 'none')",
        [],
    )?;
    Ok(())
}
