//! The historical `v3..v11` migration chain, ported statement-for-statement
//! from `_schema.py`. Each step runs in its own transaction and leaves the
//! database fully readable in the new shape; a failed step leaves the prior
//! version intact.

use crate::chunkref::pack_chunk_refs;
use crate::codec::{self, DictionaryKey, DictionaryRegistry};
use crate::error::Result;
use rusqlite::Connection;

fn set_schema_version(conn: &Connection, version: i64) -> Result<()> {
    conn.execute(
        "UPDATE metadata SET value = ?1 WHERE key = 'schema_version'",
        [version.to_string()],
    )?;
    Ok(())
}

/// Run every migration needed to bring a database at `from_version` up to
/// [`super::CURRENT_SCHEMA_VERSION`].
pub fn migrate_to_current(conn: &Connection, from_version: i64) -> Result<()> {
    let mut version = from_version;
    if version == 3 {
        migrate_v3_to_v4(conn)?;
        version = 4;
    }
    if version == 4 {
        migrate_v4_to_v5(conn)?;
        version = 5;
    }
    if version == 5 {
        migrate_v5_to_v6(conn)?;
        version = 6;
    }
    if version == 6 {
        migrate_v6_to_v7(conn)?;
        version = 7;
    }
    if version == 7 {
        migrate_v7_to_v8(conn)?;
        version = 8;
    }
    if version == 8 {
        migrate_v8_to_v9(conn)?;
        version = 9;
    }
    if version == 9 {
        migrate_v9_to_v10(conn)?;
        version = 10;
    }
    if version == 10 {
        migrate_v10_to_v11(conn)?;
    }
    Ok(())
}

/// Recreates `objects` to drop its `NOT NULL` on `data` (SQLite can't
/// `ALTER COLUMN`) and introduces the `chunks`/`object_chunks` tables.
pub fn migrate_v3_to_v4(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch("ALTER TABLE objects RENAME TO _objects_v3")?;
    tx.execute_batch(
        "CREATE TABLE objects (
            sha TEXT PRIMARY KEY NOT NULL,
            type_num INTEGER NOT NULL,
            data BLOB,
            total_size INTEGER,
            type_name TEXT GENERATED ALWAYS AS (
                CASE type_num
                    WHEN 1 THEN 'commit'
                    WHEN 2 THEN 'tree'
                    WHEN 3 THEN 'blob'
                    WHEN 4 THEN 'tag'
                END
            ) VIRTUAL,
            size_bytes INTEGER GENERATED ALWAYS AS (
                CASE WHEN data IS NOT NULL THEN length(data) ELSE total_size END
            ) VIRTUAL
        )",
    )?;
    tx.execute_batch(
        "INSERT INTO objects (sha, type_num, data)
         SELECT sha, type_num, data FROM _objects_v3",
    )?;
    tx.execute_batch("DROP TABLE _objects_v3")?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS chunks (
            chunk_sha TEXT PRIMARY KEY NOT NULL,
            data BLOB NOT NULL
        )",
    )?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS object_chunks (
            object_sha TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            chunk_sha TEXT NOT NULL,
            PRIMARY KEY (object_sha, chunk_index)
        )",
    )?;
    tx.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_object_chunks_chunk ON object_chunks (chunk_sha)",
    )?;

    set_schema_version(&tx, 4)?;
    tx.commit()?;
    Ok(())
}

/// Adds the `compression` column to `chunks` and seeds the default codec.
pub fn migrate_v4_to_v5(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch("ALTER TABLE chunks ADD COLUMN compression TEXT NOT NULL DEFAULT 'none'")?;
    tx.execute(
        "INSERT OR IGNORE INTO metadata (key, value) VALUES ('compression', 'none')",
        [],
    )?;
    set_schema_version(&tx, 5)?;
    tx.commit()?;
    Ok(())
}

/// Adds generated convenience columns to `objects`, `chunks`, and `reflog`.
pub fn migrate_v5_to_v6(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "ALTER TABLE objects ADD COLUMN \
         is_chunked INTEGER GENERATED ALWAYS AS (data IS NULL) VIRTUAL",
    )?;
    tx.execute_batch(
        "ALTER TABLE chunks ADD COLUMN \
         stored_size INTEGER GENERATED ALWAYS AS (length(data)) VIRTUAL",
    )?;
    tx.execute_batch(
        "ALTER TABLE reflog ADD COLUMN \
         old_sha_text TEXT GENERATED ALWAYS AS (cast(old_sha AS TEXT)) VIRTUAL",
    )?;
    tx.execute_batch(
        "ALTER TABLE reflog ADD COLUMN \
         new_sha_text TEXT GENERATED ALWAYS AS (cast(new_sha AS TEXT)) VIRTUAL",
    )?;
    tx.execute_batch(
        "ALTER TABLE reflog ADD COLUMN \
         committer_text TEXT GENERATED ALWAYS AS (cast(committer AS TEXT)) VIRTUAL",
    )?;
    tx.execute_batch(
        "ALTER TABLE reflog ADD COLUMN \
         datetime_text TEXT GENERATED ALWAYS AS (datetime(timestamp, 'unixepoch')) VIRTUAL",
    )?;
    set_schema_version(&tx, 6)?;
    tx.commit()?;
    Ok(())
}

/// Replaces the text-sha `object_chunks` join table with one keyed by the
/// integer rowids of `objects`/`chunks`.
pub fn migrate_v6_to_v7(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE object_chunks_new (
            object_id INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            chunk_id INTEGER NOT NULL,
            PRIMARY KEY (object_id, chunk_index)
        )",
    )?;
    tx.execute_batch(
        "INSERT INTO object_chunks_new (object_id, chunk_index, chunk_id)
         SELECT o.rowid, oc.chunk_index, c.rowid
         FROM object_chunks oc
         JOIN objects o ON o.sha = oc.object_sha
         JOIN chunks c ON c.chunk_sha = oc.chunk_sha",
    )?;
    tx.execute_batch("DROP INDEX IF EXISTS idx_object_chunks_chunk")?;
    tx.execute_batch("DROP TABLE object_chunks")?;
    tx.execute_batch("ALTER TABLE object_chunks_new RENAME TO object_chunks")?;
    tx.execute_batch("CREATE INDEX idx_object_chunks_chunk ON object_chunks (chunk_id)")?;
    set_schema_version(&tx, 7)?;
    tx.commit()?;
    Ok(())
}

/// Adds `compression` to `objects` and changes the generated `size_bytes`
/// column to read `total_size` instead of `length(data)`, since inline
/// objects may now be compressed.
pub fn migrate_v7_to_v8(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch("ALTER TABLE objects ADD COLUMN compression TEXT NOT NULL DEFAULT 'none'")?;
    tx.execute_batch(
        "UPDATE objects SET total_size = length(data) \
         WHERE data IS NOT NULL AND total_size IS NULL",
    )?;
    tx.execute_batch("ALTER TABLE objects RENAME TO _objects_v7")?;
    tx.execute_batch(
        "CREATE TABLE objects (
            sha TEXT PRIMARY KEY NOT NULL,
            type_num INTEGER NOT NULL,
            data BLOB,
            total_size INTEGER,
            compression TEXT NOT NULL DEFAULT 'none',
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
    )?;
    tx.execute_batch(
        "INSERT INTO objects (sha, type_num, data, total_size, compression)
         SELECT sha, type_num, data, total_size, compression FROM _objects_v7",
    )?;
    tx.execute_batch(
        "UPDATE object_chunks SET object_id = (
            SELECT o_new.rowid FROM objects o_new
            JOIN _objects_v7 o_old ON o_old.sha = o_new.sha
            WHERE o_old.rowid = object_chunks.object_id
        )",
    )?;
    tx.execute_batch("DROP TABLE _objects_v7")?;
    set_schema_version(&tx, 8)?;
    tx.commit()?;
    Ok(())
}

/// Replaces `object_chunks` with a packed `chunk_refs` BLOB column on
/// `objects`, storing each chunked object's ordered chunk rowids as
/// little-endian 8-byte unsigned integers (re-packed to the compact
/// delta-varint form by [`migrate_v9_to_v10`]).
pub fn migrate_v8_to_v9(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch("ALTER TABLE objects ADD COLUMN chunk_refs BLOB")?;

    let rows: Vec<(i64, i64)> = {
        let mut stmt = tx.prepare(
            "SELECT object_id, chunk_id FROM object_chunks ORDER BY object_id, chunk_index",
        )?;
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?
    };

    let mut current_obj: Option<i64> = None;
    let mut chunk_ids: Vec<i64> = Vec::new();
    for (obj_id, chunk_id) in rows {
        if let Some(cur) = current_obj {
            if obj_id != cur {
                tx.execute(
                    "UPDATE objects SET chunk_refs = ?1 WHERE rowid = ?2",
                    rusqlite::params![pack_fixed_le(&chunk_ids), cur],
                )?;
                chunk_ids.clear();
            }
        }
        current_obj = Some(obj_id);
        chunk_ids.push(chunk_id);
    }
    if let Some(cur) = current_obj {
        if !chunk_ids.is_empty() {
            tx.execute(
                "UPDATE objects SET chunk_refs = ?1 WHERE rowid = ?2",
                rusqlite::params![pack_fixed_le(&chunk_ids), cur],
            )?;
        }
    }

    tx.execute_batch("DROP INDEX IF EXISTS idx_object_chunks_chunk")?;
    tx.execute_batch("DROP TABLE IF EXISTS object_chunks")?;
    set_schema_version(&tx, 9)?;
    tx.commit()?;
    Ok(())
}

fn pack_fixed_le(ids: &[i64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ids.len() * 8);
    for &id in ids {
        out.extend_from_slice(&(id as u64).to_le_bytes());
    }
    out
}

fn unpack_fixed_le(data: &[u8]) -> Vec<i64> {
    data.chunks_exact(8)
        .map(|c| u64::from_le_bytes(c.try_into().unwrap()) as i64)
        .collect()
}

/// Converts TEXT sha columns to BLOB on both `objects` and `chunks`,
/// re-encoding `chunk_refs` from fixed 8-byte little-endian integers to the
/// delta-zigzag-varint form, preserving rowids so the references stay
/// valid.
pub fn migrate_v9_to_v10(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE chunks_new (
            chunk_sha BLOB PRIMARY KEY NOT NULL,
            data BLOB NOT NULL,
            compression TEXT NOT NULL DEFAULT 'none',
            chunk_sha_hex TEXT GENERATED ALWAYS AS (lower(hex(chunk_sha))) VIRTUAL,
            stored_size INTEGER GENERATED ALWAYS AS (length(data)) VIRTUAL
        )",
    )?;
    {
        let rows: Vec<(i64, String, Vec<u8>, String)> = {
            let mut stmt =
                tx.prepare("SELECT rowid, chunk_sha, data, compression FROM chunks")?;
            stmt.query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        for (rowid, chunk_sha_text, data, compression) in rows {
            let chunk_sha_bin = hex::decode(&chunk_sha_text)
                .map_err(|e| crate::error::Error::Corruption(format!("bad chunk sha hex: {e}")))?;
            tx.execute(
                "INSERT INTO chunks_new (rowid, chunk_sha, data, compression) \
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![rowid, chunk_sha_bin, data, compression],
            )?;
        }
    }
    tx.execute_batch("DROP TABLE chunks")?;
    tx.execute_batch("ALTER TABLE chunks_new RENAME TO chunks")?;

    tx.execute_batch(
        "CREATE TABLE objects_new (
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
    )?;
    {
        let rows: Vec<(String, i64, Option<Vec<u8>>, Option<Vec<u8>>, Option<i64>, String)> = {
            let mut stmt = tx.prepare(
                "SELECT sha, type_num, data, chunk_refs, total_size, compression FROM objects",
            )?;
            stmt.query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        for (sha_text, type_num, data, chunk_refs_blob, total_size, compression) in rows {
            let sha_bin = hex::decode(&sha_text)
                .map_err(|e| crate::error::Error::Corruption(format!("bad object sha hex: {e}")))?;
            let new_chunk_refs = chunk_refs_blob
                .map(|blob| pack_chunk_refs(&unpack_fixed_le(&blob)));
            tx.execute(
                "INSERT INTO objects_new (sha, type_num, data, chunk_refs, total_size, compression) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![sha_bin, type_num, data, new_chunk_refs, total_size, compression],
            )?;
        }
    }
    tx.execute_batch("DROP TABLE objects")?;
    tx.execute_batch("ALTER TABLE objects_new RENAME TO objects")?;

    set_schema_version(&tx, 10)?;
    tx.commit()?;
    Ok(())
}

/// Adds `raw_size` to `chunks` for range reads without decompression,
/// backfilling uncompressed chunks via SQL and compressed chunks by
/// decompressing each (loading any legacy dictionaries from `named_files`
/// first, so zstd frames trained under them still decode).
pub fn migrate_v10_to_v11(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch("ALTER TABLE chunks ADD COLUMN raw_size INTEGER")?;
    tx.execute_batch("UPDATE chunks SET raw_size = length(data) WHERE compression = 'none'")?;

    let compressed_rows: Vec<(i64, Vec<u8>, String)> = {
        let mut stmt =
            tx.prepare("SELECT rowid, data, compression FROM chunks WHERE compression != 'none'")?;
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?
    };

    if !compressed_rows.is_empty() {
        let mut dictionaries = DictionaryRegistry::empty();
        for key in DictionaryKey::all() {
            let contents: Option<Vec<u8>> = tx
                .query_row(
                    "SELECT contents FROM named_files WHERE path = ?1",
                    [key.named_file_path()],
                    |row| row.get(0),
                )
                .ok();
            if let Some(contents) = contents {
                dictionaries.register(key, contents);
            }
        }

        for (rowid, data, compression) in compressed_rows {
            let raw = codec::decompress(&data, &compression, &dictionaries)?;
            tx.execute(
                "UPDATE chunks SET raw_size = ?1 WHERE rowid = ?2",
                rusqlite::params![raw.len() as i64, rowid],
            )?;
        }
    }

    set_schema_version(&tx, 11)?;
    tx.commit()?;
    Ok(())
}
