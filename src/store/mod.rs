//! The object store: insert, lookup, full read, byte-range read, iteration,
//! and content search over Git objects persisted as rows.
//!
//! Ported from `object_store.py`'s `SqliteObjectStore`. Chunked storage and
//! inline storage share one table; which path a row takes is recorded by
//! `data IS NULL` (the `is_chunked` generated column).

pub mod traits;

pub use traits::{ObjectReader, ObjectWriter};

use crate::chunker::chunk_blob;
use crate::chunkref::{pack_chunk_refs, unpack_chunk_refs};
use crate::codec::{self, DictionaryKey, DictionaryRegistry};
use crate::error::{Error, Result};
use crate::ids::ObjectId;
use crate::types::{ObjectType, RawObject};
use rusqlite::Connection;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

fn dict_key_for_inline(type_num: ObjectType) -> Option<DictionaryKey> {
    match type_num {
        ObjectType::Commit => Some(DictionaryKey::Commit),
        ObjectType::Tree => Some(DictionaryKey::Tree),
        ObjectType::Blob | ObjectType::Tag => None,
    }
}

/// Object store backed by a SQLite database. Holds a shared handle to the
/// same connection the reference container uses, plus its own runtime
/// compression mode and loaded dictionary registry — both mutated through
/// `&self` (via `RefCell`) so the store can be handed out as `&dyn
/// ObjectReader`/`&dyn ObjectWriter` without forcing callers to hold a
/// unique reference.
pub struct ObjectStore {
    conn: Rc<Connection>,
    compression: RefCell<String>,
    dictionaries: RefCell<DictionaryRegistry>,
}

impl ObjectStore {
    pub fn new(conn: Rc<Connection>) -> Result<Self> {
        let compression: String = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'compression'",
                [],
                |row| row.get(0),
            )
            .unwrap_or_else(|_| "none".to_string());

        let mut dictionaries = DictionaryRegistry::empty();
        for key in DictionaryKey::all() {
            let contents: Option<Vec<u8>> = conn
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

        Ok(Self {
            conn,
            compression: RefCell::new(compression),
            dictionaries: RefCell::new(dictionaries),
        })
    }

    pub fn compression_method(&self) -> String {
        self.compression.borrow().clone()
    }

    pub fn set_compression_method(&self, method: &str) {
        *self.compression.borrow_mut() = method.to_string();
    }

    pub fn dictionaries(&self) -> std::cell::Ref<'_, DictionaryRegistry> {
        self.dictionaries.borrow()
    }

    pub fn dictionaries_mut(&self) -> std::cell::RefMut<'_, DictionaryRegistry> {
        self.dictionaries.borrow_mut()
    }

    fn compress(&self, data: &[u8], dict_key: Option<DictionaryKey>) -> Result<Vec<u8>> {
        let method = self.compression.borrow().clone();
        codec::compress(data, &method, dict_key, &self.dictionaries.borrow())
    }

    fn decompress(&self, data: &[u8], method: &str) -> Result<Vec<u8>> {
        codec::decompress(data, method, &self.dictionaries.borrow())
    }

    pub fn iter_ids(&self) -> Result<Vec<ObjectId>> {
        let mut stmt = self.conn.prepare("SELECT sha FROM objects")?;
        let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            let bytes = row?;
            ids.push(ObjectId::try_from(bytes.as_slice())?);
        }
        Ok(ids)
    }

    /// Insert a single object without starting its own transaction — used
    /// both by [`ObjectWriter::insert`] and by bulk ingestion, which wraps
    /// many calls in one transaction.
    fn insert_one(&self, obj: &RawObject) -> Result<ObjectId> {
        let id = ObjectId::compute(obj.type_num.name(), &obj.data);
        let sha_bin = id.as_bytes().to_vec();

        if let Some(chunks) = (obj.type_num == ObjectType::Blob)
            .then(|| chunk_blob(&obj.data))
            .flatten()
        {
            let mut chunk_rowids = Vec::with_capacity(chunks.len());
            for (chunk_id, chunk_data) in &chunks {
                let stored = self.compress(chunk_data, Some(DictionaryKey::Chunk))?;
                let method = self.compression.borrow().clone();
                self.conn.execute(
                    "INSERT OR IGNORE INTO chunks (chunk_sha, data, compression, raw_size) \
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![chunk_id.as_bytes().to_vec(), stored, method, chunk_data.len() as i64],
                )?;
                let rowid: i64 = self.conn.query_row(
                    "SELECT rowid FROM chunks WHERE chunk_sha = ?1",
                    [chunk_id.as_bytes().to_vec()],
                    |row| row.get(0),
                )?;
                chunk_rowids.push(rowid);
            }
            let packed = pack_chunk_refs(&chunk_rowids);
            self.conn.execute(
                "INSERT OR REPLACE INTO objects (sha, type_num, data, chunk_refs, total_size, compression) \
                 VALUES (?1, ?2, NULL, ?3, ?4, 'none')",
                rusqlite::params![sha_bin, obj.type_num.as_i64(), packed, obj.data.len() as i64],
            )?;
        } else {
            let dict_key = dict_key_for_inline(obj.type_num);
            let stored = self.compress(&obj.data, dict_key)?;
            let method = self.compression.borrow().clone();
            self.conn.execute(
                "INSERT OR REPLACE INTO objects (sha, type_num, data, chunk_refs, total_size, compression) \
                 VALUES (?1, ?2, ?3, NULL, ?4, ?5)",
                rusqlite::params![sha_bin, obj.type_num.as_i64(), stored, obj.data.len() as i64, method],
            )?;
        }

        Ok(id)
    }

    /// Insert every object in `objects` inside a single transaction, so a
    /// pack ingest either lands entirely or not at all.
    pub fn insert_all<'a>(&self, objects: impl IntoIterator<Item = &'a RawObject>) -> Result<Vec<ObjectId>> {
        let mut ids = Vec::new();
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        for obj in objects {
            match self.insert_one(obj) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    self.conn.execute_batch("ROLLBACK")?;
                    return Err(e);
                }
            }
        }
        self.conn.execute_batch("COMMIT")?;
        Ok(ids)
    }

    fn fetch_chunk_bodies(&self, rowids: &[i64]) -> Result<std::collections::HashMap<i64, (Vec<u8>, String)>> {
        if rowids.is_empty() {
            return Ok(std::collections::HashMap::new());
        }
        let placeholders = vec!["?"; rowids.len()].join(",");
        let sql = format!("SELECT rowid, data, compression FROM chunks WHERE rowid IN ({placeholders})");
        let mut stmt = self.conn.prepare(&sql)?;
        let params = rusqlite::params_from_iter(rowids.iter());
        let rows = stmt.query_map(params, |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?, row.get::<_, String>(2)?))
        })?;
        let mut map = std::collections::HashMap::new();
        for row in rows {
            let (rowid, data, compression) = row?;
            map.insert(rowid, (data, compression));
        }
        Ok(map)
    }

    /// Verify a reassembled chunk's raw bytes still hash to the key they
    /// were stored under. Per spec §7, a mismatch is fatal corruption;
    /// `debug_assertions`-only, as the spec only asks implementations to
    /// verify "in debug builds".
    #[cfg(debug_assertions)]
    fn verify_chunk_hash(&self, rowid: i64, decompressed: &[u8]) -> Result<()> {
        let stored_sha: Vec<u8> = self.conn.query_row(
            "SELECT chunk_sha FROM chunks WHERE rowid = ?1",
            [rowid],
            |row| row.get(0),
        )?;
        let actual = crate::ids::ChunkId::compute(decompressed);
        if actual.as_bytes().as_slice() != stored_sha.as_slice() {
            return Err(Error::Corruption(format!(
                "chunk rowid {rowid} failed hash verification on reassembly"
            )));
        }
        Ok(())
    }

    #[cfg(not(debug_assertions))]
    fn verify_chunk_hash(&self, _rowid: i64, _decompressed: &[u8]) -> Result<()> {
        Ok(())
    }

    pub fn search_content(&self, query: &str, limit: Option<usize>) -> Result<Vec<ObjectId>> {
        let mut results: BTreeSet<Vec<u8>> = BTreeSet::new();
        let query_bytes = query.as_bytes();
        let escaped = escape_like(query);

        // 1. Inline blobs, uncompressed: SQL LIKE.
        {
            let mut stmt = self.conn.prepare(
                "SELECT sha FROM objects \
                 WHERE data IS NOT NULL AND type_num = 3 AND compression = 'none' \
                 AND CAST(data AS TEXT) LIKE ?1 ESCAPE '\\'",
            )?;
            let pattern = format!("%{escaped}%");
            let rows = stmt.query_map([pattern], |row| row.get::<_, Vec<u8>>(0))?;
            for row in rows {
                results.insert(row?);
            }
        }

        // 2. Inline blobs, compressed: decompress and scan.
        {
            let mut stmt = self.conn.prepare(
                "SELECT sha, data, compression FROM objects \
                 WHERE data IS NOT NULL AND type_num = 3 AND compression != 'none'",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?, row.get::<_, String>(2)?))
            })?;
            for row in rows {
                let (sha, data, compression) = row?;
                if results.contains(&sha) {
                    continue;
                }
                let decompressed = self.decompress(&data, &compression)?;
                if contains_subslice(&decompressed, query_bytes) {
                    results.insert(sha);
                }
            }
        }

        // 3. Candidate matching chunk rowids: uncompressed via LIKE, compressed via scan.
        let mut candidate_chunk_rowids: BTreeSet<i64> = BTreeSet::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT rowid FROM chunks WHERE compression = 'none' \
                 AND CAST(data AS TEXT) LIKE ?1 ESCAPE '\\'",
            )?;
            let pattern = format!("%{escaped}%");
            let rows = stmt.query_map([pattern], |row| row.get::<_, i64>(0))?;
            for row in rows {
                candidate_chunk_rowids.insert(row?);
            }
        }
        {
            let mut stmt = self
                .conn
                .prepare("SELECT rowid, data, compression FROM chunks WHERE compression != 'none'")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?, row.get::<_, String>(2)?))
            })?;
            for row in rows {
                let (rowid, data, compression) = row?;
                let decompressed = self.decompress(&data, &compression)?;
                if contains_subslice(&decompressed, query_bytes) {
                    candidate_chunk_rowids.insert(rowid);
                }
            }
        }

        // 4. Chunked objects: single-chunk hits, then boundary-span scan.
        {
            let mut stmt = self.conn.prepare(
                "SELECT sha, chunk_refs FROM objects WHERE chunk_refs IS NOT NULL AND type_num = 3",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?;
            for row in rows {
                let (sha, chunk_refs) = row?;
                if results.contains(&sha) {
                    continue;
                }
                let rowids = unpack_chunk_refs(&chunk_refs);
                if rowids.iter().any(|r| candidate_chunk_rowids.contains(r)) {
                    results.insert(sha);
                    continue;
                }
                if query_bytes.len() > 1 && rowids.len() > 1 {
                    let overlap = query_bytes.len() - 1;
                    let mut prev_tail: Vec<u8> = Vec::new();
                    let mut found = false;
                    for rid in &rowids {
                        let (data, compression): (Vec<u8>, String) = self.conn.query_row(
                            "SELECT data, compression FROM chunks WHERE rowid = ?1",
                            [*rid],
                            |row| Ok((row.get(0)?, row.get(1)?)),
                        )?;
                        let chunk_data = self.decompress(&data, &compression)?;
                        if !prev_tail.is_empty() {
                            let head_len = overlap.min(chunk_data.len());
                            let mut window = prev_tail.clone();
                            window.extend_from_slice(&chunk_data[..head_len]);
                            if contains_subslice(&window, query_bytes) {
                                found = true;
                                break;
                            }
                        }
                        let tail_len = overlap.min(chunk_data.len());
                        prev_tail = chunk_data[chunk_data.len() - tail_len..].to_vec();
                    }
                    if found {
                        results.insert(sha);
                    }
                }
            }
        }

        let mut ids: Vec<ObjectId> = results
            .into_iter()
            .map(|bytes| ObjectId::try_from(bytes.as_slice()))
            .collect::<Result<Vec<_>>>()?;
        ids.sort();
        if let Some(limit) = limit {
            ids.truncate(limit);
        }
        Ok(ids)
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

impl ObjectReader for ObjectStore {
    fn get_raw(&self, id: ObjectId) -> Result<RawObject> {
        let row: Option<(i64, Option<Vec<u8>>, String, Option<Vec<u8>>)> = self
            .conn
            .query_row(
                "SELECT type_num, data, compression, chunk_refs FROM objects WHERE sha = ?1",
                [id.as_bytes().to_vec()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .ok();
        let (type_num, data, compression, chunk_refs) =
            row.ok_or_else(|| Error::MissingObject(id.to_hex()))?;
        let type_num = ObjectType::from_i64(type_num)?;

        if let Some(data) = data {
            let raw = self.decompress(&data, &compression)?;
            return Ok(RawObject::new(type_num, raw));
        }

        let chunk_refs = chunk_refs.ok_or_else(|| {
            tracing::error!(id = %id, "object row has neither data nor chunk_refs");
            Error::Corruption(format!("object {} has neither data nor chunk_refs", id.to_hex()))
        })?;
        let rowids = unpack_chunk_refs(&chunk_refs);
        let bodies = self.fetch_chunk_bodies(&rowids)?;
        let mut raw = Vec::new();
        for rid in &rowids {
            let (data, compression) = bodies.get(rid).ok_or_else(|| {
                tracing::error!(id = %id, rowid = rid, "missing chunk row during reassembly");
                Error::Corruption(format!("missing chunk rowid {rid}"))
            })?;
            let decompressed = self.decompress(data, compression)?;
            self.verify_chunk_hash(*rid, &decompressed)?;
            raw.extend_from_slice(&decompressed);
        }
        Ok(RawObject::new(type_num, raw))
    }

    fn get_raw_range(&self, id: ObjectId, offset: u64, length: u64) -> Result<(ObjectType, Vec<u8>)> {
        let row: Option<(i64, Option<Vec<u8>>, String, Option<Vec<u8>>, Option<i64>)> = self
            .conn
            .query_row(
                "SELECT type_num, data, compression, chunk_refs, total_size FROM objects WHERE sha = ?1",
                [id.as_bytes().to_vec()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .ok();
        let (type_num, data, compression, chunk_refs, total_size) =
            row.ok_or_else(|| Error::MissingObject(id.to_hex()))?;
        let type_num = ObjectType::from_i64(type_num)?;

        if let Some(data) = data {
            let raw = self.decompress(&data, &compression)?;
            let start = (offset as usize).min(raw.len());
            let end = start.saturating_add(length as usize).min(raw.len());
            return Ok((type_num, raw[start..end].to_vec()));
        }

        let chunk_refs = chunk_refs.unwrap_or_default();
        let rowids = unpack_chunk_refs(&chunk_refs);
        let total_size = total_size.unwrap_or(0) as u64;
        if rowids.is_empty() || offset >= total_size {
            return Ok((type_num, Vec::new()));
        }

        let placeholders = vec!["?"; rowids.len()].join(",");
        let sql = format!("SELECT rowid, raw_size FROM chunks WHERE rowid IN ({placeholders})");
        let mut stmt = self.conn.prepare(&sql)?;
        let params = rusqlite::params_from_iter(rowids.iter());
        let rows = stmt.query_map(params, |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
        let mut size_by_rowid = std::collections::HashMap::new();
        for row in rows {
            let (rowid, raw_size) = row?;
            size_by_rowid.insert(rowid, raw_size as u64);
        }

        let mut cumulative = vec![0u64];
        for rid in &rowids {
            let size = *size_by_rowid
                .get(rid)
                .ok_or_else(|| Error::Corruption(format!("missing raw_size for chunk rowid {rid}")))?;
            cumulative.push(cumulative.last().unwrap() + size);
        }

        let end = (offset + length).min(*cumulative.last().unwrap());
        if offset >= end {
            return Ok((type_num, Vec::new()));
        }

        let mut first_chunk = 0usize;
        for i in 0..rowids.len() {
            if cumulative[i + 1] > offset {
                first_chunk = i;
                break;
            }
        }
        let mut last_chunk = first_chunk;
        for i in first_chunk..rowids.len() {
            last_chunk = i;
            if cumulative[i + 1] >= end {
                break;
            }
        }

        let needed_rowids = &rowids[first_chunk..=last_chunk];
        let bodies = self.fetch_chunk_bodies(needed_rowids)?;
        let mut assembled = Vec::new();
        for rid in needed_rowids {
            let (data, compression) = bodies
                .get(rid)
                .ok_or_else(|| Error::Corruption(format!("missing chunk rowid {rid}")))?;
            let decompressed = self.decompress(data, compression)?;
            self.verify_chunk_hash(*rid, &decompressed)?;
            assembled.extend_from_slice(&decompressed);
        }

        let slice_start = (offset - cumulative[first_chunk]) as usize;
        let slice_end = slice_start + (end - offset) as usize;
        Ok((type_num, assembled[slice_start..slice_end].to_vec()))
    }

    fn get_object_size(&self, id: ObjectId) -> Result<u64> {
        let size: Option<i64> = self
            .conn
            .query_row(
                "SELECT size_bytes FROM objects WHERE sha = ?1",
                [id.as_bytes().to_vec()],
                |row| row.get(0),
            )
            .ok();
        size.map(|s| s as u64)
            .ok_or_else(|| Error::MissingObject(id.to_hex()))
    }

    fn contains(&self, id: ObjectId) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM objects WHERE sha = ?1", [id.as_bytes().to_vec()], |row| {
                row.get(0)
            })
            .ok();
        Ok(found.is_some())
    }
}

impl ObjectWriter for ObjectStore {
    fn insert(&self, obj: &RawObject) -> Result<ObjectId> {
        self.insert_one(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_db;

    fn open_store() -> ObjectStore {
        let conn = Rc::new(Connection::open_in_memory().unwrap());
        init_db(&conn).unwrap();
        ObjectStore::new(conn).unwrap()
    }

    #[test]
    fn inserted_inline_object_round_trips() {
        let store = open_store();
        let obj = RawObject::new(ObjectType::Blob, b"hello world\n".to_vec());
        let id = store.insert(&obj).unwrap();
        let fetched = store.get_raw(id).unwrap();
        assert_eq!(fetched.data, obj.data);
        assert_eq!(fetched.type_num, ObjectType::Blob);
    }

    #[test]
    fn inserted_chunked_object_round_trips() {
        let store = open_store();
        let mut data = Vec::new();
        for n in 0..500 {
            data.extend_from_slice(format!("line {n} of the file\n").as_bytes());
        }
        let obj = RawObject::new(ObjectType::Blob, data.clone());
        let id = store.insert(&obj).unwrap();

        let is_chunked: i64 = store
            .conn
            .query_row("SELECT is_chunked FROM objects WHERE sha = ?1", [id.as_bytes().to_vec()], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(is_chunked, 1);

        let fetched = store.get_raw(id).unwrap();
        assert_eq!(fetched.data, data);
    }

    #[test]
    fn dedup_shares_chunks_across_objects() {
        let store = open_store();
        let shared = vec![b'S'; 20_000];
        let mut a = shared.clone();
        a.extend_from_slice(b"unique-a-tail-data-that-is-long-enough-to-matter");
        let mut b = shared;
        b.extend_from_slice(b"unique-b-tail-data-that-is-long-enough-to-differ");

        store.insert(&RawObject::new(ObjectType::Blob, a)).unwrap();
        store.insert(&RawObject::new(ObjectType::Blob, b)).unwrap();

        let chunk_count: i64 = store.conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0)).unwrap();
        let total_refs: i64 = store
            .conn
            .query_row(
                "SELECT SUM(length(chunk_refs)) FROM objects WHERE chunk_refs IS NOT NULL",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);
        assert!(chunk_count > 0);
        assert!(total_refs > 0);
    }

    #[test]
    fn range_read_matches_full_read_slice() {
        let store = open_store();
        let mut data = vec![b'A'; 5000];
        data.extend_from_slice(b"NEEDLE");
        data.extend_from_slice(&vec![b'B'; 50_000]);
        let id = store.insert(&RawObject::new(ObjectType::Blob, data.clone())).unwrap();

        let (_, slice) = store.get_raw_range(id, 5000, 6).unwrap();
        assert_eq!(slice, b"NEEDLE");

        let full = store.get_raw(id).unwrap();
        assert_eq!(slice, full.data[5000..5006]);
    }

    #[test]
    fn range_read_clamps_past_end() {
        let store = open_store();
        let mut data = Vec::new();
        for n in 0..500 {
            data.extend_from_slice(format!("line {n} of the file\n").as_bytes());
        }
        let id = store.insert(&RawObject::new(ObjectType::Blob, data.clone())).unwrap();

        let (_, past_end) = store.get_raw_range(id, data.len() as u64 + 5, 10).unwrap();
        assert!(past_end.is_empty());

        let (_, tail) = store.get_raw_range(id, data.len() as u64 - 3, 100).unwrap();
        assert_eq!(tail, &data[data.len() - 3..]);
    }

    #[test]
    fn missing_object_is_an_error() {
        let store = open_store();
        let bogus = ObjectId::compute("blob", b"never inserted");
        assert!(store.get_raw(bogus).is_err());
        assert!(!store.contains(bogus).unwrap());
    }

    #[test]
    fn search_content_finds_inline_and_chunked_matches() {
        let store = open_store();
        store
            .insert(&RawObject::new(ObjectType::Blob, b"the needle is here".to_vec()))
            .unwrap();

        let mut big = vec![b'x'; 5000];
        big.extend_from_slice(b"a-distinct-needle-token");
        big.extend_from_slice(&vec![b'y'; 5000]);
        store.insert(&RawObject::new(ObjectType::Blob, big)).unwrap();

        let hits = store.search_content("needle", None).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    #[cfg_attr(not(debug_assertions), ignore)]
    fn tampered_chunk_bytes_fail_hash_verification_on_reassembly() {
        let store = open_store();
        let mut data = Vec::new();
        for n in 0..500 {
            data.extend_from_slice(format!("line {n} of the file\n").as_bytes());
        }
        let id = store.insert(&RawObject::new(ObjectType::Blob, data)).unwrap();

        store
            .conn
            .execute("UPDATE chunks SET data = X'00' WHERE rowid = 1", [])
            .unwrap();

        let err = store.get_raw(id).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }
}
