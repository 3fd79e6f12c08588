//! The repository façade: opens/creates the backing SQLite file, owns the
//! shared connection handle, and exposes the object store, reference
//! container, named files, and dictionary training as one cohesive API.
//!
//! Ported from `repo.py`'s `SqliteRepo`. Always bare — no working tree, no
//! index, matching spec's non-goals.

pub mod config;

pub use config::GitConfig;

use crate::codec::DictionaryKey;
use crate::error::{Error, Result};
use crate::refs::RefsContainer;
use crate::schema::{self, migrations, CURRENT_SCHEMA_VERSION};
use crate::store::ObjectStore;
use crate::types::ObjectType;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Runtime knobs threaded through `init_bare`/`open_with_options`, in the
/// same spirit as the teacher's plain, `Default`-able `Config` struct: no
/// external config file format backs this, only explicit construction.
/// `busy_timeout_ms` is connection-scoped (SQLite never persists a PRAGMA to
/// the file) so it must be supplied again on every open to take effect, per
/// spec §5's "10s recommended under contention" guidance. The chunking
/// threshold is deliberately not a knob here: spec §4.1 lists it among the
/// chunker's fixed constants, not a per-repository setting.
#[derive(Debug, Clone)]
pub struct RepositoryOptions {
    pub busy_timeout_ms: u32,
    pub default_compression: String,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5000,
            default_compression: "none".to_string(),
        }
    }
}

/// A bare Git repository backed by a single SQLite database file.
pub struct Repository {
    conn: Rc<Connection>,
    path: PathBuf,
    object_store: ObjectStore,
    refs: RefsContainer,
    config: GitConfig,
}

impl Repository {
    /// Create a new repository at `db_path`, seeding the current schema and
    /// the standard bare-repository named files (`description`, `HEAD`,
    /// `config`).
    pub fn init_bare(db_path: impl AsRef<Path>, options: &RepositoryOptions) -> Result<Self> {
        let db_path = db_path.as_ref();
        {
            let conn = Connection::open(db_path)?;
            schema::init_db(&conn)?;
            conn.execute(
                "UPDATE metadata SET value = ?1 WHERE key = 'compression'",
                [&options.default_compression],
            )?;
        }

        let repo = Self::open_with_options(db_path, options)?;
        repo.put_named_file("description", b"Unnamed repository")?;
        repo.put_named_file("HEAD", b"ref: refs/heads/master\n")?;

        let mut config = GitConfig::new();
        config.set("core", None, "bare", "true");
        config.set("core", None, "repositoryformatversion", "0");
        repo.put_named_file("config", &config.to_bytes())?;

        Ok(repo)
    }

    /// Open an existing repository with the default [`RepositoryOptions`]
    /// (in particular, the 5s default busy timeout). Migrates its schema
    /// forward if it predates [`CURRENT_SCHEMA_VERSION`].
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(db_path, &RepositoryOptions::default())
    }

    /// Open an existing repository, applying `options.busy_timeout_ms` to
    /// this connection (spec §5 recommends 10s under contention, vs. the 5s
    /// default) and migrating its schema forward if it predates
    /// [`CURRENT_SCHEMA_VERSION`].
    pub fn open_with_options(db_path: impl AsRef<Path>, options: &RepositoryOptions) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path)
            .map_err(|e| Error::NotARepository(format!("{}: {e}", db_path.display())))?;
        schema::apply_pragmas(&conn)?;
        conn.execute_batch(&format!("PRAGMA busy_timeout={}", options.busy_timeout_ms))?;
        Self::verify_schema(&conn, db_path)?;

        let conn = Rc::new(conn);
        let object_store = ObjectStore::new(Rc::clone(&conn))?;
        let refs = RefsContainer::new(Rc::clone(&conn));

        let config_bytes: Option<Vec<u8>> = conn
            .query_row("SELECT contents FROM named_files WHERE path = 'config'", [], |row| row.get(0))
            .ok();
        let config = config_bytes.map(|b| GitConfig::parse(&b)).unwrap_or_default();

        Ok(Self {
            conn,
            path: db_path.to_path_buf(),
            object_store,
            refs,
            config,
        })
    }

    fn verify_schema(conn: &Connection, db_path: &Path) -> Result<()> {
        let version: String = conn
            .query_row("SELECT value FROM metadata WHERE key = 'schema_version'", [], |row| row.get(0))
            .map_err(|_| Error::NotARepository(format!("not a gitlake repository: {}", db_path.display())))?;
        let version: i64 = version
            .parse()
            .map_err(|_| Error::NotARepository(format!("not a gitlake repository: {}", db_path.display())))?;

        if version < CURRENT_SCHEMA_VERSION {
            tracing::info!(from = version, to = CURRENT_SCHEMA_VERSION, "migrating schema");
            migrations::migrate_to_current(conn, version)?;
            tracing::info!(to = CURRENT_SCHEMA_VERSION, "schema migration complete");
        } else if version > CURRENT_SCHEMA_VERSION {
            return Err(Error::UnsupportedSchemaVersion {
                found: version,
                expected: CURRENT_SCHEMA_VERSION,
                path: db_path.display().to_string(),
            });
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn object_store(&self) -> &ObjectStore {
        &self.object_store
    }

    pub fn refs(&self) -> &RefsContainer {
        &self.refs
    }

    pub fn get_config(&self) -> &GitConfig {
        &self.config
    }

    pub fn get_named_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        self.conn
            .query_row("SELECT contents FROM named_files WHERE path = ?1", [path], |row| row.get(0))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other.into()),
            })
    }

    pub fn put_named_file(&self, path: &str, contents: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO named_files (path, contents) VALUES (?1, ?2)",
            rusqlite::params![path, contents],
        )?;
        Ok(())
    }

    pub fn del_named_file(&self, path: &str) -> Result<()> {
        self.conn.execute("DELETE FROM named_files WHERE path = ?1", [path])?;
        Ok(())
    }

    pub fn get_description(&self) -> Result<Option<Vec<u8>>> {
        self.get_named_file("description")
    }

    pub fn set_description(&self, description: &[u8]) -> Result<()> {
        self.put_named_file("description", description)
    }

    /// Enable `zlib` (the only method the original repository format
    /// supports turning on after the fact; `zstd` is adopted by training a
    /// dictionary, see [`Self::train_dictionary`]).
    pub fn enable_compression(&self, method: &str) -> Result<()> {
        if method != "zlib" && method != "zstd" {
            return Err(Error::UnsupportedCompression(method.to_string()));
        }
        self.conn.execute(
            "UPDATE metadata SET value = ?1 WHERE key = 'compression'",
            [method],
        )?;
        self.object_store.set_compression_method(method);
        Ok(())
    }

    pub fn disable_compression(&self) -> Result<()> {
        self.conn.execute("UPDATE metadata SET value = 'none' WHERE key = 'compression'", [])?;
        self.object_store.set_compression_method("none");
        Ok(())
    }

    /// Train a zstd dictionary for `kind` from existing rows of that kind
    /// (at least 10 samples, per spec), persist it under its named file,
    /// reload the registry, and re-compress existing rows of that kind
    /// under the new dictionary. Reclaims freed pages with `VACUUM`
    /// afterward, since recompression can shrink the database substantially.
    pub fn train_dictionary(&self, kind: DictionaryKey, max_dict_size: usize) -> Result<()> {
        let samples = self.sample_rows_for_dictionary(kind)?;
        if samples.len() < 10 {
            return Err(Error::Corruption(format!(
                "not enough samples to train a {:?} dictionary: need at least 10, found {}",
                kind,
                samples.len()
            )));
        }

        tracing::info!(?kind, samples = samples.len(), "training dictionary");
        let dict = zstd::dict::from_samples(&samples, max_dict_size)
            .map_err(|e| Error::Corruption(format!("dictionary training failed: {e}")))?;

        self.put_named_file(kind.named_file_path(), &dict)?;
        self.object_store.dictionaries_mut().register(kind, dict);
        self.recompress_existing_rows(kind)?;

        if kind != DictionaryKey::Legacy {
            self.del_named_file(DictionaryKey::Legacy.named_file_path())?;
            self.object_store.dictionaries_mut().remove(DictionaryKey::Legacy);
        }

        self.conn.execute_batch("VACUUM")?;
        tracing::info!(?kind, "dictionary training complete");
        Ok(())
    }

    fn sample_rows_for_dictionary(&self, kind: DictionaryKey) -> Result<Vec<Vec<u8>>> {
        let sql = match kind {
            DictionaryKey::Commit => {
                "SELECT data, compression FROM objects WHERE type_num = 1 AND data IS NOT NULL LIMIT 1000"
            }
            DictionaryKey::Tree => {
                "SELECT data, compression FROM objects WHERE type_num = 2 AND data IS NOT NULL LIMIT 1000"
            }
            DictionaryKey::Chunk => "SELECT data, compression FROM chunks LIMIT 1000",
            DictionaryKey::Legacy => {
                "SELECT data, compression FROM objects WHERE data IS NOT NULL LIMIT 1000"
            }
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?)))?;
        let dictionaries = self.object_store.dictionaries();
        let mut samples = Vec::new();
        for row in rows {
            let (data, compression) = row?;
            let raw = crate::codec::decompress(&data, &compression, &dictionaries)?;
            samples.push(raw);
        }
        Ok(samples)
    }

    fn recompress_existing_rows(&self, kind: DictionaryKey) -> Result<()> {
        let (table, id_col, sha_col, type_filter): (&str, &str, &str, Option<i64>) = match kind {
            DictionaryKey::Commit => ("objects", "rowid", "sha", Some(ObjectType::Commit.as_i64())),
            DictionaryKey::Tree => ("objects", "rowid", "sha", Some(ObjectType::Tree.as_i64())),
            DictionaryKey::Chunk => ("chunks", "rowid", "chunk_sha", None),
            DictionaryKey::Legacy => return Ok(()),
        };
        let _ = sha_col;

        let sql = match type_filter {
            Some(t) => format!("SELECT {id_col}, data, compression FROM {table} WHERE data IS NOT NULL AND type_num = {t}"),
            None => format!("SELECT {id_col}, data, compression FROM {table} WHERE data IS NOT NULL"),
        };
        let rows: Vec<(i64, Vec<u8>, String)> = {
            let mut stmt = self.conn.prepare(&sql)?;
            let mapped = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
            mapped.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let dictionaries = self.object_store.dictionaries();
        let update_sql = format!("UPDATE {table} SET data = ?1, compression = 'zstd' WHERE {id_col} = ?2");
        for (rowid, data, compression) in rows {
            let raw = crate::codec::decompress(&data, &compression, &dictionaries)?;
            let recompressed = crate::codec::compress(&raw, "zstd", Some(kind), &dictionaries)?;
            self.conn.execute(&update_sql, rusqlite::params![recompressed, rowid])?;
        }
        Ok(())
    }

    pub fn close(self) {
        // Connection is dropped (and closed) along with `self`.
    }
}
