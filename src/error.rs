use thiserror::Error;

/// Errors surfaced across the public API.
///
/// Compare-and-swap outcomes are never errors (they return `bool`, per the
/// reference container's contract); this enum covers everything else.
#[derive(Error, Debug)]
pub enum Error {
    #[error("not a gitlake repository: {0}")]
    NotARepository(String),

    #[error("unsupported schema version {found} (expected {expected}): {path}")]
    UnsupportedSchemaVersion {
        found: i64,
        expected: i64,
        path: String,
    },

    #[error("object not found: {0}")]
    MissingObject(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(String),

    #[error("database busy")]
    Busy,

    #[error("storage integrity error: {0}")]
    Corruption(String),

    #[error("database error: {0}")]
    Database(rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// `SQLITE_BUSY`/`SQLITE_LOCKED` surface as [`Error::Busy`] — the busy
/// timeout already waited and lost, per spec §7's contention taxonomy — and
/// everything else falls through to the catch-all [`Error::Database`].
impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ffi_err, _) = &e {
            if matches!(
                ffi_err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) {
                return Error::Busy;
            }
        }
        Error::Database(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_busy_maps_to_busy_variant() {
        let ffi_err = rusqlite::ffi::Error {
            code: rusqlite::ErrorCode::DatabaseBusy,
            extended_code: rusqlite::ffi::SQLITE_BUSY,
        };
        let err: Error = rusqlite::Error::SqliteFailure(ffi_err, Some("database is locked".into())).into();
        assert!(matches!(err, Error::Busy));
    }

    #[test]
    fn other_sqlite_errors_fall_through_to_database() {
        let ffi_err = rusqlite::ffi::Error {
            code: rusqlite::ErrorCode::ConstraintViolation,
            extended_code: rusqlite::ffi::SQLITE_CONSTRAINT,
        };
        let err: Error = rusqlite::Error::SqliteFailure(ffi_err, None).into();
        assert!(matches!(err, Error::Database(_)));
    }
}
