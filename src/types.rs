//! The shared `(type_num, raw_bytes)` interface this crate exchanges with
//! its callers: the Git object parser/serializer, pack-file ingest, and
//! porcelain all sit above this boundary.

use crate::error::{Error, Result};

/// Git's four object kinds, matching `objects.type_num` in the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Commit = 1,
    Tree = 2,
    Blob = 3,
    Tag = 4,
}

impl ObjectType {
    pub fn from_i64(v: i64) -> Result<Self> {
        match v {
            1 => Ok(Self::Commit),
            2 => Ok(Self::Tree),
            3 => Ok(Self::Blob),
            4 => Ok(Self::Tag),
            other => Err(Error::Corruption(format!("unknown type_num {other}"))),
        }
    }

    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::Blob => "blob",
            Self::Tag => "tag",
        }
    }
}

/// A fully decoded Git object as exchanged with the object parser and
/// pack-file ingest: a type tag plus the canonical uncompressed payload.
#[derive(Debug, Clone)]
pub struct RawObject {
    pub type_num: ObjectType,
    pub data: Vec<u8>,
}

impl RawObject {
    pub fn new(type_num: ObjectType, data: Vec<u8>) -> Self {
        Self { type_num, data }
    }
}
