//! Object and chunk identifiers.
//!
//! Objects are keyed by the Git object identifier (SHA-1 of the canonical
//! encoding); chunks are keyed by the SHA-256 of their raw bytes. Both
//! accept either binary or hex input and normalize to binary for storage
//! and lookup, per spec's "20-byte binary form is canonical" rule.

use crate::error::{Error, Result};
use sha1::{Digest as _, Sha1};
use sha2::Sha256;
use std::fmt;

/// A 20-byte Git object identifier (SHA-1 of the canonical object encoding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    pub const LEN: usize = 20;

    /// Compute the object id of `(type_num, raw_bytes)` under Git's header
    /// convention: `"<type> <len>\0<raw>"` hashed with SHA-1.
    pub fn compute(type_name: &str, raw: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(type_name.as_bytes());
        hasher.update(b" ");
        hasher.update(raw.len().to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(raw);
        let digest = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(hex: &str) -> Result<Self> {
        let decoded = hex::decode(hex)
            .map_err(|e| Error::InvalidIdentifier(format!("invalid hex object id: {e}")))?;
        Self::try_from(decoded.as_slice())
    }

    /// Accept either 20 raw bytes or a 40-character hex string, per spec's
    /// "lookups accept either binary or 40-char hex and normalize" rule.
    pub fn parse(input: &[u8]) -> Result<Self> {
        match input.len() {
            20 => Self::try_from(input),
            40 => {
                let s = std::str::from_utf8(input)
                    .map_err(|_| Error::InvalidIdentifier("non-UTF8 hex object id".into()))?;
                Self::from_hex(s)
            }
            n => Err(Error::InvalidIdentifier(format!(
                "object id must be 20 bytes or 40 hex chars, got {n}"
            ))),
        }
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl TryFrom<&[u8]> for ObjectId {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self> {
        if value.len() != 20 {
            return Err(Error::InvalidIdentifier(format!(
                "object id must be 20 bytes, got {}",
                value.len()
            )));
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(value);
        Ok(Self(bytes))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A 32-byte chunk identifier (SHA-256 of the raw, uncompressed chunk bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId([u8; 32]);

impl ChunkId {
    pub const LEN: usize = 32;

    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl TryFrom<&[u8]> for ChunkId {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self> {
        if value.len() != 32 {
            return Err(Error::InvalidIdentifier(format!(
                "chunk id must be 32 bytes, got {}",
                value.len()
            )));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(value);
        Ok(Self(bytes))
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
