//! FastCDC chunking for binary-classified blobs.
//!
//! Grounded on `fastcdc::v2020`, the same module used for stream chunking
//! in the reference backup tool this pack retrieved
//! (`other_examples/.../chunker.rs`), applied here over an in-memory buffer
//! since blobs are already fully materialized by the time they reach the
//! object store.

use super::Chunk;
use crate::ids::ChunkId;
use fastcdc::v2020::FastCDC;

const BINARY_MIN_SIZE: u32 = 2048;
const BINARY_AVG_SIZE: u32 = 8192;
const BINARY_MAX_SIZE: u32 = 65536;

pub(super) fn chunk_binary(data: &[u8]) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for chunk in FastCDC::new(data, BINARY_MIN_SIZE, BINARY_AVG_SIZE, BINARY_MAX_SIZE) {
        let bytes = data[chunk.offset..chunk.offset + chunk.length].to_vec();
        let id = ChunkId::compute(&bytes);
        chunks.push((id, bytes));
    }
    chunks
}
