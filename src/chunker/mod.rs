//! Content-defined chunking of blob payloads.
//!
//! Ported from the line-based CRC32 text cutter and FastCDC binary cutter
//! this crate's predecessor used, so that re-chunking existing content
//! produces byte-identical chunk boundaries.

mod binary;
mod text;

use crate::ids::ChunkId;

/// Below this size a blob is always stored inline; chunking is never
/// attempted.
pub const CHUNKING_THRESHOLD: usize = 4096;

/// One emitted chunk: its content hash and raw bytes, in the order they
/// occur in the source blob.
pub type Chunk = (ChunkId, Vec<u8>);

/// Returns `true` if `data` looks like text: no NUL byte in the first 8000
/// bytes (Git's own heuristic for "is this binary").
fn is_text(data: &[u8]) -> bool {
    let probe_len = data.len().min(8000);
    !data[..probe_len].contains(&0)
}

/// Chunk a blob's raw bytes for deduplication.
///
/// Returns `None` if the blob should be stored inline: either it is smaller
/// than [`CHUNKING_THRESHOLD`], or chunking produced one chunk or fewer
/// (there is no benefit to indirection for content that doesn't actually
/// split).
pub fn chunk_blob(data: &[u8]) -> Option<Vec<Chunk>> {
    if data.len() < CHUNKING_THRESHOLD {
        return None;
    }

    let chunks = if is_text(data) {
        text::chunk_text(data)
    } else {
        binary::chunk_binary(data)
    };

    if chunks.len() <= 1 {
        return None;
    }

    Some(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstitute(chunks: &[Chunk]) -> Vec<u8> {
        chunks.iter().flat_map(|(_, b)| b.iter().copied()).collect()
    }

    #[test]
    fn small_blob_is_inline() {
        assert!(chunk_blob(b"hello world").is_none());
    }

    #[test]
    fn text_blob_reconstitutes_exactly() {
        let mut data = Vec::new();
        for n in 0..500 {
            data.extend_from_slice(format!("line {n} of the file\n").as_bytes());
        }
        let chunks = chunk_blob(&data).expect("should chunk");
        assert!(chunks.len() > 1);
        assert_eq!(reconstitute(&chunks), data);
        for (id, bytes) in &chunks {
            assert_eq!(*id, ChunkId::compute(bytes));
        }
    }

    #[test]
    fn binary_blob_reconstitutes_exactly() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let chunks = chunk_blob(&data).expect("should chunk");
        assert!(chunks.len() > 1);
        assert_eq!(reconstitute(&chunks), data);
    }

    #[test]
    fn single_chunk_result_falls_back_to_inline() {
        // All-zero text-like data that is just over the threshold but whose
        // uniform content never trips the cut condition before EOF, and
        // binary data chosen to FastCDC into a single chunk, both degrade to
        // "inline" — exercised concretely for the text path here.
        let data = vec![b'a'; CHUNKING_THRESHOLD + 10];
        // A single "line" (no newlines) never reaches TEXT_MIN_LINES cuts,
        // so chunk_text returns exactly one chunk and chunk_blob folds it
        // back to inline.
        assert!(chunk_blob(&data).is_none());
    }
}
