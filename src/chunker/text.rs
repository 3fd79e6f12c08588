//! Line-boundary chunking for text-classified blobs.
//!
//! Ported from `_chunking.py::chunk_text`: split at `\n`, re-attach the
//! newline to every line but the last, then walk lines accumulating a
//! chunk until a CRC32-based cut point or a byte ceiling is reached.

use super::Chunk;
use crate::ids::ChunkId;

const TEXT_CDC_MASK: u32 = 0x7;
const TEXT_MIN_LINES: usize = 3;
const TEXT_MAX_CHUNK_BYTES: usize = 4096;

pub(super) fn chunk_text(data: &[u8]) -> Vec<Chunk> {
    let lines: Vec<&[u8]> = data.split(|&b| b == b'\n').collect();

    let mut parts: Vec<Vec<u8>> = Vec::new();
    let last = lines.len().saturating_sub(1);
    for (i, line) in lines.iter().enumerate() {
        if i < last {
            let mut part = line.to_vec();
            part.push(b'\n');
            parts.push(part);
        } else if !line.is_empty() {
            parts.push(line.to_vec());
        }
    }

    if parts.is_empty() {
        return vec![(ChunkId::compute(data), data.to_vec())];
    }

    let mut chunks = Vec::new();
    let mut current: Vec<u8> = Vec::new();
    let mut line_count = 0usize;

    for part in parts {
        current.extend_from_slice(&part);
        line_count += 1;
        let crc = crc32fast::hash(&part);

        let should_cut = (line_count >= TEXT_MIN_LINES && (crc & TEXT_CDC_MASK) == 0)
            || current.len() >= TEXT_MAX_CHUNK_BYTES;

        if should_cut {
            let id = ChunkId::compute(&current);
            chunks.push((id, std::mem::take(&mut current)));
            line_count = 0;
        }
    }

    if !current.is_empty() {
        let id = ChunkId::compute(&current);
        chunks.push((id, current));
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconstitutes_input_exactly() {
        let mut data = Vec::new();
        for n in 0..800 {
            data.extend_from_slice(format!("row {n}\n").as_bytes());
        }
        let chunks = chunk_text(&data);
        let joined: Vec<u8> = chunks.iter().flat_map(|(_, b)| b.iter().copied()).collect();
        assert_eq!(joined, data);
    }

    #[test]
    fn no_trailing_newline_preserved() {
        let data = b"a\nb\nc".to_vec();
        let chunks = chunk_text(&data);
        let joined: Vec<u8> = chunks.iter().flat_map(|(_, b)| b.iter().copied()).collect();
        assert_eq!(joined, data);
    }

    #[test]
    fn empty_input_yields_single_chunk() {
        let chunks = chunk_text(b"");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].1, b"");
    }
}
