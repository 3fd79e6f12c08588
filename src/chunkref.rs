//! Packs an ordered sequence of positive chunk row identifiers into a
//! compact blob: the first id as an unsigned LEB128 varint, each following
//! id as a zig-zag-encoded signed delta from its predecessor. Chunks
//! inserted together as part of the same object cluster with near-adjacent
//! row identifiers, so deltas are small and this is far smaller than an
//! 8-byte-per-reference encoding.
//!
//! Exact port of `object_store.py`'s `pack_chunk_refs`/`unpack_chunk_refs`.

fn encode_unsigned_varint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        if value > 0x7F {
            out.push(((value & 0x7F) | 0x80) as u8);
            value >>= 7;
        } else {
            out.push(value as u8);
            break;
        }
    }
}

fn decode_unsigned_varint(data: &[u8], offset: &mut usize) -> u64 {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        let b = data[*offset];
        value |= u64::from(b & 0x7F) << shift;
        *offset += 1;
        if b & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    value
}

/// Pack ordered chunk row ids as a delta-zigzag-varint blob. Empty input
/// packs to an empty blob.
pub fn pack_chunk_refs(rowids: &[i64]) -> Vec<u8> {
    if rowids.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::new();
    encode_unsigned_varint(rowids[0] as u64, &mut out);

    let mut prev = rowids[0];
    for &rid in &rowids[1..] {
        let delta = rid.wrapping_sub(prev);
        let zigzag = ((delta << 1) ^ (delta >> 63)) as u64;
        encode_unsigned_varint(zigzag, &mut out);
        prev = rid;
    }
    out
}

/// Unpack a delta-zigzag-varint blob into ordered chunk row ids. The exact
/// inverse of [`pack_chunk_refs`]; empty input decodes to an empty vector.
pub fn unpack_chunk_refs(data: &[u8]) -> Vec<i64> {
    if data.is_empty() {
        return Vec::new();
    }

    let mut offset = 0usize;
    let first = decode_unsigned_varint(data, &mut offset) as i64;
    let mut rowids = vec![first];
    let mut prev = first;

    while offset < data.len() {
        let zigzag = decode_unsigned_varint(data, &mut offset);
        let delta = ((zigzag >> 1) as i64) ^ -((zigzag & 1) as i64);
        prev = prev.wrapping_add(delta);
        rowids.push(prev);
    }

    rowids
}
