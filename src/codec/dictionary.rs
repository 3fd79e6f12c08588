//! zstd dictionary registry: trained dictionaries are looked up both by
//! their logical purpose (what kind of object they were trained on) and by
//! the 4-byte dictionary identifier embedded in their own header, since
//! that is all a compressed frame remembers about which dictionary
//! produced it.

use std::collections::HashMap;

const DICTIONARY_MAGIC: [u8; 4] = [0x37, 0xA4, 0x30, 0xEC];
const FRAME_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// The fixed set of dictionary purposes this schema trains, mirroring the
/// named files `_zstd_dict_commit`, `_zstd_dict_tree`, `_zstd_dict_chunk`,
/// and the historical single `_zstd_dict` ("legacy") a repository may still
/// carry from before per-type dictionaries existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DictionaryKey {
    Commit,
    Tree,
    Chunk,
    Legacy,
}

impl DictionaryKey {
    pub fn named_file_path(self) -> &'static str {
        match self {
            Self::Commit => "_zstd_dict_commit",
            Self::Tree => "_zstd_dict_tree",
            Self::Chunk => "_zstd_dict_chunk",
            Self::Legacy => "_zstd_dict",
        }
    }

    pub fn all() -> [Self; 4] {
        [Self::Commit, Self::Tree, Self::Chunk, Self::Legacy]
    }
}

/// Loaded zstd dictionaries, indexed both by purpose and by dictionary id.
#[derive(Default)]
pub struct DictionaryRegistry {
    by_key: HashMap<DictionaryKey, Vec<u8>>,
    by_id: HashMap<u32, Vec<u8>>,
}

impl DictionaryRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register `contents` under `key`, also indexing it by the dictionary
    /// id parsed out of its own header so frames can be decoded without
    /// knowing which kind produced them.
    pub fn register(&mut self, key: DictionaryKey, contents: Vec<u8>) {
        if let Some(id) = dictionary_id(&contents) {
            self.by_id.insert(id, contents.clone());
        }
        self.by_key.insert(key, contents);
    }

    pub fn remove(&mut self, key: DictionaryKey) {
        if let Some(contents) = self.by_key.remove(&key) {
            if let Some(id) = dictionary_id(&contents) {
                self.by_id.remove(&id);
            }
        }
    }

    pub fn get_by_key(&self, key: DictionaryKey) -> Option<&[u8]> {
        self.by_key.get(&key).map(Vec::as_slice)
    }

    pub fn get_by_id(&self, id: u32) -> Option<&[u8]> {
        self.by_id.get(&id).map(Vec::as_slice)
    }

    pub fn contains_key(&self, key: DictionaryKey) -> bool {
        self.by_key.contains_key(&key)
    }
}

/// Parse the Dictionary_ID out of a raw zstd dictionary's own header
/// (magic number `0xEC30A437` followed by a 4-byte little-endian id), per
/// RFC 8878 §5.
fn dictionary_id(contents: &[u8]) -> Option<u32> {
    if contents.len() < 8 || contents[0..4] != DICTIONARY_MAGIC {
        return None;
    }
    Some(u32::from_le_bytes(contents[4..8].try_into().ok()?))
}

/// Parse the Dictionary_ID embedded in a zstd frame header, per RFC 8878
/// §3.1.1. Returns `None` if the frame carries no dictionary id (flag `00`)
/// or the header is malformed.
pub(super) fn frame_dictionary_id(frame: &[u8]) -> Option<u32> {
    if frame.len() < 5 || frame[0..4] != FRAME_MAGIC {
        return None;
    }
    let descriptor = frame[4];
    let dict_id_flag = descriptor & 0x3;
    if dict_id_flag == 0 {
        return None;
    }
    let single_segment = (descriptor >> 5) & 1 == 1;

    let mut offset = 5usize;
    if !single_segment {
        offset += 1; // Window_Descriptor
    }

    let dict_id_len = match dict_id_flag {
        1 => 1,
        2 => 2,
        3 => 4,
        _ => unreachable!("dict_id_flag masked to 2 bits"),
    };
    if frame.len() < offset + dict_id_len {
        return None;
    }

    let mut id_bytes = [0u8; 4];
    id_bytes[..dict_id_len].copy_from_slice(&frame[offset..offset + dict_id_len]);
    Some(u32::from_le_bytes(id_bytes))
}
