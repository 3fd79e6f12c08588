//! Compression codec layer: `none`/`zlib`/`zstd`, with a zstd dictionary
//! registry keyed both by logical kind (`commit`/`tree`/`chunk`/`legacy`)
//! and by the 4-byte zstd dictionary identifier recovered from a frame's
//! header, so that data compressed under any previously active dictionary
//! remains decodable.
//!
//! Ported from `object_store.py`'s `_compress`/`_decompress`, generalizing
//! the teacher's `ChunkCompressor` (`casg/compression.rs`) dictionary
//! plumbing from a single taxon-keyed cache to the four fixed dictionary
//! kinds this schema uses.

mod dictionary;

pub use dictionary::{DictionaryKey, DictionaryRegistry};

use crate::error::{Error, Result};
use std::io::{Read, Write};

/// Default zstd compression level, matching `object_store.py`'s hardcoded
/// `level=3`.
const ZSTD_LEVEL: i32 = 3;

/// Compress `data` under `method`, optionally priming the zstd encoder with
/// the dictionary registered under `dict_key`. `none`/`zlib` ignore
/// `dict_key`.
pub fn compress(
    data: &[u8],
    method: &str,
    dict_key: Option<DictionaryKey>,
    dictionaries: &DictionaryRegistry,
) -> Result<Vec<u8>> {
    match method {
        "none" => Ok(data.to_vec()),
        "zlib" => {
            use flate2::write::ZlibEncoder;
            use flate2::Compression;
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        }
        "zstd" => {
            let dict = dict_key.and_then(|k| dictionaries.get_by_key(k));
            match dict {
                Some(dict) => {
                    let mut encoder =
                        zstd::Encoder::with_dictionary(Vec::new(), ZSTD_LEVEL, dict)?;
                    encoder.write_all(data)?;
                    Ok(encoder.finish()?)
                }
                None => Ok(zstd::encode_all(data, ZSTD_LEVEL)?),
            }
        }
        other => Err(Error::UnsupportedCompression(other.to_string())),
    }
}

/// Decompress `data` previously compressed under `method`. For `zstd`, the
/// frame header's dictionary id is recovered and the matching registered
/// dictionary (if any) is used.
pub fn decompress(data: &[u8], method: &str, dictionaries: &DictionaryRegistry) -> Result<Vec<u8>> {
    match method {
        "none" => Ok(data.to_vec()),
        "zlib" => {
            use flate2::read::ZlibDecoder;
            let mut decoder = ZlibDecoder::new(data);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out)?;
            Ok(out)
        }
        "zstd" => {
            let dict_id = dictionary::frame_dictionary_id(data);
            let dict = dict_id.and_then(|id| dictionaries.get_by_id(id));
            let mut out = Vec::new();
            match dict {
                Some(dict) => {
                    let mut decoder = zstd::Decoder::with_dictionary(data, dict)?;
                    decoder.read_to_end(&mut out)?;
                }
                None => {
                    let mut decoder = zstd::Decoder::new(data)?;
                    decoder.read_to_end(&mut out)?;
                }
            }
            Ok(out)
        }
        other => Err(Error::UnsupportedCompression(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn none_round_trips() {
        let registry = DictionaryRegistry::empty();
        let data = b"hello world";
        let compressed = compress(data, "none", None, &registry).unwrap();
        assert_eq!(compressed, data);
        assert_eq!(decompress(&compressed, "none", &registry).unwrap(), data);
    }

    #[test]
    fn zlib_round_trips() {
        let registry = DictionaryRegistry::empty();
        let data = b"the quick brown fox jumps over the lazy dog".repeat(20);
        let compressed = compress(&data, "zlib", None, &registry).unwrap();
        assert_eq!(decompress(&compressed, "zlib", &registry).unwrap(), data);
    }

    #[test]
    fn zstd_round_trips_without_dictionary() {
        let registry = DictionaryRegistry::empty();
        let data = b"the quick brown fox jumps over the lazy dog".repeat(20);
        let compressed = compress(&data, "zstd", None, &registry).unwrap();
        assert_eq!(decompress(&compressed, "zstd", &registry).unwrap(), data);
    }

    #[test]
    fn unknown_method_is_rejected() {
        let registry = DictionaryRegistry::empty();
        assert!(compress(b"x", "lz4", None, &registry).is_err());
        assert!(decompress(b"x", "lz4", &registry).is_err());
    }

    proptest! {
        #[test]
        fn round_trip_holds_for_all_codecs(data: Vec<u8>) {
            let registry = DictionaryRegistry::empty();
            for method in ["none", "zlib", "zstd"] {
                let compressed = compress(&data, method, None, &registry).unwrap();
                let decompressed = decompress(&compressed, method, &registry).unwrap();
                prop_assert_eq!(&decompressed, &data);
            }
        }
    }
}
