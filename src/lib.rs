// gitlake - Git object database and reference store embedded in a SQLite file
// Global clippy configuration

#![warn(clippy::all)]
#![warn(clippy::correctness)]
#![warn(clippy::suspicious)]
#![warn(clippy::complexity)]
#![warn(clippy::perf)]
#![warn(clippy::style)]

// Allow some pedantic lints that don't add value
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::similar_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::items_after_statements)]

// Style preferences
#![allow(clippy::enum_glob_use)]
#![allow(clippy::wildcard_imports)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::single_match_else)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::type_complexity)]
#![allow(clippy::needless_range_loop)]

//! A Git object database and reference store embedded entirely in a single
//! SQLite file. Objects, chunks, refs, and the reflog all live as rows;
//! there is no loose-object filesystem layout and no pack files. Everything
//! outside of persistence — parsing Git's object wire format, pack-file
//! ingest, and porcelain commands — is a consumer of this crate, not part of
//! it.

pub mod chunker;
pub mod chunkref;
pub mod codec;
pub mod error;
pub mod ids;
pub mod refs;
pub mod repo;
pub mod schema;
pub mod store;
pub mod types;

pub use crate::error::{Error, Result};
pub use crate::ids::{ChunkId, ObjectId};
pub use crate::refs::{RefsContainer, RefsReader, RefsWriter};
pub use crate::repo::{Repository, RepositoryOptions};
pub use crate::store::{ObjectReader, ObjectStore, ObjectWriter};
pub use crate::types::{ObjectType, RawObject};
