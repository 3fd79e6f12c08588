//! The two narrow interfaces pack-ingest and other consumers are written
//! against, per Design Note 9.1: one for object reads, one for object
//! writes. Kept separate from [`super::ObjectStore`]'s inherent API so
//! callers that only need one half can depend on a smaller surface.

use crate::error::Result;
use crate::ids::ObjectId;
use crate::types::{ObjectType, RawObject};

pub trait ObjectReader {
    fn get_raw(&self, id: ObjectId) -> Result<RawObject>;
    fn get_raw_range(&self, id: ObjectId, offset: u64, length: u64) -> Result<(ObjectType, Vec<u8>)>;
    fn get_object_size(&self, id: ObjectId) -> Result<u64>;
    fn contains(&self, id: ObjectId) -> Result<bool>;
}

pub trait ObjectWriter {
    fn insert(&self, obj: &RawObject) -> Result<ObjectId>;
}
