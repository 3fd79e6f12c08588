//! The two narrow interfaces pack-ingest and other consumers are written
//! against, per Design Note 9.1: one for reference reads, one for
//! reference writes. Kept separate from [`super::RefsContainer`]'s inherent
//! API so callers that only need one half can depend on a smaller surface,
//! the same split `store::traits` applies to the object store.

use super::RefLogOptions;
use crate::error::Result;
use std::collections::BTreeSet;

pub trait RefsReader {
    fn all_keys(&self) -> Result<BTreeSet<Vec<u8>>>;
    fn read_loose_ref(&self, name: &[u8]) -> Result<Option<Vec<u8>>>;
    fn get_peeled(&self, name: &[u8]) -> Result<Option<Vec<u8>>>;
}

pub trait RefsWriter {
    fn set_if_equals(
        &self,
        name: &[u8],
        old_ref: Option<&[u8]>,
        new_ref: &[u8],
        opts: RefLogOptions<'_>,
    ) -> Result<bool>;
    fn add_if_new(&self, name: &[u8], new_ref: &[u8], opts: RefLogOptions<'_>) -> Result<bool>;
    fn remove_if_equals(&self, name: &[u8], old_ref: Option<&[u8]>, opts: RefLogOptions<'_>) -> Result<bool>;
    fn set_symbolic_ref(&self, name: &[u8], target: &[u8], opts: RefLogOptions<'_>) -> Result<()>;
}
