//! File - an opaque leaf of the tree

use super::{now_millis, Hash};
use crate::store::TreeStore;
use crate::Result;

/// A file node
///
/// Size and digest describe content that lives in the object backend; the
/// tree only carries them around.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct File {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) size: u64,
    pub(crate) mod_time: u64,
    pub(crate) digest: Hash,
    pub(crate) parent: Hash,
}

impl File {
    /// Create a new, detached file with a fresh id from the store
    pub fn new<S: TreeStore + ?Sized>(
        store: &S,
        name: impl Into<String>,
        size: u64,
        digest: Hash,
    ) -> Result<Self> {
        Ok(File {
            id: store.next_id()?,
            name: name.into(),
            size,
            mod_time: now_millis(),
            digest,
            parent: Hash::ZERO,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mod_time(&self) -> u64 {
        self.mod_time
    }

    pub fn digest(&self) -> Hash {
        self.digest
    }

    pub fn parent_digest(&self) -> Hash {
        self.parent
    }
}
