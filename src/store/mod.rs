//! Node storage
//!
//! The tree itself never owns other nodes: it refers to them by digest and
//! asks a [`TreeStore`] to resolve them. Writing goes through [`NodeSink`],
//! named pointers to commits and roots through [`RefStore`].
//!
//! Two backends are provided:
//! - [`MemoryStore`], an arena keyed by digest
//! - [`ObjectStore`], a single file of zstd-compressed, typed blobs

mod blob;
mod file_store;
mod memory;

pub use blob::{Blob, BlobType};
pub use file_store::ObjectStore;
pub use memory::MemoryStore;

use crate::model::{Commit, Directory, Hash, Node};
use crate::Result;

/// Read side of node storage
pub trait TreeStore {
    /// Issue a fresh, store-wide unique id
    fn next_id(&self) -> Result<u64>;

    /// Resolve any node; fails with `StoreLookupFailed` if unknown
    fn node_by_digest(&self, digest: &Hash) -> Result<Node>;

    /// Resolve a directory; fails with `TypeMismatch` for other kinds
    fn directory_by_digest(&self, digest: &Hash) -> Result<Directory> {
        self.node_by_digest(digest)?.into_directory()
    }

    /// Resolve a commit; fails with `TypeMismatch` for other kinds
    fn commit_by_digest(&self, digest: &Hash) -> Result<Commit> {
        self.node_by_digest(digest)?.into_commit()
    }
}

/// Write side of node storage
pub trait NodeSink {
    /// Store `node` under its current digest, replacing an older entry
    fn put_node(&self, node: &Node) -> Result<()>;
}

/// Named pointers (e.g. `HEAD`) to digests
pub trait RefStore {
    fn get_ref(&self, name: &str) -> Option<Hash>;

    fn set_ref(&self, name: &str, digest: Hash);

    fn list_refs(&self) -> Vec<(String, Hash)>;
}
