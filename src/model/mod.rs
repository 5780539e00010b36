//! Core data model types for catfs

mod commit;
mod directory;
mod file;
mod hash;
mod node;

pub use commit::{Author, Commit, CommitState, MergeMarker};
pub use directory::{Changeset, Directory};
pub use file::File;
pub use hash::{Hash, HASH_LEN};
pub use node::{walk, Node, NodeKind};

/// Current time as unix millis
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
