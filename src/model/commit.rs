//! Commit type - a snapshot of the tree state
//!
//! A commit starts out empty, gets its root and parent assigned and is then
//! boxed with a message. Boxing computes the digest and freezes the content;
//! only the merge marker may still change afterwards.

use super::{now_millis, Hash};
use crate::store::TreeStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// The participant that produced a commit
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Author {
    /// This replica's staging area
    #[default]
    Stage,
    /// A named remote
    Remote(String),
}

impl Author {
    pub fn remote(name: impl Into<String>) -> Self {
        Author::Remote(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            Author::Stage => "stage",
            Author::Remote(name) => name,
        }
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Author::Stage => f.write_str("(stage)"),
            Author::Remote(name) => f.write_str(name),
        }
    }
}

/// Records that a commit incorporates a remote's history up to `remote_head`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeMarker {
    pub with: Author,
    pub remote_head: Hash,
}

/// Lifecycle of a commit
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitState {
    #[default]
    Empty,
    Boxed,
}

/// An immutable snapshot of the tree
///
/// Like git commits these form a chain through their parent digests. The
/// sequence index strictly increases along the chain for a single
/// authoring stage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Commit {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) mod_time: u64,
    /// ZERO until boxed
    pub(crate) digest: Hash,
    /// Digest of the root directory
    pub(crate) root: Hash,
    /// Digest of the previous commit (ZERO for the initial commit)
    pub(crate) parent: Hash,
    pub(crate) index: u64,
    pub(crate) stage: Author,
    pub(crate) author: Author,
    pub(crate) message: String,
    pub(crate) merge: Option<MergeMarker>,
    pub(crate) state: CommitState,
}

impl Commit {
    /// Create an empty commit for `stage` at sequence position `index`
    pub fn new_empty<S: TreeStore + ?Sized>(store: &S, stage: Author, index: u64) -> Result<Self> {
        Ok(Commit {
            id: store.next_id()?,
            mod_time: now_millis(),
            author: stage.clone(),
            stage,
            index,
            ..Default::default()
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Short digest once boxed, empty before
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn digest(&self) -> Hash {
        self.digest
    }

    /// Commits carry no payload of their own
    pub fn size(&self) -> u64 {
        0
    }

    pub fn mod_time(&self) -> u64 {
        self.mod_time
    }

    pub fn root(&self) -> Hash {
        self.root
    }

    pub fn parent_digest(&self) -> Hash {
        self.parent
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn stage(&self) -> &Author {
        &self.stage
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn state(&self) -> CommitState {
        self.state
    }

    pub fn is_boxed(&self) -> bool {
        self.state == CommitState::Boxed
    }

    /// Check if this is the initial commit
    pub fn is_initial(&self) -> bool {
        self.parent.is_zero()
    }

    /// Check if this commit records a merge
    pub fn is_merge(&self) -> bool {
        self.merge.is_some()
    }

    /// Set the root directory digest of the snapshot
    pub fn set_root(&mut self, root: Hash) -> Result<()> {
        self.ensure_open()?;
        self.root = root;
        Ok(())
    }

    /// Chain this commit onto `parent`
    ///
    /// The parent must be boxed, and if it belongs to the same stage its
    /// index must be lower than ours.
    pub fn set_parent(&mut self, parent: &Commit) -> Result<()> {
        self.ensure_open()?;
        if !parent.is_boxed() {
            return Err(Error::MalformedInput(
                "parent commit has not been boxed".into(),
            ));
        }
        if parent.stage == self.stage && parent.index >= self.index {
            return Err(Error::SequenceViolation {
                parent: parent.index,
                child: self.index,
            });
        }
        self.parent = parent.digest;
        Ok(())
    }

    pub(crate) fn clear_parent(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.parent = Hash::ZERO;
        Ok(())
    }

    /// Resolve the previous commit through the store
    pub fn parent<S: TreeStore + ?Sized>(&self, store: &S) -> Result<Option<Commit>> {
        if self.parent.is_zero() {
            return Ok(None);
        }
        store.commit_by_digest(&self.parent).map(Some)
    }

    /// Record that this commit merges `with`'s history up to `remote_head`
    ///
    /// Replaces any earlier marker. The marker is not part of the digest, so
    /// it may still be set on a boxed commit.
    pub fn set_merge_marker(&mut self, with: Author, remote_head: Hash) {
        self.merge = Some(MergeMarker { with, remote_head });
    }

    /// The most recently set merge marker
    pub fn merge_marker(&self) -> Option<(&Author, Hash)> {
        self.merge.as_ref().map(|m| (&m.with, m.remote_head))
    }

    /// Finalize the commit: set author and message and compute the digest
    pub fn box_commit(&mut self, author: Author, message: impl Into<String>) -> Result<()> {
        self.ensure_open()?;

        self.author = author;
        self.message = message.into();
        self.mod_time = now_millis();
        self.digest = self.compute_digest();
        self.name = self.digest.short();
        self.state = CommitState::Boxed;

        debug!(commit = %self.name, index = self.index, "boxed commit");
        Ok(())
    }

    fn compute_digest(&self) -> Hash {
        Hash::digest_many(&[
            self.root.as_bytes(),
            self.parent.as_bytes(),
            &self.index.to_le_bytes(),
            self.stage.name().as_bytes(),
            &[0],
            self.author.name().as_bytes(),
            &[0],
            self.message.as_bytes(),
        ])
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_boxed() {
            return Err(Error::AlreadyBoxed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn boxed(store: &MemoryStore, index: u64, message: &str) -> Commit {
        let mut commit = Commit::new_empty(store, Author::Stage, index).unwrap();
        commit.set_root(Hash::digest(message.as_bytes())).unwrap();
        commit.box_commit(Author::Stage, message).unwrap();
        commit
    }

    #[test]
    fn test_new_empty_commit() {
        let store = MemoryStore::new();
        let commit = Commit::new_empty(&store, Author::Stage, 42).unwrap();

        assert_eq!(commit.index(), 42);
        assert_eq!(commit.state(), CommitState::Empty);
        assert!(commit.digest().is_zero());
        assert!(commit.is_initial());
        assert!(!commit.is_merge());
    }

    #[test]
    fn test_box_twice_fails() {
        let store = MemoryStore::new();
        let mut commit = Commit::new_empty(&store, Author::Stage, 1).unwrap();

        commit.box_commit(Author::Stage, "init").unwrap();
        assert!(commit.is_boxed());
        assert!(!commit.digest().is_zero());
        assert_eq!(commit.name(), commit.digest().short());

        let err = commit.box_commit(Author::Stage, "again").unwrap_err();
        assert!(matches!(err, Error::AlreadyBoxed));
        assert_eq!(commit.message(), "init");
    }

    #[test]
    fn test_boxed_commit_is_frozen() {
        let store = MemoryStore::new();
        let parent = boxed(&store, 0, "first");
        let mut commit = boxed(&store, 1, "second");

        assert!(matches!(commit.set_root(Hash::ZERO), Err(Error::AlreadyBoxed)));
        assert!(matches!(commit.set_parent(&parent), Err(Error::AlreadyBoxed)));
    }

    #[test]
    fn test_merge_marker_overwrites() {
        let store = MemoryStore::new();
        let mut commit = Commit::new_empty(&store, Author::Stage, 3).unwrap();
        assert!(commit.merge_marker().is_none());

        let alice = Author::remote("alice");
        commit.set_merge_marker(alice.clone(), Hash::digest(b"head-1"));
        commit.set_merge_marker(alice.clone(), Hash::digest(b"head-2"));

        let (who, head) = commit.merge_marker().unwrap();
        assert_eq!(who, &alice);
        assert_eq!(head, Hash::digest(b"head-2"));
        assert!(commit.is_merge());

        // still allowed after boxing, and not part of the digest
        commit.box_commit(Author::Stage, "merge").unwrap();
        let digest = commit.digest();
        commit.set_merge_marker(Author::remote("bob"), Hash::digest(b"head-3"));
        assert_eq!(commit.digest(), digest);
        assert_eq!(commit.merge_marker().unwrap().0.name(), "bob");
    }

    #[test]
    fn test_parent_chain_requires_increasing_index() {
        let store = MemoryStore::new();
        let parent = boxed(&store, 5, "base");

        let mut same = Commit::new_empty(&store, Author::Stage, 5).unwrap();
        assert!(matches!(
            same.set_parent(&parent),
            Err(Error::SequenceViolation {
                parent: 5,
                child: 5
            })
        ));

        let mut next = Commit::new_empty(&store, Author::Stage, 6).unwrap();
        next.set_parent(&parent).unwrap();
        assert_eq!(next.parent_digest(), parent.digest());
        assert!(!next.is_initial());

        // a different stage keeps its own sequence
        let mut remote = Commit::new_empty(&store, Author::remote("r"), 0).unwrap();
        remote.set_parent(&parent).unwrap();
    }

    #[test]
    fn test_parent_must_be_boxed() {
        let store = MemoryStore::new();
        let open = Commit::new_empty(&store, Author::Stage, 0).unwrap();
        let mut child = Commit::new_empty(&store, Author::Stage, 1).unwrap();

        assert!(matches!(
            child.set_parent(&open),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_digest_covers_content() {
        let store = MemoryStore::new();
        let a = boxed(&store, 0, "one");
        let b = boxed(&store, 0, "two");
        assert_ne!(a.digest(), b.digest());
    }
}
