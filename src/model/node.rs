//! Node - the closed set of tree elements
//!
//! Every element of the tree (files, directories and commits) shares the same
//! capability set: a name, a digest, a size, a modification time, a parent
//! reference, a numeric id and a kind. References between nodes are digests;
//! the `TreeStore` resolves them.

use super::{Commit, Directory, File, Hash};
use crate::store::TreeStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminator for the node variants
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    File,
    Directory,
    Commit,
}

impl NodeKind {
    pub fn as_byte(&self) -> u8 {
        match self {
            NodeKind::File => 0,
            NodeKind::Directory => 1,
            NodeKind::Commit => 2,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(NodeKind::File),
            1 => Some(NodeKind::Directory),
            2 => Some(NodeKind::Commit),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::File => "file",
            NodeKind::Directory => "directory",
            NodeKind::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// Any element of the tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    File(File),
    Directory(Directory),
    Commit(Commit),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::File(f) => f.name(),
            Node::Directory(d) => d.name(),
            Node::Commit(c) => c.name(),
        }
    }

    pub fn digest(&self) -> Hash {
        match self {
            Node::File(f) => f.digest(),
            Node::Directory(d) => d.digest(),
            Node::Commit(c) => c.digest(),
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Node::File(f) => f.size(),
            Node::Directory(d) => d.size(),
            Node::Commit(c) => c.size(),
        }
    }

    /// Modification time (unix millis)
    pub fn mod_time(&self) -> u64 {
        match self {
            Node::File(f) => f.mod_time(),
            Node::Directory(d) => d.mod_time(),
            Node::Commit(c) => c.mod_time(),
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Node::File(f) => f.id(),
            Node::Directory(d) => d.id(),
            Node::Commit(c) => c.id(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::File(_) => NodeKind::File,
            Node::Directory(_) => NodeKind::Directory,
            Node::Commit(_) => NodeKind::Commit,
        }
    }

    /// Digest of the parent (ZERO if there is none)
    ///
    /// For files and directories this is the containing directory, for
    /// commits the previous commit.
    pub fn parent_digest(&self) -> Hash {
        match self {
            Node::File(f) => f.parent_digest(),
            Node::Directory(d) => d.parent_digest(),
            Node::Commit(c) => c.parent_digest(),
        }
    }

    /// Resolve the parent through the store
    pub fn parent<S: TreeStore + ?Sized>(&self, store: &S) -> Result<Option<Node>> {
        let parent = self.parent_digest();
        if parent.is_zero() {
            return Ok(None);
        }
        store.node_by_digest(&parent).map(Some)
    }

    /// Point this node at a new parent, or detach it with `None`
    pub fn set_parent(&mut self, parent: Option<&Node>) -> Result<()> {
        match (self, parent) {
            (Node::Commit(c), Some(Node::Commit(p))) => c.set_parent(p),
            (Node::Commit(_), Some(other)) => Err(Error::TypeMismatch {
                expected: NodeKind::Commit,
                found: other.kind(),
            }),
            (Node::Commit(c), None) => c.clear_parent(),
            (node, Some(Node::Directory(d))) => node.set_parent_digest(d.digest()),
            (_, Some(other)) => Err(Error::TypeMismatch {
                expected: NodeKind::Directory,
                found: other.kind(),
            }),
            (node, None) => node.set_parent_digest(Hash::ZERO),
        }
    }

    /// Rewrite the recorded parent directory digest of a file or directory
    pub(crate) fn set_parent_digest(&mut self, parent: Hash) -> Result<()> {
        match self {
            Node::File(f) => f.parent = parent,
            Node::Directory(d) => d.parent = parent,
            Node::Commit(_) => {
                return Err(Error::TypeMismatch {
                    expected: NodeKind::Directory,
                    found: NodeKind::Commit,
                })
            }
        }
        Ok(())
    }

    pub fn as_directory(&self) -> Option<&Directory> {
        match self {
            Node::Directory(d) => Some(d),
            _ => None,
        }
    }

    pub fn into_directory(self) -> Result<Directory> {
        match self {
            Node::Directory(d) => Ok(d),
            other => Err(Error::TypeMismatch {
                expected: NodeKind::Directory,
                found: other.kind(),
            }),
        }
    }

    pub fn into_commit(self) -> Result<Commit> {
        match self {
            Node::Commit(c) => Ok(c),
            other => Err(Error::TypeMismatch {
                expected: NodeKind::Commit,
                found: other.kind(),
            }),
        }
    }

    pub fn into_file(self) -> Result<File> {
        match self {
            Node::File(f) => Ok(f),
            other => Err(Error::TypeMismatch {
                expected: NodeKind::File,
                found: other.kind(),
            }),
        }
    }
}

impl From<File> for Node {
    fn from(file: File) -> Self {
        Node::File(file)
    }
}

impl From<Directory> for Node {
    fn from(dir: Directory) -> Self {
        Node::Directory(dir)
    }
}

impl From<Commit> for Node {
    fn from(commit: Commit) -> Self {
        Node::Commit(commit)
    }
}

/// Visit `node` and everything below it
///
/// Non-directories are visited once. Directories are visited before their
/// children when `depth_first` is false and after them when it is true.
/// Children are resolved through the store and visited in name order.
/// The tree must not contain reference cycles.
pub fn walk<S, F>(store: &S, node: &Node, depth_first: bool, visit: &mut F) -> Result<()>
where
    S: TreeStore + ?Sized,
    F: FnMut(&Node) -> Result<()>,
{
    let dir = match node {
        Node::Directory(d) => d,
        other => return visit(other),
    };

    if !depth_first {
        visit(node)?;
    }

    for (_, digest) in dir.children() {
        let child = store.node_by_digest(digest)?;
        walk(store, &child, depth_first, visit)?;
    }

    if depth_first {
        visit(node)?;
    }

    Ok(())
}
