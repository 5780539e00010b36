//! Directory - the mutable container node of the tree
//!
//! A directory's digest starts out as the hash of its path and from then on
//! only changes by folding digests in and out with `Hash::combine`:
//!
//! - adding a child folds the child's digest into the directory and into
//!   every ancestor up to the root
//! - removing a child folds the same digest out again
//! - a change below a directory folds the same delta into it
//!
//! This keeps every edit O(depth) instead of re-hashing whole subtrees, but
//! it also means the digest depends on the history of edits, not only on the
//! current children. All structural edits must therefore go through
//! [`Directory::add`] and [`Directory::remove_child`].
//!
//! The directory never persists anything. Each mutation returns a
//! [`Changeset`] with the other objects it touched; the caller writes those
//! (plus the directory itself and the child) back to the store. A failed
//! upward walk leaves the already visited objects mutated in memory, with no
//! undo, so the caller should drop the whole changeset and reload.

use super::{now_millis, Hash, Node, NodeKind};
use crate::store::{NodeSink, TreeStore};
use crate::{Error, Result};
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

/// A directory node
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Directory {
    pub(crate) id: u64,
    pub(crate) name: String,
    /// Sum of the sizes of all children
    pub(crate) size: u64,
    pub(crate) mod_time: u64,
    /// Digest of the containing directory (ZERO for the root)
    pub(crate) parent: Hash,
    pub(crate) digest: Hash,
    /// Child name → child digest
    pub(crate) children: BTreeMap<String, Hash>,
}

/// Objects mutated by a directory edit, besides the edited directory and
/// the child itself
///
/// Contains every ancestor up to the root plus every direct child whose
/// recorded parent digest had to be rewritten.
#[derive(Clone, Debug, Default)]
pub struct Changeset {
    nodes: Vec<Node>,
}

impl Changeset {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The new state of the root, if the upward walk reached one
    pub fn root(&self) -> Option<&Directory> {
        self.nodes
            .iter()
            .rev()
            .filter_map(Node::as_directory)
            .find(|d| d.is_root())
    }

    /// Write every touched object to `sink`
    pub fn persist<K: NodeSink + ?Sized>(&self, sink: &K) -> Result<()> {
        for node in &self.nodes {
            sink.put_node(node)?;
        }
        Ok(())
    }

    fn push(&mut self, node: impl Into<Node>) {
        self.nodes.push(node.into());
    }
}

impl Directory {
    /// Create a new, empty directory
    ///
    /// The initial digest is the hash of the directory's path, which makes
    /// it unique within the tree. When a parent is given the new directory
    /// is added to it right away; the returned changeset is the one of that
    /// `add` and `parent` must be persisted as well.
    pub fn new_empty<S: TreeStore + ?Sized>(
        store: &S,
        parent: Option<&mut Directory>,
        name: &str,
    ) -> Result<(Directory, Changeset)> {
        let path = match parent.as_deref() {
            Some(p) => join_path(&p.path(store)?, name),
            None => join_path("/", name),
        };

        let dir = Directory {
            id: store.next_id()?,
            name: name.to_string(),
            size: 0,
            mod_time: now_millis(),
            parent: Hash::ZERO,
            digest: Hash::digest(path.as_bytes()),
            children: BTreeMap::new(),
        };
        debug!(path = %path, id = dir.id, "created directory");

        match parent {
            None => Ok((dir, Changeset::default())),
            Some(parent) => {
                let mut node = Node::Directory(dir);
                let changes = parent.add(store, &mut node)?;
                Ok((node.into_directory()?, changes))
            }
        }
    }

    /// Create a new root directory
    pub fn new_root<S: TreeStore + ?Sized>(store: &S) -> Result<Directory> {
        Self::new_empty(store, None, "").map(|(dir, _)| dir)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Aggregate size of everything below this directory
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

    pub fn is_root(&self) -> bool {
        self.parent.is_zero()
    }

    pub fn n_children(&self) -> usize {
        self.children.len()
    }

    /// Iterate over (name, digest) of all children in name order
    pub fn children(&self) -> impl Iterator<Item = (&str, &Hash)> {
        self.children.iter().map(|(name, digest)| (name.as_str(), digest))
    }

    /// The recorded digest of the child called `name`
    pub fn child_digest(&self, name: &str) -> Option<Hash> {
        self.children.get(name).copied()
    }

    /// Resolve the child called `name`; a missing name is not an error
    pub fn child<S: TreeStore + ?Sized>(&self, store: &S, name: &str) -> Result<Option<Node>> {
        self.children
            .get(name)
            .map(|digest| store.node_by_digest(digest))
            .transpose()
    }

    /// Resolve the containing directory
    pub fn parent<S: TreeStore + ?Sized>(&self, store: &S) -> Result<Option<Directory>> {
        if self.parent.is_zero() {
            return Ok(None);
        }
        store.directory_by_digest(&self.parent).map(Some)
    }

    /// Visit this directory and then every ancestor up to and including the
    /// root. Stops at the first error.
    pub fn up<S, F>(&self, store: &S, mut visit: F) -> Result<()>
    where
        S: TreeStore + ?Sized,
        F: FnMut(&Directory) -> Result<()>,
    {
        visit(self)?;

        let mut next = self.parent;
        while !next.is_zero() {
            let dir = store.directory_by_digest(&next)?;
            visit(&dir)?;
            next = dir.parent;
        }

        Ok(())
    }

    /// Absolute path of this directory, derived from the names on the way up
    pub fn path<S: TreeStore + ?Sized>(&self, store: &S) -> Result<String> {
        let mut names = Vec::new();
        self.up(store, |dir| {
            if !dir.is_root() {
                names.push(dir.name.clone());
            }
            Ok(())
        })?;

        names.reverse();
        Ok(format!("/{}", names.join("/")))
    }

    /// Resolve a slash separated path relative to this directory
    ///
    /// Empty and `.` components are skipped, `..` drops the previous
    /// component (but never climbs above this directory). A missing
    /// component yields `Ok(None)`.
    pub fn lookup<S: TreeStore + ?Sized>(&self, store: &S, path: &str) -> Result<Option<Node>> {
        let mut elems: Vec<&str> = Vec::new();
        for elem in path.split('/') {
            match elem {
                "" | "." => {}
                ".." => {
                    elems.pop();
                }
                elem => elems.push(elem),
            }
        }

        let mut current = Node::Directory(self.clone());
        for elem in elems {
            let next = match &current {
                Node::Directory(dir) => dir.child(store, elem)?,
                _ => None,
            };
            match next {
                Some(node) => current = node,
                None => return Ok(None),
            }
        }

        Ok(Some(current))
    }

    /// Add `child` under its name
    ///
    /// An existing entry with the same name is replaced: the old child is
    /// resolved through the store and its size and digest are folded out
    /// before the new one is folded in. Re-adding an entry with an identical
    /// digest only refreshes the child's parent reference.
    ///
    /// On success `child` points at this directory's new digest.
    pub fn add<S: TreeStore + ?Sized>(&mut self, store: &S, child: &mut Node) -> Result<Changeset> {
        if child.kind() == NodeKind::Commit {
            return Err(Error::TypeMismatch {
                expected: NodeKind::File,
                found: NodeKind::Commit,
            });
        }

        let name = child.name().to_string();
        validate_name(&name)?;

        let digest = child.digest();
        let size = child.size();

        let (fold, shrink) = match self.children.get(&name) {
            None => (digest, 0),
            Some(old) if *old == digest => {
                child.set_parent_digest(self.digest)?;
                return Ok(Changeset::default());
            }
            Some(old) => {
                let previous = store.node_by_digest(old)?;
                warn!(name = %name, dir = %self.name, "replacing existing child");
                (digest.combined(old), previous.size())
            }
        };

        self.children.insert(name.clone(), digest);
        let changes = self.propagate(store, &fold, size, shrink, &name)?;
        child.set_parent_digest(self.digest)?;

        debug!(name = %name, dir = %self.name, touched = changes.len(), "added child");
        Ok(changes)
    }

    /// Remove `child` from this directory
    ///
    /// The recorded digest of the entry is what gets folded out, so a
    /// directory cannot remove itself; removal is only possible from the
    /// parent. If `child` is an outdated copy of the entry, the recorded
    /// entry is resolved through the store to find the size to subtract.
    /// Fails with `NoSuchEntry` if the name is unknown.
    pub fn remove_child<S: TreeStore + ?Sized>(
        &mut self,
        store: &S,
        child: &mut Node,
    ) -> Result<Changeset> {
        let name = child.name().to_string();
        let recorded = *self
            .children
            .get(&name)
            .ok_or_else(|| Error::NoSuchEntry(name.clone()))?;

        // A stale handle does not know the size that was folded in
        let shrink = if recorded == child.digest() {
            child.size()
        } else {
            warn!(name = %name, dir = %self.name, "removing child with stale digest");
            store.node_by_digest(&recorded)?.size()
        };

        child.set_parent_digest(Hash::ZERO)?;
        self.children.remove(&name);

        let changes = self.propagate(store, &recorded, 0, shrink, &name)?;
        debug!(name = %name, dir = %self.name, touched = changes.len(), "removed child");
        Ok(changes)
    }

    /// Fold `fold` and the size delta into this directory and every
    /// ancestor, keeping parent and child references consistent on the way.
    ///
    /// `skip` names the child that triggered the edit; the caller updates
    /// its parent reference itself.
    fn propagate<S: TreeStore + ?Sized>(
        &mut self,
        store: &S,
        fold: &Hash,
        grow: u64,
        shrink: u64,
        skip: &str,
    ) -> Result<Changeset> {
        let mut changes = Changeset::default();

        self.size = resize(self.size, grow, shrink, &self.name)?;
        self.digest.combine(fold);
        self.mod_time = now_millis();
        reparent_children(store, self.digest, &self.children, skip, &mut changes)?;

        let mut below_name = self.name.clone();
        let mut below_digest = self.digest;
        let mut prev: Option<Directory> = None;
        let mut next = self.parent;

        while !next.is_zero() {
            let mut ancestor = store.directory_by_digest(&next)?;
            trace!(ancestor = %ancestor.name, digest = %next, "updating ancestor");

            match ancestor.children.get_mut(&below_name) {
                Some(link) => *link = below_digest,
                None => {
                    return Err(Error::Corruption(format!(
                        "directory {} does not list child {}",
                        ancestor.name, below_name
                    )))
                }
            }

            ancestor.size = resize(ancestor.size, grow, shrink, &ancestor.name)?;
            ancestor.digest.combine(fold);
            ancestor.mod_time = now_millis();

            match prev.as_mut() {
                Some(p) => p.parent = ancestor.digest,
                None => self.parent = ancestor.digest,
            }
            if let Some(p) = prev.take() {
                changes.push(p);
            }

            reparent_children(
                store,
                ancestor.digest,
                &ancestor.children,
                &below_name,
                &mut changes,
            )?;

            below_name = ancestor.name.clone();
            below_digest = ancestor.digest;
            next = ancestor.parent;
            prev = Some(ancestor);
        }

        if let Some(p) = prev {
            changes.push(p);
        }

        Ok(changes)
    }
}

/// Point every child except `skip` at the new `parent` digest
fn reparent_children<S: TreeStore + ?Sized>(
    store: &S,
    parent: Hash,
    children: &BTreeMap<String, Hash>,
    skip: &str,
    changes: &mut Changeset,
) -> Result<()> {
    for (name, digest) in children {
        if name == skip {
            continue;
        }
        let mut child = store.node_by_digest(digest)?;
        child.set_parent_digest(parent)?;
        changes.push(child);
    }
    Ok(())
}

fn resize(size: u64, grow: u64, shrink: u64, name: &str) -> Result<u64> {
    size.checked_add(grow)
        .and_then(|s| s.checked_sub(shrink))
        .ok_or_else(|| Error::Corruption(format!("size of {} out of range", name)))
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::MalformedInput("child name cannot be empty".into()));
    }
    if name.contains('/') {
        return Err(Error::MalformedInput(format!(
            "child name cannot contain '/': {}",
            name
        )));
    }
    Ok(())
}

fn join_path(base: &str, name: &str) -> String {
    match (base.trim_end_matches('/'), name) {
        (base, "") if base.is_empty() => "/".to_string(),
        (base, "") => base.to_string(),
        (base, name) => format!("{}/{}", base, name),
    }
}
