//! Commit history operations

use crate::model::{Author, Commit, Directory, Hash};
use crate::store::{NodeSink, RefStore, TreeStore};
use crate::Result;
use tracing::debug;

/// Ref pointing at the newest commit
pub const HEAD: &str = "HEAD";

/// Ref pointing at the root directory of the newest commit
pub const CURR: &str = "CURR";

/// Produces commits for one authoring stage and walks the history
pub struct History<'a, S: ?Sized> {
    store: &'a S,
    stage: Author,
}

impl<'a, S> History<'a, S>
where
    S: TreeStore + NodeSink + RefStore + ?Sized,
{
    /// History of the local stage
    pub fn new(store: &'a S) -> Self {
        Self::for_stage(store, Author::Stage)
    }

    pub fn for_stage(store: &'a S, stage: Author) -> Self {
        History { store, stage }
    }

    pub fn stage(&self) -> &Author {
        &self.stage
    }

    /// The newest commit, if there is one
    pub fn head(&self) -> Result<Option<Commit>> {
        match self.store.get_ref(HEAD).filter(|h| !h.is_zero()) {
            Some(digest) => self.store.commit_by_digest(&digest).map(Some),
            None => Ok(None),
        }
    }

    /// Snapshot `root` on top of HEAD
    ///
    /// `root` must already be persisted.
    pub fn commit(&self, root: &Directory, author: Author, message: &str) -> Result<Commit> {
        self.make_commit(root, author, None, message)
    }

    /// Snapshot `root` and record that it incorporates `remote`'s history
    /// up to `remote_head`
    pub fn merge(
        &self,
        root: &Directory,
        author: Author,
        remote: Author,
        remote_head: Hash,
        message: &str,
    ) -> Result<Commit> {
        self.make_commit(root, author, Some((remote, remote_head)), message)
    }

    /// Commits from HEAD backwards, newest first
    pub fn log(&self, limit: Option<usize>) -> Result<Vec<Commit>> {
        let mut result = Vec::new();
        let limit = limit.unwrap_or(usize::MAX);
        let mut current = if limit == 0 { None } else { self.head()? };

        // Parents past the limit are never resolved
        while let Some(commit) = current {
            current = if result.len() + 1 < limit {
                commit.parent(self.store)?
            } else {
                None
            };
            result.push(commit);
        }

        Ok(result)
    }

    /// The newest commit that merged from `remote`
    pub fn last_merge_with(&self, remote: &Author) -> Result<Option<Commit>> {
        let mut current = self.head()?;
        while let Some(commit) = current {
            if matches!(commit.merge_marker(), Some((who, _)) if who == remote) {
                return Ok(Some(commit));
            }
            current = commit.parent(self.store)?;
        }
        Ok(None)
    }

    fn make_commit(
        &self,
        root: &Directory,
        author: Author,
        merge: Option<(Author, Hash)>,
        message: &str,
    ) -> Result<Commit> {
        // The snapshot must resolve to a directory
        self.store.directory_by_digest(&root.digest())?;

        let head = self.head()?;
        let index = head.as_ref().map_or(0, |c| c.index() + 1);

        let mut commit = Commit::new_empty(self.store, self.stage.clone(), index)?;
        commit.set_root(root.digest())?;
        if let Some(parent) = &head {
            commit.set_parent(parent)?;
        }
        if let Some((remote, remote_head)) = merge {
            commit.set_merge_marker(remote, remote_head);
        }
        commit.box_commit(author, message)?;

        self.store.put_node(&commit.clone().into())?;
        self.store.set_ref(HEAD, commit.digest());
        self.store.set_ref(CURR, root.digest());

        debug!(
            commit = %commit.name(),
            index = commit.index(),
            root = %root.digest().short(),
            "moved HEAD"
        );
        Ok(commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{File, Node};
    use crate::store::MemoryStore;

    fn persisted_root(store: &MemoryStore) -> Directory {
        let root = Directory::new_root(store).unwrap();
        store.put_node(&root.clone().into()).unwrap();
        root
    }

    #[test]
    fn test_commit_chain() {
        let store = MemoryStore::new();
        let history = History::new(&store);
        let mut root = persisted_root(&store);

        let c0 = history.commit(&root, Author::Stage, "init").unwrap();
        assert!(c0.is_initial());
        assert_eq!(c0.index(), 0);
        assert_eq!(c0.root(), root.digest());

        let mut f: Node = File::new(&store, "a", 3, Hash::digest(b"a")).unwrap().into();
        root.add(&store, &mut f).unwrap();
        store.put_node(&f).unwrap();
        store.put_node(&root.clone().into()).unwrap();

        let c1 = history.commit(&root, Author::Stage, "add a").unwrap();
        assert_eq!(c1.index(), 1);
        assert_eq!(c1.parent_digest(), c0.digest());
        assert_eq!(store.get_ref(HEAD), Some(c1.digest()));
        assert_eq!(store.get_ref(CURR), Some(root.digest()));

        // the old snapshot is still resolvable
        let old_root = store.directory_by_digest(&c0.root()).unwrap();
        assert_eq!(old_root.n_children(), 0);
    }

    #[test]
    fn test_log_newest_first() {
        let store = MemoryStore::new();
        let history = History::new(&store);
        let root = persisted_root(&store);

        for msg in ["one", "two", "three"] {
            history.commit(&root, Author::Stage, msg).unwrap();
        }

        let log = history.log(None).unwrap();
        let messages: Vec<_> = log.iter().map(|c| c.message()).collect();
        assert_eq!(messages, vec!["three", "two", "one"]);

        // indices strictly decrease going back
        assert!(log.windows(2).all(|w| w[0].index() > w[1].index()));

        assert_eq!(history.log(Some(2)).unwrap().len(), 2);
        assert!(history.log(Some(0)).unwrap().is_empty());
    }

    #[test]
    fn test_log_limit_stops_before_missing_parent() {
        let store = MemoryStore::new();
        let elsewhere = MemoryStore::new();
        let root = persisted_root(&store);

        // parent only exists in another store
        let mut parent = Commit::new_empty(&elsewhere, Author::Stage, 0).unwrap();
        parent.box_commit(Author::Stage, "lost").unwrap();

        let mut tip = Commit::new_empty(&store, Author::Stage, 1).unwrap();
        tip.set_root(root.digest()).unwrap();
        tip.set_parent(&parent).unwrap();
        tip.box_commit(Author::Stage, "tip").unwrap();
        store.put_node(&tip.clone().into()).unwrap();
        store.set_ref(HEAD, tip.digest());

        let history = History::new(&store);
        let log = history.log(Some(1)).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].digest(), tip.digest());

        assert!(history.log(None).is_err());
    }

    #[test]
    fn test_empty_history() {
        let store = MemoryStore::new();
        let history = History::new(&store);
        assert!(history.head().unwrap().is_none());
        assert!(history.log(None).unwrap().is_empty());
    }

    #[test]
    fn test_root_must_be_persisted() {
        let store = MemoryStore::new();
        let history = History::new(&store);
        let root = Directory::new_root(&store).unwrap();

        assert!(history.commit(&root, Author::Stage, "nope").is_err());
        assert!(history.head().unwrap().is_none());
    }

    #[test]
    fn test_merge_marker_recorded() {
        let store = MemoryStore::new();
        let history = History::new(&store);
        let root = persisted_root(&store);
        let alice = Author::remote("alice");

        history.commit(&root, Author::Stage, "base").unwrap();
        let merged = history
            .merge(
                &root,
                Author::Stage,
                alice.clone(),
                Hash::digest(b"alice-head"),
                "merge alice",
            )
            .unwrap();
        history.commit(&root, Author::Stage, "after").unwrap();

        let found = history.last_merge_with(&alice).unwrap().unwrap();
        assert_eq!(found.digest(), merged.digest());
        assert_eq!(
            found.merge_marker(),
            Some((&alice, Hash::digest(b"alice-head")))
        );
        assert!(history
            .last_merge_with(&Author::remote("bob"))
            .unwrap()
            .is_none());
    }
}
