//! In-memory node store

use super::{NodeSink, RefStore, TreeStore};
use crate::model::{Hash, Node};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// An arena of nodes keyed by digest
///
/// Old versions of a directory stay reachable under their old digest, which
/// is what lets commits point at earlier roots.
#[derive(Default)]
pub struct MemoryStore {
    nodes: RwLock<HashMap<Hash, Node>>,
    refs: RwLock<HashMap<String, Hash>>,
    last_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nodes
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    pub fn contains(&self, digest: &Hash) -> bool {
        self.nodes.read().contains_key(digest)
    }
}

impl TreeStore for MemoryStore {
    fn next_id(&self) -> Result<u64> {
        Ok(self.last_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn node_by_digest(&self, digest: &Hash) -> Result<Node> {
        trace!(digest = %digest, "memory get");
        self.nodes
            .read()
            .get(digest)
            .cloned()
            .ok_or_else(|| Error::StoreLookupFailed(digest.to_hex()))
    }
}

impl NodeSink for MemoryStore {
    fn put_node(&self, node: &Node) -> Result<()> {
        trace!(digest = %node.digest(), kind = %node.kind(), "memory put");
        self.nodes.write().insert(node.digest(), node.clone());
        Ok(())
    }
}

impl RefStore for MemoryStore {
    fn get_ref(&self, name: &str) -> Option<Hash> {
        self.refs.read().get(name).copied()
    }

    fn set_ref(&self, name: &str, digest: Hash) {
        self.refs.write().insert(name.to_string(), digest);
    }

    fn list_refs(&self) -> Vec<(String, Hash)> {
        self.refs
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}
