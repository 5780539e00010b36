//! # catfs
//!
//! A versioned, content-addressed filesystem tree.
//!
//! Every directory carries an aggregate digest that folds in the digests of
//! everything below it. Edits update that digest incrementally along the path
//! to the root, so the root digest always identifies the current state of the
//! whole tree. Commits snapshot root digests over time and record merges
//! between replicas.
//!
//! ## Core Concepts
//!
//! - **Nodes**: files, directories and commits, referring to each other by digest
//! - **Tree store**: resolves digests to nodes and hands out ids
//! - **Commits**: immutable snapshots chained through their parents
//! - **Wire format**: a flat, versioned message per node
//!
//! ## Example
//!
//! ```ignore
//! use catfs::{Author, Directory, File, History, MemoryStore, NodeSink};
//!
//! let store = MemoryStore::new();
//! let mut root = Directory::new_root(&store)?;
//! store.put_node(&root.clone().into())?;
//!
//! let mut file = File::new(&store, "a.txt", 10, content_hash)?.into();
//! root.add(&store, &mut file)?.persist(&store)?;
//! store.put_node(&file)?;
//! store.put_node(&root.clone().into())?;
//!
//! History::new(&store).commit(&root, Author::Stage, "init")?;
//! ```

pub mod config;
pub mod model;
pub mod ops;
pub mod store;
pub mod wire;

mod error;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use model::{
    walk, Author, Changeset, Commit, CommitState, Directory, File, Hash, MergeMarker, Node,
    NodeKind,
};
pub use ops::History;
pub use store::{MemoryStore, NodeSink, ObjectStore, RefStore, TreeStore};
pub use wire::{NodeMessage, WIRE_VERSION};

/// Database version for format compatibility
pub const VERSION: u32 = 1;

/// Magic bytes for file identification
pub const MAGIC: &[u8; 8] = b"CATFS_DB";
