//! Single-file node store
//!
//! File format:
//! ```text
//! [HEADER: 64 bytes]
//!   - magic: 8 bytes ("CATFS_DB")
//!   - version: 4 bytes (u32 LE)
//!   - flags: 4 bytes
//!   - object_count: 8 bytes (u64 LE)
//!   - index_offset: 8 bytes (u64 LE)
//!   - refs_offset: 8 bytes (u64 LE)
//!   - refs_count: 8 bytes (u64 LE)
//!   - last_id: 8 bytes (u64 LE)
//!   - reserved: 8 bytes
//!
//! [OBJECTS: variable]
//!   - blob data, concatenated
//!
//! [INDEX: variable]
//!   - sorted array of (node digest, blob hash, offset, size) entries
//!
//! [REFS: variable]
//!   - ref names → digests
//!
//! [OBJECTS: variable]
//!   - blobs written after the last sync
//! ```
//!
//! Every sync appends a fresh index and refs section; the header points at
//! the newest one. Older sections are dead space.
//!
//! Nodes are keyed by their own digest, not by the hash of their encoding.
//! Persisting a node whose digest is unchanged (e.g. after its parent
//! reference was rewritten) appends a new blob and repoints the index.

use super::blob::{Blob, BlobType};
use super::{NodeSink, RefStore, TreeStore};
use crate::config::StoreConfig;
use crate::model::{Hash, Node, NodeKind};
use crate::{wire, Error, Result, MAGIC, VERSION};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, instrument, trace, warn};

const HEADER_SIZE: u64 = 64;

/// 32 (digest) + 32 (blob hash) + 8 (offset) + 4 (size)
const INDEX_ENTRY_SIZE: usize = 76;

/// Index entry for an object
#[derive(Clone, Debug)]
struct IndexEntry {
    content: Hash,
    offset: u64,
    size: u32,
}

/// In-memory index for fast lookups
struct Index {
    entries: HashMap<Hash, IndexEntry>,
}

impl Index {
    fn new() -> Self {
        Index {
            entries: HashMap::new(),
        }
    }
}

/// A node store backed by a single file
pub struct ObjectStore {
    /// Path to the database file
    path: std::path::PathBuf,
    config: StoreConfig,
    /// The file handle
    file: RwLock<File>,
    /// In-memory index
    index: RwLock<Index>,
    /// Refs (name → digest)
    refs: RwLock<HashMap<String, Hash>>,
    /// Current append position
    write_offset: RwLock<u64>,
    /// Last issued node id
    last_id: RwLock<u64>,
}

impl ObjectStore {
    /// Create a new database file
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with(path, StoreConfig::default())
    }

    /// Create a new database file with explicit settings
    pub fn create_with(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        // Write header
        let mut header = [0u8; HEADER_SIZE as usize];
        header[0..8].copy_from_slice(MAGIC);
        header[8..12].copy_from_slice(&VERSION.to_le_bytes());
        file.write_all(&header)?;
        file.sync_all()?;
        debug!(path = %path.display(), "created object store");

        Ok(ObjectStore {
            path,
            config,
            file: RwLock::new(file),
            index: RwLock::new(Index::new()),
            refs: RwLock::new(HashMap::new()),
            write_offset: RwLock::new(HEADER_SIZE),
            last_id: RwLock::new(0),
        })
    }

    /// Open an existing database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, StoreConfig::default())
    }

    /// Open an existing database file with explicit settings
    pub fn open_with(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        // Read and validate header
        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..8] != MAGIC {
            return Err(Error::InvalidFile("Invalid magic bytes".into()));
        }

        let version = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        if version != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                found: version,
            });
        }

        let object_count = le_u64(&header, 16)?;
        let index_offset = le_u64(&header, 24)?;
        let refs_offset = le_u64(&header, 32)?;
        let refs_count = le_u64(&header, 40)?;
        let last_id = le_u64(&header, 48)?;

        // Load index if it exists
        let mut index = Index::new();
        if index_offset > 0 && object_count > 0 {
            file.seek(SeekFrom::Start(index_offset))?;
            for _ in 0..object_count {
                let mut entry_buf = [0u8; INDEX_ENTRY_SIZE];
                file.read_exact(&mut entry_buf)?;

                let digest = Hash::from_slice(&entry_buf[0..32])?;
                let content = Hash::from_slice(&entry_buf[32..64])?;
                let offset = le_u64(&entry_buf, 64)?;
                let size = le_u32(&entry_buf, 72)?;

                index.entries.insert(
                    digest,
                    IndexEntry {
                        content,
                        offset,
                        size,
                    },
                );
            }
        }

        // Load refs
        let mut refs = HashMap::new();
        if refs_offset > 0 && refs_count > 0 {
            file.seek(SeekFrom::Start(refs_offset))?;
            for _ in 0..refs_count {
                let mut len_buf = [0u8; 2];
                file.read_exact(&mut len_buf)?;
                let name_len = u16::from_le_bytes(len_buf) as usize;

                let mut name_buf = vec![0u8; name_len];
                file.read_exact(&mut name_buf)?;
                let name = String::from_utf8_lossy(&name_buf).to_string();

                let mut hash_buf = [0u8; 32];
                file.read_exact(&mut hash_buf)?;
                refs.insert(name, Hash::from_bytes(hash_buf));
            }
        }

        // Append after everything, keeping the synced index readable
        let write_offset = file.seek(SeekFrom::End(0))?;
        debug!(
            path = %path.display(),
            objects = index.entries.len(),
            refs = refs.len(),
            "opened object store"
        );

        Ok(ObjectStore {
            path,
            config,
            file: RwLock::new(file),
            index: RwLock::new(index),
            refs: RwLock::new(refs),
            write_offset: RwLock::new(write_offset),
            last_id: RwLock::new(last_id),
        })
    }

    /// Open or create a database file
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Store a blob under `key`, replacing whatever was there
    pub fn put(&self, key: &Hash, blob: &Blob) -> Result<()> {
        let content = blob.hash();

        // Skip the write if the same bytes are already stored under this key
        {
            let index = self.index.read();
            if let Some(entry) = index.entries.get(key) {
                if entry.content == content {
                    return Ok(());
                }
            }
        }

        // Compress and write
        let compressed = blob.compress(self.config.compression_level)?;
        let size = u32::try_from(compressed.len())
            .map_err(|_| Error::Corruption(format!("blob for {} too large", key)))?;

        let offset = {
            let mut write_offset = self.write_offset.write();
            let offset = *write_offset;

            let mut file = self.file.write();
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&compressed)?;

            *write_offset = offset + size as u64;
            offset
        };

        // Update index
        {
            let mut index = self.index.write();
            index.entries.insert(
                *key,
                IndexEntry {
                    content,
                    offset,
                    size,
                },
            );
        }

        Ok(())
    }

    /// Retrieve the blob stored under `key`
    pub fn get(&self, key: &Hash) -> Result<Blob> {
        let entry = {
            let index = self.index.read();
            index.entries.get(key).cloned()
        };

        let entry = entry.ok_or_else(|| Error::StoreLookupFailed(key.to_hex()))?;

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(entry.offset))?;

        let mut data = vec![0u8; entry.size as usize];
        file.read_exact(&mut data)?;

        Blob::decompress(&data)
    }

    /// Check if a digest exists
    pub fn contains(&self, key: &Hash) -> bool {
        let index = self.index.read();
        index.entries.contains_key(key)
    }

    /// Get the number of objects in the store
    pub fn object_count(&self) -> usize {
        let index = self.index.read();
        index.entries.len()
    }

    /// Flush changes and write index to disk
    ///
    /// Index and refs are appended after the objects and the header is
    /// repointed last. New blobs go after the refs, so the index the header
    /// points at stays intact until the next sync replaces it.
    pub fn sync(&self) -> Result<()> {
        let index = self.index.read();
        let refs = self.refs.read();
        let mut write_offset = self.write_offset.write();
        let last_id = *self.last_id.read();
        let mut file = self.file.write();

        let index_offset = *write_offset;
        let index_size = index.entries.len() * INDEX_ENTRY_SIZE;
        let refs_offset = index_offset + index_size as u64;

        file.seek(SeekFrom::Start(index_offset))?;

        // Sort by digest for determinism
        let mut entries: Vec<_> = index.entries.iter().collect();
        entries.sort_by_key(|(h, _)| h.as_bytes());

        for (digest, entry) in entries {
            file.write_all(digest.as_bytes())?;
            file.write_all(entry.content.as_bytes())?;
            file.write_all(&entry.offset.to_le_bytes())?;
            file.write_all(&entry.size.to_le_bytes())?;
        }

        // Format: for each ref: name_len (u16) + name + hash (32 bytes)
        let mut ref_list: Vec<_> = refs.iter().collect();
        ref_list.sort_by_key(|(name, _)| *name);

        let mut refs_size = 0u64;
        for (name, hash) in ref_list {
            let name_bytes = name.as_bytes();
            let name_len = u16::try_from(name_bytes.len())
                .map_err(|_| Error::Corruption(format!("ref name too long: {}", name)))?;
            file.write_all(&name_len.to_le_bytes())?;
            file.write_all(name_bytes)?;
            file.write_all(hash.as_bytes())?;
            refs_size += 2 + name_bytes.len() as u64 + 32;
        }
        file.sync_data()?;

        // Update header
        file.seek(SeekFrom::Start(16))?;
        file.write_all(&(index.entries.len() as u64).to_le_bytes())?;
        file.write_all(&index_offset.to_le_bytes())?;
        file.write_all(&refs_offset.to_le_bytes())?;
        file.write_all(&(refs.len() as u64).to_le_bytes())?;
        file.write_all(&last_id.to_le_bytes())?;
        file.sync_all()?;

        *write_offset = refs_offset + refs_size;
        trace!(objects = index.entries.len(), "synced object store");
        Ok(())
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TreeStore for ObjectStore {
    fn next_id(&self) -> Result<u64> {
        let mut last_id = self.last_id.write();
        *last_id += 1;
        Ok(*last_id)
    }

    #[instrument(skip(self, digest), fields(digest = %digest))]
    fn node_by_digest(&self, digest: &Hash) -> Result<Node> {
        let blob = self.get(digest)?;
        let node = wire::decode(&blob.data)?;

        let expected = NodeKind::from(blob.blob_type);
        if node.kind() != expected {
            return Err(Error::Corruption(format!(
                "blob tagged {:?} holds a {}",
                blob.blob_type,
                node.kind()
            )));
        }
        if node.digest() != *digest {
            return Err(Error::Corruption(format!(
                "requested node {}, but got {}",
                digest,
                node.digest()
            )));
        }

        Ok(node)
    }
}

impl NodeSink for ObjectStore {
    #[instrument(skip(self, node), fields(digest = %node.digest(), kind = %node.kind()))]
    fn put_node(&self, node: &Node) -> Result<()> {
        let blob = Blob::new(BlobType::from(node.kind()), wire::encode(node)?);
        self.put(&node.digest(), &blob)
    }
}

impl RefStore for ObjectStore {
    fn get_ref(&self, name: &str) -> Option<Hash> {
        let refs = self.refs.read();
        refs.get(name).copied()
    }

    fn set_ref(&self, name: &str, digest: Hash) {
        let mut refs = self.refs.write();
        refs.insert(name.to_string(), digest);
    }

    fn list_refs(&self) -> Vec<(String, Hash)> {
        let refs = self.refs.read();
        refs.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }
}

impl Drop for ObjectStore {
    fn drop(&mut self) {
        if !self.config.sync_on_drop {
            return;
        }
        // Best-effort sync on drop
        if let Err(e) = self.sync() {
            warn!(path = %self.path.display(), error = %e, "sync on drop failed");
        }
    }
}

fn le_u64(buf: &[u8], at: usize) -> Result<u64> {
    buf.get(at..at + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| Error::InvalidFile(format!("truncated field at {}", at)))
}

fn le_u32(buf: &[u8], at: usize) -> Result<u32> {
    buf.get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| Error::InvalidFile(format!("truncated field at {}", at)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Author, Commit, Directory, File};
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, ObjectStore) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.catfs");
        let store = ObjectStore::create(&path).unwrap();
        (dir, store)
    }

    #[test]
    fn test_create_and_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.catfs");

        {
            let store = ObjectStore::create(&path).unwrap();
            assert_eq!(store.object_count(), 0);
        }

        {
            let store = ObjectStore::open(&path).unwrap();
            assert_eq!(store.object_count(), 0);
        }
    }

    #[test]
    fn test_rejects_foreign_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk");
        std::fs::write(&path, [7u8; 64]).unwrap();

        assert!(matches!(
            ObjectStore::open(&path),
            Err(Error::InvalidFile(_))
        ));
    }

    #[test]
    fn test_directory_storage() {
        let (_dir, store) = setup();
        let mut root = Directory::new_root(&store).unwrap();
        store.put_node(&root.clone().into()).unwrap();

        let mut f: Node = File::new(&store, "a", 5, Hash::digest(b"a")).unwrap().into();
        root.add(&store, &mut f).unwrap();
        store.put_node(&f).unwrap();
        store.put_node(&root.clone().into()).unwrap();

        let restored = store.directory_by_digest(&root.digest()).unwrap();
        assert_eq!(restored, root);
        assert_eq!(restored.child(&store, "a").unwrap().unwrap(), f);
    }

    #[test]
    fn test_commit_storage() {
        let (_dir, store) = setup();
        let mut commit = Commit::new_empty(&store, Author::Stage, 0).unwrap();
        commit.box_commit(Author::Stage, "Initial commit").unwrap();
        store.put_node(&commit.clone().into()).unwrap();

        let retrieved = store.commit_by_digest(&commit.digest()).unwrap();
        assert_eq!(retrieved, commit);
        assert!(store.directory_by_digest(&commit.digest()).is_err());
    }

    #[test]
    fn test_deduplication() {
        let (_dir, store) = setup();
        let file: Node = File::new(&store, "dup", 1, Hash::digest(b"dup")).unwrap().into();

        store.put_node(&file).unwrap();
        let offset = *store.write_offset.read();
        store.put_node(&file).unwrap();

        assert_eq!(*store.write_offset.read(), offset);
        assert_eq!(store.object_count(), 1);
    }

    #[test]
    fn test_rewrite_same_digest() {
        let (_dir, store) = setup();
        let mut file: Node = File::new(&store, "f", 1, Hash::digest(b"f")).unwrap().into();
        store.put_node(&file).unwrap();

        let parent = Hash::digest(b"some parent");
        file.set_parent_digest(parent).unwrap();
        store.put_node(&file).unwrap();

        assert_eq!(store.object_count(), 1);
        let restored = store.node_by_digest(&file.digest()).unwrap();
        assert_eq!(restored.parent_digest(), parent);
    }

    #[test]
    fn test_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.catfs");

        let root;
        let last_id;
        {
            let store = ObjectStore::create(&path).unwrap();
            root = Directory::new_root(&store).unwrap();
            store.put_node(&root.clone().into()).unwrap();
            store.set_ref("CURR", root.digest());
            last_id = store.next_id().unwrap();
            store.sync().unwrap();
        }

        {
            let store = ObjectStore::open(&path).unwrap();
            assert_eq!(store.directory_by_digest(&root.digest()).unwrap(), root);
            assert_eq!(store.get_ref("CURR"), Some(root.digest()));
            assert!(store.next_id().unwrap() > last_id);
        }
    }

    #[test]
    fn test_puts_after_sync_keep_synced_objects() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.catfs");
        let config = StoreConfig {
            sync_on_drop: false,
            ..StoreConfig::default()
        };

        let first: Node;
        {
            let store = ObjectStore::create_with(&path, config.clone()).unwrap();
            first = File::new(&store, "first", 1, Hash::digest(b"first"))
                .unwrap()
                .into();
            store.put_node(&first).unwrap();
            store.set_ref("HEAD", first.digest());
            store.sync().unwrap();

            for i in 0..50 {
                let name = format!("later{}", i);
                let f: Node = File::new(&store, name.as_str(), i, Hash::digest(name.as_bytes()))
                    .unwrap()
                    .into();
                store.put_node(&f).unwrap();
            }
        }

        let store = ObjectStore::open_with(&path, config).unwrap();
        assert_eq!(store.object_count(), 1);
        assert_eq!(store.node_by_digest(&first.digest()).unwrap(), first);
        assert_eq!(store.get_ref("HEAD"), Some(first.digest()));
    }

    #[test]
    fn test_repeated_sync_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.catfs");

        let mut nodes: Vec<Node> = Vec::new();
        {
            let store = ObjectStore::create(&path).unwrap();
            for round in 0..3u64 {
                for i in 0..10u64 {
                    let name = format!("r{}-{}", round, i);
                    let f: Node = File::new(&store, name.as_str(), i, Hash::digest(name.as_bytes()))
                        .unwrap()
                        .into();
                    store.put_node(&f).unwrap();
                    nodes.push(f);
                }
                store.sync().unwrap();
            }
        }

        // reopen twice, writing in between
        {
            let store = ObjectStore::open(&path).unwrap();
            let extra: Node = File::new(&store, "extra", 3, Hash::digest(b"extra"))
                .unwrap()
                .into();
            store.put_node(&extra).unwrap();
            nodes.push(extra);
        }

        let store = ObjectStore::open(&path).unwrap();
        assert_eq!(store.object_count(), nodes.len());
        for node in &nodes {
            assert_eq!(&store.node_by_digest(&node.digest()).unwrap(), node);
        }
    }

    #[test]
    fn test_no_sync_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.catfs");
        let config = StoreConfig {
            sync_on_drop: false,
            ..StoreConfig::default()
        };

        {
            let store = ObjectStore::create_with(&path, config.clone()).unwrap();
            let file: Node = File::new(&store, "f", 1, Hash::digest(b"f")).unwrap().into();
            store.put_node(&file).unwrap();
        }

        let store = ObjectStore::open_with(&path, config).unwrap();
        assert_eq!(store.object_count(), 0);
    }

    #[test]
    fn test_refs() {
        let (_dir, store) = setup();
        let commit_hash = Hash::digest(b"commit");

        assert_eq!(store.get_ref("HEAD"), None);
        store.set_ref("HEAD", commit_hash);
        assert_eq!(store.get_ref("HEAD"), Some(commit_hash));
        assert_eq!(store.list_refs(), vec![("HEAD".to_string(), commit_hash)]);
    }
}
