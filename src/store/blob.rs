//! Blob type - the unit of on-disk storage

use crate::model::{Hash, NodeKind};
use serde::{Deserialize, Serialize};

/// Type tag for blobs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobType {
    File,
    Directory,
    Commit,
}

impl BlobType {
    pub fn as_byte(&self) -> u8 {
        match self {
            BlobType::File => 0,
            BlobType::Directory => 1,
            BlobType::Commit => 2,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(BlobType::File),
            1 => Some(BlobType::Directory),
            2 => Some(BlobType::Commit),
            _ => None,
        }
    }
}

impl From<NodeKind> for BlobType {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::File => BlobType::File,
            NodeKind::Directory => BlobType::Directory,
            NodeKind::Commit => BlobType::Commit,
        }
    }
}

impl From<BlobType> for NodeKind {
    fn from(blob_type: BlobType) -> Self {
        match blob_type {
            BlobType::File => NodeKind::File,
            BlobType::Directory => NodeKind::Directory,
            BlobType::Commit => NodeKind::Commit,
        }
    }
}

/// A blob is a typed, compressed chunk of data
#[derive(Clone, Debug)]
pub struct Blob {
    /// Type of content
    pub blob_type: BlobType,
    /// Raw data (uncompressed)
    pub data: Vec<u8>,
}

impl Blob {
    /// Create a new blob
    pub fn new(blob_type: BlobType, data: Vec<u8>) -> Self {
        Blob { blob_type, data }
    }

    /// Compute the content hash
    pub fn hash(&self) -> Hash {
        // Include type in hash for safety
        Hash::digest_many(&[&[self.blob_type.as_byte()], &self.data])
    }

    /// Compress the blob for storage
    pub fn compress(&self, level: i32) -> crate::Result<Vec<u8>> {
        let mut output = Vec::new();
        // Type byte prefix
        output.push(self.blob_type.as_byte());
        let compressed = zstd::encode_all(self.data.as_slice(), level)?;
        output.extend(compressed);
        Ok(output)
    }

    /// Decompress a blob from storage
    pub fn decompress(data: &[u8]) -> crate::Result<Self> {
        let (&tag, body) = data
            .split_first()
            .ok_or_else(|| crate::Error::Corruption("Empty blob data".into()))?;

        let blob_type = BlobType::from_byte(tag)
            .ok_or_else(|| crate::Error::Corruption(format!("Invalid blob type: {}", tag)))?;

        let decompressed = zstd::decode_all(body)?;

        Ok(Blob {
            blob_type,
            data: decompressed,
        })
    }

    /// Get the size of the uncompressed data
    pub fn size(&self) -> usize {
        self.data.len()
    }
}
