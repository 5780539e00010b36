//! Wire format for tree nodes
//!
//! Every node variant maps onto one flat [`NodeMessage`]. Digests travel as
//! raw bytes; an empty byte string stands for the ZERO digest. Messages are
//! serialized with bincode:
//!
//! ```text
//! version | id | kind | mod_time | size | digest | name | parent
//!         | directory: names[], links[]            (directories only)
//!         | commit: root, parent, index, stage,     (commits only)
//!                   author, merge author/head, message
//! ```

use crate::model::{
    Author, Commit, CommitState, Directory, File, Hash, MergeMarker, Node, NodeKind,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the message layout
pub const WIRE_VERSION: u32 = 1;

/// Flat representation of any node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMessage {
    pub version: u32,
    pub id: u64,
    pub kind: NodeKind,
    /// Unix millis
    pub mod_time: u64,
    pub size: u64,
    pub digest: Vec<u8>,
    pub name: String,
    pub parent: Vec<u8>,
    pub directory: Option<DirectoryPayload>,
    pub commit: Option<CommitPayload>,
}

/// Children of a directory as two parallel sequences
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryPayload {
    pub names: Vec<String>,
    pub links: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitPayload {
    pub root: Vec<u8>,
    pub parent: Vec<u8>,
    pub index: u64,
    pub stage: Author,
    pub author: Author,
    pub merge_author: Option<Author>,
    pub merge_head: Vec<u8>,
    pub message: String,
}

/// Serialize a node into bytes
pub fn encode(node: &Node) -> Result<Vec<u8>> {
    Ok(bincode::serialize(&node.to_message())?)
}

/// Deserialize a node from bytes
pub fn decode(data: &[u8]) -> Result<Node> {
    let msg: NodeMessage = bincode::deserialize(data)?;
    Node::from_message(&msg)
}

fn digest_bytes(hash: &Hash) -> Vec<u8> {
    if hash.is_zero() {
        Vec::new()
    } else {
        hash.to_vec()
    }
}

fn digest_from(bytes: &[u8]) -> Result<Hash> {
    if bytes.is_empty() {
        Ok(Hash::ZERO)
    } else {
        Hash::from_slice(bytes)
    }
}

fn check_header(msg: &NodeMessage, expected: NodeKind) -> Result<()> {
    if msg.version != WIRE_VERSION {
        return Err(Error::VersionMismatch {
            expected: WIRE_VERSION,
            found: msg.version,
        });
    }
    if msg.kind != expected {
        return Err(Error::TypeMismatch {
            expected,
            found: msg.kind,
        });
    }
    Ok(())
}

impl Node {
    pub fn to_message(&self) -> NodeMessage {
        match self {
            Node::File(f) => f.to_message(),
            Node::Directory(d) => d.to_message(),
            Node::Commit(c) => c.to_message(),
        }
    }

    /// Rebuild whichever variant the message describes
    pub fn from_message(msg: &NodeMessage) -> Result<Node> {
        Ok(match msg.kind {
            NodeKind::File => {
                let mut file = File::default();
                file.from_message(msg)?;
                file.into()
            }
            NodeKind::Directory => {
                let mut dir = Directory::default();
                dir.from_message(msg)?;
                dir.into()
            }
            NodeKind::Commit => {
                let mut commit = Commit::default();
                commit.from_message(msg)?;
                commit.into()
            }
        })
    }
}

impl File {
    pub fn to_message(&self) -> NodeMessage {
        NodeMessage {
            version: WIRE_VERSION,
            id: self.id,
            kind: NodeKind::File,
            mod_time: self.mod_time,
            size: self.size,
            digest: digest_bytes(&self.digest),
            name: self.name.clone(),
            parent: digest_bytes(&self.parent),
            directory: None,
            commit: None,
        }
    }

    /// Overwrite this file with the message contents
    pub fn from_message(&mut self, msg: &NodeMessage) -> Result<()> {
        check_header(msg, NodeKind::File)?;

        *self = File {
            id: msg.id,
            name: msg.name.clone(),
            size: msg.size,
            mod_time: msg.mod_time,
            digest: digest_from(&msg.digest)?,
            parent: digest_from(&msg.parent)?,
        };
        Ok(())
    }
}

impl Directory {
    pub fn to_message(&self) -> NodeMessage {
        let mut payload = DirectoryPayload::default();
        for (name, link) in &self.children {
            payload.names.push(name.clone());
            payload.links.push(link.to_vec());
        }

        NodeMessage {
            version: WIRE_VERSION,
            id: self.id,
            kind: NodeKind::Directory,
            mod_time: self.mod_time,
            size: self.size,
            digest: digest_bytes(&self.digest),
            name: self.name.clone(),
            parent: digest_bytes(&self.parent),
            directory: Some(payload),
            commit: None,
        }
    }

    /// Overwrite this directory with the message contents
    ///
    /// Nothing is changed if the message is rejected.
    pub fn from_message(&mut self, msg: &NodeMessage) -> Result<()> {
        check_header(msg, NodeKind::Directory)?;

        let payload = msg.directory.as_ref().ok_or_else(|| {
            Error::MalformedInput(format!("directory `{}` has no children payload", msg.name))
        })?;

        // Input might come from anywhere
        if payload.names.len() != payload.links.len() {
            return Err(Error::MalformedInput(format!(
                "directory `{}` has {} names but {} links",
                msg.name,
                payload.names.len(),
                payload.links.len()
            )));
        }

        let mut children = BTreeMap::new();
        for (name, link) in payload.names.iter().zip(&payload.links) {
            if children.insert(name.clone(), Hash::from_slice(link)?).is_some() {
                return Err(Error::MalformedInput(format!(
                    "directory `{}` lists `{}` twice",
                    msg.name, name
                )));
            }
        }

        *self = Directory {
            id: msg.id,
            name: msg.name.clone(),
            size: msg.size,
            mod_time: msg.mod_time,
            parent: digest_from(&msg.parent)?,
            digest: digest_from(&msg.digest)?,
            children,
        };
        Ok(())
    }
}

impl Commit {
    pub fn to_message(&self) -> NodeMessage {
        let (merge_author, merge_head) = match &self.merge {
            Some(m) => (Some(m.with.clone()), digest_bytes(&m.remote_head)),
            None => (None, Vec::new()),
        };

        NodeMessage {
            version: WIRE_VERSION,
            id: self.id,
            kind: NodeKind::Commit,
            mod_time: self.mod_time,
            size: self.size(),
            digest: digest_bytes(&self.digest),
            name: self.name.clone(),
            parent: digest_bytes(&self.parent),
            directory: None,
            commit: Some(CommitPayload {
                root: digest_bytes(&self.root),
                parent: digest_bytes(&self.parent),
                index: self.index,
                stage: self.stage.clone(),
                author: self.author.clone(),
                merge_author,
                merge_head,
                message: self.message.clone(),
            }),
        }
    }

    /// Overwrite this commit with the message contents
    ///
    /// A commit with a digest is considered boxed.
    pub fn from_message(&mut self, msg: &NodeMessage) -> Result<()> {
        check_header(msg, NodeKind::Commit)?;

        let payload = msg.commit.as_ref().ok_or_else(|| {
            Error::MalformedInput(format!("commit `{}` has no commit payload", msg.name))
        })?;

        if payload.parent != msg.parent {
            return Err(Error::MalformedInput(format!(
                "commit `{}` disagrees about its parent",
                msg.name
            )));
        }

        let merge = match (&payload.merge_author, payload.merge_head.is_empty()) {
            (Some(with), _) => Some(MergeMarker {
                with: with.clone(),
                remote_head: digest_from(&payload.merge_head)?,
            }),
            (None, true) => None,
            (None, false) => {
                return Err(Error::MalformedInput(format!(
                    "commit `{}` has a merge head without author",
                    msg.name
                )))
            }
        };

        let digest = digest_from(&msg.digest)?;
        let state = if digest.is_zero() {
            CommitState::Empty
        } else {
            CommitState::Boxed
        };

        *self = Commit {
            id: msg.id,
            name: msg.name.clone(),
            mod_time: msg.mod_time,
            digest,
            root: digest_from(&payload.root)?,
            parent: digest_from(&payload.parent)?,
            index: payload.index,
            stage: payload.stage.clone(),
            author: payload.author.clone(),
            message: payload.message.clone(),
            merge,
            state,
        };
        Ok(())
    }
}
