//! # Keyzone Store
//!
//! Key-value store client for the keyzone DNS server.
//!
//! Zone data lives in a hierarchical keyspace: for the name `bar.disco.net.`
//! the base key is `/net/disco/bar`, and a record of type `T` at that name is
//! either a leaf at `<base>/.T` or a directory `<base>/.T/<child>` for
//! multi-valued record sets. TTLs ride along as `.ttl` sibling leaves.
//!
//! This crate provides:
//!
//! - The [`Node`] tree returned by recursive reads
//! - The [`Store`] trait consumed by the resolver
//! - [`EtcdStore`], the production etcd backend
//! - [`MemoryStore`], an in-memory backend for tests
//! - The pure name ↔ key mapper in [`keys`]

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

pub mod etcd;
pub mod keys;

pub use etcd::EtcdStore;

// ============================================================================
// Error Types
// ============================================================================

/// Errors returned by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key does not exist, and nothing is stored beneath it.
    #[error("key not found: {key}")]
    NotFound {
        /// The key that was requested.
        key: String,
    },

    /// The backend could not be reached or returned a protocol error.
    #[error("store backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },
}

impl StoreError {
    /// Creates a new backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Returns true if this error is a missing-key signal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// Node
// ============================================================================

/// A node in the store's key hierarchy.
///
/// Leaf nodes carry a value; directory nodes carry an ordered list of
/// children. Child order follows the store's natural key ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Full key path of this node, prefix-stripped (e.g. `/net/disco/.A`).
    pub key: String,
    /// The stored value. Empty for directories.
    pub value: String,
    /// Whether this node is a directory.
    pub dir: bool,
    /// Ordered children. Empty for leaves.
    pub nodes: Vec<Node>,
}

impl Node {
    /// Creates a leaf node.
    pub fn leaf(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            dir: false,
            nodes: Vec::new(),
        }
    }

    /// Creates a directory node.
    pub fn dir(key: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            key: key.into(),
            value: String::new(),
            dir: true,
            nodes,
        }
    }

    /// Returns all value leaves beneath this node, depth-first.
    ///
    /// A leaf node returns itself.
    pub fn leaves(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Node>) {
        if self.dir {
            for child in &self.nodes {
                child.collect_leaves(out);
            }
        } else {
            out.push(self);
        }
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// A read-only view onto the hierarchical zone-data store.
///
/// Implementations must be safe to share across request tasks; the resolver
/// issues one or more `get` calls per query and holds no state between them.
#[async_trait]
pub trait Store: Send + Sync {
    /// Reads the node at `key`, recursively.
    ///
    /// Returns a leaf node when the key holds a value, or a directory node
    /// with its full (ordered) subtree when children exist beneath it.
    /// A key with neither yields [`StoreError::NotFound`].
    async fn get(&self, key: &str) -> Result<Node>;
}

/// Builds a [`Node`] tree rooted at `key` from a flat, sorted key → value map.
///
/// Entries that are not `key` itself or below `key/` are ignored. When the
/// exact key holds a value it wins over any children stored beneath it, and
/// the children are ignored.
pub(crate) fn tree_from_entries(key: &str, entries: &BTreeMap<String, String>) -> Option<Node> {
    if let Some(value) = entries.get(key) {
        return Some(Node::leaf(key, value.clone()));
    }

    let prefix = format!("{key}/");
    let mut children = Vec::new();
    let mut last_segment: Option<String> = None;

    for child_key in entries
        .range(prefix.clone()..)
        .take_while(|(k, _)| k.starts_with(&prefix))
        .map(|(k, _)| k)
    {
        let segment = child_key[prefix.len()..]
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string();
        if last_segment.as_deref() == Some(segment.as_str()) {
            continue;
        }
        last_segment = Some(segment.clone());
        let child_path = format!("{prefix}{segment}");
        if let Some(child) = tree_from_entries(&child_path, entries) {
            children.push(child);
        }
    }

    if children.is_empty() {
        None
    } else {
        Some(Node::dir(key, children))
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// An in-memory store backend.
///
/// Keys are kept in a `BTreeMap`, so reads come back in ascending key order
/// just like the etcd backend. Intended for unit and integration tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a leaf value at `key`.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.write().insert(key.into(), value.into());
    }

    /// Removes the leaf at `key`, if present.
    pub fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    /// Removes every leaf at or below `prefix`.
    pub fn clear_prefix(&self, prefix: &str) {
        self.entries
            .write()
            .retain(|k, _| k != prefix && !k.starts_with(&format!("{prefix}/")));
    }

    /// Returns the number of leaves in the store.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the store holds no leaves.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Node> {
        let key = key.trim_end_matches('/');
        let entries = self.entries.read();
        tree_from_entries(key, &entries).ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_single_leaf() {
        let store = MemoryStore::new();
        store.set("/net/disco/.A", "1.1.1.1");

        let node = store.get("/net/disco/.A").await.unwrap();
        assert!(!node.dir);
        assert_eq!(node.value, "1.1.1.1");
        assert_eq!(node.leaves().len(), 1);
    }

    #[tokio::test]
    async fn get_nested_keys_depth_first() {
        let store = MemoryStore::new();
        store.set("/net/disco/.A/0", "1.1.1.1");
        store.set("/net/disco/.A/1", "1.1.1.2");
        store.set("/net/disco/.A/2/0", "1.1.1.3");

        let node = store.get("/net/disco/.A").await.unwrap();
        assert!(node.dir);

        let leaves = node.leaves();
        assert_eq!(leaves.len(), 3);
        assert_eq!(leaves[0].value, "1.1.1.1");
        assert_eq!(leaves[1].value, "1.1.1.2");
        assert_eq!(leaves[2].value, "1.1.1.3");
        assert_eq!(leaves[2].key, "/net/disco/.A/2/0");
    }

    #[tokio::test]
    async fn get_missing_key() {
        let store = MemoryStore::new();
        store.set("/net/disco/.A", "1.1.1.1");

        let err = store.get("/net/disco/.AAAA").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn leaf_wins_over_directory() {
        // A leaf and a directory at the same path is undefined upstream;
        // the leaf wins and the children are ignored.
        let store = MemoryStore::new();
        store.set("/net/disco/.TXT", "primary");
        store.set("/net/disco/.TXT/0", "shadowed");

        let node = store.get("/net/disco/.TXT").await.unwrap();
        assert!(!node.dir);
        assert_eq!(node.value, "primary");
    }

    #[tokio::test]
    async fn clear_prefix_removes_subtree() {
        let store = MemoryStore::new();
        store.set("/net/disco/.A", "1.1.1.1");
        store.set("/net/disco/bar/.A", "1.2.3.4");
        store.set("/net/discord/.A", "5.6.7.8");

        store.clear_prefix("/net/disco");
        assert!(store.get("/net/disco/bar/.A").await.is_err());
        assert_eq!(store.get("/net/discord/.A").await.unwrap().value, "5.6.7.8");
    }
}
