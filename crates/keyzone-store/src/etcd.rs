//! etcd store backend.
//!
//! etcd v3 exposes a flat keyspace, so the hierarchical [`Node`] contract is
//! reconstructed client-side: an exact GET resolves the leaf case, and a
//! prefix range GET in ascending key order supplies the subtree for the
//! directory case. A configured key prefix is prepended on every read and
//! stripped from every key handed back, so callers only ever see canonical
//! `/tld/...` paths.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use etcd_client::{Client, ConnectOptions, GetOptions, SortOrder, SortTarget};
use tracing::debug;

use crate::{tree_from_entries, Node, Result, Store, StoreError};

impl From<etcd_client::Error> for StoreError {
    fn from(err: etcd_client::Error) -> Self {
        StoreError::backend(err.to_string())
    }
}

/// etcd-backed [`Store`] implementation.
///
/// The underlying client multiplexes all requests over a shared gRPC
/// connection pool and is cheap to clone, so one `EtcdStore` serves every
/// request task.
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
    prefix: String,
}

impl EtcdStore {
    /// Connects to the given etcd endpoints.
    ///
    /// `prefix` is prepended to every key read and stripped from results;
    /// pass an empty string to address the root of the keyspace.
    pub async fn connect(
        endpoints: &[String],
        prefix: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let options = ConnectOptions::new()
            .with_connect_timeout(timeout)
            .with_timeout(timeout);

        let client = Client::connect(endpoints, Some(options)).await?;

        Ok(Self {
            client,
            prefix: normalize_prefix(prefix.into()),
        })
    }

    /// Wraps an existing client.
    pub fn with_client(client: Client, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: normalize_prefix(prefix.into()),
        }
    }

    /// Checks that the cluster is reachable.
    pub async fn probe(&self) -> Result<()> {
        let mut client = self.client.clone();
        client.status().await?;
        Ok(())
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn strip_prefix<'a>(&self, full: &'a str) -> &'a str {
        full.strip_prefix(self.prefix.as_str()).unwrap_or(full)
    }
}

#[async_trait]
impl Store for EtcdStore {
    async fn get(&self, key: &str) -> Result<Node> {
        let key = key.trim_end_matches('/');
        let full = self.full_key(key);
        let mut client = self.client.clone();

        let mut entries = BTreeMap::new();

        let exact = client.get(full.as_str(), None).await?;
        if let Some(kv) = exact.kvs().first() {
            entries.insert(
                self.strip_prefix(kv.key_str()?).to_string(),
                kv.value_str()?.to_string(),
            );
        }

        let subtree = client
            .get(
                format!("{full}/"),
                Some(
                    GetOptions::new()
                        .with_prefix()
                        .with_sort(SortTarget::Key, SortOrder::Ascend),
                ),
            )
            .await?;
        for kv in subtree.kvs() {
            entries.insert(
                self.strip_prefix(kv.key_str()?).to_string(),
                kv.value_str()?.to_string(),
            );
        }

        debug!(key = %key, leaves = entries.len(), "etcd read");

        tree_from_entries(key, &entries).ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })
    }
}

/// Normalizes a key prefix so joining it with a `/`-leading key never
/// produces doubled separators. Empty stays empty.
fn normalize_prefix(prefix: String) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
