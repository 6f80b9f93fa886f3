//! Contract of the consensus-backed coordination store.
//!
//! The registry never talks to a concrete client; it is handed an
//! `Arc<dyn CoordinationStore>` at construction. The contract mirrors an
//! etcd-style hierarchical key-space:
//!
//! - **Leaves** hold string values, **directories** exist implicitly while
//!   they have descendants
//! - Every mutation bumps a store-wide index recorded as the node's
//!   `modified_index`, which is what compare-and-swap/delete are keyed on
//! - Create-only writes fail with [`StoreError::NodeExists`] when the key is
//!   present; this is the only cross-process "exactly once" primitive
//! - Keys written with a TTL are removed by the store when the lease runs
//!   out, and watchers see an [`Action::Expire`] notification
//!
//! # Components
//!
//! - [`CoordinationStore`]: the async trait every backend implements
//! - [`memory::MemoryStore`]: in-process backend used by tests and the CLI
//! - [`snapshot`]: loads a flat JSON key/value dump into a `MemoryStore`

pub mod memory;
pub mod snapshot;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_stream::Stream;

pub use memory::MemoryStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Key already exists: {0}")]
    NodeExists(String),

    #[error("Compare failed on {key}: expected index {expected}, found {actual}")]
    CompareFailed {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Network or consensus trouble; the same call may succeed later.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::KeyNotFound(_))
    }

    pub fn is_node_exists(&self) -> bool {
        matches!(self, StoreError::NodeExists(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A key and, for directories, its children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Node {
    pub key: String,
    /// `None` for directories.
    pub value: Option<String>,
    pub dir: bool,
    pub nodes: Vec<Node>,
    pub created_index: u64,
    pub modified_index: u64,
}

impl Node {
    pub fn base_name(&self) -> &str {
        path::base_name(&self.key)
    }

    /// Direct child by base name.
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.base_name() == name)
    }
}

/// Kind of change carried by a watch notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Create,
    Set,
    Update,
    Delete,
    Expire,
    CompareAndSwap,
    CompareAndDelete,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Create => write!(f, "create"),
            Action::Set => write!(f, "set"),
            Action::Update => write!(f, "update"),
            Action::Delete => write!(f, "delete"),
            Action::Expire => write!(f, "expire"),
            Action::CompareAndSwap => write!(f, "compareAndSwap"),
            Action::CompareAndDelete => write!(f, "compareAndDelete"),
        }
    }
}

/// One raw change notification from a watch subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub action: Action,
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub index: u64,
}

impl Notification {
    pub fn new(action: Action, key: impl Into<String>, value: Option<String>) -> Self {
        Self {
            action,
            key: key.into(),
            value,
            index: 0,
        }
    }
}

pub type WatchStream = Pin<Box<dyn Stream<Item = Notification> + Send>>;

/// Atomic operations offered by the coordination store.
///
/// Reads are linearizable; backends that support stale reads must not use
/// them behind this trait.
#[async_trait]
pub trait CoordinationStore: Send + Sync + 'static {
    /// Reads a leaf, or a directory with its children (all descendants when
    /// `recursive`). Returns [`StoreError::KeyNotFound`] when absent.
    async fn get(&self, key: &str, recursive: bool) -> StoreResult<Node>;

    /// Create-only write. Returns [`StoreError::NodeExists`] when the key is
    /// already present.
    async fn create(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<Node>;

    /// Overwrites an existing leaf. Returns [`StoreError::KeyNotFound`] when absent.
    async fn update(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<Node>;

    /// Overwrites a leaf only if its `modified_index` still equals `prev_index`.
    async fn compare_and_swap(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
        prev_index: u64,
    ) -> StoreResult<Node>;

    /// Deletes a leaf only if its `modified_index` still equals `prev_index`.
    async fn compare_and_delete(&self, key: &str, prev_index: u64) -> StoreResult<()>;

    /// Deletes a leaf, or a whole directory when `recursive`.
    async fn delete(&self, key: &str, recursive: bool) -> StoreResult<()>;

    /// Subscribes to every change at or below `prefix`, in commit order.
    ///
    /// The stream never skips notifications: if the subscriber falls too far
    /// behind, the stream ends instead. Callers re-read the state they care
    /// about and subscribe again.
    fn watch(&self, prefix: &str) -> WatchStream;
}

/// Slash-separated key helpers with `path.Base`/`path.Dir` semantics.
pub mod path {
    /// Collapses repeated and trailing slashes and forces a leading one.
    pub fn normalize(key: &str) -> String {
        let joined = key
            .split('/')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        format!("/{joined}")
    }

    pub fn join(base: &str, segments: &[&str]) -> String {
        let mut key = base.to_string();
        for segment in segments {
            key.push('/');
            key.push_str(segment);
        }
        normalize(&key)
    }

    /// Last segment of `key`, ignoring trailing slashes.
    pub fn base_name(key: &str) -> &str {
        let trimmed = key.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(i) => &trimmed[i + 1..],
            None => trimmed,
        }
    }

    /// Everything before the last segment; `"/"` for top-level keys.
    pub fn parent(key: &str) -> &str {
        let trimmed = key.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(0) | None => "/",
            Some(i) => &trimmed[..i],
        }
    }
}
