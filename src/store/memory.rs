use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::store::path;
use crate::store::{
    Action, CoordinationStore, Node, Notification, StoreError, StoreResult, WatchStream,
};

const WATCH_BUFFER: usize = 1024;

#[derive(Debug, Clone)]
struct Leaf {
    value: String,
    created_index: u64,
    modified_index: u64,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Inner {
    leaves: BTreeMap<String, Leaf>,
    index: u64,
}

/// In-process coordination store.
///
/// Thread-safe via `Mutex`. Directories are implicit: a key is a directory
/// while at least one leaf lives below it. Expired leases are reaped at the
/// start of every operation, so expiry is observed on the next access.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    events: broadcast::Sender<Notification>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_BUFFER);
        Self {
            inner: Mutex::new(Inner::default()),
            events,
            available: AtomicBool::new(true),
        }
    }

    /// Builds a store holding `entries` as plain leaves without emitting
    /// notifications.
    pub fn with_entries<I, K, V>(entries: I) -> StoreResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let store = Self::new();
        {
            let mut inner = store.lock()?;
            for (key, value) in entries {
                let key = path::normalize(key.as_ref());
                check_writable(&inner, &key)?;
                if inner.leaves.contains_key(&key) {
                    return Err(StoreError::NodeExists(key));
                }
                inner.index += 1;
                let index = inner.index;
                inner.leaves.insert(
                    key,
                    Leaf {
                        value: value.into(),
                        created_index: index,
                        modified_index: index,
                        expires_at: None,
                    },
                );
            }
        }
        Ok(store)
    }

    /// Simulates losing quorum: every operation fails with
    /// [`StoreError::Unavailable`] until re-enabled.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Index of the most recent mutation.
    pub fn current_index(&self) -> u64 {
        self.inner.lock().map(|i| i.index).unwrap_or_default()
    }

    /// Removes every leaf whose lease has run out. Returns how many expired.
    pub fn reap_expired(&self) -> StoreResult<usize> {
        let mut inner = self.lock()?;
        Ok(self.reap(&mut inner))
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))
    }

    /// Lock, check availability and reap leases in one step.
    fn begin(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is unreachable".into()));
        }
        let mut inner = self.lock()?;
        self.reap(&mut inner);
        Ok(inner)
    }

    fn reap(&self, inner: &mut Inner) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = inner
            .leaves
            .iter()
            .filter(|(_, leaf)| leaf.expires_at.is_some_and(|at| at <= now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.leaves.remove(key);
            inner.index += 1;
            tracing::debug!(key = %key, "Lease expired");
            self.notify(Notification {
                action: Action::Expire,
                key: key.clone(),
                value: None,
                index: inner.index,
            });
        }
        expired.len()
    }

    fn notify(&self, notification: Notification) {
        // No subscribers is not an error.
        let _ = self.events.send(notification);
    }
}

fn dir_prefix(key: &str) -> String {
    if key == "/" {
        "/".to_string()
    } else {
        format!("{key}/")
    }
}

fn is_dir(inner: &Inner, key: &str) -> bool {
    let prefix = dir_prefix(key);
    inner
        .leaves
        .range(prefix.clone()..)
        .next()
        .is_some_and(|(k, _)| k.starts_with(&prefix))
}

fn expiry(ttl: Option<Duration>) -> Option<Instant> {
    ttl.map(|ttl| Instant::now() + ttl)
}

/// Rejects writes whose ancestors are leaves.
fn check_writable(inner: &Inner, key: &str) -> StoreResult<()> {
    let mut ancestor = path::parent(key);
    while ancestor != "/" {
        if inner.leaves.contains_key(ancestor) {
            return Err(StoreError::NotADirectory(ancestor.to_string()));
        }
        ancestor = path::parent(ancestor);
    }
    Ok(())
}

fn leaf_node(key: &str, leaf: &Leaf) -> Node {
    Node {
        key: key.to_string(),
        value: Some(leaf.value.clone()),
        dir: false,
        nodes: Vec::new(),
        created_index: leaf.created_index,
        modified_index: leaf.modified_index,
    }
}

/// Builds the directory node for `key` from the leaves below it.
fn dir_node(inner: &Inner, key: &str, recursive: bool) -> Node {
    let prefix = dir_prefix(key);
    let mut children: BTreeMap<&str, Vec<(&str, &Leaf)>> = BTreeMap::new();
    for (k, leaf) in inner.leaves.range(prefix.clone()..) {
        let Some(rel) = k.strip_prefix(&prefix) else {
            break;
        };
        let (first, rest) = rel.split_once('/').unwrap_or((rel, ""));
        children.entry(first).or_default().push((rest, leaf));
    }

    let mut dir = Node {
        key: key.to_string(),
        dir: true,
        ..Default::default()
    };
    for (name, entries) in children {
        let child_key = path::join(key, &[name]);
        let child = match entries.as_slice() {
            [("", leaf)] => leaf_node(&child_key, leaf),
            _ if recursive => dir_node(inner, &child_key, true),
            _ => Node {
                key: child_key,
                dir: true,
                modified_index: entries.iter().map(|(_, l)| l.modified_index).max().unwrap_or(0),
                created_index: entries.iter().map(|(_, l)| l.created_index).min().unwrap_or(0),
                ..Default::default()
            },
        };
        dir.modified_index = dir.modified_index.max(child.modified_index);
        dir.created_index = match dir.created_index {
            0 => child.created_index,
            c => c.min(child.created_index),
        };
        dir.nodes.push(child);
    }
    dir
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn get(&self, key: &str, recursive: bool) -> StoreResult<Node> {
        let key = path::normalize(key);
        let inner = self.begin()?;

        if let Some(leaf) = inner.leaves.get(&key) {
            return Ok(leaf_node(&key, leaf));
        }
        if is_dir(&inner, &key) {
            return Ok(dir_node(&inner, &key, recursive));
        }
        Err(StoreError::KeyNotFound(key))
    }

    async fn create(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<Node> {
        let key = path::normalize(key);
        let mut inner = self.begin()?;

        if inner.leaves.contains_key(&key) || is_dir(&inner, &key) {
            return Err(StoreError::NodeExists(key));
        }
        check_writable(&inner, &key)?;

        inner.index += 1;
        let leaf = Leaf {
            value: value.to_string(),
            created_index: inner.index,
            modified_index: inner.index,
            expires_at: expiry(ttl),
        };
        let node = leaf_node(&key, &leaf);
        inner.leaves.insert(key.clone(), leaf);
        self.notify(Notification {
            action: Action::Create,
            key,
            value: Some(value.to_string()),
            index: inner.index,
        });
        Ok(node)
    }

    async fn update(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<Node> {
        let key = path::normalize(key);
        let mut inner = self.begin()?;

        if is_dir(&inner, &key) {
            return Err(StoreError::NotAFile(key));
        }
        let index = inner.index + 1;
        let Some(leaf) = inner.leaves.get_mut(&key) else {
            return Err(StoreError::KeyNotFound(key));
        };
        leaf.value = value.to_string();
        leaf.modified_index = index;
        leaf.expires_at = expiry(ttl);
        let node = leaf_node(&key, leaf);
        inner.index = index;

        self.notify(Notification {
            action: Action::Update,
            key,
            value: Some(value.to_string()),
            index,
        });
        Ok(node)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
        prev_index: u64,
    ) -> StoreResult<Node> {
        let key = path::normalize(key);
        let mut inner = self.begin()?;

        if is_dir(&inner, &key) {
            return Err(StoreError::NotAFile(key));
        }
        let next_index = inner.index + 1;
        let Some(leaf) = inner.leaves.get_mut(&key) else {
            return Err(StoreError::KeyNotFound(key));
        };
        if leaf.modified_index != prev_index {
            return Err(StoreError::CompareFailed {
                key,
                expected: prev_index,
                actual: leaf.modified_index,
            });
        }
        leaf.value = value.to_string();
        leaf.modified_index = next_index;
        leaf.expires_at = expiry(ttl);
        let node = leaf_node(&key, leaf);
        inner.index = next_index;

        self.notify(Notification {
            action: Action::CompareAndSwap,
            key,
            value: Some(value.to_string()),
            index: next_index,
        });
        Ok(node)
    }

    async fn compare_and_delete(&self, key: &str, prev_index: u64) -> StoreResult<()> {
        let key = path::normalize(key);
        let mut inner = self.begin()?;

        if is_dir(&inner, &key) {
            return Err(StoreError::NotAFile(key));
        }
        let Some(leaf) = inner.leaves.get(&key) else {
            return Err(StoreError::KeyNotFound(key));
        };
        if leaf.modified_index != prev_index {
            return Err(StoreError::CompareFailed {
                key,
                expected: prev_index,
                actual: leaf.modified_index,
            });
        }
        inner.leaves.remove(&key);
        inner.index += 1;

        self.notify(Notification {
            action: Action::CompareAndDelete,
            key,
            value: None,
            index: inner.index,
        });
        Ok(())
    }

    async fn delete(&self, key: &str, recursive: bool) -> StoreResult<()> {
        let key = path::normalize(key);
        let mut inner = self.begin()?;

        if inner.leaves.remove(&key).is_none() {
            if !is_dir(&inner, &key) {
                return Err(StoreError::KeyNotFound(key));
            }
            if !recursive {
                return Err(StoreError::NotAFile(key));
            }
            let prefix = dir_prefix(&key);
            inner.leaves.retain(|k, _| !k.starts_with(&prefix));
        }
        inner.index += 1;

        // A recursive delete is reported once, against the deleted key.
        self.notify(Notification {
            action: Action::Delete,
            key,
            value: None,
            index: inner.index,
        });
        Ok(())
    }

    fn watch(&self, prefix: &str) -> WatchStream {
        let root = path::normalize(prefix);
        let children = dir_prefix(&root);
        let lag_root = root.clone();
        let stream = BroadcastStream::new(self.events.subscribe())
            .map_while(move |item| match item {
                Ok(n) => Some(n),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(prefix = %lag_root, skipped, "Watcher lagged, ending watch");
                    None
                }
            })
            .filter(move |n| n.key == root || n.key.starts_with(&children));
        Box::pin(stream)
    }
}
