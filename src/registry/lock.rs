//! Leased mutual exclusion over named resources.
//!
//! A lock is a single key `{root}/lock/<class>/<name>` written with a
//! create-only write and a TTL:
//!
//! 1. Acquisition succeeds for exactly one caller; everyone else sees
//!    `NodeExists` and gets `None` back
//! 2. The key carries a lease, so a crashed holder blocks others for at most
//!    one TTL
//! 3. Release and renewal are conditioned on the index the holder wrote, so
//!    a holder whose lease already ran out can never remove or extend a
//!    successor's lock
//!
//! Locks are advisory and not reentrant. Holders should call
//! [`ResourceLock::is_held`] before any critical section that may outlive
//! the lease.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::registry::keys::validate_name;
use crate::registry::Registry;
use crate::store::CoordinationStore;

/// Value stored under a lock key. Only for diagnostics; never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub holder: Uuid,
    pub context: String,
    pub acquired_at: DateTime<Utc>,
}

/// A held lock.
///
/// Dropping the handle without [`release`](Self::release) leaves the key in
/// place until its lease expires.
pub struct ResourceLock {
    store: Arc<dyn CoordinationStore>,
    key: String,
    record: LockRecord,
    ttl: Duration,
    index: u64,
    released: bool,
}

impl std::fmt::Debug for ResourceLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLock")
            .field("key", &self.key)
            .field("record", &self.record)
            .field("ttl", &self.ttl)
            .field("index", &self.index)
            .finish()
    }
}

impl ResourceLock {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn holder(&self) -> Uuid {
        self.record.holder
    }

    pub fn context(&self) -> &str {
        &self.record.context
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// True while the lock key still carries the index this handle wrote.
    pub async fn is_held(&self) -> Result<bool> {
        match self.store.get(&self.key, false).await {
            Ok(node) => Ok(node.modified_index == self.index),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Restarts the lease. Fails with `CompareFailed` or `KeyNotFound` once
    /// the lock has been lost.
    pub async fn renew(&mut self) -> Result<()> {
        let value = serde_json::to_string(&self.record)?;
        let node = self
            .store
            .compare_and_swap(&self.key, &value, Some(self.ttl), self.index)
            .await?;
        self.index = node.modified_index;
        tracing::debug!(key = %self.key, "Lock renewed");
        Ok(())
    }

    /// Releases the lock early. A lock that already expired or was taken
    /// over is left alone.
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        match self.store.compare_and_delete(&self.key, self.index).await {
            Ok(()) => {
                tracing::debug!(key = %self.key, "Lock released");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(crate::store::StoreError::CompareFailed { .. }) => {
                tracing::warn!(key = %self.key, "Lock lost before release");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for ResourceLock {
    fn drop(&mut self) {
        if !self.released {
            tracing::debug!(key = %self.key, ttl_ms = self.ttl.as_millis(), "Lock dropped, waiting for lease expiry");
        }
    }
}

impl Registry {
    /// Single acquisition attempt on `(class, name)`. Returns `Ok(None)` when
    /// someone else holds it; retrying is up to the caller.
    pub async fn lock_resource(
        &self,
        class: &str,
        name: &str,
        context: &str,
    ) -> Result<Option<ResourceLock>> {
        validate_name("lock class", class)?;
        validate_name("lock", name)?;

        let key = self.keys.lock(class, name);
        let record = LockRecord {
            holder: Uuid::new_v4(),
            context: context.to_string(),
            acquired_at: Utc::now(),
        };
        let value = serde_json::to_string(&record)?;
        let ttl = self.config.lock_ttl();

        match self.store.create(&key, &value, Some(ttl)).await {
            Ok(node) => {
                tracing::debug!(key = %key, holder = %record.holder, context, "Lock acquired");
                Ok(Some(ResourceLock {
                    store: self.store.clone(),
                    key,
                    record,
                    ttl,
                    index: node.modified_index,
                    released: false,
                }))
            }
            Err(e) if e.is_node_exists() => {
                tracing::debug!(key = %key, context, "Lock held elsewhere");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reads the record of whoever currently holds `(class, name)`.
    pub async fn lock_holder(&self, class: &str, name: &str) -> Result<Option<LockRecord>> {
        let key = self.keys.lock(class, name);
        match self.store.get(&key, false).await {
            Ok(node) => Ok(node
                .value
                .as_deref()
                .and_then(|v| serde_json::from_str(v).ok())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
