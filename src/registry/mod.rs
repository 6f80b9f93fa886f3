//! The cluster's system of record for jobs, payloads and assignments.
//!
//! Everything lives in the coordination store under one root (see
//! [`KeyLayout`]). The hierarchy lets one recursive watch on the job
//! namespace observe both definition and scheduling changes, and lets one
//! recursive delete remove a job together with its assignment.
//!
//! # Components
//!
//! - [`Registry`]: job, payload and assignment operations ([`job`])
//! - [`lock`]: leased, class-scoped mutual exclusion for multi-step mutations
//! - [`event`]: derivation of domain events from raw store notifications
//!
//! # Consistency
//!
//! Single-call operations rely only on the store's atomic create-only and
//! compare-and-swap writes; the registry holds no client-side locks. Callers
//! that need multi-step sequences serialize them with [`Registry::lock_job`].

pub mod event;
pub mod job;
pub mod keys;
pub mod lock;

use std::sync::Arc;

use crate::config::RegistryConfig;
use crate::store::{CoordinationStore, StoreError};

pub use event::{derive_event, JobEventStream};
pub use keys::KeyLayout;
pub use lock::ResourceLock;

/// Outcome of a single-key read.
///
/// Keeps "the key is not there" apart from "the store could not answer", so
/// callers can retry the latter instead of treating it as absence.
#[derive(Debug)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
    Unavailable(StoreError),
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Lookup::NotFound)
    }

    /// Collapses both absence and store failure into `None`.
    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            _ => None,
        }
    }

    /// `NotFound` becomes `Ok(None)`; only store failures are errors.
    pub fn into_result(self) -> Result<Option<T>, StoreError> {
        match self {
            Lookup::Found(value) => Ok(Some(value)),
            Lookup::NotFound => Ok(None),
            Lookup::Unavailable(e) => Err(e),
        }
    }
}

impl<T> From<StoreError> for Lookup<T> {
    fn from(err: StoreError) -> Self {
        if err.is_not_found() {
            Lookup::NotFound
        } else {
            Lookup::Unavailable(err)
        }
    }
}

/// Handle to the job registry. Cheap to clone; clones share the store client.
#[derive(Clone)]
pub struct Registry {
    store: Arc<dyn CoordinationStore>,
    config: RegistryConfig,
    keys: KeyLayout,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Registry {
    pub fn new(store: Arc<dyn CoordinationStore>, config: RegistryConfig) -> Self {
        let keys = KeyLayout::new(&config.key_prefix);
        Self {
            store,
            config,
            keys,
        }
    }

    pub fn store(&self) -> &Arc<dyn CoordinationStore> {
        &self.store
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn keys(&self) -> &KeyLayout {
        &self.keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_from_store_error() {
        let lookup: Lookup<String> = StoreError::KeyNotFound("/a".into()).into();
        assert!(lookup.is_not_found());

        let lookup: Lookup<String> = StoreError::Unavailable("down".into()).into();
        assert!(matches!(lookup, Lookup::Unavailable(_)));
        assert!(lookup.into_result().is_err());
    }

    #[test]
    fn test_lookup_accessors() {
        let lookup = Lookup::Found(42);
        assert!(lookup.is_found());
        assert_eq!(lookup.into_option(), Some(42));

        let missing: Lookup<u32> = Lookup::NotFound;
        assert_eq!(missing.into_result(), Ok(None));
    }
}
