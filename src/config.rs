use std::time::Duration;

/// Configuration for a [`Registry`](crate::registry::Registry).
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Root of the key-space. Jobs live under `{key_prefix}/job`, payloads
    /// under `{key_prefix}/payload`, locks under `{key_prefix}/lock`.
    pub key_prefix: String,
    /// Lease attached to every lock key. A holder that neither renews nor
    /// releases loses the lock once this elapses.
    pub lock_ttl_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            key_prefix: "/fleet".to_string(),
            lock_ttl_ms: 60_000,
        }
    }
}

impl RegistryConfig {
    pub fn new(key_prefix: impl Into<String>) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            ..Default::default()
        }
    }

    pub fn with_lock_ttl_ms(mut self, lock_ttl_ms: u64) -> Self {
        self.lock_ttl_ms = lock_ttl_ms;
        self
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }
}

/// Sizing for the event channels that connect the watch pump and the
/// service-status bridge to the dispatcher.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Capacity of the shared event channel. A full channel stalls producers.
    pub event_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { event_buffer: 64 }
    }
}
