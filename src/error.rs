use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Job already exists: {0}")]
    JobExists(String),

    #[error("Invalid {kind} name: {name:?}")]
    InvalidName { kind: &'static str, name: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RegistryError {
    /// True when the failure is worth retrying (store unreachable, no quorum).
    pub fn is_transient(&self) -> bool {
        matches!(self, RegistryError::Store(e) if e.is_transient())
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
