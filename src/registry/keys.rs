use crate::error::{RegistryError, Result};
use crate::store::path;

pub const JOB_SEGMENT: &str = "job";
pub const PAYLOAD_SEGMENT: &str = "payload";
pub const LOCK_SEGMENT: &str = "lock";
pub const OBJECT_LEAF: &str = "object";
pub const TARGET_LEAF: &str = "target";

/// Key-space layout below a fixed root:
///
/// ```text
/// {root}/job/<name>/object   -> serialized job
/// {root}/job/<name>/target   -> machine boot ID
/// {root}/payload/<name>      -> serialized payload
/// {root}/lock/<class>/<name> -> lock record (leased)
/// ```
#[derive(Debug, Clone)]
pub struct KeyLayout {
    root: String,
}

impl KeyLayout {
    pub fn new(root: &str) -> Self {
        Self {
            root: path::normalize(root),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn jobs(&self) -> String {
        path::join(&self.root, &[JOB_SEGMENT])
    }

    pub fn job(&self, name: &str) -> String {
        path::join(&self.root, &[JOB_SEGMENT, name])
    }

    pub fn job_object(&self, name: &str) -> String {
        path::join(&self.root, &[JOB_SEGMENT, name, OBJECT_LEAF])
    }

    pub fn job_target(&self, name: &str) -> String {
        path::join(&self.root, &[JOB_SEGMENT, name, TARGET_LEAF])
    }

    pub fn payloads(&self) -> String {
        path::join(&self.root, &[PAYLOAD_SEGMENT])
    }

    pub fn payload(&self, name: &str) -> String {
        path::join(&self.root, &[PAYLOAD_SEGMENT, name])
    }

    pub fn lock(&self, class: &str, name: &str) -> String {
        path::join(&self.root, &[LOCK_SEGMENT, class, name])
    }
}

/// Names become single key segments, so they may not be empty or contain `/`.
pub fn validate_name(kind: &'static str, name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(RegistryError::InvalidName {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}
