use crate::error::{RegistryError, Result};
use crate::job::{Job, JobPayload, JobRecord};
use crate::registry::keys::{validate_name, OBJECT_LEAF, TARGET_LEAF};
use crate::registry::lock::ResourceLock;
use crate::registry::{Lookup, Registry};
use crate::store::{Node, StoreError};

/// Lock class used for job mutations.
pub const JOB_LOCK_CLASS: &str = "job";

/// Decodes a stored job. Malformed JSON and records without a payload are
/// both treated as absent.
pub(crate) fn decode_job(key: &str, value: &str) -> Option<Job> {
    match serde_json::from_str::<JobRecord>(value) {
        Ok(record) => {
            let job = record.into_job();
            if job.is_none() {
                tracing::warn!(key, "Job record has no payload, ignoring");
            }
            job
        }
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to deserialize job");
            None
        }
    }
}

fn decode_payload(key: &str, value: &str) -> Option<JobPayload> {
    serde_json::from_str(value)
        .map_err(|e| tracing::warn!(key, error = %e, "Failed to deserialize payload"))
        .ok()
}

/// Treats a missing key as success.
fn tolerate_missing(result: std::result::Result<(), StoreError>) -> Result<()> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => Ok(other?),
    }
}

impl Registry {
    /// Lists every stored payload. Undecodable entries are skipped.
    pub async fn get_all_payloads(&self) -> Result<Vec<JobPayload>> {
        let dir = match self.store.get(&self.keys.payloads(), true).await {
            Ok(dir) => dir,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(dir
            .nodes
            .iter()
            .filter_map(|node| decode_payload(&node.key, node.value.as_deref()?))
            .collect())
    }

    /// Lists every job with a valid definition. Entries that fail to
    /// resolve are skipped.
    pub async fn get_all_jobs(&self) -> Result<Vec<Job>> {
        Ok(self
            .job_entries()
            .await?
            .iter()
            .filter_map(job_from_entry)
            .collect())
    }

    /// Lists the jobs currently assigned to `boot_id`.
    pub async fn get_all_jobs_by_machine(&self, boot_id: &str) -> Result<Vec<Job>> {
        Ok(self
            .job_entries()
            .await?
            .iter()
            .filter(|entry| {
                entry
                    .child(TARGET_LEAF)
                    .and_then(|t| t.value.as_deref())
                    .is_some_and(|target| !target.is_empty() && target == boot_id)
            })
            .filter_map(job_from_entry)
            .collect())
    }

    /// One recursive read of the job namespace; each child is a job directory.
    async fn job_entries(&self) -> Result<Vec<Node>> {
        match self.store.get(&self.keys.jobs(), true).await {
            Ok(dir) => Ok(dir.nodes),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Boot ID of the machine the job is assigned to.
    pub async fn get_job_target(&self, name: &str) -> Lookup<String> {
        match self.store.get(&self.keys.job_target(name), false).await {
            Ok(node) => match node.value {
                Some(target) => Lookup::Found(target),
                None => Lookup::NotFound,
            },
            Err(e) => e.into(),
        }
    }

    pub async fn get_job(&self, name: &str) -> Lookup<Job> {
        let key = self.keys.job_object(name);
        match self.store.get(&key, false).await {
            Ok(node) => match node.value.as_deref().and_then(|v| decode_job(&key, v)) {
                Some(job) => Lookup::Found(job),
                None => Lookup::NotFound,
            },
            Err(e) => e.into(),
        }
    }

    /// Stores a payload once. A second create under the same name fails with
    /// the store's `NodeExists` error.
    pub async fn create_payload(&self, payload: &JobPayload) -> Result<()> {
        validate_name("payload", &payload.name)?;
        let value = serde_json::to_string(payload)?;
        self.store
            .create(&self.keys.payload(&payload.name), &value, None)
            .await?;
        tracing::debug!(payload = %payload.name, "Payload created");
        Ok(())
    }

    pub async fn get_payload(&self, name: &str) -> Lookup<JobPayload> {
        let key = self.keys.payload(name);
        match self.store.get(&key, false).await {
            Ok(node) => match node.value.as_deref().and_then(|v| decode_payload(&key, v)) {
                Some(payload) => Lookup::Found(payload),
                None => Lookup::NotFound,
            },
            Err(e) => e.into(),
        }
    }

    pub async fn destroy_payload(&self, name: &str) -> Result<()> {
        validate_name("payload", name)?;
        tolerate_missing(self.store.delete(&self.keys.payload(name), false).await)
    }

    /// Writes a job definition.
    ///
    /// An unscheduled job is created at most once: if its definition is
    /// already stored the call fails with [`RegistryError::JobExists`]. A
    /// scheduled job has its definition replaced in place, without touching
    /// the assignment. The replacement is a compare-and-swap on the version
    /// read here, so two concurrent redefinitions cannot silently overwrite
    /// each other; the loser gets `StoreError::CompareFailed`.
    pub async fn create_job(&self, job: &Job) -> Result<()> {
        validate_name("job", &job.name)?;
        let key = self.keys.job_object(&job.name);
        let value = serde_json::to_string(job)?;

        let existing = match self.store.get(&key, false).await {
            Ok(node) => Some(node),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };

        let Some(existing) = existing else {
            return match self.store.create(&key, &value, None).await {
                Ok(_) => {
                    tracing::debug!(job = %job.name, "Job created");
                    Ok(())
                }
                Err(e) if e.is_node_exists() => Err(RegistryError::JobExists(job.name.clone())),
                Err(e) => Err(e.into()),
            };
        };

        if !self.job_scheduled(&job.name).await? {
            return Err(RegistryError::JobExists(job.name.clone()));
        }

        self.store
            .compare_and_swap(&key, &value, None, existing.modified_index)
            .await?;
        tracing::debug!(job = %job.name, "Scheduled job redefined");
        Ok(())
    }

    /// Assigns a job to a machine. Fails with the store's `NodeExists` error
    /// if the job is already assigned; reassignment requires
    /// [`unschedule_job`](Self::unschedule_job) first.
    pub async fn schedule_job(&self, name: &str, boot_id: &str) -> Result<()> {
        validate_name("job", name)?;
        self.store
            .create(&self.keys.job_target(name), boot_id, None)
            .await?;
        tracing::debug!(job = %name, machine = %boot_id, "Job scheduled");
        Ok(())
    }

    pub async fn unschedule_job(&self, name: &str) -> Result<()> {
        validate_name("job", name)?;
        tolerate_missing(self.store.delete(&self.keys.job_target(name), true).await)
    }

    /// Removes the job definition and its assignment together.
    pub async fn stop_job(&self, name: &str) -> Result<()> {
        validate_name("job", name)?;
        tolerate_missing(self.store.delete(&self.keys.job(name), true).await)
    }

    pub async fn job_scheduled(&self, name: &str) -> Result<bool> {
        Ok(self
            .get_job_target(name)
            .await
            .into_result()?
            .is_some())
    }

    /// Acquires the lock serializing multi-step mutations of `name`.
    /// Returns `Ok(None)` while another holder has it.
    pub async fn lock_job(&self, name: &str, context: &str) -> Result<Option<ResourceLock>> {
        self.lock_resource(JOB_LOCK_CLASS, name, context).await
    }
}

fn job_from_entry(entry: &Node) -> Option<Job> {
    let object = entry.child(OBJECT_LEAF)?;
    decode_job(&object.key, object.value.as_deref()?)
}
