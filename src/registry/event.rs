//! Mapping of raw store notifications onto domain events.
//!
//! Each filter looks at one notification and yields at most one event. They
//! never block and never fail: anything malformed is logged and dropped.
//! Key shapes are matched against the job namespace root (`{prefix}/job`),
//! so lock or payload keys that happen to contain a `job` segment never
//! match.
//!
//! | Action            | Key shape                  | Event          |
//! |-------------------|----------------------------|----------------|
//! | `create`          | `{jobs}/<job>/object`      | `JobCreated`   |
//! | `create`          | `{jobs}/<job>/target`      | `JobScheduled` |
//! | `delete`/`expire` | `{jobs}/<job>`             | `JobStopped`   |

use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::event::{Event, EventSender};
use crate::job::Job;
use crate::registry::keys::{OBJECT_LEAF, TARGET_LEAF};
use crate::store::path::{base_name, normalize, parent};
use crate::store::{Action, CoordinationStore, Notification};

/// Name of the job whose entry sits directly under `jobs_key`, if `key` is
/// exactly that entry.
fn job_entry<'a>(jobs_key: &str, key: &'a str) -> Option<&'a str> {
    if parent(key) != jobs_key.trim_end_matches('/') {
        return None;
    }
    Some(base_name(key)).filter(|name| !name.is_empty())
}

/// Name of the job owning `key` when `key` is `{jobs_key}/<job>/<leaf>`.
fn job_leaf<'a>(jobs_key: &str, key: &'a str, leaf: &str) -> Option<&'a str> {
    if base_name(key) != leaf {
        return None;
    }
    job_entry(jobs_key, parent(key))
}

pub fn filter_job_created(jobs_key: &str, n: &Notification) -> Option<Event> {
    if n.action != Action::Create {
        return None;
    }
    job_leaf(jobs_key, &n.key, OBJECT_LEAF)?;

    let value = n.value.as_deref().unwrap_or_default();
    match serde_json::from_str::<Job>(value) {
        Ok(job) => Some(Event::JobCreated(job)),
        Err(e) => {
            tracing::debug!(key = %n.key, error = %e, "Failed to deserialize job");
            None
        }
    }
}

pub fn filter_job_scheduled(jobs_key: &str, n: &Notification) -> Option<Event> {
    if n.action != Action::Create {
        return None;
    }
    let job = job_leaf(jobs_key, &n.key, TARGET_LEAF)?;
    Some(Event::JobScheduled {
        job: job.to_string(),
        machine: n.value.clone().unwrap_or_default(),
    })
}

/// Only removal of the job entry itself counts; deleting a leaf below it
/// (e.g. just the target) does not stop the job.
pub fn filter_job_stopped(jobs_key: &str, n: &Notification) -> Option<Event> {
    if !matches!(n.action, Action::Delete | Action::Expire) {
        return None;
    }
    let job = job_entry(jobs_key, &n.key)?;
    Some(Event::JobStopped {
        job: job.to_string(),
    })
}

/// Runs every filter over `n`; the key shapes are disjoint, so at most one
/// matches.
pub fn derive_event(jobs_key: &str, n: &Notification) -> Option<Event> {
    filter_job_created(jobs_key, n)
        .or_else(|| filter_job_scheduled(jobs_key, n))
        .or_else(|| filter_job_stopped(jobs_key, n))
}

/// Watch pump: feeds notifications from the job namespace through
/// [`derive_event`] onto the shared event channel, in arrival order.
///
/// The pump exits on its own when the store ends the watch (for example
/// after the subscriber fell behind). Owners detect this with
/// [`is_finished`](Self::is_finished) and spawn a new pump after
/// re-reading registry state.
pub struct JobEventStream {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl JobEventStream {
    /// Subscribes to `jobs_key` and spawns the pump task.
    pub fn spawn(store: Arc<dyn CoordinationStore>, jobs_key: &str, events: EventSender) -> Self {
        let mut watch = store.watch(jobs_key);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let prefix = normalize(jobs_key);

        let handle = tokio::spawn(async move {
            tracing::debug!(prefix = %prefix, "Job event stream started");
            loop {
                let notification = tokio::select! {
                    _ = token.cancelled() => break,
                    next = watch.next() => match next {
                        Some(n) => n,
                        None => {
                            tracing::warn!(prefix = %prefix, "Watch closed by store");
                            break;
                        }
                    },
                };

                let Some(event) = derive_event(&prefix, &notification) else {
                    continue;
                };
                tracing::debug!(kind = %event.kind(), job = %event.context(), "Derived event");

                tokio::select! {
                    _ = token.cancelled() => break,
                    sent = events.send(event) => {
                        if sent.is_err() {
                            tracing::warn!("Event receiver dropped, discarding job event");
                        }
                    }
                }
            }
            tracing::debug!(prefix = %prefix, "Job event stream stopped");
        });

        Self { cancel, handle }
    }

    /// Token that stops the pump when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stops the pump and waits for the task to exit.
    pub async fn close(self) -> Result<(), JoinError> {
        self.cancel.cancel();
        self.handle.await
    }
}
