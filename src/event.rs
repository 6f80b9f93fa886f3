use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::StreamConfig;
use crate::job::Job;
use crate::unit::UnitState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    JobCreated,
    JobScheduled,
    JobStopped,
    UnitStateUpdated,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::JobCreated => write!(f, "EventJobCreated"),
            EventKind::JobScheduled => write!(f, "EventJobScheduled"),
            EventKind::JobStopped => write!(f, "EventJobStopped"),
            EventKind::UnitStateUpdated => write!(f, "EventUnitStateUpdated"),
        }
    }
}

/// Normalized job or unit lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A job definition was written for the first time.
    JobCreated(Job),
    /// `job` was assigned to the machine with boot ID `machine`.
    JobScheduled { job: String, machine: String },
    /// The job entry was deleted or its lease expired.
    JobStopped { job: String },
    /// A local unit changed state; `None` means the unit is gone.
    UnitStateUpdated {
        unit: String,
        state: Option<UnitState>,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::JobCreated(_) => EventKind::JobCreated,
            Event::JobScheduled { .. } => EventKind::JobScheduled,
            Event::JobStopped { .. } => EventKind::JobStopped,
            Event::UnitStateUpdated { .. } => EventKind::UnitStateUpdated,
        }
    }

    /// Name of the job or unit the event is about.
    pub fn context(&self) -> &str {
        match self {
            Event::JobCreated(job) => &job.name,
            Event::JobScheduled { job, .. } | Event::JobStopped { job } => job,
            Event::UnitStateUpdated { unit, .. } => unit,
        }
    }
}

pub type EventSender = mpsc::Sender<Event>;
pub type EventReceiver = mpsc::Receiver<Event>;

/// Creates the shared event bus.
pub fn channel(config: &StreamConfig) -> (EventSender, EventReceiver) {
    mpsc::channel(config.event_buffer)
}
