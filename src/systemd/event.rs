use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::event::{Event, EventSender};
use crate::unit::{UnitState, UnitStatus};

/// One snapshot from the service manager. `None` marks a unit that is gone.
pub type UnitStatusBatch = HashMap<String, Option<UnitStatus>>;

/// Translates one batch into one event per unit.
pub fn translate_unit_statuses(batch: &UnitStatusBatch) -> Vec<Event> {
    batch
        .iter()
        .map(|(unit, status)| Event::UnitStateUpdated {
            unit: unit.clone(),
            state: status.as_ref().map(UnitState::from),
        })
        .collect()
}

/// A running bridge task.
///
/// The loop ends only when [`close`](Self::close) is called (or the token
/// from [`cancel_token`](Self::cancel_token) is cancelled). If the inbound
/// channel closes first, the loop idles until then.
pub struct UnitEventStream {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl UnitEventStream {
    pub fn spawn(units: mpsc::Receiver<UnitStatusBatch>, events: EventSender) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(stream(units, events, cancel.clone()));
        Self { cancel, handle }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signals the loop to stop and waits until it has exited.
    ///
    /// Batches still queued on the inbound channel are not forwarded, and a
    /// forward blocked on a full event channel is abandoned.
    pub async fn close(self) -> Result<(), JoinError> {
        self.cancel.cancel();
        self.handle.await
    }
}

async fn stream(
    mut units: mpsc::Receiver<UnitStatusBatch>,
    events: EventSender,
    cancel: CancellationToken,
) {
    let mut inbound_open = true;

    loop {
        let batch = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            batch = units.recv(), if inbound_open => match batch {
                Some(batch) => batch,
                None => {
                    tracing::debug!("Unit status feed closed, waiting for close signal");
                    inbound_open = false;
                    continue;
                }
            },
        };

        tracing::debug!(units = batch.len(), "Received unit status batch");
        for event in translate_unit_statuses(&batch) {
            tracing::debug!(kind = %event.kind(), unit = %event.context(), "Translated unit status");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                sent = events.send(event) => {
                    if sent.is_err() {
                        tracing::warn!("Event receiver dropped, discarding unit event");
                    }
                }
            }
        }
    }
}
