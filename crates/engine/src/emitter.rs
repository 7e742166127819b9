use std::sync::Arc;

use testwright_core_types::{LogEntry, RunEvent, RunId, RunStatus};
use testwright_event_bus::EventHub;

use crate::store::RunStore;

/// Emission surface for one run. Log events are persisted to the run
/// record and streamed; everything else is streamed only. All emission is
/// best-effort and never fails the run.
pub struct RunEmitter {
    run_id: RunId,
    hub: Arc<EventHub>,
    store: Arc<dyn RunStore>,
}

impl RunEmitter {
    pub fn new(run_id: RunId, hub: Arc<EventHub>, store: Arc<dyn RunStore>) -> Self {
        Self { run_id, hub, store }
    }

    pub async fn emit(&self, event: RunEvent) {
        if let RunEvent::Log(message) = &event {
            self.store
                .append_log(&self.run_id, LogEntry::now(message.clone()))
                .await;
        }
        self.hub.emit(&self.run_id, event);
    }

    pub async fn log(&self, message: impl Into<String>) {
        self.emit(RunEvent::Log(message.into())).await;
    }

    pub async fn status(&self, status: RunStatus) {
        self.emit(RunEvent::Status(status)).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.emit(RunEvent::Error(message.into())).await;
    }
}
