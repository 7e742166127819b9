use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::warn;

use testwright_core_types::{LogEntry, RunId, RunRecord, RunStatus};

/// Persistence for run records. Log lines are persisted here; screenshots
/// and other stream-only events are not.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create(&self, record: RunRecord);

    async fn get(&self, id: &RunId) -> Option<RunRecord>;

    /// Update a run's status. Terminal statuses are sticky: once a run is
    /// terminal, further updates are ignored.
    async fn set_status(&self, id: &RunId, status: RunStatus, summary: Option<String>);

    async fn append_log(&self, id: &RunId, entry: LogEntry);
}

#[derive(Default)]
pub struct InMemoryRunStore {
    runs: DashMap<RunId, RunRecord>,
}

impl InMemoryRunStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create(&self, record: RunRecord) {
        self.runs.insert(record.id.clone(), record);
    }

    async fn get(&self, id: &RunId) -> Option<RunRecord> {
        self.runs.get(id).map(|r| r.clone())
    }

    async fn set_status(&self, id: &RunId, status: RunStatus, summary: Option<String>) {
        let Some(mut record) = self.runs.get_mut(id) else {
            warn!(run_id = %id, "status update for unknown run");
            return;
        };
        if record.status.is_terminal() {
            warn!(
                run_id = %id,
                current = %record.status,
                requested = %status,
                "ignoring status update on terminal run"
            );
            return;
        }
        record.status = status;
        if summary.is_some() {
            record.result_summary = summary;
        }
        if status.is_terminal() {
            record.finished_at = Some(Utc::now());
        }
    }

    async fn append_log(&self, id: &RunId, entry: LogEntry) {
        if let Some(mut record) = self.runs.get_mut(id) {
            record.logs.push(entry);
        }
    }
}
