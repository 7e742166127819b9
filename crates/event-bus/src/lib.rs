//! In-memory fan-out of run events to any number of subscribers.
//!
//! Each run gets a broadcast channel. Emission never blocks the engine: a
//! subscriber that falls behind the channel buffer misses the oldest events
//! (observed as a `Lagged` on its receiver) and the engine keeps going.
//!
//! The channel also tracks the run's last published status under the same
//! lock that hands out receivers, so a subscriber attaching around the
//! moment a run finishes sees the terminal status exactly once: either in
//! the snapshot returned by [`EventHub::subscribe`] or on the stream, never
//! both and never neither.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::trace;

use testwright_core_types::{RunEvent, RunId, RunStatus};

/// Buffer depth per run channel. Slow subscribers past this lag drop events.
const EVENT_BUFFER: usize = 64;

struct ChannelInner {
    sender: broadcast::Sender<RunEvent>,
    last_status: RunStatus,
}

struct RunChannel {
    inner: Mutex<ChannelInner>,
}

impl RunChannel {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Mutex::new(ChannelInner {
                sender,
                last_status: RunStatus::Pending,
            }),
        }
    }
}

/// Registry of live run channels.
#[derive(Default)]
pub struct EventHub {
    channels: DashMap<RunId, Arc<RunChannel>>,
}

impl EventHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            channels: DashMap::new(),
        })
    }

    /// Create the channel for a run. Called once when the run is created,
    /// before its task is spawned, so subscribers can attach immediately.
    pub fn register(&self, run_id: &RunId) {
        self.channels
            .entry(run_id.clone())
            .or_insert_with(|| Arc::new(RunChannel::new()));
    }

    /// Publish an event to whoever is listening. Best-effort: a send with
    /// no receivers is not an error.
    pub fn emit(&self, run_id: &RunId, event: RunEvent) {
        let Some(channel) = self.channels.get(run_id).map(|c| Arc::clone(&c)) else {
            trace!(run_id = %run_id, kind = event.kind(), "emit on unregistered run, dropping");
            return;
        };
        let mut inner = channel.inner.lock();
        if let RunEvent::Status(status) = &event {
            inner.last_status = *status;
        }
        if inner.sender.send(event).is_err() {
            trace!(run_id = %run_id, "no subscribers for event");
        }
    }

    /// Attach a subscriber. Returns the last published status together with
    /// a receiver for everything published after this call, atomically with
    /// respect to [`EventHub::emit`].
    pub fn subscribe(&self, run_id: &RunId) -> Option<(RunStatus, broadcast::Receiver<RunEvent>)> {
        let channel = self.channels.get(run_id).map(|c| Arc::clone(&c))?;
        let inner = channel.inner.lock();
        Some((inner.last_status, inner.sender.subscribe()))
    }

    /// Tear down a run's channel once its terminal status has been emitted.
    /// Open receivers observe the stream closing.
    pub fn remove(&self, run_id: &RunId) {
        self.channels.remove(run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testwright_core_types::StepId;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn subscriber_sees_events_published_after_attach() {
        let hub = EventHub::new();
        let run_id = RunId::new();
        hub.register(&run_id);

        let (status, mut rx) = hub.subscribe(&run_id).unwrap();
        assert_eq!(status, RunStatus::Pending);

        hub.emit(&run_id, RunEvent::Log("starting".to_string()));
        assert_eq!(rx.recv().await.unwrap(), RunEvent::Log("starting".to_string()));
    }

    #[tokio::test]
    async fn late_subscriber_gets_terminal_status_in_snapshot_only() {
        let hub = EventHub::new();
        let run_id = RunId::new();
        hub.register(&run_id);

        hub.emit(&run_id, RunEvent::Status(RunStatus::Running));
        hub.emit(&run_id, RunEvent::Status(RunStatus::Passed));

        let (status, mut rx) = hub.subscribe(&run_id).unwrap();
        assert_eq!(status, RunStatus::Passed);

        // Nothing published after attach, so the stream ends on removal
        // without a second terminal status.
        hub.remove(&run_id);
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
    }

    #[tokio::test]
    async fn emit_on_unknown_run_is_a_no_op() {
        let hub = EventHub::new();
        let run_id = RunId::new();
        hub.emit(&run_id, RunEvent::Log("dropped".to_string()));
        assert!(hub.subscribe(&run_id).is_none());
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let hub = EventHub::new();
        let run_id = RunId::new();
        hub.register(&run_id);

        let (_, mut rx) = hub.subscribe(&run_id).unwrap();
        for i in 0..(EVENT_BUFFER + 8) {
            hub.emit(
                &run_id,
                RunEvent::StepStart {
                    step_id: StepId(format!("s-{i}")),
                    order: i as u32,
                },
            );
        }
        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(_))));
        // After the lag the receiver resumes from the oldest retained event.
        assert!(rx.recv().await.is_ok());
    }
}
