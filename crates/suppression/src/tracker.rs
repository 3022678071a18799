//! Shared access to a [`SuppressionEngine`].
//!
//! The engine is owned by a task and driven through a cloneable
//! [`SuppressionHandle`], so producers running on different tasks can share
//! one suppressed set.

use capture_common::{Tid, parsing::EventRecord};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::engine::{SuppressionEngine, Verdict};

pub fn start_suppression_tracker(engine: SuppressionEngine) -> SuppressionHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut tracker = SuppressionTracker { rx, engine };
    tokio::spawn(async move { tracker.run().await });
    SuppressionHandle { tx }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SuppressionError {
    #[error("suppression tracker stopped")]
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuppressionStats {
    pub suppressed_events: u64,
    pub suppressed_tids: usize,
}

enum TrackerRequest {
    ProcessEvent {
        record: EventRecord,
        tx_reply: oneshot::Sender<Verdict>,
    },
    IsSuppressed {
        tid: Tid,
        tx_reply: oneshot::Sender<bool>,
    },
    Stats(oneshot::Sender<SuppressionStats>),
    Update(TrackerUpdate),
}

enum TrackerUpdate {
    AddDenylistedCommand(String),
    ClearDenylist,
    SuppressTid(Tid),
    ClearSuppressedTids,
}

#[derive(Clone)]
pub struct SuppressionHandle {
    tx: mpsc::UnboundedSender<TrackerRequest>,
}

impl SuppressionHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> TrackerRequest,
    ) -> Result<T, SuppressionError> {
        let (tx_reply, rx_reply) = oneshot::channel();
        self.tx
            .send(build(tx_reply))
            .map_err(|_| SuppressionError::Stopped)?;
        rx_reply.await.map_err(|_| SuppressionError::Stopped)
    }

    fn update(&self, update: TrackerUpdate) -> Result<(), SuppressionError> {
        self.tx
            .send(TrackerRequest::Update(update))
            .map_err(|_| SuppressionError::Stopped)
    }

    pub async fn process_event(&self, record: EventRecord) -> Result<Verdict, SuppressionError> {
        self.request(|tx_reply| TrackerRequest::ProcessEvent { record, tx_reply })
            .await
    }

    pub async fn is_suppressed(&self, tid: Tid) -> Result<bool, SuppressionError> {
        self.request(|tx_reply| TrackerRequest::IsSuppressed { tid, tx_reply })
            .await
    }

    pub async fn stats(&self) -> Result<SuppressionStats, SuppressionError> {
        self.request(TrackerRequest::Stats).await
    }

    pub fn add_denylisted_command(&self, comm: impl Into<String>) -> Result<(), SuppressionError> {
        self.update(TrackerUpdate::AddDenylistedCommand(comm.into()))
    }

    pub fn clear_denylist(&self) -> Result<(), SuppressionError> {
        self.update(TrackerUpdate::ClearDenylist)
    }

    pub fn suppress_tid(&self, tid: Tid) -> Result<(), SuppressionError> {
        self.update(TrackerUpdate::SuppressTid(tid))
    }

    pub fn clear_suppressed_tids(&self) -> Result<(), SuppressionError> {
        self.update(TrackerUpdate::ClearSuppressedTids)
    }
}

struct SuppressionTracker {
    /// commands receiver
    rx: mpsc::UnboundedReceiver<TrackerRequest>,
    engine: SuppressionEngine,
}

impl SuppressionTracker {
    async fn run(&mut self) {
        while let Some(req) = self.rx.recv().await {
            self.handle_message(req);
        }
        log::debug!(
            "suppression tracker stopped after {} suppressed events",
            self.engine.suppressed_event_count()
        );
    }

    fn handle_message(&mut self, req: TrackerRequest) {
        match req {
            TrackerRequest::ProcessEvent { record, tx_reply } => {
                let _ = tx_reply.send(self.engine.process_event(&record));
            }
            TrackerRequest::IsSuppressed { tid, tx_reply } => {
                let _ = tx_reply.send(self.engine.is_suppressed(tid));
            }
            TrackerRequest::Stats(tx_reply) => {
                let _ = tx_reply.send(SuppressionStats {
                    suppressed_events: self.engine.suppressed_event_count(),
                    suppressed_tids: self.engine.suppressed_tid_count(),
                });
            }
            TrackerRequest::Update(update) => match update {
                TrackerUpdate::AddDenylistedCommand(comm) => {
                    self.engine.add_denylisted_command(comm)
                }
                TrackerUpdate::ClearDenylist => self.engine.clear_denylist(),
                TrackerUpdate::SuppressTid(tid) => {
                    if !self.engine.suppress_tid(tid) {
                        log::warn!("ignoring request to suppress tid {tid}");
                    }
                }
                TrackerUpdate::ClearSuppressedTids => self.engine.clear_suppressed_tids(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use capture_common::{CaptureSettings, parsing::EventType, time::Timestamp};
    use event_encoder::{EventEncoder, NoMemory, ScratchBuffer};

    use super::*;

    fn connect(tid: u64) -> EventRecord {
        let mut scratch = ScratchBuffer::default();
        let settings = CaptureSettings::default();
        let mut encoder = EventEncoder::begin(
            &mut scratch,
            &settings,
            &NoMemory,
            EventType::SOCKET_CONNECT_E,
            Timestamp::from(1),
            Tid::from_raw(tid),
        )
        .unwrap();
        while encoder.pushed() < EventType::SOCKET_CONNECT_E.schema().nparams() {
            encoder.push_empty().unwrap();
        }
        EventRecord::parse(encoder.finish().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn updates_are_applied_in_order() {
        let handle = start_suppression_tracker(SuppressionEngine::default());
        handle.suppress_tid(Tid::from_raw(42)).unwrap();
        assert_eq!(
            handle.process_event(connect(42)).await,
            Ok(Verdict::Suppress)
        );
        assert_eq!(handle.process_event(connect(43)).await, Ok(Verdict::Pass));
        assert_eq!(handle.is_suppressed(Tid::from_raw(42)).await, Ok(true));

        handle.clear_suppressed_tids().unwrap();
        assert_eq!(handle.is_suppressed(Tid::from_raw(42)).await, Ok(false));
        assert_eq!(
            handle.stats().await,
            Ok(SuppressionStats {
                suppressed_events: 1,
                suppressed_tids: 0,
            })
        );
    }

    #[tokio::test]
    async fn handles_share_the_engine() {
        let handle = start_suppression_tracker(SuppressionEngine::default());
        let other = handle.clone();
        let task = tokio::spawn(async move {
            other.suppress_tid(Tid::from_raw(7)).unwrap();
            other.is_suppressed(Tid::from_raw(7)).await
        });
        assert_eq!(task.await.unwrap(), Ok(true));
        assert_eq!(handle.is_suppressed(Tid::from_raw(7)).await, Ok(true));
        // tid 0 is never suppressed
        handle.suppress_tid(Tid::KERNEL).unwrap();
        assert_eq!(handle.is_suppressed(Tid::KERNEL).await, Ok(false));
    }
}
