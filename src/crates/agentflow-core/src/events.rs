//! Progress events - append-only, sequence-numbered, fanned out live
//!
//! Every state change the coordinator makes is captured as an [`Event`]
//! carrying a per-run monotonic sequence number and a UTC timestamp. Events
//! go two places:
//!
//! - the run's **append-only log** in the [`RunStore`], which backs
//!   reconnect-and-resume streaming and post-hoc auditing;
//! - a **`tokio::sync::broadcast` channel** for live observers. Lagging
//!   receivers drop events rather than slow the run; a consumer that lagged
//!   resumes from the log using the sequence numbers.
//!
//! Publishing is fire-and-forget and never waits on storage: `publish` only
//! assigns the sequence number and hands the event to a per-run **writer
//! task**, so a slow log backend cannot stall the coordinator. The writer
//! appends each event to the log *before* offering it to the broadcast,
//! which is what lets a consumer replay the log and then switch to the live
//! channel without a gap. A missing live subscriber is not an error, and a
//! log-append failure is logged and swallowed rather than propagated into
//! the run. Per-run event ordering follows from the coordinator being the
//! only emitter and the writer preserving queue order.

use crate::graph::NodeId;
use crate::state::{NodeStatus, RunStatus};
use agentflow_store::RunStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use uuid::Uuid;

/// Default capacity of the live broadcast channel
pub const BROADCAST_CAPACITY: usize = 256;

/// One progress event within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Run this event belongs to
    pub run_id: Uuid,

    /// Per-run monotonic sequence number, starting at 1
    pub seq: u64,

    /// When the event was emitted
    pub at: DateTime<Utc>,

    /// What happened
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Event payload variants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    /// The coordinator accepted the run and started executing
    RunStarted,

    /// A node moved between lifecycle statuses
    NodeStatusChanged {
        /// The node that changed
        node: NodeId,
        /// Status before the transition
        old: NodeStatus,
        /// Status after the transition
        new: NodeStatus,
    },

    /// A node produced its output value
    NodeOutput {
        /// The producing node
        node: NodeId,
        /// The output value
        value: Value,
    },

    /// The run reached a terminal status
    RunCompleted {
        /// Terminal run status
        status: RunStatus,
        /// Succeeded output-node values, keyed by node id
        outputs: HashMap<String, Value>,
    },
}

/// Fans coordinator events out to the log and to live subscribers
///
/// Dropping the last publisher handle closes the queue; the writer task
/// drains what remains and exits, so a finished run's log is always
/// complete.
pub struct EventPublisher {
    run_id: Uuid,
    seq: AtomicU64,
    queue: mpsc::UnboundedSender<Event>,
    tx: broadcast::Sender<Event>,
    written: watch::Receiver<u64>,
}

impl EventPublisher {
    /// Create a publisher for one run, spawning its log writer task
    pub fn new(run_id: Uuid, store: Arc<dyn RunStore>) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (queue, mut pending) = mpsc::unbounded_channel::<Event>();
        let (written_tx, written) = watch::channel(0u64);

        let live = tx.clone();
        tokio::spawn(async move {
            while let Some(event) = pending.recv().await {
                match serde_json::to_value(&event) {
                    Ok(payload) => {
                        if let Err(e) = store.append_event(&event.run_id, event.seq, payload).await
                        {
                            tracing::warn!(run_id = %event.run_id, seq = event.seq, error = %e,
                                "failed to append event to run log");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(run_id = %event.run_id, seq = event.seq, error = %e,
                            "failed to serialize event");
                    }
                }
                let seq = event.seq;
                // Append before broadcast: a consumer that replays the log
                // first must not find a live event missing from it.
                // No live subscribers is not an error.
                let _ = live.send(event);
                let _ = written_tx.send(seq);
            }
        });

        Self {
            run_id,
            seq: AtomicU64::new(0),
            queue,
            tx,
            written,
        }
    }

    /// Subscribe to live events from this point on
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Sequence number of the most recently published event
    pub fn last_seq(&self) -> u64 {
        self.seq.load(Ordering::Acquire)
    }

    /// Assign the next sequence number and hand the event to the log
    /// writer; never waits on storage
    pub fn publish(&self, kind: EventKind) -> Event {
        let event = Event {
            run_id: self.run_id,
            seq: self.seq.fetch_add(1, Ordering::AcqRel) + 1,
            at: Utc::now(),
            kind,
        };
        let _ = self.queue.send(event.clone());
        event
    }

    /// Wait until the writer has appended every event up to `seq`
    pub async fn synced(&self, seq: u64) {
        let mut progress = self.written.clone();
        while *progress.borrow_and_update() < seq {
            if progress.changed().await.is_err() {
                return;
            }
        }
    }
}
