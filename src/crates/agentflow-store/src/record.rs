//! Persisted run record types
//!
//! A [`RunRecord`] is the unit of persistence for one workflow run: the
//! validated graph snapshot taken at submission time, the latest run state,
//! and timestamps. The event log is kept alongside the record by the backend
//! and accessed through [`crate::RunStore::append_event`] /
//! [`crate::RunStore::events_after`].
//!
//! Graph, state, and events are stored as [`serde_json::Value`] so that this
//! crate stays independent of the engine's concrete types; the engine
//! serializes on write and deserializes on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Persisted record for a single workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique run identifier
    pub run_id: Uuid,

    /// Snapshot of the validated graph definition, serialized as JSON
    pub graph: Value,

    /// Latest run state, serialized as JSON
    pub state: Value,

    /// When the run was submitted
    pub created_at: DateTime<Utc>,

    /// When the record was last updated
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    /// Create a new record with creation and update time set to now
    pub fn new(run_id: Uuid, graph: Value, state: Value) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            graph,
            state,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A single entry in a run's append-only event log
///
/// `seq` is assigned by the engine and is strictly increasing per run; the
/// store preserves append order and filters on it for resume queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Per-run monotonic sequence number
    pub seq: u64,

    /// Event payload, serialized as JSON
    pub payload: Value,
}
