//! Extensible run storage trait for custom backend implementations
//!
//! This module defines the **[`RunStore`]** trait - the narrow persistence
//! interface the execution engine requires. The engine writes a run record at
//! submission, updates the run state as nodes complete, and appends every
//! emitted event to a per-run log; event streams resume after a disconnect by
//! replaying the log from a sequence number.
//!
//! Downstream projects implement this trait against their own storage system
//! (PostgreSQL, SQLite, Redis, object storage, ...) while keeping the engine
//! unchanged. [`crate::InMemoryRunStore`] is the reference implementation.
//!
//! # Implementing a Custom Backend
//!
//! ```rust,ignore
//! use agentflow_store::{RunStore, RunRecord, EventRecord, Result};
//! use async_trait::async_trait;
//! use serde_json::Value;
//! use uuid::Uuid;
//!
//! pub struct PostgresRunStore {
//!     pool: sqlx::PgPool,
//! }
//!
//! #[async_trait]
//! impl RunStore for PostgresRunStore {
//!     async fn put_run(&self, record: RunRecord) -> Result<()> {
//!         // INSERT INTO runs (run_id, graph, state, ...) VALUES (...)
//!         todo!()
//!     }
//!
//!     async fn get_run(&self, run_id: &Uuid) -> Result<RunRecord> {
//!         // SELECT ... FROM runs WHERE run_id = $1
//!         todo!()
//!     }
//!
//!     async fn update_state(&self, run_id: &Uuid, state: Value) -> Result<()> {
//!         // UPDATE runs SET state = $2, updated_at = now() WHERE run_id = $1
//!         todo!()
//!     }
//!
//!     async fn append_event(&self, run_id: &Uuid, seq: u64, payload: Value) -> Result<()> {
//!         // INSERT INTO run_events (run_id, seq, payload) VALUES (...)
//!         todo!()
//!     }
//!
//!     async fn events_after(&self, run_id: &Uuid, seq: u64) -> Result<Vec<EventRecord>> {
//!         // SELECT seq, payload FROM run_events WHERE run_id = $1 AND seq > $2 ORDER BY seq
//!         todo!()
//!     }
//! }
//! ```
//!
//! # Contract
//!
//! - `put_run` fails with [`crate::StoreError::AlreadyExists`] on a duplicate
//!   run id; all read operations fail with [`crate::StoreError::NotFound`] for
//!   unknown ids.
//! - `append_event` preserves append order; `events_after` returns entries
//!   with `seq` strictly greater than the argument, in ascending order.
//! - Implementations must be safe to call concurrently; the engine appends
//!   events from one task per run but may read from many.

use crate::error::Result;
use crate::record::{EventRecord, RunRecord};
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

/// Persistence backend for workflow runs and their event logs
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Store a new run record
    async fn put_run(&self, record: RunRecord) -> Result<()>;

    /// Fetch the record for a run
    async fn get_run(&self, run_id: &Uuid) -> Result<RunRecord>;

    /// Replace the persisted run state for a run
    async fn update_state(&self, run_id: &Uuid, state: Value) -> Result<()>;

    /// Append one event to the run's event log
    async fn append_event(&self, run_id: &Uuid, seq: u64, payload: Value) -> Result<()>;

    /// Return all logged events with sequence number greater than `seq`,
    /// in ascending sequence order
    async fn events_after(&self, run_id: &Uuid, seq: u64) -> Result<Vec<EventRecord>>;
}
