//! # agentflow-store - Run Persistence for agentflow
//!
//! Trait abstractions and an in-memory reference implementation for
//! persisting workflow runs: the validated graph snapshot, the evolving run
//! state, and the append-only, sequence-numbered event log that backs
//! reconnect-and-resume event streaming and post-hoc auditing.
//!
//! The execution engine (`agentflow-core`) only ever talks to storage through
//! the [`RunStore`] trait, so any backend - PostgreSQL, SQLite, Redis, object
//! storage - can be plugged in without touching engine internals.
//!
//! ## Quick Start
//!
//! ```rust
//! use agentflow_store::{InMemoryRunStore, RunRecord, RunStore};
//! use serde_json::json;
//! use uuid::Uuid;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> agentflow_store::Result<()> {
//! let store = InMemoryRunStore::new();
//! let run_id = Uuid::new_v4();
//!
//! store
//!     .put_run(RunRecord::new(run_id, json!({"nodes": []}), json!({})))
//!     .await?;
//! store.append_event(&run_id, 1, json!({"event": "run_started"})).await?;
//!
//! let log = store.events_after(&run_id, 0).await?;
//! assert_eq!(log.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod memory;
pub mod record;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::InMemoryRunStore;
pub use record::{EventRecord, RunRecord};
pub use traits::RunStore;
