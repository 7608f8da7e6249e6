//! In-memory run store for testing and single-process deployments
//!
//! [`InMemoryRunStore`] keeps all run records and event logs in a
//! `tokio::sync::RwLock`-guarded map. State is lost on process exit; use a
//! durable [`crate::RunStore`] implementation for anything that must survive
//! a restart.

use crate::{
    error::{Result, StoreError},
    record::{EventRecord, RunRecord},
    traits::RunStore,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Storage entry for one run: the record plus its event log
#[derive(Debug, Clone)]
struct StoredRun {
    record: RunRecord,
    events: Vec<EventRecord>,
}

/// In-memory implementation of [`RunStore`]
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<Uuid, StoredRun>>,
}

impl InMemoryRunStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of runs currently stored
    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    /// Whether the store holds no runs
    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }

    /// Remove a run record and its event log
    pub async fn remove(&self, run_id: &Uuid) -> Result<()> {
        self.runs
            .write()
            .await
            .remove(run_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(*run_id))
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn put_run(&self, record: RunRecord) -> Result<()> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&record.run_id) {
            return Err(StoreError::AlreadyExists(record.run_id));
        }
        runs.insert(
            record.run_id,
            StoredRun {
                record,
                events: Vec::new(),
            },
        );
        Ok(())
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<RunRecord> {
        self.runs
            .read()
            .await
            .get(run_id)
            .map(|stored| stored.record.clone())
            .ok_or(StoreError::NotFound(*run_id))
    }

    async fn update_state(&self, run_id: &Uuid, state: Value) -> Result<()> {
        let mut runs = self.runs.write().await;
        let stored = runs.get_mut(run_id).ok_or(StoreError::NotFound(*run_id))?;
        stored.record.state = state;
        stored.record.updated_at = Utc::now();
        Ok(())
    }

    async fn append_event(&self, run_id: &Uuid, seq: u64, payload: Value) -> Result<()> {
        let mut runs = self.runs.write().await;
        let stored = runs.get_mut(run_id).ok_or(StoreError::NotFound(*run_id))?;
        stored.events.push(EventRecord { seq, payload });
        Ok(())
    }

    async fn events_after(&self, run_id: &Uuid, seq: u64) -> Result<Vec<EventRecord>> {
        let runs = self.runs.read().await;
        let stored = runs.get(run_id).ok_or(StoreError::NotFound(*run_id))?;
        Ok(stored
            .events
            .iter()
            .filter(|event| event.seq > seq)
            .cloned()
            .collect())
    }
}
