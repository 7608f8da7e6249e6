//! Engine facade - submit runs, stream events, cancel, fetch results
//!
//! [`Engine`] is the in-process entry point an external caller (a web API
//! layer, a CLI, a test) drives:
//!
//! - [`Engine::submit`] validates the graph eagerly, persists the run
//!   record, and spawns a [`Coordinator`] task; it returns the run id
//!   immediately.
//! - [`Engine::events`] yields the run's events as a stream. Reconnects
//!   resume from a sequence number: the persisted log is replayed first,
//!   then the stream switches to the live broadcast, deduplicating on
//!   `seq`. A receiver that lags the broadcast falls back to the log and
//!   catches up.
//! - [`Engine::cancel`] requests cooperative cancellation.
//! - [`Engine::result`] returns the terminal status, the output map, and
//!   the complete per-node trace once the run has finished.
//!
//! Run state is per-run and keyed by run id; there is no cross-run shared
//! mutability beyond the store itself.
//!
//! ```rust
//! use agentflow_core::{Engine, ExecutionRequest};
//! use agentflow_core::graph::{Edge, GraphDefinition, Node, NodeKind};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> agentflow_core::Result<()> {
//! let graph = GraphDefinition::new("double")
//!     .with_node(Node::new("a", NodeKind::Input).with_outputs(["out"]))
//!     .with_node(
//!         Node::new("b", NodeKind::Process)
//!             .with_config(json!({"op": "double"}))
//!             .with_inputs(["in"])
//!             .with_outputs(["out"]),
//!     )
//!     .with_node(Node::new("c", NodeKind::Output).with_inputs(["in"]))
//!     .with_edge(Edge::new("a", "out", "b", "in"))
//!     .with_edge(Edge::new("b", "out", "c", "in"));
//!
//! let engine = Engine::in_memory();
//! let run_id = engine
//!     .submit(ExecutionRequest::new(graph).with_input("a", json!(1)))
//!     .await?;
//! let result = engine.wait(run_id).await?;
//! assert_eq!(result.outputs["c"], json!(2));
//! # Ok(())
//! # }
//! ```

use crate::coordinator::{collect_outputs, Coordinator, ExecutionRequest};
use crate::error::{EngineError, Result};
use crate::events::{Event, EventKind, EventPublisher};
use crate::executor::{LocalRunner, NodeRunner};
use crate::graph::GraphDefinition;
use crate::state::{RunResult, RunState};
use crate::validate::validate;
use agentflow_store::{InMemoryRunStore, RunRecord, RunStore};
use futures::Stream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Per-run bookkeeping the engine keeps while a run executes
///
/// Released once the run reaches a terminal status and its event log is
/// fully written; consumers arriving later are served from the store.
struct RunHandle {
    cancel: CancellationToken,
    publisher: Arc<EventPublisher>,
}

/// In-process workflow execution engine
pub struct Engine {
    store: Arc<dyn RunStore>,
    runner: Arc<dyn NodeRunner>,
    runs: Arc<RwLock<HashMap<Uuid, RunHandle>>>,
}

impl Engine {
    /// Engine over a custom store and node runner
    pub fn new(store: Arc<dyn RunStore>, runner: Arc<dyn NodeRunner>) -> Self {
        Self {
            store,
            runner,
            runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Engine with the in-memory store and the built-in local runner
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryRunStore::new()), Arc::new(LocalRunner::new()))
    }

    /// Validate, persist, and start executing a run; returns its id
    ///
    /// Validation failures and missing input values are reported here,
    /// before any node executes.
    pub async fn submit(&self, request: ExecutionRequest) -> Result<Uuid> {
        let graph = validate(&request.graph).map_err(EngineError::Validation)?;
        for id in graph.input_nodes() {
            if !request.inputs.contains_key(id) {
                return Err(EngineError::MissingInput { node: id.clone() });
            }
        }

        let run_id = Uuid::new_v4();
        let graph = Arc::new(graph);
        let state = RunState::new(&graph);
        self.store
            .put_run(RunRecord::new(
                run_id,
                serde_json::to_value(graph.definition())?,
                serde_json::to_value(&state)?,
            ))
            .await?;

        let publisher = Arc::new(EventPublisher::new(run_id, self.store.clone()));
        let cancel = CancellationToken::new();
        self.runs.write().await.insert(
            run_id,
            RunHandle {
                cancel: cancel.clone(),
                publisher: publisher.clone(),
            },
        );

        let coordinator = Coordinator::new(
            run_id,
            graph,
            request.inputs,
            request.params,
            self.runner.clone(),
            publisher.clone(),
            self.store.clone(),
            cancel,
        );
        let runs = self.runs.clone();
        tokio::spawn(async move {
            if let Err(error) = coordinator.run().await {
                tracing::error!(%run_id, %error, "run ended with engine error");
            }
            // Release the handle only once the log writer has caught up, so
            // a consumer that misses the live channel still replays a
            // complete log.
            publisher.synced(publisher.last_seq()).await;
            runs.write().await.remove(&run_id);
        });

        Ok(run_id)
    }

    /// Request cooperative cancellation of a run
    ///
    /// A run that already reached a terminal status has released its handle
    /// and reports [`EngineError::RunNotFound`].
    pub async fn cancel(&self, run_id: Uuid) -> Result<()> {
        let runs = self.runs.read().await;
        let handle = runs.get(&run_id).ok_or(EngineError::RunNotFound(run_id))?;
        handle.cancel.cancel();
        Ok(())
    }

    /// Stream the run's events, resuming after `after_seq`
    ///
    /// Events already in the persisted log are replayed first; the stream
    /// then follows the live broadcast, skipping duplicates by sequence
    /// number, and ends after the `run_completed` event.
    pub async fn events(
        &self,
        run_id: Uuid,
        after_seq: u64,
    ) -> Result<impl Stream<Item = Event>> {
        // Subscribe before replaying so no event falls between log and live.
        let live = {
            let runs = self.runs.read().await;
            match runs.get(&run_id) {
                Some(handle) => Some(handle.publisher.subscribe()),
                None => None,
            }
        };
        if live.is_none() {
            // Unknown to this engine instance; the log may still exist.
            self.store.get_run(&run_id).await?;
        }
        let store = self.store.clone();

        Ok(async_stream::stream! {
            let mut last = after_seq;
            let mut rx = live;

            match replay(&*store, &run_id, last).await {
                Ok(events) => {
                    for event in events {
                        last = event.seq;
                        let done = is_final(&event);
                        yield event;
                        if done {
                            return;
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(%run_id, %error, "failed to replay event log");
                }
            }

            let Some(mut rx) = rx.take() else { return };
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if event.seq <= last {
                            continue;
                        }
                        last = event.seq;
                        let done = is_final(&event);
                        yield event;
                        if done {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::debug!(%run_id, missed, "event receiver lagged, catching up from log");
                        if let Ok(events) = replay(&*store, &run_id, last).await {
                            for event in events {
                                last = event.seq;
                                let done = is_final(&event);
                                yield event;
                                if done {
                                    return;
                                }
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        // Publisher gone; drain whatever reached the log.
                        if let Ok(events) = replay(&*store, &run_id, last).await {
                            for event in events {
                                yield event;
                            }
                        }
                        return;
                    }
                }
            }
        })
    }

    /// Terminal result of a run: status, outputs, and the full node trace
    ///
    /// Fails with [`EngineError::RunNotTerminal`] while the run is still in
    /// progress.
    pub async fn result(&self, run_id: Uuid) -> Result<RunResult> {
        let record = match self.store.get_run(&run_id).await {
            Ok(record) => record,
            Err(agentflow_store::StoreError::NotFound(_)) => {
                return Err(EngineError::RunNotFound(run_id))
            }
            Err(e) => return Err(e.into()),
        };
        let state: RunState = serde_json::from_value(record.state)?;
        if !state.status.is_terminal() {
            return Err(EngineError::RunNotTerminal(run_id));
        }

        // The snapshot passed validation at submission; revalidating just
        // rebuilds the indexes collect_outputs needs.
        let definition: GraphDefinition = serde_json::from_value(record.graph)?;
        let graph = validate(&definition).map_err(EngineError::Validation)?;
        let outputs = collect_outputs(&graph, &state);

        Ok(RunResult {
            status: state.status,
            outputs,
            node_trace: state.trace(),
        })
    }

    /// Convenience: follow the event stream until the run finishes, then
    /// return its result
    pub async fn wait(&self, run_id: Uuid) -> Result<RunResult> {
        use futures::StreamExt;
        let mut events = Box::pin(self.events(run_id, 0).await?);
        while events.next().await.is_some() {}
        self.result(run_id).await
    }
}

async fn replay(store: &dyn RunStore, run_id: &Uuid, after_seq: u64) -> Result<Vec<Event>> {
    let records = store.events_after(run_id, after_seq).await?;
    let mut events = Vec::with_capacity(records.len());
    for record in records {
        match serde_json::from_value::<Event>(record.payload) {
            Ok(event) => events.push(event),
            Err(error) => {
                tracing::warn!(%run_id, seq = record.seq, %error, "skipping undecodable event")
            }
        }
    }
    Ok(events)
}

fn is_final(event: &Event) -> bool {
    matches!(event.kind, EventKind::RunCompleted { .. })
}
