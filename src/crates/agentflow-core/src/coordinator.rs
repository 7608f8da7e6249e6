//! Execution coordination - one run's lifecycle from validation to result
//!
//! The [`Coordinator`] owns a single run: it seeds the run state from the
//! request inputs, repeatedly asks the scheduler for ready nodes, dispatches
//! them onto a bounded worker pool, merges completions back into the state,
//! and emits progress events throughout. Control logic is single-threaded -
//! there is one authoritative [`RunState`], updated serially in the order
//! completions are observed - while node executions themselves run in
//! parallel on the pool.
//!
//! # Failure and Cancellation Semantics
//!
//! - Retryable node errors are absorbed by the run's [`RetryPolicy`] inside
//!   the worker; the coordinator only sees the final outcome and the attempt
//!   count.
//! - A permanent node failure marks the node `failed` and lets the scheduler
//!   skip its exclusively-dependent downstream subgraph; independent
//!   branches keep executing, and their outputs are retained even though the
//!   run finishes `failed` (structured partial failure).
//! - Cancellation stops dispatching, signals in-flight nodes through child
//!   cancellation tokens (each node's own wall-clock budget is the hard
//!   deadline), and marks never-started nodes `cancelled`. The terminal
//!   trace never contains a `running` node.
//! - If nothing is ready, nothing is running, and nodes remain pending, the
//!   coordinator reports a deadlock. Validation makes this unreachable; it
//!   is detected defensively and surfaced as an internal-consistency bug.

use crate::error::{EngineError, Result};
use crate::events::{EventKind, EventPublisher};
use crate::executor::{Budget, NodeError, NodeRunner};
use crate::graph::{GraphDefinition, Node, NodeId};
use crate::retry::RetryPolicy;
use crate::scheduler::{ready_transitions, resolved_inputs};
use crate::state::{NodeStatus, RunResult, RunState, RunStatus};
use crate::validate::ValidatedGraph;
use agentflow_store::RunStore;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Extra time a runner gets past its budget to report its own timeout
/// before the worker pool enforces one
const ENFORCEMENT_GRACE: Duration = Duration::from_millis(250);

/// Parameters governing one run
#[derive(Debug, Clone)]
pub struct RunParams {
    /// Wall-clock limit for the whole run
    pub timeout: Duration,

    /// Default wall-clock budget per node attempt; a node config's
    /// `timeout_ms` overrides it
    pub node_timeout: Duration,

    /// Retry policy for retryable node errors
    pub retry: RetryPolicy,

    /// Maximum number of nodes executing concurrently
    pub max_concurrency: usize,
}

impl RunParams {
    /// Set the whole-run timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the default per-node budget
    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the worker-pool concurrency bound (minimum 1)
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            node_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            max_concurrency: 4,
        }
    }
}

/// What a caller submits: the graph, values for its input nodes, and run
/// parameters. Read-only to the engine.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// The graph to execute
    pub graph: GraphDefinition,

    /// Values for input nodes, keyed by node id
    pub inputs: HashMap<String, Value>,

    /// Run parameters
    pub params: RunParams,
}

impl ExecutionRequest {
    /// Request with no inputs and default parameters
    pub fn new(graph: GraphDefinition) -> Self {
        Self {
            graph,
            inputs: HashMap::new(),
            params: RunParams::default(),
        }
    }

    /// Provide a value for an input node
    pub fn with_input(mut self, node: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(node.into(), value);
        self
    }

    /// Set the run parameters
    pub fn with_params(mut self, params: RunParams) -> Self {
        self.params = params;
        self
    }
}

/// Outcome of one worker-pool task
struct Completion {
    node: NodeId,
    result: std::result::Result<Value, NodeError>,
    attempts: u32,
}

/// Drives one workflow run to a terminal status
pub struct Coordinator {
    run_id: Uuid,
    graph: Arc<ValidatedGraph>,
    inputs: HashMap<String, Value>,
    params: RunParams,
    runner: Arc<dyn NodeRunner>,
    publisher: Arc<EventPublisher>,
    store: Arc<dyn RunStore>,
    cancel: CancellationToken,
    state: RunState,
}

impl Coordinator {
    /// Create a coordinator for a validated graph
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: Uuid,
        graph: Arc<ValidatedGraph>,
        inputs: HashMap<String, Value>,
        params: RunParams,
        runner: Arc<dyn NodeRunner>,
        publisher: Arc<EventPublisher>,
        store: Arc<dyn RunStore>,
        cancel: CancellationToken,
    ) -> Self {
        let state = RunState::new(&graph);
        Self {
            run_id,
            graph,
            inputs,
            params,
            runner,
            publisher,
            store,
            cancel,
            state,
        }
    }

    /// Execute the run to completion
    #[tracing::instrument(skip_all, fields(run_id = %self.run_id, nodes = self.graph.node_count()))]
    pub async fn run(mut self) -> Result<RunResult> {
        self.seed_inputs()?;
        self.state.status = RunStatus::Running;
        self.publisher.publish(EventKind::RunStarted);
        self.persist().await?;
        tracing::info!("run started");

        let mut pool: JoinSet<Completion> = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, NodeId> = HashMap::new();
        let mut cancelling = false;
        let mut timed_out = false;
        let cancel = self.cancel.clone();

        let deadline = tokio::time::sleep(self.params.timeout);
        tokio::pin!(deadline);

        loop {
            // A cancel that raced a dispatch round must stop further
            // dispatching, not wait for a pool completion to be noticed.
            if !cancelling && cancel.is_cancelled() {
                tracing::info!("cancellation requested, draining in-flight nodes");
                cancelling = true;
            }

            if !cancelling {
                let ready = self.apply_skips();
                for id in ready {
                    if pool.len() >= self.params.max_concurrency {
                        // stays pending; picked up after a completion
                        break;
                    }
                    self.dispatch(&id, &mut pool, &mut in_flight);
                }
                self.persist().await?;
            }

            if pool.is_empty() {
                if cancelling {
                    self.cancel_remaining();
                    break;
                }
                if self.state.all_terminal() {
                    break;
                }
                return self.fail_deadlocked().await;
            }

            tokio::select! {
                Some(joined) = pool.join_next_with_id() => {
                    let completion = match joined {
                        Ok((task_id, completion)) => {
                            in_flight.remove(&task_id);
                            Some(completion)
                        }
                        Err(join_err) => {
                            // a panicking node must not wedge the run
                            let node = in_flight.remove(&join_err.id());
                            tracing::error!(node = ?node, error = %join_err, "node task panicked");
                            node.map(|node| Completion {
                                node,
                                result: Err(NodeError::Fatal(format!(
                                    "execution task panicked: {join_err}"
                                ))),
                                attempts: 0,
                            })
                        }
                    };
                    if let Some(completion) = completion {
                        self.absorb_completion(completion);
                    }
                }
                _ = cancel.cancelled(), if !cancelling => {
                    cancelling = true;
                }
                _ = &mut deadline, if !cancelling => {
                    tracing::warn!(timeout = ?self.params.timeout, "run timed out");
                    cancelling = true;
                    timed_out = true;
                    cancel.cancel();
                }
            }
        }

        self.finish(cancelling, timed_out).await
    }

    /// Mark input nodes succeeded with their provided values
    fn seed_inputs(&mut self) -> Result<()> {
        for id in self.graph.input_nodes().to_vec() {
            let value = self
                .inputs
                .get(&id)
                .cloned()
                .ok_or_else(|| EngineError::MissingInput { node: id.clone() })?;
            let now = Utc::now();
            let record = self.state.record_mut(&id);
            record.status = NodeStatus::Succeeded;
            record.output = Some(value);
            record.started_at = Some(now);
            record.ended_at = Some(now);
        }
        Ok(())
    }

    /// Apply skip transitions to a fixpoint, then return the ready set
    ///
    /// Skipping a node can make its dependents skippable in the next
    /// scheduler pass, so iterate until the skip set is empty.
    fn apply_skips(&mut self) -> Vec<NodeId> {
        loop {
            let transitions = ready_transitions(&self.graph, &self.state);
            if transitions.skip.is_empty() {
                return transitions.ready;
            }
            for id in &transitions.skip {
                self.set_status(id, NodeStatus::Skipped, None);
            }
        }
    }

    /// Mark a node running and hand it to the worker pool
    fn dispatch(
        &mut self,
        id: &str,
        pool: &mut JoinSet<Completion>,
        in_flight: &mut HashMap<tokio::task::Id, NodeId>,
    ) {
        self.set_status(id, NodeStatus::Running, None);

        let node = self
            .graph
            .node(id)
            .expect("scheduler only yields graph nodes")
            .clone();
        let inputs = resolved_inputs(&self.graph, &self.state, id);
        let budget = self.node_budget(&node);
        let retry = self.params.retry.clone();
        let runner = self.runner.clone();
        let token = self.cancel.child_token();

        tracing::debug!(node = %id, kind = %node.kind, "dispatching node");

        let handle = pool.spawn(async move {
            let mut attempts = 0u32;
            loop {
                attempts += 1;
                // The budget is enforced here as well: a runner that ignores
                // it (and its token) must not wedge the drain loop.
                let attempt = tokio::time::timeout(
                    budget.wall_clock + ENFORCEMENT_GRACE,
                    runner.execute(&node, inputs.clone(), &budget, token.clone()),
                )
                .await
                .unwrap_or_else(|_| {
                    if token.is_cancelled() {
                        Err(NodeError::Cancelled)
                    } else {
                        Err(NodeError::Timeout(budget.wall_clock))
                    }
                });
                match attempt {
                    Ok(value) => {
                        return Completion {
                            node: node.id,
                            result: Ok(value),
                            attempts,
                        }
                    }
                    Err(error)
                        if error.is_retryable()
                            && retry.should_retry(attempts)
                            && !token.is_cancelled() =>
                    {
                        let delay = retry.calculate_delay(attempts - 1);
                        tracing::debug!(node = %node.id, %error, attempts, ?delay, "retrying node");
                        tokio::select! {
                            _ = token.cancelled() => {
                                return Completion {
                                    node: node.id,
                                    result: Err(NodeError::Cancelled),
                                    attempts,
                                }
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    Err(error) => {
                        return Completion {
                            node: node.id,
                            result: Err(error),
                            attempts,
                        }
                    }
                }
            }
        });
        in_flight.insert(handle.id(), id.to_string());
    }

    /// Per-node budget: config `timeout_ms` overrides the run default
    fn node_budget(&self, node: &Node) -> Budget {
        let wall_clock = node
            .config_value("timeout_ms")
            .and_then(|v| v.as_u64())
            .map(Duration::from_millis)
            .unwrap_or(self.params.node_timeout);
        Budget::new(wall_clock)
    }

    /// Merge one worker completion into the run state
    fn absorb_completion(&mut self, completion: Completion) {
        self.state.record_mut(&completion.node).attempts = completion.attempts;
        match completion.result {
            Ok(value) => {
                tracing::debug!(node = %completion.node, "node succeeded");
                self.set_status(&completion.node, NodeStatus::Succeeded, Some(value.clone()));
                self.publisher.publish(EventKind::NodeOutput {
                    node: completion.node,
                    value,
                });
            }
            Err(NodeError::Cancelled) => {
                tracing::debug!(node = %completion.node, "node cancelled");
                self.set_status(&completion.node, NodeStatus::Cancelled, None);
            }
            Err(error) => {
                tracing::warn!(node = %completion.node, %error, attempts = completion.attempts,
                    "node failed permanently");
                let record = self.state.record_mut(&completion.node);
                record.error = Some(error.to_string());
                self.set_status(&completion.node, NodeStatus::Failed, None);
            }
        }
    }

    /// Transition a node's status, stamping timestamps and emitting the
    /// status-change event
    fn set_status(&mut self, id: &str, new: NodeStatus, output: Option<Value>) {
        let now = Utc::now();
        let record = self.state.record_mut(id);
        let old = record.status;
        record.status = new;
        if new == NodeStatus::Running {
            record.started_at = Some(now);
        }
        if new.is_terminal() {
            record.ended_at = Some(now);
        }
        if let Some(value) = output {
            record.output = Some(value);
        }
        self.publisher.publish(EventKind::NodeStatusChanged {
            node: id.to_string(),
            old,
            new,
        });
    }

    /// After a drain, mark every node that never started as cancelled
    fn cancel_remaining(&mut self) {
        for id in self.state.pending_nodes() {
            self.set_status(&id, NodeStatus::Cancelled, None);
        }
    }

    /// Deadlock: surface the internal-consistency error, never swallow it
    async fn fail_deadlocked(&mut self) -> Result<RunResult> {
        let pending = self.state.pending_nodes();
        tracing::error!(?pending, "scheduler deadlock; this indicates a validator defect");
        self.state.status = RunStatus::Failed;
        self.persist().await?;
        self.publisher.publish(EventKind::RunCompleted {
            status: RunStatus::Failed,
            outputs: HashMap::new(),
        });
        Err(EngineError::Deadlock { pending })
    }

    /// Assemble outputs, fix the terminal status, and emit the final event
    async fn finish(mut self, cancelled: bool, timed_out: bool) -> Result<RunResult> {
        let any_failed = self
            .state
            .nodes
            .values()
            .any(|r| r.status == NodeStatus::Failed);
        self.state.status = if timed_out {
            RunStatus::Failed
        } else if cancelled {
            RunStatus::Cancelled
        } else if any_failed {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };

        let outputs = collect_outputs(&self.graph, &self.state);
        // Persist before announcing completion: a consumer reacting to the
        // final event must find the terminal state in the store.
        self.persist().await?;
        self.publisher.publish(EventKind::RunCompleted {
            status: self.state.status,
            outputs: outputs.clone(),
        });

        tracing::info!(status = ?self.state.status, outputs = outputs.len(), "run finished");
        Ok(RunResult {
            status: self.state.status,
            outputs,
            node_trace: self.state.trace(),
        })
    }

    async fn persist(&self) -> Result<()> {
        let state = serde_json::to_value(&self.state)?;
        self.store.update_state(&self.run_id, state).await?;
        Ok(())
    }
}

/// Output map: succeeded values of the designated output nodes
pub fn collect_outputs(graph: &ValidatedGraph, state: &RunState) -> HashMap<String, Value> {
    graph
        .output_nodes()
        .iter()
        .filter_map(|id| {
            let record = state.record(id);
            match (record.status, &record.output) {
                (NodeStatus::Succeeded, Some(value)) => Some((id.clone(), value.clone())),
                _ => None,
            }
        })
        .collect()
}
