//! Integration tests for complete workflow runs
//!
//! These drive the engine facade end to end: submission, scheduling,
//! bounded dispatch, retries, partial failure, conditional edges,
//! cancellation, and event-stream resume.

use agentflow_core::graph::{Edge, EdgeCondition, GraphDefinition, Node, NodeKind};
use agentflow_core::{
    AgentInvoker, AgentRequest, Budget, Engine, EngineError, EventKind, ExecutionRequest,
    LocalRunner, NodeError, NodeRunner, NodeStatus, RetryPolicy, RunParams, RunStatus,
};
use agentflow_store::{EventRecord, InMemoryRunStore, RunRecord, RunStore};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn process_node(id: &str, op: &str) -> Node {
    Node::new(id, NodeKind::Process)
        .with_config(json!({"op": op}))
        .with_inputs(["in"])
        .with_outputs(["out"])
}

fn linear_graph() -> GraphDefinition {
    GraphDefinition::new("double")
        .with_node(Node::new("a", NodeKind::Input).with_outputs(["out"]))
        .with_node(process_node("b", "double"))
        .with_node(Node::new("c", NodeKind::Output).with_inputs(["in"]))
        .with_edge(Edge::new("a", "out", "b", "in"))
        .with_edge(Edge::new("b", "out", "c", "in"))
}

fn status_of(result: &agentflow_core::RunResult, node: &str) -> NodeStatus {
    result
        .node_trace
        .iter()
        .find(|t| t.node == node)
        .unwrap_or_else(|| panic!("node {node} missing from trace"))
        .status
}

#[tokio::test]
async fn test_linear_graph_doubles_input() {
    let engine = Engine::in_memory();
    let run_id = engine
        .submit(ExecutionRequest::new(linear_graph()).with_input("a", json!(1)))
        .await
        .unwrap();

    let result = engine.wait(run_id).await.unwrap();
    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(result.outputs["c"], json!(2));
    assert_eq!(status_of(&result, "a"), NodeStatus::Succeeded);
    assert_eq!(status_of(&result, "b"), NodeStatus::Succeeded);
    assert_eq!(status_of(&result, "c"), NodeStatus::Succeeded);

    let b = result.node_trace.iter().find(|t| t.node == "b").unwrap();
    assert_eq!(b.output, Some(json!(2)));
    assert_eq!(b.attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_agent_timeout_fails_run_and_skips_downstream() {
    // ai-agent with a 5s simulated delay against a 1s budget
    let graph = GraphDefinition::new("slow-agent")
        .with_node(Node::new("a", NodeKind::Input).with_outputs(["out"]))
        .with_node(
            Node::new("b", NodeKind::AiAgent)
                .with_config(json!({"simulated_delay_ms": 5000, "timeout_ms": 1000}))
                .with_inputs(["in"])
                .with_outputs(["out"]),
        )
        .with_node(Node::new("c", NodeKind::Output).with_inputs(["in"]))
        .with_edge(Edge::new("a", "out", "b", "in"))
        .with_edge(Edge::new("b", "out", "c", "in"));

    let engine = Engine::in_memory();
    let run_id = engine
        .submit(
            ExecutionRequest::new(graph)
                .with_input("a", json!("prompt"))
                .with_params(RunParams::default().with_retry(RetryPolicy::none())),
        )
        .await
        .unwrap();

    let result = engine.wait(run_id).await.unwrap();
    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(status_of(&result, "b"), NodeStatus::Failed);
    assert_eq!(status_of(&result, "c"), NodeStatus::Skipped);
    assert!(result.outputs.is_empty());

    let b = result.node_trace.iter().find(|t| t.node == "b").unwrap();
    assert!(b.error.as_deref().unwrap().contains("timed out"));
    assert_eq!(b.attempts, 1);
}

#[tokio::test]
async fn test_partial_failure_keeps_independent_branch_output() {
    // branch 1: a1 -> b1(double over a string: permanent InvalidInput) -> c1
    // branch 2: a2 -> b2(double) -> c2
    let graph = GraphDefinition::new("branches")
        .with_node(Node::new("a1", NodeKind::Input).with_outputs(["out"]))
        .with_node(Node::new("a2", NodeKind::Input).with_outputs(["out"]))
        .with_node(process_node("b1", "double"))
        .with_node(process_node("b2", "double"))
        .with_node(Node::new("c1", NodeKind::Output).with_inputs(["in"]))
        .with_node(Node::new("c2", NodeKind::Output).with_inputs(["in"]))
        .with_edge(Edge::new("a1", "out", "b1", "in"))
        .with_edge(Edge::new("b1", "out", "c1", "in"))
        .with_edge(Edge::new("a2", "out", "b2", "in"))
        .with_edge(Edge::new("b2", "out", "c2", "in"));

    let engine = Engine::in_memory();
    let run_id = engine
        .submit(
            ExecutionRequest::new(graph)
                .with_input("a1", json!("not a number"))
                .with_input("a2", json!(21)),
        )
        .await
        .unwrap();

    let result = engine.wait(run_id).await.unwrap();
    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(status_of(&result, "b1"), NodeStatus::Failed);
    assert_eq!(status_of(&result, "c1"), NodeStatus::Skipped);
    assert_eq!(status_of(&result, "b2"), NodeStatus::Succeeded);
    assert_eq!(status_of(&result, "c2"), NodeStatus::Succeeded);
    // the healthy branch's output is retained despite the failed run
    assert_eq!(result.outputs.get("c2"), Some(&json!(42)));
    assert!(!result.outputs.contains_key("c1"));
}

#[tokio::test]
async fn test_false_conditional_edge_skips_target() {
    let graph = GraphDefinition::new("conditional")
        .with_node(Node::new("a", NodeKind::Input).with_outputs(["out"]))
        .with_node(Node::new("b", NodeKind::Output).with_inputs(["in"]))
        .with_edge(
            Edge::new("a", "out", "b", "in").with_condition(EdgeCondition::Truthy {
                pointer: "/go".to_string(),
            }),
        );

    let engine = Engine::in_memory();
    let run_id = engine
        .submit(ExecutionRequest::new(graph).with_input("a", json!({"go": false})))
        .await
        .unwrap();

    let result = engine.wait(run_id).await.unwrap();
    // a skipped conditional branch is a legitimate path, not a failure
    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(status_of(&result, "b"), NodeStatus::Skipped);
    assert!(result.outputs.is_empty());
}

#[tokio::test]
async fn test_cancellation_leaves_no_running_node() {
    let graph = GraphDefinition::new("slow")
        .with_node(Node::new("a", NodeKind::Input).with_outputs(["out"]))
        .with_node(
            Node::new("b", NodeKind::Delay)
                .with_config(json!({"duration_ms": 60_000, "timeout_ms": 120_000}))
                .with_inputs(["in"])
                .with_outputs(["out"]),
        )
        .with_node(Node::new("c", NodeKind::Output).with_inputs(["in"]))
        .with_edge(Edge::new("a", "out", "b", "in"))
        .with_edge(Edge::new("b", "out", "c", "in"));

    let engine = Engine::in_memory();
    let run_id = engine
        .submit(ExecutionRequest::new(graph).with_input("a", json!(1)))
        .await
        .unwrap();

    // cancel once the delay node is observably in flight
    let mut events = Box::pin(engine.events(run_id, 0).await.unwrap());
    while let Some(event) = events.next().await {
        if matches!(
            &event.kind,
            EventKind::NodeStatusChanged { node, new: NodeStatus::Running, .. } if node == "b"
        ) {
            break;
        }
    }
    engine.cancel(run_id).await.unwrap();

    let result = engine.wait(run_id).await.unwrap();
    assert_eq!(result.status, RunStatus::Cancelled);
    assert_eq!(status_of(&result, "b"), NodeStatus::Cancelled);
    assert_eq!(status_of(&result, "c"), NodeStatus::Cancelled);
    assert!(result
        .node_trace
        .iter()
        .all(|t| t.status != NodeStatus::Running));
}

#[tokio::test]
async fn test_independent_branches_commute() {
    // diamond: the two middle nodes run in parallel and may complete in
    // either order; final run state content must not depend on it
    let diamond = GraphDefinition::new("diamond")
        .with_node(Node::new("a", NodeKind::Input).with_outputs(["out"]))
        .with_node(process_node("b", "double"))
        .with_node(process_node("c", "negate"))
        .with_node(
            Node::new("d", NodeKind::Process)
                .with_config(json!({"op": "sum"}))
                .with_inputs(["in"])
                .with_outputs(["out"]),
        )
        .with_node(Node::new("e", NodeKind::Output).with_inputs(["in"]))
        .with_edge(Edge::new("a", "out", "b", "in"))
        .with_edge(Edge::new("a", "out", "c", "in"))
        .with_edge(Edge::new("b", "out", "d", "in"))
        .with_edge(Edge::new("c", "out", "d", "in"))
        .with_edge(Edge::new("d", "out", "e", "in"));

    let mut seen: Option<(Value, Vec<(String, NodeStatus)>)> = None;
    for _ in 0..4 {
        let engine = Engine::in_memory();
        let run_id = engine
            .submit(ExecutionRequest::new(diamond.clone()).with_input("a", json!(3)))
            .await
            .unwrap();
        let result = engine.wait(run_id).await.unwrap();

        assert_eq!(result.status, RunStatus::Succeeded);
        // 3 -> double 6, negate -3, sum 3
        assert_eq!(result.outputs["e"], json!(3));

        let statuses: Vec<(String, NodeStatus)> = result
            .node_trace
            .iter()
            .map(|t| (t.node.clone(), t.status))
            .collect();
        let content = (result.outputs["e"].clone(), statuses);
        match &seen {
            None => seen = Some(content),
            Some(previous) => assert_eq!(previous, &content),
        }
    }
}

/// Agent runtime that fails transiently a fixed number of times
struct FlakyAgent {
    failures: AtomicU32,
}

#[async_trait]
impl AgentInvoker for FlakyAgent {
    async fn invoke(
        &self,
        request: AgentRequest,
        _cancel: CancellationToken,
    ) -> Result<Value, NodeError> {
        if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n > 0).then(|| n - 1)
            })
            .is_ok()
        {
            return Err(NodeError::Transient("upstream hiccup".to_string()));
        }
        Ok(json!({"node": request.node, "completion": "ok"}))
    }
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried_with_backoff() {
    let runner = LocalRunner::with_agent(Arc::new(FlakyAgent {
        failures: AtomicU32::new(2),
    }));
    let engine = Engine::new(Arc::new(InMemoryRunStore::new()), Arc::new(runner));

    let graph = GraphDefinition::new("flaky")
        .with_node(Node::new("a", NodeKind::Input).with_outputs(["out"]))
        .with_node(
            Node::new("b", NodeKind::Llm)
                .with_inputs(["in"])
                .with_outputs(["out"]),
        )
        .with_node(Node::new("c", NodeKind::Output).with_inputs(["in"]))
        .with_edge(Edge::new("a", "out", "b", "in"))
        .with_edge(Edge::new("b", "out", "c", "in"));

    let run_id = engine
        .submit(
            ExecutionRequest::new(graph)
                .with_input("a", json!("prompt"))
                .with_params(RunParams::default().with_retry(RetryPolicy::new(3))),
        )
        .await
        .unwrap();

    let result = engine.wait(run_id).await.unwrap();
    assert_eq!(result.status, RunStatus::Succeeded);
    let b = result.node_trace.iter().find(|t| t.node == "b").unwrap();
    assert_eq!(b.status, NodeStatus::Succeeded);
    assert_eq!(b.attempts, 3);
}

/// Store whose event log appends take as long as a remote backend's would
struct SlowLogStore {
    inner: InMemoryRunStore,
}

#[async_trait]
impl RunStore for SlowLogStore {
    async fn put_run(&self, record: RunRecord) -> agentflow_store::Result<()> {
        self.inner.put_run(record).await
    }

    async fn get_run(&self, run_id: &uuid::Uuid) -> agentflow_store::Result<RunRecord> {
        self.inner.get_run(run_id).await
    }

    async fn update_state(
        &self,
        run_id: &uuid::Uuid,
        state: Value,
    ) -> agentflow_store::Result<()> {
        self.inner.update_state(run_id, state).await
    }

    async fn append_event(
        &self,
        run_id: &uuid::Uuid,
        seq: u64,
        payload: Value,
    ) -> agentflow_store::Result<()> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.inner.append_event(run_id, seq, payload).await
    }

    async fn events_after(
        &self,
        run_id: &uuid::Uuid,
        seq: u64,
    ) -> agentflow_store::Result<Vec<EventRecord>> {
        self.inner.events_after(run_id, seq).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_event_log_does_not_stall_the_run() {
    let store = Arc::new(SlowLogStore {
        inner: InMemoryRunStore::new(),
    });
    let engine = Engine::new(store, Arc::new(LocalRunner::new()));
    let run_id = engine
        .submit(ExecutionRequest::new(linear_graph()).with_input("a", json!(1)))
        .await
        .unwrap();

    // Poll for the terminal state instead of following the event stream:
    // the stream is throttled by the log appends, the run itself is not.
    let start = tokio::time::Instant::now();
    let mut result = None;
    for _ in 0..30 {
        match engine.result(run_id).await {
            Ok(r) => {
                result = Some(r);
                break;
            }
            Err(EngineError::RunNotTerminal(_)) => {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    let result = result.expect("run did not reach a terminal state");
    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(result.outputs["c"], json!(2));
    // well under the serialized append latency of the run's event log
    assert!(
        start.elapsed() < Duration::from_millis(300),
        "run stalled behind the event log: {:?}",
        start.elapsed()
    );
}

/// Runner that ignores both its budget and its cancellation token
struct StubbornRunner;

#[async_trait]
impl NodeRunner for StubbornRunner {
    async fn execute(
        &self,
        _node: &Node,
        _inputs: Map<String, Value>,
        _budget: &Budget,
        _cancel: CancellationToken,
    ) -> Result<Value, NodeError> {
        futures::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_runner_ignoring_its_budget_is_force_terminated() {
    let engine = Engine::new(Arc::new(InMemoryRunStore::new()), Arc::new(StubbornRunner));
    let run_id = engine
        .submit(
            ExecutionRequest::new(linear_graph())
                .with_input("a", json!(1))
                .with_params(
                    RunParams::default()
                        .with_node_timeout(Duration::from_millis(50))
                        .with_retry(RetryPolicy::none()),
                ),
        )
        .await
        .unwrap();

    let result = engine.wait(run_id).await.unwrap();
    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(status_of(&result, "b"), NodeStatus::Failed);
    assert_eq!(status_of(&result, "c"), NodeStatus::Skipped);
    let b = result.node_trace.iter().find(|t| t.node == "b").unwrap();
    assert!(b.error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn test_run_handle_released_after_completion() {
    let engine = Engine::in_memory();
    let run_id = engine
        .submit(ExecutionRequest::new(linear_graph()).with_input("a", json!(1)))
        .await
        .unwrap();
    engine.wait(run_id).await.unwrap();

    // allow the cleanup task to observe the drained log
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(matches!(
        engine.cancel(run_id).await.unwrap_err(),
        EngineError::RunNotFound(_)
    ));

    // the finished run is still fully observable from the persisted log
    let events: Vec<_> = Box::pin(engine.events(run_id, 0).await.unwrap())
        .collect()
        .await;
    assert!(matches!(events.first().unwrap().kind, EventKind::RunStarted));
    assert!(matches!(
        events.last().unwrap().kind,
        EventKind::RunCompleted { .. }
    ));
    assert!(engine.result(run_id).await.is_ok());
}

#[tokio::test]
async fn test_wide_graph_completes_under_bounded_concurrency() {
    // more ready nodes than worker slots; everything must still terminate
    let mut graph = GraphDefinition::new("wide")
        .with_node(Node::new("a", NodeKind::Input).with_outputs(["out"]));
    for i in 0..10 {
        let id = format!("t{i:02}");
        graph.add_node(
            Node::new(id.clone(), NodeKind::Transform)
                .with_config(json!({"op": "double"}))
                .with_inputs(["in"])
                .with_outputs(["out"]),
        );
        graph.add_edge(Edge::new("a", "out", id, "in"));
    }

    let engine = Engine::in_memory();
    let run_id = engine
        .submit(
            ExecutionRequest::new(graph)
                .with_input("a", json!(1))
                .with_params(RunParams::default().with_max_concurrency(2)),
        )
        .await
        .unwrap();

    let result = engine.wait(run_id).await.unwrap();
    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(result.node_trace.len(), 11);
    assert!(result
        .node_trace
        .iter()
        .all(|t| t.status == NodeStatus::Succeeded));
}

#[tokio::test]
async fn test_event_stream_replays_with_monotonic_sequence() {
    let engine = Engine::in_memory();
    let run_id = engine
        .submit(ExecutionRequest::new(linear_graph()).with_input("a", json!(1)))
        .await
        .unwrap();
    engine.wait(run_id).await.unwrap();

    // a fresh consumer resumes from scratch against the persisted log
    let events: Vec<_> = Box::pin(engine.events(run_id, 0).await.unwrap())
        .collect()
        .await;
    assert!(matches!(events.first().unwrap().kind, EventKind::RunStarted));
    assert!(matches!(
        events.last().unwrap().kind,
        EventKind::RunCompleted { status: RunStatus::Succeeded, .. }
    ));
    assert!(events.windows(2).all(|w| w[0].seq < w[1].seq));

    // resuming mid-log yields only the tail
    let cut = events[2].seq;
    let tail: Vec<_> = Box::pin(engine.events(run_id, cut).await.unwrap())
        .collect()
        .await;
    assert_eq!(tail.first().unwrap().seq, cut + 1);
    assert_eq!(tail.len(), events.len() - 3);
}

#[tokio::test]
async fn test_invalid_graph_is_rejected_at_submission() {
    let graph = linear_graph().with_edge(Edge::new("ghost", "out", "c", "in"));
    let engine = Engine::in_memory();
    let err = engine
        .submit(ExecutionRequest::new(graph).with_input("a", json!(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn test_missing_input_is_rejected_at_submission() {
    let engine = Engine::in_memory();
    let err = engine
        .submit(ExecutionRequest::new(linear_graph()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MissingInput { node } if node == "a"));
}

#[tokio::test]
async fn test_result_before_terminal_is_an_error() {
    let graph = GraphDefinition::new("slow")
        .with_node(Node::new("a", NodeKind::Input).with_outputs(["out"]))
        .with_node(
            Node::new("b", NodeKind::Delay)
                .with_config(json!({"duration_ms": 60_000, "timeout_ms": 120_000}))
                .with_inputs(["in"])
                .with_outputs(["out"]),
        )
        .with_edge(Edge::new("a", "out", "b", "in"));

    let engine = Engine::in_memory();
    let run_id = engine
        .submit(ExecutionRequest::new(graph).with_input("a", json!(1)))
        .await
        .unwrap();

    let err = engine.result(run_id).await.unwrap_err();
    assert!(matches!(err, EngineError::RunNotTerminal(id) if id == run_id));

    engine.cancel(run_id).await.unwrap();
    let result = engine.wait(run_id).await.unwrap();
    assert_eq!(result.status, RunStatus::Cancelled);
}

#[tokio::test]
async fn test_unknown_run_id() {
    let engine = Engine::in_memory();
    let run_id = uuid::Uuid::new_v4();
    assert!(matches!(
        engine.result(run_id).await.unwrap_err(),
        EngineError::RunNotFound(_)
    ));
    assert!(matches!(
        engine.cancel(run_id).await.unwrap_err(),
        EngineError::RunNotFound(_)
    ));
}
