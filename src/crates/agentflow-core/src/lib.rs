//! # agentflow-core - Workflow Graph Execution Engine
//!
//! Takes a directed graph of typed nodes (data sources, transforms,
//! conditionals, bounded loops, AI-agent calls, outputs), validates it,
//! schedules node execution in dependency order, dispatches each node to an
//! isolated execution unit, propagates data along edges, tolerates partial
//! failure, and streams live progress to observers.
//!
//! ## Components
//!
//! - [`graph`] - the immutable graph model: [`graph::GraphDefinition`],
//!   [`graph::Node`], [`graph::Edge`], the closed [`graph::NodeKind`] set,
//!   and conditional-edge expressions.
//! - [`validate`] - structural validation; returns **all** errors at once
//!   and produces the [`validate::ValidatedGraph`] the engine executes.
//! - [`scheduler`] - a pure function from `(graph, run-state snapshot)` to
//!   the nodes that are ready to run and the nodes that will never run.
//! - [`executor`] - the [`executor::NodeRunner`] sandbox contract, tagged
//!   [`executor::NodeError`]s driving retry decisions, and the built-in
//!   [`executor::LocalRunner`] with its [`executor::AgentInvoker`] seam for
//!   real agent runtimes.
//! - [`coordinator`] - owns one run: seeds inputs, drives the scheduler,
//!   dispatches onto a bounded worker pool, applies retries and
//!   cancellation, and assembles the final result.
//! - [`events`] - sequence-numbered progress events, appended to a per-run
//!   log and fanned out to live subscribers without blocking execution.
//! - [`engine`] - the [`Engine`] facade: `submit` / `events` / `cancel` /
//!   `result`, keyed by run id.
//!
//! Persistence goes through the narrow `RunStore` trait in the
//! `agentflow-store` crate; the in-memory implementation backs tests and
//! single-process deployments.
//!
//! ## Quick Start
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
//!
//! let result = engine.wait(run_id).await?;
//! assert_eq!(result.outputs["c"], json!(2));
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! The coordinator's control logic is single-threaded: one authoritative
//! run state, updated serially in the order completions are observed. Node
//! executions run concurrently on a `JoinSet` pool bounded by
//! `max_concurrency`. Executors receive immutable input snapshots and
//! return values; they never touch shared state. Two independent nodes may
//! complete in either order and both orderings produce the same final run
//! state content.

pub mod coordinator;
pub mod definition;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod graph;
pub mod retry;
pub mod scheduler;
pub mod state;
pub mod validate;

pub use coordinator::{Coordinator, ExecutionRequest, RunParams};
pub use engine::Engine;
pub use error::{EngineError, Result, ValidationError};
pub use events::{Event, EventKind, EventPublisher};
pub use executor::{
    AgentInvoker, AgentRequest, Budget, Capabilities, LocalRunner, NodeError, NodeRunner,
    SimulatedAgent,
};
pub use graph::{Edge, EdgeCondition, GraphDefinition, Node, NodeId, NodeKind, PortName};
pub use retry::RetryPolicy;
pub use scheduler::{ready_transitions, resolved_inputs, Transitions};
pub use state::{NodeRecord, NodeStatus, NodeTrace, RunResult, RunState, RunStatus};
pub use validate::{validate, ValidatedGraph};
