//! Node execution - the isolated execution unit contract and built-in runner
//!
//! [`NodeRunner`] is the seam between the coordinator and whatever actually
//! executes a node: each invocation receives the node, an immutable snapshot
//! of its resolved inputs, a wall-clock [`Budget`], and a cancellation token,
//! and returns a value or a tagged [`NodeError`]. Real deployments implement
//! this trait (or just [`AgentInvoker`] for the agent kinds) against a
//! sandboxed runtime - a process, container, or remote execution service -
//! that grants no ambient access beyond the node's declared
//! [`Capabilities`].
//!
//! [`LocalRunner`] is the built-in implementation: it enforces the budget
//! with `tokio::time::timeout`, honours cancellation at suspension points,
//! executes the data-flow kinds (`process`, `transform`, `filter`,
//! `condition`, `loop`, `delay`) in-process, and dispatches the agent kinds
//! (`ai-agent`, `llm`, `embedding`) through its [`AgentInvoker`].
//!
//! The error tags drive the coordinator's retry decision: `Timeout` and
//! `Transient` are retryable, `InvalidInput` and `Fatal` are not.

use crate::graph::{EdgeCondition, Node, NodeId, NodeKind, PortName};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Tagged error from a single node execution attempt
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    /// The attempt exceeded its wall-clock budget
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The attempt exceeded a resource limit other than wall-clock time
    #[error("resource budget exceeded: {0}")]
    ResourceExceeded(String),

    /// The resolved inputs violate the node's expectations; a caller bug,
    /// never retried
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A failure that may succeed on retry
    #[error("transient failure: {0}")]
    Transient(String),

    /// A permanent failure; never retried
    #[error("fatal failure: {0}")]
    Fatal(String),

    /// The run was cancelled while this attempt was in flight
    #[error("cancelled")]
    Cancelled,
}

impl NodeError {
    /// Whether the coordinator's retry policy applies to this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, NodeError::Timeout(_) | NodeError::Transient(_))
    }
}

/// Resource bounds for one node execution attempt
#[derive(Debug, Clone)]
pub struct Budget {
    /// Maximum wall-clock time for the attempt; also the hard deadline for
    /// cooperative cancellation
    pub wall_clock: Duration,
}

impl Budget {
    /// Create a budget with the given wall-clock limit
    pub fn new(wall_clock: Duration) -> Self {
        Self { wall_clock }
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            wall_clock: Duration::from_secs(30),
        }
    }
}

/// Ambient access a node's configuration declares
///
/// Parsed from the node config's `capabilities` array. The engine grants
/// nothing by default; runner implementations consult these flags before
/// exposing network access or secrets to the execution unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Outbound network access
    pub network: bool,

    /// Access to configured secrets
    pub secrets: bool,
}

impl Capabilities {
    /// Parse declared capabilities from a node's configuration
    pub fn from_node(node: &Node) -> Self {
        let mut caps = Self::default();
        if let Some(items) = node.config_value("capabilities").and_then(|v| v.as_array()) {
            for item in items {
                match item.as_str() {
                    Some("network") => caps.network = true,
                    Some("secrets") => caps.secrets = true,
                    _ => {}
                }
            }
        }
        caps
    }
}

/// Executes a single node inside an isolated execution unit
#[async_trait]
pub trait NodeRunner: Send + Sync {
    /// Run one attempt of `node` against the resolved input snapshot
    ///
    /// Implementations must respect `budget.wall_clock` and return
    /// [`NodeError::Cancelled`] promptly once `cancel` fires.
    async fn execute(
        &self,
        node: &Node,
        inputs: Map<PortName, Value>,
        budget: &Budget,
        cancel: CancellationToken,
    ) -> Result<Value, NodeError>;
}

/// One invocation of the agent runtime seam
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Id of the node being executed
    pub node: NodeId,

    /// Agent kind (`ai-agent`, `llm`, or `embedding`)
    pub kind: NodeKind,

    /// The node's configuration blob
    pub config: Map<String, Value>,

    /// The node's primary input value
    pub input: Value,

    /// Ambient access the node declared
    pub capabilities: Capabilities,
}

/// The sandbox contract for agent-type nodes
///
/// Implement this against a real agent runtime to execute `ai-agent`,
/// `llm`, and `embedding` nodes; everything else about scheduling, budgets,
/// and retries stays with [`LocalRunner`].
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Execute one agent invocation
    async fn invoke(
        &self,
        request: AgentRequest,
        cancel: CancellationToken,
    ) -> Result<Value, NodeError>;
}

/// Deterministic stand-in for a real agent runtime
///
/// Sleeps `simulated_delay_ms` from the node config (so timeout behavior is
/// exercisable), then echoes a completion derived from the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedAgent;

#[async_trait]
impl AgentInvoker for SimulatedAgent {
    async fn invoke(
        &self,
        request: AgentRequest,
        _cancel: CancellationToken,
    ) -> Result<Value, NodeError> {
        if let Some(ms) = request
            .config
            .get("simulated_delay_ms")
            .and_then(|v| v.as_u64())
        {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        Ok(json!({
            "node": request.node,
            "kind": request.kind.as_str(),
            "completion": format!("simulated {} completion", request.kind),
            "input": request.input,
        }))
    }
}

/// Built-in in-process [`NodeRunner`]
pub struct LocalRunner {
    agent: Arc<dyn AgentInvoker>,
}

impl LocalRunner {
    /// Runner backed by the [`SimulatedAgent`]
    pub fn new() -> Self {
        Self {
            agent: Arc::new(SimulatedAgent),
        }
    }

    /// Runner backed by a custom agent runtime
    pub fn with_agent(agent: Arc<dyn AgentInvoker>) -> Self {
        Self { agent }
    }

    async fn run_kind(
        &self,
        node: &Node,
        inputs: Map<PortName, Value>,
        cancel: CancellationToken,
    ) -> Result<Value, NodeError> {
        let input = primary_input(inputs);
        match node.kind {
            NodeKind::Input | NodeKind::Output => Ok(input),
            NodeKind::Process | NodeKind::Transform => apply_op(node, input),
            NodeKind::Filter => {
                let predicate = predicate_config(node)?;
                let items = match input {
                    Value::Array(items) => items,
                    other => {
                        return Err(NodeError::InvalidInput(format!(
                            "filter expects an array, got {}",
                            kind_of(&other)
                        )))
                    }
                };
                Ok(Value::Array(
                    items
                        .into_iter()
                        .filter(|item| predicate.evaluate(item))
                        .collect(),
                ))
            }
            NodeKind::Condition => {
                let predicate = predicate_config(node)?;
                let result = predicate.evaluate(&input);
                Ok(json!({ "result": result, "value": input }))
            }
            NodeKind::Loop => {
                // Bounded internal iteration; the surrounding graph stays
                // acyclic.
                let iterations = node
                    .config_value("max_iterations")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(1);
                let mut value = input;
                for _ in 0..iterations {
                    value = apply_op(node, value)?;
                }
                Ok(value)
            }
            NodeKind::Delay => {
                let ms = node
                    .config_value("duration_ms")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(input)
            }
            NodeKind::AiAgent | NodeKind::Llm | NodeKind::Embedding => {
                let request = AgentRequest {
                    node: node.id.clone(),
                    kind: node.kind,
                    config: node.config.clone(),
                    input,
                    capabilities: Capabilities::from_node(node),
                };
                self.agent.invoke(request, cancel).await
            }
        }
    }
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeRunner for LocalRunner {
    async fn execute(
        &self,
        node: &Node,
        inputs: Map<PortName, Value>,
        budget: &Budget,
        cancel: CancellationToken,
    ) -> Result<Value, NodeError> {
        let work = self.run_kind(node, inputs, cancel.clone());
        tokio::select! {
            _ = cancel.cancelled() => Err(NodeError::Cancelled),
            attempt = tokio::time::timeout(budget.wall_clock, work) => match attempt {
                Ok(result) => result,
                Err(_) => Err(NodeError::Timeout(budget.wall_clock)),
            },
        }
    }
}

/// Collapse the port map into the node's primary input value
///
/// A single filled port passes its value through unchanged; several filled
/// ports arrive as an object keyed by port name; no filled ports is null.
fn primary_input(mut inputs: Map<PortName, Value>) -> Value {
    match inputs.len() {
        0 => Value::Null,
        1 => inputs.values_mut().next().map(Value::take).unwrap_or(Value::Null),
        _ => Value::Object(inputs),
    }
}

fn predicate_config(node: &Node) -> Result<EdgeCondition, NodeError> {
    let value = node
        .config_value("predicate")
        .cloned()
        .ok_or_else(|| NodeError::Fatal("missing 'predicate' configuration".to_string()))?;
    serde_json::from_value(value)
        .map_err(|e| NodeError::Fatal(format!("invalid 'predicate' configuration: {e}")))
}

fn apply_op(node: &Node, input: Value) -> Result<Value, NodeError> {
    let op = node
        .config_value("op")
        .and_then(|v| v.as_str())
        .ok_or_else(|| NodeError::Fatal("missing 'op' configuration".to_string()))?;

    match op {
        "identity" => Ok(input),
        "double" => match as_number(&input) {
            Some(n) => Ok(json_number(n * 2.0)),
            None => Err(invalid_numeric(op, &input)),
        },
        "negate" => match &input {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            _ => match as_number(&input) {
                Some(n) => Ok(json_number(-n)),
                None => Err(invalid_numeric(op, &input)),
            },
        },
        "sum" => match &input {
            Value::Array(items) => {
                let mut total = 0.0;
                for item in items {
                    total += as_number(item).ok_or_else(|| invalid_numeric(op, item))?;
                }
                Ok(json_number(total))
            }
            _ => match as_number(&input) {
                Some(n) => Ok(json_number(n)),
                None => Err(invalid_numeric(op, &input)),
            },
        },
        "multiply" => {
            let factor = node
                .config_value("factor")
                .and_then(|v| v.as_f64())
                .ok_or_else(|| NodeError::Fatal("missing numeric 'factor'".to_string()))?;
            match as_number(&input) {
                Some(n) => Ok(json_number(n * factor)),
                None => Err(invalid_numeric(op, &input)),
            }
        }
        "uppercase" => match &input {
            Value::String(s) => Ok(Value::String(s.to_uppercase())),
            other => Err(NodeError::InvalidInput(format!(
                "op 'uppercase' expects a string, got {}",
                kind_of(other)
            ))),
        },
        "concat" => {
            let separator = node
                .config_value("separator")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            match &input {
                Value::Array(items) => {
                    let mut parts = Vec::with_capacity(items.len());
                    for item in items {
                        match item.as_str() {
                            Some(s) => parts.push(s),
                            None => {
                                return Err(NodeError::InvalidInput(format!(
                                    "op 'concat' expects strings, got {}",
                                    kind_of(item)
                                )))
                            }
                        }
                    }
                    Ok(Value::String(parts.join(separator)))
                }
                other => Err(NodeError::InvalidInput(format!(
                    "op 'concat' expects an array, got {}",
                    kind_of(other)
                ))),
            }
        }
        // Unknown ops are rejected at validation; reaching here means the
        // graph bypassed validation.
        other => Err(NodeError::Fatal(format!("unknown op '{other}'"))),
    }
}

fn invalid_numeric(op: &str, value: &Value) -> NodeError {
    NodeError::InvalidInput(format!(
        "op '{op}' expects a number, got {}",
        kind_of(value)
    ))
}

fn as_number(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Render an f64 back to JSON, preserving integer form where exact
fn json_number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
