//! Workflow graph model - nodes, edges, and conditional data links
//!
//! A [`GraphDefinition`] is the immutable description of a workflow: a set of
//! typed [`Node`]s with per-node configuration, connected by directed
//! [`Edge`]s between named ports. Definitions are pure data - they can be
//! built programmatically, or deserialized from JSON/YAML documents produced
//! by an external authoring surface (see [`crate::definition`]).
//!
//! Nothing here is validated; [`crate::validate::validate`] checks the
//! structural invariants (unique ids, known ports, acyclicity, reachability,
//! fan-in legality, per-kind configuration) and produces the
//! [`crate::validate::ValidatedGraph`] the engine actually executes.
//!
//! # Building a Graph
//!
//! ```rust
//! use agentflow_core::graph::{Edge, GraphDefinition, Node, NodeKind};
//! use serde_json::json;
//!
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
//! assert_eq!(graph.nodes.len(), 3);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Unique identifier of a node within a graph
pub type NodeId = String;

/// Name of an input or output port on a node
pub type PortName = String;

/// Closed set of node types the engine knows how to execute
///
/// Serialized in kebab-case on the wire (`"ai-agent"`, `"llm"`, ...), matching
/// the type tags the authoring surface emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    /// Entry point; its value is supplied by the execution request
    Input,
    /// Exit point; its value appears in the run's output map
    Output,
    /// General data processing step with a configured `op`
    Process,
    /// Data transformation step; same operation set as `process`
    Transform,
    /// Retains array elements matching a configured predicate
    Filter,
    /// Evaluates a predicate, emitting `{"result": bool, "value": ...}`
    Condition,
    /// Bounded internal iteration of a configured `op`
    Loop,
    /// Sleeps a configured duration, then passes its input through
    Delay,
    /// Dispatched to the agent runtime seam
    AiAgent,
    /// Dispatched to the agent runtime seam
    Llm,
    /// Dispatched to the agent runtime seam
    Embedding,
}

impl NodeKind {
    /// Whether multiple edges may legally target the same input port
    ///
    /// Fan-in ports collect their values into a JSON array in
    /// edge-declaration order. Only kinds whose semantics merge multiple
    /// upstream values support this; for every other kind a duplicated
    /// target port is a validation error.
    pub fn supports_fan_in(&self) -> bool {
        matches!(self, NodeKind::Process | NodeKind::AiAgent | NodeKind::Llm)
    }

    /// Whether this kind is executed by the agent runtime seam
    pub fn is_agent(&self) -> bool {
        matches!(self, NodeKind::AiAgent | NodeKind::Llm | NodeKind::Embedding)
    }

    /// Kebab-case tag, as serialized on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Input => "input",
            NodeKind::Output => "output",
            NodeKind::Process => "process",
            NodeKind::Transform => "transform",
            NodeKind::Filter => "filter",
            NodeKind::Condition => "condition",
            NodeKind::Loop => "loop",
            NodeKind::Delay => "delay",
            NodeKind::AiAgent => "ai-agent",
            NodeKind::Llm => "llm",
            NodeKind::Embedding => "embedding",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work in a workflow graph
///
/// Immutable once a run starts; the engine snapshots the whole definition
/// per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique id, stable across the run
    pub id: NodeId,

    /// Type tag; determines configuration schema and execution semantics
    pub kind: NodeKind,

    /// Per-kind configuration (validated at graph-build time)
    #[serde(default)]
    pub config: Map<String, Value>,

    /// Declared input port names
    #[serde(default)]
    pub inputs: Vec<PortName>,

    /// Declared output port names
    #[serde(default)]
    pub outputs: Vec<PortName>,
}

impl Node {
    /// Create a node with empty configuration and no declared ports
    pub fn new(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            config: Map::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Set the configuration from a JSON object; non-object values are
    /// ignored
    pub fn with_config(mut self, config: Value) -> Self {
        if let Value::Object(map) = config {
            self.config = map;
        }
        self
    }

    /// Set the declared input ports
    pub fn with_inputs<I, S>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PortName>,
    {
        self.inputs = ports.into_iter().map(Into::into).collect();
        self
    }

    /// Set the declared output ports
    pub fn with_outputs<I, S>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PortName>,
    {
        self.outputs = ports.into_iter().map(Into::into).collect();
        self
    }

    /// Fetch a configuration value by key
    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }
}

/// A directed, optionally conditional data link between node ports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node id
    pub source: NodeId,

    /// Output port on the source node
    pub source_port: PortName,

    /// Target node id
    pub target: NodeId,

    /// Input port on the target node
    pub target_port: PortName,

    /// Optional condition evaluated against the source node's output;
    /// when it evaluates false the edge does not propagate data or
    /// trigger its target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<EdgeCondition>,
}

impl Edge {
    /// Create an unconditional edge
    pub fn new(
        source: impl Into<NodeId>,
        source_port: impl Into<PortName>,
        target: impl Into<NodeId>,
        target_port: impl Into<PortName>,
    ) -> Self {
        Self {
            source: source.into(),
            source_port: source_port.into(),
            target: target.into(),
            target_port: target_port.into(),
            condition: None,
        }
    }

    /// Attach a condition to this edge
    pub fn with_condition(mut self, condition: EdgeCondition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Small closed expression form for edge conditions and filter predicates
///
/// Conditions address into a JSON value with an [RFC 6901 JSON
/// pointer](https://datatracker.ietf.org/doc/html/rfc6901); the empty pointer
/// selects the whole value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum EdgeCondition {
    /// True when the addressed value is "truthy": not null, false, zero,
    /// an empty string, an empty array, or an empty object. A pointer that
    /// resolves to nothing is falsy.
    Truthy { pointer: String },

    /// True when the addressed value equals `value` exactly
    Equals { pointer: String, value: Value },

    /// Negation of the inner condition
    Not { inner: Box<EdgeCondition> },
}

impl EdgeCondition {
    /// Evaluate this condition against a node output value
    pub fn evaluate(&self, output: &Value) -> bool {
        match self {
            EdgeCondition::Truthy { pointer } => {
                resolve_pointer(output, pointer).map_or(false, is_truthy)
            }
            EdgeCondition::Equals { pointer, value } => {
                resolve_pointer(output, pointer) == Some(value)
            }
            EdgeCondition::Not { inner } => !inner.evaluate(output),
        }
    }
}

fn resolve_pointer<'a>(value: &'a Value, pointer: &str) -> Option<&'a Value> {
    if pointer.is_empty() {
        Some(value)
    } else {
        value.pointer(pointer)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Immutable description of a workflow: nodes, edges, and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDefinition {
    /// Human-readable graph name
    pub name: String,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Nodes; ids must be unique
    #[serde(default)]
    pub nodes: Vec<Node>,

    /// Edges; each must reference existing nodes and declared ports
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl GraphDefinition {
    /// Create an empty graph definition
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a node
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add an edge
    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Add a node in place
    pub fn add_node(&mut self, node: Node) -> &mut Self {
        self.nodes.push(node);
        self
    }

    /// Add an edge in place
    pub fn add_edge(&mut self, edge: Edge) -> &mut Self {
        self.edges.push(edge);
        self
    }

    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }
}
