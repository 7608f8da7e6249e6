//! Error types and error handling for the execution engine
//!
//! All errors implement `std::error::Error` via the `thiserror` crate.
//!
//! # Error Hierarchy
//!
//! ```text
//! EngineError
//! ├── Validation       - Graph malformed; fails fast, nothing executes
//! ├── Deadlock         - Internal consistency defect; always surfaced
//! ├── MissingInput     - Execution request lacks a value for an input node
//! ├── RunNotFound      - Unknown run id
//! ├── RunNotTerminal   - Result requested before the run finished
//! ├── Store            - Persistence errors
//! ├── Serialization    - JSON errors
//! ├── Yaml             - YAML parsing errors
//! └── Io               - Definition file I/O errors
//! ```
//!
//! # Propagation Policy
//!
//! Validation errors abort before any side effect occurs, and every
//! discovered error is reported at once so a caller can fix a graph in one
//! pass. Node errors are absorbed by the coordinator's retry policy and only
//! surface in the final trace once retries are exhausted; a failing branch
//! never aborts independent sibling branches, so node failures are trace
//! entries rather than engine errors. Deadlock errors indicate a scheduler
//! or validator defect and are never silently swallowed.

use crate::graph::NodeId;
use agentflow_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Top-level error for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Graph failed structural validation; carries every discovered error
    #[error("graph validation failed: {}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),

    /// No node is ready, none is running, and not all are terminal
    ///
    /// Unreachable for a validated graph; reported as an
    /// internal-consistency bug rather than swallowed.
    #[error("scheduler deadlock: no progress possible, pending nodes: {pending:?}")]
    Deadlock {
        /// Nodes still pending when progress stopped
        pending: Vec<NodeId>,
    },

    /// The execution request carries no value for an input node
    #[error("missing input value for input node '{node}'")]
    MissingInput {
        /// Id of the unsatisfied input node
        node: NodeId,
    },

    /// No run with this id is known to the engine
    #[error("run not found: {0}")]
    RunNotFound(Uuid),

    /// The run has not reached a terminal status yet
    #[error("run not terminal yet: {0}")]
    RunNotTerminal(Uuid),

    /// Persistence error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error while loading a graph definition
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A single structural defect found while validating a graph
///
/// The validator collects all of these rather than stopping at the first,
/// so one validation pass is enough to fix a graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Two nodes share the same id
    #[error("duplicate node id '{0}'")]
    DuplicateNodeId(NodeId),

    /// The graph declares no input nodes
    #[error("graph has no input nodes")]
    NoInputNodes,

    /// An edge references a node id not present in the graph
    #[error("edge references unknown node '{node}'")]
    UnknownNode {
        /// The missing node id
        node: NodeId,
    },

    /// An edge references a port the node does not declare
    #[error("edge references undeclared port '{port}' on node '{node}'")]
    UnknownPort {
        /// Node whose ports were checked
        node: NodeId,
        /// The undeclared port name
        port: String,
    },

    /// The graph contains a cycle
    #[error("cycle detected: {}", path.join(" -> "))]
    Cycle {
        /// One witness cycle, as a node id path ending where it starts
        path: Vec<NodeId>,
    },

    /// A non-input node has no incoming edges
    #[error("node '{node}' has no incoming edges and is not an input node")]
    NoIncomingEdges {
        /// The unreachable node
        node: NodeId,
    },

    /// A node is not reachable from any input node
    #[error("node '{node}' is not reachable from any input node")]
    Unreachable {
        /// The orphaned node
        node: NodeId,
    },

    /// Multiple edges target one port on a kind without fan-in support
    #[error("multiple edges target port '{port}' on node '{node}', whose kind does not support fan-in")]
    IllegalFanIn {
        /// The fan-in target node
        node: NodeId,
        /// The multiply-targeted port
        port: String,
    },

    /// A node's configuration violates its kind's schema
    #[error("invalid configuration for node '{node}': {reason}")]
    Config {
        /// The misconfigured node
        node: NodeId,
        /// What is wrong with the configuration
        reason: String,
    },
}
