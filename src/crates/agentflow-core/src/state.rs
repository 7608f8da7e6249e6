//! Per-run execution state
//!
//! A [`RunState`] is created per execution request and owned exclusively by
//! the coordinator for the run's lifetime; no other component mutates it.
//! Node executors receive immutable input snapshots and return values. The
//! state is serialized to the run store after every transition batch so that
//! `getResult` and post-hoc auditing can read it without touching the
//! coordinator.

use crate::graph::NodeId;
use crate::validate::ValidatedGraph;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Lifecycle status of a single node within a run
///
/// `ready` is a property derived by the scheduler from the surrounding
/// state, not a stored status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Not yet dispatched
    Pending,
    /// Dispatched to an executor, result outstanding
    Running,
    /// Finished with an output value
    Succeeded,
    /// Exhausted retries with an error
    Failed,
    /// Will never run: upstream failed, or every incoming edge resolved
    /// without propagating a value
    Skipped,
    /// Stopped by run cancellation before producing a result
    Cancelled,
}

impl NodeStatus {
    /// Whether this status is final for the run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeStatus::Succeeded | NodeStatus::Failed | NodeStatus::Skipped | NodeStatus::Cancelled
        )
    }
}

/// Aggregate status of a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Accepted, coordinator not started yet
    Pending,
    /// Coordinator loop in progress
    Running,
    /// Every node succeeded or was legitimately skipped
    Succeeded,
    /// At least one node failed permanently, or the run timed out
    Failed,
    /// Terminated by a cancellation request
    Cancelled,
}

impl RunStatus {
    /// Whether this status is final
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

/// Execution record for one node within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Current status
    pub status: NodeStatus,

    /// Output value, present once succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    /// Error detail, present once failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the node was first dispatched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the node reached a terminal status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    /// Number of execution attempts made
    pub attempts: u32,
}

impl NodeRecord {
    fn pending() -> Self {
        Self {
            status: NodeStatus::Pending,
            output: None,
            error: None,
            started_at: None,
            ended_at: None,
            attempts: 0,
        }
    }
}

/// Mutable state of one workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Per-node execution records
    pub nodes: HashMap<NodeId, NodeRecord>,

    /// Aggregate run status
    pub status: RunStatus,
}

impl RunState {
    /// Initialize state for a validated graph: every node pending
    pub fn new(graph: &ValidatedGraph) -> Self {
        let nodes = graph
            .node_ids()
            .map(|id| (id.clone(), NodeRecord::pending()))
            .collect();
        Self {
            nodes,
            status: RunStatus::Pending,
        }
    }

    /// Record for a node; panics only on ids outside the graph, which the
    /// coordinator never produces
    pub fn record(&self, id: &str) -> &NodeRecord {
        &self.nodes[id]
    }

    /// Mutable record for a node
    pub fn record_mut(&mut self, id: &str) -> &mut NodeRecord {
        self.nodes.get_mut(id).expect("node id outside graph")
    }

    /// Whether every node has reached a terminal status
    pub fn all_terminal(&self) -> bool {
        self.nodes.values().all(|r| r.status.is_terminal())
    }

    /// Ids of nodes currently pending, in ascending order
    pub fn pending_nodes(&self) -> Vec<NodeId> {
        let mut pending: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, r)| r.status == NodeStatus::Pending)
            .map(|(id, _)| id.clone())
            .collect();
        pending.sort();
        pending
    }

    /// Build the per-node trace, sorted by node id for determinism
    pub fn trace(&self) -> Vec<NodeTrace> {
        let mut trace: Vec<NodeTrace> = self
            .nodes
            .iter()
            .map(|(id, record)| NodeTrace {
                node: id.clone(),
                status: record.status,
                output: record.output.clone(),
                error: record.error.clone(),
                started_at: record.started_at,
                ended_at: record.ended_at,
                attempts: record.attempts,
            })
            .collect();
        trace.sort_by(|a, b| a.node.cmp(&b.node));
        trace
    }
}

/// One node's entry in the final run trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTrace {
    /// Node id
    pub node: NodeId,

    /// Terminal status (or last observed, for a non-terminal snapshot)
    pub status: NodeStatus,

    /// Output value, if the node succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    /// Error detail, if the node failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Dispatch timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Completion timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    /// Execution attempts made
    pub attempts: u32,
}

/// Terminal result of a run: aggregate status, outputs of the designated
/// output nodes, and the complete per-node trace
///
/// The trace is always complete regardless of overall success, so a
/// partially-successful run is fully diagnosable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Terminal run status
    pub status: RunStatus,

    /// Output-node values, keyed by node id; only succeeded output nodes
    /// appear
    pub outputs: HashMap<String, Value>,

    /// Complete per-node trace, sorted by node id
    pub node_trace: Vec<NodeTrace>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!NodeStatus::Pending.is_terminal());
        assert!(!NodeStatus::Running.is_terminal());
        assert!(NodeStatus::Succeeded.is_terminal());
        assert!(NodeStatus::Failed.is_terminal());
        assert!(NodeStatus::Skipped.is_terminal());
        assert!(NodeStatus::Cancelled.is_terminal());

        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_value(NodeStatus::Succeeded).unwrap(),
            serde_json::json!("succeeded")
        );
        assert_eq!(
            serde_json::to_value(RunStatus::Failed).unwrap(),
            serde_json::json!("failed")
        );
    }
}
