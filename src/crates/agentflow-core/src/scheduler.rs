//! Scheduling - which pending nodes may run, and which will never run
//!
//! The scheduler holds no mutable state of its own: it is a pure function
//! over a [`ValidatedGraph`] and a [`RunState`] snapshot, which keeps it
//! trivially unit-testable and replayable. The coordinator calls
//! [`ready_transitions`] after every state change and applies the returned
//! transitions serially.
//!
//! # Edge Resolution
//!
//! Each incoming edge of a pending node is classified against the snapshot:
//!
//! - **propagating** - source succeeded and the edge's condition is absent
//!   or evaluates true; the edge delivers the source's output.
//! - **resolved-but-empty** - source succeeded but the condition evaluates
//!   false; the edge is satisfied yet delivers nothing.
//! - **blocked** - source failed, was skipped, or was cancelled; the target
//!   can never run.
//! - **unresolved** - source still pending or running.
//!
//! A node is *ready* when every incoming edge is resolved and at least one
//! propagates. A node *skips* when any edge is blocked, or when all edges
//! resolved but none propagates. With no conditions in play this reduces to
//! the usual "all dependencies succeeded" rule.
//!
//! Treating a false condition as resolved (rather than leaving fan-in
//! targets waiting forever) is a deliberate design choice; see DESIGN.md.

use crate::graph::{Edge, NodeId};
use crate::state::{NodeStatus, RunState};
use crate::validate::ValidatedGraph;
use serde_json::{Map, Value};

/// Scheduler verdict over one run-state snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transitions {
    /// Nodes whose dependencies are all satisfied; ascending node-id order
    pub ready: Vec<NodeId>,

    /// Nodes that can never run and must be marked skipped; ascending
    /// node-id order
    pub skip: Vec<NodeId>,
}

impl Transitions {
    /// Whether the scheduler found nothing to do
    pub fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.skip.is_empty()
    }
}

enum EdgeState {
    Propagating,
    ResolvedEmpty,
    Blocked,
    Unresolved,
}

fn classify(edge: &Edge, state: &RunState) -> EdgeState {
    let source = state.record(&edge.source);
    match source.status {
        NodeStatus::Succeeded => match (&edge.condition, &source.output) {
            (None, _) => EdgeState::Propagating,
            (Some(cond), Some(output)) if cond.evaluate(output) => EdgeState::Propagating,
            (Some(_), _) => EdgeState::ResolvedEmpty,
        },
        NodeStatus::Failed | NodeStatus::Skipped | NodeStatus::Cancelled => EdgeState::Blocked,
        NodeStatus::Pending | NodeStatus::Running => EdgeState::Unresolved,
    }
}

/// Compute which pending nodes are ready to dispatch and which must skip
///
/// Pure over the snapshot; both result vectors are sorted ascending by node
/// id so ties among ready nodes are deterministic for tests.
pub fn ready_transitions(graph: &ValidatedGraph, state: &RunState) -> Transitions {
    let mut transitions = Transitions::default();

    for (id, record) in &state.nodes {
        if record.status != NodeStatus::Pending {
            continue;
        }

        let mut propagating = 0usize;
        let mut blocked = false;
        let mut unresolved = false;
        for edge in graph.incoming_edges(id) {
            match classify(edge, state) {
                EdgeState::Propagating => propagating += 1,
                EdgeState::ResolvedEmpty => {}
                EdgeState::Blocked => blocked = true,
                EdgeState::Unresolved => unresolved = true,
            }
        }

        if blocked {
            transitions.skip.push(id.clone());
        } else if unresolved {
            // wait for upstream
        } else if propagating > 0 {
            transitions.ready.push(id.clone());
        } else {
            // All edges resolved-but-empty (validation guarantees at least
            // one incoming edge for non-input nodes).
            transitions.skip.push(id.clone());
        }
    }

    transitions.ready.sort();
    transitions.skip.sort();
    transitions
}

/// Assemble a node's input snapshot from its propagating incoming edges
///
/// Ports map to the source node's output; a fan-in port receiving several
/// propagating edges collects their values into a JSON array in
/// edge-declaration order.
pub fn resolved_inputs(graph: &ValidatedGraph, state: &RunState, id: &str) -> Map<String, Value> {
    let mut inputs: Map<String, Value> = Map::new();

    for edge in graph.incoming_edges(id) {
        if !matches!(classify(edge, state), EdgeState::Propagating) {
            continue;
        }
        let value = state
            .record(&edge.source)
            .output
            .clone()
            .unwrap_or(Value::Null);
        match inputs.get_mut(&edge.target_port) {
            None => {
                inputs.insert(edge.target_port.clone(), value);
            }
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }

    inputs
}
