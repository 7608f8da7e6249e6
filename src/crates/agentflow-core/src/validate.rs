//! Graph validation - structural invariants checked before any execution
//!
//! [`validate`] checks, in order: per-kind configuration schema, port
//! references, acyclicity (reporting a witness cycle), reachability from
//! input nodes, and fan-in legality. It returns **all** discovered errors
//! rather than stopping at the first, so a caller can fix a graph in one
//! pass. Validation is side-effect free and idempotent: validating the same
//! graph twice yields the same error set.
//!
//! On success the result is a [`ValidatedGraph`]: the definition plus
//! precomputed edge indexes, a deterministic topological order, and the
//! input/output node lists the scheduler and coordinator work from.
//!
//! Intentional iteration is modeled as the bounded `loop` node kind;
//! structural cycles in the wiring itself are rejected outright rather than
//! executed.

use crate::error::ValidationError;
use crate::graph::{Edge, EdgeCondition, GraphDefinition, Node, NodeId, NodeKind};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Operations accepted by `process`, `transform`, and `loop` nodes
pub const KNOWN_OPS: &[&str] = &[
    "identity",
    "double",
    "negate",
    "sum",
    "multiply",
    "uppercase",
    "concat",
];

/// A graph that passed validation, with precomputed execution indexes
#[derive(Debug, Clone)]
pub struct ValidatedGraph {
    definition: GraphDefinition,
    node_index: HashMap<NodeId, usize>,
    incoming: HashMap<NodeId, Vec<usize>>,
    outgoing: HashMap<NodeId, Vec<usize>>,
    topo_order: Vec<NodeId>,
    input_nodes: Vec<NodeId>,
    output_nodes: Vec<NodeId>,
}

impl ValidatedGraph {
    /// The underlying definition
    pub fn definition(&self) -> &GraphDefinition {
        &self.definition
    }

    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.node_index.get(id).map(|&i| &self.definition.nodes[i])
    }

    /// All node ids, in definition order
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.definition.nodes.iter().map(|n| &n.id)
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.definition.nodes.len()
    }

    /// Incoming edges of a node, in edge-declaration order
    pub fn incoming_edges(&self, id: &str) -> impl Iterator<Item = &Edge> {
        self.incoming
            .get(id)
            .into_iter()
            .flatten()
            .map(|&i| &self.definition.edges[i])
    }

    /// Outgoing edges of a node, in edge-declaration order
    pub fn outgoing_edges(&self, id: &str) -> impl Iterator<Item = &Edge> {
        self.outgoing
            .get(id)
            .into_iter()
            .flatten()
            .map(|&i| &self.definition.edges[i])
    }

    /// Deterministic topological order (ties broken by ascending node id)
    pub fn topo_order(&self) -> &[NodeId] {
        &self.topo_order
    }

    /// Ids of input nodes, ascending
    pub fn input_nodes(&self) -> &[NodeId] {
        &self.input_nodes
    }

    /// Ids of output nodes, ascending
    pub fn output_nodes(&self) -> &[NodeId] {
        &self.output_nodes
    }
}

/// Validate a graph definition, returning all structural errors at once
pub fn validate(graph: &GraphDefinition) -> Result<ValidatedGraph, Vec<ValidationError>> {
    let mut errors = Vec::new();

    // Unique ids first: every later check keys nodes by id.
    let mut seen: HashSet<&str> = HashSet::new();
    let mut duplicate_ids = false;
    for node in &graph.nodes {
        if !seen.insert(&node.id) {
            duplicate_ids = true;
            errors.push(ValidationError::DuplicateNodeId(node.id.clone()));
        }
    }

    let nodes_by_id: HashMap<&str, &Node> =
        graph.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let input_ids: Vec<&str> = graph
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Input)
        .map(|n| n.id.as_str())
        .collect();
    if input_ids.is_empty() {
        errors.push(ValidationError::NoInputNodes);
    }

    for node in &graph.nodes {
        check_config(node, &mut errors);
    }

    check_port_references(graph, &nodes_by_id, &mut errors);

    // Only edges with valid endpoints participate in the graph-shape checks;
    // dangling edges were already reported above.
    let valid_edges: Vec<&Edge> = graph
        .edges
        .iter()
        .filter(|e| {
            nodes_by_id.contains_key(e.source.as_str()) && nodes_by_id.contains_key(e.target.as_str())
        })
        .collect();

    // Duplicate ids collapse the in-degree map and would masquerade as a
    // cycle; defer the shape check until ids are unique.
    let topo_order = if duplicate_ids {
        Vec::new()
    } else {
        check_cycles(graph, &valid_edges, &mut errors)
    };
    check_reachability(graph, &valid_edges, &input_ids, &mut errors);
    check_fan_in(&nodes_by_id, &valid_edges, &mut errors);

    if !errors.is_empty() {
        return Err(errors);
    }

    let node_index: HashMap<NodeId, usize> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.clone(), i))
        .collect();

    let mut incoming: HashMap<NodeId, Vec<usize>> = HashMap::new();
    let mut outgoing: HashMap<NodeId, Vec<usize>> = HashMap::new();
    for (i, edge) in graph.edges.iter().enumerate() {
        incoming.entry(edge.target.clone()).or_default().push(i);
        outgoing.entry(edge.source.clone()).or_default().push(i);
    }

    let mut input_nodes: Vec<NodeId> = input_ids.iter().map(|s| s.to_string()).collect();
    input_nodes.sort();
    let mut output_nodes: Vec<NodeId> = graph
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Output)
        .map(|n| n.id.clone())
        .collect();
    output_nodes.sort();

    Ok(ValidatedGraph {
        definition: graph.clone(),
        node_index,
        incoming,
        outgoing,
        topo_order,
        input_nodes,
        output_nodes,
    })
}

fn check_config(node: &Node, errors: &mut Vec<ValidationError>) {
    let config_err = |reason: String| ValidationError::Config {
        node: node.id.clone(),
        reason,
    };

    match node.kind {
        NodeKind::Input | NodeKind::Output => {}
        NodeKind::Process | NodeKind::Transform => {
            check_op_config(node, errors);
        }
        NodeKind::Loop => {
            check_op_config(node, errors);
            match node.config_value("max_iterations").and_then(|v| v.as_u64()) {
                Some(n) if n >= 1 => {}
                Some(_) => errors.push(config_err("'max_iterations' must be at least 1".into())),
                None => errors.push(config_err(
                    "'max_iterations' is required and must be a positive integer".into(),
                )),
            }
        }
        NodeKind::Delay => {
            if node
                .config_value("duration_ms")
                .and_then(|v| v.as_u64())
                .is_none()
            {
                errors.push(config_err(
                    "'duration_ms' is required and must be an unsigned integer".into(),
                ));
            }
        }
        NodeKind::Filter | NodeKind::Condition => match node.config_value("predicate") {
            Some(value) => {
                if serde_json::from_value::<EdgeCondition>(value.clone()).is_err() {
                    errors.push(config_err("'predicate' is not a valid condition".into()));
                }
            }
            None => errors.push(config_err("'predicate' is required".into())),
        },
        NodeKind::AiAgent | NodeKind::Llm | NodeKind::Embedding => {
            if let Some(caps) = node.config_value("capabilities") {
                match caps.as_array() {
                    Some(items) => {
                        for item in items {
                            match item.as_str() {
                                Some("network") | Some("secrets") => {}
                                _ => errors.push(config_err(format!(
                                    "unknown capability {item}; expected \"network\" or \"secrets\""
                                ))),
                            }
                        }
                    }
                    None => {
                        errors.push(config_err("'capabilities' must be an array of strings".into()))
                    }
                }
            }
            if let Some(delay) = node.config_value("simulated_delay_ms") {
                if delay.as_u64().is_none() {
                    errors.push(config_err(
                        "'simulated_delay_ms' must be an unsigned integer".into(),
                    ));
                }
            }
        }
    }
}

fn check_op_config(node: &Node, errors: &mut Vec<ValidationError>) {
    let config_err = |reason: String| ValidationError::Config {
        node: node.id.clone(),
        reason,
    };

    match node.config_value("op").and_then(|v| v.as_str()) {
        Some(op) if KNOWN_OPS.contains(&op) => {
            if op == "multiply" && node.config_value("factor").and_then(|v| v.as_f64()).is_none() {
                errors.push(config_err("op 'multiply' requires a numeric 'factor'".into()));
            }
        }
        Some(op) => errors.push(config_err(format!(
            "unknown op '{op}'; expected one of {KNOWN_OPS:?}"
        ))),
        None => errors.push(config_err("'op' is required and must be a string".into())),
    }
}

fn check_port_references(
    graph: &GraphDefinition,
    nodes_by_id: &HashMap<&str, &Node>,
    errors: &mut Vec<ValidationError>,
) {
    let mut missing: Vec<NodeId> = Vec::new();
    for edge in &graph.edges {
        match nodes_by_id.get(edge.source.as_str()) {
            Some(source) => {
                if !source.outputs.contains(&edge.source_port) {
                    errors.push(ValidationError::UnknownPort {
                        node: edge.source.clone(),
                        port: edge.source_port.clone(),
                    });
                }
            }
            None => missing.push(edge.source.clone()),
        }
        match nodes_by_id.get(edge.target.as_str()) {
            Some(target) => {
                if !target.inputs.contains(&edge.target_port) {
                    errors.push(ValidationError::UnknownPort {
                        node: edge.target.clone(),
                        port: edge.target_port.clone(),
                    });
                }
            }
            None => missing.push(edge.target.clone()),
        }
    }
    missing.sort();
    missing.dedup();
    for node in missing {
        errors.push(ValidationError::UnknownNode { node });
    }
}

/// Kahn's algorithm; reports a witness cycle on failure, and otherwise
/// returns a deterministic topological order (ready set drained in
/// ascending id order).
fn check_cycles(
    graph: &GraphDefinition,
    edges: &[&Edge],
    errors: &mut Vec<ValidationError>,
) -> Vec<NodeId> {
    let mut in_degree: BTreeMap<&str, usize> =
        graph.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        *in_degree.entry(edge.target.as_str()).or_default() += 1;
        successors
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
    }

    let mut ready: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut order: Vec<NodeId> = Vec::with_capacity(graph.nodes.len());

    while let Some(id) = ready.pop_front() {
        order.push(id.to_string());
        for &next in successors.get(id).into_iter().flatten() {
            let degree = in_degree.get_mut(next).expect("successor tracked");
            *degree -= 1;
            if *degree == 0 {
                // BTreeMap iteration seeded the queue sorted; keep it that
                // way as nodes free up.
                let pos = ready.iter().position(|&r| r > next).unwrap_or(ready.len());
                ready.insert(pos, next);
            }
        }
    }

    if order.len() < graph.nodes.len() {
        let leftover: HashSet<&str> = in_degree
            .iter()
            .filter(|(_, &d)| d > 0)
            .map(|(&id, _)| id)
            .collect();
        errors.push(ValidationError::Cycle {
            path: witness_cycle(&leftover, &successors),
        });
    }
    order
}

/// Walk successors inside the cyclic remainder until a node repeats
fn witness_cycle(leftover: &HashSet<&str>, successors: &HashMap<&str, Vec<&str>>) -> Vec<NodeId> {
    let start = match leftover.iter().min() {
        Some(&id) => id,
        None => return Vec::new(),
    };

    let mut path: Vec<&str> = vec![start];
    let mut seen: HashMap<&str, usize> = HashMap::from([(start, 0)]);
    let mut current = start;
    loop {
        let next = successors
            .get(current)
            .into_iter()
            .flatten()
            .find(|&&n| leftover.contains(n));
        match next {
            Some(&next) => {
                if let Some(&at) = seen.get(next) {
                    let mut cycle: Vec<NodeId> =
                        path[at..].iter().map(|s| s.to_string()).collect();
                    cycle.push(next.to_string());
                    return cycle;
                }
                seen.insert(next, path.len());
                path.push(next);
                current = next;
            }
            // Every leftover node keeps positive in-degree within the
            // remainder, so this arm is unreachable; bail rather than spin.
            None => return path.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn check_reachability(
    graph: &GraphDefinition,
    edges: &[&Edge],
    input_ids: &[&str],
    errors: &mut Vec<ValidationError>,
) {
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut has_incoming: HashSet<&str> = HashSet::new();
    for edge in edges {
        successors
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
        has_incoming.insert(edge.target.as_str());
    }

    let mut reached: HashSet<&str> = input_ids.iter().copied().collect();
    let mut queue: VecDeque<&str> = input_ids.iter().copied().collect();
    while let Some(id) = queue.pop_front() {
        for &next in successors.get(id).into_iter().flatten() {
            if reached.insert(next) {
                queue.push_back(next);
            }
        }
    }

    for node in &graph.nodes {
        if node.kind == NodeKind::Input {
            continue;
        }
        if !has_incoming.contains(node.id.as_str()) {
            errors.push(ValidationError::NoIncomingEdges {
                node: node.id.clone(),
            });
        } else if !reached.contains(node.id.as_str()) {
            errors.push(ValidationError::Unreachable {
                node: node.id.clone(),
            });
        }
    }
}

fn check_fan_in(
    nodes_by_id: &HashMap<&str, &Node>,
    edges: &[&Edge],
    errors: &mut Vec<ValidationError>,
) {
    let mut counts: BTreeMap<(&str, &str), usize> = BTreeMap::new();
    for edge in edges {
        *counts
            .entry((edge.target.as_str(), edge.target_port.as_str()))
            .or_default() += 1;
    }
    for ((target, port), count) in counts {
        if count < 2 {
            continue;
        }
        if let Some(node) = nodes_by_id.get(target) {
            if !node.kind.supports_fan_in() {
                errors.push(ValidationError::IllegalFanIn {
                    node: target.to_string(),
                    port: port.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, GraphDefinition, Node, NodeKind};
    use proptest::prelude::*;
    use serde_json::json;

    fn linear_graph() -> GraphDefinition {
        GraphDefinition::new("linear")
            .with_node(Node::new("a", NodeKind::Input).with_outputs(["out"]))
            .with_node(
                Node::new("b", NodeKind::Process)
                    .with_config(json!({"op": "double"}))
                    .with_inputs(["in"])
                    .with_outputs(["out"]),
            )
            .with_node(Node::new("c", NodeKind::Output).with_inputs(["in"]))
            .with_edge(Edge::new("a", "out", "b", "in"))
            .with_edge(Edge::new("b", "out", "c", "in"))
    }

    #[test]
    fn test_valid_graph_passes() {
        let graph = linear_graph();
        let validated = validate(&graph).unwrap();
        assert_eq!(validated.topo_order(), &["a", "b", "c"]);
        assert_eq!(validated.input_nodes(), &["a"]);
        assert_eq!(validated.output_nodes(), &["c"]);
        assert_eq!(validated.incoming_edges("b").count(), 1);
        assert_eq!(validated.outgoing_edges("b").count(), 1);
    }

    #[test]
    fn test_duplicate_node_id() {
        let graph = linear_graph().with_node(Node::new("a", NodeKind::Input).with_outputs(["out"]));
        let errors = validate(&graph).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateNodeId("a".into())));
    }

    #[test]
    fn test_duplicate_ids_do_not_report_a_spurious_cycle() {
        let graph = linear_graph().with_node(
            Node::new("b", NodeKind::Process)
                .with_config(json!({"op": "identity"}))
                .with_inputs(["in"])
                .with_outputs(["out"]),
        );
        let errors = validate(&graph).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateNodeId("b".into())));
        assert!(!errors
            .iter()
            .any(|e| matches!(e, ValidationError::Cycle { .. })));
    }

    #[test]
    fn test_no_input_nodes() {
        let graph = GraphDefinition::new("empty")
            .with_node(Node::new("c", NodeKind::Output).with_inputs(["in"]));
        let errors = validate(&graph).unwrap_err();
        assert!(errors.contains(&ValidationError::NoInputNodes));
    }

    #[test]
    fn test_unknown_node_and_port() {
        let graph = linear_graph()
            .with_edge(Edge::new("ghost", "out", "c", "in"))
            .with_edge(Edge::new("a", "missing", "b", "in"));
        let errors = validate(&graph).unwrap_err();
        assert!(errors.contains(&ValidationError::UnknownNode {
            node: "ghost".into()
        }));
        assert!(errors.contains(&ValidationError::UnknownPort {
            node: "a".into(),
            port: "missing".into()
        }));
    }

    #[test]
    fn test_cycle_reported_with_path() {
        let graph = GraphDefinition::new("cyclic")
            .with_node(Node::new("a", NodeKind::Input).with_outputs(["out"]))
            .with_node(
                Node::new("b", NodeKind::Process)
                    .with_config(json!({"op": "identity"}))
                    .with_inputs(["in"])
                    .with_outputs(["out"]),
            )
            .with_node(
                Node::new("c", NodeKind::Transform)
                    .with_config(json!({"op": "identity"}))
                    .with_inputs(["in"])
                    .with_outputs(["out"]),
            )
            .with_edge(Edge::new("a", "out", "b", "in"))
            .with_edge(Edge::new("b", "out", "c", "in"))
            .with_edge(Edge::new("c", "out", "b", "in"));
        let errors = validate(&graph).unwrap_err();
        let cycle = errors
            .iter()
            .find_map(|e| match e {
                ValidationError::Cycle { path } => Some(path.clone()),
                _ => None,
            })
            .expect("cycle error present");
        assert_eq!(cycle.first(), cycle.last());
        assert!(cycle.len() >= 3);
    }

    #[test]
    fn test_unreachable_and_no_incoming() {
        let graph = linear_graph()
            // dangling node without incoming edges
            .with_node(
                Node::new("d", NodeKind::Process)
                    .with_config(json!({"op": "identity"}))
                    .with_inputs(["in"])
                    .with_outputs(["out"]),
            )
            // orphan pair feeding each other... e has incoming from d
            .with_node(Node::new("e", NodeKind::Output).with_inputs(["in"]))
            .with_edge(Edge::new("d", "out", "e", "in"));
        let errors = validate(&graph).unwrap_err();
        assert!(errors.contains(&ValidationError::NoIncomingEdges { node: "d".into() }));
        assert!(errors.contains(&ValidationError::Unreachable { node: "e".into() }));
    }

    #[test]
    fn test_illegal_fan_in() {
        let graph = GraphDefinition::new("fanin")
            .with_node(Node::new("a", NodeKind::Input).with_outputs(["out"]))
            .with_node(Node::new("b", NodeKind::Input).with_outputs(["out"]))
            .with_node(Node::new("c", NodeKind::Output).with_inputs(["in"]))
            .with_edge(Edge::new("a", "out", "c", "in"))
            .with_edge(Edge::new("b", "out", "c", "in"));
        let errors = validate(&graph).unwrap_err();
        assert!(errors.contains(&ValidationError::IllegalFanIn {
            node: "c".into(),
            port: "in".into()
        }));
    }

    #[test]
    fn test_legal_fan_in_for_process() {
        let graph = GraphDefinition::new("fanin")
            .with_node(Node::new("a", NodeKind::Input).with_outputs(["out"]))
            .with_node(Node::new("b", NodeKind::Input).with_outputs(["out"]))
            .with_node(
                Node::new("c", NodeKind::Process)
                    .with_config(json!({"op": "sum"}))
                    .with_inputs(["in"])
                    .with_outputs(["out"]),
            )
            .with_node(Node::new("d", NodeKind::Output).with_inputs(["in"]))
            .with_edge(Edge::new("a", "out", "c", "in"))
            .with_edge(Edge::new("b", "out", "c", "in"))
            .with_edge(Edge::new("c", "out", "d", "in"));
        assert!(validate(&graph).is_ok());
    }

    #[test]
    fn test_config_errors() {
        let graph = GraphDefinition::new("bad-config")
            .with_node(Node::new("a", NodeKind::Input).with_outputs(["out"]))
            .with_node(
                Node::new("b", NodeKind::Process)
                    .with_config(json!({"op": "frobnicate"}))
                    .with_inputs(["in"])
                    .with_outputs(["out"]),
            )
            .with_node(
                Node::new("c", NodeKind::Delay)
                    .with_inputs(["in"])
                    .with_outputs(["out"]),
            )
            .with_node(
                Node::new("d", NodeKind::Loop)
                    .with_config(json!({"op": "double", "max_iterations": 0}))
                    .with_inputs(["in"])
                    .with_outputs(["out"]),
            )
            .with_node(Node::new("e", NodeKind::Output).with_inputs(["in"]))
            .with_edge(Edge::new("a", "out", "b", "in"))
            .with_edge(Edge::new("b", "out", "c", "in"))
            .with_edge(Edge::new("c", "out", "d", "in"))
            .with_edge(Edge::new("d", "out", "e", "in"));
        let errors = validate(&graph).unwrap_err();
        let config_nodes: Vec<&str> = errors
            .iter()
            .filter_map(|e| match e {
                ValidationError::Config { node, .. } => Some(node.as_str()),
                _ => None,
            })
            .collect();
        assert!(config_nodes.contains(&"b"));
        assert!(config_nodes.contains(&"c"));
        assert!(config_nodes.contains(&"d"));
    }

    #[test]
    fn test_multiply_requires_factor() {
        let graph = GraphDefinition::new("multiply")
            .with_node(Node::new("a", NodeKind::Input).with_outputs(["out"]))
            .with_node(
                Node::new("b", NodeKind::Process)
                    .with_config(json!({"op": "multiply"}))
                    .with_inputs(["in"])
                    .with_outputs(["out"]),
            )
            .with_node(Node::new("c", NodeKind::Output).with_inputs(["in"]))
            .with_edge(Edge::new("a", "out", "b", "in"))
            .with_edge(Edge::new("b", "out", "c", "in"));
        let errors = validate(&graph).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::Config { node, .. } if node == "b")));
    }

    #[test]
    fn test_validation_is_idempotent() {
        let graph = linear_graph()
            .with_node(Node::new("a", NodeKind::Input).with_outputs(["out"]))
            .with_edge(Edge::new("ghost", "out", "c", "in"));
        let first = validate(&graph).unwrap_err();
        let second = validate(&graph).unwrap_err();
        assert_eq!(first, second);
    }

    #[test]
    fn test_all_errors_collected_in_one_pass() {
        let graph = GraphDefinition::new("broken")
            .with_node(Node::new("a", NodeKind::Input).with_outputs(["out"]))
            .with_node(Node::new("a", NodeKind::Input).with_outputs(["out"]))
            .with_node(
                Node::new("b", NodeKind::Process)
                    .with_config(json!({"op": "nope"}))
                    .with_inputs(["in"])
                    .with_outputs(["out"]),
            )
            .with_edge(Edge::new("a", "out", "b", "in"))
            .with_edge(Edge::new("ghost", "out", "b", "in"));
        let errors = validate(&graph).unwrap_err();
        assert!(errors.len() >= 3, "expected several errors, got {errors:?}");
    }

    proptest! {
        /// Declaration order of the middle nodes never changes the
        /// deterministic topological order of a fixed chain.
        #[test]
        fn prop_topo_order_independent_of_declaration_order(
            perm in Just(vec!["m1", "m2", "m3", "m4"]).prop_shuffle()
        ) {
            let mut graph = GraphDefinition::new("perm")
                .with_node(Node::new("a", NodeKind::Input).with_outputs(["out"]))
                .with_node(Node::new("z", NodeKind::Output).with_inputs(["in"]));
            for id in &perm {
                graph.add_node(
                    Node::new(*id, NodeKind::Transform)
                        .with_config(json!({"op": "identity"}))
                        .with_inputs(["in"])
                        .with_outputs(["out"]),
                );
            }
            let mut sorted = perm.clone();
            sorted.sort();
            graph.add_edge(Edge::new("a", "out", sorted[0], "in"));
            for pair in sorted.windows(2) {
                graph.add_edge(Edge::new(pair[0], "out", pair[1], "in"));
            }
            graph.add_edge(Edge::new(*sorted.last().unwrap(), "out", "z", "in"));

            let validated = validate(&graph).unwrap();
            prop_assert_eq!(
                validated.topo_order(),
                &["a", "m1", "m2", "m3", "m4", "z"]
            );
        }
    }
}
