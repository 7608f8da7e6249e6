//! Loading graph definitions from JSON and YAML documents
//!
//! The authoring surface ships graphs as documents; this module parses them
//! into [`GraphDefinition`] values. Parsing is purely syntactic - structural
//! invariants are checked separately by [`crate::validate::validate`], so a
//! document that parses here can still be rejected at submission.
//!
//! # Document Shape
//!
//! ```yaml
//! name: double
//! nodes:
//!   - id: a
//!     kind: input
//!     outputs: [out]
//!   - id: b
//!     kind: process
//!     config: { op: double }
//!     inputs: [in]
//!     outputs: [out]
//!   - id: c
//!     kind: output
//!     inputs: [in]
//! edges:
//!   - { source: a, source_port: out, target: b, target_port: in }
//!   - { source: b, source_port: out, target: c, target_port: in }
//! ```

use crate::error::Result;
use crate::graph::GraphDefinition;
use std::path::Path;

/// Parse a graph definition from a JSON document
pub fn from_json_str(document: &str) -> Result<GraphDefinition> {
    Ok(serde_json::from_str(document)?)
}

/// Parse a graph definition from a JSON value
pub fn from_json_value(value: serde_json::Value) -> Result<GraphDefinition> {
    Ok(serde_json::from_value(value)?)
}

/// Parse a graph definition from a YAML document
pub fn from_yaml_str(document: &str) -> Result<GraphDefinition> {
    Ok(serde_yaml::from_str(document)?)
}

/// Load a graph definition from a file, dispatching on extension
///
/// `.yaml`/`.yml` parse as YAML; anything else as JSON.
pub fn from_file(path: impl AsRef<Path>) -> Result<GraphDefinition> {
    let path = path.as_ref();
    let document = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => from_yaml_str(&document),
        _ => from_json_str(&document),
    }
}

/// Serialize a graph definition to a YAML document
pub fn to_yaml_string(graph: &GraphDefinition) -> Result<String> {
    Ok(serde_yaml::to_string(graph)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeCondition, NodeKind};
    use crate::validate::validate;
    use serde_json::json;

    const YAML_DOC: &str = r#"
name: double
nodes:
  - id: a
    kind: input
    outputs: [out]
  - id: b
    kind: process
    config: { op: double }
    inputs: [in]
    outputs: [out]
  - id: c
    kind: output
    inputs: [in]
edges:
  - { source: a, source_port: out, target: b, target_port: in }
  - { source: b, source_port: out, target: c, target_port: in }
"#;

    #[test]
    fn test_yaml_document_parses_and_validates() {
        let graph = from_yaml_str(YAML_DOC).unwrap();
        assert_eq!(graph.name, "double");
        assert_eq!(graph.node("b").unwrap().kind, NodeKind::Process);
        assert!(validate(&graph).is_ok());
    }

    #[test]
    fn test_json_document_with_conditional_edge() {
        let graph = from_json_value(json!({
            "name": "conditional",
            "nodes": [
                {"id": "a", "kind": "input", "outputs": ["out"]},
                {"id": "b", "kind": "output", "inputs": ["in"]}
            ],
            "edges": [{
                "source": "a", "source_port": "out",
                "target": "b", "target_port": "in",
                "condition": {"kind": "truthy", "pointer": "/go"}
            }]
        }))
        .unwrap();
        assert_eq!(
            graph.edges[0].condition,
            Some(EdgeCondition::Truthy {
                pointer: "/go".to_string()
            })
        );
    }

    #[test]
    fn test_malformed_document_is_rejected() {
        assert!(from_json_str("{\"name\": ").is_err());
        assert!(from_yaml_str("nodes: [{id: a, kind: not-a-kind}]").is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let graph = from_yaml_str(YAML_DOC).unwrap();
        let rendered = to_yaml_string(&graph).unwrap();
        let back = from_yaml_str(&rendered).unwrap();
        assert_eq!(back.nodes.len(), graph.nodes.len());
        assert_eq!(back.edges.len(), graph.edges.len());
    }
}
