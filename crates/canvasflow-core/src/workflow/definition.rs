//! Graph definition validation.
//!
//! A graph is checked once, when it is registered. Anything that would make a
//! run hang or misbehave (unknown dependencies, cycles, a missing entry node)
//! is rejected here so the scheduler never has to guard against it.

use std::collections::HashSet;

use canvasflow_types::graph::WorkflowGraph;
use thiserror::Error;

use super::dag;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Structural problems with a workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("graph id must not be empty")]
    EmptyId,

    #[error("graph '{0}' has no nodes")]
    EmptyGraph(String),

    #[error("duplicate node id: '{0}'")]
    DuplicateNode(String),

    #[error("node '{node}' depends on unknown node '{dependency}'")]
    UnknownDependency { node: String, dependency: String },

    #[error("entry node '{0}' is not a node of the graph")]
    MissingEntryNode(String),

    #[error("entry node '{0}' must not have dependencies")]
    EntryNodeHasDependencies(String),

    #[error("cycle detected involving node '{0}'")]
    CyclicGraph(String),

    #[error("edge '{from}' -> '{to}' references an unknown node")]
    UnknownEdgeEndpoint { from: String, to: String },
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a `WorkflowGraph`.
///
/// Checks:
/// - Graph id is non-empty and at least one node exists
/// - Node ids are unique
/// - Every dependency and edge endpoint names an existing node
/// - The entry node exists and has no dependencies
/// - The dependency relation is acyclic
pub fn validate_graph(graph: &WorkflowGraph) -> Result<(), GraphError> {
    if graph.id.trim().is_empty() {
        return Err(GraphError::EmptyId);
    }
    if graph.nodes.is_empty() {
        return Err(GraphError::EmptyGraph(graph.id.clone()));
    }

    let mut seen = HashSet::new();
    for node in &graph.nodes {
        if !seen.insert(node.id.as_str()) {
            return Err(GraphError::DuplicateNode(node.id.clone()));
        }
    }

    for node in &graph.nodes {
        if let Some(dep) = node.dependencies.iter().find(|d| !seen.contains(d.as_str())) {
            return Err(GraphError::UnknownDependency {
                node: node.id.clone(),
                dependency: dep.clone(),
            });
        }
    }

    for edge in &graph.edges {
        if !seen.contains(edge.from.as_str()) || !seen.contains(edge.to.as_str()) {
            return Err(GraphError::UnknownEdgeEndpoint {
                from: edge.from.clone(),
                to: edge.to.clone(),
            });
        }
    }

    match graph.node(&graph.entry_node) {
        None => return Err(GraphError::MissingEntryNode(graph.entry_node.clone())),
        Some(entry) if !entry.dependencies.is_empty() => {
            return Err(GraphError::EntryNodeHasDependencies(entry.id.clone()));
        }
        Some(_) => {}
    }

    dag::topological_order(graph)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
