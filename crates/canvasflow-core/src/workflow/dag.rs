//! Dependency DAG: cycle detection, topological order, and stage computation.
//!
//! Uses `petgraph` to model node dependencies as a directed graph. Topological
//! sort detects cycles, and depth-based grouping produces stages where every
//! node's dependencies lie in earlier stages.

use std::collections::HashMap;

use canvasflow_types::graph::{WorkflowGraph, WorkflowNode};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use super::definition::GraphError;

/// Build a `DiGraph` with an edge from each dependency to its dependant.
fn build_digraph(graph: &WorkflowGraph) -> Result<DiGraph<&str, ()>, GraphError> {
    let mut dag = DiGraph::<&str, ()>::new();
    let indices: HashMap<&str, NodeIndex> = graph
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), dag.add_node(n.id.as_str())))
        .collect();

    for node in &graph.nodes {
        let to = indices[node.id.as_str()];
        for dep in &node.dependencies {
            let from = indices
                .get(dep.as_str())
                .ok_or_else(|| GraphError::UnknownDependency {
                    node: node.id.clone(),
                    dependency: dep.clone(),
                })?;
            dag.add_edge(*from, to, ());
        }
    }

    Ok(dag)
}

/// Return node ids in a dependency-respecting order, or the node a cycle
/// passes through.
pub fn topological_order(graph: &WorkflowGraph) -> Result<Vec<&str>, GraphError> {
    let dag = build_digraph(graph)?;
    let sorted = toposort(&dag, None)
        .map_err(|cycle| GraphError::CyclicGraph(dag[cycle.node_id()].to_string()))?;
    Ok(sorted.into_iter().map(|idx| dag[idx]).collect())
}

/// Group nodes into stages by dependency depth.
///
/// Stage 0 holds every node without dependencies; a node sits one stage after
/// its deepest dependency. Within a stage nodes keep declaration order.
pub fn execution_stages(graph: &WorkflowGraph) -> Result<Vec<Vec<&WorkflowNode>>, GraphError> {
    if graph.nodes.is_empty() {
        return Ok(vec![]);
    }

    let by_id: HashMap<&str, &WorkflowNode> =
        graph.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let mut depths: HashMap<&str, usize> = HashMap::new();
    for id in topological_order(graph)? {
        let depth = by_id[id]
            .dependencies
            .iter()
            .map(|dep| depths.get(dep.as_str()).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0);
        depths.insert(id, depth);
    }

    let max_depth = depths.values().copied().max().unwrap_or(0);
    let mut stages: Vec<Vec<&WorkflowNode>> = vec![vec![]; max_depth + 1];
    for node in &graph.nodes {
        stages[depths[node.id.as_str()]].push(node);
    }
    Ok(stages)
}

/// Whether `order` lists every node of `graph` exactly once, each after all of
/// its dependencies.
pub fn is_topological_order(graph: &WorkflowGraph, order: &[String]) -> bool {
    if order.len() != graph.nodes.len() {
        return false;
    }
    let position: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    if position.len() != order.len() {
        return false;
    }

    graph.nodes.iter().all(|node| {
        let Some(&at) = position.get(node.id.as_str()) else {
            return false;
        };
        node.dependencies
            .iter()
            .all(|dep| position.get(dep.as_str()).is_some_and(|&d| d < at))
    })
}
