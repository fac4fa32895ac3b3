//! Workflow graph definition types.
//!
//! A `WorkflowGraph` is the immutable shape of a pipeline: an ordered list of
//! nodes, each bound to an agent by name and declaring the nodes it depends on.
//! Graphs are registered once with the engine and shared by every run started
//! from them.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Workflow Graph
// ---------------------------------------------------------------------------

/// Immutable definition of a workflow pipeline.
///
/// Node declaration order is significant: the scheduler picks ready nodes in
/// this order, and concurrent rounds merge results in this order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowGraph {
    /// Unique graph identifier (e.g. "research_canvas").
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Longer description of what the pipeline does.
    #[serde(default)]
    pub description: String,
    /// Node that receives the caller's input when a run starts.
    pub entry_node: String,
    /// Nodes in declaration order.
    pub nodes: Vec<WorkflowNode>,
    /// Derived adjacency. Informative only; `WorkflowNode::dependencies` is
    /// authoritative for scheduling.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<WorkflowEdge>,
}

impl WorkflowGraph {
    /// Create a graph from its nodes. Edges are left empty; call
    /// [`WorkflowGraph::with_derived_edges`] to fill them from dependencies.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        entry_node: impl Into<String>,
        nodes: Vec<WorkflowNode>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            entry_node: entry_node.into(),
            nodes,
            edges: Vec::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Replace `edges` with one unconditional edge per declared dependency.
    pub fn with_derived_edges(mut self) -> Self {
        self.edges = self
            .nodes
            .iter()
            .flat_map(|node| {
                node.dependencies
                    .iter()
                    .map(move |dep| WorkflowEdge::new(dep.clone(), node.id.clone()))
            })
            .collect();
        self
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Node ids in declaration order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.id.as_str())
    }
}

// ---------------------------------------------------------------------------
// Workflow Node
// ---------------------------------------------------------------------------

/// A single step in a workflow graph, bound to one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNode {
    /// Node id, unique within its graph.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Name the agent registry resolves to a unit of work.
    pub agent_name: String,
    /// What this step is for.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Ids of nodes that must complete before this one may start.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Upper bound on a single agent attempt, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// Retry behaviour around the agent call.
    #[serde(default, alias = "retry_policy", skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
}

impl WorkflowNode {
    /// Create a node with no dependencies, timeout, or retry policy.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        agent_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            agent_name: agent_name.into(),
            description: String::new(),
            dependencies: Vec::new(),
            timeout_seconds: None,
            retry_policy: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the dependency list.
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// How often and how patiently a failed agent call is re-attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts including the first one (1 = no retry).
    #[serde(default = "default_max_attempts", alias = "max_attempts")]
    pub max_attempts: u32,
    /// Pause between attempts, in seconds.
    #[serde(default, alias = "delay_seconds")]
    pub delay_seconds: u64,
}

fn default_max_attempts() -> u32 {
    1
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay_seconds: u64) -> Self {
        Self {
            max_attempts,
            delay_seconds,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(default_max_attempts(), 0)
    }
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

/// Directed adjacency between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub from: String,
    pub to: String,
    /// Free-form condition label; never evaluated by the scheduler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl WorkflowEdge {
    /// Create an unconditional edge.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
