//! Runtime state of workflow runs.
//!
//! `WorkflowState` is the single mutable record of one run. The engine owns it
//! exclusively; callers only ever see clones. The transition helpers here are
//! pure bookkeeping -- deciding *when* to apply them is the scheduler's job.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::StateBag;
use crate::graph::WorkflowGraph;

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Overall status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Error,
    Paused,
}

impl WorkflowStatus {
    /// `completed` and `error` can never be left.
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Error => "error",
            WorkflowStatus::Paused => "paused",
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Error,
    /// Reserved for human-in-the-loop intervention; never set by the scheduler.
    WaitingForInput,
}

impl NodeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Running => "running",
            NodeStatus::Completed => "completed",
            NodeStatus::Error => "error",
            NodeStatus::WaitingForInput => "waiting_for_input",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Node state
// ---------------------------------------------------------------------------

/// Runtime record of one node within one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeState {
    pub id: String,
    pub name: String,
    pub agent_name: String,
    pub status: NodeStatus,
    /// 0 until the node completes, then 100.
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Caller payload; only present on the entry node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<StateBag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<StateBag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Copy of the graph node's dependencies.
    pub dependencies: Vec<String>,
    /// Agent invocations made so far (retries included).
    #[serde(default)]
    pub attempts: u32,
}

// ---------------------------------------------------------------------------
// Intervention points
// ---------------------------------------------------------------------------

/// A request for human input at a node. Carried but never produced by the
/// current scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionPoint {
    pub node_id: String,
    pub message: String,
    #[serde(default)]
    pub options: Vec<InterventionOption>,
    pub required: bool,
    pub timestamp: DateTime<Utc>,
}

/// One selectable answer for an intervention point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterventionOption {
    pub label: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Workflow state
// ---------------------------------------------------------------------------

/// Runtime record of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub id: Uuid,
    /// Graph this run was started from.
    pub graph_id: String,
    pub status: WorkflowStatus,
    pub current_node: Option<String>,
    /// Node ids in completion order. Append-only.
    pub completed_nodes: Vec<String>,
    pub node_states: HashMap<String, NodeState>,
    /// Union of every completed node's output; later keys win.
    pub global_state: StateBag,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub intervention_points: Vec<InterventionPoint>,
    /// Run-level failure description (scheduler fault or fail-run policy).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowState {
    /// Build the initial `pending` state for a run of `graph`.
    ///
    /// Every node starts `pending`; the entry node carries `input`, and the
    /// global state starts as a copy of `input`.
    pub fn new(id: Uuid, graph: &WorkflowGraph, input: StateBag, now: DateTime<Utc>) -> Self {
        let node_states = graph
            .nodes
            .iter()
            .map(|node| {
                let state = NodeState {
                    id: node.id.clone(),
                    name: node.name.clone(),
                    agent_name: node.agent_name.clone(),
                    status: NodeStatus::Pending,
                    progress: 0,
                    start_time: None,
                    end_time: None,
                    input: (node.id == graph.entry_node).then(|| input.clone()),
                    output: None,
                    error: None,
                    dependencies: node.dependencies.clone(),
                    attempts: 0,
                };
                (node.id.clone(), state)
            })
            .collect();

        Self {
            id,
            graph_id: graph.id.clone(),
            status: WorkflowStatus::Pending,
            current_node: None,
            completed_nodes: Vec::new(),
            node_states,
            global_state: input,
            start_time: now,
            end_time: None,
            intervention_points: Vec::new(),
            error: None,
        }
    }

    fn node_status(&self, node_id: &str) -> Option<NodeStatus> {
        self.node_states.get(node_id).map(|n| n.status)
    }

    /// Pending nodes whose dependencies have all completed, in `order`.
    pub fn ready_nodes<'a>(&self, order: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        order
            .into_iter()
            .filter_map(|id| self.node_states.get(id))
            .filter(|node| node.status == NodeStatus::Pending)
            .filter(|node| {
                node.dependencies
                    .iter()
                    .all(|dep| self.node_status(dep) == Some(NodeStatus::Completed))
            })
            .map(|node| node.id.clone())
            .collect()
    }

    /// Nodes still `pending`, in `order`.
    pub fn pending_nodes<'a>(&self, order: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        order
            .into_iter()
            .filter(|id| self.node_status(id) == Some(NodeStatus::Pending))
            .map(str::to_string)
            .collect()
    }

    /// Nodes that ended in `error`, in `order`.
    pub fn failed_nodes<'a>(&self, order: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        order
            .into_iter()
            .filter(|id| self.node_status(id) == Some(NodeStatus::Error))
            .map(str::to_string)
            .collect()
    }

    pub fn all_completed(&self) -> bool {
        self.node_states
            .values()
            .all(|n| n.status == NodeStatus::Completed)
    }

    /// Mark a node `running` and make it the current node.
    ///
    /// Returns `false` if the node does not belong to this run.
    pub fn start_node(&mut self, node_id: &str, now: DateTime<Utc>) -> bool {
        let Some(node) = self.node_states.get_mut(node_id) else {
            return false;
        };
        node.status = NodeStatus::Running;
        node.progress = 0;
        node.start_time = Some(now);
        self.current_node = Some(node_id.to_string());
        true
    }

    /// Record one more agent attempt for a node.
    pub fn record_attempt(&mut self, node_id: &str) -> u32 {
        match self.node_states.get_mut(node_id) {
            Some(node) => {
                node.attempts += 1;
                node.attempts
            }
            None => 0,
        }
    }

    /// Mark a node `completed` and merge its output into the global state.
    pub fn complete_node(&mut self, node_id: &str, output: StateBag, now: DateTime<Utc>) -> bool {
        let Some(node) = self.node_states.get_mut(node_id) else {
            return false;
        };
        node.status = NodeStatus::Completed;
        node.end_time = Some(now);
        node.progress = 100;
        for (key, value) in &output {
            self.global_state.insert(key.clone(), value.clone());
        }
        node.output = Some(output);
        self.completed_nodes.push(node_id.to_string());
        true
    }

    /// Mark a node `error` with a human-readable message.
    pub fn fail_node(&mut self, node_id: &str, error: String, now: DateTime<Utc>) -> bool {
        let Some(node) = self.node_states.get_mut(node_id) else {
            return false;
        };
        node.status = NodeStatus::Error;
        node.error = Some(error);
        node.end_time = Some(now);
        true
    }

    /// Move the run to a terminal status.
    pub fn finish(&mut self, status: WorkflowStatus, error: Option<String>, now: DateTime<Utc>) {
        self.status = status;
        self.end_time = Some(now);
        if error.is_some() {
            self.error = error;
        }
    }

    /// Compact listing view of this run.
    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            id: self.id,
            graph_id: self.graph_id.clone(),
            status: self.status,
            current_node: self.current_node.clone(),
            completed: self.completed_nodes.len(),
            total: self.node_states.len(),
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

/// Compact view of a run for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub id: Uuid,
    pub graph_id: String,
    pub status: WorkflowStatus,
    pub current_node: Option<String>,
    pub completed: usize,
    pub total: usize,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
