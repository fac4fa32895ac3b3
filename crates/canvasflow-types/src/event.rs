//! Event types for the canvasflow event bus.
//!
//! `WorkflowEvent` is the streaming counterpart of state subscriptions: where
//! subscribers receive whole `WorkflowState` snapshots, the bus carries small
//! typed transitions. All variants are Clone + Send + Sync for use with tokio
//! broadcast channels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a run stopped driving without finishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PauseReason {
    /// `pause_workflow` was called.
    Requested,
    /// No node is ready but the run is not complete.
    Stalled {
        /// Nodes still pending.
        blocked_nodes: Vec<String>,
        /// Nodes that ended in error.
        failed_nodes: Vec<String>,
    },
}

/// Lifecycle events emitted while a workflow run executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    RunStarted {
        run_id: Uuid,
        graph_id: String,
    },

    NodeStarted {
        run_id: Uuid,
        node_id: String,
        agent_name: String,
    },

    /// An attempt failed and another one is scheduled.
    NodeRetrying {
        run_id: Uuid,
        node_id: String,
        attempt: u32,
        error: String,
        delay_secs: u64,
    },

    NodeCompleted {
        run_id: Uuid,
        node_id: String,
        duration_ms: u64,
    },

    NodeFailed {
        run_id: Uuid,
        node_id: String,
        error: String,
        attempts: u32,
    },

    RunPaused {
        run_id: Uuid,
        reason: PauseReason,
    },

    RunResumed {
        run_id: Uuid,
    },

    RunCompleted {
        run_id: Uuid,
        duration_ms: u64,
        nodes_completed: u32,
    },

    RunFailed {
        run_id: Uuid,
        error: String,
    },
}

impl WorkflowEvent {
    /// The run this event belongs to.
    pub fn run_id(&self) -> Uuid {
        match self {
            WorkflowEvent::RunStarted { run_id, .. }
            | WorkflowEvent::NodeStarted { run_id, .. }
            | WorkflowEvent::NodeRetrying { run_id, .. }
            | WorkflowEvent::NodeCompleted { run_id, .. }
            | WorkflowEvent::NodeFailed { run_id, .. }
            | WorkflowEvent::RunPaused { run_id, .. }
            | WorkflowEvent::RunResumed { run_id }
            | WorkflowEvent::RunCompleted { run_id, .. }
            | WorkflowEvent::RunFailed { run_id, .. } => *run_id,
        }
    }

    /// The node this event is about, for node-level events.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            WorkflowEvent::NodeStarted { node_id, .. }
            | WorkflowEvent::NodeRetrying { node_id, .. }
            | WorkflowEvent::NodeCompleted { node_id, .. }
            | WorkflowEvent::NodeFailed { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}
