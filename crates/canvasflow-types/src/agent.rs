//! Agent invocation types.
//!
//! Agents exchange open, string-keyed JSON maps with the engine. The set of
//! keys depends entirely on which agents are plugged into a graph, so no fixed
//! schema is imposed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Open key/value bag used for run input, agent output, and global state.
pub type StateBag = Map<String, Value>;

/// Everything an agent sees when it is invoked for a node.
///
/// `global_state` is a snapshot taken at dispatch time; agents never write to
/// the run's shared state directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentContext {
    /// Node being executed.
    pub node_id: String,
    /// Run the node belongs to.
    pub workflow_id: Uuid,
    /// Canned input; only the entry node receives a non-empty bag.
    #[serde(default)]
    pub input: StateBag,
    /// Accumulated results of every node completed so far.
    #[serde(default)]
    pub global_state: StateBag,
}

impl AgentContext {
    /// Read a key from the node input first, falling back to global state.
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        self.input.get(key).or_else(|| self.global_state.get(key))
    }

    /// Like [`AgentContext::lookup`] but only for string values.
    pub fn lookup_str(&self, key: &str) -> Option<&str> {
        self.lookup(key).and_then(Value::as_str)
    }
}

/// Why a single agent invocation did not produce a result bag.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("agent not found: {0}")]
    NotFound(String),

    #[error("agent execution failed: {0}")]
    ExecutionFailed(String),

    #[error("agent timed out after {secs}s")]
    Timeout { secs: u64 },
}

impl AgentError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::ExecutionFailed(message.into())
    }

    /// Whether another attempt could succeed. A missing agent never appears
    /// between attempts.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NotFound(_))
    }
}
