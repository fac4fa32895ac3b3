//! Engine configuration types.
//!
//! `EngineConfig` is the `config.toml` that tunes scheduling behaviour. All
//! fields have defaults, so an empty file (or no file) is a valid config.

use serde::{Deserialize, Serialize};

use crate::graph::RetryPolicy;

/// Default per-attempt bound for nodes that declare no timeout (5 minutes).
pub const DEFAULT_NODE_TIMEOUT_SECS: u64 = 300;

/// Default broadcast capacity for the workflow event bus.
pub const DEFAULT_EVENT_BUS_CAPACITY: usize = 1024;

/// What a node failure does to the rest of its run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Dependants stay pending and the run settles into `paused`.
    #[default]
    Pause,
    /// The first node failure moves the whole run to `error`.
    FailRun,
}

/// Scheduling configuration for a `WorkflowEngine`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Timeout for nodes without `timeoutSeconds`. `0` means unbounded.
    #[serde(default = "default_node_timeout_secs")]
    pub default_node_timeout_secs: u64,

    /// Run all ready nodes of a round concurrently instead of one by one.
    #[serde(default)]
    pub parallel_ready_nodes: bool,

    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Retry policy for nodes that declare none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_retry: Option<RetryPolicy>,
}

fn default_node_timeout_secs() -> u64 {
    DEFAULT_NODE_TIMEOUT_SECS
}

fn default_event_bus_capacity() -> usize {
    DEFAULT_EVENT_BUS_CAPACITY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            default_node_timeout_secs: default_node_timeout_secs(),
            parallel_ready_nodes: false,
            event_bus_capacity: default_event_bus_capacity(),
            default_retry: None,
        }
    }
}
