//! Span attribute names for workflow instrumentation.
//!
//! The engine's `workflow.drive` span and the CLI's `cflow.run` span use
//! these names, so traces from both line up under the same keys. All
//! constants are usable with `Span::record`.

/// Name of the span wrapping one drive loop of a run.
pub const SPAN_WORKFLOW_DRIVE: &str = "workflow.drive";

/// Name of the CLI span wrapping a whole `cflow run` invocation.
pub const SPAN_CLI_RUN: &str = "cflow.run";

// --- Run attributes ---

/// Run id (UUID v7).
pub const WORKFLOW_RUN_ID: &str = "workflow.run_id";

/// Id of the graph the run executes.
pub const WORKFLOW_GRAPH_ID: &str = "workflow.graph_id";

/// Final status of the run (`completed`, `paused`, `error`).
pub const WORKFLOW_STATUS: &str = "workflow.status";

/// Number of nodes completed when the span closed.
pub const WORKFLOW_NODES_COMPLETED: &str = "workflow.nodes_completed";
