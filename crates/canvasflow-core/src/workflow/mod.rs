//! Workflow engine core: graph validation, registries, and the drive loop.
//!
//! - `definition` -- structural validation of workflow graphs
//! - `dag` -- petgraph-backed cycle detection, topological order, stages
//! - `agent` -- the `Agent` capability trait and its boxed wrapper
//! - `registry` -- graph and agent registries
//! - `retry` -- per-node retry and timeout resolution
//! - `run` -- per-run state, listeners, and settle signal
//! - `engine` -- `WorkflowEngine`: start/pause/resume/get/subscribe
//! - `builtin` -- the `research_canvas` graph and placeholder agents

pub mod agent;
pub mod builtin;
pub mod dag;
pub mod definition;
pub mod engine;
pub mod registry;
pub mod retry;
pub(crate) mod run;

pub use agent::{Agent, BoxAgent};
pub use definition::GraphError;
pub use engine::{EngineError, Subscription, WorkflowEngine};
pub use registry::{AgentRegistry, GraphRegistry};
