//! Shared domain types for canvasflow.
//!
//! Graph definitions, run/node state, agent invocation context, bus events,
//! and engine configuration. No scheduling logic lives here.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod agent;
pub mod config;
pub mod event;
pub mod graph;
pub mod state;
