//! Core scheduling logic for canvasflow.
//!
//! Graph validation, the agent and graph registries, the event bus, the
//! workflow engine, and the config loader. Everything is in-memory; nothing
//! here talks to the network.

pub mod config;
pub mod event;
pub mod workflow;
