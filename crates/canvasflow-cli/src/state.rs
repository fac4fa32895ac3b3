//! Application state shared by CLI commands.
//!
//! Resolves the data directory, loads `config.toml`, and builds a
//! `WorkflowEngine` backed by the placeholder research agents.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use canvasflow_core::config::load_engine_config;
use canvasflow_core::workflow::WorkflowEngine;
use canvasflow_core::workflow::builtin::placeholder_research_agents;
use canvasflow_types::config::EngineConfig;
use canvasflow_types::graph::WorkflowGraph;

pub struct AppState {
    pub data_dir: PathBuf,
    pub engine: WorkflowEngine,
}

impl AppState {
    pub async fn init(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.unwrap_or_else(resolve_data_dir);
        let config = load_engine_config(&data_dir).await;
        tracing::debug!(data_dir = %data_dir.display(), ?config, "engine config loaded");

        let agents = Arc::new(placeholder_research_agents());
        Ok(Self {
            data_dir,
            engine: WorkflowEngine::new(agents, config),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        self.engine.config()
    }

    /// Register a graph stored as JSON and return its id.
    pub async fn register_graph_file(&self, path: &Path) -> Result<String> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let graph: WorkflowGraph = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse graph in {}", path.display()))?;
        let id = graph.id.clone();
        self.engine
            .register_graph(graph)
            .with_context(|| format!("Graph '{id}' was rejected"))?;
        Ok(id)
    }

    pub async fn register_optional(&self, path: Option<&Path>) -> Result<()> {
        if let Some(path) = path {
            self.register_graph_file(path).await?;
        }
        Ok(())
    }
}

/// `$CANVASFLOW_DATA_DIR` is handled by clap; otherwise `~/.canvasflow`.
pub fn resolve_data_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".canvasflow"),
        None => PathBuf::from(".canvasflow"),
    }
}
