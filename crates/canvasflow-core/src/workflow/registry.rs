//! Graph and agent registries.
//!
//! Both are concurrent maps owned by a `WorkflowEngine`. Graphs are validated
//! on the way in and immutable afterwards; agents can be replaced by
//! registering the same name again.

use std::sync::Arc;

use canvasflow_types::agent::{AgentContext, AgentError, StateBag};
use canvasflow_types::graph::WorkflowGraph;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::agent::{Agent, BoxAgent};
use super::definition::validate_graph;
use super::engine::EngineError;

// ---------------------------------------------------------------------------
// GraphRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct GraphRegistry {
    graphs: DashMap<String, Arc<WorkflowGraph>>,
}

impl GraphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a graph under its id.
    ///
    /// Fails with `InvalidGraph` for a structurally broken graph and with
    /// `GraphAlreadyRegistered` if the id is taken.
    pub fn register(&self, graph: WorkflowGraph) -> Result<Arc<WorkflowGraph>, EngineError> {
        validate_graph(&graph)?;

        match self.graphs.entry(graph.id.clone()) {
            Entry::Occupied(entry) => Err(EngineError::GraphAlreadyRegistered(entry.key().clone())),
            Entry::Vacant(entry) => {
                let graph = Arc::new(graph);
                entry.insert(Arc::clone(&graph));
                Ok(graph)
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<WorkflowGraph>> {
        self.graphs.get(id).map(|g| Arc::clone(g.value()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.graphs.contains_key(id)
    }

    /// Registered graph ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.graphs.iter().map(|g| g.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }
}

// ---------------------------------------------------------------------------
// AgentRegistry
// ---------------------------------------------------------------------------

/// Name -> agent map used to resolve `WorkflowNode::agent_name`.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: DashMap<String, Arc<BoxAgent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under `name`, replacing any previous one.
    pub fn register<A: Agent + 'static>(&self, name: impl Into<String>, agent: A) {
        self.register_boxed(name, BoxAgent::new(agent));
    }

    pub fn register_boxed(&self, name: impl Into<String>, agent: BoxAgent) {
        let name = name.into();
        tracing::debug!(agent = %name, "registering agent");
        self.agents.insert(name, Arc::new(agent));
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<BoxAgent>, AgentError> {
        self.agents
            .get(name)
            .map(|a| Arc::clone(a.value()))
            .ok_or_else(|| AgentError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// Names of every registered agent, sorted.
    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.iter().map(|a| a.key().clone()).collect();
        names.sort();
        names
    }

    /// Resolve `name` and run it with `ctx`.
    pub async fn execute(&self, name: &str, ctx: AgentContext) -> Result<StateBag, AgentError> {
        let agent = self.resolve(name)?;
        agent.execute(ctx).await
    }
}
