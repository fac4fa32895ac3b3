//! Workflow engine: owns graphs and runs, and drives each run to a settled
//! state.
//!
//! # Drive loop
//!
//! Each run has at most one driver task. While the run is `running` the driver
//! computes the ready set (pending nodes whose dependencies all completed, in
//! declaration order) and executes one round:
//!
//! 1. Empty ready set: the run becomes `completed` if every node completed,
//!    otherwise `paused`. The driver exits.
//! 2. Otherwise every ready node runs, one by one or concurrently depending on
//!    `EngineConfig::parallel_ready_nodes`. Results are merged into the global
//!    state in declaration order.
//!
//! The pause flag is only consulted between rounds. Agent calls run in their
//! own task under the node's timeout; a panic there is a scheduler fault and
//! moves the run to `error`.

use std::sync::{Arc, Weak};

use canvasflow_types::agent::{AgentContext, AgentError, StateBag};
use canvasflow_types::config::{EngineConfig, FailurePolicy};
use canvasflow_types::event::{PauseReason, WorkflowEvent};
use canvasflow_types::graph::{WorkflowGraph, WorkflowNode};
use canvasflow_types::state::{WorkflowState, WorkflowStatus, WorkflowSummary};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::event::EventBus;

use super::builtin::research_canvas_graph;
use super::definition::GraphError;
use super::registry::{AgentRegistry, GraphRegistry};
use super::retry::RetryHandler;
use super::run::{RunHandle, RunSignal};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("workflow graph not found: {0}")]
    GraphNotFound(String),

    #[error("workflow graph already registered: {0}")]
    GraphAlreadyRegistered(String),

    #[error("invalid workflow graph: {0}")]
    InvalidGraph(#[from] GraphError),

    #[error("workflow run not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("scheduler fault: {0}")]
    SchedulerFault(String),
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Handle returned by [`WorkflowEngine::subscribe`].
///
/// Dropping it keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    run: Weak<RunHandle>,
    listener_id: u64,
}

impl Subscription {
    /// Remove the listener. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        self.run
            .upgrade()
            .is_some_and(|run| run.remove_listener(self.listener_id))
    }
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// In-memory workflow engine. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct WorkflowEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    graphs: GraphRegistry,
    agents: Arc<AgentRegistry>,
    runs: DashMap<Uuid, Arc<RunHandle>>,
    event_bus: EventBus,
    config: EngineConfig,
}

/// How one node's attempts ended.
type NodeResult = Result<StateBag, AgentError>;

enum Tick {
    /// The run is no longer `running`; the driver leaves without notifying.
    Stop,
    /// The run settled into `completed` or `paused`.
    Settled(WorkflowEvent),
    Round(Vec<String>),
}

impl WorkflowEngine {
    /// Create an engine with the built-in `research_canvas` graph registered.
    pub fn new(agents: Arc<AgentRegistry>, config: EngineConfig) -> Self {
        let engine = Self {
            inner: Arc::new(EngineInner {
                graphs: GraphRegistry::new(),
                agents,
                runs: DashMap::new(),
                event_bus: EventBus::new(config.event_bus_capacity),
                config,
            }),
        };
        if let Err(e) = engine.register_graph(research_canvas_graph()) {
            error!(error = %e, "failed to register built-in graph");
        }
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn agents(&self) -> &Arc<AgentRegistry> {
        &self.inner.agents
    }

    /// Receive every `WorkflowEvent` published from now on, across all runs.
    pub fn subscribe_events(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.inner.event_bus.subscribe()
    }

    // -- graphs -------------------------------------------------------------

    /// Validate and register a graph. Graphs are immutable once registered.
    pub fn register_graph(&self, graph: WorkflowGraph) -> Result<(), EngineError> {
        let graph = self.inner.graphs.register(graph)?;
        info!(graph_id = %graph.id, nodes = graph.nodes.len(), "workflow graph registered");
        Ok(())
    }

    pub fn get_graph(&self, id: &str) -> Option<Arc<WorkflowGraph>> {
        self.inner.graphs.get(id)
    }

    pub fn graph_ids(&self) -> Vec<String> {
        self.inner.graphs.ids()
    }

    // -- runs ---------------------------------------------------------------

    fn run(&self, id: Uuid) -> Option<Arc<RunHandle>> {
        self.inner.runs.get(&id).map(|r| Arc::clone(r.value()))
    }

    /// Start a run of `graph_id` and return its id immediately.
    ///
    /// The run is `running` when this returns; a background driver executes
    /// it. Must be called from within a Tokio runtime.
    pub fn start_workflow(&self, graph_id: &str, input: StateBag) -> Result<Uuid, EngineError> {
        let graph = self
            .inner
            .graphs
            .get(graph_id)
            .ok_or_else(|| EngineError::GraphNotFound(graph_id.to_string()))?;

        let id = Uuid::now_v7();
        let mut state = WorkflowState::new(id, &graph, input, Utc::now());
        state.status = WorkflowStatus::Running;
        state.current_node = Some(graph.entry_node.clone());

        let run = Arc::new(RunHandle::new(Arc::clone(&graph), state));
        run.update_if(|slot| {
            slot.driver_active = true;
            false
        });
        self.inner.runs.insert(id, Arc::clone(&run));

        info!(run_id = %id, graph_id, "workflow started");
        self.inner.event_bus.publish(WorkflowEvent::RunStarted {
            run_id: id,
            graph_id: graph_id.to_string(),
        });

        self.inner.spawn_driver(run);
        Ok(id)
    }

    /// Snapshot of a run, or `None` for an unknown id.
    pub fn get_workflow(&self, id: Uuid) -> Option<WorkflowState> {
        self.run(id).map(|run| run.snapshot())
    }

    /// Summaries of every run, oldest first.
    pub fn list_workflows(&self) -> Vec<WorkflowSummary> {
        let mut runs: Vec<WorkflowSummary> = self
            .inner
            .runs
            .iter()
            .map(|r| r.value().read(|slot| slot.state.summary()))
            .collect();
        runs.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        runs
    }

    /// Pause a `running` run. Returns whether the status changed.
    ///
    /// A round already in flight still finishes; the driver stops before
    /// computing the next one.
    pub fn pause_workflow(&self, id: Uuid) -> bool {
        let Some(run) = self.run(id) else {
            return false;
        };
        let paused = run.update_if(|slot| {
            if slot.state.status != WorkflowStatus::Running {
                return false;
            }
            slot.state.status = WorkflowStatus::Paused;
            true
        });
        if paused {
            info!(run_id = %id, "workflow paused");
            self.inner.event_bus.publish(WorkflowEvent::RunPaused {
                run_id: id,
                reason: PauseReason::Requested,
            });
        }
        paused
    }

    /// Resume a `paused` run. Returns whether the status changed.
    ///
    /// A new driver is spawned unless the previous one is still finishing
    /// its round, in which case that driver simply carries on.
    pub fn resume_workflow(&self, id: Uuid) -> bool {
        let Some(run) = self.run(id) else {
            return false;
        };
        let mut spawn = false;
        let resumed = run.update_if(|slot| {
            if slot.state.status != WorkflowStatus::Paused {
                return false;
            }
            slot.state.status = WorkflowStatus::Running;
            if !slot.driver_active {
                slot.driver_active = true;
                spawn = true;
            }
            true
        });
        if resumed {
            info!(run_id = %id, new_driver = spawn, "workflow resumed");
            self.inner
                .event_bus
                .publish(WorkflowEvent::RunResumed { run_id: id });
        }
        if spawn {
            self.inner.spawn_driver(run);
        }
        resumed
    }

    /// Call `listener` with the full run state on every node or run status
    /// change, in registration order.
    ///
    /// Listeners run synchronously on the thread that made the change and
    /// should return quickly.
    pub fn subscribe<F>(&self, id: Uuid, listener: F) -> Result<Subscription, EngineError>
    where
        F: Fn(&WorkflowState) + Send + Sync + 'static,
    {
        let run = self.run(id).ok_or(EngineError::WorkflowNotFound(id))?;
        let listener_id = run.add_listener(Arc::new(listener));
        debug!(run_id = %id, listener_id, "listener subscribed");
        Ok(Subscription {
            run: Arc::downgrade(&run),
            listener_id,
        })
    }

    /// Wait until the run is no longer `running` and its driver has exited,
    /// then return its state.
    pub async fn wait_until_settled(&self, id: Uuid) -> Result<WorkflowState, EngineError> {
        let run = self.run(id).ok_or(EngineError::WorkflowNotFound(id))?;
        let mut signal = run.watch();
        signal
            .wait_for(RunSignal::is_settled)
            .await
            .map_err(|_| EngineError::SchedulerFault(format!("run {id} signal closed")))?;
        Ok(run.snapshot())
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("graphs", &self.inner.graphs.len())
            .field("runs", &self.inner.runs.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

fn elapsed_ms(since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u64 {
    since
        .map(|start| (now - start).num_milliseconds().max(0) as u64)
        .unwrap_or(0)
}

impl EngineInner {
    fn spawn_driver(self: &Arc<Self>, run: Arc<RunHandle>) {
        let (run_id, graph_id) = run.read(|slot| (slot.state.id, slot.state.graph_id.clone()));
        let span = info_span!(
            "workflow.drive",
            workflow.run_id = %run_id,
            workflow.graph_id = %graph_id,
        );
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.drive(run).await }.instrument(span));
    }

    async fn drive(&self, run: Arc<RunHandle>) {
        let graph = Arc::clone(run.graph());
        loop {
            let mut tick = Tick::Stop;
            run.update_if(|slot| {
                if slot.state.status != WorkflowStatus::Running {
                    slot.driver_active = false;
                    return false;
                }

                let ready = slot.state.ready_nodes(graph.node_ids());
                if !ready.is_empty() {
                    tick = Tick::Round(ready);
                    return false;
                }

                let now = Utc::now();
                let run_id = slot.state.id;
                slot.driver_active = false;
                if slot.state.all_completed() {
                    slot.state.finish(WorkflowStatus::Completed, None, now);
                    tick = Tick::Settled(WorkflowEvent::RunCompleted {
                        run_id,
                        duration_ms: elapsed_ms(Some(slot.state.start_time), now),
                        nodes_completed: slot.state.completed_nodes.len() as u32,
                    });
                } else {
                    slot.state.status = WorkflowStatus::Paused;
                    tick = Tick::Settled(WorkflowEvent::RunPaused {
                        run_id,
                        reason: PauseReason::Stalled {
                            blocked_nodes: slot.state.pending_nodes(graph.node_ids()),
                            failed_nodes: slot.state.failed_nodes(graph.node_ids()),
                        },
                    });
                }
                true
            });

            match tick {
                Tick::Stop => {
                    debug!("driver stopping, run no longer running");
                    return;
                }
                Tick::Settled(event) => {
                    match &event {
                        WorkflowEvent::RunCompleted { duration_ms, .. } => {
                            info!(duration_ms, "workflow completed");
                        }
                        WorkflowEvent::RunPaused { reason, .. } => {
                            warn!(?reason, "workflow stalled, no node is ready");
                        }
                        _ => {}
                    }
                    self.event_bus.publish(event);
                    return;
                }
                Tick::Round(ready) => {
                    debug!(ready = ?ready, "executing round");
                    if let Err(fault) = self.run_round(&run, &graph, &ready).await {
                        self.fail_run(&run, &fault);
                        return;
                    }
                }
            }
        }
    }

    /// Record a driver fault as a run-level error and release the run.
    fn fail_run(&self, run: &RunHandle, fault: &EngineError) {
        let message = fault.to_string();
        error!(error = %message, "workflow failed");
        let mut run_id = Uuid::nil();
        run.update(|slot| {
            run_id = slot.state.id;
            slot.state
                .finish(WorkflowStatus::Error, Some(message.clone()), Utc::now());
            slot.driver_active = false;
        });
        self.event_bus.publish(WorkflowEvent::RunFailed {
            run_id,
            error: message,
        });
    }

    async fn run_round(
        &self,
        run: &RunHandle,
        graph: &WorkflowGraph,
        ready: &[String],
    ) -> Result<(), EngineError> {
        let nodes: Vec<&WorkflowNode> = ready.iter().filter_map(|id| graph.node(id)).collect();

        if self.config.parallel_ready_nodes && nodes.len() > 1 {
            let started: Vec<&WorkflowNode> = nodes
                .into_iter()
                .filter(|node| self.start_node(run, node))
                .collect();
            let results = join_all(started.iter().map(|node| self.attempt_node(run, node))).await;

            let mut first_fault = None;
            for (node, result) in started.into_iter().zip(results) {
                match result {
                    Ok(result) => self.finish_node(run, node, result),
                    Err(fault) => {
                        self.abort_node(run, node, &fault);
                        first_fault.get_or_insert(fault);
                    }
                }
            }
            return first_fault.map_or(Ok(()), Err);
        }

        for node in nodes {
            if !self.start_node(run, node) {
                break;
            }
            match self.attempt_node(run, node).await {
                Ok(result) => self.finish_node(run, node, result),
                Err(fault) => {
                    self.abort_node(run, node, &fault);
                    return Err(fault);
                }
            }
        }
        Ok(())
    }

    /// Mark a node `running`. Returns `false` once the run has terminated.
    fn start_node(&self, run: &RunHandle, node: &WorkflowNode) -> bool {
        let mut run_id = Uuid::nil();
        let started = run.update_if(|slot| {
            run_id = slot.state.id;
            !slot.state.status.is_terminal() && slot.state.start_node(&node.id, Utc::now())
        });
        if started {
            info!(node_id = %node.id, agent = %node.agent_name, "node started");
            self.event_bus.publish(WorkflowEvent::NodeStarted {
                run_id,
                node_id: node.id.clone(),
                agent_name: node.agent_name.clone(),
            });
        }
        started
    }

    /// Run the node's agent until it succeeds or retries are exhausted.
    ///
    /// The outer `Err` is a scheduler fault; the inner result is the node's
    /// own outcome.
    async fn attempt_node(
        &self,
        run: &RunHandle,
        node: &WorkflowNode,
    ) -> Result<NodeResult, EngineError> {
        let agent = match self.agents.resolve(&node.agent_name) {
            Ok(agent) => agent,
            Err(e) => return Ok(Err(e)),
        };
        let policy = RetryHandler::policy_for(node, &self.config);
        let limit = RetryHandler::timeout_for(node, &self.config);

        loop {
            let mut attempt = 0;
            let mut ctx = AgentContext::default();
            run.update_if(|slot| {
                attempt = slot.state.record_attempt(&node.id);
                ctx = AgentContext {
                    node_id: node.id.clone(),
                    workflow_id: slot.state.id,
                    input: slot
                        .state
                        .node_states
                        .get(&node.id)
                        .and_then(|n| n.input.clone())
                        .unwrap_or_default(),
                    global_state: slot.state.global_state.clone(),
                };
                false
            });
            let run_id = ctx.workflow_id;

            debug!(node_id = %node.id, attempt, "invoking agent");
            let agent = Arc::clone(&agent);
            let call = async move {
                match limit {
                    Some(limit) => tokio::time::timeout(limit, agent.execute(ctx))
                        .await
                        .unwrap_or_else(|_| {
                            Err(AgentError::Timeout {
                                secs: limit.as_secs(),
                            })
                        }),
                    None => agent.execute(ctx).await,
                }
            };
            let result = tokio::spawn(call).await.map_err(|e| {
                EngineError::SchedulerFault(format!(
                    "agent '{}' for node '{}' aborted: {e}",
                    node.agent_name, node.id
                ))
            })?;

            match result {
                Ok(output) => return Ok(Ok(output)),
                Err(err) if RetryHandler::should_retry(&policy, attempt, &err) => {
                    let delay = RetryHandler::delay(&policy);
                    warn!(
                        node_id = %node.id,
                        attempt,
                        max_attempts = policy.max_attempts,
                        error = %err,
                        "node attempt failed, retrying"
                    );
                    self.event_bus.publish(WorkflowEvent::NodeRetrying {
                        run_id,
                        node_id: node.id.clone(),
                        attempt,
                        error: err.to_string(),
                        delay_secs: policy.delay_seconds,
                    });
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(err) => return Ok(Err(err)),
            }
        }
    }

    /// Apply a node's outcome to the run state.
    fn finish_node(&self, run: &RunHandle, node: &WorkflowNode, result: NodeResult) {
        let now = Utc::now();
        match result {
            Ok(output) => {
                let mut event = None;
                run.update_if(|slot| {
                    let started = slot.state.node_states.get(&node.id).and_then(|n| n.start_time);
                    event = Some(WorkflowEvent::NodeCompleted {
                        run_id: slot.state.id,
                        node_id: node.id.clone(),
                        duration_ms: elapsed_ms(started, now),
                    });
                    slot.state.complete_node(&node.id, output, now)
                });
                info!(node_id = %node.id, "node completed");
                if let Some(event) = event {
                    self.event_bus.publish(event);
                }
            }
            Err(err) => {
                let message = err.to_string();
                let mut events = Vec::new();
                run.update_if(|slot| {
                    let run_id = slot.state.id;
                    if !slot.state.fail_node(&node.id, message.clone(), now) {
                        return false;
                    }
                    let attempts = slot.state.node_states.get(&node.id).map_or(0, |n| n.attempts);
                    events.push(WorkflowEvent::NodeFailed {
                        run_id,
                        node_id: node.id.clone(),
                        error: message.clone(),
                        attempts,
                    });
                    if self.config.failure_policy == FailurePolicy::FailRun
                        && !slot.state.status.is_terminal()
                    {
                        let run_error = format!("node '{}' failed: {message}", node.id);
                        slot.state
                            .finish(WorkflowStatus::Error, Some(run_error.clone()), now);
                        events.push(WorkflowEvent::RunFailed {
                            run_id,
                            error: run_error,
                        });
                    }
                    true
                });
                warn!(node_id = %node.id, error = %message, "node failed");
                for event in events {
                    self.event_bus.publish(event);
                }
            }
        }
    }

    /// Mark a node `error` after a scheduler fault during its execution.
    fn abort_node(&self, run: &RunHandle, node: &WorkflowNode, fault: &EngineError) {
        run.update_if(|slot| slot.state.fail_node(&node.id, fault.to_string(), Utc::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::agent::{Agent, FailingAgent, FnAgent, StaticAgent};
    use crate::workflow::builtin::{RESEARCH_CANVAS, RESEARCH_NODES, placeholder_research_agents};
    use crate::workflow::dag::is_topological_order;
    use canvasflow_types::graph::RetryPolicy;
    use canvasflow_types::state::NodeStatus;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn bag(value: Value) -> StateBag {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected a JSON object"),
        }
    }

    fn query(q: &str) -> StateBag {
        bag(json!({ "query": q }))
    }

    /// Every research node backed by an agent returning `{}`.
    fn stub_research_agents() -> AgentRegistry {
        let agents = AgentRegistry::new();
        for name in RESEARCH_NODES {
            agents.register(name, StaticAgent::empty());
        }
        agents
    }

    fn engine(agents: AgentRegistry) -> WorkflowEngine {
        WorkflowEngine::new(Arc::new(agents), EngineConfig::default())
    }

    fn engine_with(agents: AgentRegistry, config: EngineConfig) -> WorkflowEngine {
        WorkflowEngine::new(Arc::new(agents), config)
    }

    /// Two independent roots feeding a join node.
    fn diamond_graph() -> WorkflowGraph {
        WorkflowGraph::new(
            "fan_in",
            "Fan in",
            "left",
            vec![
                WorkflowNode::new("left", "Left", "left"),
                WorkflowNode::new("right", "Right", "right"),
                WorkflowNode::new("join", "Join", "join").depends_on(["left", "right"]),
            ],
        )
        .with_derived_edges()
    }

    fn status_log(engine: &WorkflowEngine, id: Uuid) -> Arc<Mutex<Vec<WorkflowStatus>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        engine
            .subscribe(id, move |state| sink.lock().unwrap().push(state.status))
            .unwrap();
        log
    }

    struct PanickingAgent;

    impl Agent for PanickingAgent {
        async fn execute(&self, ctx: AgentContext) -> Result<StateBag, AgentError> {
            panic!("agent bug in {}", ctx.node_id)
        }
    }

    // -- registry -----------------------------------------------------------

    #[tokio::test]
    async fn builtin_graph_is_registered() {
        let engine = engine(AgentRegistry::new());
        assert_eq!(engine.graph_ids(), vec![RESEARCH_CANVAS]);
        let graph = engine.get_graph(RESEARCH_CANVAS).unwrap();
        assert_eq!(graph.nodes.len(), 6);
        assert!(engine.get_graph("nope").is_none());
    }

    #[tokio::test]
    async fn register_graph_rejects_duplicates_and_cycles() {
        let engine = engine(AgentRegistry::new());
        engine.register_graph(diamond_graph()).unwrap();
        assert!(matches!(
            engine.register_graph(diamond_graph()),
            Err(EngineError::GraphAlreadyRegistered(_))
        ));

        let cyclic = WorkflowGraph::new(
            "loop",
            "Loop",
            "a",
            vec![
                WorkflowNode::new("a", "A", "x"),
                WorkflowNode::new("b", "B", "x").depends_on(["a", "c"]),
                WorkflowNode::new("c", "C", "x").depends_on(["b"]),
            ],
        );
        let err = engine.register_graph(cyclic).unwrap_err();
        assert!(matches!(err, EngineError::InvalidGraph(GraphError::CyclicGraph(_))));
        assert_eq!(engine.graph_ids(), vec!["fan_in", RESEARCH_CANVAS]);
    }

    // -- start / get ----------------------------------------------------------

    #[tokio::test]
    async fn unknown_graph_fails_without_creating_a_run() {
        let engine = engine(stub_research_agents());
        let err = engine.start_workflow("missing", StateBag::new()).unwrap_err();
        assert!(matches!(err, EngineError::GraphNotFound(ref id) if id == "missing"));
        assert!(engine.list_workflows().is_empty());
    }

    #[tokio::test]
    async fn start_returns_running_state_immediately() {
        let engine = engine(stub_research_agents());
        let id = engine.start_workflow(RESEARCH_CANVAS, query("rust")).unwrap();

        let state = engine.get_workflow(id).unwrap();
        assert_eq!(state.status, WorkflowStatus::Running);
        assert_eq!(state.current_node.as_deref(), Some("query_analyzer"));
        assert_eq!(state.node_states.len(), 6);
        assert!(state.node_states.values().all(|n| n.status == NodeStatus::Pending));
        assert_eq!(state.global_state["query"], json!("rust"));
        assert_eq!(
            state.node_states["query_analyzer"].input.as_ref().unwrap()["query"],
            json!("rust")
        );
        assert!(state.node_states["web_searcher"].input.is_none());
        assert!(engine.get_workflow(Uuid::now_v7()).is_none());
    }

    #[tokio::test]
    async fn linear_graph_with_stubs_completes_in_order() {
        let engine = engine(stub_research_agents());
        let id = engine.start_workflow(RESEARCH_CANVAS, query("rust")).unwrap();

        let state = engine.wait_until_settled(id).await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(state.completed_nodes, RESEARCH_NODES.to_vec());
        assert!(state.end_time.is_some());
        assert!(state.error.is_none());

        let graph = engine.get_graph(RESEARCH_CANVAS).unwrap();
        assert!(is_topological_order(&graph, &state.completed_nodes));
        for node in state.node_states.values() {
            assert_eq!(node.status, NodeStatus::Completed);
            assert_eq!(node.progress, 100);
            assert_eq!(node.attempts, 1);
            assert!(node.start_time.is_some() && node.end_time.is_some());
        }
    }

    #[tokio::test]
    async fn placeholder_agents_produce_a_review() {
        let engine = engine(placeholder_research_agents());
        let id = engine
            .start_workflow(RESEARCH_CANVAS, query("Ownership in Rust"))
            .unwrap();

        let state = engine.wait_until_settled(id).await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(state.global_state["main_topic"], json!("Ownership in Rust"));
        assert!(state.global_state["article"].as_str().unwrap().starts_with("# Ownership"));
        assert_eq!(state.global_state["overall_score"], json!(7.5));
    }

    #[tokio::test]
    async fn later_results_overwrite_earlier_keys() {
        let agents = AgentRegistry::new();
        agents.register("first", StaticAgent::new(bag(json!({"k": 1, "a": true}))));
        agents.register("second", StaticAgent::new(bag(json!({"k": 2, "b": true}))));
        let engine = engine(agents);
        engine
            .register_graph(WorkflowGraph::new(
                "overwrite",
                "Overwrite",
                "one",
                vec![
                    WorkflowNode::new("one", "One", "first"),
                    WorkflowNode::new("two", "Two", "second").depends_on(["one"]),
                ],
            ))
            .unwrap();

        let id = engine.start_workflow("overwrite", bag(json!({"k": 0}))).unwrap();
        let state = engine.wait_until_settled(id).await.unwrap();
        assert_eq!(state.global_state["k"], json!(2));
        assert_eq!(state.global_state["a"], json!(true));
        assert_eq!(state.global_state["b"], json!(true));
        assert_eq!(state.node_states["one"].output.as_ref().unwrap()["k"], json!(1));
    }

    #[tokio::test]
    async fn join_waits_for_both_roots_and_sees_both_results() {
        let agents = AgentRegistry::new();
        agents.register("left", StaticAgent::new(bag(json!({"left": "L"}))));
        agents.register("right", StaticAgent::new(bag(json!({"right": "R"}))));
        agents.register(
            "join",
            FnAgent::new(|ctx: AgentContext| async move {
                let joined = format!(
                    "{}{}",
                    ctx.lookup_str("left").unwrap_or("?"),
                    ctx.lookup_str("right").unwrap_or("?")
                );
                Ok(bag(json!({ "joined": joined })))
            }),
        );
        let engine = engine(agents);
        engine.register_graph(diamond_graph()).unwrap();

        let id = engine.start_workflow("fan_in", StateBag::new()).unwrap();
        let violations = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&violations);
        engine
            .subscribe(id, move |state| {
                let join = &state.node_states["join"];
                let deps_done = join
                    .dependencies
                    .iter()
                    .all(|d| state.node_states[d].status == NodeStatus::Completed);
                if join.status != NodeStatus::Pending && !deps_done {
                    sink.lock().unwrap().push(state.clone());
                }
            })
            .unwrap();

        let state = engine.wait_until_settled(id).await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(state.global_state["joined"], json!("LR"));
        assert_eq!(state.completed_nodes, vec!["left", "right", "join"]);
        assert!(violations.lock().unwrap().is_empty());
    }

    // -- failures -------------------------------------------------------------

    #[tokio::test]
    async fn failed_node_strands_dependants_and_pauses_run() {
        let agents = stub_research_agents();
        agents.register("web_searcher", FailingAgent::new("search backend down"));
        let engine = engine(agents);

        let id = engine.start_workflow(RESEARCH_CANVAS, query("rust")).unwrap();
        let state = engine.wait_until_settled(id).await.unwrap();

        assert_eq!(state.status, WorkflowStatus::Paused);
        assert_eq!(state.completed_nodes, vec!["query_analyzer"]);
        let searcher = &state.node_states["web_searcher"];
        assert_eq!(searcher.status, NodeStatus::Error);
        assert!(searcher.error.as_deref().unwrap().contains("search backend down"));
        assert_eq!(state.node_states["source_validator"].status, NodeStatus::Pending);
        assert!(state.error.is_none());
        assert!(state.end_time.is_none());
    }

    #[tokio::test]
    async fn resuming_a_stalled_run_pauses_it_again() {
        let agents = stub_research_agents();
        agents.register("web_searcher", FailingAgent::new("down"));
        let engine = engine(agents);
        let id = engine.start_workflow(RESEARCH_CANVAS, query("rust")).unwrap();
        engine.wait_until_settled(id).await.unwrap();

        let log = status_log(&engine, id);
        assert!(engine.resume_workflow(id));
        let state = engine.wait_until_settled(id).await.unwrap();

        assert_eq!(state.status, WorkflowStatus::Paused);
        assert_eq!(state.completed_nodes, vec!["query_analyzer"]);
        assert_eq!(
            *log.lock().unwrap(),
            vec![WorkflowStatus::Running, WorkflowStatus::Paused]
        );
    }

    #[tokio::test]
    async fn fail_run_policy_marks_run_error() {
        let agents = stub_research_agents();
        agents.register("web_searcher", FailingAgent::new("search backend down"));
        let config = EngineConfig {
            failure_policy: FailurePolicy::FailRun,
            ..Default::default()
        };
        let engine = engine_with(agents, config);

        let id = engine.start_workflow(RESEARCH_CANVAS, query("rust")).unwrap();
        let state = engine.wait_until_settled(id).await.unwrap();

        assert_eq!(state.status, WorkflowStatus::Error);
        assert!(state.end_time.is_some());
        let error = state.error.unwrap();
        assert!(error.contains("web_searcher") && error.contains("search backend down"));
        assert_eq!(state.node_states["source_validator"].status, NodeStatus::Pending);

        // Terminal: neither pause nor resume apply.
        assert!(!engine.pause_workflow(id));
        assert!(!engine.resume_workflow(id));
    }

    #[tokio::test]
    async fn missing_agent_is_a_node_error() {
        let engine = engine(AgentRegistry::new());
        engine
            .register_graph(WorkflowGraph::new(
                "ghostly",
                "Ghostly",
                "a",
                vec![WorkflowNode::new("a", "A", "ghost").with_retry(RetryPolicy::new(3, 0))],
            ))
            .unwrap();

        let id = engine.start_workflow("ghostly", StateBag::new()).unwrap();
        let state = engine.wait_until_settled(id).await.unwrap();

        assert_eq!(state.status, WorkflowStatus::Paused);
        let node = &state.node_states["a"];
        assert_eq!(node.status, NodeStatus::Error);
        assert_eq!(node.error.as_deref(), Some("agent not found: ghost"));
        assert_eq!(node.attempts, 0);
    }

    #[tokio::test]
    async fn panicking_agent_is_a_scheduler_fault() {
        let agents = stub_research_agents();
        agents.register("source_validator", PanickingAgent);
        let engine = engine(agents);

        let id = engine.start_workflow(RESEARCH_CANVAS, query("rust")).unwrap();
        let state = engine.wait_until_settled(id).await.unwrap();

        assert_eq!(state.status, WorkflowStatus::Error);
        assert!(state.error.as_deref().unwrap().starts_with("scheduler fault"));
        assert!(state.end_time.is_some());
        assert_eq!(state.node_states["source_validator"].status, NodeStatus::Error);
        assert_eq!(state.completed_nodes, vec!["query_analyzer", "web_searcher"]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_agent_times_out() {
        let agents = AgentRegistry::new();
        agents.register(
            "slow",
            FnAgent::new(|_ctx: AgentContext| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(StateBag::new())
            }),
        );
        let engine = engine(agents);
        engine
            .register_graph(WorkflowGraph::new(
                "slow",
                "Slow",
                "a",
                vec![WorkflowNode::new("a", "A", "slow").with_timeout(1)],
            ))
            .unwrap();

        let id = engine.start_workflow("slow", StateBag::new()).unwrap();
        let state = engine.wait_until_settled(id).await.unwrap();

        assert_eq!(state.status, WorkflowStatus::Paused);
        assert_eq!(
            state.node_states["a"].error.as_deref(),
            Some("agent timed out after 1s")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn flaky_agent_succeeds_within_retry_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let agents = AgentRegistry::new();
        agents.register(
            "flaky",
            FnAgent::new(move |_ctx: AgentContext| {
                let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if call < 3 {
                        Err(AgentError::failed(format!("attempt {call} failed")))
                    } else {
                        Ok(bag(json!({ "ok": true })))
                    }
                }
            }),
        );
        let engine = engine(agents);
        engine
            .register_graph(WorkflowGraph::new(
                "flaky",
                "Flaky",
                "a",
                vec![WorkflowNode::new("a", "A", "flaky").with_retry(RetryPolicy::new(3, 5))],
            ))
            .unwrap();

        let mut events = engine.subscribe_events();
        let started = tokio::time::Instant::now();
        let id = engine.start_workflow("flaky", StateBag::new()).unwrap();
        let state = engine.wait_until_settled(id).await.unwrap();

        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(state.node_states["a"].attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(10));

        let mut retries = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let WorkflowEvent::NodeRetrying { attempt, .. } = event {
                retries.push(attempt);
            }
        }
        assert_eq!(retries, vec![1, 2]);
    }

    #[tokio::test]
    async fn exhausted_retries_fail_the_node() {
        let agents = AgentRegistry::new();
        agents.register("bad", FailingAgent::new("still broken"));
        let engine = engine(agents);
        engine
            .register_graph(WorkflowGraph::new(
                "bad",
                "Bad",
                "a",
                vec![WorkflowNode::new("a", "A", "bad").with_retry(RetryPolicy::new(2, 0))],
            ))
            .unwrap();

        let id = engine.start_workflow("bad", StateBag::new()).unwrap();
        let state = engine.wait_until_settled(id).await.unwrap();
        assert_eq!(state.node_states["a"].attempts, 2);
        assert_eq!(state.node_states["a"].status, NodeStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_rounds_merge_in_declaration_order() {
        let agents = AgentRegistry::new();
        for (name, delay) in [("left", 10), ("right", 5)] {
            agents.register(
                name,
                FnAgent::new(move |_ctx: AgentContext| async move {
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                    Ok(bag(json!({ "winner": name, name: true })))
                }),
            );
        }
        agents.register("join", StaticAgent::empty());
        let config = EngineConfig {
            parallel_ready_nodes: true,
            ..Default::default()
        };
        let engine = engine_with(agents, config);
        engine.register_graph(diamond_graph()).unwrap();

        let started = tokio::time::Instant::now();
        let id = engine.start_workflow("fan_in", StateBag::new()).unwrap();
        let state = engine.wait_until_settled(id).await.unwrap();

        assert_eq!(state.status, WorkflowStatus::Completed);
        assert!(started.elapsed() < Duration::from_secs(15));
        assert_eq!(state.completed_nodes, vec!["left", "right", "join"]);
        assert_eq!(state.global_state["winner"], json!("right"));
        assert_eq!(state.global_state["left"], json!(true));
    }

    // -- pause / resume -------------------------------------------------------

    #[tokio::test]
    async fn pause_after_first_node_then_resume_to_completion() {
        let engine = engine(stub_research_agents());
        let id = engine.start_workflow(RESEARCH_CANVAS, query("rust")).unwrap();

        let pauser = engine.clone();
        let subscription = engine
            .subscribe(id, move |state| {
                if state.status == WorkflowStatus::Running && state.completed_nodes.len() == 1 {
                    pauser.pause_workflow(state.id);
                }
            })
            .unwrap();

        let state = engine.wait_until_settled(id).await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Paused);
        assert_eq!(engine.get_workflow(id).unwrap().status, WorkflowStatus::Paused);
        assert_eq!(state.completed_nodes, vec!["query_analyzer"]);
        assert_eq!(state.node_states["web_searcher"].status, NodeStatus::Pending);

        assert!(subscription.unsubscribe());
        assert!(engine.resume_workflow(id));
        assert_eq!(engine.get_workflow(id).unwrap().status, WorkflowStatus::Running);
        let state = engine.wait_until_settled(id).await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(state.completed_nodes, RESEARCH_NODES.to_vec());
    }

    #[tokio::test]
    async fn pause_before_driver_runs_and_resume_reuses_it() {
        let engine = engine(stub_research_agents());
        let id = engine.start_workflow(RESEARCH_CANVAS, query("rust")).unwrap();

        assert!(engine.pause_workflow(id));
        assert!(!engine.pause_workflow(id));
        assert!(engine.resume_workflow(id));

        let state = engine.wait_until_settled(id).await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(state.completed_nodes, RESEARCH_NODES.to_vec());
    }

    #[tokio::test]
    async fn pause_and_resume_in_wrong_state_are_silent_no_ops() {
        let engine = engine(stub_research_agents());
        let id = engine.start_workflow(RESEARCH_CANVAS, query("rust")).unwrap();
        engine.wait_until_settled(id).await.unwrap();

        let log = status_log(&engine, id);
        assert!(!engine.pause_workflow(id));
        assert!(!engine.resume_workflow(id));
        assert!(!engine.pause_workflow(Uuid::now_v7()));
        assert!(!engine.resume_workflow(Uuid::now_v7()));

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(engine.get_workflow(id).unwrap().status, WorkflowStatus::Completed);
    }

    // -- subscriptions --------------------------------------------------------

    #[tokio::test]
    async fn every_subscriber_sees_each_notification_once() {
        let engine = engine(stub_research_agents());
        let id = engine.start_workflow(RESEARCH_CANVAS, query("rust")).unwrap();
        let first = status_log(&engine, id);
        let second = status_log(&engine, id);

        engine.wait_until_settled(id).await.unwrap();

        let first = first.lock().unwrap().clone();
        let second = second.lock().unwrap().clone();
        // One "running" and one "completed" per node, then the run completion.
        assert_eq!(first.len(), 13);
        assert_eq!(first, second);
        assert_eq!(first.last(), Some(&WorkflowStatus::Completed));
    }

    #[tokio::test]
    async fn unsubscribe_stops_notifications() {
        let engine = engine(stub_research_agents());
        let id = engine.start_workflow(RESEARCH_CANVAS, query("rust")).unwrap();

        let count = Arc::new(AtomicU32::new(0));
        let sink = Arc::clone(&count);
        let subscription = engine
            .subscribe(id, move |_| {
                sink.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert!(subscription.unsubscribe());

        engine.wait_until_settled(id).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn subscribing_to_unknown_run_fails() {
        let engine = engine(stub_research_agents());
        let missing = Uuid::now_v7();
        assert!(matches!(
            engine.subscribe(missing, |_| {}),
            Err(EngineError::WorkflowNotFound(id)) if id == missing
        ));
        assert!(matches!(
            engine.wait_until_settled(missing).await,
            Err(EngineError::WorkflowNotFound(_))
        ));
    }

    #[tokio::test]
    async fn lifecycle_events_are_published() {
        let engine = engine(stub_research_agents());
        let mut events = engine.subscribe_events();
        let id = engine.start_workflow(RESEARCH_CANVAS, query("rust")).unwrap();
        engine.wait_until_settled(id).await.unwrap();

        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            assert_eq!(event.run_id(), id);
            received.push(event);
        }
        assert!(matches!(received.first(), Some(WorkflowEvent::RunStarted { .. })));
        assert!(matches!(
            received.last(),
            Some(WorkflowEvent::RunCompleted { nodes_completed: 6, .. })
        ));
        let completed = received
            .iter()
            .filter(|e| matches!(e, WorkflowEvent::NodeCompleted { .. }))
            .count();
        assert_eq!(completed, 6);
    }

    #[tokio::test]
    async fn stalled_run_reports_blocked_and_failed_nodes() {
        let agents = stub_research_agents();
        agents.register("content_analyzer", FailingAgent::new("nope"));
        let engine = engine(agents);
        let mut events = engine.subscribe_events();
        let id = engine.start_workflow(RESEARCH_CANVAS, query("rust")).unwrap();
        engine.wait_until_settled(id).await.unwrap();

        let mut reason = None;
        while let Ok(event) = events.try_recv() {
            if let WorkflowEvent::RunPaused { reason: r, .. } = event {
                reason = Some(r);
            }
        }
        assert_eq!(
            reason,
            Some(PauseReason::Stalled {
                blocked_nodes: vec!["article_writer".into(), "quality_reviewer".into()],
                failed_nodes: vec!["content_analyzer".into()],
            })
        );
    }

    #[tokio::test]
    async fn list_workflows_summarises_runs() {
        let engine = engine(stub_research_agents());
        let a = engine.start_workflow(RESEARCH_CANVAS, query("a")).unwrap();
        let b = engine.start_workflow(RESEARCH_CANVAS, query("b")).unwrap();
        engine.wait_until_settled(a).await.unwrap();
        engine.wait_until_settled(b).await.unwrap();

        let runs = engine.list_workflows();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.completed == 6 && r.total == 6));
        assert!(runs.iter().any(|r| r.id == a) && runs.iter().any(|r| r.id == b));
    }
}
