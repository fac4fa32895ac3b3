//! Agent capability trait and its type-erased wrapper.
//!
//! `Agent` uses RPITIT, so it cannot be a trait object. The same blanket-impl
//! pattern as the other boxed traits applies:
//! 1. `AgentDyn` is the object-safe twin with a boxed future
//! 2. every `T: Agent` gets `AgentDyn` for free
//! 3. `BoxAgent` wraps `Box<dyn AgentDyn>` and delegates
//!
//! Small ready-made agents (`FnAgent`, `StaticAgent`, `FailingAgent`) cover
//! closures, fixed outputs and deliberate failures.

use std::future::Future;
use std::pin::Pin;

use canvasflow_types::agent::{AgentContext, AgentError, StateBag};

/// A unit of work a workflow node delegates to.
///
/// Given the node's context, an agent returns a partial state update that the
/// engine merges into the run's global state, or fails.
pub trait Agent: Send + Sync {
    fn execute(
        &self,
        ctx: AgentContext,
    ) -> impl Future<Output = Result<StateBag, AgentError>> + Send;
}

/// Object-safe version of [`Agent`] with a boxed future.
pub trait AgentDyn: Send + Sync {
    fn execute_boxed<'a>(
        &'a self,
        ctx: AgentContext,
    ) -> Pin<Box<dyn Future<Output = Result<StateBag, AgentError>> + Send + 'a>>;
}

impl<T: Agent> AgentDyn for T {
    fn execute_boxed<'a>(
        &'a self,
        ctx: AgentContext,
    ) -> Pin<Box<dyn Future<Output = Result<StateBag, AgentError>> + Send + 'a>> {
        Box::pin(self.execute(ctx))
    }
}

/// Type-erased agent, the value type of the agent registry.
pub struct BoxAgent {
    inner: Box<dyn AgentDyn>,
}

impl BoxAgent {
    pub fn new<T: Agent + 'static>(agent: T) -> Self {
        Self {
            inner: Box::new(agent),
        }
    }

    pub async fn execute(&self, ctx: AgentContext) -> Result<StateBag, AgentError> {
        self.inner.execute_boxed(ctx).await
    }
}

impl std::fmt::Debug for BoxAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxAgent").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Ready-made agents
// ---------------------------------------------------------------------------

/// Agent backed by an async closure.
pub struct FnAgent<F> {
    f: F,
}

impl<F> FnAgent<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> Agent for FnAgent<F>
where
    F: Fn(AgentContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StateBag, AgentError>> + Send,
{
    fn execute(
        &self,
        ctx: AgentContext,
    ) -> impl Future<Output = Result<StateBag, AgentError>> + Send {
        (self.f)(ctx)
    }
}

/// Agent that always returns the same bag.
#[derive(Debug, Clone, Default)]
pub struct StaticAgent {
    output: StateBag,
}

impl StaticAgent {
    pub fn new(output: StateBag) -> Self {
        Self { output }
    }

    /// An agent that returns `{}`.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl Agent for StaticAgent {
    async fn execute(&self, _ctx: AgentContext) -> Result<StateBag, AgentError> {
        Ok(self.output.clone())
    }
}

/// Agent that always fails with the same message.
#[derive(Debug, Clone)]
pub struct FailingAgent {
    message: String,
}

impl FailingAgent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Agent for FailingAgent {
    async fn execute(&self, _ctx: AgentContext) -> Result<StateBag, AgentError> {
        Err(AgentError::failed(self.message.clone()))
    }
}
