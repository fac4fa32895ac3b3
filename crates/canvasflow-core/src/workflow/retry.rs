//! Retry and timeout resolution for node attempts.
//!
//! Stateless: every decision is a pure function of the node definition, the
//! engine config, and the attempt so far.

use std::time::Duration;

use canvasflow_types::agent::AgentError;
use canvasflow_types::config::EngineConfig;
use canvasflow_types::graph::{RetryPolicy, WorkflowNode};

/// Stateless retry handler for node failures.
pub struct RetryHandler;

impl RetryHandler {
    /// The node's own policy, else the engine default, else a single attempt.
    pub fn policy_for(node: &WorkflowNode, config: &EngineConfig) -> RetryPolicy {
        node.retry_policy
            .or(config.default_retry)
            .unwrap_or_default()
    }

    /// Whether to make another attempt after `attempt` failed with `error`.
    ///
    /// `attempt` is 1-based (the first execution is attempt 1).
    pub fn should_retry(policy: &RetryPolicy, attempt: u32, error: &AgentError) -> bool {
        error.is_retryable() && attempt < policy.max_attempts
    }

    pub fn delay(policy: &RetryPolicy) -> Duration {
        Duration::from_secs(policy.delay_seconds)
    }

    /// Per-attempt bound for a node; `None` means unbounded.
    pub fn timeout_for(node: &WorkflowNode, config: &EngineConfig) -> Option<Duration> {
        match node.timeout_seconds.unwrap_or(config.default_node_timeout_secs) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> WorkflowNode {
        WorkflowNode::new("n", "N", "agent")
    }

    #[test]
    fn default_policy_is_single_attempt() {
        let policy = RetryHandler::policy_for(&node(), &EngineConfig::default());
        assert_eq!(policy.max_attempts, 1);
        assert!(!RetryHandler::should_retry(&policy, 1, &AgentError::failed("x")));
    }

    #[test]
    fn node_policy_overrides_engine_default() {
        let config = EngineConfig {
            default_retry: Some(RetryPolicy::new(5, 1)),
            ..Default::default()
        };
        let with_own = node().with_retry(RetryPolicy::new(2, 0));
        assert_eq!(RetryHandler::policy_for(&with_own, &config).max_attempts, 2);
        assert_eq!(RetryHandler::policy_for(&node(), &config).max_attempts, 5);
    }

    #[test]
    fn should_retry_until_max_attempts() {
        let policy = RetryPolicy::new(3, 0);
        let err = AgentError::Timeout { secs: 1 };
        assert!(RetryHandler::should_retry(&policy, 1, &err));
        assert!(RetryHandler::should_retry(&policy, 2, &err));
        assert!(!RetryHandler::should_retry(&policy, 3, &err));
    }

    #[test]
    fn missing_agent_is_never_retried() {
        let policy = RetryPolicy::new(3, 0);
        let err = AgentError::NotFound("ghost".into());
        assert!(!RetryHandler::should_retry(&policy, 1, &err));
    }

    #[test]
    fn delay_uses_policy_seconds() {
        assert_eq!(RetryHandler::delay(&RetryPolicy::new(2, 7)), Duration::from_secs(7));
    }

    #[test]
    fn timeout_resolution() {
        let config = EngineConfig::default();
        assert_eq!(
            RetryHandler::timeout_for(&node().with_timeout(30), &config),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            RetryHandler::timeout_for(&node(), &config),
            Some(Duration::from_secs(300))
        );

        let unbounded = EngineConfig {
            default_node_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(RetryHandler::timeout_for(&node(), &unbounded), None);
    }
}
