//! Retry wrapper: exponential backoff around any provider.
//!
//! Transient failures (429/500/502/503, network, timeout) are retried up to
//! the policy's budget; everything else is returned immediately.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use taor_core::error::ProviderError;
use taor_core::message::Message;
use taor_core::provider::*;
use tracing::{info, warn};

/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based): base * 2^attempt, capped.
    ///
    /// A server-supplied hint replaces the computed delay but is still capped.
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let computed = self
            .base_delay
            .checked_mul(2u32.saturating_pow(attempt))
            .unwrap_or(self.max_delay);
        hint.unwrap_or(computed).min(self.max_delay)
    }
}

/// A provider that retries transient failures of the provider it wraps.
pub struct RetryingProvider {
    inner: Arc<dyn Provider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl Provider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn complete(
        &self,
        history: &[Message],
        tools: &[ToolDefinition],
        system_prompt: &str,
    ) -> std::result::Result<AgentResponse, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(history, tools, system_prompt).await {
                Ok(response) => {
                    if attempt > 0 {
                        info!(provider = %self.inner.name(), attempt, "Retry succeeded");
                    }
                    return Ok(response);
                }
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt, e.retry_after());
                    warn!(
                        provider = %self.inner.name(),
                        error = %e,
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Transient provider error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
