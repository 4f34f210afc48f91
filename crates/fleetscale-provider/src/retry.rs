//! Timeout and bounded-retry decorator for any provider.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use fleetscale_core::{Instance, InstanceSpec};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{ComputeProvider, ProviderFuture};

/// Longest exponent applied to the base backoff.
const MAX_BACKOFF_SHIFT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per call, including the first.
    pub max_attempts: u32,
    /// Per-attempt timeout.
    pub timeout: Option<Duration>,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            timeout: None,
            base_backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// No timeout and a single attempt: wrapping would change nothing.
    pub fn is_passthrough(&self) -> bool {
        self.max_attempts <= 1 && self.timeout.is_none()
    }

    /// Delay before attempt `attempt + 1`: `base * 2^(attempt-1)` plus up
    /// to one `base` of jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
        let exp = self.base_backoff.saturating_mul(1 << shift);
        let base_ms = self.base_backoff.as_millis() as u64;
        let jitter = if base_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..base_ms)
        };
        exp.saturating_add(Duration::from_millis(jitter))
    }
}

pub struct RetryingProvider {
    inner: Arc<dyn ComputeProvider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn ComputeProvider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn attempt<'a, T>(&self, call: ProviderFuture<'a, T>) -> ProviderResult<T> {
        match self.policy.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(ProviderError::Timeout(limit))),
            None => call.await,
        }
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run
    /// out. `call` receives the 1-based attempt number.
    async fn run<'a, T, F>(&'a self, op: &'static str, mut call: F) -> ProviderResult<T>
    where
        F: FnMut(u32) -> ProviderFuture<'a, T> + Send + 'a,
        T: Send + 'a,
    {
        let mut attempt = 1;
        loop {
            match self.attempt(call(attempt)).await {
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        op,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl ComputeProvider for RetryingProvider {
    fn kind(&self) -> &'static str {
        "retrying"
    }

    fn create<'a>(&'a self, spec: &'a InstanceSpec) -> ProviderFuture<'a, Instance> {
        let inner = &self.inner;
        Box::pin(self.run("create", move |attempt| -> ProviderFuture<'a, Instance> {
            Box::pin(async move {
                // A create that timed out may still have landed; adopt it
                // rather than booting a duplicate.
                if attempt > 1
                    && let Some(existing) = inner
                        .list()
                        .await?
                        .into_iter()
                        .find(|i| i.name == spec.name)
                {
                    debug!(name = %spec.name, id = %existing.id, "adopting instance from earlier attempt");
                    return Ok(existing);
                }
                inner.create(spec).await
            })
        }))
    }

    fn delete<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        let inner = &self.inner;
        Box::pin(self.run("delete", move |_| inner.delete(id)))
    }

    fn list(&self) -> ProviderFuture<'_, Vec<Instance>> {
        let inner = &self.inner;
        Box::pin(self.run("list", move |_| inner.list()))
    }
}
