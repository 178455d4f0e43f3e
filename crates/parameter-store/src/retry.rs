//! # Gateway Retries
//!
//! Resolution itself never retries: a failed fetch fails the call. Gateways
//! that want retries wrap themselves in `RetryingGateway`, which retries
//! retryable `GatewayError`s with exponential backoff.

use crate::error::{GatewayError, RetryConfig};
use crate::gateway::ParameterGateway;
use crate::parameter::RawParameter;
use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Delays between retries: `initial_delay * multiplier^n`, capped at `max_delay`
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: RetryConfig,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(config: RetryConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay before the next retry, `None` once retries are used up
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.config.max_attempts {
            return None;
        }

        let nominal = self.nominal_delay(self.attempt);
        self.attempt += 1;

        Some(if self.config.jitter {
            equal_jitter(nominal)
        } else {
            nominal
        })
    }

    fn nominal_delay(&self, attempt: u32) -> Duration {
        let factor = self.config.backoff_multiplier.powi(attempt as i32);
        let nanos = self.config.initial_delay.as_nanos() as f64 * factor;

        if nanos >= self.config.max_delay.as_nanos() as f64 {
            self.config.max_delay
        } else {
            Duration::from_nanos(nanos as u64)
        }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

/// Half of `delay` plus a random share of the other half
fn equal_jitter(delay: Duration) -> Duration {
    let half = delay / 2;
    let spread = half.as_micros() as u64;
    half + Duration::from_micros(rand::thread_rng().gen_range(0..=spread))
}

/// Runs a gateway call, retrying it while its failures are retryable
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    total_timeout: Option<Duration>,
    policy: Option<RetryConfig>,
}

impl RetryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up once the next retry would start after `timeout` has elapsed
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout = Some(timeout);
        self
    }

    /// Use `policy` for every retryable failure instead of the per-category default
    pub fn with_policy(mut self, policy: RetryConfig) -> Self {
        self.policy = Some(policy);
        self
    }

    fn schedule_for(&self, error: &GatewayError) -> Option<RetryConfig> {
        if !error.is_retryable() {
            return None;
        }
        self.policy.clone().or_else(|| error.retry_config())
    }

    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T, GatewayError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let deadline = self.total_timeout.map(|timeout| Instant::now() + timeout);

        let mut last_error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        let Some(schedule) = self.schedule_for(&last_error) else {
            debug!(error = %last_error, "Gateway error is not retryable");
            return Err(last_error);
        };

        let retries = schedule.max_attempts;
        let mut backoff = ExponentialBackoff::new(schedule);
        debug!(
            category = ?last_error.category(),
            retries,
            "Retrying failed gateway call"
        );

        while let Some(delay) = backoff.next_delay() {
            if let (Some(deadline), Some(timeout)) = (deadline, self.total_timeout) {
                if Instant::now() + delay >= deadline {
                    warn!(attempts = backoff.attempts(), "Retry deadline reached");
                    return Err(GatewayError::Timeout {
                        message: format!("retries abandoned, last error: {last_error}"),
                        timeout,
                    });
                }
            }

            sleep(delay).await;

            match operation().await {
                Ok(value) => {
                    debug!(retries = backoff.attempts(), "Gateway call recovered");
                    return Ok(value);
                }
                Err(error) if !error.is_retryable() => return Err(error),
                Err(error) => {
                    warn!(attempt = backoff.attempts(), error = %error, "Gateway retry failed");
                    last_error = error;
                }
            }
        }

        warn!(retries, error = %last_error, "Gateway retries exhausted");
        Err(GatewayError::max_retries_exceeded(retries, &last_error))
    }
}

/// Wraps a gateway so that each fetch goes through a `RetryExecutor`
pub struct RetryingGateway<G> {
    inner: G,
    executor: RetryExecutor,
}

impl<G: ParameterGateway> RetryingGateway<G> {
    pub fn new(inner: G) -> Self {
        Self::with_executor(inner, RetryExecutor::new())
    }

    pub fn with_executor(inner: G, executor: RetryExecutor) -> Self {
        Self { inner, executor }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }
}

#[async_trait]
impl<G: ParameterGateway> ParameterGateway for RetryingGateway<G> {
    async fn fetch_flat(
        &self,
        names: &[String],
        decrypt: bool,
    ) -> Result<Vec<RawParameter>, GatewayError> {
        self.executor
            .execute(|| self.inner.fetch_flat(names, decrypt))
            .await
    }

    async fn fetch_hierarchy(
        &self,
        path: &str,
        recursive: bool,
        decrypt: bool,
    ) -> Result<Vec<RawParameter>, GatewayError> {
        self.executor
            .execute(|| self.inner.fetch_hierarchy(path, recursive, decrypt))
            .await
    }
}
