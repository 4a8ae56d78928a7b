//! Rate limiting and retry for logo source requests
//!
//! Each source gets its own token bucket so a throttled favicon service never
//! slows down the primary lookup. Retries apply only to failures tagged as
//! transient; everything else is returned to the caller immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};
use crate::config::{RetryConfig, SourceConfig};

/// A token bucket rate limiter for controlling request rates
#[derive(Debug)]
pub struct RateLimiter {
    /// Tokens available in the bucket
    tokens: f64,
    /// Maximum tokens (bucket capacity)
    max_tokens: f64,
    /// Tokens added per second (refill rate)
    refill_rate: f64,
    /// Last time tokens were updated
    last_update: Instant,
    /// Whether rate limiting is enabled (false if rate is 0/unlimited)
    enabled: bool,
}

impl RateLimiter {
    /// Create a new rate limiter with the specified requests per second.
    /// If requests_per_second is 0, rate limiting is disabled.
    pub fn new(requests_per_second: u32) -> Self {
        let enabled = requests_per_second > 0;
        let max_tokens = if enabled {
            // Burst of up to one second worth of requests
            requests_per_second as f64
        } else {
            f64::INFINITY
        };

        Self {
            tokens: max_tokens,
            max_tokens,
            refill_rate: requests_per_second as f64,
            last_update: Instant::now(),
            enabled,
        }
    }

    fn refill(&mut self) {
        if !self.enabled {
            return;
        }

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_update = now;
    }

    /// Try to acquire a token, returning time to wait if not available
    pub fn try_acquire(&mut self) -> Option<Duration> {
        if !self.enabled {
            return None;
        }

        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            let wait_secs = (1.0 - self.tokens) / self.refill_rate;
            Some(Duration::from_secs_f64(wait_secs))
        }
    }

    /// Acquire a token, waiting if necessary
    pub async fn acquire(&mut self) {
        loop {
            match self.try_acquire() {
                None => return,
                Some(wait_duration) => {
                    debug!("Rate limiter waiting {:?} for token", wait_duration);
                    sleep(wait_duration).await;
                }
            }
        }
    }
}

/// Thread-safe rate limiter wrapper
#[derive(Debug, Clone)]
pub struct SharedRateLimiter {
    inner: Arc<Mutex<RateLimiter>>,
}

impl SharedRateLimiter {
    pub fn new(requests_per_second: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RateLimiter::new(requests_per_second))),
        }
    }

    /// Acquire a token, waiting if necessary
    pub async fn acquire(&self) {
        let mut limiter = self.inner.lock().await;
        limiter.acquire().await;
    }

    pub async fn is_enabled(&self) -> bool {
        let limiter = self.inner.lock().await;
        limiter.enabled
    }
}

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

/// Retry helper with configurable backoff
#[derive(Debug, Clone)]
pub struct RetryHelper {
    config: RetryConfig,
}

impl RetryHelper {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Execute an async operation, retrying transient failures with backoff.
    ///
    /// Permanent failures return on the first occurrence. After
    /// `max_retries` retries the last transient failure is returned.
    pub async fn with_retry<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.config.max_retries {
                        warn!(
                            "All {} retry attempts exhausted, giving up: {}",
                            self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    let delay = self
                        .config
                        .backoff_delay_with_jitter(attempt, &mut rand::rng());
                    debug!(
                        "Attempt {} failed ({}), retrying in {:?} with {:?} backoff",
                        attempt, e, delay, self.config.backoff_strategy
                    );

                    sleep(delay).await;
                }
            }
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}

/// Rate limiting state for one run: a limiter per source plus the retry policy
#[derive(Debug, Clone)]
pub struct RateLimitContext {
    limiters: HashMap<String, SharedRateLimiter>,
    retry: RetryConfig,
}

impl RateLimitContext {
    pub fn from_config(sources: &[SourceConfig], retry: &RetryConfig) -> Self {
        let limiters = sources
            .iter()
            .map(|s| (s.name.clone(), SharedRateLimiter::new(s.requests_per_second)))
            .collect();
        Self {
            limiters,
            retry: retry.clone(),
        }
    }

    /// Limiter for a source; unknown names get an unlimited one
    pub fn limiter_for(&self, source: &str) -> SharedRateLimiter {
        self.limiters
            .get(source)
            .cloned()
            .unwrap_or_else(|| SharedRateLimiter::new(0))
    }

    pub fn retry_helper(&self) -> RetryHelper {
        RetryHelper::new(&self.retry)
    }

    /// Log rate limit configuration
    pub fn log_config(&self, sources: &[SourceConfig]) {
        for source in sources {
            let rate = if source.requests_per_second > 0 {
                format!("{} rps", source.requests_per_second)
            } else {
                "unlimited".to_string()
            };
            debug!("Source '{}' ({:?}): {}", source.name, source.kind, rate);
        }
        debug!(
            "Retry policy: {:?} backoff, base={}ms, max={}ms, jitter={}, max retries={}",
            self.retry.backoff_strategy,
            self.retry.base_delay_ms,
            self.retry.max_delay_ms,
            self.retry.jitter_ratio,
            self.retry.max_retries
        );
    }
}
