// src/coordinator.rs

// rate limit coordinator: per-identity cool-down windows and 429 classification

// dependencies
use crate::clock::{Clock, SystemClock};
use crate::config::RetryConfig;
use crate::errors::RateLimitError;
use dashmap::DashMap;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;

/// Status code the vendor returns when an account is being throttled.
pub const TOO_MANY_REQUESTS: u16 = 429;

/// Tracks, per client identity, the earliest time the next request may be sent.
/// C is the clock type, defaulting to SystemClock.
/// The window map is a `DashMap` so one coordinator can be shared behind an
/// `Arc` by every client and task in the process.
#[derive(Debug)]
pub struct RateLimitCoordinator<C = SystemClock>
where
    C: Clock,
{
    config: RetryConfig,
    windows: DashMap<String, u64>,
    clock: C,
}

/// Outcome of classifying a response that did not exhaust the retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDecision {
    /// Hand the response back to the caller.
    Proceed,
    /// A cool-down window was recorded; issue the request again once it clears.
    Retry { delay: Duration },
}

impl Default for RateLimitCoordinator<SystemClock> {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

// methods for the RateLimitCoordinator type
impl<C> RateLimitCoordinator<C>
where
    C: Clock,
{
    /// Create a coordinator with the default retry configuration.
    pub fn new(clock: C) -> Self {
        Self {
            config: RetryConfig::default(),
            windows: DashMap::new(),
            clock,
        }
    }

    /// Create a coordinator from a retry configuration, rejecting invalid values.
    pub fn with_config(config: RetryConfig, clock: C) -> Result<Self, RateLimitError> {
        config.validate()?;
        Ok(Self {
            config,
            windows: DashMap::new(),
            clock,
        })
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Suspend until the identity's cool-down window (if any) has passed.
    ///
    /// An elapsed window is left in place; the next successful response
    /// removes it.
    pub async fn await_clearance(&self, identity: &str) -> Result<(), RateLimitError> {
        // copy the value out so no shard lock is held across the sleep
        let Some(window_end) = self.window_end(identity) else {
            return Ok(());
        };

        let wait_ms = window_end.saturating_sub(self.clock.now()?);
        if wait_ms > 0 {
            tracing::debug!(
                identity = %redacted(identity),
                wait_ms,
                "waiting for rate limit window to clear"
            );
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        }
        Ok(())
    }

    /// Decide what to do with a response for `identity` on the given
    /// zero-based attempt.
    ///
    /// Only 429 is interpreted. Any status below 400 clears the identity's
    /// window; other error statuses are left for the caller.
    pub fn classify_response(
        &self,
        identity: &str,
        status: u16,
        headers: &HeaderMap,
        attempt: u32,
    ) -> Result<ResponseDecision, RateLimitError> {
        if status == TOO_MANY_REQUESTS {
            if attempt >= self.config.max_retries {
                tracing::warn!(
                    identity = %redacted(identity),
                    attempt,
                    max_retries = self.config.max_retries,
                    "rate limit retries exhausted"
                );
                return Err(RateLimitError::RetriesExhausted {
                    attempts: attempt.saturating_add(1),
                });
            }

            let delay = retry_after(headers).unwrap_or_else(|| self.backoff_delay(attempt));
            let window_end = self
                .clock
                .now()?
                .saturating_add(saturating_millis(delay));

            // overwrite, never merge, an existing window
            self.windows.insert(identity.to_owned(), window_end);

            tracing::warn!(
                identity = %redacted(identity),
                attempt,
                delay_ms = saturating_millis(delay),
                "rate limited, backing off"
            );
            return Ok(ResponseDecision::Retry { delay });
        }

        if status < 400 {
            self.windows.remove(identity);
        }
        Ok(ResponseDecision::Proceed)
    }

    /// Exponential backoff for a zero-based attempt:
    /// `min(max_delay, base_delay * multiplier^attempt)` plus up to
    /// `jitter * delay` of random extra wait.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.config.base_delay.as_millis() as f64;
        let cap_ms = self.config.max_delay.as_millis() as f64;

        let delay_ms = (base_ms * self.config.multiplier.powf(attempt as f64)).min(cap_ms);
        let jitter_ms = delay_ms * self.config.jitter * rand::random::<f64>();

        Duration::from_millis((delay_ms + jitter_ms) as u64)
    }

    /// End of the identity's cool-down window in milliseconds since the epoch.
    pub fn window_end(&self, identity: &str) -> Option<u64> {
        self.windows.get(identity).map(|entry| *entry.value())
    }

    /// Whether the identity currently has a window that has not yet elapsed.
    pub fn is_rate_limited(&self, identity: &str) -> Result<bool, RateLimitError> {
        match self.window_end(identity) {
            Some(window_end) => Ok(window_end > self.clock.now()?),
            None => Ok(false),
        }
    }

    /// Forget the identity's window.
    pub fn reset(&self, identity: &str) {
        self.windows.remove(identity);
    }

    /// Number of identities with a recorded window, elapsed or not.
    pub fn active_windows(&self) -> usize {
        self.windows.len()
    }

    /// Drop windows that have already elapsed and return how many were removed.
    pub fn cleanup_expired_windows(&self) -> Result<usize, RateLimitError> {
        let now = self.clock.now()?;
        let before = self.windows.len();
        self.windows.retain(|_, window_end| *window_end > now);
        Ok(before.saturating_sub(self.windows.len()))
    }
}

// Retry-After in integer seconds; HTTP-date values fall back to backoff
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

// identities are often API keys; only the tail goes into logs
fn redacted(identity: &str) -> String {
    match identity.char_indices().rev().nth(3) {
        Some((0, _)) | None => identity.to_owned(),
        Some((start, _)) => format!("...{}", &identity[start..]),
    }
}

// a huge Retry-After must not wrap around to a short window
fn saturating_millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}
