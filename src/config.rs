// src/config.rs

//! Retry configuration for the rate limit coordinator

// dependencies
use crate::errors::RateLimitError;
use serde::Deserialize;
use std::time::Duration;

/// Retry and backoff settings applied to 429 responses.
///
/// Every field has a default, so a partial override only names what it
/// changes:
///
/// ```rust
/// use shipengine_client::RetryConfig;
///
/// let config = RetryConfig::default().with_max_retries(3);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub(crate) max_retries: u32,
    #[serde(rename = "base_delay_ms", deserialize_with = "millis")]
    pub(crate) base_delay: Duration,
    #[serde(rename = "max_delay_ms", deserialize_with = "millis")]
    pub(crate) max_delay: Duration,
    pub(crate) multiplier: f64,
    pub(crate) jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(10_000),
            multiplier: 2.0,
            jitter: 0.5,
        }
    }
}

impl RetryConfig {
    /// Create a configuration from the four backoff parameters, keeping the
    /// default jitter band.
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            multiplier,
            ..Self::default()
        }
    }

    /// Builder-style: set the number of retries before a 429 becomes terminal
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Builder-style: set the delay used for the first retry
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Builder-style: set the cap applied before jitter
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Builder-style: set the exponential growth factor
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Builder-style: set the jitter ceiling as a fraction of the delay.
    /// `0.0` disables jitter.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), RateLimitError> {
        if self.base_delay.is_zero() {
            return Err(RateLimitError::InvalidBaseDelay);
        }
        if self.max_delay.is_zero() {
            return Err(RateLimitError::InvalidMaxDelay);
        }
        if !self.multiplier.is_finite() || self.multiplier <= 0.0 {
            return Err(RateLimitError::InvalidMultiplier);
        }
        if !self.jitter.is_finite() || !(0.0..=1.0).contains(&self.jitter) {
            return Err(RateLimitError::InvalidJitter);
        }
        Ok(())
    }
}

fn millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}
