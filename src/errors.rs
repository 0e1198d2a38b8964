// src/errors.rs

// error handling for the coordinator and the client

// dependencies
use crate::clock::ClockError;

/// Error type for the rate limit coordinator.
///
/// `RetriesExhausted` is the terminal rate-limit failure: the request kept
/// receiving 429 responses until the retry budget ran out.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("base delay must be positive")]
    InvalidBaseDelay,
    #[error("max delay must be positive")]
    InvalidMaxDelay,
    #[error("multiplier must be a positive finite number")]
    InvalidMultiplier,
    #[error("jitter must be between 0.0 and 1.0")]
    InvalidJitter,
    #[error("rate limit exceeded: max retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
    #[error("clock error occurred: {0}")]
    ClockError(#[from] ClockError),
}

impl RateLimitError {
    /// True for the terminal rate-limit failure.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RateLimitError::RetriesExhausted { .. })
    }
}

/// Crate-level error returned by the client.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(
        "API key must be set as the environment variable `{var}` or supplied in the client options",
        var = crate::client::API_KEY_ENV
    )]
    MissingApiKey,

    #[error("invalid header `{name}`")]
    InvalidHeader { name: String },

    #[error("invalid base url `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("invalid request path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("failed to serialize request body: {0}")]
    Body(#[source] serde_json::Error),

    #[error("invalid retry configuration: {0}")]
    InvalidRetryConfig(#[source] RateLimitError),

    #[error("client options provider failed: {0}")]
    OptionsProvider(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    RateLimit(RateLimitError),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request middleware failed: {0}")]
    Middleware(#[source] reqwest_middleware::Error),

    #[error("failed to parse JSON (status {status}): {source}")]
    Parse {
        status: u16,
        body: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// True when the request gave up after repeated 429 responses.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimit(e) if e.is_exhausted())
    }
}

impl From<RateLimitError> for Error {
    fn from(e: RateLimitError) -> Self {
        match e {
            RateLimitError::RetriesExhausted { .. } | RateLimitError::ClockError(_) => {
                Error::RateLimit(e)
            }
            other => Error::InvalidRetryConfig(other),
        }
    }
}

// transport failures keep their own variant whichever layer reports them
impl From<reqwest_middleware::Error> for Error {
    fn from(e: reqwest_middleware::Error) -> Self {
        match e {
            reqwest_middleware::Error::Reqwest(e) => Error::Http(e),
            other => Error::Middleware(other),
        }
    }
}
