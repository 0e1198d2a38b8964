// src/lib.rs

//! # ShipEngine Client
//!
//! A typed ShipEngine API client that injects the API key and backs off
//! per account when the API answers `429 Too Many Requests`.
//!
//! Every request first waits out the account's cool-down window, then
//! retries 429 responses with exponential backoff plus jitter (or the
//! server's `Retry-After`), up to a maximum retry count.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shipengine_client::{
//!     ClientOptions, RateLimitCoordinator, RequestOptions, RetryConfig, ShipEngineClient,
//!     SystemClock,
//! };
//!
//! # async fn run() -> Result<(), shipengine_client::Error> {
//! let coordinator = Arc::new(RateLimitCoordinator::with_config(
//!     RetryConfig::default().with_max_retries(3),
//!     SystemClock,
//! )?);
//!
//! let client = ShipEngineClient::builder(ClientOptions::new().api_key("TEST_key"))
//!     .coordinator(coordinator)
//!     .build()
//!     .await?;
//!
//! let carriers = client.get("/v1/carriers", RequestOptions::new()).await?;
//! println!("status: {}", carriers.status());
//! # Ok(())
//! # }
//! ```

// private modules
mod client;
mod clock;
mod config;
mod coordinator;
mod errors;
mod response;
mod wrapper;

// public API exports
pub use client::{
    API_KEY_ENV, API_KEY_HEADER, ClientBuilder, ClientOptions, DEFAULT_BASE_URL, OptionsSource,
    RequestOptions, ShipEngineClient,
};
pub use clock::{Clock, ClockError, SystemClock};
pub use config::RetryConfig;
pub use coordinator::{RateLimitCoordinator, ResponseDecision, TOO_MANY_REQUESTS};
pub use errors::{Error, RateLimitError};
pub use response::{HttpResponse, parse_json};
pub use wrapper::RateLimited;

// re-exported so callers can build header maps for classify_response
pub use reqwest::header;
// re-exported so callers can write middleware against the same version
pub use reqwest_middleware::{Middleware, Next};
