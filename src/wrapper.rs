// src/wrapper.rs

// request wrapper: honors cool-down windows and retries 429 responses

// dependencies
use crate::clock::{Clock, SystemClock};
use crate::coordinator::{RateLimitCoordinator, ResponseDecision};
use crate::errors::RateLimitError;
use crate::response::HttpResponse;
use std::future::Future;
use std::sync::Arc;

/// A request function bound to a coordinator and a client identity.
///
/// The wrapped function keeps its two positional inputs. Inputs are cloned
/// for every attempt, so a request that takes a single input can pass `()`
/// as the second.
#[derive(Debug, Clone)]
pub struct RateLimited<F, C = SystemClock>
where
    C: Clock,
{
    coordinator: Arc<RateLimitCoordinator<C>>,
    identity: String,
    request: F,
}

impl<C> RateLimitCoordinator<C>
where
    C: Clock,
{
    /// Wrap `request` so every call waits out the identity's cool-down and
    /// retries on 429 until the retry budget is spent.
    pub fn wrap<F>(self: &Arc<Self>, identity: impl Into<String>, request: F) -> RateLimited<F, C> {
        RateLimited {
            coordinator: Arc::clone(self),
            identity: identity.into(),
            request,
        }
    }
}

impl<F, C> RateLimited<F, C>
where
    C: Clock,
{
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn coordinator(&self) -> &Arc<RateLimitCoordinator<C>> {
        &self.coordinator
    }

    /// Issue the wrapped request.
    ///
    /// Errors returned by the request function are passed through untouched.
    /// After `max_retries` retried 429 responses the call fails with
    /// [`RateLimitError::RetriesExhausted`], converted into the request's
    /// own error type.
    pub async fn call<A, B, Fut, R, E>(&self, first: A, second: B) -> Result<R, E>
    where
        F: Fn(A, B) -> Fut,
        A: Clone,
        B: Clone,
        Fut: Future<Output = Result<R, E>>,
        R: HttpResponse,
        E: From<RateLimitError>,
    {
        let mut attempt = 0;

        loop {
            self.coordinator.await_clearance(&self.identity).await?;

            let response = (self.request)(first.clone(), second.clone()).await?;

            let decision = self.coordinator.classify_response(
                &self.identity,
                response.status(),
                response.headers(),
                attempt,
            )?;

            match decision {
                ResponseDecision::Proceed => return Ok(response),
                ResponseDecision::Retry { .. } => attempt += 1,
            }
        }
    }
}
