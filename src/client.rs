// src/client.rs

//! ShipEngine client construction: option resolution, header merging,
//! API key injection and the rate-limited per-verb request functions.

// dependencies
use crate::clock::{Clock, SystemClock};
use crate::config::RetryConfig;
use crate::coordinator::RateLimitCoordinator;
use crate::errors::Error;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Response, Url};
use reqwest_middleware::{ClientWithMiddleware, Middleware};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable holding the default API key.
pub const API_KEY_ENV: &str = "SHIPENGINE_API_KEY";

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "api-key";

pub const DEFAULT_BASE_URL: &str = "https://api.shipengine.com/";

const USER_AGENT: &str = concat!("shipengine-client/", env!("CARGO_PKG_VERSION"));

/// Client options. Headers are applied in insertion order on top of the
/// defaults, so the last value written for a header name wins.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    headers: Vec<(String, String)>,
    client_id: Option<String>,
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header; replaces any earlier value for the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the API key, overriding the environment.
    pub fn api_key(self, key: impl Into<String>) -> Self {
        self.header(API_KEY_HEADER, key)
    }

    /// Identity used to scope rate limit state. Defaults to the API key.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

type OptionsFuture = Pin<Box<dyn Future<Output = Result<ClientOptions, Error>> + Send>>;

/// Where client options come from: a literal value, or a single-shot async
/// provider (for example one that looks up a per-user API key). Resolved
/// once, before any option is read.
pub enum OptionsSource {
    Value(ClientOptions),
    Provider(Box<dyn FnOnce() -> OptionsFuture + Send>),
}

impl OptionsSource {
    pub fn provider<F, Fut, E>(provider: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<ClientOptions, E>> + Send + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        OptionsSource::Provider(Box::new(move || {
            Box::pin(async move {
                provider()
                    .await
                    .map_err(|e| Error::OptionsProvider(e.into()))
            })
        }))
    }

    pub async fn resolve(self) -> Result<ClientOptions, Error> {
        match self {
            OptionsSource::Value(options) => Ok(options),
            OptionsSource::Provider(provider) => provider().await,
        }
    }
}

impl From<ClientOptions> for OptionsSource {
    fn from(options: ClientOptions) -> Self {
        OptionsSource::Value(options)
    }
}

impl fmt::Debug for OptionsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionsSource::Value(options) => f.debug_tuple("Value").field(options).finish(),
            OptionsSource::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

/// Per-request options: query pairs, JSON body and header overrides.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Header for this request only; overrides the client's value.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Serialize `body` as the JSON request body.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, Error> {
        self.body = Some(serde_json::to_value(body).map_err(Error::Body)?);
        Ok(self)
    }
}

// the client's coordinator: created at build time, or shared with other clients
enum CoordinatorChoice<C: Clock> {
    Own(C),
    Shared(Arc<RateLimitCoordinator<C>>),
}

/// Builder for [`ShipEngineClient`].
pub struct ClientBuilder<C = SystemClock>
where
    C: Clock,
{
    options: OptionsSource,
    coordinator: CoordinatorChoice<C>,
    retry: RetryConfig,
    http: Option<reqwest::Client>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl ClientBuilder<SystemClock> {
    pub fn new(options: impl Into<OptionsSource>) -> Self {
        Self {
            options: options.into(),
            coordinator: CoordinatorChoice::Own(SystemClock),
            retry: RetryConfig::default(),
            http: None,
            middleware: Vec::new(),
        }
    }
}

impl<C> ClientBuilder<C>
where
    C: Clock,
{
    /// Share rate limit state with other clients. Without one the client
    /// gets a coordinator of its own.
    pub fn coordinator<D: Clock>(self, coordinator: Arc<RateLimitCoordinator<D>>) -> ClientBuilder<D> {
        self.with_coordinator(CoordinatorChoice::Shared(coordinator))
    }

    /// Clock for the client's own coordinator.
    pub fn clock<D: Clock>(self, clock: D) -> ClientBuilder<D> {
        self.with_coordinator(CoordinatorChoice::Own(clock))
    }

    fn with_coordinator<D: Clock>(self, coordinator: CoordinatorChoice<D>) -> ClientBuilder<D> {
        ClientBuilder {
            options: self.options,
            coordinator,
            retry: self.retry,
            http: self.http,
            middleware: self.middleware,
        }
    }

    /// Retry configuration for the client's own coordinator. Ignored when a
    /// shared coordinator is supplied.
    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Install request/response middleware. Middleware runs in the order it
    /// was added and sees every attempt, retries of a 429 included.
    pub fn middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Same as [`ClientBuilder::middleware`] for middleware already behind an `Arc`.
    pub fn middleware_arc(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Resolve the options and build the client. Fails before any request is
    /// sent when no API key is available.
    pub async fn build(self) -> Result<ShipEngineClient<C>, Error> {
        let options = self.options.resolve().await?;

        let env_api_key = std::env::var(API_KEY_ENV).ok();
        let headers = merge_headers(env_api_key.as_deref(), &options.headers)?;
        let api_key = headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|key| !key.is_empty())
            .ok_or(Error::MissingApiKey)?;
        let identity = resolve_identity(options.client_id.as_deref(), api_key);

        let base_url = parse_base_url(options.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL))?;

        let http = match self.http {
            Some(http) => http,
            None => build_http(options.timeout)?,
        };
        let http = self
            .middleware
            .into_iter()
            .fold(reqwest_middleware::ClientBuilder::new(http), |builder, middleware| {
                builder.with_arc(middleware)
            })
            .build();

        let coordinator = match self.coordinator {
            CoordinatorChoice::Shared(coordinator) => coordinator,
            CoordinatorChoice::Own(clock) => {
                Arc::new(RateLimitCoordinator::with_config(self.retry, clock)?)
            }
        };

        tracing::debug!(base_url = %base_url, "ShipEngine client ready");

        Ok(ShipEngineClient {
            http,
            base_url,
            headers,
            identity,
            coordinator,
        })
    }
}

impl<C: Clock> fmt::Debug for ClientBuilder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let coordinator = match self.coordinator {
            CoordinatorChoice::Own(_) => "own",
            CoordinatorChoice::Shared(_) => "shared",
        };
        f.debug_struct("ClientBuilder")
            .field("options", &self.options)
            .field("coordinator", &coordinator)
            .field("retry", &self.retry)
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

/// ShipEngine API client. Every verb goes through the rate limit wrapper.
#[derive(Clone)]
pub struct ShipEngineClient<C = SystemClock>
where
    C: Clock,
{
    http: ClientWithMiddleware,
    base_url: Url,
    headers: HeaderMap,
    identity: String,
    coordinator: Arc<RateLimitCoordinator<C>>,
}

impl<C: Clock> fmt::Debug for ShipEngineClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShipEngineClient")
            .field("base_url", &self.base_url.as_str())
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl ShipEngineClient<SystemClock> {
    pub fn builder(options: impl Into<OptionsSource>) -> ClientBuilder<SystemClock> {
        ClientBuilder::new(options)
    }

    /// Build a client with its own coordinator and default retry settings.
    pub async fn new(options: impl Into<OptionsSource>) -> Result<Self, Error> {
        ClientBuilder::new(options).build().await
    }
}

impl<C> ShipEngineClient<C>
where
    C: Clock,
{
    /// Identity the client's rate limit state is stored under.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn coordinator(&self) -> &Arc<RateLimitCoordinator<C>> {
        &self.coordinator
    }

    pub async fn get(&self, path: &str, options: RequestOptions) -> Result<Response, Error> {
        self.dispatch(Method::GET, path, options).await
    }

    pub async fn post(&self, path: &str, options: RequestOptions) -> Result<Response, Error> {
        self.dispatch(Method::POST, path, options).await
    }

    pub async fn put(&self, path: &str, options: RequestOptions) -> Result<Response, Error> {
        self.dispatch(Method::PUT, path, options).await
    }

    pub async fn patch(&self, path: &str, options: RequestOptions) -> Result<Response, Error> {
        self.dispatch(Method::PATCH, path, options).await
    }

    pub async fn delete(&self, path: &str, options: RequestOptions) -> Result<Response, Error> {
        self.dispatch(Method::DELETE, path, options).await
    }

    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<Response, Error> {
        let send = |path: String, options: RequestOptions| self.send(method.clone(), path, options);

        self.coordinator
            .wrap(self.identity.as_str(), send)
            .call(path.to_owned(), options)
            .await
    }

    async fn send(
        &self,
        method: Method,
        path: String,
        options: RequestOptions,
    ) -> Result<Response, Error> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::InvalidPath {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let mut headers = self.headers.clone();
        apply_headers(&mut headers, &options.headers)?;

        tracing::debug!(%method, %url, "sending request");

        let mut request = self.http.request(method.clone(), url).headers(headers);
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if let Some(body) = &options.body {
            request = request.json(body);
        }

        let response = request.send().await?;
        tracing::debug!(%method, path = %path, status = response.status().as_u16(), "response received");
        Ok(response)
    }
}

/// Defaults first (the environment API key), then explicit headers in order.
fn merge_headers(env_api_key: Option<&str>, explicit: &[(String, String)]) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();
    if let Some(key) = env_api_key.filter(|key| !key.is_empty()) {
        headers.insert(
            HeaderName::from_static(API_KEY_HEADER),
            header_value(API_KEY_HEADER, key)?,
        );
    }
    apply_headers(&mut headers, explicit)?;
    Ok(headers)
}

fn apply_headers(headers: &mut HeaderMap, overrides: &[(String, String)]) -> Result<(), Error> {
    for (name, value) in overrides {
        let header_name = HeaderName::try_from(name.as_str()).map_err(|_| Error::InvalidHeader {
            name: name.clone(),
        })?;
        headers.insert(header_name, header_value(name, value)?);
    }
    Ok(())
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, Error> {
    let mut header = HeaderValue::try_from(value).map_err(|_| Error::InvalidHeader {
        name: name.to_owned(),
    })?;
    if name.eq_ignore_ascii_case(API_KEY_HEADER) {
        header.set_sensitive(true);
    }
    Ok(header)
}

/// An explicit, non-empty client id wins over the API key.
fn resolve_identity(client_id: Option<&str>, api_key: &str) -> String {
    client_id
        .filter(|id| !id.is_empty())
        .unwrap_or(api_key)
        .to_owned()
}

fn parse_base_url(raw: &str) -> Result<Url, Error> {
    // a trailing slash keeps any path prefix when joining endpoint paths
    let normalized = if raw.ends_with('/') {
        raw.to_owned()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|e| Error::InvalidBaseUrl {
        url: raw.to_owned(),
        reason: e.to_string(),
    })
}

fn build_http(timeout: Option<Duration>) -> Result<reqwest::Client, Error> {
    let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(Error::Http)
}
