// tests/ratelimit/client_tests.rs

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;
    use serial_test::serial;
    use shipengine_client::{
        API_KEY_ENV, ClientOptions, Clock, ClockError, Error, OptionsSource, RateLimitCoordinator,
        RequestOptions, RetryConfig, ShipEngineClient, SystemClock, parse_json,
    };
    use shipengine_client::header::{HeaderMap, HeaderValue};
    use std::sync::Arc;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize)]
    struct CarrierList {
        carriers: Vec<Carrier>,
    }

    #[derive(Debug, Deserialize)]
    struct Carrier {
        carrier_id: String,
    }

    // Clock pinned to one instant, without a Default impl
    #[derive(Debug, Clone)]
    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now(&self) -> Result<u64, ClockError> {
            Ok(self.0)
        }
    }

    fn options(server: &MockServer) -> ClientOptions {
        ClientOptions::new()
            .api_key("TEST_key")
            .base_url(server.uri())
    }

    fn rate_limited() -> ResponseTemplate {
        ResponseTemplate::new(429).insert_header("Retry-After", "0")
    }

    async fn request_count(server: &MockServer) -> usize {
        server.received_requests().await.unwrap().len()
    }

    #[tokio::test]
    async fn injects_api_key_and_decodes_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/carriers"))
            .and(header("api-key", "TEST_key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "carriers": [{ "carrier_id": "se-123" }]
            })))
            .mount(&server)
            .await;

        let client = ShipEngineClient::new(options(&server)).await.unwrap();
        let response = client
            .get("/v1/carriers", RequestOptions::new())
            .await
            .unwrap();
        let carriers: CarrierList = parse_json(response).await.unwrap();

        assert_eq!(carriers.carriers.len(), 1);
        assert_eq!(carriers.carriers[0].carrier_id, "se-123");
    }

    #[tokio::test]
    async fn retries_rate_limited_requests_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/carriers"))
            .respond_with(rate_limited())
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/carriers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "carriers": [] })))
            .mount(&server)
            .await;

        let client = ShipEngineClient::builder(options(&server))
            .retry_config(RetryConfig::default().with_max_retries(2))
            .build()
            .await
            .unwrap();

        let response = client
            .get("/v1/carriers", RequestOptions::new())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(request_count(&server).await, 3);
        assert_eq!(client.coordinator().window_end(client.identity()), None);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/rates"))
            .respond_with(rate_limited())
            .mount(&server)
            .await;

        let client = ShipEngineClient::builder(options(&server))
            .retry_config(RetryConfig::default().with_max_retries(1))
            .build()
            .await
            .unwrap();

        let err = client
            .post("/v1/rates", RequestOptions::new())
            .await
            .unwrap_err();

        assert!(err.is_rate_limited(), "unexpected error: {err:?}");
        assert_eq!(request_count(&server).await, 2);
    }

    #[tokio::test]
    async fn server_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/packages/se-1"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = ShipEngineClient::new(options(&server)).await.unwrap();
        let response = client
            .delete("/v1/packages/se-1", RequestOptions::new())
            .await
            .unwrap();

        assert_eq!(response.status(), 500);
        assert_eq!(request_count(&server).await, 1);
    }

    #[tokio::test]
    async fn sends_query_body_and_request_headers() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/packages/se-9"))
            .and(query_param("validate", "true"))
            .and(header("x-request-id", "req-1"))
            .and(header("api-key", "override-key"))
            .and(body_json(json!({ "name": "box", "package_code": "custom_12312" })))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = ShipEngineClient::new(options(&server)).await.unwrap();
        let request = RequestOptions::new()
            .query("validate", "true")
            .header("X-Request-Id", "req-1")
            .header("Api-Key", "override-key")
            .json(&json!({ "name": "box", "package_code": "custom_12312" }))
            .unwrap();

        let response = client.put("/v1/packages/se-9", request).await.unwrap();
        assert_eq!(response.status(), 204);
    }

    #[tokio::test]
    async fn patch_goes_through_the_wrapper() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v1/shipments/se-5"))
            .respond_with(rate_limited())
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/v1/shipments/se-5"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = ShipEngineClient::new(options(&server)).await.unwrap();
        let response = client
            .patch("/v1/shipments/se-5", RequestOptions::new())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(request_count(&server).await, 2);
    }

    #[tokio::test]
    async fn clients_share_a_coordinator_by_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let coordinator = Arc::new(RateLimitCoordinator::<SystemClock>::default());

        let first = ShipEngineClient::builder(options(&server).client_id("account-7"))
            .coordinator(Arc::clone(&coordinator))
            .build()
            .await
            .unwrap();
        let second = ShipEngineClient::builder(
            ClientOptions::new()
                .api_key("other-key")
                .client_id("account-7")
                .base_url(server.uri()),
        )
        .coordinator(Arc::clone(&coordinator))
        .build()
        .await
        .unwrap();

        assert_eq!(first.identity(), "account-7");
        assert_eq!(second.identity(), "account-7");
        assert!(Arc::ptr_eq(first.coordinator(), second.coordinator()));

        // a 429 seen through one client throttles the other
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("30"));
        coordinator
            .classify_response(first.identity(), 429, &headers, 0)
            .unwrap();
        assert!(second.coordinator().is_rate_limited("account-7").unwrap());

        // and a success through either one clears it
        coordinator.reset("account-7");
        let response = second
            .get("/v1/carriers", RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(first.coordinator().window_end("account-7"), None);
    }

    #[tokio::test]
    async fn shared_coordinator_clock_needs_no_default() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let coordinator = Arc::new(RateLimitCoordinator::new(FixedClock(0)));
        let client = ShipEngineClient::builder(options(&server))
            .coordinator(Arc::clone(&coordinator))
            .build()
            .await
            .unwrap();

        assert!(Arc::ptr_eq(client.coordinator(), &coordinator));
        let response = client
            .get("/v1/carriers", RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn own_coordinator_uses_the_given_clock() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(rate_limited())
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = ShipEngineClient::builder(options(&server))
            .clock(FixedClock(42_000))
            .retry_config(RetryConfig::default().with_max_retries(2))
            .build()
            .await
            .unwrap();

        assert_eq!(client.coordinator().config().max_retries(), 2);
        let response = client
            .get("/v1/carriers", RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(response.status(), 500);
        // Retry-After 0 recorded against the fixed clock; the 500 leaves it in place
        assert_eq!(client.coordinator().window_end("TEST_key"), Some(42_000));
    }

    #[tokio::test]
    async fn identity_falls_back_to_api_key() {
        let server = MockServer::start().await;
        let client = ShipEngineClient::new(options(&server)).await.unwrap();
        assert_eq!(client.identity(), "TEST_key");
        assert!(client.headers().get("api-key").unwrap().is_sensitive());
    }

    #[tokio::test]
    async fn options_provider_is_resolved_once_at_build() {
        let server = MockServer::start().await;
        let uri = server.uri();

        let source = OptionsSource::provider(move || async move {
            Ok::<_, std::io::Error>(
                ClientOptions::new()
                    .api_key("provided-key")
                    .header("Content-Type", "application/json")
                    .base_url(uri),
            )
        });

        let client = ShipEngineClient::new(source).await.unwrap();
        assert_eq!(client.identity(), "provided-key");
        assert_eq!(client.base_url().as_str(), format!("{}/", server.uri()));
        assert_eq!(
            client.headers().get("content-type").unwrap(),
            "application/json"
        );
    }

    #[tokio::test]
    async fn failing_options_provider_aborts_construction() {
        let source = OptionsSource::provider(|| async {
            Err::<ClientOptions, _>(std::io::Error::other("key lookup failed"))
        });

        let err = ShipEngineClient::new(source).await.unwrap_err();
        assert!(matches!(err, Error::OptionsProvider(_)));
        assert!(err.to_string().contains("key lookup failed"));
    }

    #[tokio::test]
    async fn invalid_retry_config_is_a_construction_error() {
        let err = ShipEngineClient::builder(ClientOptions::new().api_key("k"))
            .retry_config(RetryConfig::default().with_multiplier(-1.0))
            .build()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidRetryConfig(_)));
    }

    #[tokio::test]
    #[serial]
    async fn missing_api_key_fails_before_any_request() {
        // SAFETY: This test runs serially via #[serial] to avoid env var races
        unsafe {
            std::env::remove_var(API_KEY_ENV);
        }

        let server = MockServer::start().await;
        let err = ShipEngineClient::new(ClientOptions::new().base_url(server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MissingApiKey));
        assert_eq!(request_count(&server).await, 0);
    }

    #[tokio::test]
    #[serial]
    async fn environment_key_is_the_default() {
        // SAFETY: This test runs serially via #[serial] to avoid env var races
        unsafe {
            std::env::set_var(API_KEY_ENV, "env-key");
        }

        let server = MockServer::start().await;
        let from_env = ShipEngineClient::new(ClientOptions::new().base_url(server.uri())).await;
        let explicit = ShipEngineClient::new(options(&server)).await;

        // SAFETY: This test runs serially via #[serial] to avoid env var races
        unsafe {
            std::env::remove_var(API_KEY_ENV);
        }

        assert_eq!(from_env.unwrap().identity(), "env-key");
        assert_eq!(explicit.unwrap().identity(), "TEST_key");
    }
}
