// demos/list_carriers.rs

// Lists the carriers connected to the account in SHIPENGINE_API_KEY.
//
//   SHIPENGINE_API_KEY=TEST_... RUST_LOG=shipengine_client=debug cargo run --example list_carriers

// dependencies
use serde::Deserialize;
use shipengine_client::{
    ClientOptions, OptionsSource, RateLimitCoordinator, RequestOptions, RetryConfig,
    ShipEngineClient, SystemClock, parse_json,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct CarrierList {
    carriers: Vec<Carrier>,
}

#[derive(Debug, Deserialize)]
struct Carrier {
    carrier_id: String,
    friendly_name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let coordinator = Arc::new(RateLimitCoordinator::with_config(
        RetryConfig::default().with_max_retries(3),
        SystemClock,
    )?);

    // options could come from a per-user key lookup; this one only adds headers
    let options = OptionsSource::provider(|| async {
        Ok::<_, std::io::Error>(
            ClientOptions::new()
                .header("Content-Type", "application/json")
                .timeout(Duration::from_secs(30)),
        )
    });

    let client = ShipEngineClient::builder(options)
        .coordinator(coordinator)
        .build()
        .await?;

    let response = client.get("/v1/carriers", RequestOptions::new()).await?;
    let list: CarrierList = parse_json(response).await?;

    for carrier in list.carriers {
        println!(
            "{}\t{}",
            carrier.carrier_id,
            carrier.friendly_name.unwrap_or_default()
        );
    }
    Ok(())
}
