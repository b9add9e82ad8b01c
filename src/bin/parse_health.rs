//! Check that a Parse Server is reachable and healthy.
//!
//! Reads the server from the environment and exits non-zero unless
//! `GET /health` reports `ok`.
//!
//! ```sh
//! export PARSE_SERVER_URL='http://localhost:1337/parse'
//! export PARSE_APPLICATION_ID='myAppId'
//! RUST_LOG=busbar_parse_client=debug cargo run --bin parse-health
//! ```

use busbar_parse_api::{ParseClient, RequestOptions};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let client = ParseClient::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!();
        eprintln!("  Set PARSE_SERVER_URL and PARSE_APPLICATION_ID,");
        eprintln!("  plus PARSE_CLIENT_KEY if the server requires one.");
        std::process::exit(1);
    });

    println!("Checking {}", client.config().server_url());
    match client.health(&RequestOptions::new()).await {
        Ok(status) if status == "ok" => println!("  healthy"),
        Ok(status) => {
            eprintln!("  server reports status {status:?}");
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("  health check failed: {e}");
            std::process::exit(1);
        }
    }
}
