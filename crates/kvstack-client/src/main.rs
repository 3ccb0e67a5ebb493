//! Polls the serving stack once per second and logs what comes back.

use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "kvstack-client", about = "Polling client")]
struct Args {
    /// Request target
    #[arg(long, default_value = "http://localhost:8090")]
    target: String,

    /// Key to poll
    #[arg(long, default_value = "current-date")]
    key: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kvstack_http::init_tracing();
    let args = Args::parse();

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    tokio::select! {
        _ = poll_loop(&client, &args) => {}
        signal = kvstack_http::shutdown_signal() => {
            info!(%signal, "stopping");
        }
    }
    Ok(())
}

async fn poll_loop(client: &reqwest::Client, args: &Args) {
    let url = format!("{}/api/v1/some-data?key={}", args.target, args.key);
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        ticker.tick().await;
        match client.get(&url).send().await {
            Ok(resp) => {
                let status = resp.status();
                match resp.text().await {
                    Ok(body) => info!(%status, body, "response"),
                    Err(err) => warn!(%status, error = %err, "error reading response body"),
                }
            }
            Err(err) => warn!(error = %err, "request failed"),
        }
    }
}
