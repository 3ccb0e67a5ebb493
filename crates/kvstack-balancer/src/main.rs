use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use clap::Parser;
use tracing::info;

use kvstack_balancer::health::HealthMonitor;
use kvstack_balancer::proxy::{self, ProxyContext};
use kvstack_balancer::BackendPool;

#[derive(Parser, Debug)]
#[command(name = "kvstack-balancer", about = "Least-traffic HTTP load balancer")]
struct Args {
    /// Load balancer port
    #[arg(long, default_value_t = 8090)]
    port: u16,

    /// Request timeout in seconds
    #[arg(long = "timeout-sec", default_value_t = 3)]
    timeout_sec: u64,

    /// Whether backends support HTTPS
    #[arg(long)]
    https: bool,

    /// Whether to include tracing information into responses
    #[arg(long)]
    trace: bool,

    /// Backend address, repeatable
    #[arg(long = "backend", default_values_t = [
        "server1:8080".to_string(),
        "server2:8080".to_string(),
        "server3:8080".to_string(),
    ])]
    backends: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kvstack_http::init_tracing();
    let args = Args::parse();

    let scheme = if args.https { "https" } else { "http" };
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout_sec))
        .build()?;
    let pool = Arc::new(BackendPool::new(args.backends));

    HealthMonitor::new(Arc::clone(&pool), client.clone(), scheme).spawn();

    let ctx = ProxyContext {
        pool,
        client,
        scheme,
        trace: args.trace,
    };
    let router = Router::new().fallback(proxy::forward).with_state(ctx);

    info!(trace = args.trace, "starting load balancer");
    kvstack_http::serve(router, args.port).await?;
    Ok(())
}
