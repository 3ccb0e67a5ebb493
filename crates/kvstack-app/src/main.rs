use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use kvstack_app::AppState;

#[derive(Parser, Debug)]
#[command(name = "kvstack-app", about = "Sample application server")]
struct Args {
    /// Server port
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Base URL of the storage facade
    #[arg(long = "db-url", env = "CONF_DB_URL", default_value = "http://db:8083")]
    db_url: String,

    /// Key the startup date stamp is written under
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

    kvstack_app::save_current_date(&client, &args.db_url, &args.key)
        .await
        .context("error saving current date")?;
    info!(db_url = %args.db_url, key = %args.key, "current date stamped");

    let state = AppState {
        client,
        db_url: args.db_url,
    };
    kvstack_http::serve(kvstack_app::router(state), args.port).await?;
    Ok(())
}
