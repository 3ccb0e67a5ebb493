use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use kvstack_store::Store;

#[derive(Parser, Debug)]
#[command(name = "kvstack-db", about = "Segmented key-value store server")]
struct Args {
    /// Server port
    #[arg(long, default_value_t = 8083)]
    port: u16,

    /// Data directory; a throwaway temp directory when omitted
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Segment rotation threshold in bytes
    #[arg(long = "segment-size", default_value_t = 250)]
    segment_size: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kvstack_http::init_tracing();
    let args = Args::parse();

    // The temp dir guard must outlive the server or the data vanishes
    // underneath it.
    let mut _tmp_guard = None;
    let dir = match args.dir {
        Some(dir) => dir,
        None => {
            let tmp = tempfile::tempdir()?;
            let dir = tmp.path().to_path_buf();
            _tmp_guard = Some(tmp);
            dir
        }
    };

    let store = Store::open(&dir, args.segment_size).await?;
    info!(dir = %dir.display(), segment_size = args.segment_size, "datastore ready");

    kvstack_http::serve(kvstack_db::router(store.clone()), args.port).await?;
    store.close().await;
    Ok(())
}
