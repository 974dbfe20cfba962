use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use diary_kernel_server::{app, build_state, local_ip, DEFAULT_POLL_WINDOW};

#[derive(Debug, Parser)]
#[command(name = "diary-kernel-server")]
#[command(about = "Diary/tracking host server for local-network clients")]
struct Args {
    #[arg(long, default_value = "./diary.sqlite3")]
    db: PathBuf,
    #[arg(long, default_value = "0.0.0.0:8888")]
    bind: SocketAddr,
    /// Directory holding the built UI bundle served at `/`.
    #[arg(long, default_value = "./assets")]
    assets: PathBuf,
    /// Base URL remote clients should reach this host on; derived from the
    /// first routable local address when absent.
    #[arg(long)]
    public_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let base_url = args.public_url.clone().unwrap_or_else(|| {
        let host = local_ip().unwrap_or_else(|| args.bind.ip().to_string());
        format!("http://{host}:{}", args.bind.port())
    });

    let state = build_state(&args.db, args.assets, base_url, DEFAULT_POLL_WINDOW)?;
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!(bind = %args.bind, base_url = %state.base_url, "server listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}
