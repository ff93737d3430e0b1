use anyhow::Result;
use axum::Router;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};
use wordex_core::{RetryPolicy, DEFAULT_CACHE_CAPACITY};
use wordex_server::{build_app, AppConfig};

#[derive(Parser)]
struct Args {
    /// sled database directory
    #[arg(long, default_value = "./wordex-db")]
    db: PathBuf,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Retries after a failed cache or store call
    #[arg(long, default_value_t = 3)]
    retry_attempts: u32,
    /// Delay before the first retry, doubled for each one after
    #[arg(long, default_value_t = 1000)]
    retry_base_ms: u64,
    /// Upper bound on a single retry delay
    #[arg(long, default_value_t = 5000)]
    retry_max_ms: u64,
    /// Maximum number of cached query results
    #[arg(long, default_value_t = DEFAULT_CACHE_CAPACITY)]
    cache_capacity: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let retry = RetryPolicy {
        max_retries: args.retry_attempts,
        base_delay: Duration::from_millis(args.retry_base_ms),
        max_delay: Duration::from_millis(args.retry_max_ms),
        ..RetryPolicy::default()
    };
    let config = AppConfig {
        db_path: args.db,
        retry,
        cache_capacity: args.cache_capacity,
        admin_token: std::env::var("ADMIN_TOKEN").ok(),
    };
    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN not set, article indexing endpoint will reject requests");
    }
    let app: Router = build_app(config)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
