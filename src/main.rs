use anyhow::Result;
use clap::Parser;
use proxy_harvest::{Collector, Config, RunOutcome, ShutdownController};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Discover, validate and publish open proxies
#[derive(Parser)]
#[command(name = "proxy-harvest")]
#[command(about = "Discover, validate and publish open proxies")]
struct Cli {
    /// Redis key that stores the verified proxies
    #[arg(long, default_value = "set:proxies")]
    key: String,

    /// Full Redis URL to connect to
    #[arg(long, default_value = "redis://127.0.0.1:6379")]
    url: String,

    /// Redis database that stores the verified proxies
    #[arg(long, default_value_t = 0)]
    db: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = Config::new()
        .with_store(cli.key, cli.url, cli.db)
        .with_env_overrides();

    let shutdown = Arc::new(ShutdownController::new());
    let signals = shutdown.listen_for_signals();

    let collector = Collector::bootstrap(&config, Arc::clone(&shutdown)).await?;
    match collector.run().await {
        RunOutcome::Completed => info!("[*] Done"),
        RunOutcome::WarmShutdown => warn!("[-] Stopped early after interrupt"),
        RunOutcome::ColdShutdown => warn!("[-] Stopped immediately after second interrupt"),
    }

    signals.abort();
    Ok(())
}
