//! Arena simulation server entry point: init logging, load config, run.

use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = server::Config::load()?;
    info!(
        port = config.server.port,
        bind = %config.server.bind,
        width = config.world.width,
        height = config.world.height,
        tick_hz = config.server.tick_hz,
        "starting arena server v{}",
        env!("CARGO_PKG_VERSION"),
    );

    server::run(config).await
}
