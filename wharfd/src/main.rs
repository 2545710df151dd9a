use eyre::WrapErr;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use wharfd::config::WharfConfig;
use wharfd::server::Server;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let config = WharfConfig::load().wrap_err("load configuration")?;
    info!("Loaded configuration: {:?}", config);

    Server::new(config)?.run().await
}
