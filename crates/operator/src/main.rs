use anyhow::Context;
use tracing::info;

use selfheal_operator::{backend::create_backend, config::Config, metrics, server::Server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::load().context("failed to load configuration")?;
    info!("Loaded configuration: {:?}", config);

    metrics::register_metrics();

    let backend = create_backend(&config)
        .await
        .context("failed to initialize orchestration backend")?;

    let addr = config.server.addr.clone();
    let server = Server::new(&config, backend);

    info!("Starting server on {}", addr);
    server.start(&addr).await.context("server exited with error")?;

    Ok(())
}
