use anyhow::Context;

use fleetops_api::{ApiConfig, build_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fleetops_observability::init();

    let config = ApiConfig::from_env()?;
    let app = build_app(&config);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, seed_demo = config.seed_demo, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
