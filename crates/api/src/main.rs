use std::sync::Arc;

use anyhow::Context;

use shopkeep_api::{AppConfig, AppServices, build_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shopkeep_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let bind = config.bind;

    let services = Arc::new(AppServices::build(config));
    let workers = services.spawn_workers();
    let app = build_app(Arc::clone(&services));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = ?err, "failed to listen for shutdown signal");
            }
        })
        .await
        .context("server error")?;

    tracing::info!("shutting down");
    workers.shutdown().await;
    Ok(())
}
