use famledger_server::{api::app_router, build_state, config::Config, init_tracing};

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);
    tracing::info!(
        "Starting famledger server ({:?} provider)",
        config.provider.mode
    );
    let state = build_state(&config).await?;

    let router = app_router(state.clone());
    tracing::info!("Listening on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Waiting for running syncs to finish");
    state.scheduler.shutdown().await;
    Ok(())
}
