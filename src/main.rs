use anyhow::Context;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use backoffice_sync::{app, config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, SHEETS_SPREADSHEET_ID, etc.
    let _ = dotenvy::dotenv();

    let default_filter = if backoffice_sync::is_development!() { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    // Initialize configuration (this loads the config singleton)
    let config = config::config();
    tracing::info!("Starting back-office sync API in {:?} mode", config.environment);

    let state = app::bootstrap(config).await?;
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let scheduler = state.scheduler.clone().spawn(shutdown_tx.subscribe());
    let database = state.database.clone();

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("Listening on http://{}", bind_addr);

    let shutdown = {
        let shutdown_tx = shutdown_tx.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("ctrl-c handler failed: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("received ctrl-c, shutting down");
            let _ = shutdown_tx.send(());
        }
    };

    axum::serve(listener, app::router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")?;

    if let Err(e) = scheduler.await {
        tracing::error!("scheduler task failed: {}", e);
    }
    if let Some(database) = database {
        database.close().await;
    }
    Ok(())
}
