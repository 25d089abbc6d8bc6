use docket_api::config::config;
use docket_api::database::Database;
use docket_api::routes;
use docket_api::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("docket_api=info,tower_http=info")),
        )
        .init();

    let config = config();
    config.validate()?;
    tracing::info!("Starting Docket API in {:?} mode", config.environment);

    let db = Database::connect(&config.database).await?;
    if config.server.auto_migrate {
        db.migrate().await?;
    }

    let state = AppState::new(config.clone(), db.clone());
    tracing::info!(storage = state.storage.name(), "Storage provider ready");
    let app = routes::app(state);

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Docket API listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
