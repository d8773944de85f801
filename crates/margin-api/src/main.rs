mod config;
mod error;
mod routes;
mod scheduler;

use std::sync::Arc;

use config::AppConfig;
use routes::{app_router, AppState};
use scheduler::SyncScheduler;
use tokio::sync::Notify;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("margin_api=info".parse()?)
                .add_directive("margin_core=info".parse()?),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting margin-api with config: {:?}", config);

    let db = margin_core::services::open_database(&config.db_path).await?;
    let wake = Arc::new(Notify::new());
    let state = AppState::from_config(Arc::clone(&config), db, Arc::clone(&wake));

    let _scheduler = SyncScheduler::new(
        state.worker(),
        wake,
        config.sync_interval,
        config.sync_debounce,
    )
    .spawn();

    let bind_addr = state.config.bind_addr.clone();
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("margin-api listening on {}", bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
