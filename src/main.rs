use dotenvy::dotenv;
use log::{error, info, warn};
use std::sync::Arc;

use deskserver::config::AppConfig;
use deskserver::server::run_axum_server;
use deskserver::shared::state::AppState;
use deskserver::shared::utils::{create_conn, run_migrations};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = AppConfig::load().map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Failed to load configuration: {}", e),
        )
    })?;
    info!("Starting deskserver v{}", env!("CARGO_PKG_VERSION"));

    let pool = create_conn(&config.database.url, config.database.max_connections).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            format!("Database connection failed: {}", e),
        )
    })?;

    info!("Running database migrations...");
    if let Err(e) = run_migrations(&pool) {
        error!("Failed to run migrations: {}", e);
        warn!("Continuing despite migration errors - database might be partially migrated");
    } else {
        info!("Database migrations completed successfully");
    }

    let state = Arc::new(AppState::new(config, pool));
    run_axum_server(state).await
}
