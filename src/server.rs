//! HTTP server initialization and routing

use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api_router::configure_api_routes;
use crate::shared::state::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let db_ok = state.conn.get().is_ok();

    let status = if db_ok { "healthy" } else { "degraded" };
    let code = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(serde_json::json!({
            "status": status,
            "service": "deskserver",
            "version": env!("CARGO_PKG_VERSION"),
            "database": db_ok
        })),
    )
}

pub async fn health_check_simple() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "deskserver",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

fn create_cors_layer() -> CorsLayer {
    // The service sits behind the workspace gateway, which enforces the
    // origin policy. Here we only need preflight to succeed.
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub async fn run_axum_server(app_state: Arc<AppState>) -> std::io::Result<()> {
    let host = app_state.config.server.host.clone();
    let port = app_state.config.server.port;

    let api_router = Router::new()
        .route("/health", get(health_check_simple))
        .route("/api/health", get(health_check))
        .merge(configure_api_routes());

    let app = api_router
        .with_state(app_state)
        .layer(create_cors_layer())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = match format!("{}:{}", host, port).parse() {
        Ok(a) => a,
        Err(e) => {
            error!("Invalid server address {}:{}: {}", host, port, e);
            return Err(std::io::Error::other(e));
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(
                "Failed to bind to {}: {} - is another instance running?",
                addr, e
            );
            return Err(e);
        }
    };
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(std::io::Error::other)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}
