//! Combines the per-module routers into the service's REST surface.

use axum::Router;
use std::sync::Arc;

use crate::shared::state::AppState;

pub fn configure_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(crate::tickets::configure_tickets_routes())
        .merge(crate::financial::configure_financial_routes())
        .merge(crate::users::configure_users_routes())
        .merge(crate::queues::configure_queues_routes())
}
