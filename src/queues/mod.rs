use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::shared::error::ServiceError;
use crate::shared::models::{Queue, UserRole};
use crate::shared::schema::queues;
use crate::shared::state::AppState;
use crate::tickets::RoleQuery;

#[derive(Debug, Deserialize)]
pub struct CreateQueueRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQueueRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct QueueListQuery {
    pub active: Option<bool>,
}

fn require_admin(raw_role: &str) -> Result<(), ServiceError> {
    let role = UserRole::from_str(raw_role).map_err(|e| ServiceError::validation(vec![e]))?;
    if role == UserRole::Admin {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "only admins can manage queues".to_string(),
        ))
    }
}

pub async fn create_queue(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RoleQuery>,
    Json(req): Json<CreateQueueRequest>,
) -> Result<Json<Queue>, ServiceError> {
    require_admin(&query.role)?;

    if req.name.trim().is_empty() {
        return Err(ServiceError::validation(vec![
            "name must not be empty".to_string(),
        ]));
    }

    let mut conn = state.conn.get()?;
    let queue = Queue {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        description: req.description,
        is_active: true,
        created_at: Utc::now(),
    };

    diesel::insert_into(queues::table)
        .values(&queue)
        .execute(&mut conn)?;

    Ok(Json(queue))
}

pub async fn list_queues(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QueueListQuery>,
) -> Result<Json<Vec<Queue>>, ServiceError> {
    let mut conn = state.conn.get()?;

    let mut q = queues::table.into_boxed();

    if let Some(active) = query.active {
        q = q.filter(queues::is_active.eq(active));
    }

    let found: Vec<Queue> = q.order(queues::name.asc()).load(&mut conn)?;

    Ok(Json(found))
}

pub async fn get_queue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Queue>, ServiceError> {
    let mut conn = state.conn.get()?;

    let queue: Queue = queues::table
        .find(id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ServiceError::not_found("queue", id))?;

    Ok(Json(queue))
}

pub async fn update_queue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<RoleQuery>,
    Json(req): Json<UpdateQueueRequest>,
) -> Result<Json<Queue>, ServiceError> {
    require_admin(&query.role)?;

    let mut conn = state.conn.get()?;

    let exists: Option<Uuid> = queues::table
        .find(id)
        .select(queues::id)
        .first(&mut conn)
        .optional()?;
    if exists.is_none() {
        return Err(ServiceError::not_found("queue", id));
    }

    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            return Err(ServiceError::validation(vec![
                "name must not be empty".to_string(),
            ]));
        }
    }

    if let Some(name) = req.name {
        diesel::update(queues::table.find(id))
            .set(queues::name.eq(name.trim().to_string()))
            .execute(&mut conn)?;
    }

    if let Some(description) = req.description {
        diesel::update(queues::table.find(id))
            .set(queues::description.eq(description))
            .execute(&mut conn)?;
    }

    if let Some(is_active) = req.is_active {
        diesel::update(queues::table.find(id))
            .set(queues::is_active.eq(is_active))
            .execute(&mut conn)?;
    }

    let queue: Queue = queues::table.find(id).first(&mut conn)?;
    Ok(Json(queue))
}

pub async fn delete_queue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<RoleQuery>,
) -> Result<StatusCode, ServiceError> {
    require_admin(&query.role)?;

    let mut conn = state.conn.get()?;

    let exists: Option<Uuid> = queues::table
        .find(id)
        .select(queues::id)
        .first(&mut conn)
        .optional()?;
    if exists.is_none() {
        return Err(ServiceError::not_found("queue", id));
    }

    // Tickets that pointed here keep their queue_id; reads resolve it to
    // null from now on.
    diesel::delete(queues::table.find(id)).execute(&mut conn)?;

    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_queues_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/queues", get(list_queues).post(create_queue))
        .route(
            "/api/queues/:id",
            get(get_queue).put(update_queue).delete(delete_queue),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_management_is_admin_only() {
        assert!(require_admin("admin").is_ok());
        assert!(matches!(
            require_admin("technician"),
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            require_admin("supervisor"),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn queue_name_is_required() {
        assert!(serde_json::from_str::<CreateQueueRequest>(r#"{"description": "x"}"#).is_err());
    }
}
