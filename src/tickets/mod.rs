pub mod hydrate;
pub mod scope;
pub mod sequence;
pub mod status;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::shared::error::ServiceError;
use crate::shared::models::{User, UserRole};
use crate::shared::schema::{queues, ticket_comments, ticket_files, tickets, users};
use crate::shared::state::AppState;
use crate::shared::utils::double_option;
use crate::tickets::hydrate::HydratedTicket;
use crate::tickets::scope::VisibilityScope;
use crate::tickets::status::{TicketCategory, TicketPriority, TicketStatus};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = tickets)]
pub struct Ticket {
    /// Zero-padded sequence number, e.g. "00007". Assigned once, never reused.
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub category: String,
    pub created_by: Uuid,
    pub client_id: Uuid,
    pub assigned_to: Option<Uuid>,
    pub queue_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = ticket_comments)]
pub struct TicketComment {
    pub id: Uuid,
    pub ticket_id: String,
    pub author_id: Uuid,
    /// Denormalized at write time so comments outlive their author.
    pub author_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = ticket_files)]
pub struct TicketFile {
    pub id: Uuid,
    pub ticket_id: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub title: String,
    pub description: String,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub created_by: Uuid,
    /// Who the ticket is about; defaults to the creator.
    pub client_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub queue_id: Option<Uuid>,
    /// Queue by name, resolved case-insensitively. Takes precedence over
    /// `queue_id` when both are present.
    pub queue: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    /// Absent leaves assignment alone; an explicit `null` unassigns.
    #[serde(default, deserialize_with = "double_option")]
    pub assigned_to: Option<Option<Uuid>>,
    /// Absent leaves the queue alone; an explicit `null` removes the ticket
    /// from its queue.
    #[serde(default, deserialize_with = "double_option")]
    pub queue_id: Option<Option<Uuid>>,
    pub queue: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub author_id: Uuid,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct AttachFileRequest {
    pub file_name: String,
    pub content_type: Option<String>,
    pub size_bytes: Option<i64>,
    /// Where the bytes live; upload transport is handled elsewhere.
    pub storage_key: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub role: String,
    pub user_id: Uuid,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub queue_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RequesterQuery {
    pub role: String,
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RoleQuery {
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct TicketStats {
    pub total: i64,
    pub open: i64,
    pub in_progress: i64,
    pub waiting: i64,
    pub testing: i64,
    pub resolved: i64,
    pub closed: i64,
}

fn parse_role(raw: &str) -> Result<UserRole, ServiceError> {
    UserRole::from_str(raw).map_err(|e| ServiceError::validation(vec![e]))
}

/// Accepts a queue as a uuid or by name and confirms it exists. A name
/// matches case-insensitively against the full queue name.
fn resolve_queue(
    conn: &mut PgConnection,
    queue_id: Option<Uuid>,
    queue_name: Option<&str>,
) -> Result<Option<Uuid>, ServiceError> {
    if let Some(name) = queue_name {
        let found: Option<Uuid> = queues::table
            .filter(queues::name.ilike(name))
            .select(queues::id)
            .first(conn)
            .optional()?;
        return match found {
            Some(id) => Ok(Some(id)),
            None => Err(ServiceError::validation(vec![format!(
                "unknown queue '{name}'"
            )])),
        };
    }
    if let Some(id) = queue_id {
        let found: Option<Uuid> = queues::table
            .find(id)
            .select(queues::id)
            .first(conn)
            .optional()?;
        return match found {
            Some(id) => Ok(Some(id)),
            None => Err(ServiceError::validation(vec![format!("unknown queue {id}")])),
        };
    }
    Ok(None)
}

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTicketRequest>,
) -> Result<Json<HydratedTicket>, ServiceError> {
    let mut conn = state.conn.get()?;

    let mut violations = Vec::new();
    if req.title.trim().is_empty() {
        violations.push("title must not be empty".to_string());
    }
    let priority = match req.priority.as_deref() {
        Some(raw) => TicketPriority::from_str(raw).unwrap_or_else(|e| {
            violations.push(e);
            TicketPriority::default()
        }),
        None => TicketPriority::default(),
    };
    let category = match req.category.as_deref() {
        Some(raw) => TicketCategory::from_str(raw).unwrap_or_else(|e| {
            violations.push(e);
            TicketCategory::default()
        }),
        None => TicketCategory::default(),
    };
    let queue_id = match resolve_queue(&mut conn, req.queue_id, req.queue.as_deref()) {
        Ok(resolved) => resolved,
        Err(ServiceError::Validation(mut more)) => {
            violations.append(&mut more);
            None
        }
        Err(other) => return Err(other),
    };
    if !violations.is_empty() {
        return Err(ServiceError::validation(violations));
    }

    let now = Utc::now();
    let template = Ticket {
        id: String::new(),
        title: req.title.trim().to_string(),
        description: req.description,
        status: TicketStatus::default().to_string(),
        priority: priority.to_string(),
        category: category.to_string(),
        created_by: req.created_by,
        client_id: req.client_id.unwrap_or(req.created_by),
        assigned_to: req.assigned_to,
        queue_id,
        created_at: now,
        updated_at: now,
    };

    let existing: Vec<String> = tickets::table.select(tickets::id).load(&mut conn)?;
    let id = sequence::insert_with_retry(&existing, None, |candidate| {
        let row = Ticket {
            id: candidate.to_string(),
            ..template.clone()
        };
        diesel::insert_into(tickets::table)
            .values(&row)
            .execute(&mut conn)
            .map(|_| ())
    })?;

    let ticket = Ticket { id, ..template };
    Ok(Json(hydrate::resolve_ticket(&mut conn, ticket)?))
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<HydratedTicket>>, ServiceError> {
    let mut conn = state.conn.get()?;

    let role = parse_role(&query.role)?;
    let scope = scope::scope_for(role, query.user_id);
    let limit = query.limit.unwrap_or(50);
    let offset = query.offset.unwrap_or(0);

    let mut q = tickets::table.into_boxed();
    q = scope::apply_scope(&scope, &mut conn, q)?;

    if let Some(status) = query.status {
        q = q.filter(tickets::status.eq(status));
    }

    if let Some(priority) = query.priority {
        q = q.filter(tickets::priority.eq(priority));
    }

    if let Some(category) = query.category {
        q = q.filter(tickets::category.eq(category));
    }

    if let Some(assigned_to) = query.assigned_to {
        q = q.filter(tickets::assigned_to.eq(assigned_to));
    }

    if let Some(created_by) = query.created_by {
        q = q.filter(tickets::created_by.eq(created_by));
    }

    if let Some(queue_id) = query.queue_id {
        q = q.filter(tickets::queue_id.eq(queue_id));
    }

    if let Some(search) = query.search {
        let pattern = format!("%{search}%");
        q = q.filter(
            tickets::title
                .ilike(pattern.clone())
                .or(tickets::description.ilike(pattern.clone()))
                .or(tickets::id.ilike(pattern)),
        );
    }

    let rows: Vec<Ticket> = q
        .order(tickets::updated_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;

    Ok(Json(hydrate::resolve_all(&mut conn, rows)?))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<HydratedTicket>, ServiceError> {
    let mut conn = state.conn.get()?;

    let ticket: Ticket = tickets::table
        .find(&id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ServiceError::not_found("ticket", &id))?;

    Ok(Json(hydrate::resolve_ticket(&mut conn, ticket)?))
}

pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTicketRequest>,
) -> Result<Json<HydratedTicket>, ServiceError> {
    let mut conn = state.conn.get()?;

    // Existence is checked before anything is written so a bad id never
    // half-applies a patch.
    let exists: Option<String> = tickets::table
        .find(&id)
        .select(tickets::id)
        .first(&mut conn)
        .optional()?;
    if exists.is_none() {
        return Err(ServiceError::not_found("ticket", &id));
    }

    let mut violations = Vec::new();
    if let Some(title) = &req.title {
        if title.trim().is_empty() {
            violations.push("title must not be empty".to_string());
        }
    }
    let status = match req.status.as_deref().map(TicketStatus::from_str) {
        Some(Ok(s)) => Some(s),
        Some(Err(e)) => {
            violations.push(e);
            None
        }
        None => None,
    };
    let priority = match req.priority.as_deref().map(TicketPriority::from_str) {
        Some(Ok(p)) => Some(p),
        Some(Err(e)) => {
            violations.push(e);
            None
        }
        None => None,
    };
    let category = match req.category.as_deref().map(TicketCategory::from_str) {
        Some(Ok(c)) => Some(c),
        Some(Err(e)) => {
            violations.push(e);
            None
        }
        None => None,
    };
    let queue_change: Option<Option<Uuid>> =
        if req.queue.is_some() || matches!(req.queue_id, Some(Some(_))) {
            match resolve_queue(&mut conn, req.queue_id.flatten(), req.queue.as_deref()) {
                Ok(resolved) => Some(resolved),
                Err(ServiceError::Validation(mut more)) => {
                    violations.append(&mut more);
                    None
                }
                Err(other) => return Err(other),
            }
        } else if matches!(req.queue_id, Some(None)) {
            Some(None)
        } else {
            None
        };
    if !violations.is_empty() {
        return Err(ServiceError::validation(violations));
    }

    let now = Utc::now();

    diesel::update(tickets::table.find(&id))
        .set(tickets::updated_at.eq(now))
        .execute(&mut conn)?;

    if let Some(title) = req.title {
        diesel::update(tickets::table.find(&id))
            .set(tickets::title.eq(title.trim().to_string()))
            .execute(&mut conn)?;
    }

    if let Some(description) = req.description {
        diesel::update(tickets::table.find(&id))
            .set(tickets::description.eq(description))
            .execute(&mut conn)?;
    }

    if let Some(status) = status {
        diesel::update(tickets::table.find(&id))
            .set(tickets::status.eq(status.to_string()))
            .execute(&mut conn)?;
    }

    if let Some(priority) = priority {
        diesel::update(tickets::table.find(&id))
            .set(tickets::priority.eq(priority.to_string()))
            .execute(&mut conn)?;
    }

    if let Some(category) = category {
        diesel::update(tickets::table.find(&id))
            .set(tickets::category.eq(category.to_string()))
            .execute(&mut conn)?;
    }

    if let Some(change) = req.assigned_to {
        diesel::update(tickets::table.find(&id))
            .set(tickets::assigned_to.eq(change))
            .execute(&mut conn)?;
    }

    if let Some(change) = queue_change {
        diesel::update(tickets::table.find(&id))
            .set(tickets::queue_id.eq(change))
            .execute(&mut conn)?;
    }

    let ticket: Ticket = tickets::table.find(&id).first(&mut conn)?;
    Ok(Json(hydrate::resolve_ticket(&mut conn, ticket)?))
}

pub async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<RoleQuery>,
) -> Result<StatusCode, ServiceError> {
    let role = parse_role(&query.role)?;
    if role != UserRole::Admin {
        return Err(ServiceError::Forbidden(
            "only admins can delete tickets".to_string(),
        ));
    }

    let mut conn = state.conn.get()?;

    let exists: Option<String> = tickets::table
        .find(&id)
        .select(tickets::id)
        .first(&mut conn)
        .optional()?;
    if exists.is_none() {
        return Err(ServiceError::not_found("ticket", &id));
    }

    // Comments and files go with their ticket.
    diesel::delete(ticket_comments::table.filter(ticket_comments::ticket_id.eq(&id)))
        .execute(&mut conn)?;
    diesel::delete(ticket_files::table.filter(ticket_files::ticket_id.eq(&id)))
        .execute(&mut conn)?;
    diesel::delete(tickets::table.find(&id)).execute(&mut conn)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<String>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<Json<TicketComment>, ServiceError> {
    let mut conn = state.conn.get()?;

    if req.content.trim().is_empty() {
        return Err(ServiceError::validation(vec![
            "content must not be empty".to_string(),
        ]));
    }

    let exists: Option<String> = tickets::table
        .find(&ticket_id)
        .select(tickets::id)
        .first(&mut conn)
        .optional()?;
    if exists.is_none() {
        return Err(ServiceError::not_found("ticket", &ticket_id));
    }

    let author: User = users::table
        .find(req.author_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ServiceError::not_found("user", req.author_id))?;

    let now = Utc::now();
    let comment = TicketComment {
        id: Uuid::new_v4(),
        ticket_id: ticket_id.clone(),
        author_id: author.id,
        author_name: author.name,
        content: req.content,
        created_at: now,
    };

    diesel::insert_into(ticket_comments::table)
        .values(&comment)
        .execute(&mut conn)?;

    diesel::update(tickets::table.find(&ticket_id))
        .set(tickets::updated_at.eq(now))
        .execute(&mut conn)?;

    Ok(Json(comment))
}

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<String>,
) -> Result<Json<Vec<TicketComment>>, ServiceError> {
    let mut conn = state.conn.get()?;

    let exists: Option<String> = tickets::table
        .find(&ticket_id)
        .select(tickets::id)
        .first(&mut conn)
        .optional()?;
    if exists.is_none() {
        return Err(ServiceError::not_found("ticket", &ticket_id));
    }

    let comments: Vec<TicketComment> = ticket_comments::table
        .filter(ticket_comments::ticket_id.eq(&ticket_id))
        .order(ticket_comments::created_at.asc())
        .load(&mut conn)?;

    Ok(Json(comments))
}

pub async fn attach_file(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<String>,
    Json(req): Json<AttachFileRequest>,
) -> Result<Json<TicketFile>, ServiceError> {
    let mut conn = state.conn.get()?;

    if req.file_name.trim().is_empty() {
        return Err(ServiceError::validation(vec![
            "file_name must not be empty".to_string(),
        ]));
    }

    let exists: Option<String> = tickets::table
        .find(&ticket_id)
        .select(tickets::id)
        .first(&mut conn)
        .optional()?;
    if exists.is_none() {
        return Err(ServiceError::not_found("ticket", &ticket_id));
    }

    let now = Utc::now();
    let file = TicketFile {
        id: Uuid::new_v4(),
        ticket_id: ticket_id.clone(),
        file_name: req.file_name,
        content_type: req
            .content_type
            .unwrap_or_else(|| "application/octet-stream".to_string()),
        size_bytes: req.size_bytes.unwrap_or(0),
        storage_key: req.storage_key,
        created_at: now,
    };

    diesel::insert_into(ticket_files::table)
        .values(&file)
        .execute(&mut conn)?;

    diesel::update(tickets::table.find(&ticket_id))
        .set(tickets::updated_at.eq(now))
        .execute(&mut conn)?;

    Ok(Json(file))
}

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<String>,
) -> Result<Json<Vec<TicketFile>>, ServiceError> {
    let mut conn = state.conn.get()?;

    let exists: Option<String> = tickets::table
        .find(&ticket_id)
        .select(tickets::id)
        .first(&mut conn)
        .optional()?;
    if exists.is_none() {
        return Err(ServiceError::not_found("ticket", &ticket_id));
    }

    let files: Vec<TicketFile> = ticket_files::table
        .filter(ticket_files::ticket_id.eq(&ticket_id))
        .order(ticket_files::created_at.asc())
        .load(&mut conn)?;

    Ok(Json(files))
}

fn scoped_count(
    conn: &mut PgConnection,
    scope: &VisibilityScope,
    statuses: &[TicketStatus],
) -> Result<i64, ServiceError> {
    let q = tickets::table.into_boxed();
    let mut q = scope::apply_scope(scope, conn, q)?;
    if !statuses.is_empty() {
        let values: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();
        q = q.filter(tickets::status.eq_any(values));
    }
    Ok(q.count().get_result(conn)?)
}

pub async fn ticket_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RequesterQuery>,
) -> Result<Json<TicketStats>, ServiceError> {
    let mut conn = state.conn.get()?;

    let role = parse_role(&query.role)?;
    let scope = scope::scope_for(role, query.user_id);

    let stats = TicketStats {
        total: scoped_count(&mut conn, &scope, &[])?,
        open: scoped_count(&mut conn, &scope, &[TicketStatus::Aberto])?,
        in_progress: scoped_count(
            &mut conn,
            &scope,
            &[TicketStatus::EmAndamento, TicketStatus::EmAtendimento],
        )?,
        waiting: scoped_count(
            &mut conn,
            &scope,
            &[TicketStatus::Pendente, TicketStatus::AguardandoCliente],
        )?,
        testing: scoped_count(
            &mut conn,
            &scope,
            &[TicketStatus::EmFaseDeTestes, TicketStatus::Homologacao],
        )?,
        resolved: scoped_count(&mut conn, &scope, &[TicketStatus::Resolvido])?,
        closed: scoped_count(
            &mut conn,
            &scope,
            &[TicketStatus::Fechado, TicketStatus::Encerrado],
        )?,
    };

    Ok(Json(stats))
}

pub fn configure_tickets_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/stats", get(ticket_stats))
        .route(
            "/api/tickets/:id",
            get(get_ticket).put(update_ticket).delete(delete_ticket),
        )
        .route(
            "/api/tickets/:id/comments",
            get(list_comments).post(add_comment),
        )
        .route("/api/tickets/:id/files", get(list_files).post(attach_file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_distinguishes_absent_from_explicit_null() {
        let absent: UpdateTicketRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.assigned_to, None);
        assert_eq!(absent.queue_id, None);

        let cleared: UpdateTicketRequest =
            serde_json::from_str(r#"{"assigned_to": null, "queue_id": null}"#).unwrap();
        assert_eq!(cleared.assigned_to, Some(None));
        assert_eq!(cleared.queue_id, Some(None));

        let id = Uuid::new_v4();
        let body = format!(r#"{{"assigned_to": "{id}"}}"#);
        let set: UpdateTicketRequest = serde_json::from_str(&body).unwrap();
        assert_eq!(set.assigned_to, Some(Some(id)));
    }

    #[test]
    fn create_request_defaults_are_optional() {
        let id = Uuid::new_v4();
        let body = format!(r#"{{"title": "t", "description": "d", "created_by": "{id}"}}"#);
        let req: CreateTicketRequest = serde_json::from_str(&body).unwrap();
        assert!(req.priority.is_none());
        assert!(req.client_id.is_none());
        assert!(req.queue.is_none());
    }

    #[test]
    fn unknown_role_in_query_is_a_validation_error() {
        assert!(matches!(
            parse_role("root"),
            Err(ServiceError::Validation(_))
        ));
        assert!(parse_role("technician_n2").is_ok());
    }
}
