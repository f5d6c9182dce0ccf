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
use crate::shared::models::{User, UserRole};
use crate::shared::schema::users;
use crate::shared::state::AppState;
use crate::shared::utils::double_option;
use crate::tickets::{RequesterQuery, RoleQuery};

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    /// Defaults to `user` when omitted.
    pub role: Option<String>,
    pub avatar: Option<String>,
    pub company: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub avatar: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub company: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub role: String,
    pub role_filter: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Admins create any kind of account; technicians may only register
/// clients for walk-in tickets.
fn can_create(actor: UserRole, new_role: UserRole) -> bool {
    match actor {
        UserRole::Admin => true,
        UserRole::Technician | UserRole::TechnicianN2 => new_role == UserRole::User,
        _ => false,
    }
}

fn parse_role(raw: &str) -> Result<UserRole, ServiceError> {
    UserRole::from_str(raw).map_err(|e| ServiceError::validation(vec![e]))
}

fn map_unique_email(e: diesel::result::Error) -> ServiceError {
    match e {
        diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        ) => ServiceError::validation(vec!["email already registered".to_string()]),
        other => ServiceError::from(other),
    }
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RoleQuery>,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<User>, ServiceError> {
    let actor = parse_role(&query.role)?;

    let mut violations = Vec::new();
    if req.name.trim().is_empty() {
        violations.push("name must not be empty".to_string());
    }
    if req.email.trim().is_empty() {
        violations.push("email must not be empty".to_string());
    }
    let new_role = match req.role.as_deref() {
        Some(raw) => UserRole::from_str(raw).unwrap_or_else(|e| {
            violations.push(e);
            UserRole::User
        }),
        None => UserRole::User,
    };
    if !violations.is_empty() {
        return Err(ServiceError::validation(violations));
    }

    if !can_create(actor, new_role) {
        return Err(ServiceError::Forbidden(format!(
            "role {actor} cannot create {new_role} accounts"
        )));
    }

    let mut conn = state.conn.get()?;
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        email: req.email.trim().to_string(),
        // Credentials are set through the account flow, not here.
        password_hash: String::new(),
        role: new_role.to_string(),
        avatar: req.avatar,
        company: req.company,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(users::table)
        .values(&user)
        .execute(&mut conn)
        .map_err(map_unique_email)?;

    Ok(Json(user))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Vec<User>>, ServiceError> {
    let actor = parse_role(&query.role)?;
    if !actor.is_staff() {
        return Err(ServiceError::Forbidden(
            "clients cannot list accounts".to_string(),
        ));
    }

    let mut conn = state.conn.get()?;
    let limit = query.limit.unwrap_or(100);
    let offset = query.offset.unwrap_or(0);

    let mut q = users::table.into_boxed();

    if let Some(role_filter) = query.role_filter {
        q = q.filter(users::role.eq(role_filter));
    }

    if let Some(search) = query.search {
        let pattern = format!("%{search}%");
        q = q.filter(users::name.ilike(pattern.clone()).or(users::email.ilike(pattern)));
    }

    let found: Vec<User> = q
        .order(users::name.asc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;

    Ok(Json(found))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, ServiceError> {
    let mut conn = state.conn.get()?;

    let user: User = users::table
        .find(id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ServiceError::not_found("user", id))?;

    Ok(Json(user))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<RequesterQuery>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>, ServiceError> {
    let actor = parse_role(&query.role)?;
    if actor != UserRole::Admin && query.user_id != id {
        return Err(ServiceError::Forbidden(
            "accounts can only be edited by their owner or an admin".to_string(),
        ));
    }
    if req.role.is_some() && actor != UserRole::Admin {
        return Err(ServiceError::Forbidden(
            "only admins can change roles".to_string(),
        ));
    }

    let mut conn = state.conn.get()?;

    let exists: Option<Uuid> = users::table
        .find(id)
        .select(users::id)
        .first(&mut conn)
        .optional()?;
    if exists.is_none() {
        return Err(ServiceError::not_found("user", id));
    }

    let mut violations = Vec::new();
    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            violations.push("name must not be empty".to_string());
        }
    }
    if let Some(email) = &req.email {
        if email.trim().is_empty() {
            violations.push("email must not be empty".to_string());
        }
    }
    let role = match req.role.as_deref().map(UserRole::from_str) {
        Some(Ok(r)) => Some(r),
        Some(Err(e)) => {
            violations.push(e);
            None
        }
        None => None,
    };
    if !violations.is_empty() {
        return Err(ServiceError::validation(violations));
    }

    let now = Utc::now();

    diesel::update(users::table.find(id))
        .set(users::updated_at.eq(now))
        .execute(&mut conn)?;

    if let Some(name) = req.name {
        diesel::update(users::table.find(id))
            .set(users::name.eq(name.trim().to_string()))
            .execute(&mut conn)?;
    }

    if let Some(email) = req.email {
        diesel::update(users::table.find(id))
            .set(users::email.eq(email.trim().to_string()))
            .execute(&mut conn)
            .map_err(map_unique_email)?;
    }

    if let Some(role) = role {
        diesel::update(users::table.find(id))
            .set(users::role.eq(role.to_string()))
            .execute(&mut conn)?;
    }

    if let Some(change) = req.avatar {
        diesel::update(users::table.find(id))
            .set(users::avatar.eq(change))
            .execute(&mut conn)?;
    }

    if let Some(change) = req.company {
        diesel::update(users::table.find(id))
            .set(users::company.eq(change))
            .execute(&mut conn)?;
    }

    let user: User = users::table.find(id).first(&mut conn)?;
    Ok(Json(user))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<RoleQuery>,
) -> Result<StatusCode, ServiceError> {
    let role = parse_role(&query.role)?;
    if role != UserRole::Admin {
        return Err(ServiceError::Forbidden(
            "only admins can delete accounts".to_string(),
        ));
    }

    let mut conn = state.conn.get()?;

    let exists: Option<Uuid> = users::table
        .find(id)
        .select(users::id)
        .first(&mut conn)
        .optional()?;
    if exists.is_none() {
        return Err(ServiceError::not_found("user", id));
    }

    // Tickets keep their reference; reads substitute a placeholder.
    diesel::delete(users::table.find(id)).execute(&mut conn)?;

    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_users_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route(
            "/api/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admins_create_any_account() {
        for role in [
            UserRole::Admin,
            UserRole::Technician,
            UserRole::TechnicianN2,
            UserRole::User,
            UserRole::Financial,
        ] {
            assert!(can_create(UserRole::Admin, role));
        }
    }

    #[test]
    fn technicians_only_register_clients() {
        assert!(can_create(UserRole::Technician, UserRole::User));
        assert!(can_create(UserRole::TechnicianN2, UserRole::User));
        assert!(!can_create(UserRole::Technician, UserRole::Admin));
        assert!(!can_create(UserRole::TechnicianN2, UserRole::Technician));
    }

    #[test]
    fn clients_never_create_accounts() {
        assert!(!can_create(UserRole::User, UserRole::User));
        assert!(!can_create(UserRole::Financial, UserRole::User));
    }

    #[test]
    fn avatar_can_be_cleared_with_an_explicit_null() {
        let req: UpdateUserRequest = serde_json::from_str(r#"{"avatar": null}"#).unwrap();
        assert_eq!(req.avatar, Some(None));
        let req: UpdateUserRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.avatar, None);
    }
}
