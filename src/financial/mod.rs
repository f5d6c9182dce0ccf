pub mod erp;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::shared::error::ServiceError;
use crate::shared::models::UserRole;
use crate::shared::schema::financial_tickets;
use crate::shared::state::AppState;
use crate::tickets::hydrate::{self, UserRef, MISSING_CLIENT};
use crate::tickets::sequence;
use crate::tickets::status::FinancialStatus;
use crate::tickets::RoleQuery;

/// Financial ticket ids read "FT-00007".
pub const FT_PREFIX: &str = "FT-";

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = financial_tickets)]
pub struct FinancialTicket {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub amount: BigDecimal,
    pub due_date: NaiveDate,
    pub payment_date: Option<DateTime<Utc>>,
    pub status: String,
    pub client_id: Uuid,
    pub created_by: Uuid,
    /// External identity. The (`erp_id`, `erp_type`) pair is unique among
    /// ERP-sourced tickets and drives idempotent reconciliation.
    pub erp_id: Option<String>,
    pub erp_type: Option<String>,
    pub invoice_number: Option<String>,
    pub barcode: Option<String>,
    pub our_number: Option<String>,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
    pub notes: Option<String>,
    pub metadata: serde_json::Value,
    pub invoice_file: Option<String>,
    pub receipt_file: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HydratedFinancialTicket {
    #[serde(flatten)]
    pub ticket: FinancialTicket,
    pub client: UserRef,
}

#[derive(Debug, Deserialize)]
pub struct CreateFinancialTicketRequest {
    pub title: String,
    pub description: Option<String>,
    pub amount: BigDecimal,
    pub due_date: NaiveDate,
    pub client_id: Uuid,
    pub created_by: Uuid,
    pub invoice_number: Option<String>,
    pub barcode: Option<String>,
    pub our_number: Option<String>,
    pub notes: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFinancialTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub amount: Option<BigDecimal>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
    pub notes: Option<String>,
    pub invoice_file: Option<String>,
    pub receipt_file: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FinancialListQuery {
    pub role: String,
    pub user_id: Uuid,
    pub status: Option<String>,
    pub client_id: Option<Uuid>,
    pub erp_type: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Billing data is need-to-know: admins and the financial team see
/// everything, everyone else only tickets billed to them.
fn financial_scope(role: UserRole, user_id: Uuid) -> Option<Uuid> {
    match role {
        UserRole::Admin | UserRole::Financial => None,
        _ => Some(user_id),
    }
}

fn parse_role(raw: &str) -> Result<UserRole, ServiceError> {
    UserRole::from_str(raw).map_err(|e| ServiceError::validation(vec![e]))
}

/// Shared-secret check for ERP pushes. With no key configured the
/// endpoints accept unauthenticated events, which suits local setups.
fn check_api_key(state: &AppState, headers: &HeaderMap) -> Result<(), ServiceError> {
    let Some(expected) = state.config.erp.webhook_api_key.as_deref() else {
        return Ok(());
    };
    let presented = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    if presented == Some(expected) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "invalid or missing api key".to_string(),
        ))
    }
}

fn hydrate_one(
    conn: &mut PgConnection,
    ticket: FinancialTicket,
) -> Result<HydratedFinancialTicket, ServiceError> {
    let client = hydrate::resolve_user(conn, None, ticket.client_id, MISSING_CLIENT)?;
    Ok(HydratedFinancialTicket { ticket, client })
}

fn hydrate_all(
    conn: &mut PgConnection,
    rows: Vec<FinancialTicket>,
) -> Result<Vec<HydratedFinancialTicket>, ServiceError> {
    let ids: HashSet<Uuid> = rows.iter().map(|t| t.client_id).collect();
    let map = hydrate::load_user_map(conn, ids.into_iter().collect());
    rows.into_iter()
        .map(|t| {
            let client = hydrate::resolve_user(conn, map.as_ref(), t.client_id, MISSING_CLIENT)?;
            Ok(HydratedFinancialTicket { ticket: t, client })
        })
        .collect()
}

pub async fn create_financial_ticket(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateFinancialTicketRequest>,
) -> Result<Json<HydratedFinancialTicket>, ServiceError> {
    let mut conn = state.conn.get()?;

    let mut violations = Vec::new();
    if req.title.trim().is_empty() {
        violations.push("title must not be empty".to_string());
    }
    if req.amount <= BigDecimal::from(0) {
        violations.push("amount must be positive".to_string());
    }
    if !violations.is_empty() {
        return Err(ServiceError::validation(violations));
    }

    let now = Utc::now();
    let template = FinancialTicket {
        id: String::new(),
        title: req.title.trim().to_string(),
        description: req.description,
        amount: req.amount,
        due_date: req.due_date,
        payment_date: None,
        status: FinancialStatus::default().to_string(),
        client_id: req.client_id,
        created_by: req.created_by,
        erp_id: None,
        erp_type: None,
        invoice_number: req.invoice_number,
        barcode: req.barcode,
        our_number: req.our_number,
        payment_method: None,
        transaction_id: None,
        notes: req.notes,
        metadata: req.metadata.unwrap_or_else(|| serde_json::json!({})),
        invoice_file: None,
        receipt_file: None,
        created_at: now,
        updated_at: now,
    };

    let existing: Vec<String> = financial_tickets::table
        .select(financial_tickets::id)
        .load(&mut conn)?;
    let id = sequence::insert_with_retry(&existing, Some(FT_PREFIX), |candidate| {
        let row = FinancialTicket {
            id: candidate.to_string(),
            ..template.clone()
        };
        diesel::insert_into(financial_tickets::table)
            .values(&row)
            .execute(&mut conn)
            .map(|_| ())
    })?;

    let ticket = FinancialTicket { id, ..template };
    Ok(Json(hydrate_one(&mut conn, ticket)?))
}

pub async fn list_financial_tickets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FinancialListQuery>,
) -> Result<Json<Vec<HydratedFinancialTicket>>, ServiceError> {
    let mut conn = state.conn.get()?;

    let role = parse_role(&query.role)?;
    let limit = query.limit.unwrap_or(50);
    let offset = query.offset.unwrap_or(0);

    let mut q = financial_tickets::table.into_boxed();

    if let Some(owner) = financial_scope(role, query.user_id) {
        q = q.filter(financial_tickets::client_id.eq(owner));
    }

    if let Some(status) = query.status {
        q = q.filter(financial_tickets::status.eq(status));
    }

    if let Some(client_id) = query.client_id {
        q = q.filter(financial_tickets::client_id.eq(client_id));
    }

    if let Some(erp_type) = query.erp_type {
        q = q.filter(financial_tickets::erp_type.eq(erp_type));
    }

    let rows: Vec<FinancialTicket> = q
        .order(financial_tickets::updated_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;

    Ok(Json(hydrate_all(&mut conn, rows)?))
}

/// Pending tickets past their due date. Overdue is computed at read time,
/// the stored status stays `pending` until someone or the ERP moves it.
pub async fn list_overdue_tickets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FinancialListQuery>,
) -> Result<Json<Vec<HydratedFinancialTicket>>, ServiceError> {
    let mut conn = state.conn.get()?;

    let role = parse_role(&query.role)?;
    let today = Utc::now().date_naive();

    let mut q = financial_tickets::table
        .filter(financial_tickets::status.eq(FinancialStatus::Pending.to_string()))
        .filter(financial_tickets::due_date.lt(today))
        .into_boxed();

    if let Some(owner) = financial_scope(role, query.user_id) {
        q = q.filter(financial_tickets::client_id.eq(owner));
    }

    let rows: Vec<FinancialTicket> = q
        .order(financial_tickets::due_date.asc())
        .load(&mut conn)?;

    Ok(Json(hydrate_all(&mut conn, rows)?))
}

pub async fn get_financial_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<HydratedFinancialTicket>, ServiceError> {
    let mut conn = state.conn.get()?;

    let ticket: FinancialTicket = financial_tickets::table
        .find(&id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ServiceError::not_found("financial ticket", &id))?;

    Ok(Json(hydrate_one(&mut conn, ticket)?))
}

pub async fn update_financial_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateFinancialTicketRequest>,
) -> Result<Json<HydratedFinancialTicket>, ServiceError> {
    let mut conn = state.conn.get()?;

    let exists: Option<String> = financial_tickets::table
        .find(&id)
        .select(financial_tickets::id)
        .first(&mut conn)
        .optional()?;
    if exists.is_none() {
        return Err(ServiceError::not_found("financial ticket", &id));
    }

    let mut violations = Vec::new();
    if let Some(title) = &req.title {
        if title.trim().is_empty() {
            violations.push("title must not be empty".to_string());
        }
    }
    if let Some(amount) = &req.amount {
        if *amount <= BigDecimal::from(0) {
            violations.push("amount must be positive".to_string());
        }
    }
    let status = match req.status.as_deref().map(FinancialStatus::from_str) {
        Some(Ok(s)) => Some(s),
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

    diesel::update(financial_tickets::table.find(&id))
        .set(financial_tickets::updated_at.eq(now))
        .execute(&mut conn)?;

    if let Some(title) = req.title {
        diesel::update(financial_tickets::table.find(&id))
            .set(financial_tickets::title.eq(title.trim().to_string()))
            .execute(&mut conn)?;
    }

    if let Some(description) = req.description {
        diesel::update(financial_tickets::table.find(&id))
            .set(financial_tickets::description.eq(description))
            .execute(&mut conn)?;
    }

    if let Some(amount) = req.amount {
        diesel::update(financial_tickets::table.find(&id))
            .set(financial_tickets::amount.eq(amount))
            .execute(&mut conn)?;
    }

    if let Some(due_date) = req.due_date {
        diesel::update(financial_tickets::table.find(&id))
            .set(financial_tickets::due_date.eq(due_date))
            .execute(&mut conn)?;
    }

    if let Some(status) = status {
        diesel::update(financial_tickets::table.find(&id))
            .set(financial_tickets::status.eq(status.to_string()))
            .execute(&mut conn)?;
    }

    if let Some(payment_date) = req.payment_date {
        diesel::update(financial_tickets::table.find(&id))
            .set(financial_tickets::payment_date.eq(Some(payment_date)))
            .execute(&mut conn)?;
    }

    if let Some(payment_method) = req.payment_method {
        diesel::update(financial_tickets::table.find(&id))
            .set(financial_tickets::payment_method.eq(payment_method))
            .execute(&mut conn)?;
    }

    if let Some(transaction_id) = req.transaction_id {
        diesel::update(financial_tickets::table.find(&id))
            .set(financial_tickets::transaction_id.eq(transaction_id))
            .execute(&mut conn)?;
    }

    if let Some(notes) = req.notes {
        diesel::update(financial_tickets::table.find(&id))
            .set(financial_tickets::notes.eq(notes))
            .execute(&mut conn)?;
    }

    if let Some(invoice_file) = req.invoice_file {
        diesel::update(financial_tickets::table.find(&id))
            .set(financial_tickets::invoice_file.eq(invoice_file))
            .execute(&mut conn)?;
    }

    if let Some(receipt_file) = req.receipt_file {
        diesel::update(financial_tickets::table.find(&id))
            .set(financial_tickets::receipt_file.eq(receipt_file))
            .execute(&mut conn)?;
    }

    let ticket: FinancialTicket = financial_tickets::table.find(&id).first(&mut conn)?;
    Ok(Json(hydrate_one(&mut conn, ticket)?))
}

pub async fn delete_financial_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<RoleQuery>,
) -> Result<StatusCode, ServiceError> {
    let role = parse_role(&query.role)?;
    if role != UserRole::Admin {
        return Err(ServiceError::Forbidden(
            "only admins can delete financial tickets".to_string(),
        ));
    }

    let mut conn = state.conn.get()?;

    let exists: Option<String> = financial_tickets::table
        .find(&id)
        .select(financial_tickets::id)
        .first(&mut conn)
        .optional()?;
    if exists.is_none() {
        return Err(ServiceError::not_found("financial ticket", &id));
    }

    diesel::delete(financial_tickets::table.find(&id)).execute(&mut conn)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn erp_ticket_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(event): Json<erp::ErpTicketEvent>,
) -> Result<Json<erp::ReconcileOutcome>, ServiceError> {
    check_api_key(&state, &headers)?;
    let mut conn = state.conn.get()?;
    let outcome = erp::reconcile_ticket(&mut conn, event)?;
    Ok(Json(outcome))
}

pub async fn erp_payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(event): Json<erp::ErpPaymentEvent>,
) -> Result<(StatusCode, Json<erp::ReconcileOutcome>), ServiceError> {
    check_api_key(&state, &headers)?;
    let mut conn = state.conn.get()?;
    let outcome = erp::reconcile_payment(&mut conn, event)?;
    let status = if outcome.success {
        StatusCode::OK
    } else {
        // A payment for an unknown invoice is reported, never applied.
        StatusCode::NOT_FOUND
    };
    Ok((status, Json(outcome)))
}

pub fn configure_financial_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/financial/tickets",
            get(list_financial_tickets).post(create_financial_ticket),
        )
        .route("/api/financial/tickets/overdue", get(list_overdue_tickets))
        .route(
            "/api/financial/tickets/:id",
            get(get_financial_ticket)
                .put(update_financial_ticket)
                .delete(delete_financial_ticket),
        )
        .route("/api/webhooks/erp/tickets", post(erp_ticket_webhook))
        .route("/api/webhooks/erp/payments", post(erp_payment_webhook))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admins_and_financial_see_every_financial_ticket() {
        let uid = Uuid::new_v4();
        assert_eq!(financial_scope(UserRole::Admin, uid), None);
        assert_eq!(financial_scope(UserRole::Financial, uid), None);
    }

    #[test]
    fn everyone_else_only_sees_their_own_billing() {
        let uid = Uuid::new_v4();
        assert_eq!(financial_scope(UserRole::User, uid), Some(uid));
        assert_eq!(financial_scope(UserRole::Technician, uid), Some(uid));
        assert_eq!(financial_scope(UserRole::TechnicianN2, uid), Some(uid));
    }

    #[test]
    fn create_request_requires_amount_and_due_date() {
        let id = Uuid::new_v4();
        let body = format!(r#"{{"title": "t", "client_id": "{id}", "created_by": "{id}"}}"#);
        assert!(serde_json::from_str::<CreateFinancialTicketRequest>(&body).is_err());
    }

    #[test]
    fn manual_status_override_is_membership_checked() {
        assert!(FinancialStatus::from_str("paid").is_ok());
        assert!(FinancialStatus::from_str("quitado").is_err());
    }
}
