//! Reconciliation of inbound ERP events against local financial tickets.
//!
//! The ERP is the source of truth for billing. Two event kinds arrive:
//! ticket events (an invoice was issued or corrected) and payment events
//! (an invoice was paid). Both are matched against local records by the
//! external identity pair (`erpId`, `erpType`); replaying an event is safe
//! because a matching ticket is updated in place, never duplicated.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::error::ServiceError;
use crate::shared::models::{User, UserRole};
use crate::shared::schema::{financial_tickets, users};
use crate::tickets::sequence;
use crate::tickets::status::FinancialStatus;

use super::{FinancialTicket, FT_PREFIX};

/// Invoice issued or corrected on the ERP side. Field names follow the
/// ERP wire format; everything is optional so validation can report every
/// missing field at once instead of failing on the first.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErpTicketEvent {
    pub erp_id: Option<String>,
    pub erp_type: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub amount: Option<BigDecimal>,
    pub due_date: Option<NaiveDate>,
    pub client_email: Option<String>,
    pub client_name: Option<String>,
    pub invoice_number: Option<String>,
    pub barcode: Option<String>,
    pub our_number: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Payment confirmed on the ERP side. `erp_id` identifies the payment
/// event itself; `erp_ticket_id` names the invoice it settles.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErpPaymentEvent {
    pub erp_id: Option<String>,
    pub erp_ticket_id: Option<String>,
    pub erp_type: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub amount: Option<BigDecimal>,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    pub message: String,
}

impl ReconcileOutcome {
    fn applied(ticket_id: String, message: &str) -> Self {
        Self {
            success: true,
            ticket_id: Some(ticket_id),
            message: message.to_string(),
        }
    }

    fn rejected(message: &str) -> Self {
        Self {
            success: false,
            ticket_id: None,
            message: message.to_string(),
        }
    }
}

#[derive(Debug)]
struct TicketFields {
    erp_id: String,
    erp_type: String,
    title: String,
    amount: BigDecimal,
    due_date: NaiveDate,
    client_email: String,
    client_name: String,
}

#[derive(Debug)]
struct PaymentFields {
    erp_id: String,
    erp_ticket_id: String,
    erp_type: String,
    payment_date: DateTime<Utc>,
    amount: BigDecimal,
}

fn required_text(value: &Option<String>, field: &str, violations: &mut Vec<String>) -> String {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => {
            violations.push(format!("{field} is required"));
            String::new()
        }
    }
}

fn positive_amount(value: &Option<BigDecimal>, violations: &mut Vec<String>) -> BigDecimal {
    match value {
        Some(a) if *a > BigDecimal::from(0) => a.clone(),
        Some(_) => {
            violations.push("amount must be positive".to_string());
            BigDecimal::from(0)
        }
        None => {
            violations.push("amount is required".to_string());
            BigDecimal::from(0)
        }
    }
}

fn validate_ticket(event: &ErpTicketEvent) -> Result<TicketFields, ServiceError> {
    let mut violations = Vec::new();
    let erp_id = required_text(&event.erp_id, "erpId", &mut violations);
    let erp_type = required_text(&event.erp_type, "erpType", &mut violations);
    let title = required_text(&event.title, "title", &mut violations);
    let amount = positive_amount(&event.amount, &mut violations);
    let due_date = match event.due_date {
        Some(d) => d,
        None => {
            violations.push("dueDate is required".to_string());
            NaiveDate::default()
        }
    };
    let client_email = required_text(&event.client_email, "clientEmail", &mut violations);
    let client_name = required_text(&event.client_name, "clientName", &mut violations);

    if violations.is_empty() {
        Ok(TicketFields {
            erp_id,
            erp_type,
            title,
            amount,
            due_date,
            client_email,
            client_name,
        })
    } else {
        Err(ServiceError::validation(violations))
    }
}

fn validate_payment(event: &ErpPaymentEvent) -> Result<PaymentFields, ServiceError> {
    let mut violations = Vec::new();
    let erp_id = required_text(&event.erp_id, "erpId", &mut violations);
    let erp_ticket_id = required_text(&event.erp_ticket_id, "erpTicketId", &mut violations);
    let erp_type = required_text(&event.erp_type, "erpType", &mut violations);
    let payment_date = match event.payment_date {
        Some(d) => d,
        None => {
            violations.push("paymentDate is required".to_string());
            DateTime::<Utc>::default()
        }
    };
    let amount = positive_amount(&event.amount, &mut violations);

    if violations.is_empty() {
        Ok(PaymentFields {
            erp_id,
            erp_ticket_id,
            erp_type,
            payment_date,
            amount,
        })
    } else {
        Err(ServiceError::validation(violations))
    }
}

/// ERP display names often carry the company after a separator, e.g.
/// "Maria Silva - Acme Ltda". The earliest " - " or " | " splits person
/// from company; a separator producing an empty half is ignored.
fn split_display_name(raw: &str) -> (String, Option<String>) {
    let mut cuts: Vec<(usize, usize)> = [" - ", " | "]
        .iter()
        .flat_map(|sep| raw.match_indices(sep).map(|(idx, m)| (idx, m.len())))
        .collect();
    cuts.sort_unstable();
    for (idx, len) in cuts {
        let name = raw[..idx].trim();
        let company = raw[idx + len..].trim();
        if !name.is_empty() && !company.is_empty() {
            return (name.to_string(), Some(company.to_string()));
        }
    }
    (raw.trim().to_string(), None)
}

/// Finds the client account an ERP event refers to, creating one on the
/// fly when the email is unknown. Matching is by case-insensitive email
/// among `user`-role accounts, the way the ERP identifies customers.
fn resolve_client(
    conn: &mut PgConnection,
    email: &str,
    display_name: &str,
) -> Result<User, ServiceError> {
    let target = email.trim().to_lowercase();
    let clients: Vec<User> = users::table
        .filter(users::role.eq(UserRole::User.to_string()))
        .load(conn)?;
    if let Some(existing) = clients
        .into_iter()
        .find(|u| u.email.to_lowercase() == target)
    {
        return Ok(existing);
    }

    let (name, company) = split_display_name(display_name);
    let now = Utc::now();
    let client = User {
        id: Uuid::new_v4(),
        name,
        email: email.trim().to_string(),
        // Provisioned accounts cannot log in until a password is set
        // through the normal account flow.
        password_hash: String::new(),
        role: UserRole::User.to_string(),
        avatar: None,
        company,
        created_at: now,
        updated_at: now,
    };
    diesel::insert_into(users::table)
        .values(&client)
        .execute(conn)?;
    info!("provisioned client {} from ERP event", client.email);
    Ok(client)
}

/// Applies a ticket event: update the financial ticket matching the
/// external identity in place, or create one when none matches.
pub fn reconcile_ticket(
    conn: &mut PgConnection,
    event: ErpTicketEvent,
) -> Result<ReconcileOutcome, ServiceError> {
    let fields = validate_ticket(&event)?;
    let client = resolve_client(conn, &fields.client_email, &fields.client_name)?;
    let now = Utc::now();

    let existing: Option<FinancialTicket> = financial_tickets::table
        .filter(financial_tickets::erp_id.eq(&fields.erp_id))
        .filter(financial_tickets::erp_type.eq(&fields.erp_type))
        .first(conn)
        .optional()?;

    if let Some(ticket) = existing {
        // The local id survives corrections; only the billing facts move.
        diesel::update(financial_tickets::table.find(&ticket.id))
            .set((
                financial_tickets::title.eq(&fields.title),
                financial_tickets::description.eq(&event.description),
                financial_tickets::amount.eq(&fields.amount),
                financial_tickets::due_date.eq(fields.due_date),
                financial_tickets::client_id.eq(client.id),
                financial_tickets::updated_at.eq(now),
            ))
            .execute(conn)?;
        info!(
            "ERP ticket {}/{} reconciled onto {}",
            fields.erp_type, fields.erp_id, ticket.id
        );
        return Ok(ReconcileOutcome::applied(
            ticket.id,
            "financial ticket updated",
        ));
    }

    let template = FinancialTicket {
        id: String::new(),
        title: fields.title,
        description: event.description.clone(),
        amount: fields.amount,
        due_date: fields.due_date,
        payment_date: None,
        status: FinancialStatus::Pending.to_string(),
        client_id: client.id,
        created_by: client.id,
        erp_id: Some(fields.erp_id.clone()),
        erp_type: Some(fields.erp_type.clone()),
        invoice_number: event.invoice_number.clone(),
        barcode: event.barcode.clone(),
        our_number: event.our_number.clone(),
        payment_method: None,
        transaction_id: None,
        notes: None,
        metadata: event.metadata.clone().unwrap_or_else(|| serde_json::json!({})),
        invoice_file: None,
        receipt_file: None,
        created_at: now,
        updated_at: now,
    };

    let existing_ids: Vec<String> = financial_tickets::table
        .select(financial_tickets::id)
        .load(conn)?;
    let id = sequence::insert_with_retry(&existing_ids, Some(FT_PREFIX), |candidate| {
        let row = FinancialTicket {
            id: candidate.to_string(),
            ..template.clone()
        };
        diesel::insert_into(financial_tickets::table)
            .values(&row)
            .execute(conn)
            .map(|_| ())
    })?;

    info!(
        "ERP ticket {}/{} created {}",
        fields.erp_type, fields.erp_id, id
    );
    Ok(ReconcileOutcome::applied(id, "financial ticket created"))
}

/// Applies a payment event to the financial ticket it settles. A payment
/// never creates a ticket; with no match the outcome is a rejection.
pub fn reconcile_payment(
    conn: &mut PgConnection,
    event: ErpPaymentEvent,
) -> Result<ReconcileOutcome, ServiceError> {
    let fields = validate_payment(&event)?;

    let existing: Option<FinancialTicket> = financial_tickets::table
        .filter(financial_tickets::erp_id.eq(&fields.erp_ticket_id))
        .filter(financial_tickets::erp_type.eq(&fields.erp_type))
        .first(conn)
        .optional()?;

    let Some(ticket) = existing else {
        return Ok(ReconcileOutcome::rejected(
            "no matching ticket for this payment",
        ));
    };

    let now = Utc::now();
    // Confirmations accumulate; existing notes are never overwritten.
    let note = format!(
        "[{}] Pagamento confirmado via {} (evento {}), valor {}",
        now.format("%Y-%m-%d %H:%M"),
        fields.erp_type,
        fields.erp_id,
        fields.amount
    );
    let notes = match &ticket.notes {
        Some(prev) => format!("{prev}\n{note}"),
        None => note,
    };

    let mut metadata = ticket.metadata.clone();
    if let Some(extra) = &event.metadata {
        if let Some(obj) = metadata.as_object_mut() {
            obj.insert("payment".to_string(), extra.clone());
        }
    }

    diesel::update(financial_tickets::table.find(&ticket.id))
        .set((
            financial_tickets::status.eq(FinancialStatus::Paid.to_string()),
            financial_tickets::payment_date.eq(Some(fields.payment_date)),
            financial_tickets::payment_method.eq(&event.payment_method),
            financial_tickets::transaction_id.eq(&event.transaction_id),
            financial_tickets::notes.eq(&notes),
            financial_tickets::metadata.eq(&metadata),
            financial_tickets::updated_at.eq(now),
        ))
        .execute(conn)?;

    info!(
        "ERP payment {}/{} settled {}",
        fields.erp_type, fields.erp_id, ticket.id
    );
    Ok(ReconcileOutcome::applied(ticket.id, "payment reconciled"))
}
