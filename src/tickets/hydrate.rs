//! Hydration of raw ticket rows into API responses.
//!
//! Tickets reference users, queues, comments and files by id. Listings
//! resolve all of them in one pass: user rows are fetched with a single
//! batched query and joined in memory, falling back to per-ticket lookups
//! if the batch read fails. References that point at deleted rows are
//! replaced with placeholder summaries so consumers always receive a
//! well-formed object instead of a null where they expect a user.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::warn;
use serde::Serialize;
use uuid::Uuid;

use crate::shared::error::ServiceError;
use crate::shared::models::User;
use crate::shared::schema::{queues, ticket_comments, ticket_files, users};
use crate::tickets::{Ticket, TicketComment, TicketFile};

/// Shown in place of a deleted creator or assignee.
pub const MISSING_USER: &str = "Usuário não encontrado";
/// Shown in place of a deleted client.
pub const MISSING_CLIENT: &str = "Cliente não encontrado";

#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub avatar: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            avatar: user.avatar.clone(),
        }
    }
}

/// A user reference that survived hydration. Both variants serialize to the
/// same plain object so clients never see the distinction; `Dangling` keeps
/// the original id with placeholder fields.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum UserRef {
    Resolved(UserSummary),
    Dangling(UserSummary),
}

impl UserRef {
    pub fn dangling(id: Uuid, placeholder: &str) -> Self {
        UserRef::Dangling(UserSummary {
            id,
            name: placeholder.to_string(),
            email: String::new(),
            role: "user".to_string(),
            avatar: None,
        })
    }

    pub fn is_dangling(&self) -> bool {
        matches!(self, UserRef::Dangling(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueSummary {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct HydratedTicket {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub category: String,
    pub creator: UserRef,
    pub client: UserRef,
    pub assignee: Option<UserRef>,
    pub queue: Option<QueueSummary>,
    pub comments: Vec<TicketComment>,
    pub files: Vec<TicketFile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Hydrates a page of tickets, preserving the order of the input rows.
/// Fails only when the per-ticket fallback lookups themselves error.
pub fn resolve_all(
    conn: &mut PgConnection,
    rows: Vec<Ticket>,
) -> Result<Vec<HydratedTicket>, ServiceError> {
    let mut user_ids: HashSet<Uuid> = HashSet::new();
    let mut queue_ids: HashSet<Uuid> = HashSet::new();
    for t in &rows {
        user_ids.insert(t.created_by);
        user_ids.insert(t.client_id);
        if let Some(a) = t.assigned_to {
            user_ids.insert(a);
        }
        if let Some(q) = t.queue_id {
            queue_ids.insert(q);
        }
    }

    let user_map = load_user_map(conn, user_ids.into_iter().collect());
    let queue_map = load_queue_map(conn, queue_ids.into_iter().collect());

    rows.into_iter()
        .map(|t| assemble(conn, t, user_map.as_ref(), &queue_map))
        .collect()
}

/// Hydrates a single ticket with direct lookups.
pub fn resolve_ticket(
    conn: &mut PgConnection,
    ticket: Ticket,
) -> Result<HydratedTicket, ServiceError> {
    let queue_map = load_queue_map(conn, ticket.queue_id.into_iter().collect());
    assemble(conn, ticket, None, &queue_map)
}

/// One batched read for every user referenced by the page. `None` means the
/// batch failed and callers should fall back to direct lookups.
pub fn load_user_map(conn: &mut PgConnection, ids: Vec<Uuid>) -> Option<HashMap<Uuid, User>> {
    if ids.is_empty() {
        return Some(HashMap::new());
    }
    match users::table.filter(users::id.eq_any(ids)).load::<User>(conn) {
        Ok(found) => Some(found.into_iter().map(|u| (u.id, u)).collect()),
        Err(e) => {
            warn!("batched user hydration failed, retrying per ticket: {}", e);
            None
        }
    }
}

fn load_queue_map(conn: &mut PgConnection, ids: Vec<Uuid>) -> HashMap<Uuid, String> {
    if ids.is_empty() {
        return HashMap::new();
    }
    match queues::table
        .filter(queues::id.eq_any(ids))
        .select((queues::id, queues::name))
        .load::<(Uuid, String)>(conn)
    {
        Ok(found) => found.into_iter().collect(),
        Err(e) => {
            warn!("queue hydration failed: {}", e);
            HashMap::new()
        }
    }
}

fn assemble(
    conn: &mut PgConnection,
    t: Ticket,
    user_map: Option<&HashMap<Uuid, User>>,
    queue_map: &HashMap<Uuid, String>,
) -> Result<HydratedTicket, ServiceError> {
    let creator = resolve_user(conn, user_map, t.created_by, MISSING_USER)?;
    let client = resolve_user(conn, user_map, t.client_id, MISSING_CLIENT)?;
    let assignee = t
        .assigned_to
        .map(|id| resolve_user(conn, user_map, id, MISSING_USER))
        .transpose()?;
    let queue = t.queue_id.and_then(|id| {
        queue_map
            .get(&id)
            .map(|name| QueueSummary { id, name: name.clone() })
    });

    // Attachments are never worth failing a listing over.
    let comments = ticket_comments::table
        .filter(ticket_comments::ticket_id.eq(&t.id))
        .order(ticket_comments::created_at.asc())
        .load::<TicketComment>(conn)
        .unwrap_or_else(|e| {
            warn!("comments unavailable for ticket {}: {}", t.id, e);
            Vec::new()
        });
    let files = ticket_files::table
        .filter(ticket_files::ticket_id.eq(&t.id))
        .order(ticket_files::created_at.asc())
        .load::<TicketFile>(conn)
        .unwrap_or_else(|e| {
            warn!("files unavailable for ticket {}: {}", t.id, e);
            Vec::new()
        });

    Ok(HydratedTicket {
        id: t.id,
        title: t.title,
        description: t.description,
        status: t.status,
        priority: t.priority,
        category: t.category,
        creator,
        client,
        assignee,
        queue,
        comments,
        files,
        created_at: t.created_at,
        updated_at: t.updated_at,
    })
}

/// Resolves one user reference, preferring the batch map and falling back
/// to a direct lookup when no map is available. A placeholder stands in
/// only for a row that is confirmed absent; a storage error on the
/// fallback lookup propagates so an outage never reads as a deleted user.
pub fn resolve_user(
    conn: &mut PgConnection,
    map: Option<&HashMap<Uuid, User>>,
    id: Uuid,
    placeholder: &str,
) -> Result<UserRef, ServiceError> {
    match map {
        Some(m) => match m.get(&id) {
            Some(u) => Ok(UserRef::Resolved(u.into())),
            None => Ok(UserRef::dangling(id, placeholder)),
        },
        None => match users::table.find(id).first::<User>(conn).optional()? {
            Some(u) => Ok(UserRef::Resolved((&u).into())),
            None => Ok(UserRef::dangling(id, placeholder)),
        },
    }
}
