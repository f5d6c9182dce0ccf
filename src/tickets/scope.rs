//! Role-scoped visibility for ticket listings.
//!
//! The scope is derived from the requester before any caller-supplied filter
//! is applied, so no combination of query parameters can widen what a role
//! is allowed to see.

use diesel::pg::Pg;
use diesel::prelude::*;
use uuid::Uuid;

use crate::shared::error::ServiceError;
use crate::shared::models::UserRole;
use crate::shared::schema::{queues, tickets};

/// Queue-name fragment that routes second-level support. "Suporte N2" and
/// any other queue whose name contains "N2" match, case-insensitively.
const N2_QUEUE_PATTERN: &str = "%N2%";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilityScope {
    /// Full visibility.
    All,
    /// Only tickets created by this user.
    CreatedBy(Uuid),
    /// Only tickets currently sitting in a queue whose name matches the
    /// ILIKE pattern, regardless of assignment.
    QueueNamedLike(String),
}

/// First matching rule wins; roles without a rule fall back to
/// creator-only visibility.
pub fn scope_for(role: UserRole, user_id: Uuid) -> VisibilityScope {
    match role {
        UserRole::User => VisibilityScope::CreatedBy(user_id),
        UserRole::TechnicianN2 => VisibilityScope::QueueNamedLike(N2_QUEUE_PATTERN.to_string()),
        UserRole::Admin | UserRole::Technician => VisibilityScope::All,
        UserRole::Financial => VisibilityScope::CreatedBy(user_id),
    }
}

/// Narrows a boxed ticket query to the scope. The N2 rule resolves queue
/// ids up front; an empty match yields an empty listing rather than full
/// visibility.
pub fn apply_scope<'a>(
    scope: &VisibilityScope,
    conn: &mut PgConnection,
    q: tickets::BoxedQuery<'a, Pg>,
) -> Result<tickets::BoxedQuery<'a, Pg>, ServiceError> {
    match scope {
        VisibilityScope::All => Ok(q),
        VisibilityScope::CreatedBy(user_id) => Ok(q.filter(tickets::created_by.eq(*user_id))),
        VisibilityScope::QueueNamedLike(pattern) => {
            let queue_ids: Vec<Uuid> = queues::table
                .filter(queues::name.ilike(pattern.clone()))
                .select(queues::id)
                .load(conn)?;
            Ok(q.filter(tickets::queue_id.eq_any(queue_ids)))
        }
    }
}
