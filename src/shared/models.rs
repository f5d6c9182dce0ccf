use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::schema::{queues, users};

/// Role assigned to every account. Stored as text in the `users.role`
/// column; parsing is the membership check used everywhere a role value
/// arrives from the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Technician,
    TechnicianN2,
    User,
    Financial,
}

impl UserRole {
    pub fn is_staff(self) -> bool {
        !matches!(self, Self::User)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Technician => write!(f, "technician"),
            Self::TechnicianN2 => write!(f, "technician_n2"),
            Self::User => write!(f, "user"),
            Self::Financial => write!(f, "financial"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "technician" => Ok(Self::Technician),
            "technician_n2" => Ok(Self::TechnicianN2),
            "user" => Ok(Self::User),
            "financial" => Ok(Self::Financial),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: String,
    pub avatar: Option<String>,
    pub company: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = queues)]
pub struct Queue {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn role_round_trips_through_strings() {
        for role in [
            UserRole::Admin,
            UserRole::Technician,
            UserRole::TechnicianN2,
            UserRole::User,
            UserRole::Financial,
        ] {
            assert_eq!(UserRole::from_str(&role.to_string()), Ok(role));
        }
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!(UserRole::from_str("superuser").is_err());
    }
}
