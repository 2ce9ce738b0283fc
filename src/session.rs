//! Session identity
//!
//! The authenticated user the engine operates on behalf of. Supplied by the
//! surrounding application at construction and treated as read-only for the
//! lifetime of the engine: only `id` participates in sync decisions (presence
//! announce, message ownership), the rest is carried for display.

use serde::{Deserialize, Serialize};

/// Role of the authenticated user within the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Student,
    Agent,
    Admin,
}

/// The authenticated session behind one engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionIdentity {
    /// Stable user identifier, as issued by the backend.
    pub id: String,
    pub full_name: String,
    pub role: UserRole,
    #[serde(default)]
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub university: Option<String>,
}

impl SessionIdentity {
    pub fn new(id: &str, full_name: &str, role: UserRole) -> Self {
        Self {
            id: id.to_string(),
            full_name: full_name.to_string(),
            role,
            verified: false,
            university: None,
        }
    }

    /// True when the given sender id belongs to this session.
    pub fn owns(&self, sender_id: &str) -> bool {
        self.id == sender_id
    }
}
