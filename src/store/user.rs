use serde::{Deserialize, Serialize};

/// User document as persisted in the `users` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub email: String,           // unique, case-sensitive
    pub password_hash: String,   // argon2 PHC string
    pub name: String,            // display label
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub session_expires_at: Option<String>, // RFC 3339, set together with session_token
}

impl User {
    /// A self-registered user: never admin, no session.
    pub fn new(email: String, password_hash: String, name: String) -> Self {
        Self {
            email,
            password_hash,
            name,
            is_admin: false,
            session_token: None,
            session_expires_at: None,
        }
    }

    pub fn has_session(&self) -> bool {
        self.session_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}
