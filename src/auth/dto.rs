use serde::{Deserialize, Serialize};

use crate::store::User;

/// Request body for user registration. Any `isAdmin` or `passwordHash`
/// field a client sends is ignored.
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// Request body for login.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Returned after login or refresh, alongside the session cookie.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: PublicUser,
    pub expires_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub email: String,
    pub name: String,
    pub is_admin: bool,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            email: user.email.clone(),
            name: user.name.clone(),
            is_admin: user.is_admin,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub greeting: String,
    pub user: PublicUser,
    pub session_expires_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_user_never_carries_secrets() {
        let user = User {
            session_token: Some("tok".into()),
            ..User::new("a@x.com".into(), "$argon2id$secret".into(), "A".into())
        };
        let json = serde_json::to_string(&PublicUser::from(&user)).unwrap();
        assert!(json.contains("a@x.com"));
        assert!(json.contains("isAdmin"));
        assert!(!json.contains("argon2"));
        assert!(!json.contains("tok"));
    }

    #[test]
    fn register_ignores_privilege_fields() {
        let req: RegisterRequest = serde_json::from_value(serde_json::json!({
            "email": "a@x.com",
            "password": "pw",
            "name": "A",
            "isAdmin": true,
            "passwordHash": "forged"
        }))
        .unwrap();
        assert_eq!(req.email, "a@x.com");
    }
}
