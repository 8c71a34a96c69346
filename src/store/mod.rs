//! Narrow adapter over the document collection holding [`User`] records.
//!
//! Handlers only ever see typed users and the closed [`StoreError`] set;
//! driver errors are classified inside each backend.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod pg;
mod user;

pub use memory::MemoryStore;
pub use pg::PgDocumentStore;
pub use user::User;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("no document matched the filter")]
    NotFound,
    #[error("duplicate key")]
    DuplicateKey,
    #[error("store operation timed out")]
    Timeout,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("document decode failed: {0}")]
    Decode(String),
}

/// Selects documents in the users collection.
#[derive(Clone, PartialEq, Eq)]
pub enum UserFilter {
    All,
    Email(String),
    /// Never matches an empty token.
    SessionToken(String),
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        match self {
            UserFilter::All => true,
            UserFilter::Email(email) => user.email == *email,
            UserFilter::SessionToken(token) => {
                !token.is_empty() && user.session_token.as_deref() == Some(token.as_str())
            }
        }
    }
}

impl fmt::Debug for UserFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserFilter::All => f.write_str("All"),
            UserFilter::Email(email) => f.debug_tuple("Email").field(email).finish(),
            UserFilter::SessionToken(_) => f.write_str("SessionToken(..)"),
        }
    }
}

/// The only mutations the auth flow performs. Token and expiry travel
/// together so they can never be written independently.
#[derive(Clone, PartialEq, Eq)]
pub enum UserPatch {
    SetSession { token: String, expires_at: String },
    ClearSession,
}

impl UserPatch {
    /// Applies the patch in place; returns whether anything changed.
    pub fn apply(&self, user: &mut User) -> bool {
        let (token, expires_at) = match self {
            UserPatch::SetSession { token, expires_at } => {
                (Some(token.clone()), Some(expires_at.clone()))
            }
            UserPatch::ClearSession => (None, None),
        };
        let changed = user.session_token != token || user.session_expires_at != expires_at;
        user.session_token = token;
        user.session_expires_at = expires_at;
        changed
    }

    /// Partial document merged over the stored one.
    pub fn to_document(&self) -> serde_json::Value {
        match self {
            UserPatch::SetSession { token, expires_at } => serde_json::json!({
                "sessionToken": token,
                "sessionExpiresAt": expires_at,
            }),
            UserPatch::ClearSession => serde_json::json!({
                "sessionToken": null,
                "sessionExpiresAt": null,
            }),
        }
    }
}

impl fmt::Debug for UserPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserPatch::SetSession { expires_at, .. } => f
                .debug_struct("SetSession")
                .field("expires_at", expires_at)
                .finish_non_exhaustive(),
            UserPatch::ClearSession => f.write_str("ClearSession"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_one(&self, filter: &UserFilter) -> Result<User, StoreError>;
    async fn find_many(&self, filter: &UserFilter) -> Result<Vec<User>, StoreError>;
    /// Updates at most one matching document.
    async fn update_one(
        &self,
        filter: &UserFilter,
        patch: &UserPatch,
    ) -> Result<UpdateResult, StoreError>;
    async fn insert_one(&self, user: &User) -> Result<(), StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Bounds every call on the inner store by a fixed deadline.
#[derive(Clone)]
pub struct Bounded<S> {
    inner: S,
    timeout: Duration,
}

impl<S> Bounded<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res,
            Err(_) => {
                tracing::warn!(
                    op,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "store operation timed out"
                );
                Err(StoreError::Timeout)
            }
        }
    }
}

#[async_trait]
impl<S: UserStore> UserStore for Bounded<S> {
    async fn find_one(&self, filter: &UserFilter) -> Result<User, StoreError> {
        self.bounded("find_one", self.inner.find_one(filter)).await
    }

    async fn find_many(&self, filter: &UserFilter) -> Result<Vec<User>, StoreError> {
        self.bounded("find_many", self.inner.find_many(filter)).await
    }

    async fn update_one(
        &self,
        filter: &UserFilter,
        patch: &UserPatch,
    ) -> Result<UpdateResult, StoreError> {
        self.bounded("update_one", self.inner.update_one(filter, patch))
            .await
    }

    async fn insert_one(&self, user: &User) -> Result<(), StoreError> {
        self.bounded("insert_one", self.inner.insert_one(user)).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.bounded("ping", self.inner.ping()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowStore;

    #[async_trait]
    impl UserStore for SlowStore {
        async fn find_one(&self, _filter: &UserFilter) -> Result<User, StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(StoreError::NotFound)
        }
        async fn find_many(&self, _filter: &UserFilter) -> Result<Vec<User>, StoreError> {
            Ok(Vec::new())
        }
        async fn update_one(
            &self,
            _filter: &UserFilter,
            _patch: &UserPatch,
        ) -> Result<UpdateResult, StoreError> {
            tokio::time::sleep(Duration::from_secs(6)).await;
            Ok(UpdateResult::default())
        }
        async fn insert_one(&self, _user: &User) -> Result<(), StoreError> {
            Ok(())
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn user() -> User {
        User::new("a@x.com".into(), "h".into(), "A".into())
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_store_times_out_instead_of_not_found() {
        let store = Bounded::new(SlowStore, Duration::from_secs(5));
        let err = store
            .find_one(&UserFilter::Email("a@x.com".into()))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Timeout);

        let err = store
            .update_one(&UserFilter::All, &UserPatch::ClearSession)
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_store_passes_fast_results_through() {
        let store = Bounded::new(SlowStore, Duration::from_secs(5));
        assert!(store.find_many(&UserFilter::All).await.unwrap().is_empty());
        assert_eq!(store.ping().await, Ok(()));
    }

    #[test]
    fn empty_session_filter_never_matches() {
        let mut u = user();
        u.session_token = Some(String::new());
        assert!(!UserFilter::SessionToken(String::new()).matches(&u));
        assert!(!UserFilter::SessionToken(String::new()).matches(&user()));
    }

    #[test]
    fn patch_writes_token_and_expiry_together() {
        let mut u = user();
        let set = UserPatch::SetSession {
            token: "t1".into(),
            expires_at: "2024-01-01T02:00:00Z".into(),
        };
        assert!(set.apply(&mut u));
        assert_eq!(u.session_token.as_deref(), Some("t1"));
        assert_eq!(u.session_expires_at.as_deref(), Some("2024-01-01T02:00:00Z"));
        assert!(!set.apply(&mut u));

        assert!(UserPatch::ClearSession.apply(&mut u));
        assert_eq!(u.session_token, None);
        assert_eq!(u.session_expires_at, None);
        assert!(!UserPatch::ClearSession.apply(&mut u));
    }

    #[test]
    fn patch_document_carries_both_fields() {
        let doc = UserPatch::ClearSession.to_document();
        assert!(doc["sessionToken"].is_null());
        assert!(doc["sessionExpiresAt"].is_null());
        assert_eq!(doc.as_object().map(|o| o.len()), Some(2));
    }

    #[test]
    fn debug_output_hides_tokens() {
        let filter = UserFilter::SessionToken("secret-token".into());
        let patch = UserPatch::SetSession {
            token: "secret-token".into(),
            expires_at: "2024-01-01T00:00:00Z".into(),
        };
        assert!(!format!("{filter:?}").contains("secret-token"));
        assert!(!format!("{patch:?}").contains("secret-token"));
    }
}
