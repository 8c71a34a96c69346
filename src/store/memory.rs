use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{StoreError, UpdateResult, User, UserFilter, UserPatch, UserStore};

/// In-process users collection with the same uniqueness rules as the
/// postgres backend.
#[derive(Default, Clone)]
pub struct MemoryStore {
    users: Arc<RwLock<Vec<User>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admin grants happen out of band; tests use this to stand in for them.
    #[cfg(test)]
    pub async fn set_admin(&self, email: &str, is_admin: bool) {
        let mut users = self.users.write().await;
        if let Some(user) = users.iter_mut().find(|u| u.email == email) {
            user.is_admin = is_admin;
        }
    }
}

fn token_taken(users: &[User], token: &str, except: Option<usize>) -> bool {
    users.iter().enumerate().any(|(i, u)| {
        Some(i) != except && !token.is_empty() && u.session_token.as_deref() == Some(token)
    })
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_one(&self, filter: &UserFilter) -> Result<User, StoreError> {
        let users = self.users.read().await;
        users
            .iter()
            .find(|u| filter.matches(u))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_many(&self, filter: &UserFilter) -> Result<Vec<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.iter().filter(|u| filter.matches(u)).cloned().collect())
    }

    async fn update_one(
        &self,
        filter: &UserFilter,
        patch: &UserPatch,
    ) -> Result<UpdateResult, StoreError> {
        let mut users = self.users.write().await;
        let Some(idx) = users.iter().position(|u| filter.matches(u)) else {
            return Ok(UpdateResult::default());
        };

        if let UserPatch::SetSession { token, .. } = patch {
            if token_taken(&users, token, Some(idx)) {
                return Err(StoreError::DuplicateKey);
            }
        }

        let modified = patch.apply(&mut users[idx]);
        Ok(UpdateResult {
            matched: 1,
            modified: u64::from(modified),
        })
    }

    async fn insert_one(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateKey);
        }
        if let Some(token) = user.session_token.as_deref() {
            if token_taken(&users, token, None) {
                return Err(StoreError::DuplicateKey);
            }
        }
        users.push(user.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str) -> User {
        User::new(email.into(), "hash".into(), "Name".into())
    }

    fn set(token: &str) -> UserPatch {
        UserPatch::SetSession {
            token: token.into(),
            expires_at: "2024-01-01T02:00:00Z".into(),
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_email_and_keeps_first() {
        let store = MemoryStore::new();
        store.insert_one(&user("a@x.com")).await.unwrap();

        let mut second = user("a@x.com");
        second.name = "Impostor".into();
        assert_eq!(
            store.insert_one(&second).await,
            Err(StoreError::DuplicateKey)
        );

        let stored = store
            .find_one(&UserFilter::Email("a@x.com".into()))
            .await
            .unwrap();
        assert_eq!(stored.name, "Name");
    }

    #[tokio::test]
    async fn email_match_is_case_sensitive() {
        let store = MemoryStore::new();
        store.insert_one(&user("a@x.com")).await.unwrap();
        store.insert_one(&user("A@x.com")).await.unwrap();
        assert_eq!(
            store
                .find_one(&UserFilter::Email("A@X.COM".into()))
                .await
                .unwrap_err(),
            StoreError::NotFound
        );
    }

    #[tokio::test]
    async fn update_reports_matched_and_modified() {
        let store = MemoryStore::new();
        store.insert_one(&user("a@x.com")).await.unwrap();
        let by_email = UserFilter::Email("a@x.com".into());

        let res = store.update_one(&by_email, &set("t1")).await.unwrap();
        assert_eq!(res, UpdateResult { matched: 1, modified: 1 });

        let res = store.update_one(&by_email, &set("t1")).await.unwrap();
        assert_eq!(res, UpdateResult { matched: 1, modified: 0 });

        let res = store
            .update_one(&UserFilter::Email("ghost@x.com".into()), &set("t2"))
            .await
            .unwrap();
        assert_eq!(res, UpdateResult::default());
    }

    #[tokio::test]
    async fn session_tokens_stay_unique() {
        let store = MemoryStore::new();
        store.insert_one(&user("a@x.com")).await.unwrap();
        store.insert_one(&user("b@x.com")).await.unwrap();

        store
            .update_one(&UserFilter::Email("a@x.com".into()), &set("shared"))
            .await
            .unwrap();
        assert_eq!(
            store
                .update_one(&UserFilter::Email("b@x.com".into()), &set("shared"))
                .await,
            Err(StoreError::DuplicateKey)
        );

        let found = store
            .find_one(&UserFilter::SessionToken("shared".into()))
            .await
            .unwrap();
        assert_eq!(found.email, "a@x.com");
    }

    #[tokio::test]
    async fn cleared_sessions_are_not_found_by_empty_token() {
        let store = MemoryStore::new();
        store.insert_one(&user("a@x.com")).await.unwrap();
        assert_eq!(
            store
                .find_one(&UserFilter::SessionToken(String::new()))
                .await
                .unwrap_err(),
            StoreError::NotFound
        );
    }

    #[tokio::test]
    async fn find_many_filters() {
        let store = MemoryStore::new();
        store.insert_one(&user("a@x.com")).await.unwrap();
        store.insert_one(&user("b@x.com")).await.unwrap();
        assert_eq!(store.find_many(&UserFilter::All).await.unwrap().len(), 2);
        assert_eq!(
            store
                .find_many(&UserFilter::Email("b@x.com".into()))
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
