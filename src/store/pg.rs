use async_trait::async_trait;
use serde_json::Value;
use sqlx::{types::Json, PgPool, Postgres};
use tracing::{debug, error};

use super::{StoreError, UpdateResult, User, UserFilter, UserPatch, UserStore};

/// Users collection kept as JSONB documents in a single postgres table.
///
/// Uniqueness of `email` and of non-null `sessionToken` is enforced by
/// expression indexes (see `migrations/`).
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// SQL predicate for `filter`, referring to its value as `$param`.
fn predicate(filter: &UserFilter, param: u8) -> (String, Option<String>) {
    match filter {
        UserFilter::All => ("TRUE".to_string(), None),
        UserFilter::Email(email) => (format!("doc->>'email' = ${param}"), Some(email.clone())),
        UserFilter::SessionToken(token) => (
            format!("doc->>'sessionToken' = ${param}"),
            Some(token.clone()),
        ),
    }
}

fn never_matches(filter: &UserFilter) -> bool {
    matches!(filter, UserFilter::SessionToken(t) if t.is_empty())
}

fn classify(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateKey,
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Decode(err.to_string())
        }
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        _ => {
            error!(error = %err, "postgres document store error");
            StoreError::Unavailable(err.to_string())
        }
    }
}

fn decode(doc: Value) -> Result<User, StoreError> {
    serde_json::from_value(doc).map_err(|e| StoreError::Decode(e.to_string()))
}

#[async_trait]
impl UserStore for PgDocumentStore {
    async fn find_one(&self, filter: &UserFilter) -> Result<User, StoreError> {
        if never_matches(filter) {
            return Err(StoreError::NotFound);
        }
        let (pred, value) = predicate(filter, 1);
        let sql = format!("SELECT doc FROM users WHERE {pred} LIMIT 1");
        let mut query = sqlx::query_scalar::<Postgres, Json<Value>>(&sql);
        if let Some(v) = value {
            query = query.bind(v);
        }
        let row = query.fetch_optional(&self.pool).await.map_err(classify)?;
        let Json(doc) = row.ok_or(StoreError::NotFound)?;
        decode(doc)
    }

    async fn find_many(&self, filter: &UserFilter) -> Result<Vec<User>, StoreError> {
        if never_matches(filter) {
            return Ok(Vec::new());
        }
        let (pred, value) = predicate(filter, 1);
        let sql = format!("SELECT doc FROM users WHERE {pred} ORDER BY id");
        let mut query = sqlx::query_scalar::<Postgres, Json<Value>>(&sql);
        if let Some(v) = value {
            query = query.bind(v);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(classify)?;
        debug!(count = rows.len(), "find_many fetched documents");
        rows.into_iter().map(|Json(doc)| decode(doc)).collect()
    }

    async fn update_one(
        &self,
        filter: &UserFilter,
        patch: &UserPatch,
    ) -> Result<UpdateResult, StoreError> {
        if never_matches(filter) {
            return Ok(UpdateResult::default());
        }
        // Single statement: the token/expiry pair lands in one write.
        let (pred, value) = predicate(filter, 2);
        let sql = format!(
            r#"
            WITH target AS (
                SELECT id, doc FROM users WHERE {pred} LIMIT 1 FOR UPDATE
            )
            UPDATE users AS u
            SET doc = target.doc || $1::jsonb
            FROM target
            WHERE u.id = target.id
            RETURNING target.doc IS DISTINCT FROM u.doc
            "#
        );
        let mut query =
            sqlx::query_scalar::<Postgres, bool>(&sql).bind(Json(patch.to_document()));
        if let Some(v) = value {
            query = query.bind(v);
        }
        let modified = query.fetch_optional(&self.pool).await.map_err(classify)?;
        Ok(match modified {
            None => UpdateResult::default(),
            Some(changed) => UpdateResult {
                matched: 1,
                modified: u64::from(changed),
            },
        })
    }

    async fn insert_one(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO users (doc) VALUES ($1)")
            .bind(Json(user))
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }
}
