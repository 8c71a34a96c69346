use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{error, info, instrument, warn};

use super::password::{hash_password, verify_password, HashError};
use super::token::{expiry_for, format_expiry, SessionToken};
use crate::error::ApiError;
use crate::store::{StoreError, UpdateResult, User, UserFilter, UserPatch, UserStore};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// A freshly issued session, already persisted.
#[derive(Debug)]
pub struct Session {
    pub user: User,
    pub token: SessionToken,
    pub expires_at: OffsetDateTime,
}

fn issue(
    now: OffsetDateTime,
    ttl: Duration,
) -> Result<(SessionToken, OffsetDateTime, UserPatch), ApiError> {
    let token = SessionToken::generate();
    let expires_at = expiry_for(now, ttl).ok_or_else(|| {
        error!(ttl_minutes = ttl.whole_minutes(), "session expiry out of range");
        ApiError::Internal
    })?;
    let expires_text = format_expiry(expires_at).map_err(|e| {
        error!(error = %e, "format session expiry failed");
        ApiError::Internal
    })?;
    let patch = UserPatch::SetSession {
        token: token.as_str().to_owned(),
        expires_at: expires_text,
    };
    Ok((token, expires_at, patch))
}

fn session_write_error(e: StoreError) -> ApiError {
    match e {
        // A colliding token, not a user-facing conflict.
        StoreError::DuplicateKey => {
            error!("session token collision");
            ApiError::Internal
        }
        other => other.into(),
    }
}

#[instrument(skip(store, password, name))]
pub async fn register_user(
    store: &dyn UserStore,
    email: &str,
    password: &str,
    name: &str,
) -> Result<User, ApiError> {
    // Stored exactly as sent; login looks the email up verbatim.
    let name = name.trim();

    if !is_valid_email(email) {
        warn!("invalid email");
        return Err(ApiError::InputInvalid("Invalid email".into()));
    }
    if password.is_empty() {
        return Err(ApiError::InputInvalid("Password required".into()));
    }
    if name.is_empty() {
        return Err(ApiError::InputInvalid("Name required".into()));
    }

    let hash = hash_password(password)?;
    let user = User::new(email.to_owned(), hash, name.to_owned());

    match store.insert_one(&user).await {
        Ok(()) => {
            info!("user registered");
            Ok(user)
        }
        Err(StoreError::DuplicateKey) => {
            warn!("email already registered");
            Err(ApiError::Conflict)
        }
        Err(e) => Err(e.into()),
    }
}

#[instrument(skip(store, password, now, ttl))]
pub async fn login_user(
    store: &dyn UserStore,
    email: &str,
    password: &str,
    now: OffsetDateTime,
    ttl: Duration,
) -> Result<Session, ApiError> {
    let mut user = match store.find_one(&UserFilter::Email(email.to_owned())).await {
        Ok(u) => u,
        Err(StoreError::NotFound) => {
            warn!("login unknown email");
            return Err(ApiError::Unauthorized);
        }
        Err(e) => return Err(e.into()),
    };

    let ok = match verify_password(password, &user.password_hash) {
        Ok(v) => v,
        Err(HashError::Malformed) => {
            error!("stored password hash is malformed");
            return Err(ApiError::Internal);
        }
        Err(e) => return Err(e.into()),
    };
    if !ok {
        warn!("login invalid password");
        return Err(ApiError::Unauthorized);
    }

    let (token, expires_at, patch) = issue(now, ttl)?;
    let res = store
        .update_one(&UserFilter::Email(user.email.clone()), &patch)
        .await
        .map_err(session_write_error)?;
    if res.matched == 0 {
        warn!("user vanished between lookup and session write");
        return Err(ApiError::Unauthorized);
    }
    patch.apply(&mut user);

    info!("user logged in");
    Ok(Session {
        user,
        token,
        expires_at,
    })
}

/// Clears the session pair, but only while it still holds the caller's token;
/// a session issued meanwhile by another login stays live. Clearing an
/// already-cleared session succeeds.
#[instrument(skip(store, current), fields(email = %current.email))]
pub async fn logout_user(
    store: &dyn UserStore,
    current: &User,
) -> Result<UpdateResult, ApiError> {
    let token = current.session_token.clone().unwrap_or_default();
    let res = store
        .update_one(&UserFilter::SessionToken(token), &UserPatch::ClearSession)
        .await?;
    info!(modified = res.modified, "user logged out");
    Ok(res)
}

/// Rotates the caller's session. The write is conditioned on the token the
/// caller presented, so a session replaced or cleared meanwhile is not revived.
#[instrument(skip(store, current, now, ttl), fields(email = %current.email))]
pub async fn refresh_session(
    store: &dyn UserStore,
    current: &User,
    now: OffsetDateTime,
    ttl: Duration,
) -> Result<Session, ApiError> {
    if !current.has_session() {
        return Err(ApiError::Unauthorized);
    }
    let old_token = current.session_token.clone().unwrap_or_default();

    let (token, expires_at, patch) = issue(now, ttl)?;
    let res = store
        .update_one(&UserFilter::SessionToken(old_token), &patch)
        .await
        .map_err(session_write_error)?;
    if res.matched == 0 {
        warn!("session replaced before refresh");
        return Err(ApiError::Unauthorized);
    }

    let mut user = current.clone();
    patch.apply(&mut user);
    info!("session refreshed");
    Ok(Session {
        user,
        token,
        expires_at,
    })
}

#[instrument(skip(store))]
pub async fn list_users(store: &dyn UserStore) -> Result<Vec<User>, ApiError> {
    Ok(store.find_many(&UserFilter::All).await?)
}
