//! Per-request session classification.
//!
//! Nothing here is remembered between calls: the only persisted state is
//! the token/expiry pair on the user document.

use axum::http::{header, HeaderMap};
use axum_extra::extract::cookie::Cookie;
use time::OffsetDateTime;
use tracing::{debug, error, warn};

use super::token::{is_expired, parse_expiry, SESSION_COOKIE};
use crate::store::{StoreError, User, UserFilter, UserStore};

/// What the request carried in its `Cookie` headers.
#[derive(Clone, PartialEq, Eq)]
pub enum CookieState {
    Absent,
    Unreadable,
    Present(String),
}

impl std::fmt::Debug for CookieState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CookieState::Absent => f.write_str("Absent"),
            CookieState::Unreadable => f.write_str("Unreadable"),
            CookieState::Present(_) => f.write_str("Present(..)"),
        }
    }
}

/// Outcome of validating one request's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    Valid(User),
    Unauthenticated,
    MalformedRequest,
    Forbidden,
    InternalError,
}

/// Finds the session cookie among all `Cookie` headers. Opaque bytes only
/// make the request unreadable when they sit in a header that carries the
/// session cookie.
pub fn read_session_cookie(headers: &HeaderMap) -> CookieState {
    let mut unreadable = false;
    for value in headers.get_all(header::COOKIE) {
        match value.to_str() {
            Ok(raw) => {
                if let Some(token) = session_value(raw) {
                    return CookieState::Present(token);
                }
            }
            Err(_) => {
                let lossy = String::from_utf8_lossy(value.as_bytes());
                unreadable |= session_value(&lossy).is_some();
            }
        }
    }
    if unreadable {
        CookieState::Unreadable
    } else {
        CookieState::Absent
    }
}

fn session_value(raw: &str) -> Option<String> {
    Cookie::split_parse(raw)
        .flatten()
        .find(|cookie| cookie.name() == SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

/// Looks up the session owner and classifies the request.
pub async fn classify(
    store: &dyn UserStore,
    cookie: CookieState,
    require_admin: bool,
    now: OffsetDateTime,
) -> AuthStatus {
    let token = match cookie {
        CookieState::Absent => return AuthStatus::Unauthenticated,
        CookieState::Unreadable => {
            warn!("bad auth attempt: could not read cookie");
            return AuthStatus::MalformedRequest;
        }
        CookieState::Present(token) if token.is_empty() => {
            return AuthStatus::Unauthenticated;
        }
        CookieState::Present(token) => token,
    };

    let lookup = store.find_one(&UserFilter::SessionToken(token)).await;
    evaluate(lookup, require_admin, now)
}

/// Decision table applied to the result of the token lookup.
pub fn evaluate(
    lookup: Result<User, StoreError>,
    require_admin: bool,
    now: OffsetDateTime,
) -> AuthStatus {
    let user = match lookup {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            debug!("bad auth attempt: no user holds this session token");
            return AuthStatus::Unauthenticated;
        }
        Err(e) => {
            error!(error = %e, "bad auth attempt: session lookup failed");
            return AuthStatus::InternalError;
        }
    };

    let Some(expires_at) = user
        .session_expires_at
        .as_deref()
        .and_then(|raw| parse_expiry(raw).ok())
    else {
        warn!(email = %user.email, "bad auth attempt: session expiry missing or unparsable");
        return AuthStatus::MalformedRequest;
    };

    if is_expired(expires_at, now) {
        debug!(email = %user.email, "session expired");
        return AuthStatus::Unauthenticated;
    }

    if require_admin && !user.is_admin {
        warn!(email = %user.email, "bad auth attempt: admin required");
        return AuthStatus::Forbidden;
    }

    AuthStatus::Valid(user)
}
