use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::warn;

use super::session::{classify, read_session_cookie, AuthStatus};
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::User;

/// Where unauthenticated requests are sent.
pub const LOGIN_PATH: &str = "/login";

/// Middleware state: the app plus whether the wrapped routes need an admin.
#[derive(Clone)]
pub struct SessionGuard {
    state: AppState,
    require_admin: bool,
}

impl SessionGuard {
    pub fn user(state: AppState) -> Self {
        Self {
            state,
            require_admin: false,
        }
    }

    pub fn admin(state: AppState) -> Self {
        Self {
            state,
            require_admin: true,
        }
    }
}

/// Identity of the validated session, placed in request extensions.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

pub async fn require_session(
    State(guard): State<SessionGuard>,
    mut req: Request,
    next: Next,
) -> Response {
    let cookie = read_session_cookie(req.headers());
    let now = guard.state.clock.now();
    let status = classify(guard.state.users.as_ref(), cookie, guard.require_admin, now).await;

    match status {
        AuthStatus::Valid(user) => {
            req.extensions_mut().insert(CurrentUser(user));
            next.run(req).await
        }
        AuthStatus::Unauthenticated => Redirect::to(LOGIN_PATH).into_response(),
        AuthStatus::MalformedRequest => {
            ApiError::InputInvalid("Malformed session".into()).into_response()
        }
        AuthStatus::Forbidden => ApiError::Forbidden.into_response(),
        AuthStatus::InternalError => ApiError::Internal.into_response(),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<CurrentUser>().cloned().ok_or_else(|| {
            // Route mounted without require_session.
            warn!("handler expected a validated session but none was attached");
            ApiError::Internal
        })
    }
}
