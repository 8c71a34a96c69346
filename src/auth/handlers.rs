use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::OffsetDateTime;
use tracing::{instrument, warn};

use super::{
    dto::{
        DashboardResponse, LoginRequest, MessageResponse, PublicUser, RegisterRequest,
        SessionResponse,
    },
    middleware::CurrentUser,
    services::{self, Session},
    token::{format_expiry, SessionToken, SESSION_COOKIE},
};
use crate::{error::ApiError, state::AppState};

const HEALTHCHECK_TIMEOUT: Duration = Duration::from_secs(2);

fn session_cookie(
    token: &SessionToken,
    expires_at: OffsetDateTime,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token.as_str().to_owned()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .expires(expires_at)
        .build()
}

fn session_response(
    state: &AppState,
    jar: CookieJar,
    session: Session,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    let expires_at = format_expiry(session.expires_at).map_err(|_| ApiError::Internal)?;
    let cookie = session_cookie(
        &session.token,
        session.expires_at,
        state.config.session.cookie_secure,
    );
    Ok((
        jar.add(cookie),
        Json(SessionResponse {
            user: PublicUser::from(&session.user),
            expires_at,
        }),
    ))
}

#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<PublicUser>, ApiError> {
    let Json(payload) = payload?;
    let user = services::register_user(
        state.users.as_ref(),
        &payload.email,
        &payload.password,
        &payload.name,
    )
    .await?;
    Ok(Json(PublicUser::from(&user)))
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    let Json(payload) = payload?;
    let session = services::login_user(
        state.users.as_ref(),
        &payload.email,
        &payload.password,
        state.clock.now(),
        state.config.session.ttl(),
    )
    .await?;
    session_response(&state, jar, session)
}

/// Target of the middleware's redirect; logging in itself is `POST /login`.
pub async fn login_required() -> (StatusCode, Json<MessageResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(MessageResponse {
            message: "Login required: POST /login with email and password".into(),
        }),
    )
}

#[instrument(skip_all, fields(email = %user.email))]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    CurrentUser(user): CurrentUser,
) -> Result<(CookieJar, Json<MessageResponse>), ApiError> {
    services::logout_user(state.users.as_ref(), &user).await?;
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((
        jar,
        Json(MessageResponse {
            message: "Logged out".into(),
        }),
    ))
}

#[instrument(skip_all, fields(email = %user.email))]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    CurrentUser(user): CurrentUser,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    let session = services::refresh_session(
        state.users.as_ref(),
        &user,
        state.clock.now(),
        state.config.session.ttl(),
    )
    .await?;
    session_response(&state, jar, session)
}

pub async fn dashboard(CurrentUser(user): CurrentUser) -> Json<DashboardResponse> {
    Json(DashboardResponse {
        greeting: format!("Welcome back, {}!", user.name),
        session_expires_at: user.session_expires_at.clone(),
        user: PublicUser::from(&user),
    })
}

#[instrument(skip_all, fields(admin = %admin.email))]
pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
) -> Result<Json<Vec<PublicUser>>, ApiError> {
    let users = services::list_users(state.users.as_ref()).await?;
    Ok(Json(users.iter().map(PublicUser::from).collect()))
}

pub async fn healthcheck(State(state): State<AppState>) -> (StatusCode, &'static str) {
    match tokio::time::timeout(HEALTHCHECK_TIMEOUT, state.users.ping()).await {
        Ok(Ok(())) => (StatusCode::OK, "Connection to Database established.\n"),
        Ok(Err(e)) => {
            warn!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Waited 2 seconds, could not connect to server.\n",
            )
        }
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Waited 2 seconds, could not connect to server.\n",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn session_cookie_attributes() {
        let token = SessionToken::generate();
        let expires = datetime!(2024-05-01 14:00 UTC);
        let cookie = session_cookie(&token, expires, true);

        assert_eq!(cookie.name(), "session_token");
        assert_eq!(cookie.value(), token.as_str());
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.expires_datetime(), Some(expires));
    }
}
