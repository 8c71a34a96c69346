use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod password;
pub mod services;
pub mod session;
pub mod token;

use middleware::{require_session, SessionGuard};

pub fn router(state: AppState) -> Router<AppState> {
    let session_routes = Router::new()
        .route("/logout", post(handlers::logout))
        .route("/refresh", post(handlers::refresh))
        .route("/dashboard", get(handlers::dashboard))
        .route_layer(from_fn_with_state(
            SessionGuard::user(state.clone()),
            require_session,
        ));

    let admin_routes = Router::new()
        .route("/admin/users", get(handlers::list_users))
        .route_layer(from_fn_with_state(SessionGuard::admin(state), require_session));

    Router::new()
        .route("/register", post(handlers::register))
        .route(
            "/login",
            post(handlers::login).get(handlers::login_required),
        )
        .merge(session_routes)
        .merge(admin_routes)
}
