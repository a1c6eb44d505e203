//! REST routes.
//!
//! `/api/auth/*` is public. Everything under `/api/session`,
//! `/api/messages`, and `/api/chats` passes through
//! [`crate::auth::require_auth`] first.

pub mod auth;
pub mod chats;
pub mod messages;
pub mod session;

use axum::Router;
use axum::middleware;

use crate::server::AppState;

/// All `/api` routes, with the protected ones behind the secret check.
pub fn router(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .merge(session::routes())
        .merge(messages::routes())
        .merge(chats::routes())
        .route_layer(middleware::from_fn_with_state(
            state.secret.clone(),
            crate::auth::require_auth,
        ));

    Router::new().merge(auth::routes()).merge(protected)
}
