//! API endpoints.

mod notifications;
mod polls;
mod users;

use axum::Router;

use crate::middleware::AppState;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/polls", polls::router())
        .nest("/notifications", notifications::router())
        .nest("/user", users::router())
}
