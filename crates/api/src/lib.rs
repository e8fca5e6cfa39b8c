//! HTTP API layer for meetpoll.
//!
//! - **Endpoints**: votes, poll detail and tallies, final date, settings
//! - **Extractors**: authenticated and optional users
//! - **Middleware**: bearer token authentication
//!
//! Built on Axum 0.8.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;

pub use endpoints::router;
pub use middleware::{AppState, auth_middleware};

use axum::Router;

/// `/api` routes behind the authentication middleware.
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api", router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
}
