//! Current user endpoints.

use axum::{Router, extract::State, routing::get};
use meetpoll_common::AppResult;
use meetpoll_db::entities::vote;

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

async fn my_votes(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<vote::Model>>> {
    let votes = state.vote_service.list_user_votes(&user.id).await?;
    Ok(ApiResponse::ok(votes))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/votes", get(my_votes))
}
