//! Poll, tally and vote endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post, put},
};
use meetpoll_common::AppResult;
use meetpoll_core::{DateOptionStats, PollDetail, PollVotes, VoteItem};
use meetpoll_db::entities::{
    poll,
    vote::{self, VoteResponse},
};
use serde::Deserialize;
use validator::Validate;

use crate::{
    extractors::{AuthUser, MaybeAuthUser},
    middleware::AppState,
    response::{self, ApiResponse},
};

/// Vote submission.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitVotesRequest {
    #[validate(length(max = 100))]
    pub votes: Vec<VoteItem>,

    /// Display name for anonymous voters.
    #[validate(length(max = 100))]
    pub user_name: Option<String>,
}

/// Change of a single vote.
#[derive(Debug, Deserialize)]
pub struct UpdateVoteRequest {
    pub response: VoteResponse,
}

/// Final date selection.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetFinalDateRequest {
    #[validate(length(min = 1, max = 64))]
    pub date_option_id: String,
}

async fn get_poll(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<PollDetail>> {
    let detail = state.poll_service.get_poll_detail(&id).await?;
    Ok(ApiResponse::ok(detail))
}

async fn get_dates(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Vec<DateOptionStats>>> {
    let stats = state.tally_service.compute_tallies(&id).await?;
    Ok(ApiResponse::ok(stats))
}

async fn set_final_date(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetFinalDateRequest>,
) -> AppResult<ApiResponse<poll::Model>> {
    req.validate()?;

    let poll = state
        .poll_service
        .set_final_date(&id, &user, &req.date_option_id)
        .await?;
    Ok(ApiResponse::ok(poll))
}

async fn submit_votes(
    MaybeAuthUser(maybe_user): MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SubmitVotesRequest>,
) -> AppResult<ApiResponse<Vec<vote::Model>>> {
    req.validate()?;

    let votes = state
        .vote_service
        .submit_votes(&id, maybe_user.as_ref(), req.votes, req.user_name)
        .await?;
    Ok(ApiResponse::created(votes))
}

async fn list_votes(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<PollVotes>> {
    let votes = state.vote_service.list_votes(&id).await?;
    Ok(ApiResponse::ok(votes))
}

async fn update_vote(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path((id, vote_id)): Path<(String, String)>,
    Json(req): Json<UpdateVoteRequest>,
) -> AppResult<ApiResponse<vote::Model>> {
    let vote = state
        .vote_service
        .update_vote(&id, &vote_id, Some(&user), req.response)
        .await?;
    Ok(ApiResponse::ok(vote))
}

async fn delete_vote(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path((id, vote_id)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    state
        .vote_service
        .delete_vote(&id, &vote_id, Some(&user))
        .await?;
    Ok(response::ok())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(get_poll))
        .route("/{id}/dates", get(get_dates))
        .route("/{id}/final", post(set_final_date))
        .route("/{id}/votes", post(submit_votes).get(list_votes))
        .route("/{id}/votes/{vote_id}", put(update_vote).delete(delete_vote))
}
