//! Notification settings endpoints (admin).

use axum::{Json, Router, extract::State, routing::get};
use meetpoll_common::AppResult;
use meetpoll_db::entities::notification_setting;
use serde::Deserialize;
use validator::Validate;

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Setting update.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSettingRequest {
    #[validate(length(min = 1, max = 64))]
    pub key: String,

    #[validate(length(max = 64))]
    pub value: String,
}

async fn list_settings(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<notification_setting::Model>>> {
    let settings = state.settings_service.list(&user).await?;
    Ok(ApiResponse::ok(settings))
}

async fn update_setting(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<UpdateSettingRequest>,
) -> AppResult<ApiResponse<notification_setting::Model>> {
    req.validate()?;

    let setting = state
        .settings_service
        .update(&user, &req.key, &req.value)
        .await?;
    Ok(ApiResponse::ok(setting))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/settings", get(list_settings).put(update_setting))
}
