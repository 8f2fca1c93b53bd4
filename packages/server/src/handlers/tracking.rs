use axum::{Json, extract::State};
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::extractors::json::AppJson;
use crate::models::tracking::{
    TrackingRepoRequest, TrackingRepoResponse, validate_tracking_request,
};
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/add",
    tag = "Tracking",
    operation_id = "addTrackingRepo",
    summary = "Start tracking a repository for a user",
    description = "Validates the repository against the source host with the user's credential, then enables the tracking record.",
    request_body = TrackingRepoRequest,
    responses(
        (status = 200, description = "Tracking enabled", body = TrackingRepoResponse),
        (status = 400, description = "Validation error (INVALID_ARGUMENT)", body = ErrorBody),
        (status = 403, description = "Credential rejected (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "User or repository not found (USER_NOT_FOUND_REASON, REPO_NOT_FOUND_REASON)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload), fields(chat_id = %payload.chat_id, link = %payload.link))]
pub async fn add_tracking_repo(
    State(state): State<AppState>,
    AppJson(payload): AppJson<TrackingRepoRequest>,
) -> Result<Json<TrackingRepoResponse>, AppError> {
    validate_tracking_request(&payload)?;
    state
        .tracking
        .add(payload.chat_id.trim(), payload.link.trim())
        .await?;
    Ok(Json(TrackingRepoResponse {}))
}

#[utoipa::path(
    post,
    path = "/remove",
    tag = "Tracking",
    operation_id = "removeTrackingRepo",
    summary = "Stop tracking a repository for a user",
    request_body = TrackingRepoRequest,
    responses(
        (status = 200, description = "Tracking removed", body = TrackingRepoResponse),
        (status = 400, description = "Validation error (INVALID_ARGUMENT)", body = ErrorBody),
        (status = 404, description = "User not found (USER_NOT_FOUND_REASON)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload), fields(chat_id = %payload.chat_id, link = %payload.link))]
pub async fn remove_tracking_repo(
    State(state): State<AppState>,
    AppJson(payload): AppJson<TrackingRepoRequest>,
) -> Result<Json<TrackingRepoResponse>, AppError> {
    validate_tracking_request(&payload)?;
    state
        .tracking
        .remove(payload.chat_id.trim(), payload.link.trim())
        .await?;
    Ok(Json(TrackingRepoResponse {}))
}
