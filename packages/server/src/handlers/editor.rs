use axum::{
    Json,
    extract::{Path, State},
};
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::extractors::json::AppJson;
use crate::models::editor::{
    CreateEditorSessionRequest, CreateEditorSessionResponse, SaveEditorSessionResponse,
};
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/",
    tag = "Editor",
    operation_id = "createEditorSession",
    summary = "Open an ephemeral editor session over one file",
    description = "Stages the file into a fresh workspace and returns a single-use URL. Exactly one of `repo` and `s3_key` must be given.",
    request_body = CreateEditorSessionRequest,
    responses(
        (status = 200, description = "Session created", body = CreateEditorSessionResponse),
        (status = 400, description = "Validation error (INVALID_ARGUMENT)", body = ErrorBody),
        (status = 403, description = "Missing or rejected credential (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "User or repository not found", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload), fields(chat_id = %payload.chat_id))]
pub async fn create_editor_session(
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateEditorSessionRequest>,
) -> Result<Json<CreateEditorSessionResponse>, AppError> {
    let response = state.editor.create_editor_session(payload.into()).await?;

    Ok(Json(CreateEditorSessionResponse {
        one_time_url: response.one_time_url,
        session_id: response.session_id.to_string(),
        expires_at: response.expires_at,
    }))
}

#[utoipa::path(
    post,
    path = "/{id}/save",
    tag = "Editor",
    operation_id = "saveEditorSession",
    summary = "Persist a session's edits to durable storage",
    description = "Idempotent. An already-saved session answers with its durable key; otherwise the save runs in the background and the reply is provisional.",
    params(("id" = String, Path, description = "Session id as a decimal string")),
    responses(
        (status = 200, description = "Save accepted", body = SaveEditorSessionResponse),
        (status = 400, description = "Malformed session id (INVALID_ARGUMENT)", body = ErrorBody),
        (status = 404, description = "Session not found", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn save_editor_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SaveEditorSessionResponse>, AppError> {
    let session_id = parse_session_id(&id)?;
    let response = state.editor.save_editor_session(session_id).await?;

    Ok(Json(SaveEditorSessionResponse {
        s3_key: response.storage_key,
        saved_at: response.saved_at,
    }))
}

fn parse_session_id(raw: &str) -> Result<i64, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("session id is required".into()));
    }
    match trimmed.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(AppError::Validation(
            "session id must be a positive integer".into(),
        )),
    }
}
