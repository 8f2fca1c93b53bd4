use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Request body for adding or removing a tracking record.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct TrackingRepoRequest {
    /// Repository link on the source host.
    #[schema(example = "https://github.com/acme/proj")]
    pub link: String,
    /// External chat id of the owning user.
    #[schema(example = "u-1842")]
    pub chat_id: String,
}

pub fn validate_tracking_request(payload: &TrackingRepoRequest) -> Result<(), AppError> {
    if payload.link.trim().is_empty() {
        return Err(AppError::Validation("link must not be empty".into()));
    }
    if payload.chat_id.trim().is_empty() {
        return Err(AppError::Validation("chat_id must not be empty".into()));
    }
    Ok(())
}

/// Empty response for tracking mutations.
#[derive(Serialize, utoipa::ToSchema)]
pub struct TrackingRepoResponse {}
