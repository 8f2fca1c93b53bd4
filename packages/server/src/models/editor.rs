use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::editor::CreateSessionRequest;

/// Request body for opening an editor session over one file.
///
/// Exactly one source must be given: `repo` (with `path`, and optionally
/// `branch`) or `s3_key`.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateEditorSessionRequest {
    /// Repository in `owner/name` or URL form.
    #[schema(example = "acme/proj")]
    pub repo: Option<String>,
    /// Branch to stage the file from. Defaults to "main".
    #[schema(example = "main")]
    pub branch: Option<String>,
    /// File path inside the repository, or the staged filename for blob
    /// sources (defaults to the key's basename).
    #[schema(example = "README.md")]
    pub path: Option<String>,
    /// External chat id of the requesting user.
    #[schema(example = "u-1842")]
    pub chat_id: String,
    /// Session lifetime in seconds; must be positive.
    #[schema(example = 600)]
    pub ttl_seconds: i64,
    /// Blob-store key to stage the file from instead of a repository.
    pub s3_key: Option<String>,
}

impl From<CreateEditorSessionRequest> for CreateSessionRequest {
    fn from(payload: CreateEditorSessionRequest) -> Self {
        Self {
            repo: payload.repo,
            branch: payload.branch,
            path: payload.path,
            chat_id: payload.chat_id,
            ttl_seconds: payload.ttl_seconds,
            s3_key: payload.s3_key,
        }
    }
}

/// Successful session creation.
#[derive(Serialize, utoipa::ToSchema)]
pub struct CreateEditorSessionResponse {
    /// Single-use URL the user opens to reach the editor.
    pub one_time_url: String,
    /// Session id as a decimal string.
    #[schema(example = "42")]
    pub session_id: String,
    /// When the one-time URL stops working.
    pub expires_at: DateTime<Utc>,
}

/// Successful (possibly provisional) save.
#[derive(Serialize, utoipa::ToSchema)]
pub struct SaveEditorSessionResponse {
    /// Blob key the edit lands on.
    #[schema(example = "edited/acme/proj/42/README.md")]
    pub s3_key: String,
    /// A claim, not a durable receipt: for a freshly triggered save this is
    /// the session's creation time and the background job is still writing.
    /// The file-edited webhook is the durability signal.
    pub saved_at: DateTime<Utc>,
}
