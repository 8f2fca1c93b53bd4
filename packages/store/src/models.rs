use chrono::{DateTime, Utc};

/// Inputs for the session-creating transaction.
#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    pub chat_id: String,
    pub repo_url: String,
    pub repo_owner: Option<String>,
    pub repo_name: Option<String>,
    pub branch: Option<String>,
    pub path: String,
    pub workspace_id: String,
    pub session_url: String,
    pub one_time_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// File snapshot carried inside a [`SessionRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub id: i32,
    pub path: String,
    pub storage_key: Option<String>,
}

/// Repository snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub id: i32,
    pub url: String,
    pub owner: Option<String>,
    pub name: Option<String>,
}

/// Editor session plus the file, repository, and owner it hangs off.
///
/// A value snapshot scoped to one request or job; nothing here aliases
/// live database state.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: i64,
    pub workspace_id: String,
    pub session_url: String,
    pub branch: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub saved_at: Option<DateTime<Utc>>,
    pub file: FileRef,
    pub repo: RepoRef,
    pub user_chat_id: Option<String>,
}

/// Owner snapshot carried inside a [`TrackingRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub id: i32,
    pub chat_id: String,
}

/// Cursor-commit snapshot: id plus the committer timestamp the next poll
/// is bounded by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRef {
    pub id: i64,
    pub created_at: DateTime<Utc>,
}

/// One enabled tracking record as the poller sees it.
#[derive(Debug, Clone)]
pub struct TrackingRecord {
    pub id: i32,
    pub created_at: DateTime<Utc>,
    pub user: UserRef,
    pub repo: RepoRef,
    pub cursor_commit: Option<CommitRef>,
}

/// A commit discovered upstream, ready to persist. All commits handed to
/// one `save_commits_and_advance_cursor` call belong to the same repo.
#[derive(Debug, Clone)]
pub struct NewCommit {
    pub owner: String,
    pub name: String,
    pub sha: String,
    pub message: Option<String>,
    pub author_login: Option<String>,
    pub committed_at: DateTime<Utc>,
}
