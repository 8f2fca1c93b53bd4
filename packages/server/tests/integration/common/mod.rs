use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BlobStore, BoxReader, StorageError};
use mq::{BusError, ChangeBus, ChangingRecord};
use serde_json::Value;
use store::{
    CommitRef, CreateSessionParams, FileRef, NewCommit, RepoRef, SessionRecord, Store, StoreError,
    TrackingRecord, UserRef,
};
use tokio::io::AsyncReadExt;

use server::editor::{EditorService, EditorSettings};
use server::notify::{FileEditNotifier, NotifyError};
use server::source_host::{RepoCommit, SourceHost, SourceHostError};
use server::state::AppState;
use server::tracking::TrackingService;
use server::workspace::{WorkspaceClient, WorkspaceError};

// ---------------------------------------------------------------------------
// In-memory store

#[derive(Debug, Clone)]
struct UserRow {
    id: i32,
    chat_id: String,
    username: Option<String>,
}

#[derive(Debug, Clone)]
struct TokenRow {
    user_id: i32,
    secret: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct RepoRow {
    id: i32,
    url: String,
    owner: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Clone)]
struct FileRow {
    id: i32,
    repo_id: i32,
    path: String,
    storage_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: i64,
    pub file_id: i32,
    pub workspace_id: String,
    pub session_url: String,
    pub one_time_token: Option<String>,
    pub for_user: Option<i32>,
    pub branch: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub saved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: i32,
    pub user_id: i32,
    pub repo_id: i32,
    pub last_commit: Option<i64>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CommitRow {
    pub id: i64,
    pub repo_id: i32,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    users: Vec<UserRow>,
    tokens: Vec<TokenRow>,
    repos: Vec<RepoRow>,
    files: Vec<FileRow>,
    sessions: Vec<SessionRow>,
    notifications: Vec<NotificationRow>,
    commits: Vec<CommitRow>,
    user_repos: Vec<(i32, i32)>,
    next_id: i64,
}

impl Inner {
    fn next(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn find_repo(&self, url: &str) -> Option<RepoRow> {
        let with_git = format!("{url}.git");
        self.repos
            .iter()
            .find(|r| r.url == url || r.url == with_git)
            .cloned()
    }

    fn record_for(&self, session: &SessionRow) -> Result<SessionRecord, StoreError> {
        let file = self
            .files
            .iter()
            .find(|f| f.id == session.file_id)
            .ok_or(StoreError::SessionNotFound)?;
        let repo = self
            .repos
            .iter()
            .find(|r| r.id == file.repo_id)
            .ok_or(StoreError::SessionNotFound)?;
        let user_chat_id = session
            .for_user
            .and_then(|uid| self.users.iter().find(|u| u.id == uid))
            .map(|u| u.chat_id.clone());

        Ok(SessionRecord {
            id: session.id,
            workspace_id: session.workspace_id.clone(),
            session_url: session.session_url.clone(),
            branch: session.branch.clone(),
            created_at: session.created_at,
            expires_at: session.expires_at,
            consumed_at: session.consumed_at,
            saved_at: session.saved_at,
            file: FileRef {
                id: file.id,
                path: file.path.clone(),
                storage_key: file.storage_key.clone(),
            },
            repo: RepoRef {
                id: repo.id,
                url: repo.url.clone(),
                owner: repo.owner.clone(),
                name: repo.name.clone(),
            },
            user_chat_id,
        })
    }
}

/// In-memory [`Store`] with the same operation semantics as the SQL one.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn seed_user(&self, chat_id: &str) -> i32 {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next() as i32;
        inner.users.push(UserRow {
            id,
            chat_id: chat_id.to_string(),
            username: Some(chat_id.to_string()),
        });
        id
    }

    pub fn seed_token(&self, user_id: i32, secret: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.tokens.push(TokenRow {
            user_id,
            secret: secret.to_string(),
            created_at: Utc::now(),
        });
    }

    pub fn session_row(&self, id: i64) -> Option<SessionRow> {
        let inner = self.inner.lock().unwrap();
        inner.sessions.iter().find(|s| s.id == id).cloned()
    }

    pub fn notifications(&self) -> Vec<NotificationRow> {
        self.inner.lock().unwrap().notifications.clone()
    }

    pub fn commits(&self) -> Vec<CommitRow> {
        self.inner.lock().unwrap().commits.clone()
    }

    pub fn repo_url(&self, repo_id: i32) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .repos
            .iter()
            .find(|r| r.id == repo_id)
            .map(|r| r.url.clone())
    }

    pub fn file_storage_key(&self, file_id: i32) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .files
            .iter()
            .find(|f| f.id == file_id)
            .and_then(|f| f.storage_key.clone())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_user_token(&self, chat_id: &str) -> Result<String, StoreError> {
        let inner = self.inner.lock().unwrap();
        let user = inner
            .users
            .iter()
            .find(|u| u.chat_id == chat_id)
            .ok_or(StoreError::UserNotFound)?;
        inner
            .tokens
            .iter()
            .filter(|t| t.user_id == user.id)
            .max_by_key(|t| t.created_at)
            .map(|t| t.secret.clone())
            .ok_or(StoreError::TokenNotFound)
    }

    async fn create_editor_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<SessionRecord, StoreError> {
        let token = params.one_time_token.trim().to_string();
        if token.is_empty() {
            return Err(StoreError::InvalidArgument(
                "one-time token is required".into(),
            ));
        }

        let mut inner = self.inner.lock().unwrap();
        let user = inner
            .users
            .iter()
            .find(|u| u.chat_id == params.chat_id)
            .cloned()
            .ok_or(StoreError::UserNotFound)?;

        let repo = match inner.find_repo(&params.repo_url) {
            Some(repo) => repo,
            None => {
                let id = inner.next() as i32;
                let repo = RepoRow {
                    id,
                    url: params.repo_url.clone(),
                    owner: params.repo_owner.clone(),
                    name: params.repo_name.clone(),
                };
                inner.repos.push(repo.clone());
                repo
            }
        };

        let file = match inner
            .files
            .iter()
            .find(|f| f.repo_id == repo.id && f.path == params.path)
            .cloned()
        {
            Some(file) => file,
            None => {
                let id = inner.next() as i32;
                let file = FileRow {
                    id,
                    repo_id: repo.id,
                    path: params.path.clone(),
                    storage_key: None,
                };
                inner.files.push(file.clone());
                file
            }
        };

        let id = inner.next();
        let session = SessionRow {
            id,
            file_id: file.id,
            workspace_id: params.workspace_id.clone(),
            session_url: params.session_url.clone(),
            one_time_token: Some(token),
            for_user: Some(user.id),
            branch: params.branch.clone(),
            created_at: Utc::now(),
            expires_at: params.expires_at,
            consumed_at: None,
            saved_at: None,
        };
        inner.sessions.push(session.clone());
        inner.record_for(&session)
    }

    async fn get_session_by_token(&self, token: &str) -> Result<SessionRecord, StoreError> {
        let inner = self.inner.lock().unwrap();
        let session = inner
            .sessions
            .iter()
            .find(|s| s.one_time_token.as_deref() == Some(token))
            .cloned()
            .ok_or(StoreError::SessionNotFound)?;
        inner.record_for(&session)
    }

    async fn get_session_by_id(&self, id: i64) -> Result<SessionRecord, StoreError> {
        let inner = self.inner.lock().unwrap();
        let session = inner
            .sessions
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or(StoreError::SessionNotFound)?;
        inner.record_for(&session)
    }

    async fn mark_session_consumed(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(session) = inner.sessions.iter_mut().find(|s| s.id == id)
            && session.consumed_at.is_none()
        {
            session.consumed_at = Some(at);
        }
        Ok(())
    }

    async fn mark_session_saved(
        &self,
        id: i64,
        at: DateTime<Utc>,
        storage_key: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let file_id = {
            let session = inner
                .sessions
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or(StoreError::SessionNotFound)?;
            if session.saved_at.is_some() {
                return Ok(false);
            }
            session.saved_at = Some(at);
            session.file_id
        };
        let storage_key = storage_key.trim();
        if !storage_key.is_empty()
            && let Some(file) = inner.files.iter_mut().find(|f| f.id == file_id)
        {
            file.storage_key = Some(storage_key.to_string());
        }
        Ok(true)
    }

    async fn mark_session_expired(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(session) = inner.sessions.iter_mut().find(|s| s.id == id)
            && session.expires_at.is_none_or(|current| current < at)
        {
            session.expires_at = Some(at);
        }
        Ok(())
    }

    async fn list_expired_unsaved(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut matching: Vec<&SessionRow> = inner
            .sessions
            .iter()
            .filter(|s| s.saved_at.is_none() && s.expires_at.is_some_and(|e| e <= now))
            .collect();
        matching.sort_by_key(|s| s.expires_at);
        matching
            .into_iter()
            .take(if limit == 0 { usize::MAX } else { limit as usize })
            .map(|s| inner.record_for(s))
            .collect()
    }

    async fn list_active_unsaved(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut matching: Vec<&SessionRow> = inner
            .sessions
            .iter()
            .filter(|s| s.saved_at.is_none() && s.expires_at.is_none_or(|e| e > now))
            .collect();
        matching.sort_by_key(|s| s.created_at);
        matching
            .into_iter()
            .take(if limit == 0 { usize::MAX } else { limit as usize })
            .map(|s| inner.record_for(s))
            .collect()
    }

    async fn count_tracking(&self) -> Result<u64, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.notifications.iter().filter(|n| n.enabled).count() as u64)
    }

    async fn list_tracking(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<TrackingRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut enabled: Vec<&NotificationRow> =
            inner.notifications.iter().filter(|n| n.enabled).collect();
        enabled.sort_by_key(|n| n.id);

        let mut records = Vec::new();
        for row in enabled
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
        {
            let Some(user) = inner.users.iter().find(|u| u.id == row.user_id) else {
                continue;
            };
            let Some(repo) = inner.repos.iter().find(|r| r.id == row.repo_id) else {
                continue;
            };
            let cursor_commit = row.last_commit.and_then(|cid| {
                inner.commits.iter().find(|c| c.id == cid).map(|c| CommitRef {
                    id: c.id,
                    created_at: c.created_at,
                })
            });
            records.push(TrackingRecord {
                id: row.id,
                created_at: row.created_at,
                user: UserRef {
                    id: user.id,
                    chat_id: user.chat_id.clone(),
                },
                repo: RepoRef {
                    id: repo.id,
                    url: repo.url.clone(),
                    owner: repo.owner.clone(),
                    name: repo.name.clone(),
                },
                cursor_commit,
            });
        }
        Ok(records)
    }

    async fn add_tracking(&self, chat_id: &str, repo_url: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let user_id = inner
            .users
            .iter()
            .find(|u| u.chat_id == chat_id)
            .map(|u| u.id)
            .ok_or(StoreError::UserNotFound)?;

        let repo_id = match inner.find_repo(repo_url) {
            Some(repo) => repo.id,
            None => {
                let id = inner.next() as i32;
                let mut segments = repo_url.rsplit('/');
                let name = segments.next().map(|s| s.trim_end_matches(".git").to_string());
                let owner = segments.next().map(str::to_string);
                inner.repos.push(RepoRow {
                    id,
                    url: repo_url.to_string(),
                    owner,
                    name,
                });
                id
            }
        };

        if !inner.user_repos.contains(&(user_id, repo_id)) {
            inner.user_repos.push((user_id, repo_id));
        }

        if let Some(existing) = inner
            .notifications
            .iter_mut()
            .find(|n| n.user_id == user_id && n.repo_id == repo_id)
        {
            existing.enabled = true;
        } else {
            let id = inner.next() as i32;
            inner.notifications.push(NotificationRow {
                id,
                user_id,
                repo_id,
                last_commit: None,
                enabled: true,
                created_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn remove_tracking(&self, chat_id: &str, repo_url: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let user_id = inner
            .users
            .iter()
            .find(|u| u.chat_id == chat_id)
            .map(|u| u.id)
            .ok_or(StoreError::UserNotFound)?;
        if let Some(repo) = inner.find_repo(repo_url) {
            inner
                .notifications
                .retain(|n| !(n.user_id == user_id && n.repo_id == repo.id));
        }
        Ok(())
    }

    async fn disable_tracking(&self, id: i32) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(row) = inner.notifications.iter_mut().find(|n| n.id == id) {
            row.enabled = false;
        }
        Ok(())
    }

    async fn disable_tracking_for_user(&self, user_id: i32) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        for row in inner.notifications.iter_mut().filter(|n| n.user_id == user_id) {
            row.enabled = false;
        }
        Ok(())
    }

    async fn save_commits_and_advance_cursor(
        &self,
        commits: &[NewCommit],
    ) -> Result<(), StoreError> {
        let Some(first) = commits.first() else {
            return Ok(());
        };

        let mut inner = self.inner.lock().unwrap();
        let repo_id = inner
            .repos
            .iter()
            .find(|r| {
                (r.owner.as_deref() == Some(first.owner.as_str())
                    && r.name.as_deref() == Some(first.name.as_str()))
                    || r.url == format!("https://github.com/{}/{}", first.owner, first.name)
            })
            .map(|r| r.id)
            .ok_or(StoreError::RepoNotFound)?;

        for incoming in commits {
            if incoming.sha.is_empty()
                || inner
                    .commits
                    .iter()
                    .any(|c| c.repo_id == repo_id && c.hash == incoming.sha)
            {
                continue;
            }
            let id = inner.next();
            inner.commits.push(CommitRow {
                id,
                repo_id,
                hash: incoming.sha.clone(),
                created_at: incoming.committed_at,
            });
        }

        if let Some(latest) = inner
            .commits
            .iter()
            .filter(|c| c.repo_id == repo_id)
            .max_by_key(|c| (c.created_at, c.id))
            .map(|c| c.id)
        {
            for row in inner
                .notifications
                .iter_mut()
                .filter(|n| n.repo_id == repo_id && n.enabled)
            {
                row.last_commit = Some(latest);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fake collaborators

/// Workspace fake: uploads land in a map, downloads serve them back.
#[derive(Default)]
pub struct FakeWorkspace {
    pub created: Mutex<Vec<String>>,
    pub files: Mutex<HashMap<(String, String), Vec<u8>>>,
    pub editor_url: Mutex<String>,
}

impl FakeWorkspace {
    pub fn new(editor_url: &str) -> Self {
        Self {
            editor_url: Mutex::new(editor_url.to_string()),
            ..Default::default()
        }
    }

    pub fn put_file(&self, workspace_id: &str, path: &str, content: &[u8]) {
        self.files.lock().unwrap().insert(
            (workspace_id.to_string(), path.to_string()),
            content.to_vec(),
        );
    }

    pub fn uploaded(&self, workspace_id: &str, path: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(&(workspace_id.to_string(), path.to_string()))
            .cloned()
    }
}

#[async_trait]
impl WorkspaceClient for FakeWorkspace {
    async fn create_workspace(&self, name: &str) -> Result<String, WorkspaceError> {
        let mut created = self.created.lock().unwrap();
        created.push(name.to_string());
        Ok(format!("ws-{}", created.len()))
    }

    async fn upload_file(
        &self,
        workspace_id: &str,
        path: &str,
        mut content: BoxReader,
        _size: Option<u64>,
    ) -> Result<(), WorkspaceError> {
        let mut bytes = Vec::new();
        content
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| WorkspaceError::Config(e.to_string()))?;
        self.put_file(workspace_id, path, &bytes);
        Ok(())
    }

    async fn get_editor_url(&self, _workspace_id: &str) -> Result<String, WorkspaceError> {
        Ok(self.editor_url.lock().unwrap().clone())
    }

    async fn download_file(
        &self,
        workspace_id: &str,
        path: &str,
    ) -> Result<BoxReader, WorkspaceError> {
        let bytes = self
            .uploaded(workspace_id, path)
            .ok_or_else(|| WorkspaceError::Config("file missing in workspace".into()))?;
        Ok(Box::new(std::io::Cursor::new(bytes)))
    }
}

/// Blob-store fake with full byte capture.
#[derive(Default)]
pub struct FakeBlobs {
    pub blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeBlobs {
    pub fn put(&self, key: &str, bytes: &[u8]) {
        self.blobs
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl BlobStore for FakeBlobs {
    async fn save(
        &self,
        key: &str,
        mut content: BoxReader,
        _size: Option<u64>,
    ) -> Result<(), StorageError> {
        if key.trim().is_empty() {
            return Err(StorageError::EmptyKey);
        }
        let mut bytes = Vec::new();
        content.read_to_end(&mut bytes).await?;
        self.put(key.trim(), &bytes);
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<(BoxReader, Option<u64>), StorageError> {
        if key.trim().is_empty() {
            return Err(StorageError::EmptyKey);
        }
        let bytes = self
            .get(key.trim())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        let size = bytes.len() as u64;
        Ok((Box::new(std::io::Cursor::new(bytes)), Some(size)))
    }
}

/// Source-host fake driven by per-test knobs.
#[derive(Default)]
pub struct FakeSourceHost {
    /// Repos that exist, by canonical URL.
    pub repos: Mutex<Vec<String>>,
    /// Commits returned by every `commits_since` call.
    pub commits: Mutex<Vec<RepoCommit>>,
    /// Raw file bytes by `(owner/name, path)`.
    pub files: Mutex<HashMap<(String, String), (Vec<u8>, Option<u64>)>>,
    /// Every probe and listing fails with `InvalidToken`.
    pub reject_token: AtomicBool,
}

impl FakeSourceHost {
    pub fn add_repo(&self, url: &str) {
        self.repos.lock().unwrap().push(url.to_string());
    }

    pub fn add_file(&self, owner_name: &str, path: &str, bytes: &[u8], size: Option<u64>) {
        self.files.lock().unwrap().insert(
            (owner_name.to_string(), path.to_string()),
            (bytes.to_vec(), size),
        );
    }

    pub fn set_commits(&self, commits: Vec<RepoCommit>) {
        *self.commits.lock().unwrap() = commits;
    }
}

#[async_trait]
impl SourceHost for FakeSourceHost {
    async fn repo_exists(&self, _token: &str, url: &str) -> Result<bool, SourceHostError> {
        if self.reject_token.load(Ordering::SeqCst) {
            return Err(SourceHostError::InvalidToken);
        }
        Ok(self.repos.lock().unwrap().iter().any(|r| r == url))
    }

    async fn commits_since(
        &self,
        _token: &str,
        _url: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<RepoCommit>, SourceHostError> {
        if self.reject_token.load(Ordering::SeqCst) {
            return Err(SourceHostError::InvalidToken);
        }
        Ok(self.commits.lock().unwrap().clone())
    }

    async fn download_file(
        &self,
        _token: &str,
        owner: &str,
        name: &str,
        _branch: &str,
        path: &str,
    ) -> Result<(BoxReader, Option<u64>), SourceHostError> {
        let files = self.files.lock().unwrap();
        let (bytes, size) = files
            .get(&(format!("{owner}/{name}"), path.to_string()))
            .cloned()
            .ok_or_else(|| SourceHostError::Http("file download returned 404".into()))?;
        Ok((Box::new(std::io::Cursor::new(bytes)), size))
    }
}

/// Bus fake that records every published change.
#[derive(Default)]
pub struct RecordingBus {
    pub published: Mutex<Vec<(String, ChangingRecord)>>,
}

impl RecordingBus {
    pub fn records(&self) -> Vec<(String, ChangingRecord)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChangeBus for RecordingBus {
    async fn publish(&self, chat_id: &str, record: &ChangingRecord) -> Result<(), BusError> {
        self.published
            .lock()
            .unwrap()
            .push((chat_id.to_string(), record.clone()));
        Ok(())
    }
}

/// Webhook fake that records every file-edited signal.
#[derive(Default)]
pub struct RecordingNotifier {
    pub notified: Mutex<Vec<(i32, DateTime<Utc>)>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<(i32, DateTime<Utc>)> {
        self.notified.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileEditNotifier for RecordingNotifier {
    async fn notify_file_edited(
        &self,
        file_id: i32,
        saved_at: DateTime<Utc>,
    ) -> Result<(), NotifyError> {
        self.notified.lock().unwrap().push((file_id, saved_at));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wiring

/// All fakes behind one handle, for direct service-level tests.
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub workspace: Arc<FakeWorkspace>,
    pub blobs: Arc<FakeBlobs>,
    pub source_host: Arc<FakeSourceHost>,
    pub notifier: Arc<RecordingNotifier>,
    pub bus: Arc<RecordingBus>,
    pub editor: EditorService,
}

pub const EDITOR_URL: &str = "https://edit.example.com/ide";
pub const PROXY_BASE: &str = "http://gateway.local";

pub fn gateway_settings() -> EditorSettings {
    EditorSettings {
        proxy_base_url: Some(PROXY_BASE.to_string()),
        provider_access_token: "provider-secret".into(),
        token_query_param: "session_token".into(),
        max_file_size: 1 << 20,
    }
}

pub fn direct_settings() -> EditorSettings {
    EditorSettings {
        proxy_base_url: None,
        ..gateway_settings()
    }
}

pub fn fixture(settings: EditorSettings) -> Fixture {
    let store = Arc::new(MemoryStore::default());
    let workspace = Arc::new(FakeWorkspace::new(EDITOR_URL));
    let blobs = Arc::new(FakeBlobs::default());
    let source_host = Arc::new(FakeSourceHost::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let bus = Arc::new(RecordingBus::default());

    let editor = EditorService::new(
        store.clone(),
        workspace.clone(),
        blobs.clone(),
        source_host.clone(),
        notifier.clone(),
        settings,
    );

    Fixture {
        store,
        workspace,
        blobs,
        source_host,
        notifier,
        bus,
        editor,
    }
}

/// A running test server over the in-memory fixture.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    pub fixture: Fixture,
}

/// Parsed HTTP response for test assertions.
pub struct TestResponse {
    pub status: u16,
    pub body: Value,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let fixture = fixture(gateway_settings());

        let state = AppState {
            editor: Arc::new(fixture.editor.clone()),
            tracking: Arc::new(TrackingService::new(
                fixture.store.clone(),
                fixture.source_host.clone(),
            )),
        };
        let app = server::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: reqwest::Client::new(),
            fixture,
        }
    }

    pub async fn post(&self, path: &str, body: &Value) -> TestResponse {
        let res = self
            .client
            .post(format!("http://{}{}", self.addr, path))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");
        let status = res.status().as_u16();
        let text = res.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        TestResponse { status, body }
    }
}

/// Wait until `predicate` holds, for work done by detached tasks.
pub async fn wait_for<F: Fn() -> bool>(predicate: F, what: &str) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
