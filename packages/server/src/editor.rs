use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use common::storage::LimitedReader;
use common::{BlobStore, BoxReader};
use rand::RngCore;
use store::{CreateSessionParams, SessionRecord, Store};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use url::Url;

use crate::error::ServiceError;
use crate::notify::FileEditNotifier;
use crate::source_host::SourceHost;
use crate::workspace::WorkspaceClient;

/// Sessions saved concurrently within one scheduler batch.
const SAVE_CONCURRENCY: usize = 4;

/// One-shot URL and direct-mode settings for the editor core.
#[derive(Debug, Clone)]
pub struct EditorSettings {
    /// Redirect-gateway base. Unset switches to direct mode.
    pub proxy_base_url: Option<String>,
    /// Provider credential stamped onto direct-mode editor URLs.
    pub provider_access_token: String,
    /// Query parameter the credential rides on.
    pub token_query_param: String,
    /// Ceiling for file bytes staged from the source host.
    pub max_file_size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CreateSessionRequest {
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub path: Option<String>,
    pub chat_id: String,
    pub ttl_seconds: i64,
    pub s3_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateSessionResponse {
    pub one_time_url: String,
    pub session_id: i64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SaveSessionResponse {
    pub storage_key: String,
    pub saved_at: DateTime<Utc>,
}

/// Editor-session lifecycle manager (C7): creation, one-shot URLs,
/// detached saves, and the periodic expired/active sweeps.
#[derive(Clone)]
pub struct EditorService {
    store: Arc<dyn Store>,
    workspace: Arc<dyn WorkspaceClient>,
    blobs: Arc<dyn BlobStore>,
    source_host: Arc<dyn SourceHost>,
    notifier: Arc<dyn FileEditNotifier>,
    settings: EditorSettings,
}

impl EditorService {
    pub fn new(
        store: Arc<dyn Store>,
        workspace: Arc<dyn WorkspaceClient>,
        blobs: Arc<dyn BlobStore>,
        source_host: Arc<dyn SourceHost>,
        notifier: Arc<dyn FileEditNotifier>,
        mut settings: EditorSettings,
    ) -> Self {
        settings.proxy_base_url = settings
            .proxy_base_url
            .map(|base| base.trim_end_matches('/').to_string())
            .filter(|base| !base.is_empty());
        Self {
            store,
            workspace,
            blobs,
            source_host,
            notifier,
            settings,
        }
    }

    pub async fn create_editor_session(
        &self,
        req: CreateSessionRequest,
    ) -> Result<CreateSessionResponse, ServiceError> {
        let source = resolve_source(&req)?;

        let (reader, size, path, branch, owner, name, repo_url, workspace_name) = match source {
            SourceKind::Repo {
                owner,
                name,
                url,
                branch,
                path,
            } => {
                let token = self.store.get_user_token(&req.chat_id).await?;
                if !self.source_host.repo_exists(&token, &url).await? {
                    return Err(ServiceError::RepoNotFound);
                }
                let (reader, size) = self
                    .source_host
                    .download_file(&token, &owner, &name, &branch, &path)
                    .await?;
                let (reader, size) = self.limit_stream(reader, size)?;
                let workspace_name = format!("edit-{owner}-{name}");
                (
                    reader,
                    size,
                    path,
                    Some(branch),
                    Some(owner),
                    Some(name),
                    url,
                    workspace_name,
                )
            }
            SourceKind::Blob {
                key,
                path,
                basename,
            } => {
                let (reader, size) = self.blobs.download(&key).await?;
                let workspace_name = format!("edit-s3-{basename}");
                (
                    reader,
                    size,
                    path,
                    None,
                    None,
                    None,
                    format!("s3://{key}"),
                    workspace_name,
                )
            }
        };

        let workspace_id = self.workspace.create_workspace(&workspace_name).await?;
        self.workspace
            .upload_file(&workspace_id, &path, reader, size)
            .await?;
        let editor_url = self.workspace.get_editor_url(&workspace_id).await?;

        let one_time_token = generate_one_time_token();
        let expires_at = Utc::now() + Duration::seconds(req.ttl_seconds);

        let record = self
            .store
            .create_editor_session(CreateSessionParams {
                chat_id: req.chat_id.trim().to_string(),
                repo_url,
                repo_owner: owner,
                repo_name: name,
                branch,
                path,
                workspace_id,
                session_url: editor_url.clone(),
                one_time_token: one_time_token.clone(),
                expires_at: Some(expires_at),
            })
            .await?;

        let one_time_url = match &self.settings.proxy_base_url {
            Some(base) => format!("{base}/edit/{one_time_token}"),
            None => self.direct_editor_url(&editor_url, record.id).await?,
        };

        info!(
            session_id = record.id,
            workspace_id = %record.workspace_id,
            "editor session created"
        );

        Ok(CreateSessionResponse {
            one_time_url,
            session_id: record.id,
            expires_at,
        })
    }

    /// Idempotent save. An already-saved session answers synchronously;
    /// otherwise a detached job does the work and the reply carries a
    /// provisional `saved_at` equal to the session's creation time.
    pub async fn save_editor_session(
        &self,
        session_id: i64,
    ) -> Result<SaveSessionResponse, ServiceError> {
        let session = self.store.get_session_by_id(session_id).await?;
        let storage_key = storage_key_for(&session);

        if let Some(saved_at) = session.saved_at {
            return Ok(SaveSessionResponse {
                storage_key,
                saved_at,
            });
        }

        let created_at = session.created_at;
        let service = self.clone();
        let key = storage_key.clone();
        // Root-scoped: the reply returns before the save lands, and the
        // caller's cancellation must not abort it.
        tokio::spawn(async move {
            let session_id = session.id;
            if let Err(e) = service.run_save(session, key, true).await {
                error!(session_id, error = %e, "detached session save failed");
            }
        });

        Ok(SaveSessionResponse {
            storage_key,
            saved_at: created_at,
        })
    }

    /// Drain sessions whose deadline passed without a save.
    pub async fn handle_expired_sessions(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<(), ServiceError> {
        let sessions = self.store.list_expired_unsaved(now, limit).await?;
        self.save_batch(sessions, true).await;
        Ok(())
    }

    /// Mid-flight snapshots of still-active sessions; no forced expiry.
    pub async fn handle_active_sessions(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<(), ServiceError> {
        let sessions = self.store.list_active_unsaved(now, limit).await?;
        self.save_batch(sessions, false).await;
        Ok(())
    }

    async fn save_batch(&self, sessions: Vec<SessionRecord>, force_expire: bool) {
        let permits = Arc::new(Semaphore::new(SAVE_CONCURRENCY));
        let mut tasks = JoinSet::new();

        for session in sessions {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let service = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let session_id = session.id;
                let key = storage_key_for(&session);
                if let Err(e) = service.run_save(session, key, force_expire).await {
                    warn!(session_id, error = %e, "session save failed");
                }
            });
        }

        while tasks.join_next().await.is_some() {}
    }

    /// Download from the workspace, persist to the blob store, mark saved,
    /// optionally force expiry, publish the file-edited notification.
    async fn run_save(
        &self,
        session: SessionRecord,
        storage_key: String,
        force_expire: bool,
    ) -> Result<(), ServiceError> {
        let reader = self
            .workspace
            .download_file(&session.workspace_id, &session.file.path)
            .await?;
        self.blobs.save(&storage_key, reader, None).await?;

        let now = Utc::now();
        let newly_saved = self
            .store
            .mark_session_saved(session.id, now, &storage_key)
            .await?;
        if !newly_saved {
            info!(session_id = session.id, "session already saved, skipping");
            return Ok(());
        }

        if force_expire
            && let Err(e) = self.store.mark_session_expired(session.id, now).await
        {
            warn!(session_id = session.id, error = %e, "failed to mark session expired");
        }

        if let Err(e) = self.notifier.notify_file_edited(session.file.id, now).await {
            warn!(session_id = session.id, error = %e, "file-edited notification failed");
        }

        info!(session_id = session.id, storage_key, "session saved");
        Ok(())
    }

    async fn direct_editor_url(
        &self,
        editor_url: &str,
        session_id: i64,
    ) -> Result<String, ServiceError> {
        if self.settings.provider_access_token.is_empty() || editor_url.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "direct mode requires a provider access token and an editor url".into(),
            ));
        }

        let mut url = Url::parse(editor_url)
            .map_err(|e| ServiceError::InvalidRequest(format!("invalid editor url: {e}")))?;
        set_query_param(
            &mut url,
            &self.settings.token_query_param,
            &self.settings.provider_access_token,
        );

        // No gateway step will consume the session, so do it here.
        if let Err(e) = self
            .store
            .mark_session_consumed(session_id, Utc::now())
            .await
        {
            warn!(session_id, error = %e, "failed to mark direct session consumed");
        }

        Ok(url.to_string())
    }

    fn limit_stream(
        &self,
        reader: BoxReader,
        size: Option<u64>,
    ) -> Result<(BoxReader, Option<u64>), ServiceError> {
        match size {
            Some(size) if size > self.settings.max_file_size => {
                Err(ServiceError::SizeLimitExceeded)
            }
            Some(size) => Ok((reader, Some(size))),
            None => Ok((
                Box::new(LimitedReader::new(reader, self.settings.max_file_size)),
                None,
            )),
        }
    }
}

enum SourceKind {
    Repo {
        owner: String,
        name: String,
        url: String,
        branch: String,
        path: String,
    },
    Blob {
        key: String,
        path: String,
        basename: String,
    },
}

/// Validate the request and pick the file source. Exactly one of the repo
/// and blob variants must be present.
fn resolve_source(req: &CreateSessionRequest) -> Result<SourceKind, ServiceError> {
    if req.chat_id.trim().is_empty() {
        return Err(ServiceError::InvalidRequest("chat_id is required".into()));
    }
    if req.ttl_seconds <= 0 {
        return Err(ServiceError::InvalidRequest(
            "ttl_seconds must be positive".into(),
        ));
    }

    let repo = req.repo.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let blob_key = req
        .s3_key
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let path = req.path.as_deref().map(str::trim).filter(|s| !s.is_empty());

    match (repo, blob_key) {
        (Some(repo), None) => {
            let path = path
                .ok_or_else(|| ServiceError::InvalidRequest("path is required".into()))?;
            let (owner, name, url) = parse_repo(repo)?;
            let branch = req
                .branch
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or("main");
            Ok(SourceKind::Repo {
                owner,
                name,
                url,
                branch: branch.to_string(),
                path: path.to_string(),
            })
        }
        (None, Some(key)) => {
            let basename = key
                .rsplit('/')
                .next()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    ServiceError::InvalidRequest("s3_key has no usable basename".into())
                })?;
            Ok(SourceKind::Blob {
                key: key.to_string(),
                path: path.unwrap_or(basename).to_string(),
                basename: basename.to_string(),
            })
        }
        _ => Err(ServiceError::InvalidRequest(
            "exactly one of repo and s3_key is required".into(),
        )),
    }
}

/// `owner`, `name`, canonical URL from `owner/name` or a full link.
fn parse_repo(input: &str) -> Result<(String, String, String), ServiceError> {
    if input.starts_with("http://") || input.starts_with("https://") {
        let parsed = Url::parse(input)
            .map_err(|e| ServiceError::InvalidRequest(format!("invalid repo url: {e}")))?;
        let mut segments = parsed.path().trim_matches('/').split('/');
        let owner = segments.next().unwrap_or_default();
        let name = segments
            .next()
            .unwrap_or_default()
            .trim_end_matches(".git");
        if owner.is_empty() || name.is_empty() {
            return Err(ServiceError::InvalidRequest("invalid repo url".into()));
        }
        let url = format!(
            "{}://{}/{owner}/{name}",
            parsed.scheme(),
            parsed.host_str().unwrap_or_default()
        );
        return Ok((owner.to_string(), name.to_string(), url));
    }

    let parts: Vec<&str> = input.trim_matches('/').split('/').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ServiceError::InvalidRequest(
            "repo must be in owner/name or url form".into(),
        ));
    }
    let name = parts[1].trim_end_matches(".git");
    Ok((
        parts[0].to_string(),
        name.to_string(),
        format!("https://github.com/{}/{name}", parts[0]),
    ))
}

/// 32 random bytes, URL-safe base64 without padding.
fn generate_one_time_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Key the session's edit lands on: the file's existing key when present
/// (in-place overwrite), else `edited/<owner>/<name>/<session_id>/<path>`.
pub fn storage_key_for(session: &SessionRecord) -> String {
    if let Some(key) = session.file.storage_key.as_deref()
        && !key.is_empty()
    {
        return key.to_string();
    }

    let owner = session.repo.owner.as_deref().unwrap_or("").trim_matches('/');
    let name = session.repo.name.as_deref().unwrap_or("").trim_matches('/');
    let repo_segment = match (owner.is_empty(), name.is_empty()) {
        (false, false) => format!("{owner}/{name}"),
        (false, true) => owner.to_string(),
        (true, false) => name.to_string(),
        (true, true) => "unknown-repo".to_string(),
    };

    format!(
        "edited/{repo_segment}/{}/{}",
        session.id,
        session.file.path.trim_start_matches('/')
    )
}

/// Add or overwrite one query parameter, preserving the rest.
fn set_query_param(url: &mut Url, param: &str, value: &str) {
    let existing: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != param)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut pairs = url.query_pairs_mut();
    pairs.clear();
    for (k, v) in &existing {
        pairs.append_pair(k, v);
    }
    pairs.append_pair(param, value);
    drop(pairs);
}
