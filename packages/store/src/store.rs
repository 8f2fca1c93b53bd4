use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use tracing::debug;

use crate::entity::{commit, editor_session, file, notification, repo, token, user, user_repo};
use crate::error::StoreError;
use crate::models::{
    CommitRef, CreateSessionParams, FileRef, NewCommit, RepoRef, SessionRecord, TrackingRecord,
    UserRef,
};

/// Persistent state contract shared by both cores (C1).
///
/// Every multi-row mutation runs inside a single transaction. Record
/// misses surface as the dedicated [`StoreError`] kinds, never as plain
/// database errors.
#[async_trait]
pub trait Store: Send + Sync {
    /// Current source-host credential for a user: the newest token row.
    async fn get_user_token(&self, chat_id: &str) -> Result<String, StoreError>;

    /// Resolve user, resolve-or-insert repo and file, insert the session.
    async fn create_editor_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<SessionRecord, StoreError>;

    async fn get_session_by_token(&self, one_time_token: &str)
    -> Result<SessionRecord, StoreError>;

    async fn get_session_by_id(&self, id: i64) -> Result<SessionRecord, StoreError>;

    /// Set-once: a no-op when the session is already consumed.
    async fn mark_session_consumed(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Records the save and, when `storage_key` is non-empty, points the
    /// underlying file at it in the same transaction. Returns true when
    /// this call performed the transition; false when the session was
    /// already saved (set-once).
    async fn mark_session_saved(
        &self,
        id: i64,
        at: DateTime<Utc>,
        storage_key: &str,
    ) -> Result<bool, StoreError>;

    /// Moves `expires_at` to `at` when that is later than the current value.
    async fn mark_session_expired(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn list_expired_unsaved(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<SessionRecord>, StoreError>;

    async fn list_active_unsaved(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<SessionRecord>, StoreError>;

    async fn count_tracking(&self) -> Result<u64, StoreError>;

    async fn list_tracking(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<TrackingRecord>, StoreError>;

    /// Upserts the tracking record back to enabled; re-adding never
    /// duplicates the `(user, repo)` pair.
    async fn add_tracking(&self, chat_id: &str, repo_url: &str) -> Result<(), StoreError>;

    async fn remove_tracking(&self, chat_id: &str, repo_url: &str) -> Result<(), StoreError>;

    async fn disable_tracking(&self, id: i32) -> Result<(), StoreError>;

    async fn disable_tracking_for_user(&self, user_id: i32) -> Result<(), StoreError>;

    /// Persist unseen commits for one repo and re-point every enabled
    /// tracking record at the newest commit. Idempotent under re-delivery
    /// of the same commit list.
    async fn save_commits_and_advance_cursor(
        &self,
        commits: &[NewCommit],
    ) -> Result<(), StoreError>;
}

/// sea-orm/Postgres implementation of [`Store`].
#[derive(Clone)]
pub struct SeaStore {
    db: DatabaseConnection,
}

impl SeaStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl Store for SeaStore {
    async fn get_user_token(&self, chat_id: &str) -> Result<String, StoreError> {
        let user = user::Entity::find()
            .filter(user::Column::ChatId.eq(chat_id))
            .one(&self.db)
            .await?
            .ok_or(StoreError::UserNotFound)?;

        let token = token::Entity::find()
            .filter(token::Column::UserId.eq(user.id))
            .order_by_desc(token::Column::CreatedAt)
            .order_by_desc(token::Column::Id)
            .one(&self.db)
            .await?
            .ok_or(StoreError::TokenNotFound)?;

        Ok(token.secret)
    }

    async fn create_editor_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<SessionRecord, StoreError> {
        let one_time_token = params.one_time_token.trim().to_string();
        if one_time_token.is_empty() {
            return Err(StoreError::InvalidArgument(
                "one-time token is required".into(),
            ));
        }

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let user = user::Entity::find()
            .filter(user::Column::ChatId.eq(&params.chat_id))
            .one(&txn)
            .await?
            .ok_or(StoreError::UserNotFound)?;

        let repo = match find_repo_by_url(&txn, &params.repo_url).await? {
            Some(repo) => repo,
            None => {
                repo::ActiveModel {
                    url: Set(params.repo_url.clone()),
                    owner: Set(params.repo_owner.clone()),
                    name: Set(params.repo_name.clone()),
                    added_at: Set(now),
                    ..Default::default()
                }
                .insert(&txn)
                .await?
            }
        };

        let file = match file::Entity::find()
            .filter(file::Column::RepoId.eq(repo.id))
            .filter(file::Column::Path.eq(&params.path))
            .one(&txn)
            .await?
        {
            Some(file) => file,
            None => {
                file::ActiveModel {
                    repo_id: Set(repo.id),
                    path: Set(params.path.clone()),
                    state: Set(file::FileState::Modified),
                    storage_key: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(&txn)
                .await?
            }
        };

        let session = editor_session::ActiveModel {
            file_id: Set(file.id),
            workspace_id: Set(params.workspace_id.clone()),
            session_url: Set(params.session_url.clone()),
            one_time_token: Set(Some(one_time_token)),
            for_user: Set(Some(user.id)),
            branch: Set(params.branch.clone()),
            created_at: Set(now),
            expires_at: Set(params.expires_at),
            consumed_at: Set(None),
            saved_at: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        Ok(SessionRecord {
            id: session.id,
            workspace_id: session.workspace_id,
            session_url: session.session_url,
            branch: session.branch,
            created_at: session.created_at,
            expires_at: session.expires_at,
            consumed_at: session.consumed_at,
            saved_at: session.saved_at,
            file: FileRef {
                id: file.id,
                path: file.path,
                storage_key: file.storage_key,
            },
            repo: RepoRef {
                id: repo.id,
                url: repo.url,
                owner: repo.owner,
                name: repo.name,
            },
            user_chat_id: Some(user.chat_id),
        })
    }

    async fn get_session_by_token(
        &self,
        one_time_token: &str,
    ) -> Result<SessionRecord, StoreError> {
        let session = editor_session::Entity::find()
            .filter(editor_session::Column::OneTimeToken.eq(one_time_token))
            .one(&self.db)
            .await?
            .ok_or(StoreError::SessionNotFound)?;
        load_session_record(&self.db, session).await
    }

    async fn get_session_by_id(&self, id: i64) -> Result<SessionRecord, StoreError> {
        let session = editor_session::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(StoreError::SessionNotFound)?;
        load_session_record(&self.db, session).await
    }

    async fn mark_session_consumed(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        editor_session::Entity::update_many()
            .col_expr(editor_session::Column::ConsumedAt, Expr::value(at))
            .filter(editor_session::Column::Id.eq(id))
            .filter(editor_session::Column::ConsumedAt.is_null())
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn mark_session_saved(
        &self,
        id: i64,
        at: DateTime<Utc>,
        storage_key: &str,
    ) -> Result<bool, StoreError> {
        let txn = self.db.begin().await?;

        let session = editor_session::Entity::find_by_id(id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .ok_or(StoreError::SessionNotFound)?;

        let result = editor_session::Entity::update_many()
            .col_expr(editor_session::Column::SavedAt, Expr::value(at))
            .filter(editor_session::Column::Id.eq(id))
            .filter(editor_session::Column::SavedAt.is_null())
            .exec(&txn)
            .await?;
        let newly_saved = result.rows_affected > 0;

        let storage_key = storage_key.trim();
        if newly_saved && !storage_key.is_empty() {
            file::Entity::update_many()
                .col_expr(file::Column::StorageKey, Expr::value(storage_key))
                .col_expr(file::Column::UpdatedAt, Expr::value(at))
                .filter(file::Column::Id.eq(session.file_id))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(newly_saved)
    }

    async fn mark_session_expired(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        editor_session::Entity::update_many()
            .col_expr(editor_session::Column::ExpiresAt, Expr::value(at))
            .filter(editor_session::Column::Id.eq(id))
            .filter(
                Condition::any()
                    .add(editor_session::Column::ExpiresAt.is_null())
                    .add(editor_session::Column::ExpiresAt.lt(at)),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn list_expired_unsaved(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let mut query = editor_session::Entity::find()
            .filter(editor_session::Column::ExpiresAt.is_not_null())
            .filter(editor_session::Column::ExpiresAt.lte(now))
            .filter(editor_session::Column::SavedAt.is_null())
            .order_by_asc(editor_session::Column::ExpiresAt);
        if limit > 0 {
            query = query.limit(limit);
        }

        let sessions = query.all(&self.db).await?;
        let mut records = Vec::with_capacity(sessions.len());
        for session in sessions {
            records.push(load_session_record(&self.db, session).await?);
        }
        Ok(records)
    }

    async fn list_active_unsaved(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let mut query = editor_session::Entity::find()
            .filter(
                Condition::any()
                    .add(editor_session::Column::ExpiresAt.is_null())
                    .add(editor_session::Column::ExpiresAt.gt(now)),
            )
            .filter(editor_session::Column::SavedAt.is_null())
            .order_by_asc(editor_session::Column::CreatedAt);
        if limit > 0 {
            query = query.limit(limit);
        }

        let sessions = query.all(&self.db).await?;
        let mut records = Vec::with_capacity(sessions.len());
        for session in sessions {
            records.push(load_session_record(&self.db, session).await?);
        }
        Ok(records)
    }

    async fn count_tracking(&self) -> Result<u64, StoreError> {
        let count = notification::Entity::find()
            .filter(notification::Column::Enabled.eq(true))
            .count(&self.db)
            .await?;
        Ok(count)
    }

    async fn list_tracking(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<TrackingRecord>, StoreError> {
        let notifications = notification::Entity::find()
            .filter(notification::Column::Enabled.eq(true))
            .order_by_asc(notification::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(&self.db)
            .await?;

        let mut records = Vec::with_capacity(notifications.len());
        for row in notifications {
            let Some(owner) = user::Entity::find_by_id(row.user_id).one(&self.db).await? else {
                continue;
            };
            let Some(repo) = repo::Entity::find_by_id(row.repo_id).one(&self.db).await? else {
                continue;
            };
            let cursor_commit = match row.last_commit {
                Some(commit_id) => commit::Entity::find_by_id(commit_id)
                    .one(&self.db)
                    .await?
                    .map(|c| CommitRef {
                        id: c.id,
                        created_at: c.created_at,
                    }),
                None => None,
            };
            records.push(TrackingRecord {
                id: row.id,
                created_at: row.created_at,
                user: UserRef {
                    id: owner.id,
                    chat_id: owner.chat_id,
                },
                repo: RepoRef {
                    id: repo.id,
                    url: repo.url,
                    owner: repo.owner,
                    name: repo.name,
                },
                cursor_commit,
            });
        }
        Ok(records)
    }

    async fn add_tracking(&self, chat_id: &str, repo_url: &str) -> Result<(), StoreError> {
        if repo_url.trim().is_empty() {
            return Err(StoreError::InvalidArgument("repo url is required".into()));
        }

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let user = user::Entity::find()
            .filter(user::Column::ChatId.eq(chat_id))
            .one(&txn)
            .await?
            .ok_or(StoreError::UserNotFound)?;

        let repo = match find_repo_by_url(&txn, repo_url).await? {
            Some(repo) => repo,
            None => {
                let (owner, name) = parse_owner_name(repo_url);
                repo::ActiveModel {
                    url: Set(repo_url.to_string()),
                    owner: Set(owner),
                    name: Set(name),
                    added_at: Set(now),
                    ..Default::default()
                }
                .insert(&txn)
                .await?
            }
        };

        if user_repo::Entity::find_by_id((user.id, repo.id))
            .one(&txn)
            .await?
            .is_none()
        {
            user_repo::ActiveModel {
                user_id: Set(user.id),
                repo_id: Set(repo.id),
                added_at: Set(now),
            }
            .insert(&txn)
            .await?;
        }

        match notification::Entity::find()
            .filter(notification::Column::UserId.eq(user.id))
            .filter(notification::Column::RepoId.eq(repo.id))
            .one(&txn)
            .await?
        {
            Some(existing) => {
                notification::Entity::update_many()
                    .col_expr(notification::Column::Enabled, Expr::value(true))
                    .filter(notification::Column::Id.eq(existing.id))
                    .exec(&txn)
                    .await?;
            }
            None => {
                notification::ActiveModel {
                    user_id: Set(user.id),
                    repo_id: Set(repo.id),
                    last_commit: Set(None),
                    enabled: Set(true),
                    created_at: Set(now),
                    ..Default::default()
                }
                .insert(&txn)
                .await?;
            }
        }

        txn.commit().await?;
        Ok(())
    }

    async fn remove_tracking(&self, chat_id: &str, repo_url: &str) -> Result<(), StoreError> {
        let txn = self.db.begin().await?;

        let user = user::Entity::find()
            .filter(user::Column::ChatId.eq(chat_id))
            .one(&txn)
            .await?
            .ok_or(StoreError::UserNotFound)?;

        if let Some(repo) = find_repo_by_url(&txn, repo_url).await? {
            notification::Entity::delete_many()
                .filter(notification::Column::UserId.eq(user.id))
                .filter(notification::Column::RepoId.eq(repo.id))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(())
    }

    async fn disable_tracking(&self, id: i32) -> Result<(), StoreError> {
        notification::Entity::update_many()
            .col_expr(notification::Column::Enabled, Expr::value(false))
            .filter(notification::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn disable_tracking_for_user(&self, user_id: i32) -> Result<(), StoreError> {
        notification::Entity::update_many()
            .col_expr(notification::Column::Enabled, Expr::value(false))
            .filter(notification::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn save_commits_and_advance_cursor(
        &self,
        commits: &[NewCommit],
    ) -> Result<(), StoreError> {
        let Some(first) = commits.first() else {
            return Ok(());
        };

        let txn = self.db.begin().await?;

        let repo = find_repo_by_owner_name(&txn, &first.owner, &first.name)
            .await?
            .ok_or(StoreError::RepoNotFound)?;

        let hashes: Vec<&str> = commits
            .iter()
            .filter(|c| !c.sha.is_empty())
            .map(|c| c.sha.as_str())
            .collect();

        let existing = if hashes.is_empty() {
            Vec::new()
        } else {
            commit::Entity::find()
                .filter(commit::Column::RepoId.eq(repo.id))
                .filter(commit::Column::CommitHash.is_in(hashes.clone()))
                .all(&txn)
                .await?
        };
        let mut known: std::collections::HashSet<String> =
            existing.into_iter().map(|c| c.commit_hash).collect();

        let mut inserted = 0usize;
        for incoming in commits {
            if incoming.sha.is_empty() || known.contains(&incoming.sha) {
                continue;
            }

            let author_id = match &incoming.author_login {
                Some(login) if !login.is_empty() => user::Entity::find()
                    .filter(user::Column::Username.eq(login))
                    .one(&txn)
                    .await?
                    .map(|u| u.id),
                _ => None,
            };

            commit::ActiveModel {
                repo_id: Set(repo.id),
                branch: Set(None),
                commit_hash: Set(incoming.sha.clone()),
                author_id: Set(author_id),
                message: Set(incoming.message.clone()),
                pushing: Set(Some(false)),
                created_at: Set(incoming.committed_at),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            known.insert(incoming.sha.clone());
            inserted += 1;
        }

        let latest = commit::Entity::find()
            .filter(commit::Column::RepoId.eq(repo.id))
            .order_by_desc(commit::Column::CreatedAt)
            .order_by_desc(commit::Column::Id)
            .one(&txn)
            .await?;

        if let Some(latest) = latest {
            notification::Entity::update_many()
                .col_expr(notification::Column::LastCommit, Expr::value(latest.id))
                .filter(notification::Column::RepoId.eq(repo.id))
                .filter(notification::Column::Enabled.eq(true))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        debug!(repo_id = repo.id, inserted, "commits persisted");
        Ok(())
    }
}

async fn load_session_record<C: ConnectionTrait>(
    conn: &C,
    session: editor_session::Model,
) -> Result<SessionRecord, StoreError> {
    let file = file::Entity::find_by_id(session.file_id)
        .one(conn)
        .await?
        .ok_or(StoreError::SessionNotFound)?;
    let repo = repo::Entity::find_by_id(file.repo_id)
        .one(conn)
        .await?
        .ok_or(StoreError::SessionNotFound)?;
    let user_chat_id = match session.for_user {
        Some(user_id) => user::Entity::find_by_id(user_id)
            .one(conn)
            .await?
            .map(|u| u.chat_id),
        None => None,
    };

    Ok(SessionRecord {
        id: session.id,
        workspace_id: session.workspace_id,
        session_url: session.session_url,
        branch: session.branch,
        created_at: session.created_at,
        expires_at: session.expires_at,
        consumed_at: session.consumed_at,
        saved_at: session.saved_at,
        file: FileRef {
            id: file.id,
            path: file.path,
            storage_key: file.storage_key,
        },
        repo: RepoRef {
            id: repo.id,
            url: repo.url,
            owner: repo.owner,
            name: repo.name,
        },
        user_chat_id,
    })
}

async fn find_repo_by_url<C: ConnectionTrait>(
    conn: &C,
    url: &str,
) -> Result<Option<repo::Model>, StoreError> {
    let with_git = format!("{url}.git");
    let found = repo::Entity::find()
        .filter(
            Condition::any()
                .add(repo::Column::Url.eq(url))
                .add(repo::Column::Url.eq(with_git)),
        )
        .one(conn)
        .await?;
    Ok(found)
}

async fn find_repo_by_owner_name<C: ConnectionTrait>(
    conn: &C,
    owner: &str,
    name: &str,
) -> Result<Option<repo::Model>, StoreError> {
    let found = repo::Entity::find()
        .filter(repo::Column::Owner.eq(owner))
        .filter(repo::Column::Name.eq(name))
        .one(conn)
        .await?;
    if found.is_some() {
        return Ok(found);
    }
    find_repo_by_url(conn, &format!("https://github.com/{owner}/{name}")).await
}

/// Best-effort `owner`/`name` extraction from a repository link.
fn parse_owner_name(link: &str) -> (Option<String>, Option<String>) {
    let path = match link.split_once("://") {
        Some((_, rest)) => match rest.split_once('/') {
            Some((_host, path)) => path,
            None => return (None, None),
        },
        None => link,
    };

    let mut parts = path.trim_matches('/').split('/');
    let owner = parts.next().unwrap_or_default();
    let name = parts
        .next()
        .unwrap_or_default()
        .trim_end_matches(".git")
        .to_string();

    if owner.is_empty() || name.is_empty() {
        (None, None)
    } else {
        (Some(owner.to_string()), Some(name))
    }
}
