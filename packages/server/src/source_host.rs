use std::collections::HashMap;
use std::io;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::BoxReader;
use futures::TryStreamExt;
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use thiserror::Error;
use tokio_util::io::StreamReader;
use url::Url;

const API_BASE: &str = "https://api.github.com";
const RAW_BASE: &str = "https://raw.githubusercontent.com";
const USER_AGENT: &str = "repo-tracker";

#[derive(Debug, Error)]
pub enum SourceHostError {
    /// The source host rejected the user's credential.
    #[error("invalid token")]
    InvalidToken,

    #[error("invalid repository link: {0}")]
    InvalidLink(String),

    #[error("source host request failed: {0}")]
    Http(String),
}

/// Commit snapshot as the source host reports it.
#[derive(Debug, Clone)]
pub struct RepoCommit {
    pub owner: String,
    pub name: String,
    pub sha: String,
    pub message: Option<String>,
    pub author_login: Option<String>,
    pub html_url: Option<String>,
    pub api_url: Option<String>,
    pub committed_at: DateTime<Utc>,
}

impl RepoCommit {
    /// Best link for the commit: the web URL, else the API one.
    pub fn link(&self) -> &str {
        self.html_url
            .as_deref()
            .or(self.api_url.as_deref())
            .unwrap_or_default()
    }
}

/// Source-hosting API, authenticated per user (C4).
#[async_trait]
pub trait SourceHost: Send + Sync {
    async fn repo_exists(&self, token: &str, url: &str) -> Result<bool, SourceHostError>;

    /// Commits with committer date at or after `since`.
    async fn commits_since(
        &self,
        token: &str,
        url: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<RepoCommit>, SourceHostError>;

    /// Raw file contents from a branch, size-limited by the caller.
    async fn download_file(
        &self,
        token: &str,
        owner: &str,
        name: &str,
        branch: &str,
        path: &str,
    ) -> Result<(BoxReader, Option<u64>), SourceHostError>;
}

/// GitHub client with one cached HTTP client per credential. Additions
/// take the write lock, hits the read lock; entries are never evicted.
pub struct GithubClient {
    api_base: String,
    raw_base: String,
    clients: RwLock<HashMap<String, Client>>,
}

impl Default for GithubClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GithubClient {
    pub fn new() -> Self {
        Self::with_bases(API_BASE, RAW_BASE)
    }

    /// Test seam: point the client at local fakes.
    pub fn with_bases(api_base: impl Into<String>, raw_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            raw_base: raw_base.into(),
            clients: RwLock::new(HashMap::new()),
        }
    }

    fn client_for(&self, token: &str) -> Result<Client, SourceHostError> {
        {
            let clients = self.clients.read().expect("client cache lock poisoned");
            if let Some(client) = clients.get(token) {
                return Ok(client.clone());
            }
        }

        let mut headers = header::HeaderMap::new();
        if !token.is_empty() {
            let value = header::HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| SourceHostError::InvalidToken)?;
            headers.insert(header::AUTHORIZATION, value);
        }
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| SourceHostError::Http(e.to_string()))?;

        let mut clients = self.clients.write().expect("client cache lock poisoned");
        clients.insert(token.to_string(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl SourceHost for GithubClient {
    async fn repo_exists(&self, token: &str, url: &str) -> Result<bool, SourceHostError> {
        let (owner, name) = parse_owner_repo(url)?;
        let client = self.client_for(token)?;

        let resp = client
            .get(format!("{}/repos/{owner}/{name}", self.api_base))
            .send()
            .await
            .map_err(|e| SourceHostError::Http(e.to_string()))?;

        match resp.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SourceHostError::InvalidToken),
            status => Err(SourceHostError::Http(format!(
                "repository probe returned {status}"
            ))),
        }
    }

    async fn commits_since(
        &self,
        token: &str,
        url: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<RepoCommit>, SourceHostError> {
        let (owner, name) = parse_owner_repo(url)?;
        let client = self.client_for(token)?;

        let resp = client
            .get(format!("{}/repos/{owner}/{name}/commits", self.api_base))
            .query(&[
                ("since", since.to_rfc3339()),
                ("per_page", "100".to_string()),
            ])
            .send()
            .await
            .map_err(|e| SourceHostError::Http(e.to_string()))?;

        match resp.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(SourceHostError::InvalidToken);
            }
            status => {
                return Err(SourceHostError::Http(format!(
                    "commit listing returned {status}"
                )));
            }
        }

        let commits: Vec<ApiCommit> = resp
            .json()
            .await
            .map_err(|e| SourceHostError::Http(e.to_string()))?;

        Ok(commits
            .into_iter()
            .map(|c| c.into_repo_commit(&owner, &name))
            .collect())
    }

    async fn download_file(
        &self,
        token: &str,
        owner: &str,
        name: &str,
        branch: &str,
        path: &str,
    ) -> Result<(BoxReader, Option<u64>), SourceHostError> {
        let client = self.client_for(token)?;
        let raw_url = format!(
            "{}/{owner}/{name}/{branch}/{}",
            self.raw_base,
            path.trim_start_matches('/')
        );

        let resp = client
            .get(&raw_url)
            .send()
            .await
            .map_err(|e| SourceHostError::Http(e.to_string()))?;

        match resp.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(SourceHostError::InvalidToken);
            }
            status => {
                return Err(SourceHostError::Http(format!(
                    "file download returned {status}"
                )));
            }
        }

        let size = resp.content_length();
        let stream = resp.bytes_stream().map_err(io::Error::other);
        let reader: BoxReader = Box::new(StreamReader::new(stream));
        Ok((reader, size))
    }
}

/// `owner/name` from a repository link's path, `.git` stripped.
pub fn parse_owner_repo(link: &str) -> Result<(String, String), SourceHostError> {
    let parsed =
        Url::parse(link).map_err(|_| SourceHostError::InvalidLink(link.to_string()))?;
    let mut segments = parsed.path().trim_matches('/').split('/');

    let owner = segments.next().unwrap_or_default();
    let name = segments
        .next()
        .unwrap_or_default()
        .trim_end_matches(".git");

    if owner.is_empty() || name.is_empty() {
        return Err(SourceHostError::InvalidLink(link.to_string()));
    }
    Ok((owner.to_string(), name.to_string()))
}

#[derive(Debug, Deserialize)]
struct ApiCommit {
    sha: String,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    commit: ApiCommitDetail,
    #[serde(default)]
    author: Option<ApiUser>,
}

#[derive(Debug, Deserialize)]
struct ApiCommitDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    committer: Option<ApiSignature>,
    #[serde(default)]
    author: Option<ApiSignature>,
}

#[derive(Debug, Deserialize)]
struct ApiSignature {
    #[serde(default)]
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    login: String,
}

impl ApiCommit {
    fn into_repo_commit(self, owner: &str, name: &str) -> RepoCommit {
        let committed_at = self
            .commit
            .committer
            .as_ref()
            .and_then(|s| s.date)
            .or_else(|| self.commit.author.as_ref().and_then(|s| s.date))
            .unwrap_or_else(Utc::now);

        RepoCommit {
            owner: owner.to_string(),
            name: name.to_string(),
            sha: self.sha,
            message: self.commit.message,
            author_login: self.author.map(|a| a.login),
            html_url: self.html_url,
            api_url: self.url,
            committed_at,
        }
    }
}
