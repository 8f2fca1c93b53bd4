use std::io;
use std::sync::RwLock;

use common::BoxReader;
use futures::TryStreamExt;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::io::{ReaderStream, StreamReader};
use url::Url;
use uuid::Uuid;

/// Header the provider expects its session credential on.
const SESSION_TOKEN_HEADER: &str = "Coder-Session-Token";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid provider url: {0}")]
    InvalidUrl(String),

    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Thin typed client over the workspace provider's REST API. Holds the
/// session credential behind a lock so bootstrap can swap it in place.
pub struct ProviderApi {
    http: Client,
    base_url: Url,
    session_token: RwLock<String>,
}

impl ProviderApi {
    pub fn new(base_url: &str) -> Result<Self, ProviderError> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|e| ProviderError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            http: Client::new(),
            base_url,
            session_token: RwLock::new(String::new()),
        })
    }

    pub fn set_session_token(&self, token: &str) {
        let mut guard = self
            .session_token
            .write()
            .expect("session token lock poisoned");
        *guard = token.to_string();
    }

    pub fn session_token(&self) -> String {
        self.session_token
            .read()
            .expect("session token lock poisoned")
            .clone()
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderError::InvalidUrl(e.to_string()))
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ProviderError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        let resp = self
            .http
            .get(self.endpoint(path)?)
            .header(SESSION_TOKEN_HEADER, self.session_token())
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        let resp = self
            .http
            .post(self.endpoint(path)?)
            .header(SESSION_TOKEN_HEADER, self.session_token())
            .json(body)
            .send()
            .await?;
        Self::decode(resp).await
    }

    /// Readiness probe: whether any account exists yet. Also answers the
    /// "is the provider up" question during bootstrap.
    pub async fn has_first_user(&self) -> Result<bool, ProviderError> {
        let resp = self
            .http
            .get(self.endpoint("/api/v2/users/first")?)
            .send()
            .await?;
        match resp.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(ProviderError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    pub async fn create_first_user(
        &self,
        req: &CreateFirstUserRequest,
    ) -> Result<CreateFirstUserResponse, ProviderError> {
        let resp = self
            .http
            .post(self.endpoint("/api/v2/users/first")?)
            .json(req)
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn login_with_password(
        &self,
        req: &LoginRequest,
    ) -> Result<LoginResponse, ProviderError> {
        let resp = self
            .http
            .post(self.endpoint("/api/v2/users/login")?)
            .json(req)
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn me(&self) -> Result<ProviderUser, ProviderError> {
        self.get_json("/api/v2/users/me").await
    }

    pub async fn organizations(&self) -> Result<Vec<Organization>, ProviderError> {
        self.get_json("/api/v2/users/me/organizations").await
    }

    pub async fn create_token(
        &self,
        user_id: Uuid,
        req: &CreateTokenRequest,
    ) -> Result<CreateTokenResponse, ProviderError> {
        self.post_json(&format!("/api/v2/users/{user_id}/keys/tokens"), req)
            .await
    }

    pub async fn templates_by_name(
        &self,
        org_id: Uuid,
        exact_name: &str,
    ) -> Result<Vec<Template>, ProviderError> {
        let resp = self
            .http
            .get(self.endpoint(&format!("/api/v2/organizations/{org_id}/templates"))?)
            .header(SESSION_TOKEN_HEADER, self.session_token())
            .query(&[("exact_name", exact_name)])
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn template(&self, id: Uuid) -> Result<Template, ProviderError> {
        self.get_json(&format!("/api/v2/templates/{id}")).await
    }

    pub async fn template_version(&self, id: Uuid) -> Result<TemplateVersion, ProviderError> {
        self.get_json(&format!("/api/v2/templateversions/{id}"))
            .await
    }

    pub async fn template_version_presets(
        &self,
        version_id: Uuid,
    ) -> Result<Vec<TemplateVersionPreset>, ProviderError> {
        self.get_json(&format!("/api/v2/templateversions/{version_id}/presets"))
            .await
    }

    pub async fn starter_templates(&self) -> Result<Vec<StarterTemplate>, ProviderError> {
        self.get_json("/api/v2/templates/examples").await
    }

    pub async fn create_template_version(
        &self,
        org_id: Uuid,
        req: &CreateTemplateVersionRequest,
    ) -> Result<TemplateVersion, ProviderError> {
        self.post_json(&format!("/api/v2/organizations/{org_id}/templateversions"), req)
            .await
    }

    pub async fn create_template(
        &self,
        org_id: Uuid,
        req: &CreateTemplateRequest,
    ) -> Result<Template, ProviderError> {
        self.post_json(&format!("/api/v2/organizations/{org_id}/templates"), req)
            .await
    }

    pub async fn create_workspace(
        &self,
        user: &str,
        req: &CreateWorkspaceRequest,
    ) -> Result<Workspace, ProviderError> {
        self.post_json(&format!("/api/v2/users/{user}/workspaces"), req)
            .await
    }

    pub async fn workspace(&self, id: Uuid) -> Result<Workspace, ProviderError> {
        self.get_json(&format!("/api/v2/workspaces/{id}")).await
    }

    pub async fn start_workspace(&self, id: Uuid) -> Result<(), ProviderError> {
        let _: serde_json::Value = self
            .post_json(
                &format!("/api/v2/workspaces/{id}/builds"),
                &serde_json::json!({ "transition": "start" }),
            )
            .await?;
        Ok(())
    }

    /// Write a file into the running workspace through the agent tunnel.
    pub async fn upload_agent_file(
        &self,
        agent_id: Uuid,
        path: &str,
        content: BoxReader,
    ) -> Result<(), ProviderError> {
        let resp = self
            .http
            .post(self.endpoint(&format!("/api/v2/workspaceagents/{agent_id}/files"))?)
            .header(SESSION_TOKEN_HEADER, self.session_token())
            .query(&[("path", path)])
            .body(reqwest::Body::wrap_stream(ReaderStream::new(content)))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    /// Stream a file out of the running workspace through the agent tunnel.
    pub async fn download_agent_file(
        &self,
        agent_id: Uuid,
        path: &str,
    ) -> Result<BoxReader, ProviderError> {
        let resp = self
            .http
            .get(self.endpoint(&format!("/api/v2/workspaceagents/{agent_id}/files"))?)
            .header(SESSION_TOKEN_HEADER, self.session_token())
            .query(&[("path", path)])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let stream = resp.bytes_stream().map_err(io::Error::other);
        Ok(Box::new(StreamReader::new(stream)))
    }
}

#[derive(Debug, Deserialize)]
pub struct ProviderUser {
    pub id: Uuid,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct Organization {
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CreateFirstUserRequest {
    pub email: String,
    pub username: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateFirstUserResponse {
    pub user_id: Uuid,
    pub organization_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub session_token: String,
}

#[derive(Debug, Serialize)]
pub struct CreateTokenRequest {
    pub token_name: String,
    pub lifetime_seconds: u64,
    pub scope: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTokenResponse {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub name: String,
    pub active_version_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct TemplateVersion {
    pub id: Uuid,
    #[serde(default)]
    pub template_id: Option<Uuid>,
    pub job: ProvisionerJob,
}

#[derive(Debug, Deserialize)]
pub struct ProvisionerJob {
    pub id: Uuid,
    pub status: JobStatus,
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Canceling,
    Canceled,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct TemplateVersionPreset {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct StarterTemplate {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CreateTemplateVersionRequest {
    pub name: String,
    pub message: String,
    pub storage_method: String,
    pub example_id: String,
    pub provisioner: String,
}

#[derive(Debug, Serialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    pub display_name: String,
    pub template_version_id: Uuid,
}

#[derive(Debug, Default, Serialize)]
pub struct CreateWorkspaceRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_version_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_version_preset_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub latest_build: WorkspaceBuild,
}

#[derive(Debug, Deserialize)]
pub struct WorkspaceBuild {
    pub status: WorkspaceStatus,
    #[serde(default)]
    pub transition: String,
    #[serde(default)]
    pub resources: Vec<WorkspaceResource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceStatus {
    Pending,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
    Canceling,
    Canceled,
    Deleting,
    Deleted,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct WorkspaceResource {
    #[serde(default)]
    pub agents: Vec<WorkspaceAgent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceAgent {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub apps: Vec<WorkspaceApp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceApp {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub url: String,
}
