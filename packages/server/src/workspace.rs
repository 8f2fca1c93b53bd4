use std::time::Duration;

use async_trait::async_trait;
use common::BoxReader;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::provider::{
    CreateWorkspaceRequest, ProviderApi, ProviderError, WorkspaceAgent, WorkspaceStatus,
};

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("invalid workspace configuration: {0}")]
    Config(String),

    #[error("invalid workspace id: {0}")]
    InvalidId(String),

    #[error("workspace build failed: {0}")]
    BuildFailed(String),

    #[error("workspace did not become ready in time")]
    ReadyTimeout,

    #[error("workspace has no agents")]
    NoAgents,

    #[error("agent {0:?} not found")]
    AgentNotFound(String),

    #[error("workspace agent has no usable app url")]
    NoEditorApp,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Ephemeral workspace operations the editor core needs (C2).
#[async_trait]
pub trait WorkspaceClient: Send + Sync {
    /// Create a workspace from the bound template and wait until it runs.
    async fn create_workspace(&self, name: &str) -> Result<String, WorkspaceError>;

    /// Write a file into the workspace through the agent tunnel.
    async fn upload_file(
        &self,
        workspace_id: &str,
        path: &str,
        content: BoxReader,
        size: Option<u64>,
    ) -> Result<(), WorkspaceError>;

    /// URL of the editor app running inside the workspace.
    async fn get_editor_url(&self, workspace_id: &str) -> Result<String, WorkspaceError>;

    /// Stream a file out of the workspace.
    async fn download_file(
        &self,
        workspace_id: &str,
        path: &str,
    ) -> Result<BoxReader, WorkspaceError>;
}

/// Template binding and tunnel selection for [`ProviderWorkspaceClient`].
#[derive(Debug, Clone)]
pub struct WorkspaceSettings {
    /// Provider user workspaces are created for.
    pub user: String,
    pub template_id: Option<Uuid>,
    pub template_version_id: Option<Uuid>,
    pub template_version_preset_id: Option<Uuid>,
    /// Editor app slug or display name, matched case-insensitively.
    /// Empty means "first app with a URL".
    pub editor_app_slug: String,
    /// Agent to tunnel through, by name or id. Empty means "first agent".
    pub agent_name: String,
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            user: "me".into(),
            template_id: None,
            template_version_id: None,
            template_version_preset_id: None,
            editor_app_slug: String::new(),
            agent_name: String::new(),
            ready_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Workspace client over the provider REST API. Caches nothing: every call
/// re-resolves the workspace and its agent.
pub struct ProviderWorkspaceClient {
    api: ProviderApi,
    settings: WorkspaceSettings,
}

impl ProviderWorkspaceClient {
    pub fn new(api: ProviderApi, settings: WorkspaceSettings) -> Self {
        Self { api, settings }
    }

    async fn ensure_workspace_ready(&self, workspace_id: Uuid) -> Result<(), WorkspaceError> {
        let deadline = tokio::time::Instant::now() + self.settings.ready_timeout;
        loop {
            let workspace = self.api.workspace(workspace_id).await?;
            match workspace.latest_build.status {
                WorkspaceStatus::Running => return Ok(()),
                WorkspaceStatus::Failed | WorkspaceStatus::Canceled => {
                    return Err(WorkspaceError::BuildFailed(format!(
                        "{:?}",
                        workspace.latest_build.status
                    )));
                }
                _ => {}
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(WorkspaceError::ReadyTimeout);
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    async fn resolve_agent(&self, workspace_id: Uuid) -> Result<WorkspaceAgent, WorkspaceError> {
        let mut workspace = self.api.workspace(workspace_id).await?;

        // A stopped workspace gets a start transition and a readiness wait
        // before any tunnel is opened.
        if workspace.latest_build.transition != "start"
            && workspace.latest_build.status == WorkspaceStatus::Stopped
        {
            debug!(%workspace_id, "workspace is stopped, starting it");
            self.api.start_workspace(workspace_id).await?;
            self.ensure_workspace_ready(workspace_id).await?;
            workspace = self.api.workspace(workspace_id).await?;
        }

        let agents: Vec<WorkspaceAgent> = workspace
            .latest_build
            .resources
            .into_iter()
            .flat_map(|r| r.agents)
            .collect();

        if agents.is_empty() {
            return Err(WorkspaceError::NoAgents);
        }

        let wanted = self.settings.agent_name.as_str();
        if !wanted.is_empty() {
            return agents
                .into_iter()
                .find(|agent| agent.name == wanted || agent.id.to_string() == wanted)
                .ok_or_else(|| WorkspaceError::AgentNotFound(wanted.to_string()));
        }
        agents.into_iter().next().ok_or(WorkspaceError::NoAgents)
    }

    fn parse_workspace_id(workspace_id: &str) -> Result<Uuid, WorkspaceError> {
        Uuid::parse_str(workspace_id)
            .map_err(|_| WorkspaceError::InvalidId(workspace_id.to_string()))
    }
}

#[async_trait]
impl WorkspaceClient for ProviderWorkspaceClient {
    async fn create_workspace(&self, name: &str) -> Result<String, WorkspaceError> {
        let mut name = sanitize_workspace_name(name);
        if name.is_empty() {
            name = "editor".into();
        }
        if self.settings.template_id.is_none() && self.settings.template_version_id.is_none() {
            return Err(WorkspaceError::Config(
                "a template id or template version id must be configured".into(),
            ));
        }

        // The version binding wins when both are present.
        let (template_id, template_version_id) = match self.settings.template_version_id {
            Some(version_id) => (None, Some(version_id)),
            None => (self.settings.template_id, None),
        };
        let request = CreateWorkspaceRequest {
            name,
            template_id,
            template_version_id,
            template_version_preset_id: self.settings.template_version_preset_id,
        };

        let workspace = self.api.create_workspace(&self.settings.user, &request).await?;
        self.ensure_workspace_ready(workspace.id).await?;
        Ok(workspace.id.to_string())
    }

    async fn upload_file(
        &self,
        workspace_id: &str,
        path: &str,
        content: BoxReader,
        _size: Option<u64>,
    ) -> Result<(), WorkspaceError> {
        let workspace_id = Self::parse_workspace_id(workspace_id)?;
        let agent = self.resolve_agent(workspace_id).await?;
        self.api.upload_agent_file(agent.id, path, content).await?;
        Ok(())
    }

    async fn get_editor_url(&self, workspace_id: &str) -> Result<String, WorkspaceError> {
        let workspace_id = Self::parse_workspace_id(workspace_id)?;
        let agent = self.resolve_agent(workspace_id).await?;
        if agent.apps.is_empty() {
            return Err(WorkspaceError::NoEditorApp);
        }

        let slug = self.settings.editor_app_slug.as_str();
        for app in &agent.apps {
            if app.url.is_empty() {
                continue;
            }
            if !slug.is_empty()
                && !app.slug.eq_ignore_ascii_case(slug)
                && !app.display_name.eq_ignore_ascii_case(slug)
            {
                continue;
            }
            return Ok(app.url.clone());
        }

        // Fall back to the first app when no slug matched.
        let first = &agent.apps[0];
        if first.url.is_empty() {
            return Err(WorkspaceError::NoEditorApp);
        }
        Ok(first.url.clone())
    }

    async fn download_file(
        &self,
        workspace_id: &str,
        path: &str,
    ) -> Result<BoxReader, WorkspaceError> {
        let workspace_id = Self::parse_workspace_id(workspace_id)?;
        let agent = self.resolve_agent(workspace_id).await?;
        let reader = self.api.download_agent_file(agent.id, path).await?;
        Ok(reader)
    }
}

/// Lowercase, keep `[a-z0-9-]`, map `_` and space to `-`, trim dashes,
/// truncate to 32.
pub fn sanitize_workspace_name(name: &str) -> String {
    let mapped: String = name
        .trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            'a'..='z' | '0'..='9' | '-' => Some(c),
            '_' | ' ' => Some('-'),
            _ => None,
        })
        .collect();
    mapped.trim_matches('-').chars().take(32).collect()
}
