use std::time::Duration;

use anyhow::{Context, bail};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{BootstrapConfig, ProviderConfig};
use crate::provider::{
    CreateFirstUserRequest, CreateTemplateRequest, CreateTemplateVersionRequest,
    CreateTokenRequest, JobStatus, LoginRequest, ProviderApi, Template,
};

/// Credentials and template binding the workspace client starts from.
#[derive(Debug, Clone)]
pub struct BootstrapResult {
    pub access_token: String,
    pub template_id: Option<Uuid>,
    pub template_version_id: Option<Uuid>,
    pub template_version_preset_id: Option<Uuid>,
}

/// Ensure the provider has an account, a usable credential, and a workspace
/// template, creating whatever is missing (C6). Runs once at process start,
/// before any provisioning.
pub async fn ensure(
    api: &ProviderApi,
    provider: &ProviderConfig,
    cfg: &BootstrapConfig,
    require_template: bool,
) -> anyhow::Result<BootstrapResult> {
    let wait_timeout = Duration::from_secs(cfg.wait_timeout_secs.max(1));
    let wait_interval = Duration::from_secs(cfg.wait_interval_secs.max(1));

    wait_for_provider(api, wait_timeout, wait_interval)
        .await
        .context("workspace provider did not become ready")?;

    let (access_token, mut org_id) = ensure_access_token(api, provider, cfg).await?;
    api.set_session_token(&access_token);

    let mut result = BootstrapResult {
        access_token,
        template_id: parse_uuid(provider.template_id.as_deref()),
        template_version_id: parse_uuid(provider.template_version_id.as_deref()),
        template_version_preset_id: parse_uuid(provider.template_version_preset_id.as_deref()),
    };

    if require_template {
        if org_id.is_none() {
            let orgs = api.organizations().await.context("listing organizations")?;
            org_id = orgs.first().map(|o| o.id);
        }
        let Some(org_id) = org_id else {
            bail!("provider has no organizations");
        };

        resolve_template(api, cfg, org_id, wait_timeout, wait_interval, &mut result)
            .await
            .context("resolving workspace template")?;
    }

    Ok(result)
}

async fn wait_for_provider(
    api: &ProviderApi,
    timeout: Duration,
    interval: Duration,
) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match api.has_first_user().await {
            Ok(_) => return Ok(()),
            Err(e) => {
                if tokio::time::Instant::now() >= deadline {
                    bail!("provider not ready: {e}");
                }
                tokio::time::sleep(interval).await;
            }
        }
    }
}

/// Reuse a working configured credential, or log in (creating the first
/// admin account when none exists) and mint a long-lived API credential,
/// falling back to the session credential when minting fails.
async fn ensure_access_token(
    api: &ProviderApi,
    provider: &ProviderConfig,
    cfg: &BootstrapConfig,
) -> anyhow::Result<(String, Option<Uuid>)> {
    let configured = provider.access_token.trim();
    if !configured.is_empty() && !is_placeholder_token(configured) {
        api.set_session_token(configured);
        if api.me().await.is_ok() {
            return Ok((configured.to_string(), None));
        }
    }

    let has_user = api
        .has_first_user()
        .await
        .context("probing for first user")?;

    let mut org_id = None;
    if !has_user {
        let created = api
            .create_first_user(&CreateFirstUserRequest {
                email: cfg.email.clone(),
                username: cfg.username.clone(),
                name: cfg.full_name.clone(),
                password: cfg.password.clone(),
            })
            .await
            .context("creating first provider user")?;
        org_id = Some(created.organization_id);
        info!(username = %cfg.username, "provider first user created");
    }

    let login = api
        .login_with_password(&LoginRequest {
            email: cfg.email.clone(),
            password: cfg.password.clone(),
        })
        .await
        .context("provider login failed")?;
    api.set_session_token(&login.session_token);

    let me = api.me().await.context("loading provider identity")?;
    if org_id.is_none() {
        let orgs = api.organizations().await.context("listing organizations")?;
        if orgs.is_empty() {
            bail!("provider has no organizations");
        }
        org_id = Some(orgs[0].id);
    }

    match api
        .create_token(
            me.id,
            &CreateTokenRequest {
                token_name: cfg.token_name.clone(),
                lifetime_seconds: cfg.token_lifetime_secs,
                scope: "all".into(),
            },
        )
        .await
    {
        Ok(minted) => Ok((minted.key, org_id)),
        Err(e) => {
            warn!(error = %e, "failed to mint provider api token, using session token");
            Ok((login.session_token, org_id))
        }
    }
}

async fn resolve_template(
    api: &ProviderApi,
    cfg: &BootstrapConfig,
    org_id: Uuid,
    wait_timeout: Duration,
    wait_interval: Duration,
    result: &mut BootstrapResult,
) -> anyhow::Result<()> {
    if result.template_version_id.is_none()
        && let Some(template_id) = result.template_id
    {
        let template = api.template(template_id).await.context("loading template")?;
        result.template_version_id = Some(template.active_version_id);
    }
    if result.template_id.is_none()
        && let Some(version_id) = result.template_version_id
    {
        let version = api
            .template_version(version_id)
            .await
            .context("loading template version")?;
        result.template_id = version.template_id;
    }

    if result.template_id.is_none() && result.template_version_id.is_none() {
        match find_template_by_name(api, org_id, &cfg.template_name).await? {
            Some(found) => {
                result.template_id = Some(found.id);
                result.template_version_id = Some(found.active_version_id);
            }
            None => {
                let (template, version_id) =
                    create_template_from_example(api, cfg, org_id, wait_timeout, wait_interval)
                        .await?;
                result.template_id = Some(template.id);
                result.template_version_id = Some(version_id);
            }
        }
    }

    if result.template_version_preset_id.is_none()
        && let Some(version_id) = result.template_version_id
    {
        let presets = api
            .template_version_presets(version_id)
            .await
            .context("listing template version presets")?;
        result.template_version_preset_id = presets.first().map(|p| p.id);
    }

    Ok(())
}

async fn find_template_by_name(
    api: &ProviderApi,
    org_id: Uuid,
    name: &str,
) -> anyhow::Result<Option<Template>> {
    let templates = api
        .templates_by_name(org_id, name)
        .await
        .context("listing templates")?;
    Ok(templates.into_iter().next())
}

async fn create_template_from_example(
    api: &ProviderApi,
    cfg: &BootstrapConfig,
    org_id: Uuid,
    wait_timeout: Duration,
    wait_interval: Duration,
) -> anyhow::Result<(Template, Uuid)> {
    let example_id = resolve_example_id(api, cfg).await?;

    let version = api
        .create_template_version(
            org_id,
            &CreateTemplateVersionRequest {
                name: "bootstrap".into(),
                message: "bootstrap template".into(),
                storage_method: "file".into(),
                example_id,
                provisioner: "terraform".into(),
            },
        )
        .await
        .context("creating template version")?;

    wait_for_version_job(api, version.id, wait_timeout, wait_interval).await?;

    let template = api
        .create_template(
            org_id,
            &CreateTemplateRequest {
                name: cfg.template_name.clone(),
                display_name: cfg.template_name.clone(),
                template_version_id: version.id,
            },
        )
        .await
        .context("creating template")?;

    let active_version_id = template.active_version_id;
    Ok((template, active_version_id))
}

async fn resolve_example_id(api: &ProviderApi, cfg: &BootstrapConfig) -> anyhow::Result<String> {
    if !cfg.template_example_id.trim().is_empty() {
        return Ok(cfg.template_example_id.trim().to_string());
    }

    let examples = api
        .starter_templates()
        .await
        .context("listing starter templates")?;
    if examples.is_empty() {
        bail!("provider has no starter templates");
    }
    if cfg.template_example_name.is_empty() {
        return Ok(examples[0].id.clone());
    }
    for example in &examples {
        if example.name.eq_ignore_ascii_case(&cfg.template_example_name) {
            return Ok(example.id.clone());
        }
    }
    Ok(examples[0].id.clone())
}

async fn wait_for_version_job(
    api: &ProviderApi,
    version_id: Uuid,
    timeout: Duration,
    interval: Duration,
) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let version = api
            .template_version(version_id)
            .await
            .context("polling template version job")?;
        match version.job.status {
            JobStatus::Succeeded => return Ok(()),
            JobStatus::Failed => {
                if version.job.error.is_empty() {
                    bail!("template version job failed");
                }
                bail!("template version job failed: {}", version.job.error);
            }
            _ => {}
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("template version job timed out");
        }
        tokio::time::sleep(interval).await;
    }
}

fn parse_uuid(raw: Option<&str>) -> Option<Uuid> {
    Uuid::parse_str(raw?.trim()).ok()
}

fn is_placeholder_token(token: &str) -> bool {
    matches!(
        token.trim().to_lowercase().as_str(),
        "changeme" | "change-me" | "replace-me" | "replace_me"
    )
}
