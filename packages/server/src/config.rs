use config::{Config, ConfigError, Environment};
use mq::BusConfig;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Workspace provider connection and template binding.
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub url: String,
    /// Pre-issued credential; bootstrap replaces placeholders and blanks.
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub template_version_id: Option<String>,
    #[serde(default)]
    pub template_version_preset_id: Option<String>,
    /// Provider user workspaces are created for. Default: "me".
    #[serde(default = "default_provider_user")]
    pub user: String,
    /// App slug (or display name) of the editor app. Default: "code-server".
    #[serde(default = "default_editor_app_slug")]
    pub editor_app_slug: String,
    /// Agent to tunnel through; empty means "first agent".
    #[serde(default)]
    pub agent_name: String,
    /// How long a workspace may take to reach Running. Default: 120s.
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
}

fn default_provider_user() -> String {
    "me".into()
}
fn default_editor_app_slug() -> String {
    "code-server".into()
}
fn default_ready_timeout_secs() -> u64 {
    120
}

/// First-start provisioning of the provider account and template.
#[derive(Debug, Deserialize, Clone)]
pub struct BootstrapConfig {
    #[serde(default = "default_bootstrap_email")]
    pub email: String,
    #[serde(default = "default_bootstrap_username")]
    pub username: String,
    #[serde(default = "default_bootstrap_password")]
    pub password: String,
    #[serde(default = "default_bootstrap_full_name")]
    pub full_name: String,
    #[serde(default = "default_bootstrap_token_name")]
    pub token_name: String,
    /// Lifetime of the minted API credential in seconds. Default: 720h.
    #[serde(default = "default_token_lifetime_secs")]
    pub token_lifetime_secs: u64,
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
    #[serde(default = "default_wait_interval_secs")]
    pub wait_interval_secs: u64,
    #[serde(default = "default_template_name")]
    pub template_name: String,
    #[serde(default)]
    pub template_example_id: String,
    #[serde(default = "default_template_example_name")]
    pub template_example_name: String,
}

fn default_bootstrap_email() -> String {
    "admin@example.com".into()
}
fn default_bootstrap_username() -> String {
    "admin".into()
}
fn default_bootstrap_password() -> String {
    "admin".into()
}
fn default_bootstrap_full_name() -> String {
    "Provider Admin".into()
}
fn default_bootstrap_token_name() -> String {
    "editor-bootstrap".into()
}
fn default_token_lifetime_secs() -> u64 {
    720 * 60 * 60
}
fn default_wait_timeout_secs() -> u64 {
    120
}
fn default_wait_interval_secs() -> u64 {
    2
}
fn default_template_name() -> String {
    "default-template".into()
}
fn default_template_example_name() -> String {
    "Docker".into()
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            email: default_bootstrap_email(),
            username: default_bootstrap_username(),
            password: default_bootstrap_password(),
            full_name: default_bootstrap_full_name(),
            token_name: default_bootstrap_token_name(),
            token_lifetime_secs: default_token_lifetime_secs(),
            wait_timeout_secs: default_wait_timeout_secs(),
            wait_interval_secs: default_wait_interval_secs(),
            template_name: default_template_name(),
            template_example_id: String::new(),
            template_example_name: default_template_example_name(),
        }
    }
}

/// S3-compatible blob storage settings.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    pub bucket: String,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
    /// Upload/download ceiling in bytes. Default: 1 GiB.
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,
    #[serde(default = "default_part_size_bytes")]
    pub part_size_bytes: u64,
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,
}

fn default_region() -> String {
    "us-east-1".into()
}
fn default_max_size_bytes() -> u64 {
    1 << 30
}
fn default_part_size_bytes() -> u64 {
    8 * 1024 * 1024
}
fn default_upload_concurrency() -> usize {
    4
}

impl From<StorageConfig> for common::storage::s3::S3Config {
    fn from(cfg: StorageConfig) -> Self {
        Self {
            endpoint: cfg.endpoint,
            region: cfg.region,
            bucket: cfg.bucket,
            access_key: cfg.access_key,
            secret_key: cfg.secret_key,
            force_path_style: cfg.force_path_style,
            max_size_bytes: cfg.max_size_bytes,
            part_size_bytes: cfg.part_size_bytes,
            upload_concurrency: cfg.upload_concurrency,
        }
    }
}

/// One-shot redirect and direct-mode settings.
#[derive(Debug, Deserialize, Clone)]
pub struct EditorConfig {
    /// Base URL of the redirect gateway. Unset switches the service to
    /// direct mode: editor URLs carry the provider credential and sessions
    /// are consumed at creation.
    #[serde(default)]
    pub proxy_base_url: Option<String>,
    /// Query parameter the provider credential rides on. Default:
    /// "session_token".
    #[serde(default = "default_token_query_param")]
    pub token_query_param: String,
}

fn default_token_query_param() -> String {
    "session_token".into()
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            proxy_base_url: None,
            token_query_param: default_token_query_param(),
        }
    }
}

/// File-edited webhook settings.
#[derive(Debug, Deserialize, Clone)]
pub struct NotifyConfig {
    pub webhook_url: String,
    #[serde(default = "default_notify_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_notify_timeout_secs() -> u64 {
    5
}

/// Periods and batch sizes for the background loops.
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_period_secs")]
    pub poll_period_secs: u64,
    #[serde(default = "default_poll_batch_size")]
    pub poll_batch_size: u64,
    #[serde(default = "default_expired_period_secs")]
    pub expired_period_secs: u64,
    #[serde(default = "default_expired_limit")]
    pub expired_limit: u64,
    #[serde(default = "default_active_period_secs")]
    pub active_period_secs: u64,
    #[serde(default = "default_active_limit")]
    pub active_limit: u64,
}

fn default_poll_period_secs() -> u64 {
    60
}
fn default_poll_batch_size() -> u64 {
    50
}
fn default_expired_period_secs() -> u64 {
    30
}
fn default_expired_limit() -> u64 {
    100
}
fn default_active_period_secs() -> u64 {
    60
}
fn default_active_limit() -> u64 {
    100
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_period_secs: default_poll_period_secs(),
            poll_batch_size: default_poll_batch_size(),
            expired_period_secs: default_expired_period_secs(),
            expired_limit: default_expired_limit(),
            active_period_secs: default_active_period_secs(),
            active_limit: default_active_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub editor: EditorConfig,
    pub notify: NotifyConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl AppConfig {
    /// Load from environment variables only (e.g. `SPROUT__DATABASE__URL`).
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 9090)?
            .add_source(
                Environment::with_prefix("SPROUT")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("bus.brokers"),
            )
            .build()?;

        s.try_deserialize()
    }
}
