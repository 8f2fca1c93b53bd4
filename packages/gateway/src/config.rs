use config::{Config, ConfigError, Environment};
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

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    /// Path the one-shot links live under. Default: "/edit/".
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
    /// Query parameter the provider credential rides on. Default:
    /// "session_token".
    #[serde(default = "default_token_query_param")]
    pub token_query_param: String,
    /// Provider credential stamped onto rewritten editor URLs.
    pub provider_access_token: String,
}

fn default_path_prefix() -> String {
    "/edit/".into()
}
fn default_token_query_param() -> String {
    "session_token".into()
}

impl GatewayConfig {
    /// Load from environment variables only (e.g. `GATEWAY__DATABASE__URL`).
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8082)?
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }
}
