pub mod config;
pub mod gate;
pub mod handler;
pub mod rewrite;

use axum::Router;
use axum::routing::get;

use crate::handler::GatewayState;

/// Normalize the path prefix: leading and trailing slash, `/edit/` default.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim();
    if trimmed.is_empty() {
        return "/edit/".to_string();
    }
    let mut prefix = String::new();
    if !trimmed.starts_with('/') {
        prefix.push('/');
    }
    prefix.push_str(trimmed);
    if !prefix.ends_with('/') {
        prefix.push('/');
    }
    prefix
}

/// Build the redirect router under the given prefix.
pub fn build_router(prefix: &str, state: GatewayState) -> Router {
    let prefix = normalize_prefix(prefix);
    Router::new()
        .route(&format!("{prefix}{{token}}"), get(handler::redirect))
        .route(&prefix, get(handler::missing_token))
        .with_state(state)
}
