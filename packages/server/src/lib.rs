pub mod bootstrap;
pub mod config;
pub mod editor;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod models;
pub mod notify;
pub mod provider;
pub mod routes;
pub mod source_host;
pub mod state;
pub mod tasks;
pub mod tracking;
pub mod workspace;

use crate::state::AppState;

/// Build the application router.
pub fn build_router(state: AppState) -> axum::Router {
    axum::Router::new()
        .nest("/api", routes::api_routes())
        .with_state(state)
}
