use utoipa_axum::{router::OpenApiRouter, routes};

use crate::handlers;
use crate::state::AppState;

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/editor-sessions", editor_routes())
        .nest("/tracking", tracking_routes())
}

fn editor_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::editor::create_editor_session))
        .routes(routes!(handlers::editor::save_editor_session))
}

fn tracking_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::tracking::add_tracking_repo))
        .routes(routes!(handlers::tracking::remove_tracking_repo))
}
