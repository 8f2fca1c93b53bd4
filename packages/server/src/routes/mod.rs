mod v1;

use crate::state::AppState;

pub fn api_routes() -> axum::Router<AppState> {
    let (router, _api) = utoipa_axum::router::OpenApiRouter::new()
        .nest("/v1", v1::routes())
        .split_for_parts();
    router
}
