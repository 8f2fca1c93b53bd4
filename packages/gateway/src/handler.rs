use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use tracing::warn;
use url::Url;

use crate::gate::SessionGate;
use crate::rewrite::UrlRewriter;

/// Both halves are optional so a half-wired process answers 500 instead
/// of panicking.
#[derive(Clone, Default)]
pub struct GatewayState {
    pub gate: Option<Arc<dyn SessionGate>>,
    pub rewriter: Option<Arc<dyn UrlRewriter>>,
}

/// The one-shot redirect pipeline: look up the session by token, refuse
/// consumed or expired ones, rewrite the editor URL, consume best-effort,
/// answer 307. Two near-simultaneous requests may both receive the
/// redirect; the store's set-once predicate keeps the consume single.
pub async fn redirect(State(state): State<GatewayState>, Path(token): Path<String>) -> Response {
    let (Some(gate), Some(rewriter)) = (&state.gate, &state.rewriter) else {
        return plain(StatusCode::INTERNAL_SERVER_ERROR, "proxy not configured");
    };

    let token = token.trim();
    if token.is_empty() {
        return plain(StatusCode::BAD_REQUEST, "missing token");
    }

    let session = match gate.get_session_by_token(token).await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "session not found");
            return plain(StatusCode::NOT_FOUND, "session not found");
        }
    };

    if session.consumed_at.is_some() {
        return plain(StatusCode::GONE, "session already used");
    }

    let now = Utc::now();
    if let Some(expires_at) = session.expires_at
        && now > expires_at
    {
        return plain(StatusCode::GONE, "session expired");
    }

    let mut target = match Url::parse(&session.session_url) {
        Ok(url) => url,
        Err(e) => {
            warn!(session_id = session.id, error = %e, "invalid session url");
            return plain(StatusCode::INTERNAL_SERVER_ERROR, "invalid session url");
        }
    };
    if let Err(e) = rewriter.rewrite(&mut target) {
        warn!(session_id = session.id, error = %e, "rewrite failed");
        return plain(StatusCode::INTERNAL_SERVER_ERROR, "invalid redirect");
    }

    // The redirect is emitted regardless of the mark-consumed outcome.
    if let Err(e) = gate.mark_session_consumed(session.id, now).await {
        warn!(session_id = session.id, error = %e, "failed to mark session consumed");
    }

    (
        StatusCode::TEMPORARY_REDIRECT,
        [(header::LOCATION, target.to_string())],
    )
        .into_response()
}

/// The bare prefix carries no token.
pub async fn missing_token() -> Response {
    plain(StatusCode::BAD_REQUEST, "missing token")
}

fn plain(status: StatusCode, reason: &'static str) -> Response {
    (status, reason).into_response()
}
