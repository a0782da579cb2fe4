//! Entry point for gem source requests.

use crate::handlers::private;
use crate::matcher::GemSource;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Fallback handler: picks the gem source owning the path and hands it the
/// rewritten path. Paths no source claims are 404.
pub async fn gem_source_fallback(State(state): State<AppState>, req: Request) -> Response {
    let path = req.uri().path().to_string();
    let Some((source, rewritten)) = state.sources.select(&path) else {
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    };

    match source {
        GemSource::Private => private::serve(&state, rewritten, req).await.into_response(),
    }
}
