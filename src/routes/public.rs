use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session. A bearer token may still be presented to
/// the view endpoint so authors are recognized.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // GET /snippets/public?limit=...
        // Newest public snippets. Unlisted and private snippets never appear here.
        .route("/snippets/public", get(handlers::get_public_snippets))
        // POST /snippets/{public_id}/public-view
        // Body `{ "password"?: string }`. Returns the snippet, a password challenge
        // or a denial depending on exposure.
        .route(
            "/snippets/{public_id}/public-view",
            post(handlers::view_snippet_public),
        )
}
