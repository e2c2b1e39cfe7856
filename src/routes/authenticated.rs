use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Routes that need a signed-in caller. The `AuthUser` middleware layered on this
/// router rejects anonymous requests before any handler runs; authorship checks for
/// edits and deletions happen inside the handlers.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /auth/me
        .route("/auth/me", get(handlers::get_me))
        // PUT /auth/me/username
        .route("/auth/me/username", put(handlers::update_username))
        // POST /snippets
        // Creates a snippet owned by the caller; hashes the password for unlisted ones.
        .route("/snippets", post(handlers::create_snippet))
        // GET /snippets/user?page=...&limit=...
        // The caller's own snippets, including private ones.
        .route("/snippets/user", get(handlers::get_user_snippets))
        // PUT/DELETE /snippets/{public_id}
        // Author-only edit and removal.
        .route(
            "/snippets/{public_id}",
            put(handlers::update_snippet).delete(handlers::delete_snippet),
        )
        // POST /snippets/{public_id}/view
        // Same access decision as the public view, with the caller as requester.
        .route("/snippets/{public_id}/view", post(handlers::view_snippet))
}
