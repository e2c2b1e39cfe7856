use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tokio::task;
use uuid::Uuid;

use crate::{
    AppState,
    access::{AccessOutcome, DenialReason, resolve_access},
    auth::AuthUser,
    credential::{CredentialChange, credential_for_create},
    error::AppError,
    models::{
        AccessDeniedResponse, CreateSnippetRequest, MessageResponse, PublicId,
        PublicSnippetsResponse, Snippet, SnippetEnvelope, SnippetListResponse, SnippetResponse,
        UpdateSnippetRequest, UpdateUsernameRequest, UserProfile, ViewSnippetRequest,
        ViewSnippetResponse,
    },
    repository::Page,
};

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;
const DEFAULT_PUBLIC_LIMIT: i64 = 5;
const MAX_PUBLIC_LIMIT: i64 = 50;
const MAX_USERNAME_LEN: usize = 50;

// --- Query Structs ---

/// PageParams
///
/// Pagination for `GET /snippets/user`.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct PageParams {
    /// 1-based page number (default 1).
    pub page: Option<i64>,
    /// Page size (default 10, at most 100).
    pub limit: Option<i64>,
}

/// PublicFeedParams
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct PublicFeedParams {
    /// How many snippets to return (default 5, at most 50).
    pub limit: Option<i64>,
}

// --- Helpers ---

fn parse_public_id(raw: &str) -> Result<PublicId, AppError> {
    PublicId::parse(raw).ok_or(AppError::NotFound("Snippet"))
}

async fn load_snippet(state: &AppState, public_id: &PublicId) -> Result<Snippet, AppError> {
    state
        .repo
        .find_by_public_id(public_id)
        .await?
        .ok_or(AppError::NotFound("Snippet"))
}

/// Loads a snippet the caller is about to modify. Missing is 404, someone else's is 403.
async fn load_owned_snippet(
    state: &AppState,
    public_id: &PublicId,
    user_id: Uuid,
    action: &str,
) -> Result<Snippet, AppError> {
    let snippet = load_snippet(state, public_id).await?;
    if snippet.author_id != user_id {
        return Err(AppError::Forbidden(format!(
            "Access denied. You can only {action} your own snippets."
        )));
    }
    Ok(snippet)
}

/// Runs the access decision on the blocking pool (verification is slow on purpose)
/// and renders the outcome.
async fn view(
    state: AppState,
    requester: Option<Uuid>,
    raw_id: String,
    payload: ViewSnippetRequest,
) -> Result<Response, AppError> {
    let public_id = parse_public_id(&raw_id)?;
    let snippet = load_snippet(&state, &public_id).await?;

    let hasher = state.hasher.clone();
    let password = payload.password;
    let outcome = task::spawn_blocking(move || {
        resolve_access(snippet, requester, password.as_deref(), &*hasher)
    })
    .await??;

    tracing::debug!(%public_id, outcome = outcome.label(), "resolved snippet access");
    Ok(render_outcome(outcome))
}

fn render_outcome(outcome: AccessOutcome) -> Response {
    match outcome {
        AccessOutcome::Granted { snippet, is_author } => Json(ViewSnippetResponse {
            success: true,
            snippet: SnippetResponse::from(&snippet),
            is_author,
        })
        .into_response(),
        AccessOutcome::CredentialRequired => (
            StatusCode::UNAUTHORIZED,
            Json(AccessDeniedResponse {
                success: false,
                message: "Password required".into(),
                requires_password: Some(true),
                reason: None,
            }),
        )
            .into_response(),
        AccessOutcome::Denied(reason) => {
            let (status, message) = match reason {
                DenialReason::Private => (
                    StatusCode::FORBIDDEN,
                    "Access denied. This snippet is private.",
                ),
                DenialReason::InvalidCredential => (StatusCode::UNAUTHORIZED, "Invalid password"),
            };
            (
                status,
                Json(AccessDeniedResponse {
                    success: false,
                    message: message.into(),
                    requires_password: None,
                    reason: Some(reason.as_str().into()),
                }),
            )
                .into_response()
        }
    }
}

// --- Snippet Handlers ---

/// create_snippet
///
/// [Authenticated Route] Creates a snippet owned by the caller. A password is hashed
/// only when the snippet is unlisted; the plaintext is dropped afterwards.
#[utoipa::path(
    post,
    path = "/snippets",
    request_body = CreateSnippetRequest,
    responses(
        (status = 201, description = "Created", body = SnippetEnvelope),
        (status = 400, description = "Invalid payload", body = MessageResponse)
    )
)]
pub async fn create_snippet(
    AuthUser { id: author_id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateSnippetRequest>,
) -> Result<(StatusCode, Json<SnippetEnvelope>), AppError> {
    let (mut draft, password) = payload.into_draft(author_id)?;

    let hasher = state.hasher.clone();
    let exposure = draft.exposure;
    draft.credential_hash = task::spawn_blocking(move || {
        credential_for_create(exposure, password.as_deref(), &*hasher)
    })
    .await??;

    let snippet = state.repo.create_snippet(draft).await?;
    tracing::info!(public_id = %snippet.public_id, %author_id, exposure = %snippet.exposure, "snippet created");

    Ok((
        StatusCode::CREATED,
        Json(SnippetEnvelope {
            success: true,
            message: "Snippet created successfully".into(),
            snippet: SnippetResponse::from(&snippet),
        }),
    ))
}

/// view_snippet_public
///
/// [Public Route] Fetches a snippet by public id. Anonymous callers are fine; a valid
/// bearer token lets the author be recognized.
#[utoipa::path(
    post,
    path = "/snippets/{public_id}/public-view",
    params(("public_id" = String, Path, description = "Public snippet id")),
    request_body = ViewSnippetRequest,
    responses(
        (status = 200, description = "Granted", body = ViewSnippetResponse),
        (status = 401, description = "Password required or invalid", body = AccessDeniedResponse),
        (status = 403, description = "Private", body = AccessDeniedResponse),
        (status = 404, description = "Not Found", body = MessageResponse)
    )
)]
pub async fn view_snippet_public(
    requester: Option<AuthUser>,
    State(state): State<AppState>,
    Path(public_id): Path<String>,
    Json(payload): Json<ViewSnippetRequest>,
) -> Result<Response, AppError> {
    view(state, requester.map(|user| user.id), public_id, payload).await
}

/// view_snippet
///
/// [Authenticated Route] Same as the public view, for a signed-in caller.
#[utoipa::path(
    post,
    path = "/snippets/{public_id}/view",
    params(("public_id" = String, Path, description = "Public snippet id")),
    request_body = ViewSnippetRequest,
    responses(
        (status = 200, description = "Granted", body = ViewSnippetResponse),
        (status = 401, description = "Password required or invalid", body = AccessDeniedResponse),
        (status = 403, description = "Private", body = AccessDeniedResponse),
        (status = 404, description = "Not Found", body = MessageResponse)
    )
)]
pub async fn view_snippet(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(public_id): Path<String>,
    Json(payload): Json<ViewSnippetRequest>,
) -> Result<Response, AppError> {
    view(state, Some(id), public_id, payload).await
}

/// update_snippet
///
/// [Authenticated Route] Partial update by the author. Changing exposure away from
/// unlisted always clears the password; omitting `password` keeps it.
#[utoipa::path(
    put,
    path = "/snippets/{public_id}",
    params(("public_id" = String, Path, description = "Public snippet id")),
    request_body = UpdateSnippetRequest,
    responses(
        (status = 200, description = "Updated", body = SnippetEnvelope),
        (status = 403, description = "Not Author", body = MessageResponse),
        (status = 404, description = "Not Found", body = MessageResponse)
    )
)]
pub async fn update_snippet(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(public_id): Path<String>,
    Json(mut payload): Json<UpdateSnippetRequest>,
) -> Result<Json<SnippetEnvelope>, AppError> {
    let public_id = parse_public_id(&public_id)?;
    let current = load_owned_snippet(&state, &public_id, user_id, "edit").await?;

    let mut updated = payload.apply_fields(current)?;
    let change = CredentialChange::plan(updated.exposure, payload.password.take());

    let hasher = state.hasher.clone();
    let current_hash = std::mem::take(&mut updated.credential_hash);
    updated.credential_hash =
        task::spawn_blocking(move || change.apply(&current_hash, &*hasher)).await??;

    let saved = state
        .repo
        .replace_snippet(updated)
        .await?
        .ok_or(AppError::NotFound("Snippet"))?;
    tracing::info!(%public_id, exposure = %saved.exposure, "snippet updated");

    Ok(Json(SnippetEnvelope {
        success: true,
        message: "Snippet updated successfully".into(),
        snippet: SnippetResponse::from(&saved),
    }))
}

/// delete_snippet
///
/// [Authenticated Route] Deletes the caller's snippet. Its public id is retired.
#[utoipa::path(
    delete,
    path = "/snippets/{public_id}",
    params(("public_id" = String, Path, description = "Public snippet id")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 403, description = "Not Author", body = MessageResponse),
        (status = 404, description = "Not Found", body = MessageResponse)
    )
)]
pub async fn delete_snippet(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(public_id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let public_id = parse_public_id(&public_id)?;
    load_owned_snippet(&state, &public_id, user_id, "delete").await?;

    if !state.repo.delete_snippet(&public_id).await? {
        return Err(AppError::NotFound("Snippet"));
    }
    tracing::info!(%public_id, "snippet deleted");

    Ok(Json(MessageResponse {
        success: true,
        message: "Snippet deleted successfully".into(),
    }))
}

/// get_user_snippets
///
/// [Authenticated Route] The caller's snippets, newest first, including private ones.
#[utoipa::path(
    get,
    path = "/snippets/user",
    params(PageParams),
    responses((status = 200, description = "My Snippets", body = SnippetListResponse))
)]
pub async fn get_user_snippets(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Json<SnippetListResponse>, AppError> {
    let page = Page {
        number: params.page.unwrap_or(1).max(1),
        size: params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
    };

    let (snippets, total) = state.repo.get_user_snippets(id, page).await?;
    let total_pages = (total + page.size - 1) / page.size;

    Ok(Json(SnippetListResponse {
        success: true,
        snippets: snippets.iter().map(SnippetResponse::from).collect(),
        total_pages,
        current_page: page.number,
    }))
}

/// get_public_snippets
///
/// [Public Route] The newest public snippets. Unlisted and private ones never appear.
#[utoipa::path(
    get,
    path = "/snippets/public",
    params(PublicFeedParams),
    responses((status = 200, description = "Public Snippets", body = PublicSnippetsResponse))
)]
pub async fn get_public_snippets(
    State(state): State<AppState>,
    Query(params): Query<PublicFeedParams>,
) -> Result<Json<PublicSnippetsResponse>, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PUBLIC_LIMIT)
        .clamp(1, MAX_PUBLIC_LIMIT);
    let snippets = state.repo.get_public_snippets(limit).await?;

    Ok(Json(PublicSnippetsResponse {
        success: true,
        snippets: snippets.iter().map(SnippetResponse::from).collect(),
    }))
}

// --- Profile Handlers ---

/// get_me
///
/// [Authenticated Route] The caller's profile.
#[utoipa::path(
    get,
    path = "/auth/me",
    responses((status = 200, description = "Profile", body = UserProfile))
)]
pub async fn get_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>, AppError> {
    let user = state
        .repo
        .get_user(id)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    Ok(Json(UserProfile::from(user)))
}

/// update_username
///
/// [Authenticated Route] Sets the caller's display name.
#[utoipa::path(
    put,
    path = "/auth/me/username",
    request_body = UpdateUsernameRequest,
    responses(
        (status = 200, description = "Updated", body = UserProfile),
        (status = 400, description = "Invalid username", body = MessageResponse)
    )
)]
pub async fn update_username(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateUsernameRequest>,
) -> Result<Json<UserProfile>, AppError> {
    let username = payload.username.trim();
    if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
        return Err(AppError::Validation(format!(
            "username must be between 1 and {MAX_USERNAME_LEN} characters"
        )));
    }

    let user = state
        .repo
        .update_username(id, username)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    Ok(Json(UserProfile::from(user)))
}
