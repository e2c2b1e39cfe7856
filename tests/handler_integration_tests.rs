mod common;

use async_trait::async_trait;
use axum::{
    Json,
    body::to_bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::{seed_user, test_hasher, test_state};
use serde_json::Value;
use snippet_share::{
    AppConfig, AppError, AppState,
    auth::AuthUser,
    handlers::{self, PageParams, PublicFeedParams},
    models::{
        CreateSnippetRequest, Exposure, Flavor, PublicId, Snippet, SnippetDraft,
        UpdateSnippetRequest, UpdateUsernameRequest, User, ViewSnippetRequest,
    },
    repository::{Page, Repository},
};
use std::sync::Arc;
use uuid::Uuid;

// --- Helpers ---

fn auth(user: &User) -> AuthUser {
    AuthUser {
        id: user.id,
        email: user.email.clone(),
    }
}

fn create_request(exposure: Exposure, password: Option<&str>) -> CreateSnippetRequest {
    CreateSnippetRequest {
        name: "deploy notes".into(),
        content: "cargo build --release".into(),
        flavor: Flavor::Code,
        exposure,
        language: Some("bash".into()),
        password: password.map(str::to_string),
    }
}

async fn create(state: &AppState, author: &User, req: CreateSnippetRequest) -> String {
    let (status, Json(envelope)) =
        handlers::create_snippet(auth(author), State(state.clone()), Json(req))
            .await
            .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    envelope.snippet.public_id.as_str().to_string()
}

async fn public_view(
    state: &AppState,
    requester: Option<&User>,
    public_id: &str,
    password: Option<&str>,
) -> Result<Response, AppError> {
    handlers::view_snippet_public(
        requester.map(auth),
        State(state.clone()),
        Path(public_id.to_string()),
        Json(ViewSnippetRequest {
            password: password.map(str::to_string),
        }),
    )
    .await
}

async fn body_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// --- Creation ---

#[tokio::test]
async fn test_create_returns_projection_without_hash() {
    let (state, repo) = test_state();
    let author = seed_user(&repo, "author@example.com").await;

    let (status, Json(envelope)) = handlers::create_snippet(
        auth(&author),
        State(state.clone()),
        Json(create_request(Exposure::Unlisted, Some("hunter2"))),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert!(envelope.success);
    assert!(envelope.snippet.password_protected);
    assert_eq!(envelope.snippet.author_id, author.id);
    assert_eq!(envelope.snippet.language.as_deref(), Some("bash"));

    let json = serde_json::to_string(&envelope).unwrap();
    assert!(!json.contains("hunter2"));
    assert!(!json.contains("argon2"));
}

#[tokio::test]
async fn test_create_public_with_password_stores_no_hash() {
    let (state, repo) = test_state();
    let author = seed_user(&repo, "author@example.com").await;

    let public_id = create(&state, &author, create_request(Exposure::Public, Some("hunter2"))).await;

    let stored = repo
        .find_by_public_id(&PublicId::parse(&public_id).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(stored.credential_hash.is_empty());
}

#[tokio::test]
async fn test_create_rejects_invalid_payloads() {
    let (state, repo) = test_state();
    let author = seed_user(&repo, "author@example.com").await;

    let mut blank_name = create_request(Exposure::Public, None);
    blank_name.name = "   ".into();
    let mut code_without_language = create_request(Exposure::Public, None);
    code_without_language.language = None;

    for req in [blank_name, code_without_language] {
        let err = handlers::create_snippet(auth(&author), State(state.clone()), Json(req))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}

// --- Viewing ---

#[tokio::test]
async fn test_view_private_snippet() {
    let (state, repo) = test_state();
    let author = seed_user(&repo, "author@example.com").await;
    let stranger = seed_user(&repo, "stranger@example.com").await;
    let public_id = create(&state, &author, create_request(Exposure::Private, None)).await;

    let (status, body) = body_json(public_view(&state, None, &public_id, None).await.unwrap()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["reason"], "private");
    assert_eq!(body["message"], "Access denied. This snippet is private.");
    assert!(body.get("snippet").is_none());

    let response = public_view(&state, Some(&stranger), &public_id, None).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let (status, body) =
        body_json(public_view(&state, Some(&author), &public_id, None).await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_author"], true);
    assert_eq!(body["snippet"]["content"], "cargo build --release");
}

#[tokio::test]
async fn test_view_protected_unlisted_negotiation() {
    let (state, repo) = test_state();
    let author = seed_user(&repo, "author@example.com").await;
    let public_id =
        create(&state, &author, create_request(Exposure::Unlisted, Some("hunter2"))).await;

    let (status, body) = body_json(public_view(&state, None, &public_id, None).await.unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["requires_password"], true);
    assert_eq!(body["message"], "Password required");

    let (status, body) =
        body_json(public_view(&state, None, &public_id, Some("wrong")).await.unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["reason"], "invalid_credential");
    assert_eq!(body["message"], "Invalid password");
    assert!(body.get("requires_password").is_none());

    let (status, body) =
        body_json(public_view(&state, None, &public_id, Some("hunter2")).await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_author"], false);
    assert_eq!(body["snippet"]["password_protected"], true);
}

#[tokio::test]
async fn test_authenticated_view_recognizes_author() {
    let (state, repo) = test_state();
    let author = seed_user(&repo, "author@example.com").await;
    let public_id =
        create(&state, &author, create_request(Exposure::Unlisted, Some("hunter2"))).await;

    let response = handlers::view_snippet(
        auth(&author),
        State(state.clone()),
        Path(public_id),
        Json(ViewSnippetRequest::default()),
    )
    .await
    .unwrap();
    let (status, body) = body_json(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_author"], true);
}

#[tokio::test]
async fn test_view_unknown_or_malformed_id_is_not_found() {
    let (state, _repo) = test_state();

    for raw in ["AAAAAAAAAA", "short", "has spaces!", ""] {
        let err = public_view(&state, None, raw, None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound("Snippet")), "id {raw:?}");
    }
}

// --- Update and delete ---

#[tokio::test]
async fn test_update_by_non_author_is_forbidden_and_missing_is_not_found() {
    let (state, repo) = test_state();
    let author = seed_user(&repo, "author@example.com").await;
    let intruder = seed_user(&repo, "intruder@example.com").await;
    let public_id = create(&state, &author, create_request(Exposure::Public, None)).await;

    let err = handlers::update_snippet(
        auth(&intruder),
        State(state.clone()),
        Path(public_id.clone()),
        Json(UpdateSnippetRequest {
            name: Some("stolen".into()),
            ..Default::default()
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::FORBIDDEN);
    assert_eq!(err.to_string(), "Access denied. You can only edit your own snippets.");

    let err = handlers::update_snippet(
        auth(&author),
        State(state.clone()),
        Path("ZZZZZZZZZZ".into()),
        Json(UpdateSnippetRequest::default()),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_fields_and_clear_password_on_exposure_change() {
    let (state, repo) = test_state();
    let author = seed_user(&repo, "author@example.com").await;
    let public_id =
        create(&state, &author, create_request(Exposure::Unlisted, Some("hunter2"))).await;

    let Json(envelope) = handlers::update_snippet(
        auth(&author),
        State(state.clone()),
        Path(public_id.clone()),
        Json(UpdateSnippetRequest {
            name: Some("  renamed  ".into()),
            content: Some("   ".into()),
            flavor: Some(Flavor::Plain),
            exposure: Some(Exposure::Public),
            ..Default::default()
        }),
    )
    .await
    .unwrap();

    let snippet = envelope.snippet;
    assert_eq!(snippet.name, "renamed");
    assert_eq!(snippet.content, "cargo build --release");
    assert_eq!(snippet.flavor, Flavor::Plain);
    assert_eq!(snippet.language, None);
    assert_eq!(snippet.exposure, Exposure::Public);
    assert!(!snippet.password_protected);

    let (status, _) = body_json(public_view(&state, None, &public_id, None).await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_update_without_password_field_keeps_hash() {
    let (state, repo) = test_state();
    let author = seed_user(&repo, "author@example.com").await;
    let public_id =
        create(&state, &author, create_request(Exposure::Unlisted, Some("hunter2"))).await;

    handlers::update_snippet(
        auth(&author),
        State(state.clone()),
        Path(public_id.clone()),
        Json(UpdateSnippetRequest {
            content: Some("echo updated".into()),
            ..Default::default()
        }),
    )
    .await
    .unwrap();

    let response = public_view(&state, None, &public_id, Some("hunter2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = public_view(&state, None, &public_id, None).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_update_to_code_without_language_is_rejected() {
    let (state, repo) = test_state();
    let author = seed_user(&repo, "author@example.com").await;
    let mut req = create_request(Exposure::Public, None);
    req.flavor = Flavor::Plain;
    req.language = None;
    let public_id = create(&state, &author, req).await;

    let err = handlers::update_snippet(
        auth(&author),
        State(state.clone()),
        Path(public_id),
        Json(UpdateSnippetRequest {
            flavor: Some(Flavor::Code),
            ..Default::default()
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_rules() {
    let (state, repo) = test_state();
    let author = seed_user(&repo, "author@example.com").await;
    let intruder = seed_user(&repo, "intruder@example.com").await;
    let public_id = create(&state, &author, create_request(Exposure::Public, None)).await;

    let err = handlers::delete_snippet(auth(&intruder), State(state.clone()), Path(public_id.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::FORBIDDEN);

    let Json(message) =
        handlers::delete_snippet(auth(&author), State(state.clone()), Path(public_id.clone()))
            .await
            .unwrap();
    assert!(message.success);
    assert_eq!(message.message, "Snippet deleted successfully");

    let err = public_view(&state, None, &public_id, None).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);

    let err = handlers::delete_snippet(auth(&author), State(state.clone()), Path(public_id))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

// --- Listings ---

#[tokio::test]
async fn test_public_feed_excludes_unlisted_and_private() {
    let (state, repo) = test_state();
    let author = seed_user(&repo, "author@example.com").await;

    let public_id = create(&state, &author, create_request(Exposure::Public, None)).await;
    create(&state, &author, create_request(Exposure::Unlisted, None)).await;
    create(&state, &author, create_request(Exposure::Unlisted, Some("hunter2"))).await;
    create(&state, &author, create_request(Exposure::Private, None)).await;

    let Json(feed) = handlers::get_public_snippets(
        State(state.clone()),
        Query(PublicFeedParams { limit: None }),
    )
    .await
    .unwrap();

    assert!(feed.success);
    assert_eq!(feed.snippets.len(), 1);
    assert_eq!(feed.snippets[0].public_id.as_str(), public_id);
}

#[tokio::test]
async fn test_public_feed_limit_is_clamped() {
    let (state, repo) = test_state();
    let author = seed_user(&repo, "author@example.com").await;
    for _ in 0..7 {
        create(&state, &author, create_request(Exposure::Public, None)).await;
    }

    let Json(default_feed) = handlers::get_public_snippets(
        State(state.clone()),
        Query(PublicFeedParams { limit: None }),
    )
    .await
    .unwrap();
    assert_eq!(default_feed.snippets.len(), 5);

    let Json(min_feed) = handlers::get_public_snippets(
        State(state.clone()),
        Query(PublicFeedParams { limit: Some(0) }),
    )
    .await
    .unwrap();
    assert_eq!(min_feed.snippets.len(), 1);
}

#[tokio::test]
async fn test_user_snippets_pagination_includes_private() {
    let (state, repo) = test_state();
    let author = seed_user(&repo, "author@example.com").await;
    let other = seed_user(&repo, "other@example.com").await;

    for exposure in [Exposure::Public, Exposure::Unlisted, Exposure::Private] {
        create(&state, &author, create_request(exposure, None)).await;
    }
    create(&state, &other, create_request(Exposure::Public, None)).await;

    let Json(first) = handlers::get_user_snippets(
        auth(&author),
        State(state.clone()),
        Query(PageParams {
            page: Some(1),
            limit: Some(2),
        }),
    )
    .await
    .unwrap();
    assert_eq!(first.snippets.len(), 2);
    assert_eq!(first.total_pages, 2);
    assert_eq!(first.current_page, 1);

    let Json(second) = handlers::get_user_snippets(
        auth(&author),
        State(state.clone()),
        Query(PageParams {
            page: Some(2),
            limit: Some(2),
        }),
    )
    .await
    .unwrap();
    assert_eq!(second.snippets.len(), 1);
    assert!(second.snippets.iter().all(|s| s.author_id == author.id));
}

// --- Profile ---

#[tokio::test]
async fn test_update_username_trims_and_validates() {
    let (state, repo) = test_state();
    let user = seed_user(&repo, "user@example.com").await;

    let Json(profile) = handlers::update_username(
        auth(&user),
        State(state.clone()),
        Json(UpdateUsernameRequest {
            username: "  ada  ".into(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(profile.username.as_deref(), Some("ada"));

    for bad in ["   ".to_string(), "x".repeat(51)] {
        let err = handlers::update_username(
            auth(&user),
            State(state.clone()),
            Json(UpdateUsernameRequest { username: bad }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    let Json(me) = handlers::get_me(auth(&user), State(state.clone())).await.unwrap();
    assert_eq!(me.username.as_deref(), Some("ada"));
    assert_eq!(me.email, "user@example.com");
}

// --- Failure mapping ---

/// Repository whose every call fails like a lost database connection.
struct UnavailableRepo;

fn unavailable<T>() -> Result<T, AppError> {
    Err(AppError::Database(sqlx::Error::PoolTimedOut))
}

#[async_trait]
impl Repository for UnavailableRepo {
    async fn get_user(&self, _id: Uuid) -> Result<Option<User>, AppError> {
        unavailable()
    }
    async fn create_user(&self, _user: User) -> Result<User, AppError> {
        unavailable()
    }
    async fn update_username(&self, _id: Uuid, _username: &str) -> Result<Option<User>, AppError> {
        unavailable()
    }
    async fn create_snippet(&self, _draft: SnippetDraft) -> Result<Snippet, AppError> {
        unavailable()
    }
    async fn find_by_public_id(&self, _public_id: &PublicId) -> Result<Option<Snippet>, AppError> {
        unavailable()
    }
    async fn replace_snippet(&self, _snippet: Snippet) -> Result<Option<Snippet>, AppError> {
        unavailable()
    }
    async fn delete_snippet(&self, _public_id: &PublicId) -> Result<bool, AppError> {
        unavailable()
    }
    async fn get_user_snippets(
        &self,
        _author_id: Uuid,
        _page: Page,
    ) -> Result<(Vec<Snippet>, i64), AppError> {
        unavailable()
    }
    async fn get_public_snippets(&self, _limit: i64) -> Result<Vec<Snippet>, AppError> {
        unavailable()
    }
}

#[tokio::test]
async fn test_storage_failure_is_opaque_500() {
    let state = AppState {
        repo: Arc::new(UnavailableRepo),
        hasher: Arc::new(test_hasher()),
        config: AppConfig::default(),
    };

    let err = handlers::get_public_snippets(State(state), Query(PublicFeedParams { limit: None }))
        .await
        .unwrap_err();
    let (status, body) = body_json(err.into_response()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Internal server error");
}

#[tokio::test]
async fn test_user_snippets_extreme_page_numbers() {
    let (state, repo) = test_state();
    let author = seed_user(&repo, "author@example.com").await;
    create(&state, &author, create_request(Exposure::Public, None)).await;

    let Json(far) = handlers::get_user_snippets(
        auth(&author),
        State(state.clone()),
        Query(PageParams {
            page: Some(i64::MAX),
            limit: Some(10),
        }),
    )
    .await
    .unwrap();
    assert!(far.snippets.is_empty());
    assert_eq!(far.total_pages, 1);

    let Json(zero) = handlers::get_user_snippets(
        auth(&author),
        State(state.clone()),
        Query(PageParams {
            page: Some(0),
            limit: Some(10),
        }),
    )
    .await
    .unwrap();
    assert_eq!(zero.current_page, 1);
    assert_eq!(zero.snippets.len(), 1);
}

#[tokio::test]
async fn test_update_with_blank_language_keeps_stored_language() {
    let (state, repo) = test_state();
    let author = seed_user(&repo, "author@example.com").await;
    let public_id = create(&state, &author, create_request(Exposure::Public, None)).await;

    let Json(envelope) = handlers::update_snippet(
        auth(&author),
        State(state.clone()),
        Path(public_id),
        Json(UpdateSnippetRequest {
            language: Some("  ".into()),
            ..Default::default()
        }),
    )
    .await
    .unwrap();

    assert_eq!(envelope.snippet.flavor, Flavor::Code);
    assert_eq!(envelope.snippet.language.as_deref(), Some("bash"));
}
