use axum::{
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::AppError,
    repository::RepositoryState,
};

/// Claims
///
/// Payload of the bearer tokens issued by the login flow. Only verification happens here.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's id.
    pub sub: Uuid,
    /// Expiration time (seconds since the epoch); always validated.
    pub exp: usize,
    /// Issued-at time.
    pub iat: usize,
}

/// AuthUser
///
/// The resolved identity of a request. Use `AuthUser` on routes that require a
/// signed-in caller and `Option<AuthUser>` where anonymous callers are welcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
}

fn unauthorized(message: &str) -> AppError {
    AppError::Unauthorized(format!("Access denied. {message}"))
}

/// Resolves the requester from the request headers.
///
/// * `Ok(None)`: no credentials were presented.
/// * `Ok(Some(_))`: a valid token (or, locally, `x-user-id`) naming an existing user.
/// * `Err(_)`: credentials were presented but are unusable.
async fn resolve_identity(
    parts: &Parts,
    repo: &RepositoryState,
    config: &AppConfig,
) -> Result<Option<AuthUser>, AppError> {
    // Local development bypass: a known user id in `x-user-id` stands in for a token.
    if config.env == Env::Local {
        let bypass_id = parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| Uuid::parse_str(raw).ok());
        if let Some(user_id) = bypass_id {
            if let Some(user) = repo.get_user(user_id).await? {
                return Ok(Some(AuthUser {
                    id: user.id,
                    email: user.email,
                }));
            }
        }
    }

    let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let token = auth_header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| unauthorized("No token provided."))?;

    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;

    let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
        match e.kind() {
            ErrorKind::ExpiredSignature => unauthorized("Token expired."),
            _ => unauthorized("Invalid token."),
        }
    })?;

    // The user may have been removed after the token was issued.
    let user = repo
        .get_user(token_data.claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found.".into()))?;

    Ok(Some(AuthUser {
        id: user.id,
        email: user.email,
    }))
}

/// Required identity: rejects with 401 when no usable credentials are present.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        resolve_identity(parts, &repo, &config)
            .await?
            .ok_or_else(|| unauthorized("No token provided."))
    }
}

/// Optional identity: anonymous when no credentials are presented, but a bad or
/// expired token is still rejected so the client knows to refresh it.
impl<S> OptionalFromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        resolve_identity(parts, &repo, &config).await
    }
}
