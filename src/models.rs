use std::fmt;

use chrono::{DateTime, Utc};
use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

/// Length of every generated public identifier.
pub const PUBLIC_ID_LEN: usize = 10;

// --- Core Domain Types ---

/// User
///
/// A user record provisioned by the external login flow. The service only reads it
/// to resolve identities and lets the owner change their display name.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub profile_picture: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Exposure
///
/// Visibility tier of a snippet. Request bodies carrying any other string are
/// rejected during deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Exposure {
    /// Listed in the public feed and readable by anyone.
    #[default]
    Public,
    /// Reachable by link only, optionally behind a password.
    Unlisted,
    /// Readable by the author alone.
    Private,
}

impl Exposure {
    pub fn as_str(self) -> &'static str {
        match self {
            Exposure::Public => "public",
            Exposure::Unlisted => "unlisted",
            Exposure::Private => "private",
        }
    }

    /// Decodes a stored exposure value. Anything unrecognized fails closed to
    /// `Private` so a corrupted row can never widen access.
    pub fn from_stored(value: &str) -> Self {
        match value {
            "public" => Exposure::Public,
            "unlisted" => Exposure::Unlisted,
            "private" => Exposure::Private,
            other => {
                tracing::warn!(exposure = %other, "unrecognized stored exposure, treating as private");
                Exposure::Private
            }
        }
    }
}

impl fmt::Display for Exposure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flavor
///
/// How `content` is interpreted by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum Flavor {
    Plain,
    Code,
    RichText,
}

impl Flavor {
    pub fn as_str(self) -> &'static str {
        match self {
            Flavor::Plain => "Plain",
            Flavor::Code => "Code",
            Flavor::RichText => "RichText",
        }
    }

    pub fn from_stored(value: &str) -> Result<Self, AppError> {
        match value {
            "Plain" => Ok(Flavor::Plain),
            "Code" => Ok(Flavor::Code),
            "RichText" => Ok(Flavor::RichText),
            other => Err(AppError::Internal(format!("unknown stored flavor {other:?}"))),
        }
    }
}

/// PublicId
///
/// The short, URL-safe token used in shareable links. Distinct from the internal
/// storage key and never reissued once handed out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PublicId(String);

impl PublicId {
    /// Draws a fresh identifier from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let token = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(PUBLIC_ID_LEN)
            .map(char::from)
            .collect();
        Self(token)
    }

    /// Accepts only well-formed identifiers; anything else cannot name a snippet.
    pub fn parse(raw: &str) -> Option<Self> {
        let well_formed =
            raw.len() == PUBLIC_ID_LEN && raw.bytes().all(|b| b.is_ascii_alphanumeric());
        well_formed.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snippet
///
/// The protected entity. `credential_hash` is empty when no password is set and is
/// only ever non-empty for `Unlisted` snippets. `language` is present exactly when
/// `flavor` is `Code`.
///
/// This type never crosses the HTTP boundary directly; see `SnippetResponse`.
#[derive(Debug, Clone, PartialEq)]
pub struct Snippet {
    pub id: Uuid,
    pub public_id: PublicId,
    pub name: String,
    pub content: String,
    pub flavor: Flavor,
    pub language: Option<String>,
    pub exposure: Exposure,
    pub credential_hash: String,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Snippet {
    /// An empty and an absent hash both mean "no password".
    pub fn has_credential(&self) -> bool {
        !self.credential_hash.is_empty()
    }
}

/// SnippetRow
///
/// Raw `snippets` row. Enum columns are stored as text and decoded in
/// `TryFrom<SnippetRow> for Snippet`.
#[derive(Debug, Clone, FromRow)]
pub struct SnippetRow {
    pub id: Uuid,
    pub public_id: String,
    pub name: String,
    pub content: String,
    pub flavor: String,
    pub language: Option<String>,
    pub exposure: String,
    pub credential_hash: Option<String>,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SnippetRow> for Snippet {
    type Error = AppError;

    fn try_from(row: SnippetRow) -> Result<Self, Self::Error> {
        let flavor = Flavor::from_stored(&row.flavor)?;
        Ok(Snippet {
            id: row.id,
            // Stored ids were validated on the way in.
            public_id: PublicId(row.public_id),
            name: row.name,
            content: row.content,
            flavor,
            language: row.language.filter(|_| flavor == Flavor::Code),
            exposure: Exposure::from_stored(&row.exposure),
            credential_hash: row.credential_hash.unwrap_or_default(),
            author_id: row.author_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// SnippetDraft
///
/// A validated snippet ready for insertion. The repository assigns the internal id,
/// the public id and both timestamps.
#[derive(Debug, Clone)]
pub struct SnippetDraft {
    pub name: String,
    pub content: String,
    pub flavor: Flavor,
    pub language: Option<String>,
    pub exposure: Exposure,
    pub credential_hash: String,
    pub author_id: Uuid,
}

// --- Boundary Validation ---

fn require_text(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Resolves the language column for a flavor: required and trimmed for `Code`,
/// dropped for every other flavor.
pub fn language_for(flavor: Flavor, language: Option<String>) -> Result<Option<String>, AppError> {
    match flavor {
        Flavor::Code => language
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .map(Some)
            .ok_or_else(|| AppError::Validation("language is required for Code snippets".into())),
        Flavor::Plain | Flavor::RichText => Ok(None),
    }
}

// --- Request Payloads (Input Schemas) ---

/// CreateSnippetRequest
///
/// Input payload for `POST /snippets`. `password` only takes effect for unlisted
/// snippets and is hashed before anything is stored.
#[derive(Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateSnippetRequest {
    pub name: String,
    pub content: String,
    pub flavor: Flavor,
    #[serde(default)]
    pub exposure: Exposure,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl fmt::Debug for CreateSnippetRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateSnippetRequest")
            .field("name", &self.name)
            .field("flavor", &self.flavor)
            .field("exposure", &self.exposure)
            .field("language", &self.language)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl CreateSnippetRequest {
    /// Validates the payload and splits off the plaintext password, which the caller
    /// must turn into a hash before the draft is persisted.
    pub fn into_draft(self, author_id: Uuid) -> Result<(SnippetDraft, Option<String>), AppError> {
        require_text("name", &self.name)?;
        require_text("content", &self.content)?;
        let language = language_for(self.flavor, self.language)?;

        let draft = SnippetDraft {
            name: self.name.trim().to_string(),
            content: self.content,
            flavor: self.flavor,
            language,
            exposure: self.exposure,
            credential_hash: String::new(),
            author_id,
        };
        Ok((draft, self.password))
    }
}

/// UpdateSnippetRequest
///
/// Partial update for `PUT /snippets/{public_id}`. Omitted fields keep their value.
/// `password` distinguishes "omitted" (keep the current hash) from "supplied", where
/// a blank string removes the password.
#[derive(Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateSnippetRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<Flavor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure: Option<Exposure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl fmt::Debug for UpdateSnippetRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateSnippetRequest")
            .field("name", &self.name)
            .field("flavor", &self.flavor)
            .field("exposure", &self.exposure)
            .field("language", &self.language)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl UpdateSnippetRequest {
    /// Applies every field except the password to `snippet`. Blank name, content or
    /// language strings are ignored rather than rejected.
    pub fn apply_fields(
        &mut self,
        mut snippet: Snippet,
    ) -> Result<Snippet, AppError> {
        if let Some(name) = self.name.take().filter(|n| !n.trim().is_empty()) {
            snippet.name = name.trim().to_string();
        }
        if let Some(content) = self.content.take().filter(|c| !c.trim().is_empty()) {
            snippet.content = content;
        }
        if let Some(exposure) = self.exposure {
            snippet.exposure = exposure;
        }

        let flavor = self.flavor.unwrap_or(snippet.flavor);
        let language = self
            .language
            .take()
            .filter(|l| !l.trim().is_empty())
            .or_else(|| snippet.language.take());
        snippet.language = language_for(flavor, language)?;
        snippet.flavor = flavor;

        Ok(snippet)
    }
}

/// ViewSnippetRequest
///
/// Body of the view endpoints. The password is a one-shot candidate and is never stored.
#[derive(Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ViewSnippetRequest {
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for ViewSnippetRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewSnippetRequest")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// UpdateUsernameRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateUsernameRequest {
    pub username: String,
}

// --- Response Schemas (Output) ---

/// SnippetResponse
///
/// Public projection of a snippet. Carries `password_protected` instead of the hash.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SnippetResponse {
    pub public_id: PublicId,
    pub name: String,
    pub content: String,
    pub flavor: Flavor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub exposure: Exposure,
    pub password_protected: bool,
    pub author_id: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl From<&Snippet> for SnippetResponse {
    fn from(snippet: &Snippet) -> Self {
        Self {
            public_id: snippet.public_id.clone(),
            name: snippet.name.clone(),
            content: snippet.content.clone(),
            flavor: snippet.flavor,
            language: snippet.language.clone(),
            exposure: snippet.exposure,
            password_protected: snippet.has_credential(),
            author_id: snippet.author_id,
            created_at: snippet.created_at,
            updated_at: snippet.updated_at,
        }
    }
}

/// SnippetEnvelope
///
/// Response of the create and update endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SnippetEnvelope {
    pub success: bool,
    pub message: String,
    pub snippet: SnippetResponse,
}

/// ViewSnippetResponse
///
/// Successful access: the snippet plus whether the requester authored it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ViewSnippetResponse {
    pub success: bool,
    pub snippet: SnippetResponse,
    pub is_author: bool,
}

/// SnippetListResponse
///
/// One page of the requester's own snippets, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SnippetListResponse {
    pub success: bool,
    pub snippets: Vec<SnippetResponse>,
    pub total_pages: i64,
    pub current_page: i64,
}

/// PublicSnippetsResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PublicSnippetsResponse {
    pub success: bool,
    pub snippets: Vec<SnippetResponse>,
}

/// MessageResponse
///
/// Generic `{ success, message }` body used for deletions and every error.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// AccessDeniedResponse
///
/// Body returned when the access decision withholds content. `requires_password`
/// is only set when the client should prompt for a password and retry.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AccessDeniedResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_password: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// UserProfile
///
/// Output schema for `GET /auth/me`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub profile_picture: Option<String>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            profile_picture: user.profile_picture,
        }
    }
}
