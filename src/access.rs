//! Snippet access decisions.
//!
//! `resolve_access` is the single place that decides whether a fetch returns
//! content, asks for a password, or is refused. It holds no state and mutates
//! nothing, so repeated calls with the same inputs give the same outcome.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    credential::{CredentialError, CredentialHasher, supplied},
    models::{Exposure, Snippet},
};

/// Why content was withheld.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum DenialReason {
    Private,
    InvalidCredential,
}

impl DenialReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenialReason::Private => "private",
            DenialReason::InvalidCredential => "invalid_credential",
        }
    }
}

/// AccessOutcome
///
/// Result of a single access decision. `CredentialRequired` is a negotiation step,
/// not a failure: the caller should prompt for a password and retry.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessOutcome {
    Granted { snippet: Snippet, is_author: bool },
    CredentialRequired,
    Denied(DenialReason),
}

impl AccessOutcome {
    /// Short label for structured logs.
    pub fn label(&self) -> &'static str {
        match self {
            AccessOutcome::Granted { is_author: true, .. } => "granted_author",
            AccessOutcome::Granted { .. } => "granted",
            AccessOutcome::CredentialRequired => "credential_required",
            AccessOutcome::Denied(reason) => reason.as_str(),
        }
    }
}

/// Decides what `requester` gets back for `snippet`.
///
/// Rules, first match wins:
/// 1. The author always gets the snippet.
/// 2. Private snippets are refused to everyone else.
/// 3. Password-protected unlisted snippets need a non-blank candidate that verifies
///    against the stored hash.
/// 4. Open unlisted and public snippets are returned.
///
/// Only a hasher failure is an error.
pub fn resolve_access(
    snippet: Snippet,
    requester: Option<Uuid>,
    supplied_credential: Option<&str>,
    hasher: &dyn CredentialHasher,
) -> Result<AccessOutcome, CredentialError> {
    if requester == Some(snippet.author_id) {
        return Ok(AccessOutcome::Granted {
            snippet,
            is_author: true,
        });
    }

    match snippet.exposure {
        Exposure::Private => Ok(AccessOutcome::Denied(DenialReason::Private)),
        Exposure::Unlisted if snippet.has_credential() => {
            let Some(candidate) = supplied(supplied_credential) else {
                return Ok(AccessOutcome::CredentialRequired);
            };
            if hasher.verify(candidate, &snippet.credential_hash)? {
                Ok(AccessOutcome::Granted {
                    snippet,
                    is_author: false,
                })
            } else {
                Ok(AccessOutcome::Denied(DenialReason::InvalidCredential))
            }
        }
        Exposure::Unlisted | Exposure::Public => Ok(AccessOutcome::Granted {
            snippet,
            is_author: false,
        }),
    }
}
