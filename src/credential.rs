use std::sync::Arc;

use rand::RngCore;
use thiserror::Error;

use crate::models::Exposure;

const SALT_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("argon2: {0}")]
    Argon2(#[from] argon2::Error),
}

/// CredentialHasher
///
/// One-way password hashing for unlisted snippets. `verify` must compare in constant
/// time; callers run both operations on the blocking pool because they are slow on
/// purpose.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String, CredentialError>;
    fn verify(&self, plaintext: &str, encoded: &str) -> Result<bool, CredentialError>;
}

/// HasherState
///
/// The shared hasher handle stored in `AppState`.
pub type HasherState = Arc<dyn CredentialHasher>;

/// Argon2Hasher
///
/// Argon2id with a random per-hash salt. Output is the PHC-encoded string, so the
/// parameters travel with each hash and can be raised without invalidating old ones.
#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    mem_cost_kib: u32,
    time_cost: u32,
}

impl Argon2Hasher {
    pub fn new(mem_cost_kib: u32, time_cost: u32) -> Self {
        Self {
            mem_cost_kib,
            time_cost,
        }
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        let config = argon2::Config::default();
        Self::new(config.mem_cost, config.time_cost)
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, CredentialError> {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);

        let config = argon2::Config {
            variant: argon2::Variant::Argon2id,
            mem_cost: self.mem_cost_kib,
            time_cost: self.time_cost,
            ..argon2::Config::default()
        };
        Ok(argon2::hash_encoded(plaintext.as_bytes(), &salt, &config)?)
    }

    fn verify(&self, plaintext: &str, encoded: &str) -> Result<bool, CredentialError> {
        Ok(argon2::verify_encoded(encoded, plaintext.as_bytes())?)
    }
}

/// Returns the candidate unchanged unless it is absent or whitespace only.
pub fn supplied(candidate: Option<&str>) -> Option<&str> {
    candidate.filter(|c| !c.trim().is_empty())
}

/// Credential hash for a newly created snippet. Only unlisted snippets with a
/// non-blank password get one.
pub fn credential_for_create(
    exposure: Exposure,
    password: Option<&str>,
    hasher: &dyn CredentialHasher,
) -> Result<String, CredentialError> {
    match (exposure, supplied(password)) {
        (Exposure::Unlisted, Some(password)) => hasher.hash(password),
        _ => Ok(String::new()),
    }
}

/// CredentialChange
///
/// What an update does to the stored hash.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialChange {
    Keep,
    Clear,
    Replace(String),
}

impl std::fmt::Debug for CredentialChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialChange::Keep => f.write_str("Keep"),
            CredentialChange::Clear => f.write_str("Clear"),
            CredentialChange::Replace(_) => f.write_str("Replace(<redacted>)"),
        }
    }
}

impl CredentialChange {
    /// Decides the change from the exposure the snippet will have after the update and
    /// the raw `password` field. `None` means the field was omitted.
    pub fn plan(target: Exposure, password: Option<String>) -> Self {
        if target != Exposure::Unlisted {
            return CredentialChange::Clear;
        }
        match password {
            None => CredentialChange::Keep,
            Some(p) if p.trim().is_empty() => CredentialChange::Clear,
            Some(p) => CredentialChange::Replace(p),
        }
    }

    /// Produces the hash to store given the current one.
    pub fn apply(
        self,
        current: &str,
        hasher: &dyn CredentialHasher,
    ) -> Result<String, CredentialError> {
        match self {
            CredentialChange::Keep => Ok(current.to_string()),
            CredentialChange::Clear => Ok(String::new()),
            CredentialChange::Replace(password) => hasher.hash(&password),
        }
    }
}
