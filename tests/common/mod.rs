#![allow(dead_code)]

use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use snippet_share::{
    AppConfig, AppState, Argon2Hasher, InMemoryRepository,
    auth::Claims,
    models::{Exposure, Flavor, PublicId, Snippet, User},
    repository::Repository,
};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Cheap argon2 parameters so the suite stays fast.
pub fn test_hasher() -> Argon2Hasher {
    Argon2Hasher::new(1024, 1)
}

/// State over a fresh in-memory repository. The concrete handle is returned too so
/// tests can seed and inspect it.
pub fn test_state() -> (AppState, Arc<InMemoryRepository>) {
    let repo = Arc::new(InMemoryRepository::new());
    let state = AppState {
        repo: repo.clone(),
        hasher: Arc::new(test_hasher()),
        config: AppConfig::default(),
    };
    (state, repo)
}

pub async fn seed_user(repo: &InMemoryRepository, email: &str) -> User {
    repo.create_user(User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        username: None,
        profile_picture: None,
        created_at: Utc::now(),
    })
    .await
    .expect("seed user")
}

/// A snippet record as the repository would return it.
pub fn snippet(exposure: Exposure, credential_hash: &str, author_id: Uuid) -> Snippet {
    Snippet {
        id: Uuid::new_v4(),
        public_id: PublicId::generate(),
        name: "notes".to_string(),
        content: "hello world".to_string(),
        flavor: Flavor::Plain,
        language: None,
        exposure,
        credential_hash: credential_hash.to_string(),
        author_id,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn now_secs() -> usize {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize
}

/// Mints an HS256 token for `user_id` expiring `ttl_secs` from now (negative = expired).
pub fn token_for(user_id: Uuid, secret: &str, ttl_secs: i64) -> String {
    let now = now_secs();
    let claims = Claims {
        sub: user_id,
        exp: (now as i64 + ttl_secs) as usize,
        iat: now,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}
