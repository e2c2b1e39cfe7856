use std::env;

use thiserror::Error;

const LOCAL_JWT_SECRET: &str = "super-secure-test-secret-value-local";
const DEFAULT_PORT: u16 = 3000;

/// AppConfig
///
/// Holds the application's entire configuration state. Loaded once at startup and
/// shared immutably through `AppState` via `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Postgres connection string. `None` runs the in-memory store (local only).
    pub db_url: Option<String>,
    // Runtime environment marker. Controls the `x-user-id` development bypass.
    pub env: Env,
    // HS256 secret used to verify incoming bearer tokens.
    pub jwt_secret: String,
    pub port: u16,
    // Allowed CORS origin for the browser client. `None` allows any origin.
    pub client_url: Option<String>,
    // Argon2 memory cost in KiB.
    pub hash_memory_kib: u32,
    // Argon2 iteration count.
    pub hash_iterations: u32,
}

/// Env
///
/// Runtime context: `Local` enables development conveniences, `Production` demands
/// every secret explicitly.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    Missing(&'static str),

    #[error("{var} has an invalid value: {value:?}")]
    Invalid { var: &'static str, value: String },
}

impl Default for AppConfig {
    /// Safe, non-panicking values for tests: local mode, in-memory store and a cheap
    /// hashing cost.
    fn default() -> Self {
        Self {
            db_url: None,
            env: Env::Local,
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            port: DEFAULT_PORT,
            client_url: None,
            hash_memory_kib: 1024,
            hash_iterations: 1,
        }
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value.parse().map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    /// Reads the configuration from the environment.
    ///
    /// Production refuses to start without `DATABASE_URL` and `JWT_SECRET`. Local mode
    /// falls back to a known development secret and, without `DATABASE_URL`, to the
    /// in-memory store.
    pub fn load() -> Result<Self, ConfigError> {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let db_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());
        let jwt_secret = env::var("JWT_SECRET").ok().filter(|s| !s.is_empty());

        let (db_url, jwt_secret) = match env {
            Env::Production => (
                Some(db_url.ok_or(ConfigError::Missing("DATABASE_URL"))?),
                jwt_secret.ok_or(ConfigError::Missing("JWT_SECRET"))?,
            ),
            Env::Local => (
                db_url,
                jwt_secret.unwrap_or_else(|| LOCAL_JWT_SECRET.to_string()),
            ),
        };

        let argon_defaults = argon2::Config::default();

        Ok(Self {
            db_url,
            env,
            jwt_secret,
            port: parse_var("PORT", DEFAULT_PORT)?,
            client_url: env::var("CLIENT_URL").ok().filter(|url| !url.is_empty()),
            hash_memory_kib: parse_var("HASH_MEMORY_KIB", argon_defaults.mem_cost)?,
            hash_iterations: parse_var("HASH_ITERATIONS", argon_defaults.time_cost)?,
        })
    }
}
