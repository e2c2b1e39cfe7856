use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{Exposure, PublicId, Snippet, SnippetDraft, SnippetRow, User},
};

/// How many fresh public ids to try before giving up on an insert.
const MAX_PUBLIC_ID_ATTEMPTS: usize = 8;

const SNIPPET_COLUMNS: &str = "id, public_id, name, content, flavor, language, exposure, \
     credential_hash, author_id, created_at, updated_at";

/// Page
///
/// A 1-based page request for the author listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: i64,
    pub size: i64,
}

impl Page {
    /// Rows to skip. Saturates for huge page numbers so they yield an empty page.
    pub fn offset(&self) -> i64 {
        (self.number.max(1) - 1).saturating_mul(self.size.max(0))
    }
}

/// Repository Trait
///
/// The persistence contract the handlers depend on. Ownership checks live in the
/// handlers so they can tell "missing" from "not yours"; the SQL implementation still
/// guards replacements by author as a second line.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError>;
    async fn create_user(&self, user: User) -> Result<User, AppError>;
    async fn update_username(&self, id: Uuid, username: &str) -> Result<Option<User>, AppError>;

    // --- Snippets ---
    /// Inserts the draft under a freshly generated public id that has never been issued.
    async fn create_snippet(&self, draft: SnippetDraft) -> Result<Snippet, AppError>;
    async fn find_by_public_id(&self, public_id: &PublicId) -> Result<Option<Snippet>, AppError>;
    /// Whole-record replace keyed by internal id; bumps `updated_at`.
    async fn replace_snippet(&self, snippet: Snippet) -> Result<Option<Snippet>, AppError>;
    /// Deletes the snippet and retires its public id for good.
    async fn delete_snippet(&self, public_id: &PublicId) -> Result<bool, AppError>;
    /// One page of an author's snippets, newest first, plus the author's total count.
    async fn get_user_snippets(
        &self,
        author_id: Uuid,
        page: Page,
    ) -> Result<(Vec<Snippet>, i64), AppError>;
    /// The newest public snippets.
    async fn get_public_snippets(&self, limit: i64) -> Result<Vec<Snippet>, AppError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. Schema lives in `migrations/`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_snippets(rows: Vec<SnippetRow>) -> Result<Vec<Snippet>, AppError> {
    rows.into_iter().map(Snippet::try_from).collect()
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, username, profile_picture, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, user: User) -> Result<User, AppError> {
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, username, profile_picture, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, username, profile_picture, created_at
            "#,
        )
        .bind(user.id)
        .bind(user.email)
        .bind(user.username)
        .bind(user.profile_picture)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn update_username(&self, id: Uuid, username: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET username = $2 WHERE id = $1
            RETURNING id, email, username, profile_picture, created_at
            "#,
        )
        .bind(id)
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// create_snippet
    ///
    /// The insert is skipped when the candidate id is live (`ON CONFLICT`) or retired
    /// (`NOT EXISTS`), in which case another id is drawn.
    async fn create_snippet(&self, draft: SnippetDraft) -> Result<Snippet, AppError> {
        let query = format!(
            r#"
            INSERT INTO snippets ({SNIPPET_COLUMNS})
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW()
            WHERE NOT EXISTS (SELECT 1 FROM retired_public_ids WHERE public_id = $2)
            ON CONFLICT (public_id) DO NOTHING
            RETURNING {SNIPPET_COLUMNS}
            "#
        );

        for _ in 0..MAX_PUBLIC_ID_ATTEMPTS {
            let public_id = PublicId::generate();
            let row = sqlx::query_as::<_, SnippetRow>(&query)
                .bind(Uuid::new_v4())
                .bind(public_id.as_str())
                .bind(&draft.name)
                .bind(&draft.content)
                .bind(draft.flavor.as_str())
                .bind(draft.language.as_deref())
                .bind(draft.exposure.as_str())
                .bind(&draft.credential_hash)
                .bind(draft.author_id)
                .fetch_optional(&self.pool)
                .await?;

            match row {
                Some(row) => return Snippet::try_from(row),
                None => tracing::debug!(%public_id, "public id collision, retrying"),
            }
        }

        Err(AppError::Internal("could not allocate a unique public id".into()))
    }

    async fn find_by_public_id(&self, public_id: &PublicId) -> Result<Option<Snippet>, AppError> {
        let query = format!("SELECT {SNIPPET_COLUMNS} FROM snippets WHERE public_id = $1");
        sqlx::query_as::<_, SnippetRow>(&query)
            .bind(public_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Snippet::try_from)
            .transpose()
    }

    async fn replace_snippet(&self, snippet: Snippet) -> Result<Option<Snippet>, AppError> {
        let query = format!(
            r#"
            UPDATE snippets
            SET name = $3,
                content = $4,
                flavor = $5,
                language = $6,
                exposure = $7,
                credential_hash = $8,
                updated_at = NOW()
            WHERE id = $1 AND author_id = $2
            RETURNING {SNIPPET_COLUMNS}
            "#
        );
        sqlx::query_as::<_, SnippetRow>(&query)
            .bind(snippet.id)
            .bind(snippet.author_id)
            .bind(&snippet.name)
            .bind(&snippet.content)
            .bind(snippet.flavor.as_str())
            .bind(snippet.language.as_deref())
            .bind(snippet.exposure.as_str())
            .bind(&snippet.credential_hash)
            .fetch_optional(&self.pool)
            .await?
            .map(Snippet::try_from)
            .transpose()
    }

    async fn delete_snippet(&self, public_id: &PublicId) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM snippets WHERE public_id = $1")
            .bind(public_id.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        if deleted {
            sqlx::query(
                "INSERT INTO retired_public_ids (public_id) VALUES ($1) ON CONFLICT DO NOTHING",
            )
            .bind(public_id.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(deleted)
    }

    async fn get_user_snippets(
        &self,
        author_id: Uuid,
        page: Page,
    ) -> Result<(Vec<Snippet>, i64), AppError> {
        let query = format!(
            "SELECT {SNIPPET_COLUMNS} FROM snippets WHERE author_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, SnippetRow>(&query)
            .bind(author_id)
            .bind(page.size)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM snippets WHERE author_id = $1")
            .bind(author_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((into_snippets(rows)?, total))
    }

    async fn get_public_snippets(&self, limit: i64) -> Result<Vec<Snippet>, AppError> {
        let query = format!(
            "SELECT {SNIPPET_COLUMNS} FROM snippets WHERE exposure = $1 \
             ORDER BY created_at DESC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, SnippetRow>(&query)
            .bind(Exposure::Public.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        into_snippets(rows)
    }
}

/// InMemoryRepository
///
/// `Repository` kept in process memory. Used by the test suite and by local runs
/// without `DATABASE_URL`; it honors the same public-id retirement rule as Postgres.
#[derive(Default)]
pub struct InMemoryRepository {
    users: RwLock<HashMap<Uuid, User>>,
    snippets: RwLock<SnippetTable>,
}

#[derive(Default)]
struct SnippetTable {
    by_public_id: HashMap<PublicId, Snippet>,
    // Every public id ever handed out, including deleted ones.
    issued: HashSet<PublicId>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn create_user(&self, user: User) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.id == user.id || u.email == user.email) {
            return Err(AppError::Validation("user already exists".into()));
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_username(&self, id: Uuid, username: &str) -> Result<Option<User>, AppError> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|user| {
            user.username = Some(username.to_string());
            user.clone()
        }))
    }

    async fn create_snippet(&self, draft: SnippetDraft) -> Result<Snippet, AppError> {
        let mut table = self.snippets.write().await;

        let public_id = (0..MAX_PUBLIC_ID_ATTEMPTS)
            .map(|_| PublicId::generate())
            .find(|candidate| !table.issued.contains(candidate))
            .ok_or_else(|| AppError::Internal("could not allocate a unique public id".into()))?;

        let now = Utc::now();
        let snippet = Snippet {
            id: Uuid::new_v4(),
            public_id: public_id.clone(),
            name: draft.name,
            content: draft.content,
            flavor: draft.flavor,
            language: draft.language,
            exposure: draft.exposure,
            credential_hash: draft.credential_hash,
            author_id: draft.author_id,
            created_at: now,
            updated_at: now,
        };

        table.issued.insert(public_id.clone());
        table.by_public_id.insert(public_id, snippet.clone());
        Ok(snippet)
    }

    async fn find_by_public_id(&self, public_id: &PublicId) -> Result<Option<Snippet>, AppError> {
        Ok(self.snippets.read().await.by_public_id.get(public_id).cloned())
    }

    async fn replace_snippet(&self, snippet: Snippet) -> Result<Option<Snippet>, AppError> {
        let mut table = self.snippets.write().await;
        let Some(stored) = table
            .by_public_id
            .get_mut(&snippet.public_id)
            .filter(|stored| stored.id == snippet.id && stored.author_id == snippet.author_id)
        else {
            return Ok(None);
        };

        *stored = Snippet {
            public_id: stored.public_id.clone(),
            created_at: stored.created_at,
            updated_at: Utc::now(),
            ..snippet
        };
        Ok(Some(stored.clone()))
    }

    async fn delete_snippet(&self, public_id: &PublicId) -> Result<bool, AppError> {
        let mut table = self.snippets.write().await;
        Ok(table.by_public_id.remove(public_id).is_some())
    }

    async fn get_user_snippets(
        &self,
        author_id: Uuid,
        page: Page,
    ) -> Result<(Vec<Snippet>, i64), AppError> {
        let table = self.snippets.read().await;
        let mut owned: Vec<&Snippet> = table
            .by_public_id
            .values()
            .filter(|s| s.author_id == author_id)
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = owned.len() as i64;
        let items = owned
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(page.size.max(0) as usize)
            .cloned()
            .collect();
        Ok((items, total))
    }

    async fn get_public_snippets(&self, limit: i64) -> Result<Vec<Snippet>, AppError> {
        let table = self.snippets.read().await;
        let mut public: Vec<&Snippet> = table
            .by_public_id
            .values()
            .filter(|s| s.exposure == Exposure::Public)
            .collect();
        public.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(public
            .into_iter()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
