//! Last indexed commit per repository.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::RwLock;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::{Result, StoreError};
use crate::vector_store::BoxFuture;

pub trait CheckpointStore: Send + Sync {
    fn get(&self, repo: &str) -> BoxFuture<'_, Result<Option<String>>>;

    fn set(&self, repo: &str, commit_sha: &str) -> BoxFuture<'_, Result<()>>;
}

#[derive(Debug, Clone)]
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    /// Open (or create) the `SQLite` database and run migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub async fn open(path: &str) -> Result<Self> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let opts = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(if path == ":memory:" { 1 } else { 4 })
            .connect_with(opts)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn get(&self, repo: &str) -> BoxFuture<'_, Result<Option<String>>> {
        let repo = repo.to_owned();
        Box::pin(async move {
            let row: Option<(String,)> =
                sqlx::query_as("SELECT commit_sha FROM index_checkpoints WHERE repo = ?")
                    .bind(&repo)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row.map(|(sha,)| sha))
        })
    }

    fn set(&self, repo: &str, commit_sha: &str) -> BoxFuture<'_, Result<()>> {
        let repo = repo.to_owned();
        let commit_sha = commit_sha.to_owned();
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO index_checkpoints (repo, commit_sha, updated_at) \
                 VALUES (?, ?, datetime('now')) \
                 ON CONFLICT(repo) DO UPDATE SET \
                 commit_sha = excluded.commit_sha, updated_at = excluded.updated_at",
            )
            .bind(&repo)
            .bind(&commit_sha)
            .execute(&self.pool)
            .await?;
            tracing::debug!(repo = %repo, commit_sha = %commit_sha, "checkpoint stored");
            Ok(())
        })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_checkpoint(repo: &str, commit_sha: &str) -> Self {
        let store = Self::default();
        if let Ok(mut values) = store.values.write() {
            values.insert(repo.to_owned(), commit_sha.to_owned());
        }
        store
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn get(&self, repo: &str) -> BoxFuture<'_, Result<Option<String>>> {
        let repo = repo.to_owned();
        Box::pin(async move {
            let values = self
                .values
                .read()
                .map_err(|e| StoreError::Other(e.to_string()))?;
            Ok(values.get(&repo).cloned())
        })
    }

    fn set(&self, repo: &str, commit_sha: &str) -> BoxFuture<'_, Result<()>> {
        let repo = repo.to_owned();
        let commit_sha = commit_sha.to_owned();
        Box::pin(async move {
            let mut values = self
                .values
                .write()
                .map_err(|e| StoreError::Other(e.to_string()))?;
            values.insert(repo, commit_sha);
            Ok(())
        })
    }
}
