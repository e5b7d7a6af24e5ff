use crate::error::TodoError;
use anyhow::{Context as _, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteConnectOptions, ConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};

/// Default timeout for individual SQLite queries.
/// Prevents hung queries from blocking the daemon indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Execute a future with the standard query timeout.
/// Returns an error if the operation takes longer than `QUERY_TIMEOUT`.
async fn with_timeout<T>(
    fut: impl std::future::Future<Output = Result<T, TodoError>>,
) -> Result<T, TodoError> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(TodoError::Timeout(QUERY_TIMEOUT.as_secs())),
    }
}

// ─── Row type ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct TodoRow {
    pub id: i64,
    pub title: String,
    /// NULL is a stored value here, distinct from "not sent" in an update.
    pub description: Option<String>,
    pub completed: bool,
    /// RFC 3339 UTC, set once at insert.
    pub created_at: String,
    /// RFC 3339 UTC, refreshed on every successful update.
    pub updated_at: String,
}

/// Field-level partial update. The outer `Option` is presence on the wire;
/// for `description` the inner `Option` is the stored value, so
/// `Some(None)` clears the field while `None` leaves it untouched.
#[derive(Debug, Default, Clone)]
pub struct TodoPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub completed: Option<bool>,
}

// ─── Storage ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        Self::new_with_slow_query(data_dir, 0).await
    }

    /// Create storage with slow-query logging enabled.
    ///
    /// `slow_query_ms` is the threshold in milliseconds — queries exceeding it are
    /// logged at WARN level. Set to 0 to disable slow-query logging.
    pub async fn new_with_slow_query(data_dir: &Path, slow_query_ms: u64) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("todod.db");
        let mut opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        if slow_query_ms > 0 {
            opts = opts.log_slow_statements(
                log::LevelFilter::Warn,
                std::time::Duration::from_millis(slow_query_ms),
            );
        }

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Return a clone of the connection pool (cheap — Arc-backed).
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::migrate!("src/store/migrations")
            .run(pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    // ─── Todos ────────────────────────────────────────────────────────────────

    /// Insert a new todo. Both timestamps come from the same clock read, so
    /// a freshly created row satisfies `created_at == updated_at`.
    pub async fn create_todo(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<TodoRow, TodoError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO todos (title, description, completed, created_at, updated_at)
             VALUES (?, ?, 0, ?, ?)",
        )
        .bind(title)
        .bind(description)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.fetch_todo(result.last_insert_rowid()).await
    }

    pub async fn list_todos(&self) -> Result<Vec<TodoRow>, TodoError> {
        with_timeout(async {
            Ok(sqlx::query_as("SELECT * FROM todos ORDER BY id")
                .fetch_all(&self.pool)
                .await?)
        })
        .await
    }

    pub async fn get_todo(&self, id: i64) -> Result<Option<TodoRow>, TodoError> {
        Ok(sqlx::query_as("SELECT * FROM todos WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Apply a partial update. Fields absent from the patch keep their stored
    /// value; present fields (including an explicit NULL description)
    /// overwrite it. `updated_at` is refreshed even when no field changed.
    pub async fn update_todo(&self, id: i64, patch: &TodoPatch) -> Result<TodoRow, TodoError> {
        let current = self.get_todo(id).await?.ok_or(TodoError::NotFound(id))?;

        let title = patch.title.as_deref().unwrap_or(&current.title);
        let description = match &patch.description {
            Some(explicit) => explicit.as_deref(),
            None => current.description.as_deref(),
        };
        let completed = patch.completed.unwrap_or(current.completed);
        let now = Utc::now().to_rfc3339();

        let affected = sqlx::query(
            "UPDATE todos SET title = ?, description = ?, completed = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(title)
        .bind(description)
        .bind(completed)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        // Row deleted between the read and the write — still NotFound,
        // never a fabricated result.
        if affected == 0 {
            return Err(TodoError::NotFound(id));
        }

        self.fetch_todo(id).await
    }

    /// Hard delete. The affected-row count is checked — deleting a dead id
    /// is `NotFound`, not a silent no-op.
    pub async fn delete_todo(&self, id: i64) -> Result<(), TodoError> {
        let affected = sqlx::query("DELETE FROM todos WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(TodoError::NotFound(id));
        }
        Ok(())
    }

    pub async fn count_todos(&self) -> Result<i64, TodoError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM todos")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    async fn fetch_todo(&self, id: i64) -> Result<TodoRow, TodoError> {
        // RowNotFound here means the row vanished right after our own write —
        // that is a store fault, not a client-visible NotFound.
        Ok(sqlx::query_as("SELECT * FROM todos WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    async fn test_storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path()).await.unwrap();
        (dir, storage)
    }

    fn parsed(ts: &str) -> DateTime<chrono::FixedOffset> {
        DateTime::parse_from_rfc3339(ts).unwrap()
    }

    #[tokio::test]
    async fn create_sets_defaults() {
        let (_dir, storage) = test_storage().await;
        let todo = storage.create_todo("Buy milk", None).await.unwrap();
        assert!(todo.id >= 1);
        assert_eq!(todo.title, "Buy milk");
        assert_eq!(todo.description, None);
        assert!(!todo.completed);
        assert_eq!(todo.created_at, todo.updated_at);
    }

    #[tokio::test]
    async fn list_returns_rows_in_insert_order() {
        let (_dir, storage) = test_storage().await;
        assert!(storage.list_todos().await.unwrap().is_empty());

        storage.create_todo("one", None).await.unwrap();
        storage.create_todo("two", Some("second")).await.unwrap();
        storage.create_todo("three", None).await.unwrap();

        let todos = storage.list_todos().await.unwrap();
        let titles: Vec<&str> = todos.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["one", "two", "three"]);
    }

    #[tokio::test]
    async fn update_merges_omitted_fields() {
        let (_dir, storage) = test_storage().await;
        let todo = storage
            .create_todo("Buy milk", Some("2 liters"))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let patch = TodoPatch {
            completed: Some(true),
            ..Default::default()
        };
        let updated = storage.update_todo(todo.id, &patch).await.unwrap();

        assert_eq!(updated.title, "Buy milk");
        assert_eq!(updated.description.as_deref(), Some("2 liters"));
        assert!(updated.completed);
        assert_eq!(updated.created_at, todo.created_at);
        assert!(parsed(&updated.updated_at) > parsed(&todo.updated_at));
    }

    #[tokio::test]
    async fn update_with_explicit_null_clears_description() {
        let (_dir, storage) = test_storage().await;
        let todo = storage.create_todo("Buy milk", Some("skim")).await.unwrap();

        // Omitted description stays put
        let kept = storage
            .update_todo(todo.id, &TodoPatch::default())
            .await
            .unwrap();
        assert_eq!(kept.description.as_deref(), Some("skim"));

        // Explicit null clears it
        let patch = TodoPatch {
            description: Some(None),
            ..Default::default()
        };
        let cleared = storage.update_todo(todo.id, &patch).await.unwrap();
        assert_eq!(cleared.description, None);
    }

    #[tokio::test]
    async fn empty_update_still_refreshes_updated_at() {
        let (_dir, storage) = test_storage().await;
        let todo = storage.create_todo("tick", None).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let updated = storage
            .update_todo(todo.id, &TodoPatch::default())
            .await
            .unwrap();
        assert!(parsed(&updated.updated_at) > parsed(&todo.updated_at));
        assert_eq!(updated.created_at, todo.created_at);
    }

    #[tokio::test]
    async fn update_missing_id_is_not_found() {
        let (_dir, storage) = test_storage().await;
        let err = storage
            .update_todo(42, &TodoPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TodoError::NotFound(42)));
        assert_eq!(storage.count_todos().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_missing_id_is_not_found_and_store_unchanged() {
        let (_dir, storage) = test_storage().await;
        storage.create_todo("survivor", None).await.unwrap();

        let err = storage.delete_todo(999).await.unwrap_err();
        assert!(matches!(err, TodoError::NotFound(999)));
        assert_eq!(storage.count_todos().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_middle_leaves_neighbors_intact() {
        let (_dir, storage) = test_storage().await;
        let a = storage.create_todo("a", None).await.unwrap();
        let b = storage.create_todo("b", None).await.unwrap();
        let c = storage.create_todo("c", None).await.unwrap();

        storage.delete_todo(b.id).await.unwrap();

        let todos = storage.list_todos().await.unwrap();
        assert_eq!(todos.len(), 2);
        assert_eq!(todos[0].id, a.id);
        assert_eq!(todos[0].title, "a");
        assert_eq!(todos[1].id, c.id);
        assert_eq!(todos[1].title, "c");
    }

    #[tokio::test]
    async fn ids_are_never_reused_after_delete() {
        let (_dir, storage) = test_storage().await;
        let first = storage.create_todo("ephemeral", None).await.unwrap();
        storage.delete_todo(first.id).await.unwrap();

        let second = storage.create_todo("successor", None).await.unwrap();
        assert!(second.id > first.id);
    }
}
