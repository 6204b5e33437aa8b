//! `PostgreSQL` repository implementation.
//!
//! [`PostgresStore`] implements every repository trait over a shared
//! `sqlx::PgPool`. Task patches run inside a `sqlx::Transaction` and lock
//! the task row with `SELECT ... FOR UPDATE`; a transaction that is dropped
//! without being committed is rolled back by `sqlx`.
//!
//! # Table Schema
//!
//! ```sql
//! CREATE TABLE users (
//!     id BIGSERIAL PRIMARY KEY,
//!     username TEXT NOT NULL,
//!     token TEXT NOT NULL UNIQUE,
//!     created_at TIMESTAMPTZ NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE tasks (
//!     id BIGSERIAL PRIMARY KEY,
//!     user_id BIGINT NOT NULL REFERENCES users (id),
//!     name TEXT NOT NULL,
//!     description TEXT,
//!     progression BIGINT NOT NULL DEFAULT 0,
//!     created_at TIMESTAMPTZ NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE comments (
//!     id BIGSERIAL PRIMARY KEY,
//!     task_id BIGINT NOT NULL REFERENCES tasks (id),
//!     user_id BIGINT NOT NULL REFERENCES users (id),
//!     content TEXT NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL
//! );
//! ```

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::{
    Comment, CommentId, FieldUpdate, NewComment, NewTask, NewUser, Task, TaskId, Timestamp, User,
    UserId, UserSummary,
};
use crate::infrastructure::{
    CommentRepository, RepositoryError, TaskRepository, TaskTransaction, UserRepository,
};

/// Idempotent schema bootstrap, run once at startup.
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    username TEXT NOT NULL,
    token TEXT NOT NULL UNIQUE,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL REFERENCES users (id),
    name TEXT NOT NULL,
    description TEXT,
    progression BIGINT NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS comments (
    id BIGSERIAL PRIMARY KEY,
    task_id BIGINT NOT NULL REFERENCES tasks (id),
    user_id BIGINT NOT NULL REFERENCES users (id),
    content TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_user_id ON tasks (user_id);
CREATE INDEX IF NOT EXISTS idx_comments_task_id ON comments (task_id);
CREATE INDEX IF NOT EXISTS idx_comments_user_id ON comments (user_id);
";

const TASK_COLUMNS: &str = "t.id, t.user_id, u.username, t.name, t.description, \
     t.progression, t.created_at, t.updated_at";

const COMMENT_COLUMNS: &str = "c.id, c.task_id, c.user_id, u.username, c.content, \
     c.created_at, c.updated_at";

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: i64,
    user_id: i64,
    username: String,
    name: String,
    description: Option<String>,
    progression: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        Self {
            id: TaskId::new(row.id),
            owner: UserSummary::new(UserId::new(row.user_id), row.username),
            name: row.name,
            description: row.description,
            progression: row.progression,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    token: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::new(row.id),
            username: row.username,
            token: row.token,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CommentRow {
    id: i64,
    task_id: i64,
    user_id: i64,
    username: String,
    content: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Self {
            id: CommentId::new(row.id),
            task_id: TaskId::new(row.task_id),
            author: UserSummary::new(UserId::new(row.user_id), row.username),
            content: row.content,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        }
    }
}

/// Maps a foreign key violation to `NotFound`, anything else to `DatabaseError`.
fn insert_error(error: sqlx::Error, entity: &str) -> RepositoryError {
    match &error {
        sqlx::Error::Database(database_error) if database_error.is_foreign_key_violation() => {
            RepositoryError::NotFound(format!("{entity} referenced by the new row"))
        }
        _ => RepositoryError::from(error),
    }
}

// =============================================================================
// PostgreSQL Store
// =============================================================================

/// `PostgreSQL` implementation of every repository trait.
///
/// # Example
///
/// ```ignore
/// let pool = PgPool::connect("postgres://localhost/tasks").await?;
/// let store = PostgresStore::new(pool);
/// store.ensure_schema().await?;
/// ```
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::DatabaseError` if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, RepositoryError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(RepositoryError::from)?;
        Ok(Self::new(pool))
    }

    /// Creates the tables if they are absent.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::DatabaseError` if a statement fails.
    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(())
    }
}

// =============================================================================
// Task Repository
// =============================================================================

impl TaskRepository for PostgresStore {
    fn find_by_id(&self, id: TaskId) -> BoxFuture<'_, Result<Option<Task>, RepositoryError>> {
        Box::pin(async move {
            let row: Option<TaskRow> = sqlx::query_as(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks t JOIN users u ON u.id = t.user_id \
                 WHERE t.id = $1"
            ))
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
            Ok(row.map(Task::from))
        })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<Task>, RepositoryError>> {
        Box::pin(async move {
            let rows: Vec<TaskRow> = sqlx::query_as(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks t JOIN users u ON u.id = t.user_id \
                 ORDER BY t.created_at ASC, t.id ASC"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
            Ok(rows.into_iter().map(Task::from).collect())
        })
    }

    fn list_by_owner(&self, owner: UserId) -> BoxFuture<'_, Result<Vec<Task>, RepositoryError>> {
        Box::pin(async move {
            let rows: Vec<TaskRow> = sqlx::query_as(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks t JOIN users u ON u.id = t.user_id \
                 WHERE t.user_id = $1 ORDER BY t.created_at ASC, t.id ASC"
            ))
            .bind(owner.value())
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
            Ok(rows.into_iter().map(Task::from).collect())
        })
    }

    fn insert(&self, task: NewTask) -> BoxFuture<'_, Result<Task, RepositoryError>> {
        Box::pin(async move {
            let now = Timestamp::now();
            let row: TaskRow = sqlx::query_as(
                "WITH inserted AS ( \
                     INSERT INTO tasks \
                         (user_id, name, description, progression, created_at, updated_at) \
                     VALUES ($1, $2, $3, $4, $5, $5) RETURNING * \
                 ) \
                 SELECT t.id, t.user_id, u.username, t.name, t.description, \
                        t.progression, t.created_at, t.updated_at \
                 FROM inserted t JOIN users u ON u.id = t.user_id",
            )
            .bind(task.owner.value())
            .bind(&task.name)
            .bind(task.description.as_deref())
            .bind(task.progression)
            .bind(*now.as_datetime())
            .fetch_one(&self.pool)
            .await
            .map_err(|error| insert_error(error, &format!("user {}", task.owner)))?;
            Ok(Task::from(row))
        })
    }

    fn begin(&self) -> BoxFuture<'_, Result<Box<dyn TaskTransaction>, RepositoryError>> {
        Box::pin(async move {
            let transaction = self.pool.begin().await.map_err(RepositoryError::from)?;
            let transaction: Box<dyn TaskTransaction> =
                Box::new(PostgresTaskTransaction { transaction });
            Ok(transaction)
        })
    }
}

// =============================================================================
// Task Transaction
// =============================================================================

struct PostgresTaskTransaction {
    transaction: Transaction<'static, Postgres>,
}

impl TaskTransaction for PostgresTaskTransaction {
    fn lock(&mut self, id: TaskId) -> BoxFuture<'_, Result<Option<Task>, RepositoryError>> {
        Box::pin(async move {
            let row: Option<TaskRow> = sqlx::query_as(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks t JOIN users u ON u.id = t.user_id \
                 WHERE t.id = $1 FOR UPDATE OF t"
            ))
            .bind(id.value())
            .fetch_optional(&mut *self.transaction)
            .await
            .map_err(RepositoryError::from)?;
            Ok(row.map(Task::from))
        })
    }

    fn update_field(
        &mut self,
        id: TaskId,
        update: FieldUpdate,
    ) -> BoxFuture<'_, Result<(), RepositoryError>> {
        Box::pin(async move {
            let query = match &update {
                FieldUpdate::Name(name) => {
                    sqlx::query::<Postgres>("UPDATE tasks SET name = $1 WHERE id = $2")
                        .bind(name.clone())
                }
                FieldUpdate::Description(description) => {
                    sqlx::query::<Postgres>("UPDATE tasks SET description = $1 WHERE id = $2")
                        .bind(description.clone())
                }
                FieldUpdate::Progression(progression) => {
                    sqlx::query::<Postgres>("UPDATE tasks SET progression = $1 WHERE id = $2")
                        .bind(*progression)
                }
            };
            let result = query
                .bind(id.value())
                .execute(&mut *self.transaction)
                .await
                .map_err(RepositoryError::from)?;
            if result.rows_affected() == 0 {
                return Err(RepositoryError::NotFound(format!("task {id}")));
            }
            Ok(())
        })
    }

    fn touch(&mut self, id: TaskId, at: Timestamp) -> BoxFuture<'_, Result<(), RepositoryError>> {
        Box::pin(async move {
            let result = sqlx::query("UPDATE tasks SET updated_at = $1 WHERE id = $2")
                .bind(*at.as_datetime())
                .bind(id.value())
                .execute(&mut *self.transaction)
                .await
                .map_err(RepositoryError::from)?;
            if result.rows_affected() == 0 {
                return Err(RepositoryError::NotFound(format!("task {id}")));
            }
            Ok(())
        })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<(), RepositoryError>> {
        Box::pin(async move {
            self.transaction
                .commit()
                .await
                .map_err(RepositoryError::from)
        })
    }

    fn rollback(self: Box<Self>) -> BoxFuture<'static, Result<(), RepositoryError>> {
        Box::pin(async move {
            self.transaction
                .rollback()
                .await
                .map_err(RepositoryError::from)
        })
    }
}

// =============================================================================
// User Repository
// =============================================================================

impl UserRepository for PostgresStore {
    fn find_by_token<'a>(
        &'a self,
        token: &'a str,
    ) -> BoxFuture<'a, Result<Option<User>, RepositoryError>> {
        Box::pin(async move {
            let row: Option<UserRow> = sqlx::query_as(
                "SELECT id, username, token, created_at, updated_at FROM users WHERE token = $1",
            )
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
            Ok(row.map(User::from))
        })
    }

    fn insert(&self, user: NewUser) -> BoxFuture<'_, Result<User, RepositoryError>> {
        Box::pin(async move {
            let now = Timestamp::now();
            let row: UserRow = sqlx::query_as(
                "INSERT INTO users (username, token, created_at, updated_at) \
                 VALUES ($1, $2, $3, $3) \
                 RETURNING id, username, token, created_at, updated_at",
            )
            .bind(&user.username)
            .bind(&user.token)
            .bind(*now.as_datetime())
            .fetch_one(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
            Ok(User::from(row))
        })
    }
}

// =============================================================================
// Comment Repository
// =============================================================================

impl CommentRepository for PostgresStore {
    fn insert(&self, comment: NewComment) -> BoxFuture<'_, Result<Comment, RepositoryError>> {
        Box::pin(async move {
            let now = Timestamp::now();
            let row: CommentRow = sqlx::query_as(
                "WITH inserted AS ( \
                     INSERT INTO comments (task_id, user_id, content, created_at, updated_at) \
                     VALUES ($1, $2, $3, $4, $4) RETURNING * \
                 ) \
                 SELECT c.id, c.task_id, c.user_id, u.username, c.content, \
                        c.created_at, c.updated_at \
                 FROM inserted c JOIN users u ON u.id = c.user_id",
            )
            .bind(comment.task_id.value())
            .bind(comment.author.value())
            .bind(&comment.content)
            .bind(*now.as_datetime())
            .fetch_one(&self.pool)
            .await
            .map_err(|error| insert_error(error, &format!("task {}", comment.task_id)))?;
            Ok(Comment::from(row))
        })
    }

    fn list_by_task(
        &self,
        task_id: TaskId,
    ) -> BoxFuture<'_, Result<Vec<Comment>, RepositoryError>> {
        Box::pin(async move {
            let rows: Vec<CommentRow> = sqlx::query_as(&format!(
                "SELECT {COMMENT_COLUMNS} FROM comments c JOIN users u ON u.id = c.user_id \
                 WHERE c.task_id = $1 ORDER BY c.created_at ASC, c.id ASC"
            ))
            .bind(task_id.value())
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
            Ok(rows.into_iter().map(Comment::from).collect())
        })
    }

    fn list_by_author(
        &self,
        author: UserId,
    ) -> BoxFuture<'_, Result<Vec<Comment>, RepositoryError>> {
        Box::pin(async move {
            let rows: Vec<CommentRow> = sqlx::query_as(&format!(
                "SELECT {COMMENT_COLUMNS} FROM comments c JOIN users u ON u.id = c.user_id \
                 WHERE c.user_id = $1 ORDER BY c.created_at ASC, c.id ASC"
            ))
            .bind(author.value())
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
            Ok(rows.into_iter().map(Comment::from).collect())
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
