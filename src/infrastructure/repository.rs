//! Repository traits for domain entities.
//!
//! Every method returns a boxed future so the traits stay object safe and
//! can be shared as `Arc<dyn _>` between handlers. Implementations live in
//! [`super::in_memory`] and [`super::postgres`].

use futures::future::BoxFuture;
use thiserror::Error;

use crate::domain::{
    Comment, FieldUpdate, NewComment, NewTask, NewUser, Task, TaskId, Timestamp, User, UserId,
};

// =============================================================================
// Repository Error
// =============================================================================

/// Errors that can occur during repository operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// A referenced entity does not exist.
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Database connection or statement error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Failure raised on purpose by a fault-injected store.
    #[error("Injected failure: {0}")]
    InjectedFailure(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        Self::DatabaseError(error.to_string())
    }
}

// =============================================================================
// Task Repository
// =============================================================================

/// Repository trait for Task entities.
pub trait TaskRepository: Send + Sync {
    /// Finds a task by its ID.
    ///
    /// Returns `Ok(None)` if no such task exists.
    fn find_by_id(&self, id: TaskId) -> BoxFuture<'_, Result<Option<Task>, RepositoryError>>;

    /// Lists every task, oldest first.
    fn list(&self) -> BoxFuture<'_, Result<Vec<Task>, RepositoryError>>;

    /// Lists the tasks owned by `owner`, oldest first.
    fn list_by_owner(&self, owner: UserId) -> BoxFuture<'_, Result<Vec<Task>, RepositoryError>>;

    /// Inserts a task and returns it as stored.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the owner does not exist.
    fn insert(&self, task: NewTask) -> BoxFuture<'_, Result<Task, RepositoryError>>;

    /// Opens a transaction for field-level task updates.
    fn begin(&self) -> BoxFuture<'_, Result<Box<dyn TaskTransaction>, RepositoryError>>;
}

/// An open unit of work against the task store.
///
/// Nothing written through a transaction is visible to other readers until
/// [`commit`](Self::commit) succeeds. Dropping a transaction without
/// committing discards it, which is what happens when a request is
/// cancelled mid-flight.
pub trait TaskTransaction: Send {
    /// Re-reads a task and holds it against concurrent writers until the
    /// transaction ends.
    fn lock(&mut self, id: TaskId) -> BoxFuture<'_, Result<Option<Task>, RepositoryError>>;

    /// Replaces one whitelisted field.
    fn update_field(
        &mut self,
        id: TaskId,
        update: FieldUpdate,
    ) -> BoxFuture<'_, Result<(), RepositoryError>>;

    /// Sets the task's `updated_at`.
    fn touch(&mut self, id: TaskId, at: Timestamp) -> BoxFuture<'_, Result<(), RepositoryError>>;

    /// Makes every staged change visible at once.
    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<(), RepositoryError>>;

    /// Discards every staged change.
    fn rollback(self: Box<Self>) -> BoxFuture<'static, Result<(), RepositoryError>>;
}

// =============================================================================
// User Repository
// =============================================================================

pub trait UserRepository: Send + Sync {
    /// Finds the user holding `token`.
    fn find_by_token<'a>(
        &'a self,
        token: &'a str,
    ) -> BoxFuture<'a, Result<Option<User>, RepositoryError>>;

    fn insert(&self, user: NewUser) -> BoxFuture<'_, Result<User, RepositoryError>>;
}

// =============================================================================
// Comment Repository
// =============================================================================

pub trait CommentRepository: Send + Sync {
    /// Inserts a comment and returns it as stored.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the task or author does not exist.
    fn insert(&self, comment: NewComment) -> BoxFuture<'_, Result<Comment, RepositoryError>>;

    /// Comments on a task, oldest first.
    fn list_by_task(&self, task_id: TaskId)
    -> BoxFuture<'_, Result<Vec<Comment>, RepositoryError>>;

    /// Comments written by a user, oldest first.
    fn list_by_author(
        &self,
        author: UserId,
    ) -> BoxFuture<'_, Result<Vec<Comment>, RepositoryError>>;
}

// =============================================================================
// Tests
// =============================================================================
