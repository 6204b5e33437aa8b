//! In-memory repository implementation.
//!
//! A single [`InMemoryStore`] implements every repository trait over one set
//! of tables, so foreign keys (task owner, comment task and author) can be
//! checked the way the database checks them. It is used for local
//! development and by the test suite.
//!
//! # Transactions
//!
//! A [`TaskTransaction`] opened with [`TaskRepository::begin`] holds the
//! table write lock until it is committed, rolled back or dropped. Updates
//! are staged on the side and only written to the tables on commit, so a
//! dropped transaction leaves no trace.
//!
//! # Fault injection
//!
//! [`InMemoryStore::inject_fault`] arms a one-shot failure inside the next
//! transaction, either on a given field update or on commit. Tests use it to
//! check that a failed apply leaves the task untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{Mutex, OwnedRwLockWriteGuard, RwLock};

use crate::domain::{
    Comment, CommentId, FieldUpdate, NewComment, NewTask, NewUser, Task, TaskField, TaskId,
    Timestamp, User, UserId,
};
use crate::infrastructure::{
    CommentRepository, RepositoryError, TaskRepository, TaskTransaction, UserRepository,
};

// =============================================================================
// Tables
// =============================================================================

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    tasks: BTreeMap<TaskId, Task>,
    comments: BTreeMap<CommentId, Comment>,
    next_user_id: i64,
    next_task_id: i64,
    next_comment_id: i64,
}

impl Tables {
    const fn allocate_user_id(&mut self) -> UserId {
        self.next_user_id += 1;
        UserId::new(self.next_user_id)
    }

    const fn allocate_task_id(&mut self) -> TaskId {
        self.next_task_id += 1;
        TaskId::new(self.next_task_id)
    }

    const fn allocate_comment_id(&mut self) -> CommentId {
        self.next_comment_id += 1;
        CommentId::new(self.next_comment_id)
    }
}

/// Sorts by creation time, falling back to id for equal timestamps.
fn sort_tasks(mut tasks: Vec<Task>) -> Vec<Task> {
    tasks.sort_by(|left, right| {
        left.created_at
            .cmp(&right.created_at)
            .then(left.id.cmp(&right.id))
    });
    tasks
}

fn sort_comments(mut comments: Vec<Comment>) -> Vec<Comment> {
    comments.sort_by(|left, right| {
        left.created_at
            .cmp(&right.created_at)
            .then(left.id.cmp(&right.id))
    });
    comments
}

// =============================================================================
// Fault Injection
// =============================================================================

/// A failure the next transaction raises on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail when the given field is updated.
    UpdateField(TaskField),
    /// Fail on commit, after every update was staged.
    Commit,
}

impl std::fmt::Display for Fault {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpdateField(field) => write!(formatter, "update {field}"),
            Self::Commit => formatter.write_str("commit"),
        }
    }
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// In-memory implementation of every repository trait.
///
/// Cloning the store is cheap and every clone shares the same tables.
///
/// # Example
///
/// ```ignore
/// let store = InMemoryStore::new();
/// let alice = store.insert(NewUser::new("alice", "secret")).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    fault: Arc<Mutex<Option<Fault>>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `fault` for the next transaction. The fault is consumed by
    /// [`TaskRepository::begin`] whether or not it ends up firing.
    pub async fn inject_fault(&self, fault: Fault) {
        *self.fault.lock().await = Some(fault);
    }
}

// =============================================================================
// Task Repository
// =============================================================================

#[allow(clippy::significant_drop_tightening)]
impl TaskRepository for InMemoryStore {
    fn find_by_id(&self, id: TaskId) -> BoxFuture<'_, Result<Option<Task>, RepositoryError>> {
        Box::pin(async move {
            let guard = self.tables.read().await;
            Ok(guard.tasks.get(&id).cloned())
        })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<Task>, RepositoryError>> {
        Box::pin(async move {
            let guard = self.tables.read().await;
            Ok(sort_tasks(guard.tasks.values().cloned().collect()))
        })
    }

    fn list_by_owner(&self, owner: UserId) -> BoxFuture<'_, Result<Vec<Task>, RepositoryError>> {
        Box::pin(async move {
            let guard = self.tables.read().await;
            let owned = guard
                .tasks
                .values()
                .filter(|task| task.is_owned_by(owner))
                .cloned()
                .collect();
            Ok(sort_tasks(owned))
        })
    }

    fn insert(&self, task: NewTask) -> BoxFuture<'_, Result<Task, RepositoryError>> {
        Box::pin(async move {
            let mut guard = self.tables.write().await;
            let owner = guard
                .users
                .get(&task.owner)
                .map(User::summary)
                .ok_or_else(|| RepositoryError::NotFound(format!("user {}", task.owner)))?;

            let now = Timestamp::now();
            let stored = Task {
                id: guard.allocate_task_id(),
                owner,
                name: task.name,
                description: task.description,
                progression: task.progression,
                created_at: now,
                updated_at: now,
            };
            guard.tasks.insert(stored.id, stored.clone());
            Ok(stored)
        })
    }

    fn begin(&self) -> BoxFuture<'_, Result<Box<dyn TaskTransaction>, RepositoryError>> {
        Box::pin(async move {
            let fault = self.fault.lock().await.take();
            let guard = Arc::clone(&self.tables).write_owned().await;
            let transaction: Box<dyn TaskTransaction> = Box::new(InMemoryTaskTransaction {
                guard,
                staged: BTreeMap::new(),
                fault,
            });
            Ok(transaction)
        })
    }
}

// =============================================================================
// Task Transaction
// =============================================================================

/// Transaction over the in-memory tables.
///
/// Holds the table write lock for its whole lifetime.
struct InMemoryTaskTransaction {
    guard: OwnedRwLockWriteGuard<Tables>,
    staged: BTreeMap<TaskId, Task>,
    fault: Option<Fault>,
}

impl InMemoryTaskTransaction {
    fn current(&self, id: TaskId) -> Option<Task> {
        self.staged
            .get(&id)
            .or_else(|| self.guard.tasks.get(&id))
            .cloned()
    }

    fn stage(
        &mut self,
        id: TaskId,
        change: impl FnOnce(Task) -> Task,
    ) -> Result<(), RepositoryError> {
        let task = self
            .current(id)
            .ok_or_else(|| RepositoryError::NotFound(format!("task {id}")))?;
        self.staged.insert(id, change(task));
        Ok(())
    }
}

impl TaskTransaction for InMemoryTaskTransaction {
    fn lock(&mut self, id: TaskId) -> BoxFuture<'_, Result<Option<Task>, RepositoryError>> {
        Box::pin(async move { Ok(self.current(id)) })
    }

    fn update_field(
        &mut self,
        id: TaskId,
        update: FieldUpdate,
    ) -> BoxFuture<'_, Result<(), RepositoryError>> {
        Box::pin(async move {
            let fault = Fault::UpdateField(update.field());
            if self.fault == Some(fault) {
                return Err(RepositoryError::InjectedFailure(fault.to_string()));
            }
            self.stage(id, |task| task.apply_update(&update))
        })
    }

    fn touch(&mut self, id: TaskId, at: Timestamp) -> BoxFuture<'_, Result<(), RepositoryError>> {
        Box::pin(async move { self.stage(id, |task| task.touched(at)) })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<(), RepositoryError>> {
        Box::pin(async move {
            let Self {
                mut guard,
                staged,
                fault,
            } = *self;
            if fault == Some(Fault::Commit) {
                return Err(RepositoryError::InjectedFailure(Fault::Commit.to_string()));
            }
            guard.tasks.extend(staged);
            Ok(())
        })
    }

    fn rollback(self: Box<Self>) -> BoxFuture<'static, Result<(), RepositoryError>> {
        Box::pin(async move {
            drop(self);
            Ok(())
        })
    }
}

// =============================================================================
// User Repository
// =============================================================================

#[allow(clippy::significant_drop_tightening)]
impl UserRepository for InMemoryStore {
    fn find_by_token<'a>(
        &'a self,
        token: &'a str,
    ) -> BoxFuture<'a, Result<Option<User>, RepositoryError>> {
        Box::pin(async move {
            let guard = self.tables.read().await;
            Ok(guard.users.values().find(|user| user.token == token).cloned())
        })
    }

    fn insert(&self, user: NewUser) -> BoxFuture<'_, Result<User, RepositoryError>> {
        Box::pin(async move {
            let mut guard = self.tables.write().await;
            if guard.users.values().any(|existing| existing.token == user.token) {
                return Err(RepositoryError::DatabaseError(format!(
                    "token of user {} is already taken",
                    user.username
                )));
            }

            let now = Timestamp::now();
            let stored = User {
                id: guard.allocate_user_id(),
                username: user.username,
                token: user.token,
                created_at: now,
                updated_at: now,
            };
            guard.users.insert(stored.id, stored.clone());
            Ok(stored)
        })
    }
}

// =============================================================================
// Comment Repository
// =============================================================================

#[allow(clippy::significant_drop_tightening)]
impl CommentRepository for InMemoryStore {
    fn insert(&self, comment: NewComment) -> BoxFuture<'_, Result<Comment, RepositoryError>> {
        Box::pin(async move {
            let mut guard = self.tables.write().await;
            if !guard.tasks.contains_key(&comment.task_id) {
                return Err(RepositoryError::NotFound(format!("task {}", comment.task_id)));
            }
            let author = guard
                .users
                .get(&comment.author)
                .map(User::summary)
                .ok_or_else(|| RepositoryError::NotFound(format!("user {}", comment.author)))?;

            let now = Timestamp::now();
            let stored = Comment {
                id: guard.allocate_comment_id(),
                task_id: comment.task_id,
                author,
                content: comment.content,
                created_at: now,
                updated_at: now,
            };
            guard.comments.insert(stored.id, stored.clone());
            Ok(stored)
        })
    }

    fn list_by_task(
        &self,
        task_id: TaskId,
    ) -> BoxFuture<'_, Result<Vec<Comment>, RepositoryError>> {
        Box::pin(async move {
            let guard = self.tables.read().await;
            let comments = guard
                .comments
                .values()
                .filter(|comment| comment.task_id == task_id)
                .cloned()
                .collect();
            Ok(sort_comments(comments))
        })
    }

    fn list_by_author(
        &self,
        author: UserId,
    ) -> BoxFuture<'_, Result<Vec<Comment>, RepositoryError>> {
        Box::pin(async move {
            let guard = self.tables.read().await;
            let comments = guard
                .comments
                .values()
                .filter(|comment| comment.author.id == author)
                .cloned()
                .collect();
            Ok(sort_comments(comments))
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
