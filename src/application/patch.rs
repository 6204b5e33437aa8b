//! Conditional patch application.
//!
//! [`PatchApplier::apply`] runs a patch request through a fixed sequence of
//! checks and stops at the first failure:
//!
//! 1. the task exists ([`PatchError::NotFound`])
//! 2. the acting user owns it ([`PatchError::Forbidden`])
//! 3. an `If-Match` value was supplied ([`PatchError::Conflict`])
//! 4. it equals the task's current fingerprint ([`PatchError::PreconditionFailed`])
//! 5. the body is declared as JSON Patch ([`PatchError::UnsupportedMediaType`])
//! 6. the document is valid as a whole ([`PatchError::BadRequest`])
//!
//! Every update is then applied in one transaction. The task row is locked
//! and its fingerprint checked again before anything is written, so of two
//! requests racing on the same state at most one commits.

use std::sync::Arc;

use thiserror::Error;

use crate::domain::{
    DocumentError, Fingerprint, JSON_PATCH_MEDIA_TYPE, TaskId, Timestamp, UserSummary,
    ValidatedPatch,
};
use crate::infrastructure::{RepositoryError, TaskRepository, TaskTransaction};

// =============================================================================
// Patch Error
// =============================================================================

/// Why a patch request was rejected.
///
/// Whatever the variant, the task is left exactly as it was.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("Task {0} not found")]
    NotFound(TaskId),

    #[error("Task {0} belongs to another user")]
    Forbidden(TaskId),

    /// No `If-Match` value was supplied.
    #[error("An If-Match header is required to patch a task")]
    Conflict,

    #[error("If-Match does not match the current state of task {0}")]
    PreconditionFailed(TaskId),

    #[error("Unsupported media type '{0}', expected application/json-patch+json")]
    UnsupportedMediaType(String),

    #[error(transparent)]
    BadRequest(#[from] DocumentError),

    #[error("Storage failure: {0}")]
    Internal(#[from] RepositoryError),
}

/// Returns true if `content_type` declares a JSON Patch body.
///
/// Parameters such as `charset` are ignored and the comparison is
/// case-insensitive.
#[must_use]
pub fn is_json_patch(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(JSON_PATCH_MEDIA_TYPE))
}

// =============================================================================
// Patch Applier
// =============================================================================

/// Applies JSON Patch documents to tasks under an `If-Match` precondition.
#[derive(Clone)]
pub struct PatchApplier {
    tasks: Arc<dyn TaskRepository + Send + Sync>,
}

impl PatchApplier {
    #[must_use]
    pub fn new(tasks: Arc<dyn TaskRepository + Send + Sync>) -> Self {
        Self { tasks }
    }

    /// Applies `document` to the task on behalf of `acting_user`.
    ///
    /// # Errors
    ///
    /// Returns the first failed check as a [`PatchError`]. Store failures,
    /// including a failed commit, surface as [`PatchError::Internal`].
    pub async fn apply(
        &self,
        acting_user: &UserSummary,
        task_id: TaskId,
        if_match: Option<&str>,
        content_type: Option<&str>,
        document: &[u8],
    ) -> Result<(), PatchError> {
        let task = self
            .tasks
            .find_by_id(task_id)
            .await?
            .ok_or(PatchError::NotFound(task_id))?;

        if !task.is_owned_by(acting_user.id) {
            return Err(PatchError::Forbidden(task_id));
        }

        let expected = if_match
            .filter(|value| !value.is_empty())
            .ok_or(PatchError::Conflict)?;
        if !Fingerprint::of(&task).matches(expected) {
            return Err(PatchError::PreconditionFailed(task_id));
        }

        let content_type = content_type.unwrap_or_default();
        if !is_json_patch(content_type) {
            return Err(PatchError::UnsupportedMediaType(content_type.to_string()));
        }

        let patch = ValidatedPatch::parse(document)?;

        let mut transaction = self.tasks.begin().await?;
        match apply_locked(&mut *transaction, task_id, expected, &patch).await {
            Ok(()) => {
                transaction.commit().await?;
                tracing::info!(
                    task_id = %task_id,
                    user_id = %acting_user.id,
                    operations = patch.len(),
                    "Task patched"
                );
                Ok(())
            }
            Err(error) => {
                if let Err(rollback_error) = transaction.rollback().await {
                    tracing::error!(
                        task_id = %task_id,
                        error = %rollback_error,
                        "Rollback failed"
                    );
                }
                Err(error)
            }
        }
    }
}

/// Re-checks the precondition under the row lock, then stages every update.
async fn apply_locked(
    transaction: &mut dyn TaskTransaction,
    task_id: TaskId,
    expected: &str,
    patch: &ValidatedPatch,
) -> Result<(), PatchError> {
    let locked = transaction
        .lock(task_id)
        .await?
        .ok_or(PatchError::NotFound(task_id))?;
    if !Fingerprint::of(&locked).matches(expected) {
        return Err(PatchError::PreconditionFailed(task_id));
    }

    for update in patch.updates() {
        transaction.update_field(task_id, update.clone()).await?;
    }
    transaction
        .touch(task_id, Timestamp::now_after(locked.updated_at))
        .await?;
    Ok(())
}

impl std::fmt::Debug for PatchApplier {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("PatchApplier")
            .field("tasks", &"Arc<dyn TaskRepository>")
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewTask, NewUser, Task, TaskField};
    use crate::infrastructure::{Fault, InMemoryStore, UserRepository};
    use futures::future::BoxFuture;
    use rstest::{fixture, rstest};
    use serde_json::json;

    struct Board {
        store: InMemoryStore,
        applier: PatchApplier,
        owner: UserSummary,
        other: UserSummary,
        task: Task,
    }

    impl Board {
        async fn current(&self) -> Task {
            TaskRepository::find_by_id(&self.store, self.task.id)
                .await
                .unwrap()
                .unwrap()
        }

        async fn patch(
            &self,
            if_match: Option<&str>,
            document: &serde_json::Value,
        ) -> Result<(), PatchError> {
            let body = serde_json::to_vec(document).unwrap();
            self.applier
                .apply(
                    &self.owner,
                    self.task.id,
                    if_match,
                    Some(JSON_PATCH_MEDIA_TYPE),
                    &body,
                )
                .await
        }
    }

    #[fixture]
    async fn board() -> Board {
        let store = InMemoryStore::new();
        let owner = UserRepository::insert(&store, NewUser::new("alice", "alice-token"))
            .await
            .unwrap()
            .summary();
        let other = UserRepository::insert(&store, NewUser::new("bob", "bob-token"))
            .await
            .unwrap()
            .summary();
        let task = TaskRepository::insert(
            &store,
            NewTask {
                owner: owner.id,
                name: "First task".to_string(),
                description: Some("This is the first task".to_string()),
                progression: 0,
            },
        )
        .await
        .unwrap();
        let applier = PatchApplier::new(Arc::new(store.clone()));
        Board {
            store,
            applier,
            owner,
            other,
            task,
        }
    }

    fn rename(name: &str) -> serde_json::Value {
        json!([{ "op": "replace", "path": "/name", "value": name }])
    }

    // -------------------------------------------------------------------------
    // Media type
    // -------------------------------------------------------------------------

    #[rstest]
    #[case("application/json-patch+json", true)]
    #[case("application/json-patch+json; charset=utf-8", true)]
    #[case("Application/JSON-Patch+JSON", true)]
    #[case("application/json", false)]
    #[case("text/plain", false)]
    #[case("", false)]
    fn test_is_json_patch(#[case] content_type: &str, #[case] expected: bool) {
        assert_eq!(is_json_patch(content_type), expected);
    }

    // -------------------------------------------------------------------------
    // Successful patches
    // -------------------------------------------------------------------------

    #[rstest]
    #[tokio::test]
    async fn test_rename_leaves_other_fields(#[future] board: Board) {
        let board = board.await;
        let fingerprint = Fingerprint::of(&board.task);

        board
            .patch(Some(fingerprint.as_str()), &rename("Patched name"))
            .await
            .unwrap();

        let current = board.current().await;
        assert_eq!(current.name, "Patched name");
        assert_eq!(current.description, board.task.description);
        assert_eq!(current.progression, board.task.progression);
        assert_eq!(current.created_at, board.task.created_at);
        assert!(current.updated_at > board.task.updated_at);
    }

    #[rstest]
    #[tokio::test]
    async fn test_every_field_in_one_document(#[future] board: Board) {
        let board = board.await;
        let fingerprint = Fingerprint::of(&board.task);
        let document = json!([
            { "op": "replace", "path": "/name", "value": "Renamed" },
            { "op": "replace", "path": "/description", "value": "" },
            { "op": "replace", "path": "/progression", "value": 75 },
            { "op": "replace", "path": "/progression", "value": 80 }
        ]);

        board
            .patch(Some(fingerprint.as_str()), &document)
            .await
            .unwrap();

        let current = board.current().await;
        assert_eq!(current.name, "Renamed");
        assert_eq!(current.description.as_deref(), Some(""));
        assert_eq!(current.progression, 80);
    }

    #[rstest]
    #[tokio::test]
    async fn test_sequential_patches_need_fresh_fingerprints(#[future] board: Board) {
        let board = board.await;
        let first = Fingerprint::of(&board.task);

        board
            .patch(Some(first.as_str()), &rename("Second"))
            .await
            .unwrap();
        let second = Fingerprint::of(&board.current().await);
        board
            .patch(Some(second.as_str()), &rename("Third"))
            .await
            .unwrap();

        let result = board.patch(Some(first.as_str()), &rename("Fourth")).await;
        assert!(matches!(result, Err(PatchError::PreconditionFailed(_))));
        assert_eq!(board.current().await.name, "Third");
    }

    #[rstest]
    #[tokio::test]
    async fn test_identical_values_still_change_fingerprint(#[future] board: Board) {
        let board = board.await;
        let first = Fingerprint::of(&board.task);

        board
            .patch(Some(first.as_str()), &rename("First task"))
            .await
            .unwrap();

        assert_ne!(Fingerprint::of(&board.current().await), first);
    }

    // -------------------------------------------------------------------------
    // Rejections
    // -------------------------------------------------------------------------

    #[rstest]
    #[tokio::test]
    async fn test_unknown_task_is_not_found(#[future] board: Board) {
        let board = board.await;
        let result = board
            .applier
            .apply(&board.owner, TaskId::new(404), None, None, b"")
            .await;

        assert!(matches!(result, Err(PatchError::NotFound(id)) if id == TaskId::new(404)));
    }

    #[rstest]
    #[tokio::test]
    async fn test_non_owner_is_forbidden_even_when_valid(#[future] board: Board) {
        let board = board.await;
        let fingerprint = Fingerprint::of(&board.task);
        let body = serde_json::to_vec(&rename("Hijacked")).unwrap();

        let result = board
            .applier
            .apply(
                &board.other,
                board.task.id,
                Some(fingerprint.as_str()),
                Some(JSON_PATCH_MEDIA_TYPE),
                &body,
            )
            .await;

        assert!(matches!(result, Err(PatchError::Forbidden(_))));
        assert_eq!(board.current().await, board.task);
    }

    #[rstest]
    #[case::missing(None)]
    #[case::empty(Some(""))]
    #[tokio::test]
    async fn test_missing_if_match_is_conflict(
        #[future] board: Board,
        #[case] if_match: Option<&str>,
    ) {
        let board = board.await;
        let result = board.patch(if_match, &rename("Patched name")).await;

        assert!(matches!(result, Err(PatchError::Conflict)));
        assert_eq!(board.current().await, board.task);
    }

    #[rstest]
    #[tokio::test]
    async fn test_stale_if_match_is_precondition_failed(#[future] board: Board) {
        let board = board.await;
        let fingerprint = Fingerprint::of(&board.task);
        let unquoted = fingerprint.as_str().trim_matches('"').to_string();

        let result = board.patch(Some(&unquoted), &rename("Patched name")).await;

        assert!(matches!(result, Err(PatchError::PreconditionFailed(_))));
        assert_eq!(board.current().await, board.task);
    }

    #[rstest]
    #[case::missing(None)]
    #[case::plain_json(Some("application/json"))]
    #[tokio::test]
    async fn test_wrong_content_type_is_unsupported(
        #[future] board: Board,
        #[case] content_type: Option<&str>,
    ) {
        let board = board.await;
        let fingerprint = Fingerprint::of(&board.task);
        let body = serde_json::to_vec(&rename("Patched name")).unwrap();

        let result = board
            .applier
            .apply(
                &board.owner,
                board.task.id,
                Some(fingerprint.as_str()),
                content_type,
                &body,
            )
            .await;

        assert!(matches!(result, Err(PatchError::UnsupportedMediaType(_))));
    }

    #[rstest]
    #[tokio::test]
    async fn test_content_type_parameters_are_accepted(#[future] board: Board) {
        let board = board.await;
        let fingerprint = Fingerprint::of(&board.task);
        let body = serde_json::to_vec(&rename("Patched name")).unwrap();

        board
            .applier
            .apply(
                &board.owner,
                board.task.id,
                Some(fingerprint.as_str()),
                Some("application/json-patch+json; charset=utf-8"),
                &body,
            )
            .await
            .unwrap();
    }

    #[rstest]
    #[case::wrong_type(json!([{ "op": "replace", "path": "/progression", "value": "hello" }]))]
    #[case::null(json!([{ "op": "replace", "path": "/description", "value": null }]))]
    #[case::add(json!([{ "op": "add", "path": "/name", "value": "x" }]))]
    #[case::unknown_path(json!([{ "op": "replace", "path": "/owner", "value": 2 }]))]
    #[case::empty(json!([]))]
    #[case::valid_then_invalid(json!([
        { "op": "replace", "path": "/name", "value": "Partially applied" },
        { "op": "replace", "path": "/progression", "value": 1.5 }
    ]))]
    #[tokio::test]
    async fn test_invalid_document_leaves_task_unchanged(
        #[future] board: Board,
        #[case] document: serde_json::Value,
    ) {
        let board = board.await;
        let fingerprint = Fingerprint::of(&board.task);

        let result = board.patch(Some(fingerprint.as_str()), &document).await;

        assert!(matches!(result, Err(PatchError::BadRequest(_))));
        assert_eq!(board.current().await, board.task);
    }

    #[rstest]
    #[case::second_update(Fault::UpdateField(TaskField::Progression))]
    #[case::commit(Fault::Commit)]
    #[tokio::test]
    async fn test_store_failure_leaves_task_unchanged(
        #[future] board: Board,
        #[case] fault: Fault,
    ) {
        let board = board.await;
        let fingerprint = Fingerprint::of(&board.task);
        let document = json!([
            { "op": "replace", "path": "/name", "value": "Renamed" },
            { "op": "replace", "path": "/progression", "value": 10 }
        ]);
        board.store.inject_fault(fault).await;

        let result = board.patch(Some(fingerprint.as_str()), &document).await;

        assert!(matches!(
            result,
            Err(PatchError::Internal(RepositoryError::InjectedFailure(_)))
        ));
        assert_eq!(board.current().await, board.task);
    }

    // -------------------------------------------------------------------------
    // Concurrency
    // -------------------------------------------------------------------------

    /// Serves a fixed snapshot for reads while transactions hit the real store.
    struct StaleReads {
        snapshot: Task,
        store: InMemoryStore,
    }

    impl TaskRepository for StaleReads {
        fn find_by_id(&self, _id: TaskId) -> BoxFuture<'_, Result<Option<Task>, RepositoryError>> {
            Box::pin(async move { Ok(Some(self.snapshot.clone())) })
        }

        fn list(&self) -> BoxFuture<'_, Result<Vec<Task>, RepositoryError>> {
            self.store.list()
        }

        fn list_by_owner(
            &self,
            owner: crate::domain::UserId,
        ) -> BoxFuture<'_, Result<Vec<Task>, RepositoryError>> {
            self.store.list_by_owner(owner)
        }

        fn insert(&self, task: NewTask) -> BoxFuture<'_, Result<Task, RepositoryError>> {
            TaskRepository::insert(&self.store, task)
        }

        fn begin(&self) -> BoxFuture<'_, Result<Box<dyn TaskTransaction>, RepositoryError>> {
            self.store.begin()
        }
    }

    #[rstest]
    #[tokio::test]
    async fn test_precondition_is_checked_again_under_lock(#[future] board: Board) {
        let board = board.await;
        let fingerprint = Fingerprint::of(&board.task);
        board
            .patch(Some(fingerprint.as_str()), &rename("Concurrent writer"))
            .await
            .unwrap();

        let stale = PatchApplier::new(Arc::new(StaleReads {
            snapshot: board.task.clone(),
            store: board.store.clone(),
        }));
        let body = serde_json::to_vec(&rename("Lost update")).unwrap();
        let result = stale
            .apply(
                &board.owner,
                board.task.id,
                Some(fingerprint.as_str()),
                Some(JSON_PATCH_MEDIA_TYPE),
                &body,
            )
            .await;

        assert!(matches!(result, Err(PatchError::PreconditionFailed(_))));
        assert_eq!(board.current().await.name, "Concurrent writer");
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_patches_on_same_state_commit_once(#[future] board: Board) {
        let board = Arc::new(board.await);
        let fingerprint = Fingerprint::of(&board.task).as_str().to_string();

        let handles: Vec<_> = (0..8)
            .map(|index| {
                let board = Arc::clone(&board);
                let fingerprint = fingerprint.clone();
                tokio::spawn(async move {
                    board
                        .patch(Some(&fingerprint), &rename(&format!("Writer {index}")))
                        .await
                })
            })
            .collect();

        let mut committed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => committed += 1,
                Err(PatchError::PreconditionFailed(_)) => {}
                Err(error) => panic!("unexpected error: {error}"),
            }
        }
        assert_eq!(committed, 1);
    }

    // -------------------------------------------------------------------------
    // Cancellation
    // -------------------------------------------------------------------------

    /// Opens real transactions that never finish their second field update.
    struct HangAfterFirstUpdate {
        store: InMemoryStore,
    }

    struct HangingTransaction {
        inner: Box<dyn TaskTransaction>,
        updates: usize,
    }

    impl TaskRepository for HangAfterFirstUpdate {
        fn find_by_id(&self, id: TaskId) -> BoxFuture<'_, Result<Option<Task>, RepositoryError>> {
            TaskRepository::find_by_id(&self.store, id)
        }

        fn list(&self) -> BoxFuture<'_, Result<Vec<Task>, RepositoryError>> {
            self.store.list()
        }

        fn list_by_owner(
            &self,
            owner: crate::domain::UserId,
        ) -> BoxFuture<'_, Result<Vec<Task>, RepositoryError>> {
            self.store.list_by_owner(owner)
        }

        fn insert(&self, task: NewTask) -> BoxFuture<'_, Result<Task, RepositoryError>> {
            TaskRepository::insert(&self.store, task)
        }

        fn begin(&self) -> BoxFuture<'_, Result<Box<dyn TaskTransaction>, RepositoryError>> {
            Box::pin(async move {
                let inner = self.store.begin().await?;
                let transaction: Box<dyn TaskTransaction> =
                    Box::new(HangingTransaction { inner, updates: 0 });
                Ok(transaction)
            })
        }
    }

    impl TaskTransaction for HangingTransaction {
        fn lock(&mut self, id: TaskId) -> BoxFuture<'_, Result<Option<Task>, RepositoryError>> {
            self.inner.lock(id)
        }

        fn update_field(
            &mut self,
            id: TaskId,
            update: crate::domain::FieldUpdate,
        ) -> BoxFuture<'_, Result<(), RepositoryError>> {
            self.updates += 1;
            if self.updates > 1 {
                return Box::pin(futures::future::pending());
            }
            self.inner.update_field(id, update)
        }

        fn touch(
            &mut self,
            id: TaskId,
            at: Timestamp,
        ) -> BoxFuture<'_, Result<(), RepositoryError>> {
            self.inner.touch(id, at)
        }

        fn commit(self: Box<Self>) -> BoxFuture<'static, Result<(), RepositoryError>> {
            self.inner.commit()
        }

        fn rollback(self: Box<Self>) -> BoxFuture<'static, Result<(), RepositoryError>> {
            self.inner.rollback()
        }
    }

    #[rstest]
    #[tokio::test]
    async fn test_cancelled_apply_leaves_task_unchanged_and_unlocked(#[future] board: Board) {
        let board = board.await;
        let fingerprint = Fingerprint::of(&board.task);
        let document = json!([
            { "op": "replace", "path": "/name", "value": "Half written" },
            { "op": "replace", "path": "/progression", "value": 50 }
        ]);
        let body = serde_json::to_vec(&document).unwrap();
        let hanging = PatchApplier::new(Arc::new(HangAfterFirstUpdate {
            store: board.store.clone(),
        }));

        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            hanging.apply(
                &board.owner,
                board.task.id,
                Some(fingerprint.as_str()),
                Some(JSON_PATCH_MEDIA_TYPE),
                &body,
            ),
        )
        .await;
        assert!(outcome.is_err());

        let current = tokio::time::timeout(std::time::Duration::from_secs(1), board.current())
            .await
            .expect("task table still locked after cancellation");
        assert_eq!(current, board.task);

        board
            .patch(Some(fingerprint.as_str()), &rename("After cancellation"))
            .await
            .unwrap();
        assert_eq!(board.current().await.name, "After cancellation");
    }
}
