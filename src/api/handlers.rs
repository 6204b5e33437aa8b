//! HTTP handlers for tasks.
//!
//! Tasks are created with `POST /tasks`, read with `GET /tasks/{id}` (which
//! also returns the task's fingerprint as `ETag`) and changed only through
//! `PATCH /tasks/{id}`.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
};

use super::dto::{CreateTaskRequest, HealthResponse, TaskResponse, validate_name};
use super::error::ApiErrorResponse;
use super::extract::{AuthenticatedUser, JsonBody, TaskIdParam, UserIdParam};
use crate::application::{Authenticator, PatchApplier, TokenAuthenticator};
use crate::domain::{Fingerprint, NewTask, Task};
use crate::infrastructure::{CommentRepository, Repositories, TaskRepository};

// =============================================================================
// Application State
// =============================================================================

/// Shared application dependencies.
///
/// Uses trait objects so the storage backend can be chosen at runtime by
/// the `RepositoryFactory`.
#[derive(Clone)]
pub struct AppState {
    pub task_repository: Arc<dyn TaskRepository + Send + Sync>,
    pub comment_repository: Arc<dyn CommentRepository + Send + Sync>,
    pub authenticator: Arc<dyn Authenticator + Send + Sync>,
    pub patch_applier: PatchApplier,
}

impl AppState {
    /// Wires the authenticator and patch applier to the given repositories.
    #[must_use]
    pub fn from_repositories(repositories: Repositories) -> Self {
        let authenticator = TokenAuthenticator::new(Arc::clone(&repositories.user_repository));
        let patch_applier = PatchApplier::new(Arc::clone(&repositories.task_repository));
        Self {
            task_repository: repositories.task_repository,
            comment_repository: repositories.comment_repository,
            authenticator: Arc::new(authenticator),
            patch_applier,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AppState")
            .field("task_repository", &"Arc<dyn TaskRepository>")
            .field("comment_repository", &"Arc<dyn CommentRepository>")
            .field("authenticator", &"Arc<dyn Authenticator>")
            .field("patch_applier", &self.patch_applier)
            .finish()
    }
}

// =============================================================================
// Health
// =============================================================================

/// Health check endpoint.
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// =============================================================================
// Tasks
// =============================================================================

fn to_responses(tasks: &[Task]) -> Vec<TaskResponse> {
    tasks.iter().map(TaskResponse::from).collect()
}

/// `GET /tasks`: every task, oldest first.
///
/// # Errors
///
/// Returns 500 if the store fails.
pub async fn list_tasks(
    State(state): State<AppState>,
) -> Result<Json<Vec<TaskResponse>>, ApiErrorResponse> {
    let tasks = state.task_repository.list().await?;
    Ok(Json(to_responses(&tasks)))
}

/// `POST /tasks`: creates a task owned by the acting user.
///
/// Responds with 201, the created task, its `Location` and its `ETag`.
///
/// # Errors
///
/// Returns 400 for a malformed body or an empty name, 401 without a valid
/// token.
pub async fn create_task(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    JsonBody(request): JsonBody<CreateTaskRequest>,
) -> Result<(StatusCode, HeaderMap, Json<TaskResponse>), ApiErrorResponse> {
    let name = validate_name(&request.name)?;

    let task = state
        .task_repository
        .insert(NewTask {
            owner: user.id,
            name,
            description: request.description,
            progression: request.progression,
        })
        .await?;
    tracing::info!(task_id = %task.id, user_id = %user.id, "Task created");

    let mut headers = entity_headers(&task)?;
    let location = format!("/tasks/{}", task.id)
        .parse()
        .map_err(|_| ApiErrorResponse::internal_error("Invalid Location header"))?;
    headers.insert(header::LOCATION, location);
    Ok((StatusCode::CREATED, headers, Json(TaskResponse::from(&task))))
}

/// `GET /tasks/{id}`: the task with its fingerprint as `ETag`.
///
/// # Errors
///
/// Returns 400 for a malformed id, 404 if the task does not exist.
pub async fn get_task(
    State(state): State<AppState>,
    TaskIdParam(task_id): TaskIdParam,
) -> Result<(HeaderMap, Json<TaskResponse>), ApiErrorResponse> {
    let task = state
        .task_repository
        .find_by_id(task_id)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found(format!("Task {task_id} not found")))?;

    Ok((entity_headers(&task)?, Json(TaskResponse::from(&task))))
}

/// `PATCH /tasks/{id}`: applies a JSON Patch document under `If-Match`.
///
/// Responds with 204 and no body.
///
/// # Errors
///
/// 401 without a valid token (checked before the id), 400 for a malformed
/// id or document, 403 for a task owned by someone else, 404 for an
/// unknown task, 409 without `If-Match`, 412 for a stale `If-Match`, 415
/// for a body that is not declared as `application/json-patch+json`.
pub async fn patch_task(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    TaskIdParam(task_id): TaskIdParam,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiErrorResponse> {
    let if_match = headers
        .get(header::IF_MATCH)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());

    state
        .patch_applier
        .apply(
            &user,
            task_id,
            if_match.as_deref(),
            content_type.as_deref(),
            &body,
        )
        .await
        .inspect_err(|error| {
            tracing::debug!(task_id = %task_id, user_id = %user.id, %error, "Patch rejected");
        })?;

    Ok(StatusCode::NO_CONTENT)
}

/// `GET /users/{id}/tasks`: tasks owned by a user, oldest first.
///
/// # Errors
///
/// Returns 400 for a malformed id.
pub async fn list_user_tasks(
    State(state): State<AppState>,
    UserIdParam(user_id): UserIdParam,
) -> Result<Json<Vec<TaskResponse>>, ApiErrorResponse> {
    let tasks = state.task_repository.list_by_owner(user_id).await?;
    Ok(Json(to_responses(&tasks)))
}

fn entity_headers(task: &Task) -> Result<HeaderMap, ApiErrorResponse> {
    let mut headers = HeaderMap::new();
    let etag = Fingerprint::of(task)
        .as_str()
        .parse()
        .map_err(|_| ApiErrorResponse::internal_error("Invalid ETag header"))?;
    headers.insert(header::ETAG, etag);
    Ok(headers)
}

// =============================================================================
// Tests
// =============================================================================
