//! API module for HTTP handlers.
//!
//! This module contains route definitions and request/response handlers.

pub mod comments;
pub mod dto;
pub mod error;
pub mod extract;
pub mod handlers;

use axum::{Router, routing::get};

pub use comments::{create_comment, list_task_comments, list_user_comments};
pub use dto::{
    CommentResponse, CreateCommentRequest, CreateTaskRequest, HealthResponse, TaskResponse,
    UserResponse,
};
pub use error::{ApiError, ApiErrorResponse, FieldError, ValidationError};
pub use extract::{AuthenticatedUser, JsonBody, TaskIdParam, UserIdParam};
pub use handlers::{
    AppState, create_task, get_task, health_check, list_tasks, list_user_tasks, patch_task,
};

/// Builds the application router.
///
/// Collection routes answer with and without a trailing slash.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/", get(list_tasks).post(create_task))
        .route("/tasks/{id}", get(get_task).patch(patch_task))
        .route(
            "/tasks/{id}/comments",
            get(list_task_comments).post(create_comment),
        )
        .route("/users/{id}/tasks", get(list_user_tasks))
        .route("/users/{id}/comments", get(list_user_comments))
        .with_state(state)
}
