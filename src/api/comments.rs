//! HTTP handlers for comments.

use axum::{Json, extract::State, http::StatusCode};

use super::dto::{CommentResponse, CreateCommentRequest, validate_content};
use super::error::ApiErrorResponse;
use super::extract::{AuthenticatedUser, JsonBody, TaskIdParam, UserIdParam};
use super::handlers::AppState;
use crate::domain::{Comment, NewComment};

fn to_responses(comments: &[Comment]) -> Vec<CommentResponse> {
    comments.iter().map(CommentResponse::from).collect()
}

/// `POST /tasks/{id}/comments`: comments on a task as the acting user.
///
/// # Errors
///
/// Returns 401 without a valid token, 400 for a malformed id or body or
/// empty content, 404 if the task does not exist.
pub async fn create_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    TaskIdParam(task_id): TaskIdParam,
    JsonBody(request): JsonBody<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentResponse>), ApiErrorResponse> {
    if state.task_repository.find_by_id(task_id).await?.is_none() {
        return Err(ApiErrorResponse::not_found(format!(
            "Task {task_id} not found"
        )));
    }
    let content = validate_content(&request.content)?;

    let comment = state
        .comment_repository
        .insert(NewComment {
            task_id,
            author: user.id,
            content,
        })
        .await?;
    tracing::info!(
        comment_id = %comment.id,
        task_id = %task_id,
        user_id = %user.id,
        "Comment created"
    );

    Ok((StatusCode::CREATED, Json(CommentResponse::from(&comment))))
}

/// `GET /tasks/{id}/comments`: comments on a task, oldest first.
///
/// # Errors
///
/// Returns 400 for a malformed id.
pub async fn list_task_comments(
    State(state): State<AppState>,
    TaskIdParam(task_id): TaskIdParam,
) -> Result<Json<Vec<CommentResponse>>, ApiErrorResponse> {
    let comments = state.comment_repository.list_by_task(task_id).await?;
    Ok(Json(to_responses(&comments)))
}

/// `GET /users/{id}/comments`: comments written by a user, oldest first.
///
/// # Errors
///
/// Returns 400 for a malformed id.
pub async fn list_user_comments(
    State(state): State<AppState>,
    UserIdParam(user_id): UserIdParam,
) -> Result<Json<Vec<CommentResponse>>, ApiErrorResponse> {
    let comments = state.comment_repository.list_by_author(user_id).await?;
    Ok(Json(to_responses(&comments)))
}
