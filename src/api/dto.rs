//! Data Transfer Objects for API requests and responses.
//!
//! This module contains DTOs that are separate from domain models,
//! providing a clean API contract.

use serde::{Deserialize, Serialize};

use super::error::ValidationError;
use crate::domain::{Comment, Task, UserSummary};

// =============================================================================
// User DTOs
// =============================================================================

/// Public view of a user, embedded in tasks and comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
}

impl From<&UserSummary> for UserResponse {
    fn from(user: &UserSummary) -> Self {
        Self {
            id: user.id.value(),
            username: user.username.clone(),
        }
    }
}

// =============================================================================
// Task DTOs
// =============================================================================

/// Request DTO for creating a new task.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    /// Task name (must not be empty).
    pub name: String,
    /// Optional free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Starting progression (defaults to 0).
    #[serde(default)]
    pub progression: i64,
}

/// Response DTO for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub id: i64,
    /// Creation time (RFC 3339).
    pub created_at: String,
    /// Last modification time (RFC 3339).
    pub updated_at: String,
    /// Owner of the task.
    pub user: UserResponse,
    pub name: String,
    /// Omitted when the task has no description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub progression: i64,
}

impl From<&Task> for TaskResponse {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.value(),
            created_at: task.created_at.to_rfc3339(),
            updated_at: task.updated_at.to_rfc3339(),
            user: UserResponse::from(&task.owner),
            name: task.name.clone(),
            description: task.description.clone(),
            progression: task.progression,
        }
    }
}

// =============================================================================
// Comment DTOs
// =============================================================================

/// Request DTO for commenting on a task.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommentRequest {
    /// Comment text (must not be empty).
    pub content: String,
}

/// Response DTO for a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentResponse {
    pub id: i64,
    pub created_at: String,
    pub updated_at: String,
    pub task_id: i64,
    /// Author of the comment.
    pub user: UserResponse,
    pub content: String,
}

impl From<&Comment> for CommentResponse {
    fn from(comment: &Comment) -> Self {
        Self {
            id: comment.id.value(),
            created_at: comment.created_at.to_rfc3339(),
            updated_at: comment.updated_at.to_rfc3339(),
            task_id: comment.task_id.value(),
            user: UserResponse::from(&comment.author),
            content: comment.content.clone(),
        }
    }
}

// =============================================================================
// Health DTO
// =============================================================================

/// Response DTO for health check.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

// =============================================================================
// Validation
// =============================================================================

/// Validates a task name. Names must not be empty.
///
/// # Errors
///
/// Returns a `ValidationError` on the `name` field.
pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    if name.is_empty() {
        Err(ValidationError::single("name", "Name is required"))
    } else {
        Ok(name.to_string())
    }
}

/// Validates comment content. Content must not be empty.
///
/// # Errors
///
/// Returns a `ValidationError` on the `content` field.
pub fn validate_content(content: &str) -> Result<String, ValidationError> {
    if content.is_empty() {
        Err(ValidationError::single("content", "Content is required"))
    } else {
        Ok(content.to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskId, Timestamp, UserId};
    use rstest::rstest;
    use serde_json::json;

    fn task(description: Option<&str>) -> Task {
        let created = Timestamp::now();
        Task {
            id: TaskId::new(1),
            owner: UserSummary::new(UserId::new(7), "alice"),
            name: "First task".to_string(),
            description: description.map(str::to_string),
            progression: 40,
            created_at: created,
            updated_at: created,
        }
    }

    #[rstest]
    fn test_task_response_shape() {
        let task = task(Some("This is the first task"));
        let value = serde_json::to_value(TaskResponse::from(&task)).unwrap();

        assert_eq!(value["id"], 1);
        assert_eq!(value["user"], json!({ "id": 7, "username": "alice" }));
        assert_eq!(value["name"], "First task");
        assert_eq!(value["description"], "This is the first task");
        assert_eq!(value["progression"], 40);
        assert_eq!(value["created_at"], task.created_at.to_rfc3339());
    }

    #[rstest]
    fn test_task_response_omits_missing_description() {
        let value = serde_json::to_value(TaskResponse::from(&task(None))).unwrap();
        assert!(value.get("description").is_none());
    }

    #[rstest]
    fn test_create_task_request_defaults() {
        let request: CreateTaskRequest =
            serde_json::from_value(json!({ "name": "Write tests" })).unwrap();
        assert_eq!(request.description, None);
        assert_eq!(request.progression, 0);
    }

    #[rstest]
    #[case("Write tests", true)]
    #[case("", false)]
    fn test_validate_name(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(validate_name(name).is_ok(), valid);
    }

    #[rstest]
    #[case("Looks good", true)]
    #[case("", false)]
    fn test_validate_content(#[case] content: &str, #[case] valid: bool) {
        assert_eq!(validate_content(content).is_ok(), valid);
    }
}
