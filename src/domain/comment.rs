//! Comments left by users on tasks.

use serde::{Deserialize, Serialize};

use super::task::{TaskId, Timestamp};
use super::user::{UserId, UserSummary};

/// Unique identifier for a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommentId(i64);

impl CommentId {
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for CommentId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: CommentId,
    pub task_id: TaskId,
    pub author: UserSummary,
    pub content: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Data needed to insert a new comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub task_id: TaskId,
    pub author: UserId,
    pub content: String,
}
