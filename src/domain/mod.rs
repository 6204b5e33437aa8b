//! Domain module for the task board.
//!
//! This module contains the entities, their identifiers, the task
//! fingerprint and the patch document model.

pub mod comment;
pub mod fingerprint;
pub mod patch;
pub mod task;
pub mod user;

pub use comment::{Comment, CommentId, NewComment};
pub use fingerprint::Fingerprint;
pub use patch::{
    DocumentError, FieldUpdate, JSON_PATCH_MEDIA_TYPE, PATCHABLE_FIELDS, PatchableField,
    TaskField, ValidatedPatch, patchable_field,
};
pub use task::{NewTask, Task, TaskId, Timestamp};
pub use user::{NewUser, User, UserId, UserSummary};
