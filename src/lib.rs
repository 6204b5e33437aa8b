//! Task Board API Library
//!
//! Users, tasks and comments behind a small HTTP API. Tasks are only ever
//! changed through conditional JSON Patch requests guarded by an entity
//! fingerprint (`ETag` / `If-Match`).
//!
//! - [`domain`]: entities, fingerprints and the patch document model
//! - [`application`]: token authentication and the patch applier
//! - [`infrastructure`]: in-memory and `PostgreSQL` stores, configuration
//! - [`api`]: axum handlers, extractors and error responses

pub mod api;
pub mod application;
pub mod domain;
pub mod infrastructure;
