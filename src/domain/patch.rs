//! Patch documents for tasks.
//!
//! Tasks accept a restricted form of RFC 6902 JSON Patch: an ordered array
//! of `replace` operations, each targeting one path of a fixed whitelist.
//!
//! ```json
//! [
//!   { "op": "replace", "path": "/name", "value": "Patched name" },
//!   { "op": "replace", "path": "/progression", "value": 40 }
//! ]
//! ```
//!
//! The whitelist and the per-field dispatch are one table,
//! [`PATCHABLE_FIELDS`]: each entry pairs a path with a typed decoder that
//! turns the JSON value into a [`FieldUpdate`]. A document is validated in
//! full before anything is applied; the only way to obtain a
//! [`ValidatedPatch`] is through [`ValidatedPatch::parse`].

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Media type a patch request body must be declared as.
pub const JSON_PATCH_MEDIA_TYPE: &str = "application/json-patch+json";

/// The only operation tasks accept.
const REPLACE: &str = "replace";

// =============================================================================
// Fields and Updates
// =============================================================================

/// A task field that may be changed through a patch document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskField {
    Name,
    Description,
    Progression,
}

impl TaskField {
    /// JSON Pointer of the field in a task representation.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Name => "/name",
            Self::Description => "/description",
            Self::Progression => "/progression",
        }
    }
}

impl std::fmt::Display for TaskField {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.path())
    }
}

/// A typed replacement for one whitelisted field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    Name(String),
    Description(String),
    Progression(i64),
}

impl FieldUpdate {
    #[must_use]
    pub const fn field(&self) -> TaskField {
        match self {
            Self::Name(_) => TaskField::Name,
            Self::Description(_) => TaskField::Description,
            Self::Progression(_) => TaskField::Progression,
        }
    }
}

/// Why a value was refused by a field decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueRejection {
    WrongType(&'static str),
    Empty,
}

/// Whitelist entry: a patchable path and how to decode its value.
pub struct PatchableField {
    pub field: TaskField,
    decode: fn(&Value) -> Result<FieldUpdate, ValueRejection>,
}

impl std::fmt::Debug for PatchableField {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("PatchableField")
            .field("field", &self.field)
            .finish_non_exhaustive()
    }
}

/// Every path a patch document may target.
pub static PATCHABLE_FIELDS: [PatchableField; 3] = [
    PatchableField {
        field: TaskField::Name,
        decode: decode_name,
    },
    PatchableField {
        field: TaskField::Description,
        decode: decode_description,
    },
    PatchableField {
        field: TaskField::Progression,
        decode: decode_progression,
    },
];

/// Looks up the whitelist entry for a JSON Pointer.
#[must_use]
pub fn patchable_field(path: &str) -> Option<&'static PatchableField> {
    PATCHABLE_FIELDS
        .iter()
        .find(|entry| entry.field.path() == path)
}

fn decode_name(value: &Value) -> Result<FieldUpdate, ValueRejection> {
    match value.as_str() {
        Some("") => Err(ValueRejection::Empty),
        Some(name) => Ok(FieldUpdate::Name(name.to_string())),
        None => Err(ValueRejection::WrongType("string")),
    }
}

fn decode_description(value: &Value) -> Result<FieldUpdate, ValueRejection> {
    value
        .as_str()
        .map(|description| FieldUpdate::Description(description.to_string()))
        .ok_or(ValueRejection::WrongType("string"))
}

fn decode_progression(value: &Value) -> Result<FieldUpdate, ValueRejection> {
    value
        .as_i64()
        .map(FieldUpdate::Progression)
        .ok_or(ValueRejection::WrongType("integer"))
}

// =============================================================================
// Document Errors
// =============================================================================

/// Reasons a patch document is refused. Indexes are zero-based positions
/// in the operation array.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("patch document must be a JSON array of operations: {0}")]
    Malformed(String),

    #[error("patch document contains no operations")]
    Empty,

    #[error("operation {index}: missing \"{member}\"")]
    MissingMember { index: usize, member: &'static str },

    #[error("operation {index}: unsupported op \"{op}\", only \"replace\" is allowed")]
    UnsupportedOperation { index: usize, op: String },

    #[error("operation {index}: path \"{path}\" cannot be patched")]
    UnpatchablePath { index: usize, path: String },

    #[error("operation {index}: \"value\" can't be null")]
    NullValue { index: usize },

    #[error("operation {index}: value for {field} must be of type {expected}")]
    InvalidValue {
        index: usize,
        field: TaskField,
        expected: &'static str,
    },

    #[error("operation {index}: value for {field} must not be empty")]
    EmptyValue { index: usize, field: TaskField },
}

// =============================================================================
// Validated Patch
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawOperation {
    op: Option<String>,
    path: Option<String>,
    #[serde(default)]
    value: Value,
}

/// A patch document whose every operation has been checked against the
/// whitelist. Updates keep the document's order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPatch(Vec<FieldUpdate>);

impl ValidatedPatch {
    /// Parses and validates a raw request body.
    ///
    /// # Errors
    ///
    /// Returns the first [`DocumentError`] found; a single bad operation
    /// rejects the whole document.
    pub fn parse(body: &[u8]) -> Result<Self, DocumentError> {
        let operations: Vec<RawOperation> = serde_json::from_slice(body)
            .map_err(|error| DocumentError::Malformed(error.to_string()))?;
        Self::from_operations(operations)
    }

    /// Validates an already decoded JSON value.
    ///
    /// # Errors
    ///
    /// Same as [`ValidatedPatch::parse`].
    pub fn from_value(document: Value) -> Result<Self, DocumentError> {
        let operations: Vec<RawOperation> = serde_json::from_value(document)
            .map_err(|error| DocumentError::Malformed(error.to_string()))?;
        Self::from_operations(operations)
    }

    fn from_operations(operations: Vec<RawOperation>) -> Result<Self, DocumentError> {
        if operations.is_empty() {
            return Err(DocumentError::Empty);
        }

        operations
            .into_iter()
            .enumerate()
            .map(|(index, operation)| validate_operation(index, operation))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    #[must_use]
    pub fn updates(&self) -> &[FieldUpdate] {
        &self.0
    }

    #[must_use]
    pub fn into_updates(self) -> Vec<FieldUpdate> {
        self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// A validated patch always holds at least one update.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn validate_operation(index: usize, operation: RawOperation) -> Result<FieldUpdate, DocumentError> {
    let op = operation
        .op
        .ok_or(DocumentError::MissingMember { index, member: "op" })?;
    if op != REPLACE {
        return Err(DocumentError::UnsupportedOperation { index, op });
    }

    let path = operation.path.ok_or(DocumentError::MissingMember {
        index,
        member: "path",
    })?;
    let entry =
        patchable_field(&path).ok_or(DocumentError::UnpatchablePath { index, path })?;

    if operation.value.is_null() {
        return Err(DocumentError::NullValue { index });
    }

    (entry.decode)(&operation.value).map_err(|rejection| match rejection {
        ValueRejection::WrongType(expected) => DocumentError::InvalidValue {
            index,
            field: entry.field,
            expected,
        },
        ValueRejection::Empty => DocumentError::EmptyValue {
            index,
            field: entry.field,
        },
    })
}

// =============================================================================
// Tests
// =============================================================================
