//! Task domain model.
//!
//! A task belongs to exactly one user and is only ever mutated through the
//! patch protocol (see [`crate::domain::patch`]).

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use super::patch::FieldUpdate;
use super::user::{UserId, UserSummary};

// =============================================================================
// Value Objects - Newtypes
// =============================================================================

/// Unique identifier for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(i64);

impl TaskId {
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.parse().map(Self)
    }
}

/// A UTC timestamp with microsecond precision.
///
/// Sub-microsecond digits are dropped on construction so a timestamp
/// read back from `PostgreSQL` (`TIMESTAMPTZ`) is identical to the one
/// that was written. Fingerprints depend on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    #[must_use]
    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime.trunc_subsecs(6))
    }

    #[must_use]
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Returns the current time.
    ///
    /// **Note**: This reads the system clock.
    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Returns the current time, or one microsecond past `previous` if the
    /// clock has not moved beyond it.
    #[must_use]
    pub fn now_after(previous: Self) -> Self {
        let now = Self::now();
        if now > previous {
            now
        } else {
            Self(previous.0 + chrono::Duration::microseconds(1))
        }
    }

    /// RFC 3339 rendering with exactly six fractional digits.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.to_rfc3339())
    }
}

// =============================================================================
// Task
// =============================================================================

/// A task as stored, joined with its owner's public projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub owner: UserSummary,
    pub name: String,
    pub description: Option<String>,
    pub progression: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Task {
    /// Returns true if `user` owns this task.
    #[must_use]
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner.id == user
    }

    /// Returns a copy of the task with one whitelisted field replaced.
    #[must_use]
    pub fn apply_update(mut self, update: &FieldUpdate) -> Self {
        match update {
            FieldUpdate::Name(name) => self.name.clone_from(name),
            FieldUpdate::Description(description) => {
                self.description = Some(description.clone());
            }
            FieldUpdate::Progression(progression) => self.progression = *progression,
        }
        self
    }

    /// Returns a copy of the task with `updated_at` set to `at`.
    #[must_use]
    pub const fn touched(mut self, at: Timestamp) -> Self {
        self.updated_at = at;
        self
    }
}

/// Data needed to insert a new task. Ids and timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub owner: UserId,
    pub name: String,
    pub description: Option<String>,
    pub progression: i64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn task() -> Task {
        let created = Timestamp::now();
        Task {
            id: TaskId::new(1),
            owner: UserSummary::new(UserId::new(7), "alice"),
            name: "First task".to_string(),
            description: Some("This is the first task".to_string()),
            progression: 0,
            created_at: created,
            updated_at: created,
        }
    }

    #[rstest]
    #[case("42", Some(42))]
    #[case("-3", Some(-3))]
    #[case("hello", None)]
    #[case("", None)]
    fn test_task_id_from_str(#[case] input: &str, #[case] expected: Option<i64>) {
        let parsed = input.parse::<TaskId>().ok().map(TaskId::value);
        assert_eq!(parsed, expected);
    }

    #[rstest]
    fn test_timestamp_truncates_to_microseconds() {
        let datetime = DateTime::parse_from_rfc3339("2024-01-02T03:04:05.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        let timestamp = Timestamp::from_datetime(datetime);
        assert_eq!(timestamp.to_rfc3339(), "2024-01-02T03:04:05.123456Z");
    }

    #[rstest]
    fn test_now_after_is_strictly_later() {
        let future = Timestamp::from_datetime(Utc::now() + chrono::Duration::hours(1));
        assert!(Timestamp::now_after(future) > future);

        let past = Timestamp::from_datetime(Utc::now() - chrono::Duration::hours(1));
        assert!(Timestamp::now_after(past) > past);
    }

    #[rstest]
    fn test_is_owned_by(task: Task) {
        assert!(task.is_owned_by(UserId::new(7)));
        assert!(!task.is_owned_by(UserId::new(8)));
    }

    #[rstest]
    fn test_apply_update_name_leaves_other_fields(task: Task) {
        let updated = task
            .clone()
            .apply_update(&FieldUpdate::Name("Patched name".to_string()));

        assert_eq!(updated.name, "Patched name");
        assert_eq!(updated.description, task.description);
        assert_eq!(updated.progression, task.progression);
        assert_eq!(updated.updated_at, task.updated_at);
    }

    #[rstest]
    fn test_apply_update_description_and_progression(task: Task) {
        let updated = task
            .apply_update(&FieldUpdate::Description("new".to_string()))
            .apply_update(&FieldUpdate::Progression(-12));

        assert_eq!(updated.description.as_deref(), Some("new"));
        assert_eq!(updated.progression, -12);
    }
}
