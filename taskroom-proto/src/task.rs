//! Task domain types shared by the sync protocol and the REST surface.
//!
//! Tasks are created and mutated through the REST collaborator; the sync
//! channel only carries already-persisted tasks. Ids are server-assigned,
//! so the client never invents one.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Minimum task title length in characters, after trimming.
pub const MIN_TITLE_LENGTH: usize = 3;

/// Unique identifier for a task, assigned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    /// Wraps a raw server-assigned task id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a project, assigned by the server.
///
/// Doubles as the room key on the sync channel: joining a room means
/// subscribing to the push events of one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(u64);

impl ProjectId {
    /// Wraps a raw server-assigned project id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A task as persisted by the server.
///
/// Field names match the REST representation (snake_case JSON).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Server-assigned unique identifier.
    pub id: TaskId,
    /// Short display title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Calendar date the task is due.
    pub due_date: NaiveDate,
    /// Whether the task has been completed.
    pub completed: bool,
    /// Project this task is scoped to, if any.
    pub project_id: Option<ProjectId>,
}

/// Client-side payload for creating or updating a task.
///
/// Drafts carry no id; the server assigns one on creation. Validation
/// happens in the client before any network call is made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    /// Short display title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Calendar date the task is due.
    pub due_date: NaiveDate,
    /// Whether the task is already completed.
    #[serde(default)]
    pub completed: bool,
    /// Project to scope the task to, if any.
    pub project_id: Option<ProjectId>,
}

/// Validation errors for a [`TaskDraft`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TaskValidationError {
    /// Title is shorter than [`MIN_TITLE_LENGTH`] characters after trimming.
    #[error("task title must be at least {MIN_TITLE_LENGTH} characters")]
    TitleTooShort,
    /// Description is empty after trimming.
    #[error("task description cannot be empty")]
    DescriptionEmpty,
    /// Due date lies in the past for a task that is not yet completed.
    #[error("due date {0} is in the past")]
    DueDateInPast(NaiveDate),
}

impl TaskDraft {
    /// Validates this draft against the creation rules.
    ///
    /// A past due date is accepted when the task is already completed
    /// (backfilling finished work is allowed).
    ///
    /// # Errors
    ///
    /// Returns the first failing [`TaskValidationError`].
    pub fn validate(&self, today: NaiveDate) -> Result<(), TaskValidationError> {
        if self.title.trim().chars().count() < MIN_TITLE_LENGTH {
            return Err(TaskValidationError::TitleTooShort);
        }
        if self.description.trim().is_empty() {
            return Err(TaskValidationError::DescriptionEmpty);
        }
        if !self.completed && self.due_date < today {
            return Err(TaskValidationError::DueDateInPast(self.due_date));
        }
        Ok(())
    }
}
