use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::task::{Status, Task, TaskPatch};

pub const MIN_TITLE_CHARS: usize = 3;
pub const MIN_DESCRIPTION_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Title,
    Description,
    DueDate,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Title => f.write_str("title"),
            Field::Description => f.write_str("description"),
            Field::DueDate => f.write_str("due date"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: Field,
    pub message: &'static str,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message)
    }
}

/// Form contents for creating or editing a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub status: Status,
    pub due_date: Option<NaiveDate>,
}

impl Default for TaskDraft {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            status: Status::Pending,
            due_date: None,
        }
    }
}

impl From<&Task> for TaskDraft {
    fn from(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone(),
            status: task.status,
            due_date: Some(task.due_date),
        }
    }
}

impl TaskDraft {
    /// Builds the task for an already validated draft.
    pub fn into_task(self, id: u64, fallback_due: NaiveDate) -> Task {
        Task::new(
            id,
            self.title,
            self.description,
            self.status,
            self.due_date.unwrap_or(fallback_due),
        )
    }

    pub fn into_patch(self) -> TaskPatch {
        TaskPatch {
            title: Some(self.title),
            description: Some(self.description),
            status: Some(self.status),
            due_date: self.due_date,
            completed: Some(self.status.is_completed()),
        }
    }
}

/// Rules for the create form: edit rules plus a due date no earlier than
/// `today`.
pub fn validate_new(draft: &TaskDraft, today: NaiveDate) -> Vec<FieldError> {
    let mut errors = validate_edit(draft);
    if let Some(due) = draft.due_date
        && due < today
    {
        errors.push(FieldError {
            field: Field::DueDate,
            message: "Due date cannot be in the past",
        });
    }
    errors
}

pub fn validate_edit(draft: &TaskDraft) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if draft.title.trim().is_empty() {
        errors.push(FieldError {
            field: Field::Title,
            message: "Title is required",
        });
    } else if draft.title.chars().count() < MIN_TITLE_CHARS {
        errors.push(FieldError {
            field: Field::Title,
            message: "Title must be at least 3 characters",
        });
    }

    if draft.description.trim().is_empty() {
        errors.push(FieldError {
            field: Field::Description,
            message: "Description is required",
        });
    } else if draft.description.chars().count() < MIN_DESCRIPTION_CHARS {
        errors.push(FieldError {
            field: Field::Description,
            message: "Description must be at least 10 characters",
        });
    }

    if draft.due_date.is_none() {
        errors.push(FieldError {
            field: Field::DueDate,
            message: "Due date is required",
        });
    }

    errors
}
