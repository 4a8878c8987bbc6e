//! Client-side checks run before any mutation reaches the network.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::api::{EventDraft, Patch, Project, SubTaskDraft, Task, TaskDraft};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("{0} is required")]
  MissingField(&'static str),

  #[error("Deadline {deadline} is after the {limit_kind} deadline {limit}")]
  DeadlineAfter {
    deadline: DateTime<Utc>,
    limit: DateTime<Utc>,
    limit_kind: &'static str,
  },

  #[error("Deadline {deadline} is before the deadline of subtask \"{subtask}\" ({subtask_deadline})")]
  DeadlineBeforeSubTask {
    deadline: DateTime<Utc>,
    subtask: String,
    subtask_deadline: DateTime<Utc>,
  },

  #[error("{field} has an invalid value: {reason}")]
  InvalidField { field: &'static str, reason: String },

  #[error("At least one recipient is required")]
  NoRecipients,

  #[error("Invalid time of day \"{0}\", expected HH:MM")]
  InvalidTimeOfDay(String),

  #[error("No {kind} with id {id}")]
  UnknownRecord { kind: &'static str, id: String },
}

fn require(value: &str, field: &'static str) -> Result<(), ValidationError> {
  if value.trim().is_empty() {
    Err(ValidationError::MissingField(field))
  } else {
    Ok(())
  }
}

fn not_after(
  deadline: Option<DateTime<Utc>>,
  limit: Option<DateTime<Utc>>,
  limit_kind: &'static str,
) -> Result<(), ValidationError> {
  match (deadline, limit) {
    (Some(deadline), Some(limit)) if deadline > limit => Err(ValidationError::DeadlineAfter {
      deadline,
      limit,
      limit_kind,
    }),
    _ => Ok(()),
  }
}

/// A new task needs a title and may not end after its project.
pub fn validate_task(draft: &TaskDraft, project: &Project) -> Result<(), ValidationError> {
  require(&draft.title, "title")?;
  not_after(draft.deadline, project.deadline, "project")
}

/// A new subtask needs a title and may not end after its task or project.
pub fn validate_subtask(
  draft: &SubTaskDraft,
  task: &Task,
  project: &Project,
) -> Result<(), ValidationError> {
  require(&draft.title, "title")?;
  not_after(draft.deadline, task.deadline, "task")?;
  not_after(draft.deadline, project.deadline, "project")
}

/// A task deadline must stay within the project and cover every subtask.
pub fn validate_task_deadline(
  task: &Task,
  deadline: DateTime<Utc>,
  project: &Project,
) -> Result<(), ValidationError> {
  not_after(Some(deadline), project.deadline, "project")?;

  for subtask in &task.sub_tasks {
    if let Some(subtask_deadline) = subtask.deadline {
      if subtask_deadline > deadline {
        return Err(ValidationError::DeadlineBeforeSubTask {
          deadline,
          subtask: subtask.title.clone(),
          subtask_deadline,
        });
      }
    }
  }
  Ok(())
}

/// Check the fields of a task update that carry rules.
pub fn validate_task_patch(
  patch: &Patch,
  task: &Task,
  project: &Project,
) -> Result<(), ValidationError> {
  if let Some(title) = patch.get("title") {
    require_text(title, "title")?;
  }
  if let Some(deadline) = patch.get("deadline") {
    if !deadline.is_null() {
      let deadline = parse_deadline(deadline)?;
      validate_task_deadline(task, deadline, project)?;
    }
  }
  Ok(())
}

/// Check the fields of a subtask update that carry rules.
pub fn validate_subtask_patch(
  patch: &Patch,
  task: &Task,
  project: &Project,
) -> Result<(), ValidationError> {
  if let Some(title) = patch.get("title") {
    require_text(title, "title")?;
  }
  if let Some(deadline) = patch.get("deadline") {
    if !deadline.is_null() {
      let deadline = parse_deadline(deadline)?;
      not_after(Some(deadline), task.deadline, "task")?;
      not_after(Some(deadline), project.deadline, "project")?;
    }
  }
  Ok(())
}

pub fn validate_event(draft: &EventDraft) -> Result<(), ValidationError> {
  require(&draft.title, "title")
}

pub fn validate_event_patch(patch: &Patch) -> Result<(), ValidationError> {
  if let Some(title) = patch.get("title") {
    require_text(title, "title")?;
  }
  if let Some(datetime) = patch.get("datetime") {
    parse_datetime(datetime, "datetime")?;
  }
  Ok(())
}

/// A patched text field must be a non-blank string.
fn require_text(value: &serde_json::Value, field: &'static str) -> Result<(), ValidationError> {
  match value.as_str() {
    Some(text) => require(text, field),
    None => Err(ValidationError::InvalidField {
      field,
      reason: format!("expected a string, got {}", value),
    }),
  }
}

fn parse_deadline(value: &serde_json::Value) -> Result<DateTime<Utc>, ValidationError> {
  parse_datetime(value, "deadline")
}

fn parse_datetime(
  value: &serde_json::Value,
  field: &'static str,
) -> Result<DateTime<Utc>, ValidationError> {
  DateTime::<Utc>::deserialize(value).map_err(|e| ValidationError::InvalidField {
    field,
    reason: e.to_string(),
  })
}
