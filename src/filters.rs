//! Client-side filtering and sorting of fetched tasks.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::api::Task;

/// A field of `T` that lists can be narrowed by.
pub trait FilterSource<T> {
  /// Distinct values of the field, `None` standing for items without one.
  fn unique_values<'a, I>(&self, items: I) -> Vec<Option<String>>
  where
    I: IntoIterator<Item = &'a T>,
    T: 'a;

  /// Keep the items whose field equals `value`.
  /// - `None` keeps everything
  /// - `Some(None)` keeps items without a value
  fn filter<'a, I>(&self, items: I, value: Option<&Option<String>>) -> Vec<&'a T>
  where
    I: IntoIterator<Item = &'a T>,
    T: 'a;
}

/// Progress of a task as derived from its subtasks.
pub fn task_status(task: &Task) -> &'static str {
  let total = task.sub_tasks.len();
  let completed = task
    .sub_tasks
    .iter()
    .filter(|s| s.status == "completed")
    .count();
  let started = task
    .sub_tasks
    .iter()
    .filter(|s| s.status != "pending")
    .count();

  if total > 0 && completed == total {
    "completed"
  } else if started > 0 {
    "in-progress"
  } else {
    "pending"
  }
}

/// (completed subtasks, all subtasks)
pub fn task_progress(task: &Task) -> (usize, usize) {
  let completed = task
    .sub_tasks
    .iter()
    .filter(|s| s.status == "completed")
    .count();
  (completed, task.sub_tasks.len())
}

/// Field to filter tasks by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskFilterField {
  #[default]
  None,
  Assignee,
  Status,
  Importance,
}

impl TaskFilterField {
  /// Extract the value of this filter field from a task
  fn extract(&self, task: &Task) -> Option<String> {
    match self {
      TaskFilterField::None => None,
      TaskFilterField::Assignee => task.assigned_id.clone(),
      TaskFilterField::Status => Some(task_status(task).to_string()),
      TaskFilterField::Importance => task.importance.map(|i| i.label().to_lowercase()),
    }
  }
}

impl FilterSource<Task> for TaskFilterField {
  fn unique_values<'a, I>(&self, items: I) -> Vec<Option<String>>
  where
    I: IntoIterator<Item = &'a Task>,
    Task: 'a,
  {
    if *self == TaskFilterField::None {
      return Vec::new();
    }

    // BTreeSet orders None first
    let values: BTreeSet<Option<String>> = items.into_iter().map(|t| self.extract(t)).collect();
    values.into_iter().collect()
  }

  fn filter<'a, I>(&self, items: I, value: Option<&Option<String>>) -> Vec<&'a Task>
  where
    I: IntoIterator<Item = &'a Task>,
    Task: 'a,
  {
    match value {
      None => items.into_iter().collect(),
      Some(wanted) => items
        .into_iter()
        .filter(|task| self.extract(task) == *wanted)
        .collect(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TaskSort {
  /// Earliest deadline first, tasks without one last
  #[default]
  Deadline,
  /// Most important first
  Importance,
  /// Alphabetical, case-insensitive
  Title,
}

/// Sort tasks in place. Ties keep their current order.
pub fn sort_tasks(tasks: &mut [&Task], sort: TaskSort) {
  match sort {
    TaskSort::Deadline => tasks.sort_by(|a, b| match (a.deadline, b.deadline) {
      (Some(a), Some(b)) => a.cmp(&b),
      (Some(_), None) => Ordering::Less,
      (None, Some(_)) => Ordering::Greater,
      (None, None) => Ordering::Equal,
    }),
    TaskSort::Importance => tasks.sort_by(|a, b| b.importance.cmp(&a.importance)),
    TaskSort::Title => tasks.sort_by_key(|t| t.title.to_lowercase()),
  }
}
