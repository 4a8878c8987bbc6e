//! Cache keys for Collavo resources.

use std::fmt;

/// A cacheable resource, scoped to one project.
///
/// Each kind renders with its own namespace prefix, so keys of different
/// kinds never collide even when project ids look alike.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKey {
  /// Project snapshot (members, permissions, deadline)
  Project(String),
  /// Task list with nested subtasks
  Tasks(String),
  /// Event list
  Events(String),
}

impl ResourceKey {
  /// All resource keys that belong to a project.
  pub fn for_project(project_id: &str) -> [ResourceKey; 3] {
    [
      ResourceKey::Project(project_id.to_string()),
      ResourceKey::Tasks(project_id.to_string()),
      ResourceKey::Events(project_id.to_string()),
    ]
  }

  /// Namespace prefix shared by every key of this kind (e.g. `"tasks-"`).
  pub fn namespace(&self) -> &'static str {
    match self {
      Self::Project(_) => "project-",
      Self::Tasks(_) => "tasks-",
      Self::Events(_) => "events-",
    }
  }

  pub fn project_id(&self) -> &str {
    match self {
      Self::Project(id) | Self::Tasks(id) | Self::Events(id) => id,
    }
  }

  /// String form used as the cache key.
  pub fn cache_key(&self) -> String {
    format!("{}{}", self.namespace(), self.project_id())
  }

  /// REST path the resource is read from.
  pub fn path(&self) -> String {
    match self {
      Self::Project(id) => format!("/api/projects/{}", id),
      Self::Tasks(id) => format!("/api/projects/{}/tasks", id),
      Self::Events(id) => format!("/api/projects/{}/events", id),
    }
  }

  pub fn description(&self) -> String {
    match self {
      Self::Project(id) => format!("project {}", id),
      Self::Tasks(id) => format!("tasks of project {}", id),
      Self::Events(id) => format!("events of project {}", id),
    }
  }
}

impl fmt::Display for ResourceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}{}", self.namespace(), self.project_id())
  }
}
