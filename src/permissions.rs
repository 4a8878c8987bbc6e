//! Project permissions and their display labels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::api::{Member, Project};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
  CreateTask,
  HandleTask,
  UpdateTask,
  HandleEvent,
  HandleFile,
  ViewFiles,
  AddMember,
  RemoveMember,
}

impl Permission {
  pub const ALL: &'static [Permission] = &[
    Permission::CreateTask,
    Permission::HandleTask,
    Permission::UpdateTask,
    Permission::HandleEvent,
    Permission::HandleFile,
    Permission::ViewFiles,
    Permission::AddMember,
    Permission::RemoveMember,
  ];

  /// Wire name, e.g. `create_task`
  pub fn as_str(&self) -> &'static str {
    match self {
      Permission::CreateTask => "create_task",
      Permission::HandleTask => "handle_task",
      Permission::UpdateTask => "update_task",
      Permission::HandleEvent => "handle_event",
      Permission::HandleFile => "handle_file",
      Permission::ViewFiles => "view_files",
      Permission::AddMember => "add_member",
      Permission::RemoveMember => "remove_member",
    }
  }

  pub fn label(&self) -> String {
    format_permission_label(self.as_str())
  }
}

impl fmt::Display for Permission {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Permission {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Permission::ALL
      .iter()
      .copied()
      .find(|p| p.as_str() == s)
      .ok_or_else(|| format!("Unknown permission: {}", s))
  }
}

/// Turn a snake_case permission name into a label: `create_task` → `Create Task`.
pub fn format_permission_label(name: &str) -> String {
  name
    .split(|c| c == '_' || c == '-')
    .filter(|word| !word.is_empty())
    .map(|word| {
      let mut chars = word.chars();
      match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
      }
    })
    .collect::<Vec<String>>()
    .join(" ")
}

impl Member {
  pub fn has_permission(&self, permission: Permission) -> bool {
    self.permissions.iter().any(|p| p == permission.as_str())
  }

  /// Labels of the member's permissions, in the order the server sent them.
  pub fn permission_labels(&self) -> Vec<String> {
    self
      .permissions
      .iter()
      .map(|p| format_permission_label(p))
      .collect()
  }
}

impl Project {
  pub fn member(&self, user_id: &str) -> Option<&Member> {
    self.members.iter().find(|m| m.user_id == user_id)
  }

  pub fn is_leader(&self, user_id: &str) -> bool {
    self.leader_id.as_deref() == Some(user_id)
  }

  /// The project leader may do everything; members need the permission.
  pub fn member_can(&self, user_id: &str, permission: Permission) -> bool {
    self.is_leader(user_id)
      || self
        .member(user_id)
        .is_some_and(|m| m.has_permission(permission))
  }
}
