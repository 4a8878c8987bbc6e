//! Collavo entities, drafts and partial updates.
//!
//! Wire names are camelCase. Fields the client does not model are kept in
//! `extra`, so a record survives a serialize → merge → deserialize cycle
//! without losing server data.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

/// A list entity with a stable id.
pub trait Record: Clone + Serialize + DeserializeOwned {
  fn record_id(&self) -> &str;
}

/// Project member, as embedded in the project snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
  pub user_id: String,
  pub name: String,
  #[serde(default)]
  pub email: Option<String>,
  #[serde(default)]
  pub role: Option<String>,
  #[serde(default)]
  pub permissions: Vec<String>,
}

/// Project snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub deadline: Option<DateTime<Utc>>,
  #[serde(default)]
  pub leader_id: Option<String>,
  #[serde(default)]
  pub members: Vec<Member>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
  Low,
  #[default]
  Medium,
  High,
  Critical,
}

impl Importance {
  pub fn label(&self) -> &'static str {
    match self {
      Importance::Low => "Low",
      Importance::Medium => "Medium",
      Importance::High => "High",
      Importance::Critical => "Critical",
    }
  }
}

/// Task with its nested subtasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  pub id: String,
  #[serde(default)]
  pub project_id: Option<String>,
  pub title: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub importance: Option<Importance>,
  #[serde(default)]
  pub deadline: Option<DateTime<Utc>>,
  #[serde(default)]
  pub assigned_id: Option<String>,
  #[serde(default)]
  pub sub_tasks: Vec<SubTask>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl Task {
  pub fn subtask(&self, id: &str) -> Option<&SubTask> {
    self.sub_tasks.iter().find(|s| s.id == id)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTask {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub note: Option<String>,
  #[serde(default = "default_status")]
  pub status: String,
  #[serde(default)]
  pub deadline: Option<DateTime<Utc>>,
  #[serde(default)]
  pub assigned_id: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

fn default_status() -> String {
  "pending".to_string()
}

/// Calendar event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub description: Option<String>,
  pub datetime: DateTime<Utc>,
  #[serde(default)]
  pub location: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl Record for Task {
  fn record_id(&self) -> &str {
    &self.id
  }
}

impl Record for SubTask {
  fn record_id(&self) -> &str {
    &self.id
  }
}

impl Record for Event {
  fn record_id(&self) -> &str {
    &self.id
  }
}

impl Record for Member {
  fn record_id(&self) -> &str {
    &self.user_id
  }
}

// ============================================================================
// Drafts (request bodies for creation)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
  pub title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub importance: Option<Importance>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub deadline: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub assigned_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTaskDraft {
  pub title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub note: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub deadline: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub assigned_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
  pub title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub datetime: DateTime<Utc>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub location: Option<String>,
}

// ============================================================================
// Partial updates
// ============================================================================

/// Partial record: an id plus the top-level fields that changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
  pub id: String,
  #[serde(flatten)]
  pub fields: Map<String, Value>,
}

impl Patch {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      fields: Map::new(),
    }
  }

  /// Build a patch from a PATCH response body. Non-object bodies carry no
  /// fields.
  pub fn from_response(id: impl Into<String>, body: Value) -> Self {
    let mut fields = match body {
      Value::Object(map) => map,
      _ => Map::new(),
    };
    fields.remove("id");
    Self {
      id: id.into(),
      fields,
    }
  }

  pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
    if field != "id" {
      self.fields.insert(field.to_string(), value.into());
    }
    self
  }

  pub fn get(&self, field: &str) -> Option<&Value> {
    self.fields.get(field)
  }

  pub fn is_empty(&self) -> bool {
    self.fields.is_empty()
  }

  /// Shallow merge: every field of the patch replaces the record's field of
  /// the same name; everything else is left as it was.
  pub fn apply_to<T: Record>(&self, record: &T) -> serde_json::Result<T> {
    let mut value = serde_json::to_value(record)?;
    if let Value::Object(map) = &mut value {
      for (field, v) in &self.fields {
        map.insert(field.clone(), v.clone());
      }
    }
    serde_json::from_value(value)
  }
}
