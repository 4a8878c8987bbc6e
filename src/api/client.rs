//! Collavo resource client: cached reads and uncached mutations.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::cache::{CacheLayer, CacheResult, ResourceKey};
use crate::error::{ApiError, ApiResult};
use crate::notifications::{NotificationRequest, NotificationStatus};
use crate::query::Query;

use super::backend::Backend;
use super::types::{Event, EventDraft, Patch, Project, SubTask, SubTaskDraft, Task, TaskDraft};

/// `GET /api/projects/{id}/events` wraps the list
#[derive(Debug, Deserialize)]
struct EventsEnvelope {
  #[serde(default)]
  events: Vec<Event>,
}

/// Collavo client with transparent caching of reads.
///
/// Reads go through the shared [`CacheLayer`]; mutations always hit the
/// network and never touch the cache themselves. Callers that apply a
/// mutation locally invalidate the affected key (see `state`).
pub struct CollavoClient<B: Backend> {
  backend: Arc<B>,
  cache: CacheLayer,
}

impl<B: Backend> Clone for CollavoClient<B> {
  fn clone(&self) -> Self {
    Self {
      backend: Arc::clone(&self.backend),
      cache: self.cache.clone(),
    }
  }
}

impl<B: Backend> CollavoClient<B> {
  pub fn new(backend: B, cache: CacheLayer) -> Self {
    Self {
      backend: Arc::new(backend),
      cache,
    }
  }

  pub fn backend(&self) -> &B {
    &self.backend
  }

  pub fn cache(&self) -> &CacheLayer {
    &self.cache
  }

  // ==========================================================================
  // Cached reads
  // ==========================================================================

  async fn fetch_resource(&self, key: &ResourceKey) -> ApiResult<CacheResult<Arc<Value>>> {
    let backend = Arc::clone(&self.backend);
    let path = key.path();
    self
      .cache
      .fetch(&key.cache_key(), move || async move {
        backend.request(Method::GET, path, None).await
      })
      .await
  }

  async fn fetch_decoded<T: DeserializeOwned>(&self, key: &ResourceKey) -> ApiResult<T> {
    let result = self.fetch_resource(key).await?;
    T::deserialize(result.data.as_ref())
      .map_err(|e| ApiError::Decode(format!("{}: {}", key.description(), e)))
  }

  /// Project snapshot with members and permissions.
  pub async fn get_project(&self, project_id: &str) -> ApiResult<Project> {
    self
      .fetch_decoded(&ResourceKey::Project(project_id.to_string()))
      .await
  }

  /// Tasks of a project, with nested subtasks.
  pub async fn get_tasks(&self, project_id: &str) -> ApiResult<Vec<Task>> {
    self
      .fetch_decoded(&ResourceKey::Tasks(project_id.to_string()))
      .await
  }

  pub async fn get_events(&self, project_id: &str) -> ApiResult<Vec<Event>> {
    let envelope: EventsEnvelope = self
      .fetch_decoded(&ResourceKey::Events(project_id.to_string()))
      .await?;
    Ok(envelope.events)
  }

  /// Project and tasks together; either failing fails the whole load.
  pub async fn load_task_board(&self, project_id: &str) -> ApiResult<(Project, Vec<Task>)> {
    tokio::try_join!(self.get_project(project_id), self.get_tasks(project_id))
  }

  /// Project and events together; either failing fails the whole load.
  pub async fn load_event_board(&self, project_id: &str) -> ApiResult<(Project, Vec<Event>)> {
    tokio::try_join!(self.get_project(project_id), self.get_events(project_id))
  }

  // ==========================================================================
  // Hook-style queries
  // ==========================================================================

  pub fn project_query(&self, project_id: &str) -> Query<Project> {
    let client = self.clone();
    let project_id = project_id.to_string();
    Query::new(move || {
      let client = client.clone();
      let project_id = project_id.clone();
      async move { client.get_project(&project_id).await }
    })
  }

  pub fn tasks_query(&self, project_id: &str) -> Query<Vec<Task>> {
    let client = self.clone();
    let project_id = project_id.to_string();
    Query::new(move || {
      let client = client.clone();
      let project_id = project_id.clone();
      async move { client.get_tasks(&project_id).await }
    })
  }

  pub fn events_query(&self, project_id: &str) -> Query<Vec<Event>> {
    let client = self.clone();
    let project_id = project_id.to_string();
    Query::new(move || {
      let client = client.clone();
      let project_id = project_id.clone();
      async move { client.get_events(&project_id).await }
    })
  }

  // ==========================================================================
  // Invalidation
  // ==========================================================================

  pub fn invalidate(&self, key: &ResourceKey) {
    self.cache.invalidate(&key.cache_key());
  }

  /// Invalidate project, tasks and events of one project.
  pub fn invalidate_project(&self, project_id: &str) {
    for key in ResourceKey::for_project(project_id) {
      self.invalidate(&key);
    }
  }

  // ==========================================================================
  // Mutations (never cached)
  // ==========================================================================

  async fn send<T: DeserializeOwned>(
    &self,
    method: Method,
    path: String,
    body: Option<Value>,
  ) -> ApiResult<T> {
    info!(%method, %path, "sending mutation");
    let value = self.backend.request(method, path, body).await?;
    T::deserialize(&value).map_err(ApiError::decode)
  }

  fn body(value: &impl Serialize) -> ApiResult<Option<Value>> {
    serde_json::to_value(value).map(Some).map_err(ApiError::decode)
  }

  pub async fn create_task(&self, project_id: &str, draft: &TaskDraft) -> ApiResult<Task> {
    let path = format!("/api/projects/{}/tasks", project_id);
    self.send(Method::POST, path, Self::body(draft)?).await
  }

  /// Returns the fields the server reports as changed.
  pub async fn update_task(&self, project_id: &str, patch: &Patch) -> ApiResult<Patch> {
    let path = format!("/api/projects/{}/tasks/{}", project_id, patch.id);
    let body = Value::Object(patch.fields.clone());
    let response: Value = self.send(Method::PATCH, path, Some(body)).await?;
    Ok(merge_response(patch, response))
  }

  pub async fn delete_task(&self, project_id: &str, task_id: &str) -> ApiResult<()> {
    let path = format!("/api/projects/{}/tasks/{}", project_id, task_id);
    let _: Value = self.send(Method::DELETE, path, None).await?;
    Ok(())
  }

  pub async fn create_subtask(
    &self,
    project_id: &str,
    task_id: &str,
    draft: &SubTaskDraft,
  ) -> ApiResult<SubTask> {
    let path = format!("/api/projects/{}/tasks/{}/subtasks", project_id, task_id);
    self.send(Method::POST, path, Self::body(draft)?).await
  }

  pub async fn update_subtask(
    &self,
    project_id: &str,
    task_id: &str,
    patch: &Patch,
  ) -> ApiResult<Patch> {
    let path = format!(
      "/api/projects/{}/tasks/{}/subtasks/{}",
      project_id, task_id, patch.id
    );
    let body = Value::Object(patch.fields.clone());
    let response: Value = self.send(Method::PATCH, path, Some(body)).await?;
    Ok(merge_response(patch, response))
  }

  pub async fn delete_subtask(
    &self,
    project_id: &str,
    task_id: &str,
    subtask_id: &str,
  ) -> ApiResult<()> {
    let path = format!(
      "/api/projects/{}/tasks/{}/subtasks/{}",
      project_id, task_id, subtask_id
    );
    let _: Value = self.send(Method::DELETE, path, None).await?;
    Ok(())
  }

  pub async fn create_event(&self, project_id: &str, draft: &EventDraft) -> ApiResult<Event> {
    let path = format!("/api/projects/{}/events", project_id);
    self.send(Method::POST, path, Self::body(draft)?).await
  }

  pub async fn update_event(&self, project_id: &str, patch: &Patch) -> ApiResult<Patch> {
    let path = format!("/api/projects/{}/events/{}", project_id, patch.id);
    let body = Value::Object(patch.fields.clone());
    let response: Value = self.send(Method::PATCH, path, Some(body)).await?;
    Ok(merge_response(patch, response))
  }

  pub async fn delete_event(&self, project_id: &str, event_id: &str) -> ApiResult<()> {
    let path = format!("/api/projects/{}/events/{}", project_id, event_id);
    let _: Value = self.send(Method::DELETE, path, None).await?;
    Ok(())
  }

  /// Ask the server to email a reminder before an event.
  pub async fn schedule_event_notification(
    &self,
    project_id: &str,
    event_id: &str,
    request: &NotificationRequest,
  ) -> ApiResult<NotificationStatus> {
    let path = format!(
      "/api/projects/{}/events/{}/notifications",
      project_id, event_id
    );
    self.send(Method::POST, path, Self::body(request)?).await
  }

  /// Ask the server to email a reminder before a subtask deadline.
  pub async fn schedule_subtask_notification(
    &self,
    project_id: &str,
    task_id: &str,
    subtask_id: &str,
    request: &NotificationRequest,
  ) -> ApiResult<NotificationStatus> {
    let path = format!(
      "/api/projects/{}/tasks/{}/subtasks/{}/notifications",
      project_id, task_id, subtask_id
    );
    self.send(Method::POST, path, Self::body(request)?).await
  }
}

/// The server's PATCH reply wins for every field it returns; fields it omits
/// keep the value that was sent.
fn merge_response(sent: &Patch, response: Value) -> Patch {
  let returned = Patch::from_response(sent.id.clone(), response);
  let mut merged = sent.clone();
  merged.fields.extend(returned.fields);
  merged
}
