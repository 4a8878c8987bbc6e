//! Tasks page view model: a project's tasks with their subtasks.

use tracing::{info, warn};

use crate::api::{Backend, CollavoClient, Patch, Project, SubTask, SubTaskDraft, Task, TaskDraft};
use crate::cache::ResourceKey;
use crate::error::ApiResult;
use crate::filters::{sort_tasks, FilterSource, TaskFilterField, TaskSort};
use crate::notifications::{NotificationRequest, NotificationStatus};
use crate::validation::{
  validate_subtask, validate_subtask_patch, validate_task, validate_task_patch, ValidationError,
};

use super::list::{ListState, NestedOp, Placement, RefreshTicket};

/// Wire name of the subtask list inside a task
const SUBTASKS_FIELD: &str = "subTasks";

pub struct TaskBoard<B: Backend> {
  client: CollavoClient<B>,
  project: Project,
  tasks: ListState<Task>,
}

impl<B: Backend> TaskBoard<B> {
  /// Fetch the project and its tasks. Either failing fails the page.
  pub async fn load(client: CollavoClient<B>, project_id: &str) -> ApiResult<Self> {
    let (project, tasks) = client.load_task_board(project_id).await?;
    info!(project = %project.id, tasks = tasks.len(), "task board loaded");
    Ok(Self {
      client,
      project,
      tasks: ListState::new(tasks, Placement::Front),
    })
  }

  pub fn client(&self) -> &CollavoClient<B> {
    &self.client
  }

  pub fn project(&self) -> &Project {
    &self.project
  }

  pub fn tasks(&self) -> &[Task] {
    self.tasks.items()
  }

  pub fn task(&self, id: &str) -> Option<&Task> {
    self.tasks.get(id)
  }

  pub fn state(&self) -> &ListState<Task> {
    &self.tasks
  }

  /// Tasks matching every `(field, value)` pair, in `sort` order.
  pub fn visible_tasks(
    &self,
    filters: &[(TaskFilterField, Option<String>)],
    sort: TaskSort,
  ) -> Vec<&Task> {
    let mut tasks: Vec<&Task> = self.tasks.items().iter().collect();
    for (field, value) in filters {
      tasks = field.filter(tasks, Some(value));
    }
    sort_tasks(&mut tasks, sort);
    tasks
  }

  fn tasks_key(&self) -> ResourceKey {
    ResourceKey::Tasks(self.project.id.clone())
  }

  fn find_task(&self, task_id: &str) -> Result<&Task, ValidationError> {
    self
      .tasks
      .get(task_id)
      .ok_or_else(|| ValidationError::UnknownRecord {
        kind: "task",
        id: task_id.to_string(),
      })
  }

  fn find_subtask(&self, task_id: &str, subtask_id: &str) -> Result<&SubTask, ValidationError> {
    self
      .find_task(task_id)?
      .subtask(subtask_id)
      .ok_or_else(|| ValidationError::UnknownRecord {
        kind: "subtask",
        id: subtask_id.to_string(),
      })
  }

  // ==========================================================================
  // Refresh
  // ==========================================================================

  pub fn begin_refresh(&self) -> RefreshTicket {
    self.tasks.begin_refresh()
  }

  /// Install a refreshed task list fetched after `ticket` was taken.
  pub fn apply_refresh(&mut self, ticket: RefreshTicket, tasks: Vec<Task>) {
    self.tasks.reconcile(ticket, tasks);
  }

  /// Re-fetch the task list from the server.
  pub async fn refresh(&mut self) -> ApiResult<()> {
    self.client.invalidate(&self.tasks_key());
    let ticket = self.begin_refresh();
    let tasks = self.client.get_tasks(&self.project.id).await?;
    self.apply_refresh(ticket, tasks);
    Ok(())
  }

  // ==========================================================================
  // Local handlers
  // ==========================================================================

  pub fn on_task_created(&mut self, task: Task) {
    self.tasks.on_created(task);
    self.client.invalidate(&self.tasks_key());
  }

  pub fn on_task_updated(&mut self, patch: Patch) {
    self.tasks.on_updated(patch);
    self.client.invalidate(&self.tasks_key());
  }

  pub fn on_task_deleted(&mut self, task_id: &str) {
    self.tasks.on_deleted(task_id);
    self.client.invalidate(&self.tasks_key());
  }

  pub fn on_subtask_created(&mut self, task_id: &str, subtask: SubTask) {
    match serde_json::to_value(&subtask) {
      Ok(value) => {
        self
          .tasks
          .on_nested(task_id, SUBTASKS_FIELD, NestedOp::Created(value));
        self.client.invalidate(&self.tasks_key());
      }
      Err(e) => warn!(task = task_id, subtask = %subtask.id, error = %e, "subtask not applied"),
    }
  }

  /// Merge only the fields in `patch` into the matching subtask.
  pub fn on_subtask_updated(&mut self, task_id: &str, patch: Patch) {
    self
      .tasks
      .on_nested(task_id, SUBTASKS_FIELD, NestedOp::Updated(patch));
    self.client.invalidate(&self.tasks_key());
  }

  pub fn on_subtask_deleted(&mut self, task_id: &str, subtask_id: &str) {
    self.tasks.on_nested(
      task_id,
      SUBTASKS_FIELD,
      NestedOp::Deleted(subtask_id.to_string()),
    );
    self.client.invalidate(&self.tasks_key());
  }

  // ==========================================================================
  // User actions: validate, send, then apply on success
  // ==========================================================================

  pub async fn create_task(&mut self, draft: TaskDraft) -> ApiResult<Task> {
    validate_task(&draft, &self.project)?;
    let task = self.client.create_task(&self.project.id, &draft).await?;
    info!(task = %task.id, "task created");
    self.on_task_created(task.clone());
    Ok(task)
  }

  pub async fn update_task(&mut self, patch: Patch) -> ApiResult<()> {
    let task = self.find_task(&patch.id)?;
    validate_task_patch(&patch, task, &self.project)?;

    let confirmed = self.client.update_task(&self.project.id, &patch).await?;
    info!(task = %confirmed.id, "task updated");
    self.on_task_updated(confirmed);
    Ok(())
  }

  pub async fn delete_task(&mut self, task_id: &str) -> ApiResult<()> {
    self.find_task(task_id)?;
    self.client.delete_task(&self.project.id, task_id).await?;
    info!(task = task_id, "task deleted");
    self.on_task_deleted(task_id);
    Ok(())
  }

  pub async fn create_subtask(&mut self, task_id: &str, draft: SubTaskDraft) -> ApiResult<SubTask> {
    let task = self.find_task(task_id)?;
    validate_subtask(&draft, task, &self.project)?;

    let subtask = self
      .client
      .create_subtask(&self.project.id, task_id, &draft)
      .await?;
    info!(task = task_id, subtask = %subtask.id, "subtask created");
    self.on_subtask_created(task_id, subtask.clone());
    Ok(subtask)
  }

  pub async fn update_subtask(&mut self, task_id: &str, patch: Patch) -> ApiResult<()> {
    self.find_subtask(task_id, &patch.id)?;
    let task = self.find_task(task_id)?;
    validate_subtask_patch(&patch, task, &self.project)?;

    let confirmed = self
      .client
      .update_subtask(&self.project.id, task_id, &patch)
      .await?;
    info!(task = task_id, subtask = %confirmed.id, "subtask updated");
    self.on_subtask_updated(task_id, confirmed);
    Ok(())
  }

  pub async fn delete_subtask(&mut self, task_id: &str, subtask_id: &str) -> ApiResult<()> {
    self.find_subtask(task_id, subtask_id)?;
    self
      .client
      .delete_subtask(&self.project.id, task_id, subtask_id)
      .await?;
    info!(task = task_id, subtask = subtask_id, "subtask deleted");
    self.on_subtask_deleted(task_id, subtask_id);
    Ok(())
  }

  /// Ask the server to email a reminder before a subtask's deadline.
  pub async fn schedule_subtask_reminder(
    &self,
    task_id: &str,
    subtask_id: &str,
    request: &NotificationRequest,
  ) -> ApiResult<NotificationStatus> {
    let subtask = self.find_subtask(task_id, subtask_id)?;
    if subtask.deadline.is_none() {
      return Err(
        ValidationError::InvalidField {
          field: "deadline",
          reason: "a reminder needs a deadline".to_string(),
        }
        .into(),
      );
    }

    self
      .client
      .schedule_subtask_notification(&self.project.id, task_id, subtask_id, request)
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::testing::FakeBackend;
  use crate::cache::CacheLayer;
  use crate::error::ApiError;
  use crate::notifications::TimeOfDay;
  use chrono::{TimeZone, Utc};
  use reqwest::Method;
  use serde_json::json;

  fn backend() -> FakeBackend {
    FakeBackend::new()
      .reply(
        Method::GET,
        "/api/projects/p1",
        json!({ "id": "p1", "name": "Collavo", "deadline": "2026-12-31T00:00:00Z" }),
      )
      .reply(
        Method::GET,
        "/api/projects/p1/tasks",
        json!([
          {
            "id": "t1",
            "title": "Launch",
            "deadline": "2026-12-01T00:00:00Z",
            "subTasks": [
              { "id": "s1", "title": "Copy", "note": "short", "status": "pending" },
              { "id": "s2", "title": "Design", "status": "pending", "deadline": "2026-11-20T00:00:00Z" }
            ]
          }
        ]),
      )
  }

  async fn board(backend: FakeBackend) -> TaskBoard<FakeBackend> {
    let client = CollavoClient::new(backend, CacheLayer::default());
    TaskBoard::load(client, "p1").await.unwrap()
  }

  fn task_ids(board: &TaskBoard<FakeBackend>) -> Vec<&str> {
    board.tasks().iter().map(|t| t.id.as_str()).collect()
  }

  #[tokio::test]
  async fn test_load_failure_fails_page() {
    let backend = backend().fail(Method::GET, "/api/projects/p1", 500, "Internal Server Error");
    let client = CollavoClient::new(backend, CacheLayer::default());

    let err = TaskBoard::load(client, "p1").await.err().unwrap();
    assert_eq!(err.status(), Some(500));
  }

  #[tokio::test]
  async fn test_create_task_prepends_and_invalidates() {
    let backend = backend().reply(
      Method::POST,
      "/api/projects/p1/tasks",
      json!({ "id": "t2", "title": "Review" }),
    );
    let mut board = board(backend).await;
    assert!(board.client().cache().cache().get("tasks-p1").is_some());

    let draft = TaskDraft {
      title: "Review".to_string(),
      ..Default::default()
    };
    let task = board.create_task(draft).await.unwrap();

    assert_eq!(task.id, "t2");
    assert_eq!(task_ids(&board), vec!["t2", "t1"]);
    assert!(board.client().cache().cache().get("tasks-p1").is_none());
  }

  #[tokio::test]
  async fn test_failed_create_leaves_state() {
    let backend = backend().fail(Method::POST, "/api/projects/p1/tasks", 500, "Internal Server Error");
    let mut board = board(backend).await;

    let draft = TaskDraft {
      title: "Review".to_string(),
      ..Default::default()
    };
    let err = board.create_task(draft).await.unwrap_err();

    assert!(err.to_string().contains("Internal Server Error"));
    assert_eq!(task_ids(&board), vec!["t1"]);
    assert!(board.client().cache().cache().get("tasks-p1").is_some());
  }

  #[tokio::test]
  async fn test_invalid_draft_never_reaches_server() {
    let mut board = board(backend()).await;
    let calls = board.client().backend().total_calls();

    let draft = TaskDraft {
      title: "Late".to_string(),
      deadline: Some(Utc.with_ymd_and_hms(2027, 1, 15, 0, 0, 0).unwrap()),
      ..Default::default()
    };
    let err = board.create_task(draft).await.unwrap_err();

    assert!(matches!(
      err,
      ApiError::Validation(ValidationError::DeadlineAfter { limit_kind: "project", .. })
    ));
    assert_eq!(board.client().backend().total_calls(), calls);
  }

  #[tokio::test]
  async fn test_update_subtask_merges_only_patch_fields() {
    let backend = backend().reply(
      Method::PATCH,
      "/api/projects/p1/tasks/t1/subtasks/s1",
      json!({ "id": "s1", "status": "completed" }),
    );
    let mut board = board(backend).await;

    assert!(board.client().cache().cache().get("tasks-p1").is_some());
    board
      .update_subtask("t1", Patch::new("s1").set("status", "completed"))
      .await
      .unwrap();
    assert!(board.client().cache().cache().get("tasks-p1").is_none());

    let task = board.task("t1").unwrap();
    let s1 = task.subtask("s1").unwrap();
    assert_eq!(s1.status, "completed");
    assert_eq!(s1.note.as_deref(), Some("short"));
    assert_eq!(task.subtask("s2").unwrap().status, "pending");
  }

  #[tokio::test]
  async fn test_task_deadline_before_subtask_is_rejected() {
    let mut board = board(backend()).await;
    let patch = Patch::new("t1").set("deadline", "2026-11-10T00:00:00Z");

    let err = board.update_task(patch).await.unwrap_err();
    assert!(matches!(
      err,
      ApiError::Validation(ValidationError::DeadlineBeforeSubTask { .. })
    ));
  }

  #[tokio::test]
  async fn test_subtask_lifecycle() {
    let backend = backend()
      .reply(
        Method::POST,
        "/api/projects/p1/tasks/t1/subtasks",
        json!({ "id": "s3", "title": "Ship" }),
      )
      .reply(
        Method::DELETE,
        "/api/projects/p1/tasks/t1/subtasks/s1",
        json!(null),
      );
    let mut board = board(backend).await;

    let draft = SubTaskDraft {
      title: "Ship".to_string(),
      ..Default::default()
    };
    let created = board.create_subtask("t1", draft).await.unwrap();
    assert_eq!(created.status, "pending");
    assert_eq!(board.task("t1").unwrap().sub_tasks.len(), 3);
    assert!(board.client().cache().cache().get("tasks-p1").is_none());

    // Another reader repopulates the cache without touching the board
    board.client().get_tasks("p1").await.unwrap();
    assert!(board.client().cache().cache().get("tasks-p1").is_some());

    board.delete_subtask("t1", "s1").await.unwrap();
    assert!(board.client().cache().cache().get("tasks-p1").is_none());
    let task = board.task("t1").unwrap();
    assert!(task.subtask("s1").is_none());
    assert!(task.subtask("s3").is_some());
  }

  #[tokio::test]
  async fn test_update_and_delete_task_invalidate_list() {
    let backend = backend()
      .reply(
        Method::PATCH,
        "/api/projects/p1/tasks/t1",
        json!({ "id": "t1", "title": "Launch v2" }),
      )
      .reply(Method::DELETE, "/api/projects/p1/tasks/t1", json!(null));
    let mut board = board(backend).await;
    let cached = |board: &TaskBoard<FakeBackend>| board.client().cache().cache().get("tasks-p1");

    board
      .update_task(Patch::new("t1").set("title", "Launch v2"))
      .await
      .unwrap();
    assert_eq!(board.task("t1").unwrap().title, "Launch v2");
    assert!(cached(&board).is_none());

    board.client().get_tasks("p1").await.unwrap();
    assert!(cached(&board).is_some());

    board.delete_task("t1").await.unwrap();
    assert!(board.tasks().is_empty());
    assert!(cached(&board).is_none());
  }

  #[tokio::test]
  async fn test_unknown_subtask_never_reaches_server() {
    let mut board = board(backend()).await;
    let calls = board.client().backend().total_calls();

    let err = board.delete_subtask("t1", "s9").await.unwrap_err();
    assert!(matches!(
      err,
      ApiError::Validation(ValidationError::UnknownRecord { kind: "subtask", .. })
    ));

    let err = board
      .update_subtask("t1", Patch::new("s9").set("status", "completed"))
      .await
      .unwrap_err();
    assert!(matches!(
      err,
      ApiError::Validation(ValidationError::UnknownRecord { kind: "subtask", .. })
    ));

    assert_eq!(board.client().backend().total_calls(), calls);
    assert_eq!(board.task("t1").unwrap().sub_tasks.len(), 2);
  }

  #[tokio::test]
  async fn test_unknown_task_is_rejected() {
    let mut board = board(backend()).await;
    let err = board.delete_task("t9").await.unwrap_err();
    assert!(matches!(
      err,
      ApiError::Validation(ValidationError::UnknownRecord { kind: "task", .. })
    ));
  }

  #[tokio::test]
  async fn test_refresh_keeps_later_mutations() {
    let backend = backend().reply(
      Method::DELETE,
      "/api/projects/p1/tasks/t1",
      json!(null),
    );
    let mut board = board(backend).await;

    let ticket = board.begin_refresh();
    board.delete_task("t1").await.unwrap();

    // The refreshed list was read before the delete landed
    let stale = board.state().confirmed().to_vec();
    board.apply_refresh(ticket, stale);
    assert!(board.tasks().is_empty());

    // A full refresh reads through the invalidated cache again
    board.refresh().await.unwrap();
    assert_eq!(
      board
        .client()
        .backend()
        .calls(&Method::GET, "/api/projects/p1/tasks"),
      2
    );
  }

  #[tokio::test]
  async fn test_subtask_reminder_needs_deadline() {
    let backend = backend().reply(
      Method::POST,
      "/api/projects/p1/tasks/t1/subtasks/s2/notifications",
      json!({ "success": true }),
    );
    let board = board(backend).await;
    let request =
      NotificationRequest::new(vec!["u1".to_string()], 2, TimeOfDay::default()).unwrap();

    let err = board
      .schedule_subtask_reminder("t1", "s1", &request)
      .await
      .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let status = board
      .schedule_subtask_reminder("t1", "s2", &request)
      .await
      .unwrap();
    assert!(status.success);
  }

  #[tokio::test]
  async fn test_visible_tasks_filters_by_status() {
    let backend = backend().reply(
      Method::POST,
      "/api/projects/p1/tasks",
      json!({ "id": "t2", "title": "Review", "subTasks": [{ "id": "s9", "title": "x", "status": "completed" }] }),
    );
    let mut board = board(backend).await;
    board
      .create_task(TaskDraft {
        title: "Review".to_string(),
        ..Default::default()
      })
      .await
      .unwrap();

    let completed = (TaskFilterField::Status, Some("completed".to_string()));
    let visible = board.visible_tasks(&[completed.clone()], TaskSort::Title);
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, "t2");

    let unassigned = (TaskFilterField::Assignee, None);
    let visible = board.visible_tasks(&[completed, unassigned], TaskSort::Title);
    assert_eq!(visible.len(), 1);

    let bob = (TaskFilterField::Assignee, Some("bob".to_string()));
    assert!(board.visible_tasks(&[bob], TaskSort::Title).is_empty());
    assert_eq!(board.visible_tasks(&[], TaskSort::Title).len(), 2);
  }
}
