//! Events page view model.

use tracing::info;

use crate::api::{Backend, CollavoClient, Event, EventDraft, Patch, Project};
use crate::cache::ResourceKey;
use crate::error::ApiResult;
use crate::notifications::{NotificationRequest, NotificationStatus};
use crate::validation::{validate_event, validate_event_patch, ValidationError};

use super::list::{ListState, Placement, RefreshTicket};

pub struct EventBoard<B: Backend> {
  client: CollavoClient<B>,
  project: Project,
  events: ListState<Event>,
}

impl<B: Backend> EventBoard<B> {
  /// Fetch the project and its events. Either failing fails the page.
  pub async fn load(client: CollavoClient<B>, project_id: &str) -> ApiResult<Self> {
    let (project, events) = client.load_event_board(project_id).await?;
    info!(project = %project.id, events = events.len(), "event board loaded");
    Ok(Self {
      client,
      project,
      events: ListState::new(events, Placement::Back),
    })
  }

  pub fn client(&self) -> &CollavoClient<B> {
    &self.client
  }

  pub fn project(&self) -> &Project {
    &self.project
  }

  pub fn events(&self) -> &[Event] {
    self.events.items()
  }

  pub fn event(&self, id: &str) -> Option<&Event> {
    self.events.get(id)
  }

  pub fn state(&self) -> &ListState<Event> {
    &self.events
  }

  fn events_key(&self) -> ResourceKey {
    ResourceKey::Events(self.project.id.clone())
  }

  fn find_event(&self, event_id: &str) -> Result<&Event, ValidationError> {
    self
      .events
      .get(event_id)
      .ok_or_else(|| ValidationError::UnknownRecord {
        kind: "event",
        id: event_id.to_string(),
      })
  }

  pub fn begin_refresh(&self) -> RefreshTicket {
    self.events.begin_refresh()
  }

  pub fn apply_refresh(&mut self, ticket: RefreshTicket, events: Vec<Event>) {
    self.events.reconcile(ticket, events);
  }

  pub async fn refresh(&mut self) -> ApiResult<()> {
    self.client.invalidate(&self.events_key());
    let ticket = self.begin_refresh();
    let events = self.client.get_events(&self.project.id).await?;
    self.apply_refresh(ticket, events);
    Ok(())
  }

  pub fn on_event_created(&mut self, event: Event) {
    self.events.on_created(event);
    self.client.invalidate(&self.events_key());
  }

  pub fn on_event_updated(&mut self, patch: Patch) {
    self.events.on_updated(patch);
    self.client.invalidate(&self.events_key());
  }

  pub fn on_event_deleted(&mut self, event_id: &str) {
    self.events.on_deleted(event_id);
    self.client.invalidate(&self.events_key());
  }

  pub async fn create_event(&mut self, draft: EventDraft) -> ApiResult<Event> {
    validate_event(&draft)?;
    let event = self.client.create_event(&self.project.id, &draft).await?;
    info!(event = %event.id, "event created");
    self.on_event_created(event.clone());
    Ok(event)
  }

  pub async fn update_event(&mut self, patch: Patch) -> ApiResult<()> {
    self.find_event(&patch.id)?;
    validate_event_patch(&patch)?;

    let confirmed = self.client.update_event(&self.project.id, &patch).await?;
    info!(event = %confirmed.id, "event updated");
    self.on_event_updated(confirmed);
    Ok(())
  }

  pub async fn delete_event(&mut self, event_id: &str) -> ApiResult<()> {
    self.find_event(event_id)?;
    self.client.delete_event(&self.project.id, event_id).await?;
    info!(event = event_id, "event deleted");
    self.on_event_deleted(event_id);
    Ok(())
  }

  /// Ask the server to email a reminder before an event.
  pub async fn schedule_event_reminder(
    &self,
    event_id: &str,
    request: &NotificationRequest,
  ) -> ApiResult<NotificationStatus> {
    self.find_event(event_id)?;
    self
      .client
      .schedule_event_notification(&self.project.id, event_id, request)
      .await
  }
}
