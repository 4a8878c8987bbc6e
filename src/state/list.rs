//! Two-layer list state: server-confirmed records plus optimistic mutations.
//!
//! Mutations are applied to the visible list the moment the server confirms
//! them, and remembered with a sequence number. When the list is re-fetched,
//! [`ListState::reconcile`] installs the server's copy and replays only the
//! mutations made after the refresh started; older ones are already part of
//! the server's answer.

use serde_json::Value;
use tracing::warn;

use crate::api::{Patch, Record};

/// Where newly created records are inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
  Front,
  Back,
}

/// Change to a list nested inside a record (e.g. a task's subtasks).
#[derive(Debug, Clone, PartialEq)]
pub enum NestedOp {
  Created(Value),
  Updated(Patch),
  Deleted(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation<T> {
  Created(T),
  Updated(Patch),
  Deleted(String),
  Nested {
    parent_id: String,
    field: &'static str,
    op: NestedOp,
  },
}

/// Marks the point a refresh started. Pass it back to
/// [`ListState::reconcile`] with the refreshed list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket(u64);

/// A server list plus the local mutations made since it was fetched.
///
/// Pending mutations are kept until a refresh whose ticket was taken after
/// them is reconciled, or until [`ListState::replace`]. A page that never
/// refreshes holds one entry per local change for as long as it lives.
#[derive(Debug, Clone)]
pub struct ListState<T> {
  confirmed: Vec<T>,
  /// `(sequence number, mutation)` in application order
  pending: Vec<(u64, Mutation<T>)>,
  view: Vec<T>,
  next_seq: u64,
  placement: Placement,
}

impl<T: Record> ListState<T> {
  pub fn new(items: Vec<T>, placement: Placement) -> Self {
    Self {
      view: items.clone(),
      confirmed: items,
      pending: Vec::new(),
      next_seq: 0,
      placement,
    }
  }

  /// The list as the user should see it.
  pub fn items(&self) -> &[T] {
    &self.view
  }

  /// The last list the server sent.
  pub fn confirmed(&self) -> &[T] {
    &self.confirmed
  }

  /// Mutations not yet covered by a refresh.
  pub fn pending(&self) -> impl Iterator<Item = &Mutation<T>> {
    self.pending.iter().map(|(_, m)| m)
  }

  pub fn get(&self, id: &str) -> Option<&T> {
    self.view.iter().find(|item| item.record_id() == id)
  }

  pub fn len(&self) -> usize {
    self.view.len()
  }

  pub fn is_empty(&self) -> bool {
    self.view.is_empty()
  }

  pub fn apply(&mut self, mutation: Mutation<T>) {
    apply_mutation(&mut self.view, &mutation, self.placement);
    self.pending.push((self.next_seq, mutation));
    self.next_seq += 1;
  }

  /// Insert a record; a record with the same id is replaced in place.
  pub fn on_created(&mut self, item: T) {
    self.apply(Mutation::Created(item));
  }

  /// Shallow-merge `patch` into the record with the same id, if present.
  pub fn on_updated(&mut self, patch: Patch) {
    self.apply(Mutation::Updated(patch));
  }

  pub fn on_deleted(&mut self, id: &str) {
    self.apply(Mutation::Deleted(id.to_string()));
  }

  /// Change the list stored in `field` of the record `parent_id`.
  pub fn on_nested(&mut self, parent_id: &str, field: &'static str, op: NestedOp) {
    self.apply(Mutation::Nested {
      parent_id: parent_id.to_string(),
      field,
      op,
    });
  }

  pub fn begin_refresh(&self) -> RefreshTicket {
    RefreshTicket(self.next_seq)
  }

  /// Install the refreshed server list and replay mutations made after
  /// `ticket` was taken.
  pub fn reconcile(&mut self, ticket: RefreshTicket, authoritative: Vec<T>) {
    self.pending.retain(|(seq, _)| *seq >= ticket.0);
    self.confirmed = authoritative;
    self.view = self.confirmed.clone();
    for (_, mutation) in &self.pending {
      apply_mutation(&mut self.view, mutation, self.placement);
    }
  }

  /// Discard all local state and start over from `items`.
  pub fn replace(&mut self, items: Vec<T>) {
    self.pending.clear();
    self.view = items.clone();
    self.confirmed = items;
  }
}

fn apply_mutation<T: Record>(items: &mut Vec<T>, mutation: &Mutation<T>, placement: Placement) {
  match mutation {
    Mutation::Created(item) => {
      match items
        .iter()
        .position(|existing| existing.record_id() == item.record_id())
      {
        Some(pos) => items[pos] = item.clone(),
        None => match placement {
          Placement::Front => items.insert(0, item.clone()),
          Placement::Back => items.push(item.clone()),
        },
      }
    }
    Mutation::Updated(patch) => {
      if let Some(item) = items.iter_mut().find(|item| item.record_id() == patch.id) {
        match patch.apply_to(item) {
          Ok(merged) => *item = merged,
          Err(e) => warn!(id = %patch.id, error = %e, "update does not fit record, skipped"),
        }
      }
    }
    Mutation::Deleted(id) => items.retain(|item| item.record_id() != id),
    Mutation::Nested {
      parent_id,
      field,
      op,
    } => {
      if let Some(item) = items.iter_mut().find(|item| item.record_id() == parent_id) {
        match apply_nested(item, field, op) {
          Ok(merged) => *item = merged,
          Err(e) => warn!(id = %parent_id, field, error = %e, "nested change does not fit record, skipped"),
        }
      }
    }
  }
}

fn child_id(child: &Value) -> Option<&str> {
  child.get("id").and_then(Value::as_str)
}

fn apply_nested<T: Record>(parent: &T, field: &str, op: &NestedOp) -> serde_json::Result<T> {
  let mut value = serde_json::to_value(parent)?;

  if let Value::Object(map) = &mut value {
    let children = map
      .entry(field)
      .or_insert_with(|| Value::Array(Vec::new()));
    if !children.is_array() {
      *children = Value::Array(Vec::new());
    }

    if let Value::Array(children) = children {
      match op {
        NestedOp::Created(child) => {
          let existing = child_id(child)
            .and_then(|id| children.iter().position(|c| child_id(c) == Some(id)));
          match existing {
            Some(pos) => children[pos] = child.clone(),
            None => children.push(child.clone()),
          }
        }
        NestedOp::Updated(patch) => {
          let target = children
            .iter_mut()
            .find(|c| child_id(c) == Some(patch.id.as_str()));
          if let Some(Value::Object(child)) = target {
            for (key, v) in &patch.fields {
              child.insert(key.clone(), v.clone());
            }
          }
        }
        NestedOp::Deleted(id) => children.retain(|c| child_id(c) != Some(id.as_str())),
      }
    }
  }

  serde_json::from_value(value)
}
