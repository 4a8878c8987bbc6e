//! Collavo REST API: entities, transport and the cached resource client.

mod backend;
mod client;
#[cfg(test)]
pub(crate) mod testing;
mod types;

pub use backend::{Backend, HttpBackend};
pub use client::CollavoClient;
pub use types::{
  Event, EventDraft, Importance, Member, Patch, Project, Record, SubTask, SubTaskDraft, Task,
  TaskDraft,
};
