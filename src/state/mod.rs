//! View-model state for the Tasks and Events pages.

mod events;
mod list;
mod tasks;

pub use events::EventBoard;
pub use list::{ListState, Mutation, NestedOp, Placement, RefreshTicket};
pub use tasks::TaskBoard;
