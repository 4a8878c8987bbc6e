//! Client core for the Collavo project dashboard.
//!
//! Reads go through a TTL cache with single-flight request sharing
//! ([`cache`]); the Tasks and Events pages keep their lists in a two-layer
//! optimistic state ([`state`]) that is reconciled on refresh.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod filters;
pub mod logging;
pub mod notifications;
pub mod permissions;
pub mod query;
pub mod state;
pub mod validation;

pub use error::{ApiError, ApiResult};
