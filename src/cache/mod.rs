//! Request caching for Collavo resources.
//!
//! This module provides:
//! - A TTL cache of raw JSON responses keyed by resource (`project-{id}`, `tasks-{id}`, ...)
//! - Single-flight sharing of requests that target the same key
//! - Explicit invalidation of single keys or whole namespaces after mutations

mod inflight;
mod keys;
mod layer;
mod result;
mod store;

pub use inflight::{FetchOutput, Flight, FlightRole, InFlightGuard};
pub use keys::ResourceKey;
pub use layer::CacheLayer;
pub use result::{CacheResult, CacheSource};
pub use store::{CachedEntry, RequestCache, DEFAULT_TTL};
