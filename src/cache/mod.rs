//! Normalizing record cache for resource APIs.
//!
//! This module provides the cache itself:
//! - Splits nested responses into flat per-type tables keyed by identity
//! - Overwrites records wholesale on every write (last write wins)
//! - Evicts records on removal without touching records that reference them
//! - Exposes the tables to synchronous queries

mod layer;
pub mod normalize;
mod storage;

pub use layer::{Cache, FetchOptions};
pub use storage::{IdentityKey, Record, RecordStore, Table};
