//! Client-side cache that normalizes nested REST responses into per-type
//! record tables and answers queries over them.
//!
//! ```ignore
//! let schema = Schema::builder()
//!   .resource(TypeConfig::new("users", "/api/users/").to_one("team", "teams"))
//!   .resource(TypeConfig::new("teams", "/api/teams/"))
//!   .build()?;
//! let cache = Cache::new(schema, HttpTransport::new(Vec::new())?)
//!   .with_base_url("https://api.example.com")?;
//!
//! cache.get("users", &[], FetchOptions::default()).await?;
//! let active = cache.find_all("users", json!({"active": true}))?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod query;
pub mod schema;
pub mod transport;

pub use cache::{Cache, FetchOptions, IdentityKey, Record, RecordStore};
pub use error::{CacheError, Result};
pub use event::ChangeEvent;
pub use query::Query;
pub use schema::{Relation, Schema, SchemaBuilder, TypeConfig};
pub use transport::{HttpTransport, Method, Payload, RequestOptions, Transport, TransportError};
