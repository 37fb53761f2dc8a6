//! Cache facade that ties the transport to the normalizing record store.

use serde_json::Value;
use std::sync::{Arc, RwLock, RwLockReadGuard};
use tokio::sync::broadcast;
use tracing::{debug, info};
use url::Url;

use super::normalize;
use super::storage::{IdentityKey, Record, RecordStore};
use crate::error::{CacheError, Result};
use crate::event::{ChangeEvent, EventBus};
use crate::query::Query;
use crate::schema::{Schema, TypeConfig};
use crate::transport::{Method, Payload, RequestOptions, Transport};

/// Per-call overrides for `get` and `add`.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
  /// Request this URL instead of the type's configured location
  pub url: Option<String>,
  /// Extra headers for this request only
  pub headers: Vec<(String, String)>,
}

/// Normalizing cache over a remote resource API.
///
/// Reads and writes go through the transport; every successful response is
/// normalized into the record store, which `find` and `find_all` query
/// synchronously. Responses completing out of order overwrite each other in
/// completion order.
pub struct Cache<T: Transport> {
  transport: T,
  schema: Arc<Schema>,
  base_url: Option<Url>,
  store: Arc<RwLock<RecordStore>>,
  events: EventBus,
}

impl<T: Transport> Cache<T> {
  pub fn new(schema: Schema, transport: T) -> Self {
    Self {
      transport,
      schema: Arc::new(schema),
      base_url: None,
      store: Arc::new(RwLock::new(RecordStore::new())),
      events: EventBus::default(),
    }
  }

  /// Set the URL that locations starting with `/` are resolved against.
  pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
    let parsed = Url::parse(base_url).map_err(|e| CacheError::InvalidUrl {
      url: base_url.to_string(),
      cause: e.to_string(),
    })?;
    self.base_url = Some(parsed);
    Ok(self)
  }

  pub fn schema(&self) -> &Schema {
    &self.schema
  }

  /// Receive a [`ChangeEvent`] after every store mutation.
  pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
    self.events.subscribe()
  }

  /// Fetch the type's collection (or `options.url`) and cache the response.
  pub async fn get(
    &self,
    type_name: &str,
    params: &[(&str, &str)],
    options: FetchOptions,
  ) -> Result<()> {
    let config = self.schema.resolve(type_name)?;
    let location = options.url.as_deref().unwrap_or(config.location());
    let mut url = self.resolve_url(location)?;
    if !params.is_empty() {
      url.query_pairs_mut().extend_pairs(params);
    }

    info!(type_name, url = url.as_str(), "fetching");
    let payload = self
      .transport
      .request(
        Method::Get,
        url.as_str(),
        RequestOptions {
          data: None,
          headers: options.headers,
        },
      )
      .await?;

    self.ingest(type_name, payload)
  }

  /// Create `object` remotely and cache the server's representation.
  pub async fn add(&self, type_name: &str, object: &Value, options: FetchOptions) -> Result<()> {
    let config = self.schema.resolve(type_name)?;
    let location = options.url.as_deref().unwrap_or(config.location());
    let url = self.resolve_url(location)?;

    info!(type_name, url = url.as_str(), "creating");
    let payload = self
      .transport
      .request(
        Method::Post,
        url.as_str(),
        RequestOptions {
          data: Some(object.to_string()),
          headers: options.headers,
        },
      )
      .await?;

    self.ingest(type_name, payload)
  }

  /// Replace `object` remotely and cache the server's representation.
  ///
  /// Fails with [`CacheError::MissingIdentity`] before any request if the
  /// object has no identity value.
  pub async fn update(&self, type_name: &str, object: &Value) -> Result<()> {
    let config = self.schema.resolve(type_name)?;
    let (_, url) = self.object_url(config, object)?;

    info!(type_name, url = url.as_str(), "updating");
    let payload = self
      .transport
      .request(
        Method::Put,
        url.as_str(),
        RequestOptions {
          data: Some(object.to_string()),
          ..RequestOptions::default()
        },
      )
      .await?;

    self.ingest(type_name, payload)
  }

  /// Delete `object` remotely and evict it from the store.
  ///
  /// Records of other types referring to it keep the dangling identity.
  pub async fn remove(&self, type_name: &str, object: &Value) -> Result<()> {
    let config = self.schema.resolve(type_name)?;
    let (identity, url) = self.object_url(config, object)?;

    info!(type_name, url = url.as_str(), "removing");
    self
      .transport
      .request(Method::Delete, url.as_str(), RequestOptions::default())
      .await?;

    self.evict(type_name, &identity)
  }

  /// Normalize a payload into the store without going through the transport.
  ///
  /// Sends one [`ChangeEvent::Ingested`] per type that received records,
  /// embedded types first.
  pub fn ingest(&self, type_name: &str, payload: Payload) -> Result<()> {
    let written = {
      let mut store = self.store.write().map_err(|_| CacheError::LockPoisoned)?;
      normalize::ingest(&mut store, &self.schema, type_name, payload)?
    };

    for type_name in written {
      self.events.emit(ChangeEvent::Ingested { type_name });
    }
    Ok(())
  }

  /// Drop the record with this identity. No-op if it is not cached.
  pub fn evict(&self, type_name: &str, identity: &Value) -> Result<()> {
    self.schema.resolve(type_name)?;
    let Some(key) = IdentityKey::from_value(identity) else {
      return Ok(());
    };

    let removed = {
      let mut store = self.store.write().map_err(|_| CacheError::LockPoisoned)?;
      store.evict(type_name, &key)
    };

    if removed.is_some() {
      debug!(type_name, identity = %key, "evicted record");
      self.events.emit(ChangeEvent::Removed {
        type_name: type_name.to_string(),
        identity: identity.clone(),
      });
    }
    Ok(())
  }

  /// All cached records of `type_name` matching `query`.
  pub fn find_all(&self, type_name: &str, query: impl Into<Query>) -> Result<Vec<Record>> {
    let store = self.read()?;
    crate::query::find_all(&store, &self.schema, type_name, &query.into())
  }

  /// The first cached record of `type_name` matching `query`.
  pub fn find(&self, type_name: &str, query: impl Into<Query>) -> Result<Option<Record>> {
    let store = self.read()?;
    crate::query::find(&store, &self.schema, type_name, &query.into())
  }

  fn read(&self) -> Result<RwLockReadGuard<'_, RecordStore>> {
    self.store.read().map_err(|_| CacheError::LockPoisoned)
  }

  /// Resolve a location: `/`-prefixed paths are appended to the base URL,
  /// anything else must be an absolute URL.
  pub fn resolve_url(&self, location: &str) -> Result<Url> {
    let invalid = |cause: String| CacheError::InvalidUrl {
      url: location.to_string(),
      cause,
    };

    if location.starts_with('/') {
      let base = self
        .base_url
        .as_ref()
        .ok_or_else(|| invalid("relative location and no base URL configured".to_string()))?;
      let joined = format!("{}{}", base.as_str().trim_end_matches('/'), location);
      Url::parse(&joined).map_err(|e| invalid(e.to_string()))
    } else {
      Url::parse(location).map_err(|e| invalid(e.to_string()))
    }
  }

  /// The identity of `object` and the URL it lives at.
  ///
  /// An identity that is a `/` path or an http(s) URL is the object's
  /// location. Any other identity becomes a single escaped path segment under
  /// the type's collection location.
  fn object_url(&self, config: &TypeConfig, object: &Value) -> Result<(Value, Url)> {
    let id_attribute = self.schema.identity_of(config.name())?;
    let identity = object.get(id_attribute).cloned().unwrap_or(Value::Null);
    let key = IdentityKey::from_value(&identity)
      .ok_or_else(|| CacheError::missing_identity(config.name(), id_attribute))?;

    if let Some(location) = identity.as_str().filter(|s| is_location(s)) {
      let url = self.resolve_url(location)?;
      return Ok((identity, url));
    }

    let invalid = |cause: &str| CacheError::InvalidUrl {
      url: format!("{}{}", config.location(), key),
      cause: cause.to_string(),
    };
    // `push` silently drops dot segments instead of escaping them
    if key.as_str() == "." || key.as_str() == ".." {
      return Err(invalid("identity is a dot segment"));
    }

    let mut url = self.resolve_url(config.location())?;
    url
      .path_segments_mut()
      .map_err(|_| invalid("collection location cannot have path segments"))?
      .pop_if_empty()
      .push(key.as_str());

    Ok((identity, url))
  }
}

/// Whether an identity names its own location rather than a collection member.
fn is_location(identity: &str) -> bool {
  identity.starts_with('/')
    || Url::parse(identity)
      .map(|url| matches!(url.scheme(), "http" | "https"))
      .unwrap_or(false)
}

impl<T: Transport + Clone> Clone for Cache<T> {
  fn clone(&self) -> Self {
    Self {
      transport: self.transport.clone(),
      schema: Arc::clone(&self.schema),
      base_url: self.base_url.clone(),
      store: Arc::clone(&self.store),
      events: self.events.clone(),
    }
  }
}
