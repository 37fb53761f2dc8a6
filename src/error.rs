use thiserror::Error;

use crate::transport::TransportError;

/// Errors raised by the schema registry, the normalizer, the query engine and
/// the cache facade.
#[derive(Debug, Error)]
pub enum CacheError {
  #[error("Unknown resource type: {type_name}")]
  UnknownType { type_name: String },

  #[error("Invalid query for {type_name}: expected an attribute map, got {query}")]
  InvalidQuery { type_name: String, query: String },

  #[error("{type_name} object has no usable '{attribute}' identity attribute")]
  MissingIdentity { type_name: String, attribute: String },

  #[error("Malformed {type_name} payload: {cause}")]
  MalformedPayload { type_name: String, cause: String },

  #[error("Invalid URL '{url}': {cause}")]
  InvalidUrl { url: String, cause: String },

  #[error("Record store lock poisoned")]
  LockPoisoned,

  /// Transport failures are passed through untouched.
  #[error(transparent)]
  Transport(#[from] TransportError),
}

impl CacheError {
  pub fn unknown_type(type_name: &str) -> Self {
    Self::UnknownType {
      type_name: type_name.to_string(),
    }
  }

  pub fn missing_identity(type_name: &str, attribute: &str) -> Self {
    Self::MissingIdentity {
      type_name: type_name.to_string(),
      attribute: attribute.to_string(),
    }
  }

  pub fn malformed(type_name: &str, cause: impl std::fmt::Display) -> Self {
    Self::MalformedPayload {
      type_name: type_name.to_string(),
      cause: cause.to_string(),
    }
  }
}

pub type Result<T> = std::result::Result<T, CacheError>;
