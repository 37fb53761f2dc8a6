//! Synchronous queries over cached records.
//!
//! A [`Query`] is either absent ([`Query::All`]), an attribute map compared
//! for exact equality ([`Query::Match`]), or a bare identity value
//! ([`Query::Id`]). Any JSON value converts into a query:
//!
//! ```ignore
//! cache.find_all("users", json!({"active": true}))?;
//! cache.find("users", json!("u1"))?;
//! cache.find_all("users", Query::All)?;
//! ```

use serde_json::{Map, Value};

use crate::cache::{IdentityKey, Record, RecordStore};
use crate::error::{CacheError, Result};
use crate::schema::Schema;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Query {
  /// Match every record
  #[default]
  All,
  /// Every key must be present with an equal value
  Match(Map<String, Value>),
  /// Direct lookup by identity value
  Id(Value),
}

impl Query {
  /// Single-attribute equality query.
  pub fn equals(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
    let mut predicate = Map::new();
    predicate.insert(attribute.into(), value.into());
    Query::Match(predicate)
  }

  fn matches(predicate: &Map<String, Value>, record: &Record) -> bool {
    predicate
      .iter()
      .all(|(attribute, expected)| record.get(attribute) == Some(expected))
  }
}

impl From<Value> for Query {
  fn from(value: Value) -> Self {
    match value {
      Value::Null => Query::All,
      Value::Object(predicate) => Query::Match(predicate),
      other => Query::Id(other),
    }
  }
}

impl From<Option<Value>> for Query {
  fn from(value: Option<Value>) -> Self {
    value.map(Query::from).unwrap_or_default()
  }
}

impl From<Map<String, Value>> for Query {
  fn from(predicate: Map<String, Value>) -> Self {
    Query::Match(predicate)
  }
}

impl From<&str> for Query {
  fn from(identity: &str) -> Self {
    Query::Id(Value::String(identity.to_string()))
  }
}

/// All records of `type_name` satisfying `query`, in table order.
///
/// An absent or empty table yields no records whatever the query. A bare
/// identity value is rejected with [`CacheError::InvalidQuery`].
pub fn find_all(
  store: &RecordStore,
  schema: &Schema,
  type_name: &str,
  query: &Query,
) -> Result<Vec<Record>> {
  schema.resolve(type_name)?;

  let table = match store.table(type_name) {
    Some(table) if !table.is_empty() => table,
    _ => return Ok(Vec::new()),
  };

  match query {
    Query::All => Ok(table.values().cloned().collect()),
    Query::Match(predicate) => Ok(
      table
        .values()
        .filter(|record| Query::matches(predicate, record))
        .cloned()
        .collect(),
    ),
    Query::Id(value) => Err(CacheError::InvalidQuery {
      type_name: type_name.to_string(),
      query: value.to_string(),
    }),
  }
}

/// The first record of `type_name` satisfying `query`.
///
/// [`Query::All`] never matches: an unscoped single lookup is not allowed.
pub fn find(
  store: &RecordStore,
  schema: &Schema,
  type_name: &str,
  query: &Query,
) -> Result<Option<Record>> {
  schema.resolve(type_name)?;

  let table = match store.table(type_name) {
    Some(table) if !table.is_empty() => table,
    _ => return Ok(None),
  };

  let found = match query {
    Query::All => None,
    Query::Match(predicate) => table
      .values()
      .find(|record| Query::matches(predicate, record)),
    Query::Id(value) => IdentityKey::from_value(value).and_then(|key| table.get(&key)),
  };

  Ok(found.cloned())
}
