//! In-memory record store: type name -> identity -> record.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// A flat, normalized record.
pub type Record = Map<String, Value>;

/// Records of one type, in first-insertion order of their identity.
pub type Table = IndexMap<IdentityKey, Record>;

/// Canonical key form of an identity value.
///
/// Strings key as themselves; numbers and booleans key as their JSON text,
/// so `1` and `"1"` address the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey(String);

impl IdentityKey {
  /// Returns `None` for null, arrays and objects, which cannot identify a record.
  pub fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::String(s) => Some(Self(s.clone())),
      Value::Number(n) => Some(Self(n.to_string())),
      Value::Bool(b) => Some(Self(b.to_string())),
      Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for IdentityKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Per-type record tables. Tables are created on first write.
#[derive(Debug, Default, Clone)]
pub struct RecordStore {
  tables: HashMap<String, Table>,
}

impl RecordStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn table(&self, type_name: &str) -> Option<&Table> {
    self.tables.get(type_name)
  }

  pub fn get(&self, type_name: &str, key: &IdentityKey) -> Option<&Record> {
    self.tables.get(type_name)?.get(key)
  }

  /// Write a record, replacing any previous record at the same key wholesale.
  ///
  /// A replaced record keeps its position in the table.
  pub fn put(&mut self, type_name: &str, key: IdentityKey, record: Record) -> Option<Record> {
    self
      .tables
      .entry(type_name.to_string())
      .or_default()
      .insert(key, record)
  }

  /// Remove a record. No-op if the table or the key is absent.
  pub fn evict(&mut self, type_name: &str, key: &IdentityKey) -> Option<Record> {
    self.tables.get_mut(type_name)?.shift_remove(key)
  }

  /// Number of records cached for a type.
  pub fn len(&self, type_name: &str) -> usize {
    self.tables.get(type_name).map_or(0, Table::len)
  }

  pub fn is_empty(&self, type_name: &str) -> bool {
    self.len(type_name) == 0
  }
}
