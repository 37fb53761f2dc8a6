//! Normalization of nested API payloads into per-type record tables.
//!
//! Embedded related objects are written to their own type's table and the
//! parent's relation attribute is rewritten to hold identity values. Recursion
//! follows the nesting of the payload, so cyclic schemas are fine; an
//! unboundedly nested payload recurses without limit.

use serde_json::Value;
use tracing::debug;

use super::storage::{IdentityKey, Record, RecordStore};
use crate::error::{CacheError, Result};
use crate::schema::{Relation, Schema, TypeConfig};
use crate::transport::Payload;

/// Normalize `payload` into the store as records of `type_name`.
///
/// Returns the types that received records, in order of their first write
/// (embedded types come before the types embedding them). Each record
/// replaces any cached record with the same identity. On failure, records
/// already written for earlier objects or embedded relations stay in the
/// store.
pub fn ingest(
  store: &mut RecordStore,
  schema: &Schema,
  type_name: &str,
  payload: Payload,
) -> Result<Vec<String>> {
  let config = schema.resolve(type_name)?;

  let value = match payload {
    Payload::Json(value) => value,
    Payload::Text(text) if text.trim().is_empty() => {
      debug!(type_name, "empty response body, nothing to ingest");
      return Ok(Vec::new());
    }
    Payload::Text(text) => {
      serde_json::from_str(&text).map_err(|e| CacheError::malformed(type_name, e))?
    }
  };

  let objects = into_sequence(config, value);
  let count = objects.len();

  let mut normalizer = Normalizer {
    store,
    schema,
    written: Vec::new(),
  };
  for object in objects {
    normalizer.ingest_value(type_name, object)?;
  }

  debug!(type_name, records = count, types = ?normalizer.written, "ingested payload");
  Ok(normalizer.written)
}

/// Coerce a response body into the sequence of objects it carries.
fn into_sequence(config: &TypeConfig, value: Value) -> Vec<Value> {
  match value {
    Value::Array(items) => items,
    other => match config.reshape_fn() {
      Some(reshape) => match reshape(other) {
        Value::Array(items) => items,
        single => vec![single],
      },
      None => vec![other],
    },
  }
}

/// Recursive state of a single ingest.
struct Normalizer<'a> {
  store: &'a mut RecordStore,
  schema: &'a Schema,
  /// Types written so far, first write first
  written: Vec<String>,
}

impl Normalizer<'_> {
  /// Ingest a single object and return its identity value.
  fn ingest_value(&mut self, type_name: &str, value: Value) -> Result<Value> {
    match value {
      Value::Object(record) => self.ingest_record(type_name, record),
      other => Err(CacheError::malformed(
        type_name,
        format!("expected an object, got {}", other),
      )),
    }
  }

  fn ingest_record(&mut self, type_name: &str, mut record: Record) -> Result<Value> {
    let schema = self.schema;
    let config = schema.resolve(type_name)?;
    let id_attribute = schema.identity_of(type_name)?;

    let identity = record.get(id_attribute).cloned().unwrap_or(Value::Null);
    let key = IdentityKey::from_value(&identity)
      .ok_or_else(|| CacheError::missing_identity(type_name, id_attribute))?;

    for relation in config.relations() {
      self.flatten_relation(relation, &mut record)?;
    }

    self.store.put(type_name, key, record);
    if !self.written.iter().any(|t| t == type_name) {
      self.written.push(type_name.to_string());
    }
    Ok(identity)
  }

  /// Replace embedded objects under a relation attribute by their identities.
  ///
  /// Values that are not embedded objects are taken to be identity references
  /// already and are left in place, so re-ingesting a normalized record changes
  /// nothing.
  fn flatten_relation(&mut self, relation: &Relation, record: &mut Record) -> Result<()> {
    match relation {
      Relation::ToMany {
        attribute,
        related_type,
      } => {
        let Some(Value::Array(items)) = record.get_mut(attribute) else {
          return Ok(());
        };
        if !items.iter().any(Value::is_object) {
          return Ok(());
        }

        let embedded = std::mem::take(items);
        let mut identities = Vec::with_capacity(embedded.len());
        for item in embedded {
          if item.is_object() {
            identities.push(self.ingest_value(related_type, item)?);
          } else {
            identities.push(item);
          }
        }
        *items = identities;
      }
      Relation::ToOne {
        attribute,
        related_type,
      } => {
        let Some(slot) = record.get_mut(attribute) else {
          return Ok(());
        };
        if !slot.is_object() {
          return Ok(());
        }

        let embedded = slot.take();
        *slot = self.ingest_value(related_type, embedded)?;
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::schema::TypeConfig;
  use serde_json::json;

  fn schema() -> Schema {
    Schema::builder()
      .id_attribute("id")
      .resource(TypeConfig::new("users", "/users/").to_one("team", "teams"))
      .resource(TypeConfig::new("teams", "/teams/").to_many("members", "members"))
      .resource(TypeConfig::new("members", "/members/"))
      .resource(TypeConfig::new("plain", "/plain/"))
      .resource(
        TypeConfig::new("nodes", "/nodes/")
          .to_one("parent", "nodes")
          .to_many("children", "nodes"),
      )
      .resource(
        TypeConfig::new("pages", "/pages/")
          .reshape(|mut body| body.get_mut("results").map(Value::take).unwrap_or(body)),
      )
      .build()
      .unwrap()
  }

  fn get<'a>(store: &'a RecordStore, type_name: &str, id: &str) -> Option<&'a Record> {
    store.get(type_name, &IdentityKey::from_value(&json!(id)).unwrap())
  }

  #[test]
  fn test_single_object_is_wrapped() {
    let mut store = RecordStore::new();
    ingest(&mut store, &schema(), "plain", Payload::Json(json!({"id": "p1"}))).unwrap();
    assert_eq!(store.len("plain"), 1);
  }

  #[test]
  fn test_last_write_wins_within_payload() {
    let mut store = RecordStore::new();
    let payload = json!([
      {"id": "p1", "name": "first", "extra": true},
      {"id": "p2", "name": "other"},
      {"id": "p1", "name": "last"}
    ]);
    ingest(&mut store, &schema(), "plain", Payload::Json(payload)).unwrap();

    assert_eq!(store.len("plain"), 2);
    let p1 = get(&store, "plain", "p1").unwrap();
    assert_eq!(p1, json!({"id": "p1", "name": "last"}).as_object().unwrap());
  }

  #[test]
  fn test_to_one_relation_is_flattened() {
    let mut store = RecordStore::new();
    let payload = json!({"id": "u1", "name": "A", "team": {"id": "t1", "name": "X"}});
    ingest(&mut store, &schema(), "users", Payload::Json(payload)).unwrap();

    assert_eq!(
      get(&store, "teams", "t1").unwrap(),
      json!({"id": "t1", "name": "X"}).as_object().unwrap()
    );
    assert_eq!(
      get(&store, "users", "u1").unwrap(),
      json!({"id": "u1", "name": "A", "team": "t1"}).as_object().unwrap()
    );
  }

  #[test]
  fn test_written_types_reported_embedded_first() {
    let mut store = RecordStore::new();
    let payload = json!({
      "id": "u1",
      "team": {"id": "t1", "members": [{"id": "m1"}]}
    });
    let written = ingest(&mut store, &schema(), "users", Payload::Json(payload)).unwrap();
    assert_eq!(written, vec!["members", "teams", "users"]);

    let flat = json!([{"id": "u2", "team": "t1"}, {"id": "u3"}]);
    let written = ingest(&mut store, &schema(), "users", Payload::Json(flat)).unwrap();
    assert_eq!(written, vec!["users"]);

    let empty = ingest(&mut store, &schema(), "users", Payload::Text(String::new())).unwrap();
    assert!(empty.is_empty());
  }

  #[test]
  fn test_to_many_relation_is_flattened_in_order() {
    let mut store = RecordStore::new();
    let payload = json!({"id": "t1", "members": [{"id": "m1"}, {"id": "m2"}]});
    ingest(&mut store, &schema(), "teams", Payload::Json(payload)).unwrap();

    assert_eq!(store.len("members"), 2);
    assert_eq!(
      get(&store, "teams", "t1").unwrap().get("members"),
      Some(&json!(["m1", "m2"]))
    );
  }

  #[test]
  fn test_nested_relations_flatten_transitively() {
    let mut store = RecordStore::new();
    let payload = json!({
      "id": "u1",
      "team": {"id": "t1", "members": [{"id": "m1", "role": "lead"}]}
    });
    ingest(&mut store, &schema(), "users", Payload::Json(payload)).unwrap();

    assert_eq!(get(&store, "users", "u1").unwrap().get("team"), Some(&json!("t1")));
    assert_eq!(
      get(&store, "teams", "t1").unwrap().get("members"),
      Some(&json!(["m1"]))
    );
    assert_eq!(
      get(&store, "members", "m1").unwrap().get("role"),
      Some(&json!("lead"))
    );
  }

  #[test]
  fn test_reingesting_normalized_record_is_noop() {
    let schema = schema();
    let mut store = RecordStore::new();
    let payload = json!({"id": "t1", "members": [{"id": "m1"}, {"id": "m2"}]});
    ingest(&mut store, &schema, "teams", Payload::Json(payload)).unwrap();

    let before = store.clone();
    let normalized = Value::Object(get(&store, "teams", "t1").unwrap().clone());
    ingest(&mut store, &schema, "teams", Payload::Json(normalized)).unwrap();

    assert_eq!(store.table("teams"), before.table("teams"));
    assert_eq!(store.table("members"), before.table("members"));
  }

  #[test]
  fn test_scalar_to_one_reference_kept() {
    let mut store = RecordStore::new();
    let payload = json!({"id": "u1", "team": "t9"});
    ingest(&mut store, &schema(), "users", Payload::Json(payload)).unwrap();

    assert_eq!(get(&store, "users", "u1").unwrap().get("team"), Some(&json!("t9")));
    assert!(store.table("teams").is_none());
  }

  #[test]
  fn test_mixed_to_many_keeps_references_and_order() {
    let mut store = RecordStore::new();
    let payload = json!({"id": "t1", "members": ["m0", {"id": "m1"}, "m2"]});
    ingest(&mut store, &schema(), "teams", Payload::Json(payload)).unwrap();

    assert_eq!(
      get(&store, "teams", "t1").unwrap().get("members"),
      Some(&json!(["m0", "m1", "m2"]))
    );
    assert_eq!(store.len("members"), 1);
  }

  #[test]
  fn test_empty_and_absent_relations_untouched() {
    let mut store = RecordStore::new();
    let payload = json!([{"id": "t1", "members": []}, {"id": "t2"}, {"id": "t3", "members": null}]);
    ingest(&mut store, &schema(), "teams", Payload::Json(payload)).unwrap();

    assert_eq!(get(&store, "teams", "t1").unwrap().get("members"), Some(&json!([])));
    assert!(get(&store, "teams", "t2").unwrap().get("members").is_none());
    assert_eq!(get(&store, "teams", "t3").unwrap().get("members"), Some(&Value::Null));
    assert!(store.table("members").is_none());
  }

  #[test]
  fn test_numeric_identities_preserved_in_references() {
    let mut store = RecordStore::new();
    let payload = json!({"id": 1, "team": {"id": 7}});
    ingest(&mut store, &schema(), "users", Payload::Json(payload)).unwrap();

    assert_eq!(get(&store, "users", "1").unwrap().get("team"), Some(&json!(7)));
    assert!(get(&store, "teams", "7").is_some());
  }

  #[test]
  fn test_self_referential_payload() {
    let mut store = RecordStore::new();
    let payload = json!({
      "id": "root",
      "children": [{"id": "a", "parent": "root"}, {"id": "b", "children": [{"id": "c"}]}],
      "parent": {"id": "top"}
    });
    ingest(&mut store, &schema(), "nodes", Payload::Json(payload)).unwrap();

    assert_eq!(store.len("nodes"), 5);
    let root = get(&store, "nodes", "root").unwrap();
    assert_eq!(root.get("children"), Some(&json!(["a", "b"])));
    assert_eq!(root.get("parent"), Some(&json!("top")));
    assert_eq!(
      get(&store, "nodes", "b").unwrap().get("children"),
      Some(&json!(["c"]))
    );
  }

  #[test]
  fn test_text_payload_is_decoded() {
    let mut store = RecordStore::new();
    let text = r#"[{"id": "p1"}, {"id": "p2"}]"#.to_string();
    ingest(&mut store, &schema(), "plain", Payload::Text(text)).unwrap();
    assert_eq!(store.len("plain"), 2);
  }

  #[test]
  fn test_malformed_text_payload() {
    let mut store = RecordStore::new();
    let err = ingest(&mut store, &schema(), "plain", Payload::Text("{oops".into())).unwrap_err();
    assert!(matches!(err, CacheError::MalformedPayload { .. }));
    assert!(store.table("plain").is_none());
  }

  #[test]
  fn test_empty_text_payload_ingests_nothing() {
    let mut store = RecordStore::new();
    ingest(&mut store, &schema(), "plain", Payload::Text("  \n".into())).unwrap();
    assert!(store.table("plain").is_none());
  }

  #[test]
  fn test_reshape_unwraps_envelope() {
    let mut store = RecordStore::new();
    let payload = json!({"count": 2, "results": [{"id": "a"}, {"id": "b"}]});
    ingest(&mut store, &schema(), "pages", Payload::Json(payload)).unwrap();
    assert_eq!(store.len("pages"), 2);
  }

  #[test]
  fn test_reshape_single_result_is_wrapped() {
    let mut store = RecordStore::new();
    let payload = json!({"results": {"id": "a"}});
    ingest(&mut store, &schema(), "pages", Payload::Json(payload)).unwrap();
    assert!(get(&store, "pages", "a").is_some());
  }

  #[test]
  fn test_array_payload_skips_reshape() {
    let mut store = RecordStore::new();
    let payload = json!([{"id": "a", "results": "kept"}]);
    ingest(&mut store, &schema(), "pages", Payload::Json(payload)).unwrap();
    assert_eq!(get(&store, "pages", "a").unwrap().get("results"), Some(&json!("kept")));
  }

  #[test]
  fn test_missing_identity() {
    let mut store = RecordStore::new();
    let err = ingest(&mut store, &schema(), "plain", Payload::Json(json!({"name": "x"}))).unwrap_err();
    assert!(matches!(err, CacheError::MissingIdentity { attribute, .. } if attribute == "id"));
  }

  #[test]
  fn test_non_object_element_rejected() {
    let mut store = RecordStore::new();
    let err = ingest(&mut store, &schema(), "plain", Payload::Json(json!([{"id": "a"}, 3]))).unwrap_err();
    assert!(matches!(err, CacheError::MalformedPayload { .. }));
    // No rollback of records written before the failure
    assert!(get(&store, "plain", "a").is_some());
  }

  #[test]
  fn test_unknown_type() {
    let mut store = RecordStore::new();
    let err = ingest(&mut store, &schema(), "bogus", Payload::Json(json!({"id": 1}))).unwrap_err();
    assert!(matches!(err, CacheError::UnknownType { .. }));
  }
}
