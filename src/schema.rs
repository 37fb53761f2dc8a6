//! Schema registry describing resource types and their relations.
//!
//! A [`Schema`] is built once (programmatically through [`SchemaBuilder`] or
//! from the YAML config) and is immutable afterwards. Relation targets are
//! validated at build time so the normalizer never has to re-check them.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{CacheError, Result};

/// Identity attribute used when neither the schema nor the type overrides it.
pub const DEFAULT_ID_ATTRIBUTE: &str = "url";

/// Hook turning a non-array response body into the records it carries
/// (e.g. unwrapping a `{"results": [...]}` envelope).
pub type Reshape = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// A relation declared on a resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
  /// Attribute holds a sequence of related objects
  ToMany {
    attribute: String,
    related_type: String,
  },
  /// Attribute holds a single related object
  ToOne {
    attribute: String,
    related_type: String,
  },
}

impl Relation {
  pub fn attribute(&self) -> &str {
    match self {
      Relation::ToMany { attribute, .. } | Relation::ToOne { attribute, .. } => attribute,
    }
  }

  pub fn related_type(&self) -> &str {
    match self {
      Relation::ToMany { related_type, .. } | Relation::ToOne { related_type, .. } => related_type,
    }
  }
}

/// Configuration of a single resource type.
#[derive(Clone)]
pub struct TypeConfig {
  name: String,
  location: String,
  id_attribute: Option<String>,
  relations: Vec<Relation>,
  reshape: Option<Reshape>,
}

impl TypeConfig {
  pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      location: location.into(),
      id_attribute: None,
      relations: Vec::new(),
      reshape: None,
    }
  }

  /// Declare a to-many relation `attribute -> related_type`.
  pub fn to_many(mut self, attribute: impl Into<String>, related_type: impl Into<String>) -> Self {
    self.relations.push(Relation::ToMany {
      attribute: attribute.into(),
      related_type: related_type.into(),
    });
    self
  }

  /// Declare a to-one relation `attribute -> related_type`.
  pub fn to_one(mut self, attribute: impl Into<String>, related_type: impl Into<String>) -> Self {
    self.relations.push(Relation::ToOne {
      attribute: attribute.into(),
      related_type: related_type.into(),
    });
    self
  }

  /// Override the schema-wide identity attribute for this type.
  pub fn id_attribute(mut self, attribute: impl Into<String>) -> Self {
    self.id_attribute = Some(attribute.into());
    self
  }

  pub fn reshape<F>(mut self, f: F) -> Self
  where
    F: Fn(Value) -> Value + Send + Sync + 'static,
  {
    self.reshape = Some(Arc::new(f));
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Remote location of the collection (relative or absolute URL).
  pub fn location(&self) -> &str {
    &self.location
  }

  /// Declared relations, to-many relations first.
  pub fn relations(&self) -> &[Relation] {
    &self.relations
  }

  pub(crate) fn reshape_fn(&self) -> Option<&Reshape> {
    self.reshape.as_ref()
  }
}

impl fmt::Debug for TypeConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TypeConfig")
      .field("name", &self.name)
      .field("location", &self.location)
      .field("id_attribute", &self.id_attribute)
      .field("relations", &self.relations)
      .field("reshape", &self.reshape.is_some())
      .finish()
  }
}

/// Immutable registry of resource types.
#[derive(Debug, Clone)]
pub struct Schema {
  id_attribute: String,
  types: HashMap<String, TypeConfig>,
}

impl Schema {
  pub fn builder() -> SchemaBuilder {
    SchemaBuilder::default()
  }

  /// Look up a declared type.
  pub fn resolve(&self, type_name: &str) -> Result<&TypeConfig> {
    self
      .types
      .get(type_name)
      .ok_or_else(|| CacheError::unknown_type(type_name))
  }

  /// Identity attribute of a type: its own override, else the schema default.
  pub fn identity_of(&self, type_name: &str) -> Result<&str> {
    let config = self.resolve(type_name)?;
    Ok(config.id_attribute.as_deref().unwrap_or(&self.id_attribute))
  }

  /// Declared type names, sorted.
  pub fn type_names(&self) -> Vec<&str> {
    let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
  }
}

/// Builder for [`Schema`].
pub struct SchemaBuilder {
  id_attribute: String,
  types: Vec<TypeConfig>,
}

impl Default for SchemaBuilder {
  fn default() -> Self {
    Self {
      id_attribute: DEFAULT_ID_ATTRIBUTE.to_string(),
      types: Vec::new(),
    }
  }
}

impl SchemaBuilder {
  /// Set the schema-wide identity attribute.
  pub fn id_attribute(mut self, attribute: impl Into<String>) -> Self {
    self.id_attribute = attribute.into();
    self
  }

  pub fn resource(mut self, config: TypeConfig) -> Self {
    self.types.push(config);
    self
  }

  /// Validate relation targets and freeze the schema.
  ///
  /// Fails with [`CacheError::UnknownType`] if a relation points at a type
  /// that is not declared. Cyclic relations are allowed.
  pub fn build(self) -> Result<Schema> {
    let mut types = HashMap::with_capacity(self.types.len());
    for mut config in self.types {
      // Stable: declaration order is kept within each kind
      config
        .relations
        .sort_by_key(|r| matches!(r, Relation::ToOne { .. }));
      types.insert(config.name.clone(), config);
    }

    for config in types.values() {
      for relation in &config.relations {
        if !types.contains_key(relation.related_type()) {
          return Err(CacheError::unknown_type(relation.related_type()));
        }
      }
    }

    Ok(Schema {
      id_attribute: self.id_attribute,
      types,
    })
  }
}
