use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::schema::{Schema, TypeConfig, DEFAULT_ID_ATTRIBUTE};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Base URL that `/`-prefixed type locations are resolved against
  pub api_url: String,
  /// Identity attribute shared by all types unless overridden
  #[serde(default = "default_id_attribute")]
  pub id_attribute: String,
  /// Headers sent with every request
  #[serde(default)]
  pub headers: BTreeMap<String, String>,
  #[serde(default)]
  pub types: BTreeMap<String, TypeEntry>,
}

fn default_id_attribute() -> String {
  DEFAULT_ID_ATTRIBUTE.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TypeEntry {
  /// Collection location, relative to `api_url` or absolute
  pub url: String,
  pub id_attribute: Option<String>,
  /// Key of a response envelope holding the records (e.g. "results")
  pub envelope: Option<String>,
  /// Attribute -> related type
  #[serde(default)]
  pub to_one: BTreeMap<String, String>,
  #[serde(default)]
  pub to_many: BTreeMap<String, String>,
}

impl Config {
  /// Load the configuration file.
  ///
  /// An explicit path must exist. Without one, `./relcache.yaml` is tried,
  /// then `relcache/config.yaml` under the user config directory.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = match explicit_path {
      Some(path) if path.is_file() => path.to_path_buf(),
      Some(path) => return Err(eyre!("Config file not found: {}", path.display())),
      None => Self::candidate_paths()
        .into_iter()
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| {
          eyre!("No relcache.yaml in the working directory or the user config directory")
        })?,
    };

    let contents = std::fs::read_to_string(&path)
      .map_err(|e| eyre!("Cannot read {}: {}", path.display(), e))?;
    Self::from_yaml(&contents).map_err(|e| eyre!("Invalid config {}: {}", path.display(), e))
  }

  fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("relcache.yaml")];
    paths.extend(dirs::config_dir().map(|dir| dir.join("relcache").join("config.yaml")));
    paths
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Build the schema registry described by the `types` section.
  pub fn schema(&self) -> Result<Schema> {
    let mut builder = Schema::builder().id_attribute(self.id_attribute.clone());

    for (name, entry) in &self.types {
      let mut config = TypeConfig::new(name.clone(), entry.url.clone());
      for (attribute, related) in &entry.to_many {
        config = config.to_many(attribute.clone(), related.clone());
      }
      for (attribute, related) in &entry.to_one {
        config = config.to_one(attribute.clone(), related.clone());
      }
      if let Some(id_attribute) = &entry.id_attribute {
        config = config.id_attribute(id_attribute.clone());
      }
      if let Some(envelope) = entry.envelope.clone() {
        config = config.reshape(move |mut body| {
          body
            .get_mut(envelope.as_str())
            .map(Value::take)
            .unwrap_or(body)
        });
      }
      builder = builder.resource(config);
    }

    builder
      .build()
      .map_err(|e| eyre!("Invalid schema in config: {}", e))
  }

  /// Request headers, including `Authorization` when an API token is set.
  pub fn request_headers(&self) -> Vec<(String, String)> {
    self.headers_with_token(Self::get_api_token())
  }

  fn headers_with_token(&self, token: Option<String>) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = self
      .headers
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect();
    if let Some(token) = token {
      headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
    }
    headers
  }

  /// Get the API token from the environment.
  ///
  /// Checks RELCACHE_API_TOKEN.
  pub fn get_api_token() -> Option<String> {
    std::env::var("RELCACHE_API_TOKEN")
      .ok()
      .filter(|t| !t.is_empty())
  }
}
