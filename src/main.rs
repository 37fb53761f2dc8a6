use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use relcache::config::Config;
use relcache::{Cache, FetchOptions, HttpTransport, Query, Relation, Schema};

#[derive(Parser, Debug)]
#[command(name = "relcache")]
#[command(about = "Fetch and query a REST API through a normalizing cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/relcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch a resource type and print its cached records as JSON
  Get {
    type_name: String,

    /// Also fetch these types before querying
    #[arg(short, long)]
    include: Vec<String>,

    /// Query string parameter (key=value)
    #[arg(short, long = "param", value_parser = parse_pair)]
    params: Vec<(String, String)>,

    /// Only print records whose attribute equals the value (key=value, value parsed as JSON)
    #[arg(short, long = "where", value_parser = parse_pair)]
    filters: Vec<(String, String)>,
  },
  /// List declared resource types and their relations
  Types,
}

fn parse_pair(s: &str) -> std::result::Result<(String, String), String> {
  let (key, value) = s
    .split_once('=')
    .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
  Ok((key.to_string(), value.to_string()))
}

/// Log to a daily file under the data directory; stdout carries command output.
fn init_logging() -> Result<WorkerGuard> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("relcache");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let (writer, guard) =
    tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "relcache.log"));

  tracing_subscriber::registry()
    .with(EnvFilter::try_from_env("RELCACHE_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .init();

  Ok(guard)
}

fn print_types(schema: &Schema) -> Result<()> {
  for name in schema.type_names() {
    let config = schema.resolve(name)?;
    println!("{}\t{}\t(id: {})", name, config.location(), schema.identity_of(name)?);
    for relation in config.relations() {
      let kind = match relation {
        Relation::ToMany { .. } => "to-many",
        Relation::ToOne { .. } => "to-one",
      };
      println!(
        "  {} -> {} ({})",
        relation.attribute(),
        relation.related_type(),
        kind
      );
    }
  }
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging()?;

  let config = Config::load(args.config.as_deref())?;
  let schema = config.schema()?;

  match args.command {
    Command::Types => print_types(&schema),
    Command::Get {
      type_name,
      include,
      params,
      filters,
    } => {
      let transport = HttpTransport::new(config.request_headers())?;
      let cache = Cache::new(schema, transport).with_base_url(&config.api_url)?;

      let params: Vec<(&str, &str)> = params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
      cache
        .get(&type_name, &params, FetchOptions::default())
        .await?;
      try_join_all(
        include
          .iter()
          .map(|name| cache.get(name, &[], FetchOptions::default())),
      )
      .await?;

      let query = if filters.is_empty() {
        Query::All
      } else {
        let predicate: Map<String, Value> = filters
          .into_iter()
          .map(|(k, v)| {
            let value = serde_json::from_str(&v).unwrap_or(Value::String(v));
            (k, value)
          })
          .collect();
        Query::Match(predicate)
      };

      let records = cache.find_all(&type_name, query)?;
      println!("{}", serde_json::to_string_pretty(&records)?);
      Ok(())
    }
  }
}
