//! Transport boundary: the request/response exchange the cache depends on.
//!
//! The cache never interprets transport failures; they are handed back to the
//! caller as [`TransportError`] without retrying.

mod http;

pub use http::HttpTransport;

use serde_json::Value;
use std::fmt;
use std::future::Future;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Post,
  Put,
  Delete,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Delete => "DELETE",
    }
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Response body, either already decoded or as raw text.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
  Json(Value),
  Text(String),
}

/// Per-request body and headers.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
  /// JSON-encoded request body
  pub data: Option<String>,
  pub headers: Vec<(String, String)>,
}

#[derive(Debug, Error)]
pub enum TransportError {
  #[error("{method} {url} failed: {cause}")]
  Request {
    method: Method,
    url: String,
    cause: String,
  },

  #[error("{method} {url} returned HTTP {status}")]
  Status {
    method: Method,
    url: String,
    status: u16,
    body: String,
  },
}

/// Performs a single request against the remote API.
pub trait Transport: Send + Sync {
  fn request(
    &self,
    method: Method,
    url: &str,
    options: RequestOptions,
  ) -> impl Future<Output = Result<Payload, TransportError>> + Send;
}
