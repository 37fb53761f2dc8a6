use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::{debug, warn};

use super::{Method, Payload, RequestOptions, Transport, TransportError};

/// HTTP transport backed by reqwest.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  /// Headers sent with every request, before per-request headers
  headers: Vec<(String, String)>,
}

impl HttpTransport {
  pub fn new(headers: Vec<(String, String)>) -> Result<Self, TransportError> {
    let client = reqwest::Client::builder()
      .gzip(true)
      .deflate(true)
      .build()
      .map_err(|e| TransportError::Request {
        method: Method::Get,
        url: String::new(),
        cause: format!("Failed to create HTTP client: {}", e),
      })?;

    Ok(Self { client, headers })
  }
}

impl From<Method> for reqwest::Method {
  fn from(method: Method) -> Self {
    match method {
      Method::Get => reqwest::Method::GET,
      Method::Post => reqwest::Method::POST,
      Method::Put => reqwest::Method::PUT,
      Method::Delete => reqwest::Method::DELETE,
    }
  }
}

impl Transport for HttpTransport {
  async fn request(
    &self,
    method: Method,
    url: &str,
    options: RequestOptions,
  ) -> Result<Payload, TransportError> {
    let failed = |cause: reqwest::Error| TransportError::Request {
      method,
      url: url.to_string(),
      cause: cause.to_string(),
    };

    let mut request = self
      .client
      .request(method.into(), url)
      .header(ACCEPT, "application/json");
    for (name, value) in self.headers.iter().chain(options.headers.iter()) {
      request = request.header(name.as_str(), value.as_str());
    }
    if let Some(data) = options.data {
      request = request.header(CONTENT_TYPE, "application/json").body(data);
    }

    debug!(%method, url, "sending request");
    let response = request.send().await.map_err(&failed)?;
    let status = response.status();
    let body = response.text().await.map_err(&failed)?;

    if !status.is_success() {
      warn!(%method, url, status = status.as_u16(), "request rejected");
      return Err(TransportError::Status {
        method,
        url: url.to_string(),
        status: status.as_u16(),
        body,
      });
    }

    Ok(Payload::Text(body))
  }
}
