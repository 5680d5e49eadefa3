//! HTTP transport abstraction.
//!
//! The [`Transport`] trait is the only seam between the reconciler and the
//! network. [`HttpTransport`] is the reqwest-backed implementation; tests
//! substitute scripted transports.

mod error;
mod http;
mod retry;

pub use error::{ErrorBody, GoogleError, IamError, IamErrorEnvelope, TransportError, classify_status};
pub use http::HttpTransport;
pub use retry::RetryPolicy;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
  Get,
  Post,
  Put,
  Patch,
  Delete,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    }
  }

  /// Safe to repeat after a transient failure without side effects.
  pub fn is_idempotent(&self) -> bool {
    !matches!(self, Method::Post | Method::Patch)
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// An outgoing HTTP request with a fully built URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
  pub method: Method,
  pub url: String,
  pub headers: BTreeMap<String, String>,
  pub body: Option<Vec<u8>>,
}

impl Request {
  pub fn new(method: Method, url: impl Into<String>) -> Self {
    Self {
      method,
      url: url.into(),
      headers: BTreeMap::new(),
      body: None,
    }
  }

  pub fn with_body(mut self, body: Vec<u8>) -> Self {
    self.body = Some(body);
    self
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.insert(name.into(), value.into());
    self
  }
}

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Response {
  pub status: u16,
  /// Header names are lowercase.
  pub headers: BTreeMap<String, String>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn header(&self, name: &str) -> Option<&str> {
    self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
  }
}

/// Sends requests, retrying transient failures per the policy.
///
/// Implementations classify non-2xx responses into [`TransportError`]
/// variants: not-found, conflict, other status, timeout or network.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, request: Request, retry: &RetryPolicy) -> Result<Response, TransportError>;
}
