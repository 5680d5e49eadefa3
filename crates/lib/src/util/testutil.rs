//! Test utilities for converge-lib.
//!
//! [`FakeTransport`] replays scripted responses per method and URL path and
//! records every request it receives.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ClientConfig;
use crate::transport::{Method, Request, Response, RetryPolicy, Transport, TransportError, classify_status};

/// Config with no transport retries and millisecond backoffs.
pub fn test_config() -> ClientConfig {
  ClientConfig {
    retry: RetryPolicy {
      max_retries: 0,
      initial_backoff: Duration::from_millis(1),
      max_backoff: Duration::from_millis(2),
      multiplier: 2.0,
    },
    conflict_retries: 2,
    apply_timeout: Some(Duration::from_secs(5)),
    ..ClientConfig::default()
  }
}

#[derive(Debug, Clone)]
struct Scripted {
  status: u16,
  body: String,
  headers: BTreeMap<String, String>,
}

/// Scripted transport. Responses for the same method and path are served in
/// order; the last one repeats. Unscripted requests get a 501.
#[derive(Debug, Default)]
pub struct FakeTransport {
  routes: Mutex<HashMap<(Method, String), VecDeque<Scripted>>>,
  requests: Mutex<Vec<Request>>,
}

impl FakeTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, method: Method, path: &str, status: u16, body: &str) {
    self.respond_with_headers(method, path, status, body, &[]);
  }

  pub fn respond_with_headers(&self, method: Method, path: &str, status: u16, body: &str, headers: &[(&str, &str)]) {
    let scripted = Scripted {
      status,
      body: body.to_string(),
      headers: headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
        .collect(),
    };
    self
      .routes
      .lock()
      .unwrap()
      .entry((method, path.to_string()))
      .or_default()
      .push_back(scripted);
  }

  pub fn requests(&self) -> Vec<Request> {
    self.requests.lock().unwrap().clone()
  }

  /// Requests other than GET.
  pub fn mutations(&self) -> Vec<Request> {
    self
      .requests()
      .into_iter()
      .filter(|r| r.method != Method::Get)
      .collect()
  }
}

#[async_trait]
impl Transport for FakeTransport {
  async fn send(&self, request: Request, _retry: &RetryPolicy) -> Result<Response, TransportError> {
    self.requests.lock().unwrap().push(request.clone());
    let path = url::Url::parse(&request.url)
      .map(|u| u.path().to_string())
      .unwrap_or_else(|_| request.url.clone());

    let scripted = {
      let mut routes = self.routes.lock().unwrap();
      routes.get_mut(&(request.method, path.clone())).and_then(|queue| {
        if queue.len() > 1 {
          queue.pop_front()
        } else {
          queue.front().cloned()
        }
      })
    };
    let scripted = scripted.unwrap_or_else(|| Scripted {
      status: 501,
      body: format!("no scripted response for {} {}", request.method, path),
      headers: BTreeMap::new(),
    });

    match classify_status(request.method, &request.url, scripted.status, scripted.body.as_bytes()) {
      Some(err) => Err(err),
      None => Ok(Response {
        status: scripted.status,
        headers: scripted.headers,
        body: scripted.body.into_bytes(),
      }),
    }
  }
}
