use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

use super::{Method, Request, Response, RetryPolicy, Transport, TransportError, classify_status};
use crate::config::{Auth, ClientConfig};

/// reqwest-backed [`Transport`] with auth, per-call timeout and retries.
#[derive(Debug, Clone)]
pub struct HttpTransport {
  client: Client,
  auth: Option<Auth>,
  timeout: Duration,
}

impl HttpTransport {
  pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
    let client = Client::builder()
      .user_agent(config.user_agent.clone())
      .build()
      .map_err(|e| TransportError::Build(e.to_string()))?;
    Ok(Self {
      client,
      auth: config.auth.clone(),
      timeout: config.timeout,
    })
  }

  fn headers(&self, request: &Request) -> Result<HeaderMap, TransportError> {
    let invalid = |name: &str| TransportError::Network {
      method: request.method,
      url: request.url.clone(),
      message: format!("invalid value for header {}", name),
    };

    let mut headers = HeaderMap::new();
    match &self.auth {
      Some(Auth::Bearer { token }) => {
        let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| invalid("authorization"))?;
        headers.insert(AUTHORIZATION, value);
      }
      Some(Auth::ApiKey { header, key }) => {
        let name = HeaderName::from_bytes(header.as_bytes()).map_err(|_| invalid(header))?;
        let value = HeaderValue::from_str(key).map_err(|_| invalid(header))?;
        headers.insert(name, value);
      }
      None => {}
    }
    if request.body.is_some() {
      headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    for (name, value) in &request.headers {
      let header = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid(name))?;
      let value = HeaderValue::from_str(value).map_err(|_| invalid(name))?;
      headers.insert(header, value);
    }
    Ok(headers)
  }

  async fn send_once(&self, request: &Request) -> Result<Response, TransportError> {
    let url = reqwest::Url::parse(&request.url).map_err(|source| TransportError::InvalidUrl {
      url: request.url.clone(),
      source,
    })?;
    let method = match request.method {
      Method::Get => reqwest::Method::GET,
      Method::Post => reqwest::Method::POST,
      Method::Put => reqwest::Method::PUT,
      Method::Patch => reqwest::Method::PATCH,
      Method::Delete => reqwest::Method::DELETE,
    };

    let mut builder = self
      .client
      .request(method, url)
      .timeout(self.timeout)
      .headers(self.headers(request)?);
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    debug!(method = %request.method, url = %request.url, "sending request");
    let response = builder.send().await.map_err(|e| self.network_error(request, e))?;

    let status = response.status().as_u16();
    let headers: BTreeMap<String, String> = response
      .headers()
      .iter()
      .filter_map(|(name, value)| Some((name.as_str().to_ascii_lowercase(), value.to_str().ok()?.to_string())))
      .collect();
    let body = response
      .bytes()
      .await
      .map_err(|e| self.network_error(request, e))?
      .to_vec();
    debug!(method = %request.method, url = %request.url, status, "received response");

    match classify_status(request.method, &request.url, status, &body) {
      Some(err) => Err(err),
      None => Ok(Response { status, headers, body }),
    }
  }

  fn network_error(&self, request: &Request, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
      TransportError::Timeout {
        method: request.method,
        url: request.url.clone(),
        timeout: self.timeout,
      }
    } else {
      TransportError::Network {
        method: request.method,
        url: request.url.clone(),
        message: err.to_string(),
      }
    }
  }
}

/// A lost POST or PATCH may already have been applied, so only a status
/// the server sent before acting is retried for those.
fn retryable(method: Method, err: &TransportError) -> bool {
  match err {
    TransportError::Timeout { .. } | TransportError::Network { .. } => method.is_idempotent(),
    other => other.is_transient(),
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn send(&self, request: Request, retry: &RetryPolicy) -> Result<Response, TransportError> {
    let mut attempt = 0;
    loop {
      match self.send_once(&request).await {
        Ok(response) => return Ok(response),
        Err(err) if retryable(request.method, &err) && attempt < retry.max_retries => {
          let delay = retry.backoff(attempt);
          warn!(
            method = %request.method,
            url = %request.url,
            attempt = attempt + 1,
            delay = ?delay,
            error = %err,
            "transient failure, retrying"
          );
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(err) => return Err(err),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use mockito::Matcher;

  fn config(auth: Option<Auth>) -> ClientConfig {
    ClientConfig {
      auth,
      timeout: Duration::from_secs(5),
      ..ClientConfig::default()
    }
  }

  #[test]
  fn lost_mutations_are_not_retried() {
    let timeout = TransportError::Timeout {
      method: Method::Post,
      url: "http://x/".into(),
      timeout: Duration::from_secs(1),
    };
    assert!(!retryable(Method::Post, &timeout));
    assert!(retryable(Method::Get, &timeout));

    let unavailable = classify_status(Method::Post, "http://x/", 503, b"").unwrap();
    assert!(retryable(Method::Post, &unavailable));
  }

  fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
      max_retries,
      initial_backoff: Duration::from_millis(1),
      max_backoff: Duration::from_millis(5),
      multiplier: 2.0,
    }
  }

  #[tokio::test]
  async fn sends_bearer_token_and_json_body() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/v1/things")
      .match_header("authorization", "Bearer secret")
      .match_header("content-type", "application/json")
      .match_body(Matcher::JsonString(r#"{"a":1}"#.into()))
      .with_status(200)
      .with_header("etag", "W/\"1\"")
      .with_body(r#"{"name":"things/1"}"#)
      .create_async()
      .await;

    let transport = HttpTransport::new(&config(Some(Auth::Bearer { token: "secret".into() }))).unwrap();
    let request = Request::new(Method::Post, format!("{}/v1/things", server.url())).with_body(br#"{"a":1}"#.to_vec());
    let response = transport.send(request, &RetryPolicy::none()).await.unwrap();

    mock.assert_async().await;
    assert_eq!(response.status, 200);
    assert_eq!(response.header("ETag"), Some("W/\"1\""));
    assert_eq!(response.body, br#"{"name":"things/1"}"#);
  }

  #[tokio::test]
  async fn sends_api_key_header() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/v1/things/1")
      .match_header("x-api-key", "k1")
      .with_status(200)
      .with_body("{}")
      .create_async()
      .await;

    let transport = HttpTransport::new(&config(Some(Auth::ApiKey {
      header: "x-api-key".into(),
      key: "k1".into(),
    })))
    .unwrap();
    let request = Request::new(Method::Get, format!("{}/v1/things/1", server.url()));
    transport.send(request, &RetryPolicy::none()).await.unwrap();
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn retries_transient_statuses() {
    let mut server = mockito::Server::new_async().await;
    let failing = server
      .mock("GET", "/v1/things/1")
      .with_status(503)
      .expect(2)
      .create_async()
      .await;

    let transport = HttpTransport::new(&config(None)).unwrap();
    let request = Request::new(Method::Get, format!("{}/v1/things/1", server.url()));
    let err = transport.send(request, &fast_retry(1)).await.unwrap_err();

    failing.assert_async().await;
    assert_eq!(err.status(), Some(503));
  }

  #[tokio::test]
  async fn does_not_retry_conflicts() {
    let mut server = mockito::Server::new_async().await;
    let conflict = server
      .mock("PUT", "/v1/things/1")
      .with_status(409)
      .with_body(r#"{"trace":"t","errors":[{"code":"conflict","message":"etag mismatch"}],"status_code":409}"#)
      .expect(1)
      .create_async()
      .await;

    let transport = HttpTransport::new(&config(None)).unwrap();
    let request = Request::new(Method::Put, format!("{}/v1/things/1", server.url()));
    let err = transport.send(request, &fast_retry(3)).await.unwrap_err();

    conflict.assert_async().await;
    assert!(err.is_conflict());
    assert!(err.to_string().contains("etag mismatch"));
  }

  #[tokio::test]
  async fn maps_404_to_not_found() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("GET", "/v1/things/missing")
      .with_status(404)
      .create_async()
      .await;

    let transport = HttpTransport::new(&config(None)).unwrap();
    let request = Request::new(Method::Get, format!("{}/v1/things/missing", server.url()));
    let err = transport.send(request, &RetryPolicy::none()).await.unwrap_err();
    assert!(err.is_not_found());
  }

  #[tokio::test]
  async fn rejects_invalid_urls() {
    let transport = HttpTransport::new(&config(None)).unwrap();
    let err = transport
      .send(Request::new(Method::Get, "not a url"), &RetryPolicy::none())
      .await
      .unwrap_err();
    assert!(matches!(err, TransportError::InvalidUrl { .. }));
  }
}
