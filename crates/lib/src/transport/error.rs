use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use super::Method;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
  #[error("{method} {url}: not found ({status}): {body}")]
  NotFound {
    method: Method,
    url: String,
    status: u16,
    body: ErrorBody,
  },

  #[error("{method} {url}: conflict ({status}): {body}")]
  Conflict {
    method: Method,
    url: String,
    status: u16,
    body: ErrorBody,
  },

  #[error("{method} {url}: HTTP {status}: {body}")]
  Status {
    method: Method,
    url: String,
    status: u16,
    body: ErrorBody,
  },

  #[error("{method} {url}: timed out after {timeout:?}")]
  Timeout {
    method: Method,
    url: String,
    timeout: Duration,
  },

  #[error("{method} {url}: {message}")]
  Network {
    method: Method,
    url: String,
    message: String,
  },

  #[error("invalid URL '{url}': {source}")]
  InvalidUrl {
    url: String,
    #[source]
    source: url::ParseError,
  },

  #[error("failed to build HTTP client: {0}")]
  Build(String),
}

impl TransportError {
  pub fn is_not_found(&self) -> bool {
    matches!(self, TransportError::NotFound { .. })
  }

  pub fn is_conflict(&self) -> bool {
    matches!(self, TransportError::Conflict { .. })
  }

  pub fn status(&self) -> Option<u16> {
    match self {
      TransportError::NotFound { status, .. }
      | TransportError::Conflict { status, .. }
      | TransportError::Status { status, .. } => Some(*status),
      _ => None,
    }
  }

  /// Worth retrying at the transport level.
  pub fn is_transient(&self) -> bool {
    match self {
      TransportError::Status { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
      TransportError::Network { .. } | TransportError::Timeout { .. } => true,
      _ => false,
    }
  }

  /// Reclassify a status error as not-found, for resources whose backend
  /// answers missing instances with a status other than 404.
  pub fn into_not_found_if(self, statuses: &[u16]) -> Self {
    match self {
      TransportError::Status {
        method,
        url,
        status,
        body,
      } if statuses.contains(&status) => TransportError::NotFound {
        method,
        url,
        status,
        body,
      },
      other => other,
    }
  }
}

/// Classify a non-2xx response. Returns `None` for success statuses.
pub fn classify_status(method: Method, url: &str, status: u16, body: &[u8]) -> Option<TransportError> {
  if (200..300).contains(&status) {
    return None;
  }
  let body = ErrorBody::parse(body);
  let url = url.to_string();
  let err = match status {
    404 => TransportError::NotFound {
      method,
      url,
      status,
      body,
    },
    400 if body.is_not_found_shaped() => TransportError::NotFound {
      method,
      url,
      status,
      body,
    },
    409 | 412 => TransportError::Conflict {
      method,
      url,
      status,
      body,
    },
    _ => TransportError::Status {
      method,
      url,
      status,
      body,
    },
  };
  Some(err)
}

/// IAM-style error envelope: `{trace, errors: [{code, message}], status_code}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IamErrorEnvelope {
  #[serde(default)]
  pub trace: Option<String>,
  #[serde(default)]
  pub errors: Vec<IamError>,
  #[serde(default)]
  pub status_code: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IamError {
  #[serde(default)]
  pub code: String,
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub more_info: Option<String>,
}

/// Google API error: `{"error": {code, message, status}}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GoogleError {
  #[serde(default)]
  pub code: Option<u16>,
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub status: Option<String>,
}

#[derive(Deserialize)]
struct GoogleEnvelope {
  error: GoogleError,
}

/// A parsed error response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorBody {
  Iam(IamErrorEnvelope),
  Google(GoogleError),
  Text(String),
}

impl ErrorBody {
  /// Pick the envelope by its discriminating key: `errors` for IAM,
  /// `error` for Google. Anything else is kept as text.
  pub fn parse(bytes: &[u8]) -> Self {
    let text = || ErrorBody::Text(String::from_utf8_lossy(bytes).trim().to_string());
    let Ok(json) = serde_json::from_slice::<serde_json::Value>(bytes) else {
      return text();
    };
    let Some(map) = json.as_object() else {
      return text();
    };
    if map.get("errors").is_some_and(serde_json::Value::is_array) {
      if let Ok(envelope) = serde_json::from_value::<IamErrorEnvelope>(json.clone()) {
        return ErrorBody::Iam(envelope);
      }
    }
    if map.get("error").is_some_and(serde_json::Value::is_object) {
      if let Ok(envelope) = serde_json::from_value::<GoogleEnvelope>(json.clone()) {
        return ErrorBody::Google(envelope.error);
      }
    }
    text()
  }

  pub fn is_not_found_shaped(&self) -> bool {
    match self {
      ErrorBody::Iam(env) => {
        env.status_code == Some(404) || env.errors.iter().any(|e| e.code.to_ascii_lowercase().contains("not_found"))
      }
      ErrorBody::Google(err) => err.code == Some(404) || err.status.as_deref() == Some("NOT_FOUND"),
      ErrorBody::Text(text) => text.to_ascii_lowercase().contains("not found"),
    }
  }
}

impl fmt::Display for ErrorBody {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ErrorBody::Iam(env) => {
        let messages: Vec<String> = env
          .errors
          .iter()
          .map(|e| format!("{}: {}", e.code, e.message))
          .collect();
        write!(f, "{}", messages.join("; "))?;
        if let Some(trace) = &env.trace {
          write!(f, " (trace {})", trace)?;
        }
        Ok(())
      }
      ErrorBody::Google(err) => match &err.status {
        Some(status) => write!(f, "{}: {}", status, err.message),
        None => write!(f, "{}", err.message),
      },
      ErrorBody::Text(text) if text.is_empty() => write!(f, "<empty body>"),
      ErrorBody::Text(text) => write!(f, "{}", text),
    }
  }
}
