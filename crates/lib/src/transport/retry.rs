use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff for transient failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Retries after the first attempt; zero disables retrying.
  pub max_retries: u32,
  #[serde(with = "crate::util::duration")]
  pub initial_backoff: Duration,
  #[serde(with = "crate::util::duration")]
  pub max_backoff: Duration,
  pub multiplier: f64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 3,
      initial_backoff: Duration::from_millis(500),
      max_backoff: Duration::from_secs(30),
      multiplier: 2.0,
    }
  }
}

impl RetryPolicy {
  pub fn none() -> Self {
    Self {
      max_retries: 0,
      ..Self::default()
    }
  }

  /// Delay before retry number `attempt` (zero-based), capped at `max_backoff`.
  pub fn backoff(&self, attempt: u32) -> Duration {
    let factor = self.multiplier.max(1.0).powi(attempt.min(i32::MAX as u32) as i32);
    let secs = self.initial_backoff.as_secs_f64() * factor;
    if !secs.is_finite() || secs >= self.max_backoff.as_secs_f64() {
      return self.max_backoff;
    }
    Duration::from_secs_f64(secs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn backoff_grows_exponentially_and_caps() {
    let policy = RetryPolicy {
      max_retries: 10,
      initial_backoff: Duration::from_millis(100),
      max_backoff: Duration::from_secs(1),
      multiplier: 2.0,
    };
    assert_eq!(policy.backoff(0), Duration::from_millis(100));
    assert_eq!(policy.backoff(1), Duration::from_millis(200));
    assert_eq!(policy.backoff(3), Duration::from_millis(800));
    assert_eq!(policy.backoff(4), Duration::from_secs(1));
    assert_eq!(policy.backoff(500), Duration::from_secs(1));
  }

  #[test]
  fn deserializes_human_durations() {
    let policy: RetryPolicy = toml::from_str(
      r#"
        max_retries = 5
        initial_backoff = "250ms"
        max_backoff = "1m"
      "#,
    )
    .unwrap();
    assert_eq!(policy.max_retries, 5);
    assert_eq!(policy.initial_backoff, Duration::from_millis(250));
    assert_eq!(policy.max_backoff, Duration::from_secs(60));
    assert_eq!(policy.multiplier, 2.0);
  }
}
