//! Serde helpers for human-readable durations (`"30s"`, `"250ms"`).

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.collect_str(&humantime::format_duration(*value))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
  let text = String::deserialize(deserializer)?;
  humantime::parse_duration(&text).map_err(serde::de::Error::custom)
}

pub mod option {
  use super::*;

  pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
      Some(d) => serializer.collect_str(&humantime::format_duration(*d)),
      None => serializer.serialize_none(),
    }
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
    Option::<String>::deserialize(deserializer)?
      .map(|text| humantime::parse_duration(&text).map_err(serde::de::Error::custom))
      .transpose()
  }
}
