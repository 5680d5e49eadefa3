//! Resource manifests.
//!
//! A manifest is a JSON document naming a kind and the desired fields:
//!
//! ```json
//! { "kind": "firebaserules.Release", "key": "prod-release", "spec": { "project": "p", "name": "prod" } }
//! ```
//!
//! `schema` may point at a custom schema document, relative to the manifest.
//! `key` names the stored state; it defaults to the manifest's file stem.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::warn;

use converge_lib::codec;
use converge_lib::resource::Resource;
use converge_lib::schema::{ResourceSchema, SchemaRegistry};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
  kind: String,
  #[serde(default)]
  spec: serde_json::Value,
  #[serde(default)]
  schema: Option<PathBuf>,
  #[serde(default)]
  key: Option<String>,
}

/// A manifest resolved against its schema.
#[derive(Debug, Clone)]
pub struct LoadedManifest {
  pub schema: ResourceSchema,
  pub resource: Resource,
  /// State store key.
  pub key: String,
}

impl LoadedManifest {
  pub fn load(path: &Path) -> Result<Self> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    let manifest: Manifest =
      serde_json::from_str(&content).with_context(|| format!("Failed to parse manifest: {}", path.display()))?;

    let schema = match &manifest.schema {
      Some(schema_path) => {
        let schema_path = match path.parent() {
          Some(dir) if schema_path.is_relative() => dir.join(schema_path),
          _ => schema_path.clone(),
        };
        let schema = ResourceSchema::load(&schema_path)?;
        if schema.kind != manifest.kind {
          bail!(
            "manifest kind '{}' does not match schema kind '{}' in {}",
            manifest.kind,
            schema.kind,
            schema_path.display()
          );
        }
        schema
      }
      None => SchemaRegistry::builtin()?.get(&manifest.kind)?.clone(),
    };

    let spec = if manifest.spec.is_null() {
      serde_json::Value::Object(Default::default())
    } else {
      manifest.spec
    };
    if let Some(map) = spec.as_object() {
      for name in map.keys().filter(|name| schema.field(name).is_none()) {
        warn!(kind = %schema.kind, field = %name, "ignoring field not in schema");
      }
    }
    let resource = codec::from_json(&schema, &spec).with_context(|| format!("Invalid spec in {}", path.display()))?;

    let key = match manifest.key {
      Some(key) => key,
      None => path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .context("Manifest path has no file name to derive a state key from")?,
    };

    Ok(Self { schema, resource, key })
  }
}
