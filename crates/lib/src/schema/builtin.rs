use std::collections::BTreeMap;

use super::{ResourceSchema, SchemaError};

const BUILTIN: &[(&str, &str)] = &[
  (
    "firebaserules_release.json",
    include_str!("../../schemas/firebaserules_release.json"),
  ),
  (
    "firebaserules_ruleset.json",
    include_str!("../../schemas/firebaserules_ruleset.json"),
  ),
  ("iam_policy.json", include_str!("../../schemas/iam_policy.json")),
  ("iam_role.json", include_str!("../../schemas/iam_role.json")),
];

/// Resource schemas indexed by kind.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
  schemas: BTreeMap<String, ResourceSchema>,
}

impl SchemaRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registry preloaded with the schemas shipped in the crate.
  pub fn builtin() -> Result<Self, SchemaError> {
    let mut registry = Self::new();
    for (origin, json) in BUILTIN {
      registry.register(ResourceSchema::from_json_str(origin, json)?);
    }
    Ok(registry)
  }

  /// Adds a schema, replacing any schema of the same kind.
  pub fn register(&mut self, schema: ResourceSchema) {
    self.schemas.insert(schema.kind.clone(), schema);
  }

  pub fn get(&self, kind: &str) -> Result<&ResourceSchema, SchemaError> {
    self
      .schemas
      .get(kind)
      .ok_or_else(|| SchemaError::UnknownKind(kind.to_string()))
  }

  pub fn kinds(&self) -> impl Iterator<Item = &str> {
    self.schemas.keys().map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = &ResourceSchema> {
    self.schemas.values()
  }
}
