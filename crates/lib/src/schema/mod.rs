//! Declarative resource schemas.
//!
//! A [`ResourceSchema`] describes one REST resource kind: its fields and
//! their attributes, its URL path templates, its pagination style and its
//! named update operations. Everything downstream (codec, canonicalizer,
//! differ, client, reconciler) is parameterized by it.

mod builtin;

pub use builtin::SchemaRegistry;

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::transport::Method;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
  #[error("failed to read schema {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse schema {origin}: {source}")]
  Parse {
    origin: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("schema has an empty kind")]
  EmptyKind,

  #[error("schema {kind}: duplicate field '{field}'")]
  DuplicateField { kind: String, field: String },

  #[error("schema {kind}: field '{field}' uses update operation '{operation}' which is not declared")]
  UndeclaredOperation {
    kind: String,
    field: String,
    operation: String,
  },

  #[error("schema {kind}: template '{template}' references '{placeholder}' which is not a top-level field")]
  UnknownPlaceholder {
    kind: String,
    template: String,
    placeholder: String,
  },

  #[error("schema {kind}: etag field '{field}' is not declared")]
  UnknownEtagField { kind: String, field: String },

  #[error("schema {kind}: invalid default for field '{field}': {message}")]
  InvalidDefault {
    kind: String,
    field: String,
    message: String,
  },

  #[error("schema {kind}: field '{field}' is a parameter and cannot be nested")]
  NestedParameter { kind: String, field: String },

  #[error("unknown resource kind '{0}'")]
  UnknownKind(String),
}

/// How a difference in a field is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
  /// The difference is cosmetic and needs no call.
  NoOp,
  /// The resource must be deleted and created again.
  #[serde(rename = "recreate")]
  RequiresRecreate,
  /// The named update operation resolves the difference.
  Update(String),
}

impl OperationClass {
  pub fn is_trivial(&self) -> bool {
    matches!(self, OperationClass::NoOp)
  }
}

impl std::fmt::Display for OperationClass {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      OperationClass::NoOp => write!(f, "no-op"),
      OperationClass::RequiresRecreate => write!(f, "recreate"),
      OperationClass::Update(name) => write!(f, "{}", name),
    }
  }
}

/// Comparison mode for list fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
  /// Elements compare pairwise by index.
  #[default]
  Ordered,
  /// Elements compare by greedy matching, ignoring order.
  Set,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
  String,
  /// A resource name; short names equal the last segment of a self-link.
  Reference,
  /// Compared case-insensitively.
  Enum,
  Bool,
  /// Accepts JSON numbers and numeric strings.
  Int,
  Float,
  StringList {
    #[serde(default)]
    collection: Collection,
  },
  Object {
    fields: Vec<FieldSchema>,
  },
  ObjectList {
    fields: Vec<FieldSchema>,
    #[serde(default)]
    collection: Collection,
  },
}

impl FieldType {
  pub fn name(&self) -> &'static str {
    match self {
      FieldType::String => "string",
      FieldType::Reference => "reference",
      FieldType::Enum => "enum",
      FieldType::Bool => "bool",
      FieldType::Int => "int",
      FieldType::Float => "float",
      FieldType::StringList { .. } => "string_list",
      FieldType::Object { .. } => "object",
      FieldType::ObjectList { .. } => "object_list",
    }
  }

  /// Nested field schemas for object-shaped types.
  pub fn nested_fields(&self) -> Option<&[FieldSchema]> {
    match self {
      FieldType::Object { fields } | FieldType::ObjectList { fields, .. } => Some(fields),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
  pub name: String,
  #[serde(rename = "type")]
  pub ty: FieldType,
  #[serde(default)]
  pub required: bool,
  /// Set by the server only; never sent and never diffed.
  #[serde(default)]
  pub output_only: bool,
  /// Appears only in URLs, never in request bodies.
  #[serde(default)]
  pub parameter: bool,
  /// Part of the resource's identity; all identity fields must be set to fetch.
  #[serde(default)]
  pub identity: bool,
  /// Assigned by the server on create; must be unset in a create request.
  #[serde(default)]
  pub server_generated: bool,
  /// Static operation class; nested fields inherit it when absent.
  #[serde(default)]
  pub operation: Option<OperationClass>,
  /// Wire format applied on encode, e.g. `projects/{{project}}/releases/{{name}}`.
  #[serde(default)]
  pub wire_template: Option<String>,
  #[serde(default)]
  pub default: Option<serde_json::Value>,
}

/// URL path templates, relative to the base URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePaths {
  pub get: String,
  #[serde(default)]
  pub list: Option<String>,
  pub create: String,
  pub delete: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pagination {
  /// `pageToken`/`pageSize` query parameters, `nextPageToken` in the body.
  #[default]
  PageToken,
  /// `start`/`limit` query parameters, `next.start` in the body.
  StartLimit,
  None,
}

/// A named call that resolves `Update(name)` diffs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOperation {
  pub name: String,
  pub method: Method,
  pub path: String,
  /// Send the changed top-level field names as `updateMask`.
  #[serde(default)]
  pub update_mask: bool,
  /// Send the observed etag as `If-Match`.
  #[serde(default)]
  pub if_match: bool,
  /// Wrap the request body under this key, e.g. `{"release": {...}}`.
  #[serde(default)]
  pub body_key: Option<String>,
  /// Restrict the request body to these top-level fields.
  #[serde(default)]
  pub body_fields: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSchema {
  pub kind: String,
  pub base_url: String,
  pub paths: ResourcePaths,
  /// Key holding the items array in list responses.
  #[serde(default)]
  pub list_key: Option<String>,
  #[serde(default)]
  pub pagination: Pagination,
  /// Extra statuses treated as not-found on get and delete.
  #[serde(default)]
  pub not_found_statuses: Vec<u16>,
  #[serde(default)]
  pub etag_field: Option<String>,
  pub fields: Vec<FieldSchema>,
  #[serde(default)]
  pub update_operations: Vec<UpdateOperation>,
}

impl ResourceSchema {
  /// Parse and validate a schema document.
  pub fn from_json_str(origin: &str, json: &str) -> Result<Self, SchemaError> {
    let schema: ResourceSchema = serde_json::from_str(json).map_err(|source| SchemaError::Parse {
      origin: origin.to_string(),
      source,
    })?;
    schema.validate()?;
    Ok(schema)
  }

  pub fn load(path: &Path) -> Result<Self, SchemaError> {
    let json = std::fs::read_to_string(path).map_err(|source| SchemaError::Read {
      path: path.display().to_string(),
      source,
    })?;
    Self::from_json_str(&path.display().to_string(), &json)
  }

  pub fn field(&self, name: &str) -> Option<&FieldSchema> {
    self.fields.iter().find(|f| f.name == name)
  }

  pub fn update_operation(&self, name: &str) -> Option<&UpdateOperation> {
    self.update_operations.iter().find(|op| op.name == name)
  }

  pub fn identity_fields(&self) -> impl Iterator<Item = &FieldSchema> {
    self.fields.iter().filter(|f| f.identity)
  }

  pub fn parameter_fields(&self) -> impl Iterator<Item = &FieldSchema> {
    self.fields.iter().filter(|f| f.parameter)
  }

  pub fn is_not_found_status(&self, status: u16) -> bool {
    status == 404 || self.not_found_statuses.contains(&status)
  }

  /// Check the schema's internal consistency.
  pub fn validate(&self) -> Result<(), SchemaError> {
    if self.kind.trim().is_empty() {
      return Err(SchemaError::EmptyKind);
    }
    self.validate_fields(&self.fields, true)?;

    let top_level: HashSet<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
    let mut templates = vec![&self.paths.get, &self.paths.create, &self.paths.delete];
    templates.extend(self.paths.list.iter());
    templates.extend(self.update_operations.iter().map(|op| &op.path));
    templates.extend(self.fields.iter().filter_map(|f| f.wire_template.as_ref()));
    for template in templates {
      for placeholder in placeholders(template) {
        if !top_level.contains(placeholder) {
          return Err(SchemaError::UnknownPlaceholder {
            kind: self.kind.clone(),
            template: template.clone(),
            placeholder: placeholder.to_string(),
          });
        }
      }
    }

    if let Some(etag) = &self.etag_field {
      if !top_level.contains(etag.as_str()) {
        return Err(SchemaError::UnknownEtagField {
          kind: self.kind.clone(),
          field: etag.clone(),
        });
      }
    }
    Ok(())
  }

  fn validate_fields(&self, fields: &[FieldSchema], top_level: bool) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    for field in fields {
      if !seen.insert(field.name.as_str()) {
        return Err(SchemaError::DuplicateField {
          kind: self.kind.clone(),
          field: field.name.clone(),
        });
      }
      if field.parameter && !top_level {
        return Err(SchemaError::NestedParameter {
          kind: self.kind.clone(),
          field: field.name.clone(),
        });
      }
      if let Some(OperationClass::Update(op)) = &field.operation {
        if self.update_operation(op).is_none() {
          return Err(SchemaError::UndeclaredOperation {
            kind: self.kind.clone(),
            field: field.name.clone(),
            operation: op.clone(),
          });
        }
      }
      if let Some(default) = &field.default {
        codec::decode_field(&field.ty, default, &field.name).map_err(|e| SchemaError::InvalidDefault {
          kind: self.kind.clone(),
          field: field.name.clone(),
          message: e.to_string(),
        })?;
      }
      if let Some(nested) = field.ty.nested_fields() {
        self.validate_fields(nested, false)?;
      }
    }
    Ok(())
  }
}

/// Names between `{{` and `}}` in a path template.
pub fn placeholders(template: &str) -> Vec<&str> {
  let mut out = Vec::new();
  let mut rest = template;
  while let Some(start) = rest.find("{{") {
    let after = &rest[start + 2..];
    match after.find("}}") {
      Some(end) => {
        out.push(after[..end].trim());
        rest = &after[end + 2..];
      }
      None => break,
    }
  }
  out
}
