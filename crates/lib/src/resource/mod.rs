//! Schema-bound resources and URL path templates.

use std::collections::BTreeMap;

use crate::schema::{FieldSchema, FieldType, ResourceSchema, placeholders};
use crate::value::{Field, Object, Value};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
  #[error("resource kind '{actual}' does not match schema '{expected}'")]
  KindMismatch { expected: String, actual: String },

  #[error("required field '{0}' is missing")]
  MissingField(String),

  #[error("required parameter '{0}' is missing")]
  MissingParameter(String),

  #[error("output-only field '{0}' cannot be set")]
  OutputOnlySet(String),

  #[error("server-generated field '{field}' was specified as '{value}', it must be left unset")]
  ServerGeneratedSet { field: String, value: String },
}

/// A resource instance: a kind plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
  kind: String,
  fields: Object,
}

impl Resource {
  pub fn new(kind: impl Into<String>) -> Self {
    Self {
      kind: kind.into(),
      fields: Object::new(),
    }
  }

  pub fn from_fields(kind: impl Into<String>, fields: Object) -> Self {
    Self {
      kind: kind.into(),
      fields,
    }
  }

  pub fn kind(&self) -> &str {
    &self.kind
  }

  pub fn fields(&self) -> &Object {
    &self.fields
  }

  pub fn into_fields(self) -> Object {
    self.fields
  }

  pub fn get(&self, name: &str) -> &Field {
    self.fields.get(name)
  }

  pub fn set(&mut self, name: impl Into<String>, field: Field) {
    self.fields.set(name, field);
  }

  pub fn with(mut self, name: impl Into<String>, field: Field) -> Self {
    self.set(name, field);
    self
  }

  pub fn check_kind(&self, schema: &ResourceSchema) -> Result<(), ValidationError> {
    if self.kind != schema.kind {
      return Err(ValidationError::KindMismatch {
        expected: schema.kind.clone(),
        actual: self.kind.clone(),
      });
    }
    Ok(())
  }

  /// Check required fields (recursively) and required URL parameters.
  /// Output-only fields must be left unset.
  pub fn validate(&self, schema: &ResourceSchema) -> Result<(), ValidationError> {
    self.check_kind(schema)?;
    for field in &schema.fields {
      if field.required && field.parameter && self.get(&field.name).is_blank() {
        return Err(ValidationError::MissingParameter(field.name.clone()));
      }
    }
    validate_object(&schema.fields, &self.fields, "")
  }

  /// True when every identity field has a value, so the resource can be fetched.
  pub fn has_identity(&self, schema: &ResourceSchema) -> bool {
    schema.identity_fields().all(|f| !self.get(&f.name).is_blank())
  }

  /// Values for path template substitution: every set top-level scalar,
  /// reduced to its last path segment.
  pub fn url_params(&self, schema: &ResourceSchema) -> BTreeMap<String, String> {
    schema
      .fields
      .iter()
      .filter_map(|f| {
        let raw = scalar_string(self.get(&f.name))?;
        let value = match f.ty {
          FieldType::Reference => self_link_to_name(&raw).to_string(),
          _ => raw,
        };
        Some((f.name.clone(), value))
      })
      .collect()
  }

  /// Human-readable identity, e.g. `firebaserules.Release project=p name=r1`.
  pub fn describe(&self, schema: &ResourceSchema) -> String {
    let params = self.url_params(schema);
    let mut out = self.kind.clone();
    for field in schema.fields.iter().filter(|f| f.identity || f.parameter) {
      if let Some(value) = params.get(&field.name) {
        out.push_str(&format!(" {}={}", field.name, value));
      }
    }
    out
  }

  /// The observed etag, when the schema declares one.
  pub fn etag(&self, schema: &ResourceSchema) -> Option<&str> {
    schema.etag_field.as_deref().and_then(|f| self.get(f).as_str())
  }
}

fn validate_object(fields: &[FieldSchema], obj: &Object, prefix: &str) -> Result<(), ValidationError> {
  for field in fields {
    let path = if prefix.is_empty() {
      field.name.clone()
    } else {
      format!("{}.{}", prefix, field.name)
    };
    let value = obj.get(&field.name);
    if field.output_only {
      if !value.is_unset() {
        return Err(ValidationError::OutputOnlySet(path));
      }
      continue;
    }
    if field.required && !field.parameter && value.is_blank() {
      return Err(ValidationError::MissingField(path));
    }
    match (&field.ty, value.value()) {
      (FieldType::Object { fields: nested }, Some(Value::Object(inner))) => {
        validate_object(nested, inner, &path)?;
      }
      (FieldType::ObjectList { fields: nested, .. }, Some(Value::List(items))) => {
        for (i, item) in items.iter().enumerate() {
          if let Value::Object(inner) = item {
            validate_object(nested, inner, &format!("{}[{}]", path, i))?;
          }
        }
      }
      _ => {}
    }
  }
  Ok(())
}

fn scalar_string(field: &Field) -> Option<String> {
  match field.value()? {
    Value::String(s) => Some(s.clone()),
    Value::Int(i) => Some(i.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    Value::Float(f) => Some(f.to_string()),
    Value::List(_) | Value::Object(_) => None,
  }
}

/// Last path segment of a self-link or resource name.
pub fn self_link_to_name(value: &str) -> &str {
  value.rsplit('/').next().unwrap_or(value)
}

/// Substitute `{{name}}` placeholders. Every placeholder must have a value.
pub fn expand_template(template: &str, params: &BTreeMap<String, String>) -> Result<String, ValidationError> {
  let mut out = template.to_string();
  for name in placeholders(template) {
    let value = params
      .get(name)
      .filter(|v| !v.is_empty())
      .ok_or_else(|| ValidationError::MissingParameter(name.to_string()))?;
    out = out.replacen(&format!("{{{{{}}}}}", name), value, 1);
    out = out.replacen(&format!("{{{{ {} }}}}", name), value, 1);
  }
  Ok(out)
}

/// Match a concrete path such as `projects/p/releases/r1` against a template
/// such as `projects/{{project}}/releases/{{name}}`, returning the bound
/// placeholder values. A trailing URL prefix before the template is allowed.
pub fn extract_from_template(template: &str, path: &str) -> Option<BTreeMap<String, String>> {
  let template = template.split('?').next().unwrap_or(template);
  let template_parts: Vec<&str> = template.split('/').filter(|s| !s.is_empty()).collect();
  let path_parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
  if path_parts.len() < template_parts.len() {
    return None;
  }
  let tail = &path_parts[path_parts.len() - template_parts.len()..];

  let mut out = BTreeMap::new();
  for (pattern, actual) in template_parts.iter().zip(tail) {
    match pattern.strip_prefix("{{").and_then(|p| p.strip_suffix("}}")) {
      Some(name) => {
        out.insert(name.trim().to_string(), (*actual).to_string());
      }
      None if pattern == actual => {}
      None => return None,
    }
  }
  Some(out)
}
