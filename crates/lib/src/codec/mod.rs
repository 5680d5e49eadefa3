//! Conversion between JSON wire bodies and [`Resource`] values.
//!
//! Absent or `null` wire fields decode to `Unset`; `{}`, `[]` and `""`
//! decode to `Empty`. Unknown wire fields are ignored.

use std::collections::BTreeMap;

use serde_json::{Map, Value as Json};

use crate::resource::{Resource, expand_template, self_link_to_name};
use crate::schema::{FieldSchema, FieldType, ResourceSchema};
use crate::value::{Field, Object, Value};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
  #[error("invalid JSON body: {0}")]
  Json(#[from] serde_json::Error),

  #[error("expected a JSON object for {kind}, found {found}")]
  NotAnObject { kind: String, found: &'static str },

  #[error("field '{path}': expected {expected}, found {found}")]
  TypeMismatch {
    path: String,
    expected: &'static str,
    found: String,
  },

  #[error("resource kind '{actual}' does not match schema '{expected}'")]
  KindMismatch { expected: String, actual: String },
}

/// Which fields an encoding includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
  /// Request body: no output-only or parameter fields, wire templates applied.
  Request,
  /// Every present field, as stored or displayed.
  Full,
}

/// Serialize a resource as a request body.
pub fn to_wire(schema: &ResourceSchema, resource: &Resource) -> Result<Vec<u8>, CodecError> {
  let json = to_json(schema, resource, Encoding::Request)?;
  Ok(serde_json::to_vec(&json)?)
}

/// Deserialize a response body. An empty body decodes to an empty resource.
pub fn from_wire(schema: &ResourceSchema, bytes: &[u8]) -> Result<Resource, CodecError> {
  if bytes.iter().all(u8::is_ascii_whitespace) {
    return Ok(Resource::new(&schema.kind));
  }
  let json: Json = serde_json::from_slice(bytes)?;
  from_json(schema, &json)
}

pub fn to_json(schema: &ResourceSchema, resource: &Resource, encoding: Encoding) -> Result<Json, CodecError> {
  if resource.kind() != schema.kind {
    return Err(CodecError::KindMismatch {
      expected: schema.kind.clone(),
      actual: resource.kind().to_string(),
    });
  }
  let params = resource.url_params(schema);
  let mut map = Map::new();
  for field in &schema.fields {
    if encoding == Encoding::Request && (field.output_only || field.parameter) {
      continue;
    }
    let value = resource.get(&field.name);
    let encoded = match (&field.wire_template, value.as_str(), encoding) {
      (Some(template), Some(raw), Encoding::Request) => {
        Some(Json::String(apply_wire_template(template, &field.name, raw, &params)))
      }
      _ => encode_field(&field.ty, value, encoding),
    };
    if let Some(json) = encoded {
      map.insert(field.name.clone(), json);
    }
  }
  Ok(Json::Object(map))
}

pub fn from_json(schema: &ResourceSchema, json: &Json) -> Result<Resource, CodecError> {
  let map = json.as_object().ok_or_else(|| CodecError::NotAnObject {
    kind: schema.kind.clone(),
    found: json_type(json),
  })?;
  let fields = decode_object(&schema.fields, map, "")?;
  Ok(Resource::from_fields(&schema.kind, fields))
}

/// Decode one JSON value into a field of the given type.
pub fn decode_field(ty: &FieldType, json: &Json, path: &str) -> Result<Field, CodecError> {
  let mismatch = || CodecError::TypeMismatch {
    path: path.to_string(),
    expected: ty.name(),
    found: json_type(json).to_string(),
  };

  if json.is_null() {
    return Ok(Field::Unset);
  }

  match ty {
    FieldType::String | FieldType::Reference | FieldType::Enum => match json {
      Json::String(s) => Ok(Field::string(s.clone())),
      _ => Err(mismatch()),
    },
    FieldType::Bool => match json {
      Json::Bool(b) => Ok(Field::bool(*b)),
      _ => Err(mismatch()),
    },
    FieldType::Int => match json {
      Json::Number(n) => n.as_i64().map(Field::int).ok_or_else(mismatch),
      Json::String(s) if s.is_empty() => Ok(Field::Empty),
      Json::String(s) => s.trim().parse::<i64>().map(Field::int).map_err(|_| mismatch()),
      _ => Err(mismatch()),
    },
    FieldType::Float => match json {
      Json::Number(n) => n.as_f64().map(|f| Field::Set(Value::Float(f))).ok_or_else(mismatch),
      Json::String(s) if s.is_empty() => Ok(Field::Empty),
      Json::String(s) => s
        .trim()
        .parse::<f64>()
        .map(|f| Field::Set(Value::Float(f)))
        .map_err(|_| mismatch()),
      _ => Err(mismatch()),
    },
    FieldType::StringList { .. } => {
      let items = json.as_array().ok_or_else(mismatch)?;
      let values = items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
          Json::String(s) => Ok(Value::String(s.clone())),
          other => Err(CodecError::TypeMismatch {
            path: format!("{}[{}]", path, i),
            expected: "string",
            found: json_type(other).to_string(),
          }),
        })
        .collect::<Result<Vec<_>, _>>()?;
      Ok(Field::list(values))
    }
    FieldType::Object { fields } => {
      let map = json.as_object().ok_or_else(mismatch)?;
      Ok(Field::object(decode_object(fields, map, path)?))
    }
    FieldType::ObjectList { fields, .. } => {
      let items = json.as_array().ok_or_else(mismatch)?;
      let values = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
          let item_path = format!("{}[{}]", path, i);
          let map = item.as_object().ok_or_else(|| CodecError::TypeMismatch {
            path: item_path.clone(),
            expected: "object",
            found: json_type(item).to_string(),
          })?;
          Ok(Value::Object(decode_object(fields, map, &item_path)?))
        })
        .collect::<Result<Vec<_>, CodecError>>()?;
      Ok(Field::list(values))
    }
  }
}

fn decode_object(fields: &[FieldSchema], map: &Map<String, Json>, prefix: &str) -> Result<Object, CodecError> {
  let mut obj = Object::new();
  for field in fields {
    let Some(json) = map.get(&field.name) else {
      continue;
    };
    let path = if prefix.is_empty() {
      field.name.clone()
    } else {
      format!("{}.{}", prefix, field.name)
    };
    obj.set(field.name.clone(), decode_field(&field.ty, json, &path)?);
  }
  Ok(obj)
}

/// Encode one field; `None` means the field is left out of the body.
pub fn encode_field(ty: &FieldType, field: &Field, encoding: Encoding) -> Option<Json> {
  match field {
    Field::Unset => None,
    Field::Empty => empty_json(ty),
    Field::Set(value) => Some(encode_value(ty, value, encoding)),
  }
}

fn empty_json(ty: &FieldType) -> Option<Json> {
  match ty {
    FieldType::String | FieldType::Reference | FieldType::Enum => Some(Json::String(String::new())),
    FieldType::StringList { .. } | FieldType::ObjectList { .. } => Some(Json::Array(Vec::new())),
    FieldType::Object { .. } => Some(Json::Object(Map::new())),
    FieldType::Bool | FieldType::Int | FieldType::Float => None,
  }
}

fn encode_value(ty: &FieldType, value: &Value, encoding: Encoding) -> Json {
  match (ty, value) {
    (FieldType::Object { fields }, Value::Object(obj)) => encode_object(fields, obj, encoding),
    (FieldType::ObjectList { fields, .. }, Value::List(items)) => Json::Array(
      items
        .iter()
        .map(|item| match item {
          Value::Object(obj) => encode_object(fields, obj, encoding),
          other => other.to_json(),
        })
        .collect(),
    ),
    _ => value.to_json(),
  }
}

fn encode_object(fields: &[FieldSchema], obj: &Object, encoding: Encoding) -> Json {
  let mut map = Map::new();
  for field in fields {
    if encoding == Encoding::Request && field.output_only {
      continue;
    }
    if let Some(json) = encode_field(&field.ty, obj.get(&field.name), encoding) {
      map.insert(field.name.clone(), json);
    }
  }
  Json::Object(map)
}

/// Expand a wire template using the field's own short name plus the
/// resource's URL parameters. Values that already look like full names
/// are sent unchanged.
fn apply_wire_template(template: &str, name: &str, raw: &str, params: &BTreeMap<String, String>) -> String {
  if raw.contains('/') {
    return raw.to_string();
  }
  let mut params = params.clone();
  params.insert(name.to_string(), self_link_to_name(raw).to_string());
  expand_template(template, &params).unwrap_or_else(|_| raw.to_string())
}

fn json_type(json: &Json) -> &'static str {
  match json {
    Json::Null => "null",
    Json::Bool(_) => "bool",
    Json::Number(_) => "number",
    Json::String(_) => "string",
    Json::Array(_) => "array",
    Json::Object(_) => "object",
  }
}
