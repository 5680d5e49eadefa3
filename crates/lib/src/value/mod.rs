//! Dynamic field values with three-state presence.
//!
//! Every resource field is a [`Field`]: `Unset` (absent, or "don't care" in a
//! desired state), `Empty` (present on the wire as `{}`, `[]` or `""`) or
//! `Set` with a [`Value`]. Keeping `Empty` distinct from `Unset` lets the
//! differ tell "clear this field" apart from "leave this field alone".

use std::collections::BTreeMap;
use std::fmt;

static UNSET: Field = Field::Unset;

/// A concrete value carried by a set field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Bool(bool),
  Int(i64),
  Float(f64),
  String(String),
  List(Vec<Value>),
  Object(Object),
}

impl Value {
  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_object(&self) -> Option<&Object> {
    match self {
      Value::Object(o) => Some(o),
      _ => None,
    }
  }

  pub fn as_list(&self) -> Option<&[Value]> {
    match self {
      Value::List(items) => Some(items),
      _ => None,
    }
  }

  /// Returns true for the zero value of a scalar type (`false`, `0`, `0.0`, `""`).
  pub fn is_zero_scalar(&self) -> bool {
    match self {
      Value::Bool(b) => !b,
      Value::Int(i) => *i == 0,
      Value::Float(f) => *f == 0.0,
      Value::String(s) => s.is_empty(),
      Value::List(_) | Value::Object(_) => false,
    }
  }

  /// Short type name used in error messages.
  pub fn type_name(&self) -> &'static str {
    match self {
      Value::Bool(_) => "bool",
      Value::Int(_) => "int",
      Value::Float(_) => "float",
      Value::String(_) => "string",
      Value::List(_) => "list",
      Value::Object(_) => "object",
    }
  }

  /// Schema-less JSON rendering, used for display and diff messages.
  pub fn to_json(&self) -> serde_json::Value {
    match self {
      Value::Bool(b) => serde_json::Value::Bool(*b),
      Value::Int(i) => serde_json::Value::from(*i),
      Value::Float(f) => serde_json::Number::from_f64(*f)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null),
      Value::String(s) => serde_json::Value::String(s.clone()),
      Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
      Value::Object(obj) => obj.to_json(),
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.to_json())
  }
}

/// Presence-aware field slot.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Field {
  #[default]
  Unset,
  Empty,
  Set(Value),
}

impl Field {
  /// A string field; the empty string becomes `Empty`.
  pub fn string(s: impl Into<String>) -> Self {
    let s = s.into();
    if s.is_empty() {
      Field::Empty
    } else {
      Field::Set(Value::String(s))
    }
  }

  pub fn bool(b: bool) -> Self {
    Field::Set(Value::Bool(b))
  }

  pub fn int(i: i64) -> Self {
    Field::Set(Value::Int(i))
  }

  /// An object field; an object without any present fields becomes `Empty`.
  pub fn object(obj: Object) -> Self {
    if obj.is_empty() {
      Field::Empty
    } else {
      Field::Set(Value::Object(obj))
    }
  }

  /// A list field; an empty list becomes `Empty`.
  pub fn list(items: Vec<Value>) -> Self {
    if items.is_empty() {
      Field::Empty
    } else {
      Field::Set(Value::List(items))
    }
  }

  pub fn is_unset(&self) -> bool {
    matches!(self, Field::Unset)
  }

  pub fn is_empty(&self) -> bool {
    matches!(self, Field::Empty)
  }

  /// Unset or Empty: the field carries no value.
  pub fn is_blank(&self) -> bool {
    !matches!(self, Field::Set(_))
  }

  pub fn value(&self) -> Option<&Value> {
    match self {
      Field::Set(v) => Some(v),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    self.value().and_then(Value::as_str)
  }

  pub fn as_object(&self) -> Option<&Object> {
    self.value().and_then(Value::as_object)
  }

  pub fn as_list(&self) -> Option<&[Value]> {
    self.value().and_then(Value::as_list)
  }
}

impl fmt::Display for Field {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Field::Unset => write!(f, "<unset>"),
      Field::Empty => write!(f, "<empty>"),
      Field::Set(v) => write!(f, "{}", v),
    }
  }
}

impl From<Value> for Field {
  fn from(value: Value) -> Self {
    Field::Set(value)
  }
}

/// Ordered map of wire field name to [`Field`].
///
/// Unset fields are never stored, so two objects with the same present
/// fields compare equal regardless of how they were built.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Object {
  fields: BTreeMap<String, Field>,
}

impl Object {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns the field, or `Unset` when absent.
  pub fn get(&self, name: &str) -> &Field {
    self.fields.get(name).unwrap_or(&UNSET)
  }

  pub fn set(&mut self, name: impl Into<String>, field: Field) {
    let name = name.into();
    if field.is_unset() {
      self.fields.remove(&name);
    } else {
      self.fields.insert(name, field);
    }
  }

  /// Builder form of [`Object::set`].
  pub fn with(mut self, name: impl Into<String>, field: Field) -> Self {
    self.set(name, field);
    self
  }

  pub fn remove(&mut self, name: &str) -> Field {
    self.fields.remove(name).unwrap_or_default()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
    self.fields.iter().map(|(k, v)| (k.as_str(), v))
  }

  /// True when no field is present (Unset fields are not stored).
  pub fn is_empty(&self) -> bool {
    self.fields.is_empty()
  }

  pub fn len(&self) -> usize {
    self.fields.len()
  }

  pub fn to_json(&self) -> serde_json::Value {
    let map = self
      .fields
      .iter()
      .map(|(k, v)| {
        let json = match v {
          Field::Set(value) => value.to_json(),
          _ => serde_json::Value::Null,
        };
        (k.clone(), json)
      })
      .collect();
    serde_json::Value::Object(map)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn constructors_collapse_empty_values() {
    assert_eq!(Field::string(""), Field::Empty);
    assert_eq!(Field::list(vec![]), Field::Empty);
    assert_eq!(Field::object(Object::new()), Field::Empty);
    assert_eq!(Field::string("a"), Field::Set(Value::String("a".into())));
  }

  #[test]
  fn setting_unset_removes_field() {
    let mut obj = Object::new().with("a", Field::string("x"));
    assert_eq!(obj.len(), 1);
    obj.set("a", Field::Unset);
    assert!(obj.is_empty());
    assert!(obj.get("a").is_unset());
  }

  #[test]
  fn empty_field_is_present() {
    let obj = Object::new().with("a", Field::Empty);
    assert!(!obj.is_empty());
    assert!(obj.get("a").is_empty());
    assert!(obj.get("a").is_blank());
  }

  #[test]
  fn zero_scalars() {
    assert!(Value::Bool(false).is_zero_scalar());
    assert!(Value::Int(0).is_zero_scalar());
    assert!(!Value::String("x".into()).is_zero_scalar());
    assert!(!Value::List(vec![]).is_zero_scalar());
  }

  #[test]
  fn display_renders_json() {
    let obj = Object::new()
      .with("name", Field::string("r1"))
      .with("count", Field::int(2));
    assert_eq!(Value::Object(obj).to_string(), r#"{"count":2,"name":"r1"}"#);
    assert_eq!(Field::Unset.to_string(), "<unset>");
  }
}
