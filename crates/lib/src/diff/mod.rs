//! Field-level diffing of canonical desired state against observed state.
//!
//! Each difference carries the operation class its schema field declares,
//! inherited from the nearest ancestor when the field declares none.

use std::fmt;

use serde::Serialize;

use crate::resource::Resource;
use crate::schema::{Collection, FieldSchema, FieldType, OperationClass, ResourceSchema};
use crate::value::{Field, Object, Value};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DiffError {
  #[error("cannot diff {side} resource of kind '{actual}' with schema '{expected}'")]
  KindMismatch {
    side: &'static str,
    expected: String,
    actual: String,
  },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
  Field(String),
  Index(usize),
}

/// Location of a field, rendered as `source.files[0].content`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldPath(Vec<Segment>);

impl FieldPath {
  pub fn root() -> Self {
    Self::default()
  }

  pub fn field(&self, name: &str) -> Self {
    let mut segments = self.0.clone();
    segments.push(Segment::Field(name.to_string()));
    Self(segments)
  }

  pub fn index(&self, idx: usize) -> Self {
    let mut segments = self.0.clone();
    segments.push(Segment::Index(idx));
    Self(segments)
  }

  /// Name of the top-level field this path starts at.
  pub fn top_level(&self) -> Option<&str> {
    match self.0.first() {
      Some(Segment::Field(name)) => Some(name),
      _ => None,
    }
  }
}

impl fmt::Display for FieldPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, segment) in self.0.iter().enumerate() {
      match segment {
        Segment::Field(name) if i == 0 => write!(f, "{}", name)?,
        Segment::Field(name) => write!(f, ".{}", name)?,
        Segment::Index(idx) => write!(f, "[{}]", idx)?,
      }
    }
    Ok(())
  }
}

impl Serialize for FieldPath {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

/// A single difference between desired and actual state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff {
  pub path: FieldPath,
  pub operation: OperationClass,
  pub message: String,
}

impl FieldDiff {
  pub fn is_trivial(&self) -> bool {
    self.operation.is_trivial()
  }
}

impl fmt::Display for FieldDiff {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {} [{}]", self.path, self.message, self.operation)
  }
}

/// Diff canonical desired state against actual state.
pub fn diff(schema: &ResourceSchema, desired: &Resource, actual: &Resource) -> Result<Vec<FieldDiff>, DiffError> {
  for (side, resource) in [("desired", desired), ("actual", actual)] {
    if resource.kind() != schema.kind {
      return Err(DiffError::KindMismatch {
        side,
        expected: schema.kind.clone(),
        actual: resource.kind().to_string(),
      });
    }
  }
  let mut diffs = Vec::new();
  diff_object(
    &schema.fields,
    desired.fields(),
    actual.fields(),
    &FieldPath::root(),
    &OperationClass::RequiresRecreate,
    &mut diffs,
  );
  Ok(diffs)
}

/// True when a desired element and an actual element have no differences.
pub fn elements_match(fields: &[FieldSchema], desired: &Value, actual: &Value) -> bool {
  match (desired, actual) {
    (Value::Object(d), Value::Object(a)) => {
      let mut diffs = Vec::new();
      diff_object(
        fields,
        d,
        a,
        &FieldPath::root(),
        &OperationClass::RequiresRecreate,
        &mut diffs,
      );
      diffs.is_empty()
    }
    (d, a) => d == a,
  }
}

/// Type-aware scalar and string-list equivalence.
pub fn values_equivalent(ty: &FieldType, a: &Value, b: &Value) -> bool {
  match (ty, a, b) {
    (FieldType::String, Value::String(a), Value::String(b)) => a.trim() == b.trim(),
    (FieldType::Reference, Value::String(a), Value::String(b)) => references_equivalent(a, b),
    (FieldType::Enum, Value::String(a), Value::String(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
    (FieldType::Float, Value::Float(a), Value::Float(b)) => {
      (a - b).abs() <= f64::EPSILON * a.abs().max(b.abs()).max(1.0)
    }
    (FieldType::StringList { collection }, Value::List(a), Value::List(b)) => {
      if a.len() != b.len() {
        return false;
      }
      let item = FieldType::String;
      match collection {
        Collection::Ordered => a.iter().zip(b).all(|(x, y)| values_equivalent(&item, x, y)),
        Collection::Set => {
          let (missing, extra) = greedy_unmatched(a, b, |x, y| values_equivalent(&item, x, y));
          missing.is_empty() && extra.is_empty()
        }
      }
    }
    (_, a, b) => a == b,
  }
}

/// Equal, or one is a trailing path of the other (`r1` vs `projects/p/rulesets/r1`).
pub fn references_equivalent(a: &str, b: &str) -> bool {
  let (a, b) = (a.trim(), b.trim());
  a == b || b.ends_with(&format!("/{}", a)) || a.ends_with(&format!("/{}", b))
}

fn diff_object(
  fields: &[FieldSchema],
  desired: &Object,
  actual: &Object,
  path: &FieldPath,
  inherited: &OperationClass,
  out: &mut Vec<FieldDiff>,
) {
  for field in fields {
    if field.output_only {
      continue;
    }
    let operation = field.operation.as_ref().unwrap_or(inherited);
    let field_path = path.field(&field.name);
    let d = desired.get(&field.name);
    let a = actual.get(&field.name);
    diff_field(field, d, a, &field_path, operation, out);
  }
}

fn diff_field(
  field: &FieldSchema,
  desired: &Field,
  actual: &Field,
  path: &FieldPath,
  operation: &OperationClass,
  out: &mut Vec<FieldDiff>,
) {
  let message = match (desired, actual) {
    (Field::Unset, _) | (Field::Empty, Field::Unset | Field::Empty) => return,
    (Field::Set(dv), Field::Unset) if dv.is_zero_scalar() => return,
    (Field::Set(dv), Field::Set(av)) => return diff_value(&field.ty, dv, av, path, operation, out),
    (Field::Empty, Field::Set(av)) => format!("desired empty, actual {}", av),
    (Field::Set(dv), _) => format!("desired {}, actual {}", dv, actual),
  };
  out.push(FieldDiff {
    path: path.clone(),
    operation: operation.clone(),
    message,
  });
}

fn diff_value(
  ty: &FieldType,
  desired: &Value,
  actual: &Value,
  path: &FieldPath,
  operation: &OperationClass,
  out: &mut Vec<FieldDiff>,
) {
  let diff_at = |path: &FieldPath, message: String| FieldDiff {
    path: path.clone(),
    operation: operation.clone(),
    message,
  };

  match (ty, desired, actual) {
    (FieldType::Object { fields }, Value::Object(d), Value::Object(a)) => {
      diff_object(fields, d, a, path, operation, out);
    }
    (FieldType::ObjectList { fields, collection }, Value::List(d), Value::List(a)) => match collection {
      Collection::Ordered if d.len() != a.len() => out.push(diff_at(
        path,
        format!("desired {} elements, actual {}", d.len(), a.len()),
      )),
      Collection::Ordered => {
        for (i, (dv, av)) in d.iter().zip(a).enumerate() {
          match (dv, av) {
            (Value::Object(dobj), Value::Object(aobj)) => {
              diff_object(fields, dobj, aobj, &path.index(i), operation, out);
            }
            (dv, av) if dv != av => out.push(diff_at(&path.index(i), format!("desired {}, actual {}", dv, av))),
            _ => {}
          }
        }
      }
      Collection::Set => {
        let (missing, extra) = greedy_unmatched(d, a, |dv, av| elements_match(fields, dv, av));
        push_set_leftovers(path, &missing, &extra, &diff_at, out);
      }
    },
    (FieldType::StringList { collection }, Value::List(d), Value::List(a)) => {
      let item = FieldType::String;
      match collection {
        Collection::Ordered if d.len() != a.len() => out.push(diff_at(
          path,
          format!("desired {}, actual {}", desired, actual),
        )),
        Collection::Ordered => {
          for (i, (dv, av)) in d.iter().zip(a).enumerate() {
            if !values_equivalent(&item, dv, av) {
              out.push(diff_at(&path.index(i), format!("desired {}, actual {}", dv, av)));
            }
          }
        }
        Collection::Set => {
          let (missing, extra) = greedy_unmatched(d, a, |dv, av| values_equivalent(&item, dv, av));
          push_set_leftovers(path, &missing, &extra, &diff_at, out);
        }
      }
    }
    (ty, d, a) => {
      if !values_equivalent(ty, d, a) {
        out.push(diff_at(path, format!("desired {}, actual {}", d, a)));
      }
    }
  }
}

fn push_set_leftovers(
  path: &FieldPath,
  missing: &[&Value],
  extra: &[&Value],
  diff_at: &dyn Fn(&FieldPath, String) -> FieldDiff,
  out: &mut Vec<FieldDiff>,
) {
  for value in missing {
    out.push(diff_at(path, format!("desired element {} not found in actual", value)));
  }
  for value in extra {
    out.push(diff_at(path, format!("actual element {} not in desired", value)));
  }
}

/// Greedy matching: each desired element claims the first unclaimed actual
/// element it matches. Returns the unmatched desired and actual elements.
fn greedy_unmatched<'a>(
  desired: &'a [Value],
  actual: &'a [Value],
  matches: impl Fn(&Value, &Value) -> bool,
) -> (Vec<&'a Value>, Vec<&'a Value>) {
  let mut claimed = vec![false; actual.len()];
  let mut missing = Vec::new();
  for d in desired {
    let found = (0..actual.len()).find(|&idx| !claimed[idx] && matches(d, &actual[idx]));
    match found {
      Some(idx) => claimed[idx] = true,
      None => missing.push(d),
    }
  }
  let extra = actual
    .iter()
    .zip(&claimed)
    .filter(|(_, taken)| !**taken)
    .map(|(a, _)| a)
    .collect();
  (missing, extra)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::schema::SchemaRegistry;

  fn schema(kind: &str) -> ResourceSchema {
    SchemaRegistry::builtin().unwrap().get(kind).unwrap().clone()
  }

  fn file(name: &str, content: &str) -> Value {
    Value::Object(
      Object::new()
        .with("name", Field::string(name))
        .with("content", Field::string(content)),
    )
  }

  fn ruleset(files: Vec<Value>) -> Resource {
    Resource::new("firebaserules.Ruleset")
      .with("project", Field::string("p"))
      .with(
        "source",
        Field::object(Object::new().with("files", Field::list(files))),
      )
  }

  #[test]
  fn identical_resources_have_no_diff() {
    let schema = schema("firebaserules.Ruleset");
    let r = ruleset(vec![file("a.rules", "x")]);
    assert!(diff(&schema, &r, &r).unwrap().is_empty());
  }

  #[test]
  fn unset_desired_is_ignored() {
    let schema = schema("firebaserules.Ruleset");
    let desired = Resource::new("firebaserules.Ruleset");
    let actual = ruleset(vec![file("a.rules", "x")]);
    assert!(diff(&schema, &desired, &actual).unwrap().is_empty());
  }

  #[test]
  fn output_only_fields_are_never_diffed() {
    let schema = schema("firebaserules.Ruleset");
    let desired = ruleset(vec![]).with("createTime", Field::string("yesterday"));
    let actual = ruleset(vec![]).with("createTime", Field::string("today"));
    assert!(diff(&schema, &desired, &actual).unwrap().is_empty());
  }

  #[test]
  fn nested_change_reports_indexed_path() {
    let schema = schema("firebaserules.Ruleset");
    let desired = ruleset(vec![file("a.rules", "x")]);
    let actual = ruleset(vec![file("a.rules", "y")]);
    let diffs = diff(&schema, &desired, &actual).unwrap();
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].path.to_string(), "source.files[0].content");
    assert_eq!(diffs[0].operation, OperationClass::RequiresRecreate);
    assert_eq!(diffs[0].path.top_level(), Some("source"));
  }

  #[test]
  fn ordered_length_mismatch_is_one_wholesale_diff() {
    let schema = schema("firebaserules.Ruleset");
    let desired = ruleset(vec![file("a.rules", "x"), file("b.rules", "y")]);
    let actual = ruleset(vec![file("a.rules", "x")]);
    let diffs = diff(&schema, &desired, &actual).unwrap();
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].path.to_string(), "source.files");
  }

  #[test]
  fn set_collections_ignore_order() {
    let schema = schema("iam.Role");
    let strings = |items: &[&str]| Field::list(items.iter().map(|s| Value::String(s.to_string())).collect());
    let desired = Resource::new("iam.Role").with("actions", strings(&["a", "b"]));
    let actual = Resource::new("iam.Role").with("actions", strings(&["b", "a"]));
    assert!(diff(&schema, &desired, &actual).unwrap().is_empty());

    let actual = Resource::new("iam.Role").with("actions", strings(&["b", "c"]));
    let diffs = diff(&schema, &desired, &actual).unwrap();
    assert_eq!(diffs.len(), 2);
    assert!(diffs[0].message.contains("\"a\""));
    assert!(diffs[1].message.contains("\"c\""));
    assert_eq!(diffs[0].operation, OperationClass::Update("replaceRole".into()));
  }

  #[test]
  fn object_sets_use_greedy_matching() {
    let schema = schema("iam.Policy");
    let role = |id: &str| Value::Object(Object::new().with("role_id", Field::string(id)));
    let desired = Resource::new("iam.Policy").with("roles", Field::list(vec![role("viewer"), role("editor")]));
    let actual = Resource::new("iam.Policy").with("roles", Field::list(vec![role("editor"), role("viewer")]));
    assert!(diff(&schema, &desired, &actual).unwrap().is_empty());

    let actual = Resource::new("iam.Policy").with("roles", Field::list(vec![role("editor")]));
    let diffs = diff(&schema, &desired, &actual).unwrap();
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].path.to_string(), "roles");
  }

  #[test]
  fn empty_versus_unset_is_no_diff() {
    let schema = schema("iam.Role");
    let desired = Resource::new("iam.Role").with("description", Field::Empty);
    let actual = Resource::new("iam.Role");
    assert!(diff(&schema, &desired, &actual).unwrap().is_empty());

    let actual = Resource::new("iam.Role").with("description", Field::string("old"));
    assert_eq!(diff(&schema, &desired, &actual).unwrap().len(), 1);
  }

  #[test]
  fn set_versus_unset_is_a_diff() {
    let schema = schema("iam.Role");
    let desired = Resource::new("iam.Role").with("display_name", Field::string("Reader"));
    let actual = Resource::new("iam.Role");
    let diffs = diff(&schema, &desired, &actual).unwrap();
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].to_string(), "display_name: desired \"Reader\", actual <unset> [replaceRole]");
  }

  #[test]
  fn zero_scalar_matches_omitted_field() {
    let mut schema = schema("iam.Role");
    schema.fields.push(crate::schema::FieldSchema {
      name: "enabled".into(),
      ty: FieldType::Bool,
      required: false,
      output_only: false,
      parameter: false,
      identity: false,
      server_generated: false,
      operation: None,
      wire_template: None,
      default: None,
    });
    let desired = Resource::new("iam.Role").with("enabled", Field::bool(false));
    assert!(diff(&schema, &desired, &Resource::new("iam.Role")).unwrap().is_empty());
  }

  #[test]
  fn equivalent_scalars_do_not_diff() {
    assert!(values_equivalent(
      &FieldType::Reference,
      &Value::String("rs1".into()),
      &Value::String("projects/p/rulesets/rs1".into())
    ));
    assert!(!values_equivalent(
      &FieldType::Reference,
      &Value::String("rs1".into()),
      &Value::String("projects/p/rulesets/xrs1".into())
    ));
    assert!(values_equivalent(
      &FieldType::Enum,
      &Value::String("ACCESS".into()),
      &Value::String("access".into())
    ));
    assert!(values_equivalent(
      &FieldType::String,
      &Value::String(" x ".into()),
      &Value::String("x".into())
    ));
  }

  #[test]
  fn kind_mismatch_is_an_error() {
    let schema = schema("iam.Role");
    let err = diff(&schema, &Resource::new("iam.Policy"), &Resource::new("iam.Role")).unwrap_err();
    assert!(matches!(err, DiffError::KindMismatch { side: "desired", .. }));
  }
}
