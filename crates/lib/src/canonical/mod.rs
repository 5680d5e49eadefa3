//! Canonicalization of initial, desired and new states.
//!
//! Canonical desired state keeps the observed value wherever the caller did
//! not care (unset) or wrote something equivalent (a short name for a
//! self-link, a different enum case, surrounding whitespace). Canonical new
//! state keeps the caller's spelling wherever the server returned an
//! equivalent value. Both passes are idempotent.

use crate::codec::{self, CodecError};
use crate::diff;
use crate::resource::Resource;
use crate::schema::{Collection, FieldSchema, FieldType, ResourceSchema};
use crate::value::{Field, Object, Value};

/// Initial state needs no rewriting beyond defaults for fields the server omitted.
pub fn canonicalize_initial(schema: &ResourceSchema, raw_initial: Resource) -> Result<Resource, CodecError> {
  let kind = raw_initial.kind().to_string();
  let fields = apply_defaults(&schema.fields, raw_initial.into_fields())?;
  Ok(Resource::from_fields(kind, fields))
}

/// Canonicalize the desired state against the initial state, if one exists.
pub fn canonicalize_desired(
  schema: &ResourceSchema,
  raw_desired: &Resource,
  initial: Option<&Resource>,
) -> Result<Resource, CodecError> {
  let fields = match initial {
    None => apply_defaults(&schema.fields, strip_output_only(&schema.fields, raw_desired.fields()))?,
    Some(initial) => desired_object(&schema.fields, raw_desired.fields(), initial.fields())?,
  };
  Ok(Resource::from_fields(raw_desired.kind(), fields))
}

/// Canonicalize a freshly observed state against the raw desired state.
pub fn canonicalize_new(schema: &ResourceSchema, raw_new: Resource, raw_desired: &Resource) -> Resource {
  let kind = raw_new.kind().to_string();
  let fields = new_object(&schema.fields, raw_new.into_fields(), raw_desired.fields());
  Resource::from_fields(kind, fields)
}

fn strip_output_only(fields: &[FieldSchema], obj: &Object) -> Object {
  let mut out = Object::new();
  for field in fields {
    if field.output_only {
      continue;
    }
    out.set(field.name.clone(), strip_nested_output_only(field, obj.get(&field.name)));
  }
  out
}

fn strip_nested_output_only(field: &FieldSchema, value: &Field) -> Field {
  match (value, field.ty.nested_fields()) {
    (Field::Set(value), Some(nested)) => Field::Set(map_objects(value, &|o| strip_output_only(nested, o))),
    (other, _) => other.clone(),
  }
}

fn map_objects(value: &Value, f: &dyn Fn(&Object) -> Object) -> Value {
  match value {
    Value::Object(obj) => Value::Object(f(obj)),
    Value::List(items) => Value::List(items.iter().map(|item| map_objects(item, f)).collect()),
    other => other.clone(),
  }
}

/// Fill unset fields that declare a default, recursing into nested objects.
fn apply_defaults(fields: &[FieldSchema], mut obj: Object) -> Result<Object, CodecError> {
  for field in fields {
    let current = obj.remove(&field.name);
    let updated = match current {
      Field::Unset => match &field.default {
        Some(default) => codec::decode_field(&field.ty, default, &field.name)?,
        None => Field::Unset,
      },
      Field::Set(value) => match field.ty.nested_fields() {
        Some(nested) => Field::Set(defaults_in_value(nested, value)?),
        None => Field::Set(value),
      },
      Field::Empty => Field::Empty,
    };
    obj.set(field.name.clone(), updated);
  }
  Ok(obj)
}

fn defaults_in_value(fields: &[FieldSchema], value: Value) -> Result<Value, CodecError> {
  match value {
    Value::Object(obj) => Ok(Value::Object(apply_defaults(fields, obj)?)),
    Value::List(items) => items
      .into_iter()
      .map(|item| defaults_in_value(fields, item))
      .collect::<Result<Vec<_>, _>>()
      .map(Value::List),
    other => Ok(other),
  }
}

fn desired_object(fields: &[FieldSchema], des: &Object, init: &Object) -> Result<Object, CodecError> {
  let mut out = Object::new();
  for field in fields {
    if field.output_only {
      continue;
    }
    let d = des.get(&field.name);
    let i = init.get(&field.name);
    out.set(field.name.clone(), desired_field(field, d, i)?);
  }
  Ok(out)
}

fn desired_field(field: &FieldSchema, des: &Field, init: &Field) -> Result<Field, CodecError> {
  match (des, init) {
    (Field::Unset, _) => Ok(strip_nested_output_only(field, init)),
    (Field::Empty, _) if init.is_blank() => Ok(init.clone()),
    (Field::Empty, _) => Ok(Field::Empty),
    (Field::Set(_), Field::Unset | Field::Empty) => single_desired(field, des),
    (Field::Set(dv), Field::Set(iv)) => match &field.ty {
      FieldType::Object { fields } => match (dv, iv) {
        (Value::Object(d), Value::Object(i)) => Ok(Field::Set(Value::Object(desired_object(fields, d, i)?))),
        _ => Ok(des.clone()),
      },
      FieldType::ObjectList { fields, .. } => match (dv, iv) {
        (Value::List(d), Value::List(i)) if d.len() == i.len() => {
          let items = d
            .iter()
            .zip(i)
            .map(|(d, i)| match (d, i) {
              (Value::Object(d), Value::Object(i)) => desired_object(fields, d, i).map(Value::Object),
              (d, _) => Ok(d.clone()),
            })
            .collect::<Result<Vec<_>, _>>()?;
          Ok(Field::Set(Value::List(items)))
        }
        _ => single_desired(field, des),
      },
      ty => {
        if diff::values_equivalent(ty, dv, iv) {
          Ok(init.clone())
        } else {
          Ok(des.clone())
        }
      }
    },
  }
}

/// Canonicalize a desired field that has no counterpart in initial state.
fn single_desired(field: &FieldSchema, des: &Field) -> Result<Field, CodecError> {
  let Some(nested) = field.ty.nested_fields() else {
    return Ok(des.clone());
  };
  match strip_nested_output_only(field, des) {
    Field::Set(value) => Ok(Field::Set(defaults_in_value(nested, value)?)),
    other => Ok(other),
  }
}

fn new_object(fields: &[FieldSchema], mut new: Object, des: &Object) -> Object {
  for field in fields {
    let n = new.remove(&field.name);
    let d = des.get(&field.name);
    let canonical = if field.parameter && !d.is_blank() {
      d.clone()
    } else {
      new_field(field, n, d)
    };
    new.set(field.name.clone(), canonical);
  }
  new
}

fn new_field(field: &FieldSchema, new: Field, des: &Field) -> Field {
  if new.is_blank() {
    return if des.is_empty() { Field::Empty } else { new };
  }
  let (Field::Set(nv), Field::Set(dv)) = (&new, des) else {
    return new;
  };
  match &field.ty {
    FieldType::Object { fields } => match (nv, dv) {
      (Value::Object(n), Value::Object(d)) => Field::Set(Value::Object(new_object(fields, n.clone(), d))),
      _ => new,
    },
    FieldType::ObjectList { fields, collection } => match (nv, dv) {
      (Value::List(n), Value::List(d)) => match collection {
        Collection::Ordered if n.len() == d.len() => Field::Set(Value::List(
          n.iter()
            .zip(d)
            .map(|(n, d)| match (n, d) {
              (Value::Object(n), Value::Object(d)) => Value::Object(new_object(fields, n.clone(), d)),
              (n, _) => n.clone(),
            })
            .collect(),
        )),
        Collection::Ordered => new,
        Collection::Set => Field::Set(Value::List(reorder_set(fields, n, d))),
      },
      _ => new,
    },
    ty => {
      if diff::values_equivalent(ty, nv, dv) {
        des.clone()
      } else {
        new
      }
    }
  }
}

/// Reorder observed set elements to follow the desired order. Each desired
/// element claims the first equivalent unclaimed observed element; claimed
/// elements come first, the rest keep their observed order.
fn reorder_set(fields: &[FieldSchema], new: &[Value], des: &[Value]) -> Vec<Value> {
  let mut claimed = vec![false; new.len()];
  let mut out = Vec::with_capacity(new.len());
  for d in des {
    let found = new
      .iter()
      .enumerate()
      .find(|(idx, n)| !claimed[*idx] && diff::elements_match(fields, d, n));
    if let Some((idx, n)) = found {
      claimed[idx] = true;
      out.push(match (n, d) {
        (Value::Object(n), Value::Object(d)) => Value::Object(new_object(fields, n.clone(), d)),
        (n, _) => n.clone(),
      });
    }
  }
  out.extend(
    new
      .iter()
      .zip(&claimed)
      .filter(|(_, taken)| !**taken)
      .map(|(n, _)| n.clone()),
  );
  out
}
