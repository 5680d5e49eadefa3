//! Lifecycle gating and convergence plans.

use std::fmt;

use serde::Serialize;

use super::types::{ApplyError, Lifecycle};
use crate::diff::FieldDiff;
use crate::schema::{OperationClass, ResourceSchema};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", content = "name", rename_all = "snake_case")]
pub enum PlannedOperation {
  Create,
  Update(String),
}

impl fmt::Display for PlannedOperation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PlannedOperation::Create => write!(f, "create"),
      PlannedOperation::Update(name) => write!(f, "{}", name),
    }
  }
}

/// Ordered operations that converge a resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ConvergencePlan {
  operations: Vec<PlannedOperation>,
}

impl ConvergencePlan {
  pub fn operations(&self) -> &[PlannedOperation] {
    &self.operations
  }

  pub fn is_empty(&self) -> bool {
    self.operations.is_empty()
  }

  pub fn creates(&self) -> bool {
    self.operations.contains(&PlannedOperation::Create)
  }
}

impl fmt::Display for ConvergencePlan {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let names: Vec<String> = self.operations.iter().map(|op| op.to_string()).collect();
    write!(f, "[{}]", names.join(", "))
  }
}

/// Check the lifecycle gates and build the plan.
///
/// An absent resource plans a single create. A present one plans one update
/// per distinct operation name, in order of first appearance in the diffs.
pub fn plan_operations(
  schema: &ResourceSchema,
  exists: bool,
  diffs: &[FieldDiff],
  lifecycle: &Lifecycle,
) -> Result<ConvergencePlan, ApplyError> {
  if !exists {
    if lifecycle.block_creation {
      return Err(ApplyError::Infeasible {
        message: format!("creation blocked by lifecycle params: {}", lifecycle),
        diffs: Vec::new(),
      });
    }
    return Ok(ConvergencePlan {
      operations: vec![PlannedOperation::Create],
    });
  }

  if lifecycle.block_acquire {
    return Err(ApplyError::Infeasible {
      message: format!("resource already exists, acquisition blocked by lifecycle params: {}", lifecycle),
      diffs: diffs.to_vec(),
    });
  }

  let mut operations = Vec::new();
  for diff in diffs.iter().filter(|d| !d.is_trivial()) {
    match &diff.operation {
      OperationClass::RequiresRecreate => {
        return Err(ApplyError::Infeasible {
          message: format!("infeasible update: ({}) would require recreation", diff),
          diffs: vec![diff.clone()],
        });
      }
      _ if lifecycle.block_modification => {
        return Err(ApplyError::Infeasible {
          message: format!("modification blocked, diff ({}) unresolvable", diff),
          diffs: vec![diff.clone()],
        });
      }
      OperationClass::Update(name) => {
        if schema.update_operation(name).is_none() {
          return Err(ApplyError::UnknownOperation(name.clone()));
        }
        let op = PlannedOperation::Update(name.clone());
        if !operations.contains(&op) {
          operations.push(op);
        }
      }
      OperationClass::NoOp => {}
    }
  }
  Ok(ConvergencePlan { operations })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::diff::FieldPath;
  use crate::schema::SchemaRegistry;

  fn schema() -> ResourceSchema {
    SchemaRegistry::builtin().unwrap().get("iam.Role").unwrap().clone()
  }

  fn field_diff(field: &str, operation: OperationClass) -> FieldDiff {
    FieldDiff {
      path: FieldPath::root().field(field),
      operation,
      message: "changed".into(),
    }
  }

  #[test]
  fn absent_resource_plans_create() {
    let plan = plan_operations(&schema(), false, &[], &Lifecycle::default()).unwrap();
    assert_eq!(plan.operations(), &[PlannedOperation::Create]);
    assert!(plan.creates());
  }

  #[test]
  fn block_creation_rejects_absent_resource() {
    let lifecycle = Lifecycle {
      block_creation: true,
      ..Lifecycle::default()
    };
    let err = plan_operations(&schema(), false, &[], &lifecycle).unwrap_err();
    assert!(matches!(err, ApplyError::Infeasible { ref message, .. } if message.contains("BlockCreation")));
  }

  #[test]
  fn block_acquire_rejects_existing_resource() {
    let lifecycle = Lifecycle {
      block_acquire: true,
      ..Lifecycle::default()
    };
    let err = plan_operations(&schema(), true, &[], &lifecycle).unwrap_err();
    assert!(matches!(err, ApplyError::Infeasible { .. }));
  }

  #[test]
  fn recreate_diff_is_infeasible() {
    let diffs = [field_diff("name", OperationClass::RequiresRecreate)];
    let err = plan_operations(&schema(), true, &diffs, &Lifecycle::default()).unwrap_err();
    match err {
      ApplyError::Infeasible { message, diffs } => {
        assert!(message.contains("would require recreation"));
        assert_eq!(diffs.len(), 1);
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn block_modification_rejects_updates() {
    let lifecycle = Lifecycle {
      block_modification: true,
      ..Lifecycle::default()
    };
    let diffs = [field_diff("display_name", OperationClass::Update("replaceRole".into()))];
    let err = plan_operations(&schema(), true, &diffs, &lifecycle).unwrap_err();
    assert!(matches!(err, ApplyError::Infeasible { ref message, .. } if message.contains("modification blocked")));
  }

  #[test]
  fn block_modification_ignores_trivial_diffs() {
    let lifecycle = Lifecycle {
      block_modification: true,
      ..Lifecycle::default()
    };
    let diffs = [field_diff("display_name", OperationClass::NoOp)];
    let plan = plan_operations(&schema(), true, &diffs, &lifecycle).unwrap();
    assert!(plan.is_empty());
  }

  #[test]
  fn update_names_are_deduplicated_in_order() {
    let mut schema = schema();
    schema.update_operations.push(crate::schema::UpdateOperation {
      name: "setActions".into(),
      ..schema.update_operations[0].clone()
    });
    let diffs = [
      field_diff("actions", OperationClass::Update("setActions".into())),
      field_diff("display_name", OperationClass::Update("replaceRole".into())),
      field_diff("description", OperationClass::Update("setActions".into())),
    ];
    let plan = plan_operations(&schema, true, &diffs, &Lifecycle::default()).unwrap();
    assert_eq!(
      plan.operations(),
      &[
        PlannedOperation::Update("setActions".into()),
        PlannedOperation::Update("replaceRole".into())
      ]
    );
    assert_eq!(plan.to_string(), "[setActions, replaceRole]");
  }

  #[test]
  fn undeclared_operation_is_rejected() {
    let diffs = [field_diff("display_name", OperationClass::Update("nope".into()))];
    let err = plan_operations(&schema(), true, &diffs, &Lifecycle::default()).unwrap_err();
    assert!(matches!(err, ApplyError::UnknownOperation(name) if name == "nope"));
  }
}
