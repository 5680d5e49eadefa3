//! Types for planning and applying a desired state.
//!
//! This module defines the apply options, the outcomes returned to callers
//! and the phase-tagged error type.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use super::plan::ConvergencePlan;
use crate::client::ClientError;
use crate::codec::CodecError;
use crate::diff::{DiffError, FieldDiff};
use crate::resource::{Resource, ValidationError};

/// Gates that forbid classes of mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Lifecycle {
  /// Fail instead of creating a missing resource.
  pub block_creation: bool,
  /// Fail if the resource already exists.
  pub block_acquire: bool,
  /// Fail instead of updating an existing resource.
  pub block_modification: bool,
}

impl Lifecycle {
  pub fn is_empty(&self) -> bool {
    !(self.block_creation || self.block_acquire || self.block_modification)
  }
}

impl std::fmt::Display for Lifecycle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let mut names = Vec::new();
    if self.block_creation {
      names.push("BlockCreation");
    }
    if self.block_acquire {
      names.push("BlockAcquire");
    }
    if self.block_modification {
      names.push("BlockModification");
    }
    write!(f, "[{}]", names.join(", "))
  }
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
  pub lifecycle: Lifecycle,
  /// A previously observed state, used to locate the resource when the
  /// desired state lacks server-generated identity.
  pub state_hint: Option<Resource>,
}

/// Result of a successful apply.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
  /// Canonical observed state after convergence.
  pub state: Resource,
  /// Operations that were executed.
  pub plan: ConvergencePlan,
  /// Differences found during discovery.
  pub diffs: Vec<FieldDiff>,
  /// Attempts made, counting conflict restarts.
  pub attempts: u32,
}

/// Result of a plan-only run.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
  /// Canonical observed state, when the resource exists.
  pub initial: Option<Resource>,
  pub desired: Resource,
  pub diffs: Vec<FieldDiff>,
  pub plan: ConvergencePlan,
}

/// Errors that can occur while applying a desired state.
#[derive(Debug, Error)]
pub enum ApplyError {
  #[error("invalid desired state: {0}")]
  Validation(#[from] ValidationError),

  #[error("failed to discover current state: {0}")]
  Discover(#[source] ClientError),

  #[error("failed to canonicalize state: {0}")]
  Canonicalize(#[from] CodecError),

  #[error("failed to create a diff: {0}")]
  Diff(#[from] DiffError),

  /// The gates or the diff make convergence impossible without a forbidden mutation.
  #[error("apply infeasible: {message}")]
  Infeasible { message: String, diffs: Vec<FieldDiff> },

  #[error("no update operation named '{0}' in schema")]
  UnknownOperation(String),

  #[error("operation {operation} failed: {source}")]
  Actuate {
    operation: String,
    #[source]
    source: ClientError,
  },

  #[error("failed to read back state after apply: {0}")]
  Verify(#[source] ClientError),

  /// The calls succeeded but the observed state still differs.
  #[error("diffs remain after apply: {}", format_diffs(.diffs))]
  DiffAfterApply { diffs: Vec<FieldDiff>, state: Box<Resource> },

  #[error("apply did not finish within {0:?}")]
  Timeout(Duration),
}

impl ApplyError {
  /// A conflict at any phase. The whole apply may be retried.
  pub fn is_conflict(&self) -> bool {
    match self {
      ApplyError::Discover(e) | ApplyError::Verify(e) | ApplyError::Actuate { source: e, .. } => e.is_conflict(),
      _ => false,
    }
  }
}

fn format_diffs(diffs: &[FieldDiff]) -> String {
  diffs.iter().map(|d| d.to_string()).collect::<Vec<_>>().join("; ")
}
