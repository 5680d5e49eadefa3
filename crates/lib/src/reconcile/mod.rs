//! Desired-state reconciliation.
//!
//! An apply runs three phases against one resource:
//!
//! 1. Discover: validate the desired state, fetch the current state and
//!    canonicalize both sides
//! 2. Plan: diff, check lifecycle gates, pick a create or a set of updates
//! 3. Actuate and verify: run the plan, re-fetch, and diff once more
//!
//! Conflicts at any phase restart the sequence from discovery, up to the
//! configured number of conflict retries. The whole call runs under the
//! configured apply deadline.

mod plan;
mod types;

pub use plan::{ConvergencePlan, PlannedOperation, plan_operations};
pub use types::{ApplyError, ApplyOptions, ApplyOutcome, Lifecycle, PlanOutcome};

use tracing::{debug, info, warn};

use crate::canonical::{canonicalize_desired, canonicalize_initial, canonicalize_new};
use crate::client::{Client, ClientError};
use crate::diff::{FieldDiff, diff};
use crate::resource::Resource;
use crate::schema::{OperationClass, ResourceSchema};

/// Discovered state of one resource.
struct Discovery {
  initial: Option<Resource>,
  desired: Resource,
  diffs: Vec<FieldDiff>,
}

/// Drives resources toward their desired state through a [`Client`].
#[derive(Debug, Clone)]
pub struct Reconciler {
  client: Client,
}

impl Reconciler {
  pub fn new(client: Client) -> Self {
    Self { client }
  }

  pub fn client(&self) -> &Client {
    &self.client
  }

  /// Converge the remote resource to `desired`.
  pub async fn apply(
    &self,
    schema: &ResourceSchema,
    desired: &Resource,
    options: &ApplyOptions,
  ) -> Result<ApplyOutcome, ApplyError> {
    match self.client.config().apply_timeout {
      Some(deadline) => tokio::time::timeout(deadline, self.apply_with_retry(schema, desired, options))
        .await
        .map_err(|_| ApplyError::Timeout(deadline))?,
      None => self.apply_with_retry(schema, desired, options).await,
    }
  }

  async fn apply_with_retry(
    &self,
    schema: &ResourceSchema,
    desired: &Resource,
    options: &ApplyOptions,
  ) -> Result<ApplyOutcome, ApplyError> {
    let config = self.client.config();
    let mut attempt = 0;
    loop {
      attempt += 1;
      match self.apply_once(schema, desired, options).await {
        Ok(mut outcome) => {
          outcome.attempts = attempt;
          return Ok(outcome);
        }
        Err(e) if e.is_conflict() && attempt <= config.conflict_retries => {
          let delay = config.retry.backoff(attempt - 1);
          warn!(
            resource = %desired.describe(schema),
            attempt,
            delay = ?delay,
            error = %e,
            "conflict during apply, restarting"
          );
          tokio::time::sleep(delay).await;
        }
        Err(e) => return Err(e),
      }
    }
  }

  async fn apply_once(
    &self,
    schema: &ResourceSchema,
    desired: &Resource,
    options: &ApplyOptions,
  ) -> Result<ApplyOutcome, ApplyError> {
    let discovery = self.discover(schema, desired, options).await?;
    let plan = plan_operations(schema, discovery.initial.is_some(), &discovery.diffs, &options.lifecycle)?;
    info!(resource = %desired.describe(schema), plan = %plan, diffs = discovery.diffs.len(), "planned apply");

    let Discovery {
      initial,
      desired: canonical_desired,
      diffs,
    } = discovery;

    if plan.is_empty() {
      info!("no changes to apply");
      let state = match initial {
        Some(initial) => canonicalize_new(schema, initial, desired),
        None => canonical_desired,
      };
      return Ok(ApplyOutcome {
        state,
        plan,
        diffs,
        attempts: 1,
      });
    }

    let mut created = None;
    for operation in plan.operations() {
      match operation {
        PlannedOperation::Create => {
          let response = self
            .client
            .create(schema, &canonical_desired)
            .await
            .map_err(|source| actuate_error(operation, source))?;
          created = Some(response);
        }
        PlannedOperation::Update(name) => {
          let update = schema
            .update_operation(name)
            .ok_or_else(|| ApplyError::UnknownOperation(name.clone()))?;
          let op_diffs: Vec<FieldDiff> = diffs
            .iter()
            .filter(|d| matches!(&d.operation, OperationClass::Update(n) if n == name))
            .cloned()
            .collect();
          let etag = initial.as_ref().and_then(|i| i.etag(schema));
          self
            .client
            .update(schema, update, &canonical_desired, &op_diffs, etag)
            .await
            .map_err(|source| actuate_error(operation, source))?;
        }
      }
    }

    let state = self.verify(schema, desired, &canonical_desired, created.as_ref()).await?;
    info!(resource = %state.describe(schema), "apply complete");
    Ok(ApplyOutcome {
      state,
      plan,
      diffs,
      attempts: 1,
    })
  }

  /// Discover and plan without mutating anything.
  pub async fn plan(
    &self,
    schema: &ResourceSchema,
    desired: &Resource,
    options: &ApplyOptions,
  ) -> Result<PlanOutcome, ApplyError> {
    let discovery = self.discover(schema, desired, options).await?;
    let plan = plan_operations(schema, discovery.initial.is_some(), &discovery.diffs, &options.lifecycle)?;
    Ok(PlanOutcome {
      initial: discovery.initial,
      desired: discovery.desired,
      diffs: discovery.diffs,
      plan,
    })
  }

  /// Delete the resource. An absent resource counts as deleted.
  pub async fn delete(&self, schema: &ResourceSchema, resource: &Resource) -> Result<(), ClientError> {
    resource.check_kind(schema)?;
    self.client.delete(schema, resource).await
  }

  async fn discover(
    &self,
    schema: &ResourceSchema,
    desired: &Resource,
    options: &ApplyOptions,
  ) -> Result<Discovery, ApplyError> {
    desired.validate(schema)?;

    let key = match &options.state_hint {
      Some(hint) if hint.kind() == schema.kind => hint,
      Some(hint) => {
        warn!(expected = %schema.kind, actual = %hint.kind(), "ignoring state hint of a different kind");
        desired
      }
      None => desired,
    };

    let raw_initial = if key.has_identity(schema) {
      match self.client.get(schema, key).await {
        Ok(found) => Some(found),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(ApplyError::Discover(e)),
      }
    } else {
      debug!(resource = %key.describe(schema), "no identity to fetch by, assuming absent");
      None
    };
    info!(resource = %key.describe(schema), exists = raw_initial.is_some(), "discovered current state");

    let initial = match raw_initial {
      Some(raw) => Some(canonicalize_initial(schema, raw)?),
      None => None,
    };
    let canonical_desired = canonicalize_desired(schema, desired, initial.as_ref())?;
    debug!(desired = %canonical_desired.fields().to_json(), "canonical desired state");

    let diffs = match &initial {
      Some(initial) => diff(schema, &canonical_desired, initial)?,
      None => diff(schema, &canonical_desired, &Resource::new(schema.kind.clone()))?,
    };
    for d in &diffs {
      debug!(diff = %d, "field differs");
    }

    Ok(Discovery {
      initial,
      desired: canonical_desired,
      diffs,
    })
  }

  async fn verify(
    &self,
    schema: &ResourceSchema,
    raw_desired: &Resource,
    canonical_desired: &Resource,
    created: Option<&Resource>,
  ) -> Result<Resource, ApplyError> {
    let mut key = canonical_desired.clone();
    if let Some(created) = created {
      for field in schema.fields.iter().filter(|f| f.identity || f.server_generated) {
        if key.get(&field.name).is_blank() {
          key.set(field.name.clone(), created.get(&field.name).clone());
        }
      }
    }

    let mut raw_new = self.client.get(schema, &key).await.map_err(ApplyError::Verify)?;
    if let Some(created) = created {
      for (name, value) in created.fields().iter() {
        if raw_new.get(name).is_unset() {
          raw_new.set(name, value.clone());
        }
      }
    }

    let new_state = canonicalize_new(schema, canonicalize_initial(schema, raw_new)?, raw_desired);
    let desired = canonicalize_desired(schema, raw_desired, Some(&new_state))?;
    let residual: Vec<FieldDiff> = diff(schema, &desired, &new_state)?
      .into_iter()
      .filter(|d| !d.is_trivial())
      .collect();
    if !residual.is_empty() {
      return Err(ApplyError::DiffAfterApply {
        diffs: residual,
        state: Box::new(new_state),
      });
    }
    Ok(new_state)
  }
}

fn actuate_error(operation: &PlannedOperation, source: ClientError) -> ApplyError {
  ApplyError::Actuate {
    operation: operation.to_string(),
    source,
  }
}
