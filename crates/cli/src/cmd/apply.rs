//! Implementation of the `converge apply` command.
//!
//! Converges the remote resource to the manifest and stores the observed
//! state, which later runs use to find the resource again.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context as _, Result};
use tracing::info;

use converge_lib::codec::{self, Encoding};
use converge_lib::reconcile::{ApplyError, ApplyOptions, Lifecycle};

use super::{Context, load_hint, runtime, state_store};
use crate::manifest::LoadedManifest;
use crate::output::{format_duration, print_diff, print_json, print_stat, print_success, print_warning};

pub struct ApplyArgs {
  pub block_creation: bool,
  pub block_acquire: bool,
  pub block_modification: bool,
  pub no_hint: bool,
}

pub fn cmd_apply(ctx: &Context, file: &Path, args: &ApplyArgs) -> Result<()> {
  let manifest = LoadedManifest::load(file)?;
  let reconciler = ctx.reconciler()?;
  let store = state_store()?;

  let options = ApplyOptions {
    lifecycle: Lifecycle {
      block_creation: args.block_creation,
      block_acquire: args.block_acquire,
      block_modification: args.block_modification,
    },
    state_hint: if args.no_hint { None } else { load_hint(&store, &manifest) },
  };

  let rt = runtime()?;
  let started = Instant::now();
  let outcome = match rt.block_on(reconciler.apply(&manifest.schema, &manifest.resource, &options)) {
    Ok(outcome) => outcome,
    Err(ApplyError::DiffAfterApply { diffs, state }) => {
      // The calls went through, so the state is still worth keeping as a hint.
      store.save(&manifest.schema, &manifest.key, &state)?;
      print_warning("Remote state did not converge:");
      for diff in &diffs {
        print_diff(diff);
      }
      return Err(ApplyError::DiffAfterApply { diffs, state }).context("Apply failed");
    }
    Err(e) => return Err(e).context("Apply failed"),
  };
  let elapsed = started.elapsed();

  let path = store
    .save(&manifest.schema, &manifest.key, &outcome.state)
    .context("Failed to save state")?;
  info!(path = %path.display(), "state saved");

  if ctx.json {
    return print_json(&serde_json::json!({
      "kind": manifest.schema.kind,
      "key": manifest.key,
      "plan": outcome.plan,
      "diffs": outcome.diffs,
      "attempts": outcome.attempts,
      "state": codec::to_json(&manifest.schema, &outcome.state, Encoding::Full)?,
    }));
  }

  let target = outcome.state.describe(&manifest.schema);
  if outcome.plan.is_empty() {
    print_success(&format!("{} is up to date", target));
  } else {
    print_success(&format!("Applied {} to {}", outcome.plan, target));
    for diff in outcome.diffs.iter().filter(|d| !d.is_trivial()) {
      print_diff(diff);
    }
  }
  print_stat("Duration", &format_duration(elapsed));
  if outcome.attempts > 1 {
    print_stat("Attempts", &outcome.attempts.to_string());
  }
  Ok(())
}
