//! Implementation of the `converge plan` command.
//!
//! Discovers the remote state and prints the field differences and the
//! operations an apply would run. Nothing is mutated.

use std::path::Path;

use anyhow::{Context as _, Result};

use converge_lib::reconcile::ApplyOptions;

use super::{Context, load_hint, runtime, state_store};
use crate::manifest::LoadedManifest;
use crate::output::{print_diff, print_info, print_json, print_success};

pub fn cmd_plan(ctx: &Context, file: &Path, no_hint: bool) -> Result<()> {
  let manifest = LoadedManifest::load(file)?;
  let reconciler = ctx.reconciler()?;

  let state_hint = if no_hint {
    None
  } else {
    load_hint(&state_store()?, &manifest)
  };
  let options = ApplyOptions {
    state_hint,
    ..ApplyOptions::default()
  };

  let rt = runtime()?;
  let outcome = rt
    .block_on(reconciler.plan(&manifest.schema, &manifest.resource, &options))
    .context("Plan failed")?;

  if ctx.json {
    return print_json(&serde_json::json!({
      "kind": manifest.schema.kind,
      "key": manifest.key,
      "exists": outcome.initial.is_some(),
      "plan": outcome.plan,
      "diffs": outcome.diffs,
    }));
  }

  let target = manifest.resource.describe(&manifest.schema);
  if outcome.plan.is_empty() {
    print_success(&format!("{} is up to date", target));
  } else {
    print_info(&format!("{}: plan {}", target, outcome.plan));
  }
  for diff in outcome.diffs.iter().filter(|d| ctx.verbose || !d.is_trivial()) {
    print_diff(diff);
  }
  Ok(())
}
