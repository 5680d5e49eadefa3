//! Implementation of the `converge delete` command.
//!
//! Deletes the remote resource and forgets its stored state. A resource that
//! is already gone counts as deleted.

use std::io::{self, IsTerminal, Write};
use std::path::Path;

use anyhow::{Context as _, Result, bail};

use super::{Context, runtime, state_store, target};
use crate::manifest::LoadedManifest;
use crate::output::{print_info, print_json, print_success};

pub fn cmd_delete(ctx: &Context, file: &Path, force: bool) -> Result<()> {
  let manifest = LoadedManifest::load(file)?;
  let reconciler = ctx.reconciler()?;
  let store = state_store()?;
  let resource = target(&store, &manifest);
  let described = resource.describe(&manifest.schema);

  if !confirm(&format!("Delete {}?", described), force)? {
    print_info("Aborted.");
    return Ok(());
  }

  let rt = runtime()?;
  rt.block_on(reconciler.delete(&manifest.schema, &resource))
    .with_context(|| format!("Failed to delete {}", described))?;
  let had_state = store
    .remove(&manifest.schema.kind, &manifest.key)
    .context("Failed to remove stored state")?;

  if ctx.json {
    return print_json(&serde_json::json!({
      "kind": manifest.schema.kind,
      "key": manifest.key,
      "deleted": true,
      "state_removed": had_state,
    }));
  }
  print_success(&format!("Deleted {}", described));
  Ok(())
}

fn confirm(question: &str, force: bool) -> Result<bool> {
  if force {
    return Ok(true);
  }
  if !io::stdin().is_terminal() || !io::stderr().is_terminal() {
    bail!("Cannot prompt for confirmation in non-interactive mode. Use --force to proceed.");
  }

  write!(io::stderr(), "{} [y/N] ", question)?;
  io::stderr().flush()?;
  let mut answer = String::new();
  io::stdin().read_line(&mut answer)?;
  Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
