//! Implementation of the `converge get` command.

use std::path::Path;

use anyhow::{Context as _, Result};

use converge_lib::codec::{self, Encoding};

use super::{Context, runtime, state_store, target};
use crate::manifest::LoadedManifest;
use crate::output::print_json;

/// Print the remote state as JSON. Text and JSON output are the same document.
pub fn cmd_get(ctx: &Context, file: &Path) -> Result<()> {
  let manifest = LoadedManifest::load(file)?;
  let client = ctx.client()?;
  let resource = target(&state_store()?, &manifest);

  let rt = runtime()?;
  let fetched = rt
    .block_on(client.get(&manifest.schema, &resource))
    .with_context(|| format!("Failed to get {}", resource.describe(&manifest.schema)))?;

  print_json(&codec::to_json(&manifest.schema, &fetched, Encoding::Full)?)
}
