//! Implementation of the `converge list` command.
//!
//! The manifest's spec supplies the parent parameters (for example the
//! project or account); its other fields are ignored.

use std::path::Path;

use anyhow::{Context as _, Result};

use converge_lib::codec::{self, Encoding};

use super::{Context, runtime};
use crate::manifest::LoadedManifest;
use crate::output::{print_info, print_json};

pub fn cmd_list(ctx: &Context, file: &Path, page_size: Option<u32>) -> Result<()> {
  let manifest = LoadedManifest::load(file)?;
  let client = ctx.client()?;
  let schema = &manifest.schema;

  let rt = runtime()?;
  let items = rt
    .block_on(client.list(schema, &manifest.resource, page_size).collect_all())
    .with_context(|| format!("Failed to list {}", schema.kind))?;

  if ctx.json {
    let encoded = items
      .iter()
      .map(|item| codec::to_json(schema, item, Encoding::Full))
      .collect::<Result<Vec<_>, _>>()?;
    return print_json(&encoded);
  }

  if items.is_empty() {
    print_info(&format!("No {} resources found", schema.kind));
  }
  for item in &items {
    println!("{}", item.describe(schema));
  }
  Ok(())
}
