//! Implementation of the `converge schemas` command.

use anyhow::Result;

use converge_lib::schema::SchemaRegistry;

use super::Context;
use crate::output::{print_json, print_stat};

pub fn cmd_schemas(ctx: &Context) -> Result<()> {
  let registry = SchemaRegistry::builtin()?;

  if ctx.json {
    let kinds: Vec<_> = registry
      .iter()
      .map(|schema| {
        serde_json::json!({
          "kind": schema.kind,
          "base_url": schema.base_url,
          "listable": schema.paths.list.is_some(),
          "update_operations": schema.update_operations.iter().map(|op| op.name.as_str()).collect::<Vec<_>>(),
        })
      })
      .collect();
    return print_json(&kinds);
  }

  for schema in registry.iter() {
    println!("{}", schema.kind);
    if ctx.verbose {
      print_stat("Base URL", &schema.base_url);
      print_stat("Fields", &schema.fields.len().to_string());
      let ops: Vec<&str> = schema.update_operations.iter().map(|op| op.name.as_str()).collect();
      if !ops.is_empty() {
        print_stat("Updates", &ops.join(", "));
      }
    }
  }
  Ok(())
}
