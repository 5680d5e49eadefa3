mod cmd;
mod manifest;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::{ApplyArgs, Context};

/// converge - Declarative reconciler for REST resources
#[derive(Parser)]
#[command(name = "converge")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Path to the client config file
  #[arg(long, global = true, value_name = "PATH")]
  config: Option<PathBuf>,

  /// Print machine-readable JSON instead of text
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// List the built-in resource kinds
  Schemas,

  /// Show the differences and the operations an apply would run
  Plan {
    /// Resource manifest (JSON)
    file: PathBuf,

    /// Do not use the stored state as a hint
    #[arg(long)]
    no_hint: bool,
  },

  /// Converge the remote resource to the manifest
  Apply {
    /// Resource manifest (JSON)
    file: PathBuf,

    /// Fail if the resource does not exist yet
    #[arg(long)]
    block_creation: bool,

    /// Fail if the resource already exists
    #[arg(long)]
    block_acquire: bool,

    /// Fail if the resource would be modified
    #[arg(long)]
    block_modification: bool,

    /// Do not use the stored state as a hint
    #[arg(long)]
    no_hint: bool,
  },

  /// Fetch the current remote state
  Get {
    /// Resource manifest (JSON)
    file: PathBuf,
  },

  /// Delete the remote resource
  Delete {
    /// Resource manifest (JSON)
    file: PathBuf,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    force: bool,
  },

  /// List resources of the manifest's kind under its parent
  List {
    /// Resource manifest (JSON)
    file: PathBuf,

    /// Items requested per page
    #[arg(long)]
    page_size: Option<u32>,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let ctx = Context {
    config_path: cli.config,
    json: cli.json,
    verbose: cli.verbose,
  };

  let result = match cli.command {
    Commands::Schemas => cmd::cmd_schemas(&ctx),
    Commands::Plan { file, no_hint } => cmd::cmd_plan(&ctx, &file, no_hint),
    Commands::Apply {
      file,
      block_creation,
      block_acquire,
      block_modification,
      no_hint,
    } => cmd::cmd_apply(
      &ctx,
      &file,
      &ApplyArgs {
        block_creation,
        block_acquire,
        block_modification,
        no_hint,
      },
    ),
    Commands::Get { file } => cmd::cmd_get(&ctx, &file),
    Commands::Delete { file, force } => cmd::cmd_delete(&ctx, &file, force),
    Commands::List { file, page_size } => cmd::cmd_list(&ctx, &file, page_size),
  };

  if let Err(e) = result {
    output::print_error(&format!("{:#}", e));
    std::process::exit(1);
  }
  Ok(())
}
