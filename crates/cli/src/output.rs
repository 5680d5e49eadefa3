//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output including colored status
//! messages, field differences and durations.

use std::time::Duration;

use anyhow::Context;
use owo_colors::{OwoColorize, Stream};

use converge_lib::diff::FieldDiff;
use converge_lib::schema::OperationClass;

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const MODIFY: &str = "~";
  pub const REPLACE: &str = "!";
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

/// Symbol for a diff line, by the operation that would resolve it.
pub fn diff_symbol(operation: &OperationClass) -> &'static str {
  match operation {
    OperationClass::NoOp => " ",
    OperationClass::Update(_) => symbols::MODIFY,
    OperationClass::RequiresRecreate => symbols::REPLACE,
  }
}

pub fn print_diff(diff: &FieldDiff) {
  let symbol = diff_symbol(&diff.operation);
  let line = format!("  {} {}: {}", symbol, diff.path, diff.message);
  match diff.operation {
    OperationClass::NoOp => println!("{}", line.if_supports_color(Stream::Stdout, |s| s.dimmed())),
    OperationClass::Update(_) => println!("{}", line.if_supports_color(Stream::Stdout, |s| s.yellow())),
    OperationClass::RequiresRecreate => println!("{}", line.if_supports_color(Stream::Stdout, |s| s.red())),
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
