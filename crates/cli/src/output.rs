//! Terminal rendering for command results: status lines, stats and diff listings.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use deployer_lib::deploy::DeployDifferences;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
  pub const ADD: &str = "+";
  pub const MODIFY: &str = "~";
  pub const REMOVE: &str = "-";
}

/// First twelve characters of a digest.
pub fn truncate_hash(hash: &str) -> &str {
  hash.get(..12).unwrap_or(hash)
}

/// Binary-prefixed size with one decimal, e.g. `1.5 KB`.
pub fn format_bytes(bytes: u64) -> String {
  const UNITS: [&str; 3] = ["KB", "MB", "GB"];
  if bytes < 1024 {
    return format!("{bytes} B");
  }
  let mut value = bytes as f64 / 1024.0;
  let mut unit = 0;
  while value >= 1024.0 && unit + 1 < UNITS.len() {
    value /= 1024.0;
    unit += 1;
  }
  format!("{value:.1} {}", UNITS[unit])
}

/// Milliseconds under a second, seconds with centiseconds under a minute, then `Xm Ys`.
pub fn format_duration(duration: Duration) -> String {
  match duration.as_secs() {
    0 => format!("{}ms", duration.subsec_millis()),
    secs @ 1..60 => format!("{secs}.{:02}s", duration.subsec_millis() / 10),
    secs => format!("{}m {}s", secs / 60, secs % 60),
  }
}

/// Seconds since the epoch as an RFC 3339 timestamp.
pub fn format_timestamp(secs: u64) -> String {
  let time: SystemTime = UNIX_EPOCH + Duration::from_secs(secs);
  humantime::format_rfc3339_seconds(time).to_string()
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
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

/// Counts of a deployment report, and with `verbose` every path.
pub fn print_differences(diff: &DeployDifferences, verbose: bool) {
  print_stat("Added", &diff.added.len().to_string());
  print_stat("Changed", &diff.changed.len().to_string());
  print_stat("Deleted", &diff.deleted.len().to_string());
  print_stat("Unchanged", &diff.unchanged.len().to_string());
  if !diff.ignored.is_empty() {
    print_stat("Ignored", &diff.ignored.len().to_string());
  }
  if !diff.backed_up.is_empty() {
    print_stat("Backed up", &diff.backed_up.len().to_string());
  }
  if !diff.restored.is_empty() {
    print_stat("Restored", &diff.restored.len().to_string());
  }
  if diff.cleaned {
    print_stat("Cleaned", "yes");
  }

  for (path, message) in &diff.errors {
    print_warning(&format!("{path}: {message}"));
  }

  if !verbose {
    return;
  }
  println!();
  for path in &diff.added {
    println!("  {} {}", symbols::ADD.if_supports_color(Stream::Stdout, |s| s.green()), path);
  }
  for path in &diff.changed {
    println!("  {} {}", symbols::MODIFY.if_supports_color(Stream::Stdout, |s| s.yellow()), path);
  }
  for path in &diff.deleted {
    println!("  {} {}", symbols::REMOVE.if_supports_color(Stream::Stdout, |s| s.red()), path);
  }
  for (path, backup) in &diff.backed_up {
    println!(
      "  {} {} {} {}",
      symbols::INFO,
      path,
      symbols::ARROW,
      backup.if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
  }
}
