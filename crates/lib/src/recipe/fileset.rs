//! Ant-style include patterns compiled to regular expressions.
//!
//! - `**/` matches zero or more directories
//! - a trailing `/**` matches everything below a directory
//! - `*` matches within one path segment
//! - `?` matches one character within a path segment

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A set of include patterns, e.g. from `<fileset includes="**/*.properties"/>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fileset {
  pub includes: Vec<String>,
}

impl Fileset {
  /// Parse a comma- or whitespace-separated `includes` attribute.
  pub fn from_includes(includes: &str) -> Self {
    let includes = includes
      .split([',', ' ', '\t', '\n'])
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(|s| s.replace('\\', "/"))
      .collect();
    Self { includes }
  }

  pub fn is_empty(&self) -> bool {
    self.includes.is_empty()
  }
}

/// Translate one pattern into an unanchored regex fragment.
pub fn glob_to_regex(pattern: &str) -> String {
  let mut pattern = pattern.trim_start_matches("./").to_string();
  if pattern.ends_with('/') {
    pattern.push_str("**");
  }

  let mut out = String::new();
  let mut rest = pattern.as_str();

  while !rest.is_empty() {
    if let Some(after) = rest.strip_prefix("**/") {
      out.push_str("(.*/)?");
      rest = after;
    } else if rest == "/**" {
      out.push_str("(/.*)?");
      rest = "";
    } else if let Some(after) = rest.strip_prefix("**") {
      out.push_str(".*");
      rest = after;
    } else if let Some(after) = rest.strip_prefix('*') {
      out.push_str("[^/]*");
      rest = after;
    } else if let Some(after) = rest.strip_prefix('?') {
      out.push_str("[^/]");
      rest = after;
    } else {
      let mut chars = rest.chars();
      if let Some(c) = chars.next() {
        out.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4])));
      }
      rest = chars.as_str();
    }
  }

  out
}

/// Compile filesets into one anchored regex, `None` if there are no patterns.
pub fn compile(filesets: &[Fileset]) -> Result<Option<Regex>, regex::Error> {
  let alternatives: Vec<String> = filesets
    .iter()
    .flat_map(|f| f.includes.iter())
    .map(|p| format!("(?:{})", glob_to_regex(p)))
    .collect();

  if alternatives.is_empty() {
    return Ok(None);
  }
  Regex::new(&format!("^(?:{})$", alternatives.join("|"))).map(Some)
}
