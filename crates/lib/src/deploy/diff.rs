//! What a deployment changed (or would change, on a dry run).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

/// Report of one deployment.
///
/// Paths are manifest keys: relative to the destination with `/` separators,
/// or absolute for files outside the destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeployDifferences {
  pub added: BTreeSet<String>,
  pub deleted: BTreeSet<String>,
  pub changed: BTreeSet<String>,
  /// Target files whose content on disk already matched.
  pub unchanged: BTreeSet<String>,
  pub ignored: BTreeSet<String>,
  /// Path -> backup location.
  pub backed_up: BTreeMap<String, String>,
  /// Path -> backup location it was restored from.
  pub restored: BTreeMap<String, String>,
  /// Path -> realized content.
  pub realized: BTreeMap<String, String>,
  /// Path -> problem that did not abort the deployment.
  pub errors: BTreeMap<String, String>,
  /// Files actually written to disk.
  pub written: BTreeSet<String>,
  pub cleaned: bool,
}

impl DeployDifferences {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_added(&mut self, path: impl Into<String>) {
    self.added.insert(path.into());
  }

  pub fn remove_added(&mut self, path: &str) -> bool {
    self.added.remove(path)
  }

  pub fn add_deleted(&mut self, path: impl Into<String>) {
    self.deleted.insert(path.into());
  }

  pub fn add_changed(&mut self, path: impl Into<String>) {
    self.changed.insert(path.into());
  }

  pub fn add_unchanged(&mut self, path: impl Into<String>) {
    self.unchanged.insert(path.into());
  }

  pub fn add_ignored(&mut self, paths: impl IntoIterator<Item = String>) {
    self.ignored.extend(paths);
  }

  pub fn add_backed_up(&mut self, path: impl Into<String>, backup: impl Into<String>) {
    self.backed_up.insert(path.into(), backup.into());
  }

  pub fn add_restored(&mut self, path: impl Into<String>, backup: impl Into<String>) {
    self.restored.insert(path.into(), backup.into());
  }

  pub fn add_realized(&mut self, path: impl Into<String>, content: impl Into<String>) {
    self.realized.insert(path.into(), content.into());
  }

  pub fn add_error(&mut self, path: impl Into<String>, message: impl Into<String>) {
    self.errors.insert(path.into(), message.into());
  }

  pub fn add_written(&mut self, path: impl Into<String>) {
    self.written.insert(path.into());
  }

  /// Whether the deployment touched nothing on disk.
  pub fn is_noop(&self) -> bool {
    self.added.is_empty()
      && self.deleted.is_empty()
      && self.changed.is_empty()
      && self.backed_up.is_empty()
      && self.restored.is_empty()
      && self.written.is_empty()
      && !self.cleaned
  }

  /// Fold the report of another deployment unit into this one.
  pub fn merge(&mut self, other: DeployDifferences) {
    self.added.extend(other.added);
    self.deleted.extend(other.deleted);
    self.changed.extend(other.changed);
    self.unchanged.extend(other.unchanged);
    self.ignored.extend(other.ignored);
    self.backed_up.extend(other.backed_up);
    self.restored.extend(other.restored);
    self.realized.extend(other.realized);
    self.errors.extend(other.errors);
    self.written.extend(other.written);
    self.cleaned |= other.cleaned;
  }
}

fn write_set(f: &mut fmt::Formatter<'_>, label: &str, set: &BTreeSet<String>) -> fmt::Result {
  write!(f, "{label} ({}):", set.len())?;
  for path in set {
    write!(f, "\n  {path}")?;
  }
  writeln!(f)
}

fn write_map(f: &mut fmt::Formatter<'_>, label: &str, map: &BTreeMap<String, String>) -> fmt::Result {
  write!(f, "{label} ({}):", map.len())?;
  for (path, value) in map {
    write!(f, "\n  {path} -> {value}")?;
  }
  writeln!(f)
}

impl fmt::Display for DeployDifferences {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write_set(f, "added", &self.added)?;
    write_set(f, "deleted", &self.deleted)?;
    write_set(f, "changed", &self.changed)?;
    write_set(f, "ignored", &self.ignored)?;
    write_map(f, "backed up", &self.backed_up)?;
    write_map(f, "restored", &self.restored)?;
    write!(f, "realized ({}):", self.realized.len())?;
    for path in self.realized.keys() {
      write!(f, "\n  {path}")?;
    }
    writeln!(f)?;
    write_map(f, "errors", &self.errors)?;
    write!(f, "cleaned: {}", self.cleaned)
  }
}
