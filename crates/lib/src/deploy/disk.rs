//! Free space of the destination partition.

use std::path::Path;

/// Estimated size of a deployment against the space available for it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
  /// Bytes the deployment is estimated to write.
  pub required: u64,
  pub file_count: u64,
  /// Bytes usable on the destination partition, if known.
  pub usable: Option<u64>,
}

impl DiskUsage {
  pub fn add_file(&mut self, size: u64) {
    self.required = self.required.saturating_add(size);
    self.file_count += 1;
  }

  /// Whether the deployment does not fit. Unknown usable space always fits.
  pub fn exceeds_usable(&self) -> bool {
    self.usable.is_some_and(|usable| self.required > usable)
  }
}

/// Usable bytes on the partition holding `path`.
///
/// `path` need not exist yet; the nearest existing ancestor is queried.
pub fn usable_space(path: &Path) -> Option<u64> {
  let existing = path.ancestors().find(|p| p.exists())?;
  statvfs_available(existing)
}

#[cfg(unix)]
fn statvfs_available(path: &Path) -> Option<u64> {
  let stat = rustix::fs::statvfs(path).ok()?;
  Some(stat.f_bavail.saturating_mul(stat.f_frsize))
}

#[cfg(not(unix))]
fn statvfs_available(_path: &Path) -> Option<u64> {
  None
}
