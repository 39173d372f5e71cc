//! Removing a deployed bundle from its destination.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::manifest::{is_absolute_key, top_level_dir};
use crate::metadata::{DeploymentsMetadata, MetadataError};
use crate::types::DestinationCompliance;

#[derive(Debug, Error)]
pub enum PurgeError {
  #[error(transparent)]
  Metadata(#[from] MetadataError),

  #[error("failed to remove {path}: {source}")]
  Remove {
    path: String,
    #[source]
    source: io::Error,
  },
}

/// What a purge removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
  /// Whether the destination held a recorded deployment.
  pub managed: bool,
  /// Files outside the destination that were deleted.
  pub external_deleted: Vec<String>,
  /// Files outside the destination that could not be deleted, with the reason.
  pub external_failed: BTreeMap<String, String>,
  /// Entries removed from the destination.
  pub removed: Vec<String>,
  /// The destination directory itself was removed.
  pub destination_purged: bool,
}

fn remove_path(path: &Path) -> io::Result<bool> {
  let result = match fs::symlink_metadata(path) {
    Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
    Ok(_) => fs::remove_file(path),
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
    Err(e) => Err(e),
  };
  result.map(|_| true)
}

/// Remove the current deployment from `deploy_dir`.
///
/// Recorded files outside the destination are deleted one by one; failures there are
/// reported, not fatal. Inside the destination, every top-level entry holding recorded
/// content goes. With full compliance the destination directory is removed as well,
/// otherwise only the deployment metadata.
pub fn purge_bundle(deploy_dir: &Path) -> Result<PurgeReport, PurgeError> {
  let metadata = DeploymentsMetadata::new(deploy_dir);
  let mut report = PurgeReport::default();
  if !metadata.is_managed() {
    info!(dir = %deploy_dir.display(), "nothing deployed, nothing to purge");
    return Ok(report);
  }
  report.managed = true;

  let properties = metadata.current_deployment_properties()?;
  let hashcodes = metadata.current_file_hashcodes()?;

  let mut top_level: BTreeSet<&str> = BTreeSet::new();
  for key in hashcodes.keys() {
    if is_absolute_key(key) {
      match remove_path(Path::new(key)) {
        Ok(_) => report.external_deleted.push(key.clone()),
        Err(e) => {
          warn!(path = %key, error = %e, "failed to delete external file");
          report.external_failed.insert(key.clone(), e.to_string());
        }
      }
      continue;
    }
    top_level.insert(top_level_dir(key).unwrap_or(key.as_str()));
  }

  for entry in top_level {
    let path = deploy_dir.join(entry);
    let removed = remove_path(&path).map_err(|source| PurgeError::Remove {
      path: path.display().to_string(),
      source,
    })?;
    if removed {
      report.removed.push(entry.to_string());
    }
  }

  let doomed = if properties.compliance == DestinationCompliance::Full {
    report.destination_purged = true;
    deploy_dir.to_path_buf()
  } else {
    metadata.metadata_dir()
  };
  remove_path(&doomed).map_err(|source| PurgeError::Remove {
    path: doomed.display().to_string(),
    source,
  })?;

  info!(
    dir = %deploy_dir.display(),
    bundle = %properties.bundle_name,
    version = %properties.bundle_version,
    removed = report.removed.len(),
    "purged bundle"
  );
  Ok(report)
}
