//! Comparing a recorded manifest with what is on disk now.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use regex::Regex;
use tracing::debug;
use walkdir::WalkDir;

use crate::consts::METADATA_DIR;
use crate::util::hash::hash_file;

use super::types::{
  DELETED_FILE_HASHCODE, DIRECTORY_HASHCODE, FileHashcodeMap, ManifestError, key_to_path, relative_key,
};

/// Result of [`FileHashcodeMap::rescan`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangesFileHashcodeMap {
  /// Every recorded or discovered path with the hash found on disk now.
  /// Recorded paths that are gone carry [`DELETED_FILE_HASHCODE`].
  pub current: FileHashcodeMap,

  /// Found on disk but never recorded (path -> hash on disk).
  pub additions: BTreeMap<String, String>,

  /// Recorded but missing on disk (path -> recorded hash).
  pub deletions: BTreeMap<String, String>,

  /// Recorded and present, but with different content (path -> hash on disk).
  pub changes: BTreeMap<String, String>,

  /// Paths matching the ignore pattern. These are never backed up or removed.
  pub ignored: BTreeSet<String>,

  /// Top-level entries that were not recorded and are not reported as additions.
  pub skipped: BTreeSet<String>,
}

impl ChangesFileHashcodeMap {
  /// Whether nothing differs from the recorded manifest.
  pub fn is_unchanged(&self) -> bool {
    self.additions.is_empty() && self.deletions.is_empty() && self.changes.is_empty()
  }
}

impl FileHashcodeMap {
  /// Compare this (recorded) manifest with the files under `root`.
  ///
  /// When `report_new_root_files_as_new` is false, unrecorded top-level files and
  /// directories are reported as skipped instead of as additions, and their
  /// contents are not scanned.
  pub fn rescan(
    &self,
    root: &Path,
    ignore: Option<&Regex>,
    report_new_root_files_as_new: bool,
  ) -> Result<ChangesFileHashcodeMap, ManifestError> {
    let mut changes = ChangesFileHashcodeMap::default();

    for (key, original) in self.iter() {
      if ignore.is_some_and(|re| re.is_match(key)) {
        changes.ignored.insert(key.clone());
        continue;
      }

      let path = key_to_path(root, key);
      if original == DIRECTORY_HASHCODE {
        if path.is_dir() {
          changes.current.insert(key, DIRECTORY_HASHCODE);
        } else {
          mark_deleted(&mut changes, key, original);
        }
        continue;
      }

      if !path.is_file() {
        mark_deleted(&mut changes, key, original);
        continue;
      }

      let hash = hash_file(&path)?.0;
      if &hash != original {
        debug!(path = %key, "recorded file was modified");
        changes.changes.insert(key.clone(), hash.clone());
      }
      changes.current.insert(key, hash);
    }

    if !root.is_dir() {
      return Ok(changes);
    }

    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name().into_iter();
    while let Some(entry) = walker.next() {
      let entry = entry.map_err(|e| ManifestError::Walk {
        path: root.display().to_string(),
        message: e.to_string(),
      })?;
      let file_type = entry.file_type();
      let is_dir = file_type.is_dir();

      if entry.depth() == 1 && entry.file_name() == METADATA_DIR {
        if is_dir {
          walker.skip_current_dir();
        }
        continue;
      }

      let key = relative_key(root, entry.path());
      if self.contains_key(&key) {
        continue;
      }

      if ignore.is_some_and(|re| re.is_match(&key)) {
        changes.ignored.insert(key);
        if is_dir {
          walker.skip_current_dir();
        }
        continue;
      }

      if entry.depth() == 1 && !report_new_root_files_as_new {
        changes.skipped.insert(key);
        if is_dir {
          walker.skip_current_dir();
        }
        continue;
      }

      let hash = if is_dir {
        DIRECTORY_HASHCODE.to_string()
      } else if file_type.is_file() {
        hash_file(entry.path())?.0
      } else {
        continue;
      };

      changes.additions.insert(key.clone(), hash.clone());
      changes.current.insert(key, hash);
    }

    Ok(changes)
  }
}

fn mark_deleted(changes: &mut ChangesFileHashcodeMap, key: &str, original: &str) {
  changes.deletions.insert(key.to_string(), original.to_string());
  changes.current.insert(key, DELETED_FILE_HASHCODE);
}
