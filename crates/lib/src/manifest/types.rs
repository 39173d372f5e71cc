//! The path to content hash map recorded for a destination directory.
//!
//! # Path Keys
//!
//! Paths relative to the destination root always use `/` as the separator,
//! regardless of platform, so a manifest written on one system reads the same
//! everywhere. Files deployed outside the destination root are keyed by their
//! absolute path.
//!
//! # Sentinel Values
//!
//! - [`DIRECTORY_HASHCODE`]: an in-memory entry standing for a directory
//! - [`DELETED_FILE_HASHCODE`]: a recorded file that no longer exists on disk

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

use crate::consts::METADATA_DIR;
use crate::util::hash::{HashError, hash_file};

/// Hash recorded for a directory entry.
pub const DIRECTORY_HASHCODE: &str = "DIRECTORY";

/// Hash recorded for a file that was expected but is gone.
pub const DELETED_FILE_HASHCODE: &str = "DELETED";

/// Errors produced while building or rescanning a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
  #[error(transparent)]
  Hash(#[from] HashError),

  #[error("failed to scan {path}: {message}")]
  Walk { path: String, message: String },
}

/// Mapping of destination path to content hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileHashcodeMap {
  entries: BTreeMap<String, String>,
}

impl FileHashcodeMap {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert an entry, normalizing the path key.
  pub fn insert(&mut self, path: impl AsRef<str>, hash: impl Into<String>) -> Option<String> {
    self.entries.insert(convert_path(path.as_ref()), hash.into())
  }

  pub fn get(&self, path: &str) -> Option<&str> {
    self.entries.get(path).map(String::as_str)
  }

  pub fn contains_key(&self, path: &str) -> bool {
    self.entries.contains_key(path)
  }

  pub fn remove(&mut self, path: &str) -> Option<String> {
    self.entries.remove(path)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn keys(&self) -> impl Iterator<Item = &String> {
    self.entries.keys()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
    self.entries.iter()
  }

  /// Merge all entries of `other` into this map; entries of `other` win.
  pub fn extend(&mut self, other: impl IntoIterator<Item = (String, String)>) {
    for (path, hash) in other {
      self.insert(path, hash);
    }
  }

  /// Entries that stand for real files (no directory or deleted markers).
  pub fn files(&self) -> impl Iterator<Item = (&String, &String)> {
    self
      .entries
      .iter()
      .filter(|(_, hash)| hash.as_str() != DIRECTORY_HASHCODE && hash.as_str() != DELETED_FILE_HASHCODE)
  }

  /// Add a [`DIRECTORY_HASHCODE`] entry for every parent directory of every relative path.
  pub fn put_directory_entries(&mut self) {
    let mut dirs = Vec::new();
    for key in self.entries.keys() {
      if is_absolute_key(key) {
        continue;
      }
      let mut current = key.as_str();
      while let Some((parent, _)) = current.rsplit_once('/') {
        dirs.push(parent.to_string());
        current = parent;
      }
    }
    for dir in dirs {
      self.entries.insert(dir, DIRECTORY_HASHCODE.to_string());
    }
  }

  /// Copy of this map with directory entries dropped, as persisted on disk.
  pub fn without_directories(&self) -> Self {
    let entries = self
      .entries
      .iter()
      .filter(|(_, hash)| hash.as_str() != DIRECTORY_HASHCODE)
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect();
    Self { entries }
  }

  /// Build a map for every regular file found under `root`.
  ///
  /// The metadata directory is never included, nor are paths matching `ignore`.
  pub fn from_directory(root: &Path, ignore: Option<&Regex>) -> Result<Self, ManifestError> {
    let mut map = Self::new();
    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name().into_iter();

    while let Some(entry) = walker.next() {
      let entry = entry.map_err(|e| ManifestError::Walk {
        path: root.display().to_string(),
        message: e.to_string(),
      })?;
      let is_dir = entry.file_type().is_dir();
      if entry.depth() == 1 && entry.file_name() == METADATA_DIR {
        if is_dir {
          walker.skip_current_dir();
        }
        continue;
      }

      let relative = relative_key(root, entry.path());
      if ignore.is_some_and(|re| re.is_match(&relative)) {
        if is_dir {
          walker.skip_current_dir();
        }
        continue;
      }
      if entry.file_type().is_file() {
        let hash = hash_file(entry.path())?;
        map.entries.insert(relative, hash.0);
      }
    }

    Ok(map)
  }
}

impl FromIterator<(String, String)> for FileHashcodeMap {
  fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
    let mut map = Self::new();
    map.extend(iter);
    map
  }
}

impl IntoIterator for FileHashcodeMap {
  type Item = (String, String);
  type IntoIter = std::collections::btree_map::IntoIter<String, String>;

  fn into_iter(self) -> Self::IntoIter {
    self.entries.into_iter()
  }
}

/// Normalize a manifest path key.
///
/// Relative paths get `/` separators with `.` segments and duplicate separators
/// removed. Absolute paths are kept as given.
pub fn convert_path(path: &str) -> String {
  if Path::new(path).is_absolute() {
    return path.to_string();
  }
  path
    .split(['/', '\\'])
    .filter(|segment| !segment.is_empty() && *segment != ".")
    .collect::<Vec<_>>()
    .join("/")
}

/// Whether a manifest key refers to a location outside the destination root.
pub fn is_absolute_key(key: &str) -> bool {
  Path::new(key).is_absolute()
}

/// Resolve a manifest key to the file it names.
pub fn key_to_path(root: &Path, key: &str) -> PathBuf {
  if is_absolute_key(key) {
    PathBuf::from(key)
  } else {
    root.join(key)
  }
}

/// Manifest key of `path` relative to `root`.
pub fn relative_key(root: &Path, path: &Path) -> String {
  let relative = path.strip_prefix(root).unwrap_or(path);
  let parts: Vec<String> = relative
    .components()
    .filter_map(|c| match c {
      Component::Normal(s) => Some(s.to_string_lossy().to_string()),
      _ => None,
    })
    .collect();
  parts.join("/")
}

/// First segment of a relative key, if the key lives in a subdirectory.
pub fn top_level_dir(key: &str) -> Option<&str> {
  if is_absolute_key(key) {
    return None;
  }
  key.split_once('/').map(|(top, _)| top)
}
