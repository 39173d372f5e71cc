//! Computing the target file set of a deployment.
//!
//! Every raw file and archive is resolved to its final manifest key and content
//! hash. Realization happens here, so a template error surfaces before anything
//! on disk is touched, and a dry run sees exactly the hashes a real run writes.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::manifest::{DIRECTORY_HASHCODE, FileHashcodeMap, convert_path};
use crate::util::hash::{hash_bytes, hash_file};

use super::archive;
use super::disk::DiskUsage;
use super::types::{ArchiveFile, DeployError, DeploymentData};

/// Where the bytes of a target come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TargetContent {
  /// Copy a local file as-is.
  Copy(PathBuf),
  /// Realized or rebuilt content.
  Bytes(Vec<u8>),
  /// Stream an entry out of an archive.
  ArchiveEntry { archive: PathBuf, raw_name: String },
  Directory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Target {
  pub content: TargetContent,
  pub hash: String,
}

/// The files a deployment puts in place, by manifest key.
#[derive(Debug, Default)]
pub(crate) struct TargetSet {
  pub entries: BTreeMap<String, Target>,
  /// Realized text, by manifest key.
  pub realized: BTreeMap<String, String>,
  pub usage: DiskUsage,
}

impl TargetSet {
  /// Hashes of every target, directories included.
  pub fn hashcodes(&self) -> FileHashcodeMap {
    self
      .entries
      .iter()
      .map(|(key, target)| (key.clone(), target.hash.clone()))
      .collect()
  }

  /// Keys of targets that are files.
  pub fn file_keys(&self) -> impl Iterator<Item = &String> {
    self
      .entries
      .iter()
      .filter(|(_, t)| t.content != TargetContent::Directory)
      .map(|(k, _)| k)
  }

  fn insert(&mut self, key: String, target: Target) {
    if let Some(previous) = self.entries.insert(key.clone(), target)
      && previous.content != TargetContent::Directory
    {
      debug!(path = %key, "target overrides an earlier directive");
    }
  }
}

pub(crate) fn compute(data: &DeploymentData) -> Result<TargetSet, DeployError> {
  let mut set = TargetSet::default();

  for raw in &data.raw_files {
    let source = data.source_path(&raw.source);
    let key = convert_path(&raw.destination);
    let size = fs::metadata(&source).map_err(|e| DeployError::io(&source, e))?.len();
    set.usage.add_file(size);

    let target = if raw.realize {
      let bytes = fs::read(&source).map_err(|e| DeployError::io(&source, e))?;
      let text = data
        .templates
        .realize_bytes(&bytes, &key)
        .map_err(|source| DeployError::Template {
          path: key.clone(),
          source,
        })?;
      let hash = hash_bytes(text.as_bytes()).0;
      set.realized.insert(key.clone(), text.clone());
      Target {
        content: TargetContent::Bytes(text.into_bytes()),
        hash,
      }
    } else {
      Target {
        hash: hash_file(&source)?.0,
        content: TargetContent::Copy(source),
      }
    };
    set.insert(key, target);
  }

  for archive in &data.archives {
    if archive.exploded {
      add_exploded(data, archive, &mut set)?;
    } else {
      add_compressed(data, archive, &mut set)?;
    }
  }

  Ok(set)
}

fn prefixed(dir: Option<&str>, name: &str) -> String {
  match dir {
    Some(dir) => convert_path(&format!("{dir}/{name}")),
    None => convert_path(name),
  }
}

fn add_exploded(data: &DeploymentData, archive_file: &ArchiveFile, set: &mut TargetSet) -> Result<(), DeployError> {
  let path = data.source_path(&archive_file.source);
  let mut zip = archive::open(&path)?;
  let dir = archive_file.destination_dir.as_deref();

  for entry in archive::entries(&mut zip, &path)? {
    let key = prefixed(dir, &entry.name);
    if entry.is_dir {
      set.insert(
        key,
        Target {
          content: TargetContent::Directory,
          hash: DIRECTORY_HASHCODE.to_string(),
        },
      );
      continue;
    }

    set.usage.add_file(entry.size);
    let realize = archive_file.realize.as_ref().is_some_and(|re| re.is_match(&entry.name));
    let target = if realize {
      let bytes = archive::read_entry(&mut zip, &path, &entry.raw_name)?;
      let text = data
        .templates
        .realize_bytes(&bytes, &key)
        .map_err(|source| DeployError::Template {
          path: key.clone(),
          source,
        })?;
      let hash = hash_bytes(text.as_bytes()).0;
      set.realized.insert(key.clone(), text.clone());
      Target {
        content: TargetContent::Bytes(text.into_bytes()),
        hash,
      }
    } else {
      Target {
        hash: archive::hash_entry(&mut zip, &path, &entry.raw_name)?,
        content: TargetContent::ArchiveEntry {
          archive: path.clone(),
          raw_name: entry.raw_name.clone(),
        },
      }
    };
    set.insert(key, target);
  }

  Ok(())
}

fn add_compressed(data: &DeploymentData, archive_file: &ArchiveFile, set: &mut TargetSet) -> Result<(), DeployError> {
  let path = data.source_path(&archive_file.source);
  let key = match archive_file.destination_dir.as_deref() {
    Some(dir) => {
      let file_name = Path::new(&archive_file.name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| archive_file.name.clone());
      prefixed(Some(dir), &file_name)
    }
    None => convert_path(&archive_file.name),
  };

  let target = match &archive_file.realize {
    Some(regex) => {
      let bytes = archive::rezip(&path, |entry, content| {
        if !regex.is_match(&entry.name) {
          return Ok(content);
        }
        let entry_key = format!("{key}/{}", entry.name);
        let text = data
          .templates
          .realize_bytes(&content, &entry_key)
          .map_err(|source| DeployError::Template {
            path: entry_key.clone(),
            source,
          })?;
        set.realized.insert(entry_key, text.clone());
        Ok(text.into_bytes())
      })?;
      set.usage.add_file(bytes.len() as u64);
      Target {
        hash: hash_bytes(&bytes).0,
        content: TargetContent::Bytes(bytes),
      }
    }
    None => {
      let size = fs::metadata(&path).map_err(|e| DeployError::io(&path, e))?.len();
      set.usage.add_file(size);
      Target {
        hash: hash_file(&path)?.0,
        content: TargetContent::Copy(path),
      }
    }
  };
  set.insert(key, target);
  Ok(())
}
