//! Zip archive helpers.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use regex::Regex;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::template::TemplateEngine;

use super::types::DeployError;

pub(crate) type Archive = ZipArchive<BufReader<File>>;

fn archive_err(path: &Path, message: impl Into<String>) -> DeployError {
  DeployError::Archive {
    path: path.display().to_string(),
    message: message.into(),
  }
}

pub(crate) fn open(path: &Path) -> Result<Archive, DeployError> {
  let file = File::open(path).map_err(|e| DeployError::io(path, e))?;
  ZipArchive::new(BufReader::new(file)).map_err(|e| archive_err(path, format!("failed to open zip: {e}")))
}

/// One entry of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EntryInfo {
  /// Name as stored in the archive.
  pub raw_name: String,
  /// Normalized relative path.
  pub name: String,
  pub is_dir: bool,
  pub size: u64,
}

/// Entries of an archive in stored order.
///
/// Entries escaping the archive root (`..`, absolute names) are rejected.
pub(crate) fn entries(archive: &mut Archive, path: &Path) -> Result<Vec<EntryInfo>, DeployError> {
  let mut entries = Vec::with_capacity(archive.len());
  for i in 0..archive.len() {
    let entry = archive
      .by_index(i)
      .map_err(|e| archive_err(path, format!("failed to read zip entry: {e}")))?;
    let enclosed: Option<PathBuf> = entry.enclosed_name();
    if enclosed.is_none() {
      return Err(archive_err(path, format!("invalid zip entry name '{}'", entry.name())));
    }
    let name = crate::manifest::convert_path(entry.name());
    if name.is_empty() {
      continue;
    }
    entries.push(EntryInfo {
      raw_name: entry.name().to_string(),
      name,
      is_dir: entry.is_dir(),
      size: entry.size(),
    });
  }
  Ok(entries)
}

/// Read a whole entry.
pub(crate) fn read_entry(archive: &mut Archive, path: &Path, raw_name: &str) -> Result<Vec<u8>, DeployError> {
  let mut entry = archive
    .by_name(raw_name)
    .map_err(|e| archive_err(path, format!("failed to read entry '{raw_name}': {e}")))?;
  let mut content = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
  entry
    .read_to_end(&mut content)
    .map_err(|e| archive_err(path, format!("failed to read entry '{raw_name}': {e}")))?;
  Ok(content)
}

/// Hash an entry without buffering it.
pub(crate) fn hash_entry(archive: &mut Archive, path: &Path, raw_name: &str) -> Result<String, DeployError> {
  let entry = archive
    .by_name(raw_name)
    .map_err(|e| archive_err(path, format!("failed to read entry '{raw_name}': {e}")))?;
  crate::util::hash::hash_reader(entry)
    .map(String::from)
    .map_err(|e| archive_err(path, format!("failed to read entry '{raw_name}': {e}")))
}

/// Stream an entry into `writer`, returning its hash.
pub(crate) fn copy_entry(
  archive: &mut Archive,
  path: &Path,
  raw_name: &str,
  writer: impl Write,
) -> Result<String, DeployError> {
  let entry = archive
    .by_name(raw_name)
    .map_err(|e| archive_err(path, format!("failed to read entry '{raw_name}': {e}")))?;
  crate::util::hash::copy_and_hash(entry, writer)
    .map(String::from)
    .map_err(|e| archive_err(path, format!("failed to extract entry '{raw_name}': {e}")))
}

/// Rebuild an archive in memory, passing every file entry through `transform`.
///
/// Entries are written in name order with a fixed timestamp, so the same input
/// always produces the same bytes.
pub(crate) fn rezip(
  path: &Path,
  mut transform: impl FnMut(&EntryInfo, Vec<u8>) -> Result<Vec<u8>, DeployError>,
) -> Result<Vec<u8>, DeployError> {
  let mut archive = open(path)?;
  let mut contents: BTreeMap<String, Option<Vec<u8>>> = BTreeMap::new();
  for info in entries(&mut archive, path)? {
    if info.is_dir {
      contents.insert(info.raw_name.clone(), None);
      continue;
    }
    let content = read_entry(&mut archive, path, &info.raw_name)?;
    let content = transform(&info, content)?;
    contents.insert(info.raw_name.clone(), Some(content));
  }

  let options = SimpleFileOptions::default()
    .compression_method(CompressionMethod::Deflated)
    .last_modified_time(DateTime::default());
  let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
  let write_err = |e: &dyn std::fmt::Display| archive_err(path, format!("failed to rebuild archive: {e}"));

  for (name, content) in contents {
    match content {
      None => writer.add_directory(name, options).map_err(|e| write_err(&e))?,
      Some(content) => {
        writer.start_file(name, options).map_err(|e| write_err(&e))?;
        writer.write_all(&content).map_err(|e| write_err(&e))?;
      }
    }
  }

  let cursor = writer.finish().map_err(|e| write_err(&e))?;
  Ok(cursor.into_inner())
}

/// Rebuild an archive with the entries matching `realize` realized.
pub fn realize_archive(path: &Path, realize: &Regex, templates: &TemplateEngine) -> Result<Vec<u8>, DeployError> {
  rezip(path, |entry, content| {
    if !realize.is_match(&entry.name) {
      return Ok(content);
    }
    templates
      .realize_bytes(&content, &entry.name)
      .map(String::into_bytes)
      .map_err(|source| DeployError::Template {
        path: format!("{}/{}", path.display(), entry.name),
        source,
      })
  })
}
