//! Test utilities for deployer-lib.
//!
//! Helpers for building bundle content (files and zip archives) in temporary directories.

use std::fs;
use std::io::Write;
use std::path::Path;

use zip::write::SimpleFileOptions;

/// Write `content` to `root/relative`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, content: &str) {
  let path = root.join(relative);
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  fs::write(&path, content).unwrap();
}

/// Create a zip archive at `path` holding the given `(entry name, content)` pairs.
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  let file = fs::File::create(path).unwrap();
  let mut writer = zip::ZipWriter::new(file);
  for (name, content) in entries {
    writer.start_file(*name, SimpleFileOptions::default()).unwrap();
    writer.write_all(content.as_bytes()).unwrap();
  }
  writer.finish().unwrap();
}

/// Read a single entry of a zip archive as a string.
pub fn read_zip_entry(path: &Path, name: &str) -> String {
  let file = fs::File::open(path).unwrap();
  let mut archive = zip::ZipArchive::new(file).unwrap();
  let mut entry = archive.by_name(name).unwrap();
  let mut content = String::new();
  std::io::Read::read_to_string(&mut entry, &mut content).unwrap();
  content
}
