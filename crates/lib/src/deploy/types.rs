use std::io;
use std::path::PathBuf;

use regex::Regex;
use thiserror::Error;

use crate::manifest::ManifestError;
use crate::metadata::{DeploymentProperties, MetadataError};
use crate::template::{TemplateEngine, TemplateError};
use crate::util::hash::HashError;

/// Errors computing or applying a deployment.
#[derive(Debug, Error)]
pub enum DeployError {
  #[error("failed to realize {path}: {source}")]
  Template {
    path: String,
    #[source]
    source: TemplateError,
  },

  #[error("bad archive {path}: {message}")]
  Archive { path: String, message: String },

  #[error(
    "not enough disk space for this deployment: estimated usage [{required}] bytes is larger than usable space [{usable}] bytes"
  )]
  InsufficientDiskSpace { required: u64, usable: u64 },

  #[error("I/O error on {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error(transparent)]
  Metadata(#[from] MetadataError),

  #[error(transparent)]
  Hash(#[from] HashError),
}

impl DeployError {
  pub(crate) fn io(path: &std::path::Path, source: io::Error) -> Self {
    DeployError::Io {
      path: path.display().to_string(),
      source,
    }
  }
}

/// A standalone file to deploy.
#[derive(Debug, Clone)]
pub struct RawFile {
  /// Local copy of the content, relative to the source directory or absolute.
  pub source: PathBuf,
  /// Destination relative to the destination directory, or absolute.
  pub destination: String,
  /// Realize `@@token@@` placeholders in the content.
  pub realize: bool,
}

/// A zip archive to deploy.
#[derive(Debug, Clone)]
pub struct ArchiveFile {
  /// Local copy of the archive, relative to the source directory or absolute.
  pub source: PathBuf,
  /// Bundle-relative (or logical) name of the archive.
  pub name: String,
  /// Directory the archive (or its entries) is deployed under.
  pub destination_dir: Option<String>,
  pub exploded: bool,
  /// Entries whose names match are realized.
  pub realize: Option<Regex>,
}

/// Everything the deployer needs for one deployment unit.
#[derive(Debug, Clone)]
pub struct DeploymentData {
  pub properties: DeploymentProperties,
  /// Directory relative sources are resolved against.
  pub source_dir: PathBuf,
  pub destination_dir: PathBuf,
  pub raw_files: Vec<RawFile>,
  pub archives: Vec<ArchiveFile>,
  pub templates: TemplateEngine,
  /// Destination paths that are never backed up, overwritten or removed.
  pub ignore: Option<Regex>,
}

impl DeploymentData {
  pub fn new(properties: DeploymentProperties, source_dir: impl Into<PathBuf>, destination_dir: impl Into<PathBuf>) -> Self {
    Self {
      properties,
      source_dir: source_dir.into(),
      destination_dir: destination_dir.into(),
      raw_files: Vec::new(),
      archives: Vec::new(),
      templates: TemplateEngine::default(),
      ignore: None,
    }
  }

  pub(crate) fn source_path(&self, source: &std::path::Path) -> PathBuf {
    self.source_dir.join(source)
  }
}
