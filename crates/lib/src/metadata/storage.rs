//! Deployment metadata storage.
//!
//! # Storage Layout
//!
//! ```text
//! {destination}/.rhqdeployments/
//! ├── current-deployment.json     # pointer to the current deployment id
//! ├── previous-deployment.json    # pointer to the deployment it replaced
//! └── <id>/
//!     ├── deployment.json         # DeploymentProperties
//!     ├── file-hashcodes.json     # FileHashcodeMap
//!     ├── backup/                 # backed up files relative to the destination
//!     └── ext-backup/             # backed up files outside the destination
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::consts::METADATA_DIR;
use crate::manifest::FileHashcodeMap;

use super::types::{DeploymentPointer, DeploymentProperties, MetadataError};

const CURRENT_DEPLOYMENT_FILE: &str = "current-deployment.json";
const PREVIOUS_DEPLOYMENT_FILE: &str = "previous-deployment.json";
const DEPLOYMENT_FILE: &str = "deployment.json";
const HASHCODES_FILE: &str = "file-hashcodes.json";
const BACKUP_DIR: &str = "backup";
const EXTERNAL_BACKUP_DIR: &str = "ext-backup";

/// Metadata of the deployments made into one destination directory.
#[derive(Debug, Clone)]
pub struct DeploymentsMetadata {
  root: PathBuf,
}

impl DeploymentsMetadata {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// The destination directory.
  pub fn root_dir(&self) -> &Path {
    &self.root
  }

  pub fn metadata_dir(&self) -> PathBuf {
    self.root.join(METADATA_DIR)
  }

  fn deployment_dir(&self, id: u64) -> PathBuf {
    self.metadata_dir().join(id.to_string())
  }

  /// Where files relative to the destination are backed up during deployment `id`.
  pub fn backup_dir(&self, id: u64) -> PathBuf {
    self.deployment_dir(id).join(BACKUP_DIR)
  }

  /// Where files outside the destination are backed up during deployment `id`.
  pub fn external_backup_dir(&self, id: u64) -> PathBuf {
    self.deployment_dir(id).join(EXTERNAL_BACKUP_DIR)
  }

  /// Whether a deployment has been recorded for this directory.
  pub fn is_managed(&self) -> bool {
    self.metadata_dir().join(CURRENT_DEPLOYMENT_FILE).is_file()
  }

  pub fn current_deployment_id(&self) -> Result<u64, MetadataError> {
    let path = self.metadata_dir().join(CURRENT_DEPLOYMENT_FILE);
    match read_json::<DeploymentPointer>(&path)? {
      Some(pointer) => Ok(pointer.deployment_id),
      None => Err(MetadataError::NotFound(format!(
        "current deployment of {}",
        self.root.display()
      ))),
    }
  }

  pub fn current_deployment_properties(&self) -> Result<DeploymentProperties, MetadataError> {
    let id = self.current_deployment_id()?;
    self.deployment_properties(id)
  }

  /// Manifest of the current deployment.
  pub fn current_file_hashcodes(&self) -> Result<FileHashcodeMap, MetadataError> {
    let id = self.current_deployment_id()?;
    self.file_hashcodes(id)
  }

  /// Properties of the deployment the current one replaced, if any.
  pub fn previous_deployment_properties(&self) -> Result<Option<DeploymentProperties>, MetadataError> {
    let path = self.metadata_dir().join(PREVIOUS_DEPLOYMENT_FILE);
    match read_json::<DeploymentPointer>(&path)? {
      Some(pointer) => self.deployment_properties(pointer.deployment_id).map(Some),
      None => Ok(None),
    }
  }

  pub fn deployment_properties(&self, id: u64) -> Result<DeploymentProperties, MetadataError> {
    let path = self.deployment_dir(id).join(DEPLOYMENT_FILE);
    read_json(&path)?.ok_or_else(|| MetadataError::NotFound(format!("properties of deployment {id}")))
  }

  pub fn file_hashcodes(&self, id: u64) -> Result<FileHashcodeMap, MetadataError> {
    let path = self.deployment_dir(id).join(HASHCODES_FILE);
    read_json(&path)?.ok_or_else(|| MetadataError::NotFound(format!("file hashcodes of deployment {id}")))
  }

  /// Ids of every deployment with recorded properties, ascending.
  pub fn deployment_ids(&self) -> Result<Vec<u64>, MetadataError> {
    let dir = self.metadata_dir();
    let entries = match fs::read_dir(&dir) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(source) => {
        return Err(MetadataError::Read {
          path: dir.display().to_string(),
          source,
        });
      }
    };

    let mut ids: Vec<u64> = entries
      .filter_map(Result::ok)
      .filter_map(|entry| entry.file_name().to_str().and_then(|name| name.parse().ok()))
      .filter(|id| self.deployment_dir(*id).join(DEPLOYMENT_FILE).is_file())
      .collect();
    ids.sort_unstable();
    Ok(ids)
  }

  /// Record `properties` and `hashcodes` and make that deployment current.
  ///
  /// With `rotate_previous`, the deployment that was current becomes the previous one.
  /// Directory entries are never persisted.
  pub fn set_current_deployment(
    &self,
    properties: &DeploymentProperties,
    hashcodes: &FileHashcodeMap,
    rotate_previous: bool,
  ) -> Result<(), MetadataError> {
    let id = properties.deployment_id;
    let dir = self.deployment_dir(id);
    ensure_dir(&dir)?;

    write_json_atomic(&dir.join(DEPLOYMENT_FILE), properties)?;
    write_json_atomic(&dir.join(HASHCODES_FILE), &hashcodes.without_directories())?;

    if rotate_previous && self.is_managed() {
      let current = self.current_deployment_id()?;
      if current != id {
        write_json_atomic(
          &self.metadata_dir().join(PREVIOUS_DEPLOYMENT_FILE),
          &DeploymentPointer { deployment_id: current },
        )?;
      }
    }

    write_json_atomic(
      &self.metadata_dir().join(CURRENT_DEPLOYMENT_FILE),
      &DeploymentPointer { deployment_id: id },
    )?;

    debug!(deploy_id = id, dir = %self.root.display(), entries = hashcodes.len(), "recorded current deployment");
    Ok(())
  }
}

fn ensure_dir(dir: &Path) -> Result<(), MetadataError> {
  fs::create_dir_all(dir).map_err(|source| MetadataError::CreateDir {
    path: dir.display().to_string(),
    source,
  })
}

/// Read a JSON file, `Ok(None)` if it does not exist.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, MetadataError> {
  let content = match fs::read_to_string(path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(source) => {
      return Err(MetadataError::Read {
        path: path.display().to_string(),
        source,
      });
    }
  };

  serde_json::from_str(&content).map(Some).map_err(|source| MetadataError::Parse {
    path: path.display().to_string(),
    source,
  })
}

/// Write JSON to a temp file next to `path`, then rename over it.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), MetadataError> {
  let content = serde_json::to_string_pretty(value).map_err(MetadataError::Serialize)?;
  let temp_path = path.with_extension("json.tmp");

  let write_err = |source| MetadataError::Write {
    path: path.display().to_string(),
    source,
  };
  fs::write(&temp_path, &content).map_err(write_err)?;
  fs::rename(&temp_path, path).map_err(write_err)?;
  Ok(())
}
