use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::DestinationCompliance;

/// Errors reading or writing deployment metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
  #[error("no {0} recorded")]
  NotFound(String),

  #[error("failed to read {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to create directory {path}: {source}")]
  CreateDir {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize metadata: {0}")]
  Serialize(#[source] serde_json::Error),
}

/// Identity of one deployment into a destination directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentProperties {
  pub deployment_id: u64,
  pub bundle_name: String,
  pub bundle_version: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub compliance: DestinationCompliance,
  /// Seconds since the Unix epoch.
  #[serde(default)]
  pub deployed_at: u64,
}

impl DeploymentProperties {
  pub fn new(
    deployment_id: u64,
    bundle_name: impl Into<String>,
    bundle_version: impl Into<String>,
    compliance: DestinationCompliance,
  ) -> Self {
    Self {
      deployment_id,
      bundle_name: bundle_name.into(),
      bundle_version: bundle_version.into(),
      description: None,
      compliance,
      deployed_at: now_secs(),
    }
  }

  pub fn with_description(mut self, description: Option<String>) -> Self {
    self.description = description;
    self
  }
}

/// Contents of `current-deployment.json` and `previous-deployment.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct DeploymentPointer {
  pub deployment_id: u64,
}

fn now_secs() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or(0)
}
