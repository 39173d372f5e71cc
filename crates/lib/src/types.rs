//! Small value types shared by the recipe, metadata and deploy layers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Policy governing foreign content under a destination root.
///
/// - `Full`: the destination root is owned by the bundle. Anything found there that the bundle did
///   not put there is backed up and removed.
/// - `FilesAndDirectories`: top-level files and directories the bundle does not deploy are left
///   intact; the top-level subdirectories it does deploy into are made compliant with the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DestinationCompliance {
  #[serde(rename = "full")]
  Full,
  #[serde(rename = "filesAndDirectories")]
  FilesAndDirectories,
}

impl DestinationCompliance {
  /// Translate the legacy `manageRootDir` flag.
  pub fn from_manage_root_dir(manage_root_dir: bool) -> Self {
    if manage_root_dir {
      DestinationCompliance::Full
    } else {
      DestinationCompliance::FilesAndDirectories
    }
  }

  /// Whether files found directly in the destination root are managed.
  pub fn manages_root_dir(self) -> bool {
    matches!(self, DestinationCompliance::Full)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      DestinationCompliance::Full => "full",
      DestinationCompliance::FilesAndDirectories => "filesAndDirectories",
    }
  }
}

impl fmt::Display for DestinationCompliance {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for DestinationCompliance {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "full" => Ok(DestinationCompliance::Full),
      "filesAndDirectories" => Ok(DestinationCompliance::FilesAndDirectories),
      other => Err(format!(
        "unknown compliance mode '{other}', expected 'full' or 'filesAndDirectories'"
      )),
    }
  }
}

/// Which lifecycle step a deployment invocation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeploymentPhase {
  /// First deployment into a destination directory.
  Install,
  /// Deployment over a destination directory that already holds a deployment.
  Upgrade,
}

impl DeploymentPhase {
  pub fn as_str(self) -> &'static str {
    match self {
      DeploymentPhase::Install => "INSTALL",
      DeploymentPhase::Upgrade => "UPGRADE",
    }
  }
}

impl fmt::Display for DeploymentPhase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for DeploymentPhase {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_uppercase().as_str() {
      "INSTALL" => Ok(DeploymentPhase::Install),
      "UPGRADE" => Ok(DeploymentPhase::Upgrade),
      _ => Err(format!("unknown deployment phase '{s}', expected INSTALL or UPGRADE")),
    }
  }
}
