//! Deployment differ and applier.
//!
//! A deployment runs in phases:
//!
//! 1. **Computing the target set**: every raw file and archive is resolved to its
//!    manifest key and content hash, realizing templates on the way.
//! 2. **Diffing**: the target set is compared with the recorded manifest and with
//!    what is on disk, honoring the destination compliance mode.
//! 3. **Applying**: backups, deletions and writes. Skipped on a dry run.
//!
//! The new manifest is recorded only after applying succeeds.

mod archive;
mod deployer;
mod diff;
mod disk;
mod targets;
mod types;

pub use archive::realize_archive;
pub use deployer::Deployer;
pub use diff::DeployDifferences;
pub use disk::{DiskUsage, usable_space};
pub use types::{ArchiveFile, DeployError, DeploymentData, RawFile};
