//! Deployment manifests.
//!
//! A manifest records, for one destination directory, every file the engine
//! wrote there together with the SHA-256 of its content. Comparing a recorded
//! manifest with a rescan of the disk tells the deployer what the user touched
//! since the last deployment.

mod rescan;
mod types;

pub use rescan::ChangesFileHashcodeMap;
pub use types::*;
