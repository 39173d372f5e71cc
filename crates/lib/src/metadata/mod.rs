//! Per-destination deployment metadata.
//!
//! Every managed destination directory carries a hidden metadata directory
//! recording which deployment is current, the manifest of that deployment
//! and the files backed up while applying it.

mod storage;
mod types;

pub use storage::DeploymentsMetadata;
pub use types::*;
