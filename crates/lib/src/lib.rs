//! deployer-lib: bundle deployment engine
//!
//! Deploys versioned bundles (files and zip archives described by an XML recipe)
//! into destination directories, tracking what it wrote so later deployments can
//! upgrade, revert or purge it safely:
//! - `recipe`: parsing and validating `deploy.xml`
//! - `project`: driving a deployment from a recipe and invocation properties
//! - `deploy`: diffing a bundle against a destination and applying the result
//! - `metadata`: per-destination record of deployments, manifests and backups
//! - `handover`: passing content to an external installer instead of writing it

pub mod config;
pub mod consts;
pub mod deploy;
pub mod events;
pub mod handover;
pub mod locator;
pub mod manifest;
pub mod metadata;
pub mod project;
pub mod purge;
pub mod recipe;
pub mod template;
pub mod types;
pub mod util;
