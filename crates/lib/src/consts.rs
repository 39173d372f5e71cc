//! Well-known names shared across the crate.

/// Hidden directory, directly under a destination root, holding deployment metadata.
pub const METADATA_DIR: &str = ".rhqdeployments";

/// Recipe file name looked up inside a packaged (zip) bundle.
pub const DEFAULT_RECIPE_NAME: &str = "deploy.xml";

/// Absolute path of the destination directory.
pub const DEPLOY_DIR: &str = "rhq.deploy.dir";

/// Numeric deployment id.
pub const DEPLOY_ID: &str = "rhq.deploy.id";

/// `INSTALL` or `UPGRADE`.
pub const DEPLOY_PHASE: &str = "rhq.deploy.phase";

/// Human readable name of the deployment.
pub const DEPLOY_NAME: &str = "rhq.deploy.name";

pub const DEPLOY_REVERT: &str = "rhq.deploy.revert";

pub const DEPLOY_CLEAN: &str = "rhq.deploy.clean";

pub const DEPLOY_DRY_RUN: &str = "rhq.deploy.dryrun";

/// Path or URL of a properties file merged into the configuration.
pub const DEPLOY_PROPERTIES_FILE: &str = "rhq.deploy.propertiesFile";

/// Prefix of tag properties (`rhq.tag.[namespace.]semantic`).
pub const DEPLOY_TAG_PREFIX: &str = "rhq.tag.";

pub const BUNDLE_NAME: &str = "rhq.bundle.name";

pub const BUNDLE_VERSION: &str = "rhq.bundle.version";

pub const SYSTEM_OS_NAME: &str = "rhq.system.os.name";

pub const SYSTEM_ARCHITECTURE: &str = "rhq.system.architecture";
