//! Implementation of the `deployer purge` command.
//!
//! Removes everything the current deployment put into a destination directory,
//! along with the deployment metadata.

use std::path::Path;

use anyhow::{Context, Result};

use deployer_lib::purge::purge_bundle;

use crate::cmd::deploy::absolute;
use crate::output::{OutputFormat, print_info, print_json, print_stat, print_success, print_warning};
use crate::prompts::PurgeConfirmation;

pub fn cmd_purge(deploy_dir: &Path, force: bool, output: OutputFormat) -> Result<()> {
  let deploy_dir = absolute(deploy_dir)?;

  if !PurgeConfirmation::new(&deploy_dir, force).ask()? {
    print_info("Purge cancelled");
    return Ok(());
  }

  let report = purge_bundle(&deploy_dir).with_context(|| format!("Failed to purge {}", deploy_dir.display()))?;

  if output.is_json() {
    return print_json(&report);
  }

  if !report.managed {
    print_info(&format!("No deployment recorded in {}, nothing to purge", deploy_dir.display()));
    return Ok(());
  }

  print_success("Purge complete!");
  print_stat("Entries removed", &report.removed.len().to_string());
  if !report.external_deleted.is_empty() {
    print_stat("External files removed", &report.external_deleted.len().to_string());
  }
  if report.destination_purged {
    print_stat("Destination removed", &deploy_dir.display().to_string());
  }
  for (path, reason) in &report.external_failed {
    print_warning(&format!("Could not remove {path}: {reason}"));
  }

  Ok(())
}
