//! Status command implementation.
//!
//! Displays the deployment recorded in a destination directory.

use std::path::Path;

use anyhow::{Context, Result};

use deployer_lib::manifest::key_to_path;
use deployer_lib::metadata::DeploymentsMetadata;

use crate::cmd::deploy::absolute;
use crate::output::{
  OutputFormat, format_bytes, format_timestamp, print_info, print_json, print_stat, print_success, symbols,
  truncate_hash,
};

pub fn cmd_status(deploy_dir: &Path, verbose: bool, output: OutputFormat) -> Result<()> {
  let deploy_dir = absolute(deploy_dir)?;
  let metadata = DeploymentsMetadata::new(&deploy_dir);

  if !metadata.is_managed() {
    if output.is_json() {
      return print_json(&serde_json::json!({ "deploy_dir": deploy_dir, "managed": false }));
    }
    print_info(&format!("No deployment recorded in {}", deploy_dir.display()));
    return Ok(());
  }

  let current = metadata
    .current_deployment_properties()
    .context("Failed to read the current deployment")?;
  let previous = metadata
    .previous_deployment_properties()
    .context("Failed to read the previous deployment")?;
  let manifest = metadata
    .current_file_hashcodes()
    .context("Failed to read the deployment manifest")?;
  let ids = metadata.deployment_ids().context("Failed to list deployments")?;

  let size: u64 = manifest
    .keys()
    .filter_map(|key| std::fs::metadata(key_to_path(&deploy_dir, key)).ok())
    .map(|m| m.len())
    .sum();

  if output.is_json() {
    let json_output = serde_json::json!({
      "deploy_dir": deploy_dir,
      "managed": true,
      "current": current,
      "previous": previous,
      "deployments": ids,
      "files": manifest,
      "size_bytes": size,
    });
    return print_json(&json_output);
  }

  print_success(&format!(
    "{} {} (deployment {})",
    current.bundle_name, current.bundle_version, current.deployment_id
  ));
  print_stat("Destination", &deploy_dir.display().to_string());
  print_stat("Compliance", current.compliance.as_str());
  print_stat("Deployed", &format_timestamp(current.deployed_at));
  if let Some(previous) = &previous {
    print_stat(
      "Previous",
      &format!(
        "{} {} (deployment {})",
        previous.bundle_name, previous.bundle_version, previous.deployment_id
      ),
    );
  }
  print_stat("Files", &manifest.len().to_string());
  print_stat("Size", &format_bytes(size));

  if verbose {
    println!();
    for (path, hash) in manifest.iter() {
      println!("  {} {} {}", symbols::INFO, truncate_hash(hash), path);
    }
  }

  Ok(())
}
