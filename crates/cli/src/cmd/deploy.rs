//! Implementation of the `deployer deploy` and `deployer plan` commands.
//!
//! Picks the deployment id and phase from what the destination already records,
//! runs the bundle launcher and prints the resulting differences.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::info;

use deployer_lib::consts::DEPLOY_NAME;
use deployer_lib::events::RecordingSink;
use deployer_lib::metadata::DeploymentsMetadata;
use deployer_lib::project::{BundleLauncher, InputProperties};
use deployer_lib::types::DeploymentPhase;

use crate::DeployArgs;
use crate::handover::DirectoryHandoverTarget;
use crate::output::{format_duration, print_differences, print_info, print_json, print_stat, print_success, print_warning};

/// Absolute form of `path`, canonical when it exists.
pub(crate) fn absolute(path: &Path) -> Result<PathBuf> {
  if path.exists() {
    return dunce::canonicalize(path).with_context(|| format!("Failed to resolve {}", path.display()));
  }
  if path.is_absolute() {
    return Ok(path.to_path_buf());
  }
  let cwd = std::env::current_dir().context("Failed to read current directory")?;
  Ok(cwd.join(path))
}

pub fn cmd_deploy(args: DeployArgs, verbose: bool) -> Result<()> {
  let start = Instant::now();
  let recipe = absolute(&args.recipe)?;
  let deploy_dir = absolute(&args.deploy_dir)?;

  let metadata = DeploymentsMetadata::new(&deploy_dir);
  let (phase, current_id) = if metadata.is_managed() {
    let id = metadata
      .current_deployment_id()
      .with_context(|| format!("Failed to read deployment metadata in {}", deploy_dir.display()))?;
    (DeploymentPhase::Upgrade, id)
  } else {
    (DeploymentPhase::Install, 0)
  };
  let deploy_id = args.deploy_id.unwrap_or(current_id + 1);

  let mut inputs = InputProperties::new(&deploy_dir, deploy_id, phase)
    .dry_run(args.dry_run)
    .revert(args.revert)
    .clean(args.clean);
  if let Some(name) = &args.name {
    inputs.set(DEPLOY_NAME, name);
  }
  if let Some(location) = &args.properties_file {
    inputs = inputs.properties_file(location);
  }
  for (key, value) in &args.define {
    inputs.set(key, value);
  }

  let mut launcher = BundleLauncher::new();
  if let Some(dir) = &args.bundle_dir {
    launcher = launcher.with_bundle_dir(absolute(dir)?);
  }
  match &args.handover_dir {
    Some(dir) => launcher = launcher.with_handover_target(Box::new(DirectoryHandoverTarget::new(absolute(dir)?))),
    None => info!("no handover directory given, handover directives will be skipped"),
  }

  let sink = RecordingSink::new();
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let project = rt
    .block_on(launcher.execute(&recipe, &inputs, vec![Box::new(sink.clone())]))
    .with_context(|| format!("Deployment of {} failed", recipe.display()))?;

  if args.format.is_json() {
    let output = serde_json::json!({
      "bundle": project.bundle_name,
      "version": project.bundle_version,
      "deploy_dir": deploy_dir,
      "deploy_id": deploy_id,
      "phase": phase,
      "dry_run": project.dry_run,
      "tags": project.tags(),
      "differences": project.deploy_differences,
      "handovers": {
        "accepted": project.handovers.accepted,
        "rejected": project.handovers.rejected,
      },
      "events": sink.events(),
    });
    return print_json(&output);
  }

  println!();
  let summary = format!(
    "{} {} to {} (deployment {deploy_id}, {phase})",
    project.bundle_name,
    project.bundle_version,
    deploy_dir.display()
  );
  if project.dry_run {
    print_info(&format!("Dry run - no changes made. Would deploy {summary}"));
  } else if project.deploy_differences.is_noop() {
    print_success(&format!("Up to date: {summary}"));
  } else {
    print_success(&format!("Deployed {summary}"));
  }
  print_differences(&project.deploy_differences, verbose);

  if project.handovers.attempted() > 0 {
    print_stat("Handovers accepted", &project.handovers.accepted.len().to_string());
  }
  for rejected in &project.handovers.rejected {
    print_warning(&format!("Handover of {rejected} was rejected"));
  }
  print_stat("Duration", &format_duration(start.elapsed()));

  Ok(())
}
