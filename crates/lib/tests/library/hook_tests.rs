//! Pre- and post-install hook targets and the audit trail around them.

use deployer_lib::events::AuditStatus;
use deployer_lib::project::ProjectError;
use deployer_lib::types::DeploymentPhase;

use super::common::{TestBundle, recipe};

fn hooked_bundle(unit_attrs: &str) -> TestBundle {
  let bundle = TestBundle::new();
  bundle.write_file("app.conf", "conf");
  bundle.write_recipe(&recipe("1.0", unit_attrs, r#"<rhq:file name="app.conf"/>"#));
  bundle
}

#[tokio::test]
async fn preinstall_target_sets_project_property() {
  let bundle = hooked_bundle(r#"compliance="full" preinstallTarget="pre" postinstallTarget="post""#);

  let (result, sink) = bundle.deploy(&bundle.inputs(1, DeploymentPhase::Install)).await;
  let project = result.unwrap();

  assert_eq!(project.property("preinstallTargetExecuted"), Some("true"));
  assert_eq!(project.property("postinstallTargetExecuted"), Some("true"));

  let echo = sink.actions("Echo");
  assert_eq!(echo.len(), 1);
  assert_eq!(echo[0].info, format!("deploying to {}", bundle.deploy_dir().display()));
}

#[tokio::test]
async fn audit_trail_runs_in_order() {
  let bundle = hooked_bundle(r#"compliance="full" preinstallTarget="pre" postinstallTarget="post""#);

  let (result, sink) = bundle.deploy(&bundle.inputs(1, DeploymentPhase::Install)).await;
  result.unwrap();

  let actions: Vec<String> = sink
    .events()
    .into_iter()
    .map(|e| e.action)
    .filter(|a| a != "Echo" && a != "Directive")
    .collect();
  assert_eq!(
    actions,
    vec![
      "Pre-Install Started",
      "Pre-Install Finished",
      "Managing Top Level Deployment Directory",
      "Deployer Started",
      "Deployer Finished",
      "Post-Install Started",
      "Post-Install Finished",
    ]
  );

  let finished = &sink.actions("Deployer Finished")[0];
  assert_eq!(finished.status, AuditStatus::Success);
  assert!(finished.details.as_deref().unwrap_or_default().contains("app.conf"));
  assert_eq!(sink.actions("Directive").len(), 1);
}

#[tokio::test]
async fn dry_run_skips_deployer_messages() {
  let bundle = hooked_bundle(r#"compliance="full" preinstallTarget="pre""#);

  let (result, sink) = bundle
    .deploy(&bundle.inputs(1, DeploymentPhase::Install).dry_run(true))
    .await;
  let project = result.unwrap();

  assert_eq!(project.property("preinstallTargetExecuted"), Some("true"));
  assert!(sink.actions("Managing Top Level Deployment Directory").is_empty());
  assert!(sink.actions("Deployer Started").is_empty());
  assert!(sink.actions("Deployer Finished").is_empty());
}

#[tokio::test]
async fn unknown_hook_target_is_a_validation_error() {
  let bundle = hooked_bundle(r#"compliance="full" preinstallTarget="missing""#);

  let err = bundle
    .deploy(&bundle.inputs(1, DeploymentPhase::Install))
    .await
    .0
    .unwrap_err();
  assert!(matches!(err, ProjectError::Validation(_)), "{err}");
  assert!(!bundle.deploy_dir().exists());
}
