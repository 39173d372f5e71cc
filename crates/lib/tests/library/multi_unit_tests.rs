//! Bundles with more than one deployment unit.

use deployer_lib::metadata::DeploymentsMetadata;
use deployer_lib::project::ProjectError;
use deployer_lib::types::DeploymentPhase;

use super::common::TestBundle;

fn units_recipe(units: &str) -> String {
  format!(
    r#"<project name="multi" default="main" xmlns:rhq="antlib:org.rhq.bundle">
  <rhq:bundle name="multi-bundle" version="1.0">
    <rhq:input-property name="listener.port" type="integer" required="false"/>
    {units}
  </rhq:bundle>
  <target name="main"/>
  <target name="pre"><property name="preinstallTargetExecuted" value="true"/></target>
</project>"#
  )
}

fn two_units(second_body: &str) -> TestBundle {
  let bundle = TestBundle::new();
  bundle.write_file("a.txt", "a");
  bundle.write_file("b.txt", "b");
  bundle.write_recipe(&units_recipe(&format!(
    r#"<rhq:deployment-unit name="one" dir="one" compliance="full" preinstallTarget="pre">
         <rhq:file name="a.txt"/>
       </rhq:deployment-unit>
       <rhq:deployment-unit name="two" dir="two" compliance="filesAndDirectories">
         {second_body}
       </rhq:deployment-unit>"#
  )));
  bundle
}

#[tokio::test]
async fn sibling_units_redeploy_without_writing() {
  let bundle = two_units(r#"<rhq:file name="b.txt"/>"#);
  bundle
    .deploy(&bundle.inputs(1, DeploymentPhase::Install))
    .await
    .0
    .unwrap();
  assert_eq!(bundle.read_deployed("one/a.txt"), "a");
  assert_eq!(bundle.read_deployed("two/b.txt"), "b");

  let project = bundle
    .deploy(&bundle.inputs(2, DeploymentPhase::Upgrade))
    .await
    .0
    .unwrap();

  let diff = &project.deploy_differences;
  assert!(diff.written.is_empty(), "{diff}");
  assert!(diff.deleted.is_empty(), "{diff}");
  assert!(diff.backed_up.is_empty(), "{diff}");
  assert_eq!(project.manifests.len(), 2);
  for (dir, file) in [("one", "a.txt"), ("two", "b.txt")] {
    let manifest = DeploymentsMetadata::new(bundle.deployed_path(dir))
      .current_file_hashcodes()
      .unwrap();
    assert!(manifest.get(file).is_some(), "{dir} does not record {file}");
  }
}

#[tokio::test]
async fn missing_content_in_a_later_unit_writes_nothing() {
  let bundle = two_units(r#"<rhq:file name="missing.txt"/>"#);

  let (result, sink) = bundle.deploy(&bundle.inputs(1, DeploymentPhase::Install)).await;

  match result {
    Err(ProjectError::ContentResolution { directive, .. }) => assert!(directive.contains("missing.txt"), "{directive}"),
    other => panic!("expected a content resolution error, got {other:?}"),
  }
  assert!(!bundle.deployed_path("one").exists());
  assert!(!bundle.deploy_dir().exists());
  assert!(sink.actions("Pre-Install Started").is_empty());
  assert!(sink.actions("Deployer Started").is_empty());
}

#[tokio::test]
async fn template_error_in_a_later_unit_writes_nothing() {
  let bundle = two_units(r#"<rhq:file name="port.conf" replace="true"/>"#);
  bundle.write_file("port.conf", "port=@@listener.port@@");

  let (result, _) = bundle.deploy(&bundle.inputs(1, DeploymentPhase::Install)).await;

  assert!(matches!(result, Err(ProjectError::Template { .. })), "{result:?}");
  assert!(!bundle.deployed_path("one").exists());
}

#[tokio::test]
async fn unit_nested_in_another_is_rejected_before_writing() {
  let bundle = TestBundle::new();
  bundle.write_file("a.txt", "a");
  bundle.write_file("b.txt", "b");
  bundle.write_recipe(&units_recipe(&format!(
    r#"<rhq:deployment-unit name="one" compliance="full"><rhq:file name="a.txt"/></rhq:deployment-unit>
       <rhq:deployment-unit name="two" dir="{}" compliance="full"><rhq:file name="b.txt"/></rhq:deployment-unit>"#,
    bundle.deployed_path("extra").display()
  )));

  let (result, _) = bundle.deploy(&bundle.inputs(1, DeploymentPhase::Install)).await;

  match result {
    Err(ProjectError::Validation(e)) => assert!(e.to_string().contains("overlapping directories"), "{e}"),
    other => panic!("expected a validation error, got {other:?}"),
  }
  assert!(!bundle.deploy_dir().exists());
}
