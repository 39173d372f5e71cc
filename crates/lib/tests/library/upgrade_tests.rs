//! Upgrades over a managed destination: file-set transitions, user edits, clean and revert.

use deployer_lib::metadata::DeploymentsMetadata;
use deployer_lib::types::DeploymentPhase;
use deployer_lib::util::hash::hash_file;

use super::common::{TestBundle, read_zip_entry, recipe};

const PORT_FILE: &str = "listener.port=@@listener.port@@\n";

/// v1 ships `A.properties` and `B.zip`, v2 ships `A.properties` and `C.zip`.
fn write_version(bundle: &TestBundle, version: &str, archive: &str) {
  bundle.write_file("A.properties", PORT_FILE);
  bundle.write_zip(archive, &[(&format!("{archive}.txt"), version)]);
  bundle.write_recipe(&recipe(
    version,
    r#"compliance="full""#,
    &format!(
      r#"<rhq:file name="A.properties" replace="true"/>
         <rhq:archive name="{archive}" exploded="false"/>"#
    ),
  ));
}

#[tokio::test]
async fn upgrade_replaces_dropped_archive() {
  let bundle = TestBundle::new();
  write_version(&bundle, "1.0", "B.zip");
  bundle
    .deploy(
      &bundle
        .inputs(1, DeploymentPhase::Install)
        .with("listener.port", "10000"),
    )
    .await
    .0
    .unwrap();
  assert_eq!(bundle.read_deployed("A.properties"), "listener.port=10000\n");
  assert!(bundle.deployed_path("B.zip").exists());

  std::fs::remove_file(bundle.bundle_dir().join("B.zip")).unwrap();
  write_version(&bundle, "2.0", "C.zip");
  let project = bundle
    .deploy(
      &bundle
        .inputs(2, DeploymentPhase::Upgrade)
        .with("listener.port", "20000"),
    )
    .await
    .0
    .unwrap();

  assert!(!bundle.deployed_path("B.zip").exists());
  assert!(bundle.deployed_path("C.zip").exists());
  assert_eq!(read_zip_entry(&bundle.deployed_path("C.zip"), "C.zip.txt"), "2.0");
  assert_eq!(bundle.read_deployed("A.properties"), "listener.port=20000\n");

  let diff = &project.deploy_differences;
  assert!(diff.deleted.contains("B.zip"), "{diff}");
  assert!(diff.added.contains("C.zip"), "{diff}");
  assert!(diff.changed.contains("A.properties"), "{diff}");

  let metadata = DeploymentsMetadata::new(bundle.deploy_dir());
  let manifest = metadata.current_file_hashcodes().unwrap();
  assert!(manifest.get("B.zip").is_none());
  let c_hash = hash_file(&bundle.deployed_path("C.zip")).unwrap().to_string();
  assert_eq!(manifest.get("C.zip"), Some(c_hash.as_str()));

  let current = metadata.current_deployment_properties().unwrap();
  assert_eq!((current.deployment_id, current.bundle_version.as_str()), (2, "2.0"));
  let previous = metadata.previous_deployment_properties().unwrap().unwrap();
  assert_eq!((previous.deployment_id, previous.bundle_version.as_str()), (1, "1.0"));
}

fn text_bundle(version: &str, content: &str) -> TestBundle {
  let bundle = TestBundle::new();
  rewrite_text_bundle(&bundle, version, content);
  bundle
}

fn rewrite_text_bundle(bundle: &TestBundle, version: &str, content: &str) {
  bundle.write_file("app.conf", content);
  bundle.write_recipe(&recipe(
    version,
    r#"compliance="full""#,
    r#"<rhq:file name="app.conf"/>"#,
  ));
}

#[tokio::test]
async fn user_edit_survives_when_bundle_file_is_unchanged() {
  let bundle = text_bundle("1.0", "shipped");
  bundle
    .deploy(&bundle.inputs(1, DeploymentPhase::Install))
    .await
    .0
    .unwrap();
  bundle.write_deployed("app.conf", "edited by the user");

  rewrite_text_bundle(&bundle, "1.1", "shipped");
  let project = bundle
    .deploy(&bundle.inputs(2, DeploymentPhase::Upgrade))
    .await
    .0
    .unwrap();

  assert_eq!(bundle.read_deployed("app.conf"), "edited by the user");
  assert!(project.deploy_differences.written.is_empty());
}

#[tokio::test]
async fn user_edit_is_backed_up_before_overwrite() {
  let bundle = text_bundle("1.0", "shipped");
  bundle
    .deploy(&bundle.inputs(1, DeploymentPhase::Install))
    .await
    .0
    .unwrap();
  bundle.write_deployed("app.conf", "edited by the user");

  rewrite_text_bundle(&bundle, "2.0", "shipped again, differently");
  let project = bundle
    .deploy(&bundle.inputs(2, DeploymentPhase::Upgrade))
    .await
    .0
    .unwrap();

  assert_eq!(bundle.read_deployed("app.conf"), "shipped again, differently");
  let backup = project
    .deploy_differences
    .backed_up
    .get("app.conf")
    .expect("app.conf was not backed up");
  assert_eq!(std::fs::read_to_string(backup).unwrap(), "edited by the user");
}

#[tokio::test]
async fn clean_removes_everything_not_in_the_bundle() {
  let bundle = text_bundle("1.0", "shipped");
  bundle
    .deploy(&bundle.inputs(1, DeploymentPhase::Install))
    .await
    .0
    .unwrap();
  bundle.write_deployed("extra/notes.txt", "scratch");

  let (result, sink) = bundle
    .deploy(&bundle.inputs(2, DeploymentPhase::Upgrade).clean(true))
    .await;
  let project = result.unwrap();

  assert!(project.deploy_differences.cleaned);
  assert!(!bundle.deployed_path("extra").exists());
  assert_eq!(bundle.read_deployed("app.conf"), "shipped");
  assert_eq!(sink.actions("Clean Requested").len(), 1);
}

#[tokio::test]
async fn revert_restores_files_backed_up_by_the_upgrade() {
  let bundle = text_bundle("1.0", "v1");
  bundle
    .deploy(&bundle.inputs(1, DeploymentPhase::Install))
    .await
    .0
    .unwrap();
  bundle.write_deployed("local.txt", "user content");

  rewrite_text_bundle(&bundle, "2.0", "v2");
  let upgrade = bundle
    .deploy(&bundle.inputs(2, DeploymentPhase::Upgrade))
    .await
    .0
    .unwrap();
  assert!(!bundle.deployed_path("local.txt").exists());
  assert!(upgrade.deploy_differences.backed_up.contains_key("local.txt"));

  rewrite_text_bundle(&bundle, "1.0", "v1");
  let (result, sink) = bundle
    .deploy(&bundle.inputs(3, DeploymentPhase::Upgrade).revert(true))
    .await;
  let revert = result.unwrap();

  assert_eq!(bundle.read_deployed("app.conf"), "v1");
  assert_eq!(bundle.read_deployed("local.txt"), "user content");
  assert!(revert.deploy_differences.restored.contains_key("local.txt"));
  assert_eq!(sink.actions("Revert Requested").len(), 1);
}
