//! First deployments: content, manifests, compliance, dry runs and failures.

use deployer_lib::deploy::DeployDifferences;
use deployer_lib::events::{AuditStatus, DeployPhase};
use deployer_lib::metadata::{DeploymentsMetadata, MetadataError};
use deployer_lib::project::ProjectError;
use deployer_lib::types::{DeploymentPhase, DestinationCompliance};
use deployer_lib::util::hash::hash_file;

use super::common::{TestBundle, files_under, read_zip_entry, recipe};

const PORT_FILE: &str = "listener.port=@@listener.port@@\n";

fn simple_bundle(unit_attrs: &str) -> TestBundle {
  let bundle = TestBundle::new();
  bundle.write_file("a.properties", PORT_FILE);
  bundle.write_file("docs/readme.txt", "read me\n");
  bundle.write_zip("lib.zip", &[("lib/one.jar", "one"), ("lib/two.jar", "two")]);
  bundle.write_recipe(&recipe(
    "1.0",
    unit_attrs,
    r#"<rhq:file name="a.properties" destinationFile="conf/a.properties" replace="true"/>
       <rhq:file name="docs/readme.txt"/>
       <rhq:archive name="lib.zip" exploded="true"/>"#,
  ));
  bundle
}

mod install {
  use super::*;

  #[tokio::test]
  async fn writes_content_and_records_manifest() {
    let bundle = simple_bundle(r#"compliance="full""#);
    let inputs = bundle
      .inputs(1, DeploymentPhase::Install)
      .with("listener.port", "10000");

    let (result, _) = bundle.deploy(&inputs).await;
    let project = result.unwrap();

    assert_eq!(bundle.read_deployed("conf/a.properties"), "listener.port=10000\n");
    assert_eq!(bundle.read_deployed("docs/readme.txt"), "read me\n");
    assert_eq!(bundle.read_deployed("lib/one.jar"), "one");

    let diff = &project.deploy_differences;
    for path in ["conf/a.properties", "docs/readme.txt", "lib/one.jar", "lib/two.jar"] {
      assert!(diff.added.contains(path), "{path} not reported as added: {diff}");
    }
    assert!(diff.realized.contains_key("conf/a.properties"));

    let metadata = DeploymentsMetadata::new(bundle.deploy_dir());
    let properties = metadata.current_deployment_properties().unwrap();
    assert_eq!(properties.deployment_id, 1);
    assert_eq!(properties.bundle_name, "test-bundle");
    assert_eq!(properties.bundle_version, "1.0");
    assert_eq!(properties.compliance, DestinationCompliance::Full);
  }

  #[tokio::test]
  async fn recorded_hashes_match_disk() {
    let bundle = simple_bundle(r#"compliance="full""#);
    let inputs = bundle
      .inputs(1, DeploymentPhase::Install)
      .with("listener.port", "10000");
    bundle.deploy(&inputs).await.0.unwrap();

    let manifest = DeploymentsMetadata::new(bundle.deploy_dir())
      .current_file_hashcodes()
      .unwrap();
    assert_eq!(manifest.len(), 4);
    for (path, hash) in manifest.iter() {
      let on_disk = hash_file(&bundle.deployed_path(path)).unwrap();
      assert_eq!(&on_disk.to_string(), hash, "hash mismatch for {path}");
    }
  }

  #[tokio::test]
  async fn redeploying_same_bundle_writes_nothing() {
    let bundle = simple_bundle(r#"compliance="full""#);
    let first = bundle
      .inputs(1, DeploymentPhase::Install)
      .with("listener.port", "10000");
    bundle.deploy(&first).await.0.unwrap();
    let metadata = DeploymentsMetadata::new(bundle.deploy_dir());
    let manifest_before = metadata.current_file_hashcodes().unwrap();

    let second = bundle
      .inputs(2, DeploymentPhase::Upgrade)
      .with("listener.port", "10000");
    let project = bundle.deploy(&second).await.0.unwrap();

    let diff = &project.deploy_differences;
    assert!(diff.added.is_empty(), "{diff}");
    assert!(diff.changed.is_empty(), "{diff}");
    assert!(diff.deleted.is_empty(), "{diff}");
    assert!(diff.written.is_empty(), "{diff}");
    assert_eq!(diff.unchanged.len(), 4);
    assert_eq!(metadata.current_file_hashcodes().unwrap(), manifest_before);
    assert_eq!(metadata.current_deployment_id().unwrap(), 2);
  }

  #[tokio::test]
  async fn template_scope_follows_replace_flags() {
    let bundle = TestBundle::new();
    bundle.write_file("a.properties", PORT_FILE);
    bundle.write_file("raw.properties", PORT_FILE);
    bundle.write_zip("realized.zip", &[("conf/x.properties", PORT_FILE), ("x.txt", PORT_FILE)]);
    bundle.write_zip("verbatim.zip", &[("conf/y.properties", PORT_FILE)]);
    bundle.write_recipe(&recipe(
      "1.0",
      r#"compliance="full""#,
      r#"<rhq:file name="a.properties" replace="true"/>
         <rhq:file name="raw.properties"/>
         <rhq:archive name="realized.zip" exploded="false">
           <rhq:replace><rhq:fileset includes="**/*.properties"/></rhq:replace>
         </rhq:archive>
         <rhq:archive name="verbatim.zip" exploded="false"/>"#,
    ));
    let inputs = bundle
      .inputs(1, DeploymentPhase::Install)
      .with("listener.port", "10000");

    let project = bundle.deploy(&inputs).await.0.unwrap();

    assert_eq!(bundle.read_deployed("a.properties"), "listener.port=10000\n");
    assert_eq!(bundle.read_deployed("raw.properties"), PORT_FILE);
    let realized = bundle.deployed_path("realized.zip");
    assert_eq!(read_zip_entry(&realized, "conf/x.properties"), "listener.port=10000\n");
    assert_eq!(read_zip_entry(&realized, "x.txt"), PORT_FILE);
    let verbatim = bundle.deployed_path("verbatim.zip");
    assert_eq!(read_zip_entry(&verbatim, "conf/y.properties"), PORT_FILE);
    assert!(
      project
        .deploy_differences
        .realized
        .contains_key("realized.zip/conf/x.properties")
    );

    let manifest = DeploymentsMetadata::new(bundle.deploy_dir())
      .current_file_hashcodes()
      .unwrap();
    let on_disk = hash_file(&realized).unwrap();
    assert_eq!(manifest.get("realized.zip"), Some(on_disk.to_string().as_str()));
  }

  #[tokio::test]
  async fn unknown_tokens_are_left_verbatim() {
    let bundle = TestBundle::new();
    bundle.write_file("a.txt", "@@not.a.property@@ @@rhq.bundle.version@@");
    bundle.write_recipe(&recipe(
      "3.1",
      r#"compliance="full""#,
      r#"<rhq:file name="a.txt" replace="true"/>"#,
    ));

    bundle
      .deploy(&bundle.inputs(1, DeploymentPhase::Install))
      .await
      .0
      .unwrap();
    assert_eq!(bundle.read_deployed("a.txt"), "@@not.a.property@@ 3.1");
  }
}

mod compliance {
  use super::*;

  #[tokio::test]
  async fn full_removes_foreign_root_files() {
    let bundle = simple_bundle(r#"compliance="full""#);
    bundle.write_deployed("foreign.txt", "not ours");
    let inputs = bundle
      .inputs(1, DeploymentPhase::Install)
      .with("listener.port", "10000");

    let project = bundle.deploy(&inputs).await.0.unwrap();

    assert!(!bundle.deployed_path("foreign.txt").exists());
    assert!(project.deploy_differences.backed_up.contains_key("foreign.txt"));
  }

  #[tokio::test]
  async fn legacy_manage_root_dir_is_full() {
    let bundle = simple_bundle(r#"manageRootDir="true""#);
    bundle.write_deployed("foreign.txt", "not ours");
    let inputs = bundle
      .inputs(1, DeploymentPhase::Install)
      .with("listener.port", "10000");

    bundle.deploy(&inputs).await.0.unwrap();
    assert!(!bundle.deployed_path("foreign.txt").exists());
  }

  #[tokio::test]
  async fn files_and_directories_keeps_foreign_root_files() {
    let bundle = simple_bundle(r#"compliance="filesAndDirectories""#);
    bundle.write_deployed("foreign.txt", "not ours");
    bundle.write_deployed("conf/stale.properties", "inside a managed directory");
    let inputs = bundle
      .inputs(1, DeploymentPhase::Install)
      .with("listener.port", "10000");

    bundle.deploy(&inputs).await.0.unwrap();

    assert_eq!(bundle.read_deployed("foreign.txt"), "not ours");
    assert!(!bundle.deployed_path("conf/stale.properties").exists());
    assert!(bundle.deployed_path("conf/a.properties").exists());
  }

  #[tokio::test]
  async fn missing_compliance_is_rejected_before_any_write() {
    let bundle = simple_bundle("");
    let inputs = bundle
      .inputs(1, DeploymentPhase::Install)
      .with("listener.port", "10000");

    let err = bundle.deploy(&inputs).await.0.unwrap_err();
    assert!(matches!(err, ProjectError::Validation(_)), "{err}");
    assert!(!bundle.deploy_dir().exists());
  }

  #[tokio::test]
  async fn ignored_files_survive_full_compliance() {
    let bundle = TestBundle::new();
    bundle.write_file("a.txt", "a");
    bundle.write_recipe(&recipe(
      "1.0",
      r#"compliance="full""#,
      r#"<rhq:file name="a.txt"/>
         <rhq:ignore><rhq:fileset includes="logs/**"/></rhq:ignore>"#,
    ));
    bundle.write_deployed("logs/server.log", "log line");

    bundle
      .deploy(&bundle.inputs(1, DeploymentPhase::Install))
      .await
      .0
      .unwrap();
    assert_eq!(bundle.read_deployed("logs/server.log"), "log line");
  }
}

mod dry_run {
  use super::*;

  #[tokio::test]
  async fn leaves_destination_untouched() {
    let bundle = simple_bundle(r#"compliance="full""#);
    bundle.write_deployed("foreign.txt", "not ours");
    let inputs = bundle
      .inputs(1, DeploymentPhase::Install)
      .with("listener.port", "10000")
      .dry_run(true);

    let (result, sink) = bundle.deploy(&inputs).await;
    let project = result.unwrap();

    assert!(project.dry_run);
    assert_eq!(files_under(&bundle.deploy_dir()), vec!["foreign.txt"]);
    let metadata = DeploymentsMetadata::new(bundle.deploy_dir());
    assert!(!metadata.is_managed());
    assert!(matches!(
      metadata.current_file_hashcodes(),
      Err(MetadataError::NotFound(_))
    ));
    assert!(!sink.phases().contains(&DeployPhase::Applying));
    assert!(sink.actions("Deployer Started").is_empty());
  }

  #[tokio::test]
  async fn reports_the_same_differences_as_a_real_run() {
    let dry = simple_bundle(r#"compliance="full""#);
    let real = simple_bundle(r#"compliance="full""#);
    for bundle in [&dry, &real] {
      bundle.write_deployed("foreign.txt", "not ours");
    }

    let plan = dry
      .deploy(
        &dry
          .inputs(1, DeploymentPhase::Install)
          .with("listener.port", "10000")
          .dry_run(true),
      )
      .await
      .0
      .unwrap();
    let applied = real
      .deploy(
        &real
          .inputs(1, DeploymentPhase::Install)
          .with("listener.port", "10000"),
      )
      .await
      .0
      .unwrap();

    let summary = |d: &DeployDifferences| (d.added.clone(), d.changed.clone(), d.deleted.clone());
    assert_eq!(summary(&plan.deploy_differences), summary(&applied.deploy_differences));
    let real_manifest = DeploymentsMetadata::new(real.deploy_dir())
      .current_file_hashcodes()
      .unwrap();
    let planned_manifest = plan.manifests.values().next().unwrap();
    assert_eq!(planned_manifest.without_directories(), real_manifest);
  }
}

mod failures {
  use super::*;

  #[tokio::test]
  async fn missing_content_fails_before_any_write() {
    let bundle = TestBundle::new();
    bundle.write_file("present.txt", "here");
    bundle.write_recipe(&recipe(
      "1.0",
      r#"compliance="full""#,
      r#"<rhq:file name="present.txt"/>
         <rhq:file name="absent.txt"/>"#,
    ));

    let (result, sink) = bundle.deploy(&bundle.inputs(1, DeploymentPhase::Install)).await;
    let err = result.unwrap_err();

    assert!(matches!(err, ProjectError::ContentResolution { .. }), "{err}");
    assert!(err.to_string().contains("absent.txt"), "{err}");
    assert!(!bundle.deploy_dir().exists());
    let failure = sink.actions("Error Occurred");
    assert_eq!(failure.len(), 1);
    assert_eq!(failure[0].status, AuditStatus::Failure);
  }

  #[tokio::test]
  async fn declared_property_without_value_fails_realization() {
    let bundle = TestBundle::new();
    bundle.write_file("a.properties", PORT_FILE);
    bundle.write_recipe(&recipe(
      "1.0",
      r#"compliance="full""#,
      r#"<rhq:file name="a.properties" replace="true"/>"#,
    ));

    let err = bundle
      .deploy(&bundle.inputs(1, DeploymentPhase::Install))
      .await
      .0
      .unwrap_err();
    assert!(matches!(err, ProjectError::Template { .. }), "{err}");
    assert!(!bundle.deployed_path("a.properties").exists());
  }

  #[tokio::test]
  async fn mistyped_input_is_a_configuration_error() {
    let bundle = simple_bundle(r#"compliance="full""#);
    let inputs = bundle
      .inputs(1, DeploymentPhase::Install)
      .with("listener.port", "not-a-number");

    let err = bundle.deploy(&inputs).await.0.unwrap_err();
    assert!(matches!(err, ProjectError::Configuration(_)), "{err}");
    assert!(!bundle.deploy_dir().exists());
  }

  #[tokio::test]
  async fn external_properties_file_feeds_configuration() {
    let bundle = simple_bundle(r#"compliance="full""#);
    let props = bundle.temp.path().join("deploy.properties");
    std::fs::write(&props, "# external\nlistener.port = 7070\n").unwrap();
    let inputs = bundle
      .inputs(1, DeploymentPhase::Install)
      .properties_file(props.display().to_string());

    let project = bundle.deploy(&inputs).await.0.unwrap();
    assert_eq!(project.configuration.get("listener.port"), Some("7070"));
    assert_eq!(bundle.read_deployed("conf/a.properties"), "listener.port=7070\n");
  }
}
