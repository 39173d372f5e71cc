//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Recipe of the `app` bundle: a realized config file, a plain file and an optional handover.
pub fn app_recipe(version: &str, handover: bool) -> String {
  let handover = if handover {
    r#"<rhq:file name="app.war">
        <rhq:handover action="deployment" failonerror="true">
          <rhq:handover-param name="runtimeName" value="app.war"/>
        </rhq:handover>
      </rhq:file>"#
  } else {
    ""
  };
  format!(
    r#"<project name="app" default="main" xmlns:rhq="antlib:org.rhq.bundle">
  <rhq:bundle name="app" version="{version}" description="CLI test bundle">
    <rhq:input-property name="listener.port" type="integer" defaultValue="8080"/>
    <rhq:deployment-unit name="server" compliance="full">
      <rhq:file name="app.properties" destinationFile="conf/app.properties" replace="true"/>
      <rhq:file name="README.txt"/>
      {handover}
    </rhq:deployment-unit>
  </rhq:bundle>
  <target name="main"/>
</project>"#
  )
}

/// Isolated test environment.
///
/// Each test gets its own temporary directory with separate bundle and destination paths.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// Create an environment holding the `app` bundle.
  pub fn with_app_bundle(version: &str, handover: bool) -> Self {
    let env = Self {
      temp: TempDir::new().unwrap(),
    };
    env.write_bundle_file("deploy.xml", &app_recipe(version, handover));
    env.write_bundle_file("app.properties", "port=@@listener.port@@\n");
    env.write_bundle_file("README.txt", "read me\n");
    env.write_bundle_file("app.war", "war content");
    env
  }

  /// Write a file relative to the bundle directory.
  pub fn write_bundle_file(&self, relative_path: &str, content: &str) {
    let path = self.bundle_path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn bundle_path(&self) -> PathBuf {
    self.temp.path().join("bundle")
  }

  pub fn recipe_path(&self) -> PathBuf {
    self.bundle_path().join("deploy.xml")
  }

  /// Destination directory (not created).
  pub fn deploy_path(&self) -> PathBuf {
    self.temp.path().join("deploy")
  }

  /// Handover drop directory.
  pub fn handover_path(&self) -> PathBuf {
    self.temp.path().join("handovers")
  }

  /// Get a pre-configured Command for the deployer binary.
  pub fn deployer_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("deployer");
    cmd.env_remove("RUST_LOG");
    cmd
  }

  /// `deployer deploy` of the bundle into the destination.
  pub fn deploy_cmd(&self) -> Command {
    let mut cmd = self.deployer_cmd();
    cmd
      .arg("deploy")
      .arg(self.recipe_path())
      .arg("--deploy-dir")
      .arg(self.deploy_path());
    cmd
  }
}
