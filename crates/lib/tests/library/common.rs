//! Shared helpers for library integration tests.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use deployer_lib::events::RecordingSink;
use deployer_lib::project::{BundleLauncher, InputProperties, Project, ProjectError};
use deployer_lib::types::DeploymentPhase;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// Recipe for the `test-bundle` bundle with one deployment unit.
///
/// Declares the optional `listener.port` input property and a `pre` hook target that sets
/// `preinstallTargetExecuted`.
pub fn recipe(version: &str, unit_attrs: &str, body: &str) -> String {
  format!(
    r#"<project name="test-bundle" default="main" xmlns:rhq="antlib:org.rhq.bundle">
  <rhq:bundle name="test-bundle" version="{version}" description="integration test bundle">
    <rhq:input-property name="listener.port" type="integer" required="false"/>
    <rhq:deployment-unit name="appserver" {unit_attrs}>
      {body}
    </rhq:deployment-unit>
  </rhq:bundle>
  <target name="main"/>
  <target name="pre">
    <property name="preinstallTargetExecuted" value="true"/>
    <echo message="deploying to ${{rhq.deploy.dir}}"/>
  </target>
  <target name="post"><property name="postinstallTargetExecuted" value="true"/></target>
</project>"#
  )
}

/// A bundle directory and a destination directory in one temp dir.
///
/// The bundle can be rewritten between deployments to simulate a new version.
pub struct TestBundle {
  pub temp: TempDir,
}

impl TestBundle {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("bundle")).unwrap();
    Self { temp }
  }

  pub fn bundle_dir(&self) -> PathBuf {
    self.temp.path().join("bundle")
  }

  pub fn deploy_dir(&self) -> PathBuf {
    self.temp.path().join("deploy")
  }

  pub fn recipe_path(&self) -> PathBuf {
    self.bundle_dir().join("deploy.xml")
  }

  pub fn write_recipe(&self, xml: &str) {
    fs::write(self.recipe_path(), xml).unwrap();
  }

  /// Write a bundle file, creating parent directories.
  pub fn write_file(&self, relative: &str, content: &str) {
    write_file(&self.bundle_dir(), relative, content);
  }

  /// Write a zip archive into the bundle.
  pub fn write_zip(&self, relative: &str, entries: &[(&str, &str)]) {
    write_zip(&self.bundle_dir().join(relative), entries);
  }

  /// Put a file into the destination, as a user would.
  pub fn write_deployed(&self, relative: &str, content: &str) {
    write_file(&self.deploy_dir(), relative, content);
  }

  pub fn deployed_path(&self, relative: &str) -> PathBuf {
    self.deploy_dir().join(relative)
  }

  pub fn read_deployed(&self, relative: &str) -> String {
    fs::read_to_string(self.deployed_path(relative))
      .unwrap_or_else(|e| panic!("failed to read deployed file {relative}: {e}"))
  }

  pub fn inputs(&self, deploy_id: u64, phase: DeploymentPhase) -> InputProperties {
    InputProperties::new(self.deploy_dir(), deploy_id, phase)
  }

  /// Deploy the current bundle with a plain launcher.
  pub async fn deploy(&self, inputs: &InputProperties) -> (Result<Project, ProjectError>, RecordingSink) {
    self.deploy_with(BundleLauncher::new(), inputs).await
  }

  pub async fn deploy_with(
    &self,
    mut launcher: BundleLauncher,
    inputs: &InputProperties,
  ) -> (Result<Project, ProjectError>, RecordingSink) {
    let sink = RecordingSink::new();
    let result = launcher
      .execute(&self.recipe_path(), inputs, vec![Box::new(sink.clone())])
      .await;
    (result, sink)
  }
}

pub fn write_file(root: &Path, relative: &str, content: &str) {
  let path = root.join(relative);
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  fs::write(path, content).unwrap();
}

pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  let mut writer = zip::ZipWriter::new(fs::File::create(path).unwrap());
  for (name, content) in entries {
    writer.start_file(*name, SimpleFileOptions::default()).unwrap();
    writer.write_all(content.as_bytes()).unwrap();
  }
  writer.finish().unwrap();
}

pub fn read_zip_entry(path: &Path, name: &str) -> String {
  let mut archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
  let mut entry = archive.by_name(name).unwrap();
  let mut content = String::new();
  entry.read_to_string(&mut content).unwrap();
  content
}

/// Every regular file under `root`, as `/`-separated relative paths.
pub fn files_under(root: &Path) -> Vec<String> {
  let mut files: Vec<String> = walkdir::WalkDir::new(root)
    .into_iter()
    .filter_map(Result::ok)
    .filter(|e| e.file_type().is_file())
    .map(|e| {
      e.path()
        .strip_prefix(root)
        .unwrap()
        .to_string_lossy()
        .replace('\\', "/")
    })
    .collect();
  files.sort();
  files
}
