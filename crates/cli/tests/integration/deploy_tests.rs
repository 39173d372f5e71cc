//! Deploy and plan command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn deploy_installs_bundle() {
  let env = TestEnv::with_app_bundle("1.0", false);

  env
    .deploy_cmd()
    .args(["-D", "listener.port=10000"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Deployed app 1.0"))
    .stdout(predicate::str::contains("(deployment 1, INSTALL)"));

  let conf = std::fs::read_to_string(env.deploy_path().join("conf/app.properties")).unwrap();
  assert_eq!(conf, "port=10000\n");
  assert!(env.deploy_path().join("README.txt").is_file());
}

#[test]
fn default_value_is_used_without_define() {
  let env = TestEnv::with_app_bundle("1.0", false);

  env.deploy_cmd().assert().success();

  let conf = std::fs::read_to_string(env.deploy_path().join("conf/app.properties")).unwrap();
  assert_eq!(conf, "port=8080\n");
}

#[test]
fn second_deploy_is_an_up_to_date_upgrade() {
  let env = TestEnv::with_app_bundle("1.0", false);

  env.deploy_cmd().assert().success();
  env
    .deploy_cmd()
    .assert()
    .success()
    .stdout(predicate::str::contains("Up to date"))
    .stdout(predicate::str::contains("(deployment 2, UPGRADE)"));
}

#[test]
fn plan_changes_nothing() {
  let env = TestEnv::with_app_bundle("1.0", false);

  env
    .deployer_cmd()
    .arg("plan")
    .arg(env.recipe_path())
    .arg("--deploy-dir")
    .arg(env.deploy_path())
    .arg("--verbose")
    .assert()
    .success()
    .stdout(predicate::str::contains("Dry run"))
    .stdout(predicate::str::contains("conf/app.properties"));

  assert!(!env.deploy_path().exists());
}

#[test]
fn json_output_reports_differences() {
  let env = TestEnv::with_app_bundle("1.0", false);

  let output = env.deploy_cmd().args(["--format", "json"]).output().unwrap();
  assert!(output.status.success());

  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(report["bundle"], "app");
  assert_eq!(report["phase"], "INSTALL");
  assert_eq!(report["dry_run"], false);
  let added: Vec<&str> = report["differences"]["added"]
    .as_array()
    .unwrap()
    .iter()
    .filter_map(|v| v.as_str())
    .collect();
  assert!(added.contains(&"conf/app.properties"), "{added:?}");
  assert!(
    report["events"]
      .as_array()
      .unwrap()
      .iter()
      .any(|e| e["action"] == "Deployer Finished")
  );
}

#[test]
fn handover_dir_receives_content() {
  let env = TestEnv::with_app_bundle("1.0", true);

  env
    .deploy_cmd()
    .arg("--handover-dir")
    .arg(env.handover_path())
    .assert()
    .success()
    .stdout(predicate::str::contains("Handovers accepted: 1"));

  let handed = env.handover_path().join("deployment").join("app.war");
  assert_eq!(std::fs::read_to_string(handed).unwrap(), "war content");
  assert!(!env.deploy_path().join("app.war").exists());
}

#[test]
fn missing_bundle_file_fails_with_context() {
  let env = TestEnv::with_app_bundle("1.0", false);
  std::fs::remove_file(env.bundle_path().join("README.txt")).unwrap();

  env
    .deploy_cmd()
    .assert()
    .failure()
    .stderr(predicate::str::contains("README.txt"));

  assert!(!env.deploy_path().exists());
}

#[test]
fn invalid_define_type_fails() {
  let env = TestEnv::with_app_bundle("1.0", false);

  env
    .deploy_cmd()
    .args(["-D", "listener.port=eighty"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("listener.port"));
}
