//! Purge command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn purge_removes_full_compliance_destination() {
  let env = TestEnv::with_app_bundle("1.0", false);
  env.deploy_cmd().assert().success();
  assert!(env.deploy_path().join("README.txt").exists());

  env
    .deployer_cmd()
    .args(["purge", "--force", "--deploy-dir"])
    .arg(env.deploy_path())
    .assert()
    .success()
    .stdout(predicate::str::contains("Purge complete!"));

  assert!(!env.deploy_path().exists());
}

#[test]
fn purge_of_unmanaged_directory_is_a_no_op() {
  let env = TestEnv::with_app_bundle("1.0", false);
  std::fs::create_dir_all(env.deploy_path()).unwrap();
  std::fs::write(env.deploy_path().join("keep.txt"), "mine").unwrap();

  env
    .deployer_cmd()
    .args(["purge", "--force", "--deploy-dir"])
    .arg(env.deploy_path())
    .assert()
    .success()
    .stdout(predicate::str::contains("nothing to purge"));

  assert!(env.deploy_path().join("keep.txt").exists());
}
