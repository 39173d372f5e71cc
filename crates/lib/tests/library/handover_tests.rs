//! Handover directives: content offered to an external installer instead of written.

use std::io::Read;
use std::sync::{Arc, Mutex};

use deployer_lib::events::AuditStatus;
use deployer_lib::handover::{HandoverError, HandoverInfo};
use deployer_lib::project::{BundleLauncher, ProjectError};
use deployer_lib::types::DeploymentPhase;

use super::common::{TestBundle, recipe};

/// `(filename, action, content)` of every handover a target saw.
type Seen = Arc<Mutex<Vec<(String, String, String)>>>;

fn launcher(seen: &Seen, reject: &'static [&'static str]) -> BundleLauncher {
  let seen = Arc::clone(seen);
  BundleLauncher::new().with_handover_target(Box::new(move |mut info: HandoverInfo| {
    let mut content = String::new();
    info.content.read_to_string(&mut content).unwrap();
    let accept = !reject.contains(&info.filename.as_str());
    seen.lock().unwrap().push((info.filename, info.action, content));
    accept
  }))
}

fn handover_bundle() -> TestBundle {
  let bundle = TestBundle::new();
  bundle.write_file("app.conf", "conf");
  bundle.write_file("first.war", "first @@listener.port@@");
  bundle.write_file("second.war", "second");
  bundle.write_recipe(&recipe(
    "1.0",
    r#"compliance="full""#,
    r#"<rhq:file name="app.conf"/>
       <rhq:file name="first.war" replace="true">
         <rhq:handover action="deployment" failonerror="false">
           <rhq:handover-param name="runtimeName" value="first.war"/>
         </rhq:handover>
       </rhq:file>
       <rhq:file name="second.war">
         <rhq:handover action="deployment" failonerror="true"/>
       </rhq:file>"#,
  ));
  bundle
}

#[tokio::test]
async fn optional_rejection_still_succeeds() {
  let bundle = handover_bundle();
  let seen = Seen::default();
  let inputs = bundle
    .inputs(1, DeploymentPhase::Install)
    .with("listener.port", "10000");

  let (result, sink) = bundle.deploy_with(launcher(&seen, &["first.war"]), &inputs).await;
  let project = result.unwrap();

  let seen = seen.lock().unwrap();
  assert_eq!(seen.len(), 2);
  assert_eq!(
    seen[0],
    ("first.war".to_string(), "deployment".to_string(), "first 10000".to_string())
  );
  assert_eq!(seen[1].0, "second.war");
  assert_eq!(project.handovers.accepted, vec!["second.war"]);
  assert_eq!(project.handovers.rejected, vec!["first.war"]);

  assert!(!bundle.deployed_path("first.war").exists());
  assert!(!bundle.deployed_path("second.war").exists());
  assert_eq!(bundle.read_deployed("app.conf"), "conf");

  let statuses: Vec<_> = sink.actions("Handover").into_iter().map(|e| e.status).collect();
  assert_eq!(statuses, vec![AuditStatus::Warn, AuditStatus::Info]);
}

#[tokio::test]
async fn required_rejection_fails_after_every_attempt() {
  let bundle = handover_bundle();
  let seen = Seen::default();
  let inputs = bundle
    .inputs(1, DeploymentPhase::Install)
    .with("listener.port", "10000");

  let (result, sink) = bundle
    .deploy_with(launcher(&seen, &["first.war", "second.war"]), &inputs)
    .await;
  let err = result.unwrap_err();

  assert_eq!(seen.lock().unwrap().len(), 2);
  match err {
    ProjectError::HandoverRejected(HandoverError::Rejected { failed, attempted }) => {
      assert_eq!(failed, vec!["second.war"]);
      assert_eq!(attempted, 2);
    }
    other => panic!("unexpected error: {other}"),
  }
  assert_eq!(sink.actions("Deployer Failed").len(), 1);
  assert!(sink.actions("Deployer Finished").is_empty());
}

#[tokio::test]
async fn dry_run_hands_nothing_over() {
  let bundle = handover_bundle();
  let seen = Seen::default();
  let inputs = bundle
    .inputs(1, DeploymentPhase::Install)
    .with("listener.port", "10000")
    .dry_run(true);

  bundle.deploy_with(launcher(&seen, &[]), &inputs).await.0.unwrap();
  assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn without_a_target_handovers_are_skipped() {
  let bundle = handover_bundle();
  let inputs = bundle
    .inputs(1, DeploymentPhase::Install)
    .with("listener.port", "10000");

  let project = bundle.deploy(&inputs).await.0.unwrap();
  assert_eq!(project.handovers.attempted(), 0);
  assert!(!bundle.deployed_path("first.war").exists());
}
