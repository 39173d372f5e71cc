//! Audit events emitted while a bundle deploys.
//!
//! Every event goes to each [`EventSink`] handed to the launcher and is
//! also logged through `tracing`, so a deployment can be followed from the
//! log alone.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Outcome recorded with an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditStatus {
  Success,
  Info,
  Warn,
  Failure,
}

impl fmt::Display for AuditStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      AuditStatus::Success => "SUCCESS",
      AuditStatus::Info => "INFO",
      AuditStatus::Warn => "WARN",
      AuditStatus::Failure => "FAILURE",
    };
    f.write_str(s)
  }
}

/// One audit message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
  pub status: AuditStatus,
  /// Short step name, e.g. `Deployer Started`.
  pub action: String,
  pub info: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
}

impl AuditEvent {
  pub fn new(status: AuditStatus, action: impl Into<String>, info: impl Into<String>) -> Self {
    Self {
      status,
      action: action.into(),
      info: info.into(),
      message: None,
      details: None,
    }
  }

  pub fn with_message(mut self, message: impl Into<String>) -> Self {
    self.message = Some(message.into());
    self
  }

  pub fn with_details(mut self, details: impl Into<String>) -> Self {
    self.details = Some(details.into());
    self
  }
}

/// Steps a deployment unit goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeployPhase {
  NotStarted,
  ComputingTargetSet,
  Diffing,
  Applying,
  Done,
  Failed,
}

impl DeployPhase {
  pub fn is_terminal(self) -> bool {
    matches!(self, DeployPhase::Done | DeployPhase::Failed)
  }
}

/// Receiver of audit events.
pub trait EventSink: Send {
  fn audit(&mut self, event: &AuditEvent);

  fn phase(&mut self, _phase: DeployPhase) {}
}

/// Fan-out over the sinks of one launcher invocation.
#[derive(Default)]
pub struct Events {
  sinks: Vec<Box<dyn EventSink>>,
}

impl Events {
  pub fn new(sinks: Vec<Box<dyn EventSink>>) -> Self {
    Self { sinks }
  }

  pub fn emit(&mut self, event: AuditEvent) {
    let detail = event.message.as_deref().unwrap_or("");
    match event.status {
      AuditStatus::Success | AuditStatus::Info => {
        info!(action = %event.action, detail, "{}", event.info)
      }
      AuditStatus::Warn => warn!(action = %event.action, detail, "{}", event.info),
      AuditStatus::Failure => error!(action = %event.action, detail, "{}", event.info),
    }
    for sink in &mut self.sinks {
      sink.audit(&event);
    }
  }

  pub fn audit(&mut self, status: AuditStatus, action: &str, info: &str, message: Option<String>) {
    let mut event = AuditEvent::new(status, action, info);
    event.message = message;
    self.emit(event);
  }

  pub fn phase(&mut self, phase: DeployPhase) {
    debug!(?phase, "deployment phase");
    for sink in &mut self.sinks {
      sink.phase(phase);
    }
  }
}

impl fmt::Debug for Events {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Events").field("sinks", &self.sinks.len()).finish()
  }
}

/// Sink that keeps every event in memory.
///
/// Clones share storage, so a clone can be handed to the launcher and read back afterwards.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
  events: Arc<Mutex<Vec<AuditEvent>>>,
  phases: Arc<Mutex<Vec<DeployPhase>>>,
}

impl RecordingSink {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn events(&self) -> Vec<AuditEvent> {
    self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  pub fn phases(&self) -> Vec<DeployPhase> {
    self.phases.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  /// Events whose action equals `action`.
  pub fn actions(&self, action: &str) -> Vec<AuditEvent> {
    self.events().into_iter().filter(|e| e.action == action).collect()
  }
}

impl EventSink for RecordingSink {
  fn audit(&mut self, event: &AuditEvent) {
    self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event.clone());
  }

  fn phase(&mut self, phase: DeployPhase) {
    self.phases.lock().unwrap_or_else(|e| e.into_inner()).push(phase);
  }
}
