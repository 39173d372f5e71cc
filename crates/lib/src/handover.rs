//! Handing content over to an external installer.
//!
//! Directives carrying a `<rhq:handover>` are not written to the destination.
//! Their content is passed to the registered [`HandoverTarget`] instead, one
//! call per directive, in recipe order.
//!
//! All content is opened before the first handover. Every handover is then
//! attempted. The dispatch fails once all are done if any rejected handover had
//! `failonerror` set; other rejections only warn.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

use crate::events::{AuditStatus, Events};
use crate::recipe::Handover;

/// Errors dispatching handovers.
#[derive(Debug, Error)]
pub enum HandoverError {
  #[error("handover rejected for {}; {attempted} handover(s) attempted", failed.join(", "))]
  Rejected { failed: Vec<String>, attempted: usize },

  #[error("failed to open handover content {path}: {source}")]
  Open {
    path: String,
    #[source]
    source: io::Error,
  },
}

/// Content passed to a [`HandoverTarget`].
pub struct HandoverInfo {
  pub filename: String,
  pub action: String,
  pub params: BTreeMap<String, String>,
  /// The deployment reverts an earlier one.
  pub revert: bool,
  pub content: Box<dyn Read + Send>,
}

impl fmt::Debug for HandoverInfo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("HandoverInfo")
      .field("filename", &self.filename)
      .field("action", &self.action)
      .field("params", &self.params)
      .field("revert", &self.revert)
      .finish_non_exhaustive()
  }
}

/// Receiver of handed-over content.
pub trait HandoverTarget: Send {
  /// Install the content. Returns whether the handover succeeded.
  fn handover_content(&mut self, info: HandoverInfo) -> bool;
}

impl<F> HandoverTarget for F
where
  F: FnMut(HandoverInfo) -> bool + Send,
{
  fn handover_content(&mut self, info: HandoverInfo) -> bool {
    self(info)
  }
}

/// Where the bytes of a handover come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoverPayload {
  Path(PathBuf),
  /// Realized or rebuilt content.
  Bytes(Vec<u8>),
}

/// One handover to perform.
#[derive(Debug, Clone)]
pub struct HandoverRequest {
  pub filename: String,
  pub handover: Handover,
  pub payload: HandoverPayload,
}

impl HandoverRequest {
  fn describe(&self) -> String {
    let params: Vec<String> = self.handover.params.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!(
      "Source: {}, handover [action={}, failonerror={}, params={{{}}}]",
      self.filename,
      self.handover.action,
      self.handover.failonerror,
      params.join(", ")
    )
  }
}

/// Result of a dispatch that did not fail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandoverOutcome {
  pub accepted: Vec<String>,
  /// Rejected handovers that did not have `failonerror` set.
  pub rejected: Vec<String>,
}

impl HandoverOutcome {
  pub fn attempted(&self) -> usize {
    self.accepted.len() + self.rejected.len()
  }
}

/// Offer every request to `target` in order.
pub fn dispatch(
  target: &mut dyn HandoverTarget,
  requests: &[HandoverRequest],
  revert: bool,
  events: &mut Events,
) -> Result<HandoverOutcome, HandoverError> {
  let contents = requests
    .iter()
    .map(|request| open_payload(&request.payload))
    .collect::<Result<Vec<_>, _>>()?;

  let mut outcome = HandoverOutcome::default();
  let mut failed = Vec::new();

  for (request, content) in requests.iter().zip(contents) {
    let info = HandoverInfo {
      filename: request.filename.clone(),
      action: request.handover.action.clone(),
      params: request.handover.params.clone(),
      revert,
      content,
    };
    debug!(file = %request.filename, action = %request.handover.action, "handing over content");

    let description = request.describe();
    if target.handover_content(info) {
      events.audit(AuditStatus::Info, "Handover", "Handover target reported success", Some(description));
      outcome.accepted.push(request.filename.clone());
    } else if request.handover.failonerror {
      events.audit(AuditStatus::Failure, "Handover", "Handover target reported a failure", Some(description));
      failed.push(request.filename.clone());
    } else {
      events.audit(AuditStatus::Warn, "Handover", "Handover target reported a failure", Some(description));
      outcome.rejected.push(request.filename.clone());
    }
  }

  let attempted = outcome.attempted() + failed.len();
  if !failed.is_empty() {
    return Err(HandoverError::Rejected { failed, attempted });
  }
  info!(attempted, rejected = outcome.rejected.len(), "handovers complete");
  Ok(outcome)
}

fn open_payload(payload: &HandoverPayload) -> Result<Box<dyn Read + Send>, HandoverError> {
  match payload {
    HandoverPayload::Path(path) => {
      let file = fs::File::open(path).map_err(|source| HandoverError::Open {
        path: path.display().to_string(),
        source,
      })?;
      Ok(Box::new(io::BufReader::new(file)))
    }
    HandoverPayload::Bytes(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
  }
}
