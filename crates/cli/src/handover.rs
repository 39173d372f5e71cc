//! Handover target that drops content into a directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use deployer_lib::handover::{HandoverInfo, HandoverTarget};

/// Accepts every handover by copying its content to `<root>/<action>/<filename>`.
///
/// Parameters are written next to the content as `<filename>.params`, one `key=value` per line.
#[derive(Debug, Clone)]
pub struct DirectoryHandoverTarget {
  root: PathBuf,
}

impl DirectoryHandoverTarget {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  fn store(&self, mut info: HandoverInfo) -> io::Result<PathBuf> {
    let dir = self.root.join(sanitize(&info.action));
    fs::create_dir_all(&dir)?;

    let path = dir.join(sanitize(&info.filename));
    let mut file = fs::File::create(&path)?;
    io::copy(&mut info.content, &mut file)?;

    if !info.params.is_empty() {
      let params: String = info.params.iter().map(|(k, v)| format!("{k}={v}\n")).collect();
      fs::write(params_path(&path), params)?;
    }
    Ok(path)
  }
}

impl HandoverTarget for DirectoryHandoverTarget {
  fn handover_content(&mut self, info: HandoverInfo) -> bool {
    let filename = info.filename.clone();
    match self.store(info) {
      Ok(path) => {
        info!(file = %filename, path = %path.display(), "accepted handover");
        true
      }
      Err(e) => {
        warn!(file = %filename, root = %self.root.display(), error = %e, "failed to store handover");
        false
      }
    }
  }
}

/// Keep a name to a single path component.
fn sanitize(name: &str) -> String {
  let name: String = name
    .chars()
    .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
    .collect();
  match name.as_str() {
    "" | "." | ".." => "_".to_string(),
    _ => name,
  }
}

fn params_path(path: &Path) -> PathBuf {
  let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
  name.push(".params");
  path.with_file_name(name)
}
