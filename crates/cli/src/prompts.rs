//! Confirmation before a purge removes a destination.

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;

use anyhow::{Result, bail};

/// The question asked before purging one destination directory.
pub struct PurgeConfirmation<'a> {
  deploy_dir: &'a Path,
  force: bool,
}

impl<'a> PurgeConfirmation<'a> {
  /// `force` answers yes without asking.
  pub fn new(deploy_dir: &'a Path, force: bool) -> Self {
    Self { deploy_dir, force }
  }

  /// Ask on stderr and read the answer from stdin.
  ///
  /// Fails instead of asking when stdin or stderr is not a terminal.
  pub fn ask(&self) -> Result<bool> {
    if self.force {
      return Ok(true);
    }

    if !io::stdin().is_terminal() || !io::stderr().is_terminal() {
      bail!(
        "Refusing to purge {} without confirmation in non-interactive mode. Use --force to proceed.",
        self.deploy_dir.display()
      );
    }

    self.read_answer(&mut io::stdin().lock(), &mut io::stderr())
  }

  fn read_answer(&self, input: &mut impl BufRead, prompt: &mut impl Write) -> Result<bool> {
    write!(
      prompt,
      "Remove the deployed bundle and its metadata from {}? [y/N] ",
      self.deploy_dir.display()
    )?;
    prompt.flush()?;

    let mut answer = String::new();
    // End of input declines.
    if input.read_line(&mut answer)? == 0 {
      return Ok(false);
    }
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
  }
}
