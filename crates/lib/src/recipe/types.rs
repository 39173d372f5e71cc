//! Typed recipe tree.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::config::ConfigurationDefinition;
use crate::types::DestinationCompliance;

use super::fileset::Fileset;

/// Errors found while reading or validating a recipe.
#[derive(Debug, Error)]
pub enum RecipeError {
  #[error("failed to read recipe {path}: {message}")]
  Read { path: String, message: String },

  #[error("malformed recipe XML at byte {position}: {message}")]
  Xml { position: u64, message: String },

  #[error("{0}")]
  Invalid(String),
}

impl RecipeError {
  pub(crate) fn invalid(message: impl Into<String>) -> Self {
    RecipeError::Invalid(message.into())
  }
}

/// A parsed bundle recipe.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
  /// Name of the enclosing `<project>`.
  pub project_name: Option<String>,
  pub bundle: BundleDecl,
  /// Named hook targets, by name.
  pub targets: BTreeMap<String, HookTarget>,
}

impl Recipe {
  /// Bundle file names referenced by file and archive directives, in declaration order.
  pub fn bundle_file_names(&self) -> BTreeSet<String> {
    self
      .bundle
      .units
      .iter()
      .flat_map(|u| u.directives.iter())
      .filter_map(|d| match d.source() {
        ContentRef::Bundle(name) => Some(name.clone()),
        ContentRef::Url(_) => None,
      })
      .collect()
  }

  /// URLs referenced by url-file and url-archive directives.
  pub fn urls(&self) -> BTreeSet<String> {
    self
      .bundle
      .units
      .iter()
      .flat_map(|u| u.directives.iter())
      .filter_map(|d| match d.source() {
        ContentRef::Url(url) => Some(url.clone()),
        ContentRef::Bundle(_) => None,
      })
      .collect()
  }
}

/// The `<rhq:bundle>` element.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleDecl {
  pub name: String,
  pub version: String,
  pub description: Option<String>,
  pub configuration: ConfigurationDefinition,
  pub units: Vec<DeploymentUnit>,
}

/// One destination directory and what goes into it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentUnit {
  pub name: String,
  /// Destination relative to the deploy directory, or absolute. `None` is the deploy directory.
  pub dir: Option<String>,
  pub compliance: DestinationCompliance,
  pub preinstall_target: Option<String>,
  pub postinstall_target: Option<String>,
  pub directives: Vec<Directive>,
  pub ignore: Vec<Fileset>,
}

impl DeploymentUnit {
  /// `dir` as a path, empty for the deploy directory itself.
  pub fn root(&self) -> PathBuf {
    PathBuf::from(self.dir.as_deref().unwrap_or(""))
  }
}

/// Whether one directory is the other or lies below it, comparing lexically.
///
/// Units must not share any part of a tree: each one's rescan and compliance purge
/// would treat the other's files and metadata as foreign.
pub fn roots_overlap(a: &Path, b: &Path) -> bool {
  let (a, b) = (lexical(a), lexical(b));
  a.starts_with(&b) || b.starts_with(&a)
}

fn lexical(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        if !out.pop() {
          out.push("..");
        }
      }
      other => out.push(other.as_os_str()),
    }
  }
  out
}

/// Where directive content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentRef {
  /// A file packaged with the bundle, by bundle-relative name (or an absolute path).
  Bundle(String),
  /// Remote content.
  Url(String),
}

/// Destination override of a file directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
  /// Same relative path as in the bundle.
  Default,
  /// `destinationFile`: exact path, relative to the destination or absolute.
  File(String),
  /// `destinationDir`: a directory receiving the file under its own name.
  Dir(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDirective {
  pub source: ContentRef,
  pub destination: Destination,
  pub replace: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveDirective {
  pub source: ContentRef,
  pub destination_dir: Option<String>,
  pub exploded: bool,
  /// Entries matching these filesets are realized.
  pub replace: Vec<Fileset>,
}

/// Delegation of content to an external installer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handover {
  pub action: String,
  pub failonerror: bool,
  pub params: BTreeMap<String, String>,
}

/// Content handed over instead of written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandedOver {
  File(FileDirective),
  Archive(ArchiveDirective),
}

/// One content directive of a deployment unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
  File(FileDirective),
  Archive(ArchiveDirective),
  Handover { content: HandedOver, handover: Handover },
}

impl Directive {
  pub fn source(&self) -> &ContentRef {
    match self {
      Directive::File(f) => &f.source,
      Directive::Archive(a) => &a.source,
      Directive::Handover { content, .. } => match content {
        HandedOver::File(f) => &f.source,
        HandedOver::Archive(a) => &a.source,
      },
    }
  }

  /// Short description used in audit messages and errors.
  pub fn describe(&self) -> String {
    let source = match self.source() {
      ContentRef::Bundle(name) => name.as_str(),
      ContentRef::Url(url) => url.as_str(),
    };
    match self {
      Directive::File(_) => format!("file [{source}]"),
      Directive::Archive(_) => format!("archive [{source}]"),
      Directive::Handover { handover, .. } => format!("handover [{source}] action [{}]", handover.action),
    }
  }
}

/// A named target run before or after deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookTarget {
  pub name: String,
  pub tasks: Vec<HookTask>,
}

/// Tasks allowed inside hook targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookTask {
  /// Set a project property unless it is already set.
  Property { name: String, value: String },
  Echo { message: String },
  /// Record an audit message.
  Audit {
    status: String,
    action: String,
    info: String,
    message: Option<String>,
    details: Option<String>,
  },
}
