//! Token parsing and substitution for bundle content.
//!
//! Bundle files marked for realization may contain `@@name@@` tokens which are
//! replaced with resolved configuration values at deployment time.
//!
//! # Token Format
//!
//! A token is `@@` followed by a name made of ASCII letters, digits, `.`, `_`
//! or `-`, closed by `@@`. Anything else (e.g. `@@ not a token @@`, a lone
//! `@@`) is literal text and passes through unchanged.
//!
//! # Unknown Tokens
//!
//! Tokens naming a value the engine knows nothing about are left verbatim.
//! Tokens naming a *declared* property that resolved to no value are an error
//! when realizing strictly, see [`TemplateEngine::realize`].
//!
//! # Example
//!
//! ```
//! use deployer_lib::template::{Segment, parse};
//!
//! let segments = parse("port=@@listener.port@@");
//! assert_eq!(segments, vec![
//!     Segment::Literal("port=".to_string()),
//!     Segment::Token("listener.port".to_string()),
//! ]);
//! ```

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

const DELIMITER: &str = "@@";

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text (no tokens)
  Literal(String),

  /// A `@@name@@` token
  Token(String),
}

/// Errors that can occur during realization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
  #[error("token @@{token}@@ names property '{token}' which has no value")]
  Unresolved { token: String },

  #[error("content of {path} is not valid UTF-8 and cannot be realized")]
  NotText { path: String },
}

/// Source of token values.
pub trait Resolver {
  /// Value for `name`, or `None` if the name is unknown.
  fn resolve(&self, name: &str) -> Option<&str>;

  /// Whether `name` must resolve when realizing strictly.
  fn is_required(&self, _name: &str) -> bool {
    false
  }
}

/// Parse a string containing `@@name@@` tokens into segments.
///
/// Parsing never fails: malformed tokens become literal text.
pub fn parse(input: &str) -> Vec<Segment> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut rest = input;

  while let Some(start) = rest.find(DELIMITER) {
    let after_open = &rest[start + DELIMITER.len()..];
    let token = after_open
      .find(DELIMITER)
      .map(|end| &after_open[..end])
      .filter(|name| is_token_name(name));

    match token {
      Some(name) => {
        literal.push_str(&rest[..start]);
        if !literal.is_empty() {
          segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Token(name.to_string()));
        rest = &after_open[name.len() + DELIMITER.len()..];
      }
      None => {
        // Keep the first `@` and retry from the second so `@@@name@@` still finds its token.
        literal.push_str(&rest[..start + 1]);
        rest = &rest[start + 1..];
      }
    }
  }

  literal.push_str(rest);
  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  segments
}

fn is_token_name(name: &str) -> bool {
  !name.is_empty()
    && name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Substitute tokens, leaving unknown ones verbatim.
pub fn substitute(input: &str, resolver: &impl Resolver) -> String {
  substitute_segments(&parse(input), resolver)
}

/// Substitute tokens in pre-parsed segments, leaving unknown ones verbatim.
pub fn substitute_segments(segments: &[Segment], resolver: &impl Resolver) -> String {
  let mut result = String::new();
  for segment in segments {
    match segment {
      Segment::Literal(s) => result.push_str(s),
      Segment::Token(name) => match resolver.resolve(name) {
        Some(value) => result.push_str(value),
        None => {
          result.push_str(DELIMITER);
          result.push_str(name);
          result.push_str(DELIMITER);
        }
      },
    }
  }
  result
}

/// Substitute tokens, failing on required tokens that have no value.
pub fn substitute_strict(input: &str, resolver: &impl Resolver) -> Result<String, TemplateError> {
  let segments = parse(input);
  for segment in &segments {
    if let Segment::Token(name) = segment
      && resolver.resolve(name).is_none()
      && resolver.is_required(name)
    {
      return Err(TemplateError::Unresolved { token: name.clone() });
    }
  }
  Ok(substitute_segments(&segments, resolver))
}

/// Token values for one deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateEngine {
  tokens: BTreeMap<String, String>,
  declared_without_value: BTreeSet<String>,
}

impl TemplateEngine {
  pub fn new(tokens: BTreeMap<String, String>) -> Self {
    Self {
      tokens,
      declared_without_value: BTreeSet::new(),
    }
  }

  /// Names of declared properties that have no value; strict realization fails on them.
  pub fn with_declared_without_value(mut self, names: impl IntoIterator<Item = String>) -> Self {
    self.declared_without_value.extend(names);
    self
  }

  pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
    let name = name.into();
    self.declared_without_value.remove(&name);
    self.tokens.insert(name, value.into());
  }

  pub fn tokens(&self) -> &BTreeMap<String, String> {
    &self.tokens
  }

  /// Replace known tokens, leaving everything else as-is.
  pub fn replace_tokens(&self, content: &str) -> String {
    substitute(content, self)
  }

  /// Replace tokens, failing on declared properties that have no value.
  pub fn realize(&self, content: &str) -> Result<String, TemplateError> {
    substitute_strict(content, self)
  }

  /// Realize raw file content. `path` is used for error context only.
  pub fn realize_bytes(&self, content: &[u8], path: &str) -> Result<String, TemplateError> {
    let text = std::str::from_utf8(content).map_err(|_| TemplateError::NotText { path: path.to_string() })?;
    self.realize(text)
  }
}

impl Resolver for TemplateEngine {
  fn resolve(&self, name: &str) -> Option<&str> {
    self.tokens.get(name).map(String::as_str)
  }

  fn is_required(&self, name: &str) -> bool {
    self.declared_without_value.contains(name)
  }
}
