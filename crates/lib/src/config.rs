//! Configuration definitions declared by a bundle and their resolution.
//!
//! A bundle declares typed input properties. Resolution merges, lowest
//! precedence first:
//!
//! 1. the declared default value
//! 2. values from an external properties file
//! 3. input properties supplied with the deployment
//!
//! Typed values are checked during resolution, and every required property
//! must end up with a value.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while resolving a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("required property '{name}' has no value")]
  MissingRequired { name: String },

  #[error("property '{name}' expects a value of type {expected}, got '{value}'")]
  InvalidValue {
    name: String,
    expected: PropertyType,
    value: String,
  },

  #[error("missing invocation property '{name}'")]
  MissingInput { name: String },

  #[error("invalid invocation property '{name}': {message}")]
  InvalidInput { name: String, message: String },

  #[error("failed to load external properties from {location}: {message}")]
  ExternalProperties { location: String, message: String },
}

/// Declared type of an input property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyType {
  String,
  LongString,
  Integer,
  Long,
  Float,
  Double,
  Boolean,
  Password,
  File,
  Directory,
}

impl PropertyType {
  pub fn as_str(self) -> &'static str {
    match self {
      PropertyType::String => "string",
      PropertyType::LongString => "longString",
      PropertyType::Integer => "integer",
      PropertyType::Long => "long",
      PropertyType::Float => "float",
      PropertyType::Double => "double",
      PropertyType::Boolean => "boolean",
      PropertyType::Password => "password",
      PropertyType::File => "file",
      PropertyType::Directory => "directory",
    }
  }

  /// Whether `value` is acceptable for this type.
  pub fn accepts(self, value: &str) -> bool {
    let value = value.trim();
    match self {
      PropertyType::Integer => value.parse::<i32>().is_ok(),
      PropertyType::Long => value.parse::<i64>().is_ok(),
      PropertyType::Float => value.parse::<f32>().is_ok(),
      PropertyType::Double => value.parse::<f64>().is_ok(),
      PropertyType::Boolean => value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false"),
      _ => true,
    }
  }
}

impl fmt::Display for PropertyType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for PropertyType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let ty = match s.to_ascii_lowercase().as_str() {
      "string" => PropertyType::String,
      "longstring" => PropertyType::LongString,
      "integer" | "int" => PropertyType::Integer,
      "long" => PropertyType::Long,
      "float" => PropertyType::Float,
      "double" => PropertyType::Double,
      "boolean" => PropertyType::Boolean,
      "password" => PropertyType::Password,
      "file" => PropertyType::File,
      "directory" => PropertyType::Directory,
      _ => return Err(format!("unknown property type '{s}'")),
    };
    Ok(ty)
  }
}

/// A declared input property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDefinition {
  pub name: String,
  pub property_type: PropertyType,
  pub required: bool,
  pub default_value: Option<String>,
  pub description: Option<String>,
}

impl PropertyDefinition {
  pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
    Self {
      name: name.into(),
      property_type,
      required: true,
      default_value: None,
      description: None,
    }
  }

  pub fn optional(mut self) -> Self {
    self.required = false;
    self
  }

  pub fn with_default(mut self, value: impl Into<String>) -> Self {
    self.default_value = Some(value.into());
    self
  }
}

/// Ordered set of property declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationDefinition {
  properties: Vec<PropertyDefinition>,
}

impl ConfigurationDefinition {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a declaration. Returns false if the name was already declared.
  pub fn add(&mut self, definition: PropertyDefinition) -> bool {
    if self.get(&definition.name).is_some() {
      return false;
    }
    self.properties.push(definition);
    true
  }

  pub fn get(&self, name: &str) -> Option<&PropertyDefinition> {
    self.properties.iter().find(|p| p.name == name)
  }

  pub fn iter(&self) -> impl Iterator<Item = &PropertyDefinition> {
    self.properties.iter()
  }

  pub fn len(&self) -> usize {
    self.properties.len()
  }

  pub fn is_empty(&self) -> bool {
    self.properties.is_empty()
  }
}

/// Resolved values of the declared properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
  values: BTreeMap<String, String>,
}

impl Configuration {
  pub fn get(&self, name: &str) -> Option<&str> {
    self.values.get(name).map(String::as_str)
  }

  pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
    self.values.insert(name.into(), value.into());
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
    self.values.iter()
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  pub fn into_map(self) -> BTreeMap<String, String> {
    self.values
  }
}

/// Resolve every declared property against external and input values.
pub fn resolve(
  definition: &ConfigurationDefinition,
  external: &BTreeMap<String, String>,
  inputs: &BTreeMap<String, String>,
) -> Result<Configuration, ConfigError> {
  let mut configuration = Configuration::default();

  for property in definition.iter() {
    let value = inputs
      .get(&property.name)
      .or_else(|| external.get(&property.name))
      .or(property.default_value.as_ref());

    match value {
      Some(value) => {
        if !property.property_type.accepts(value) {
          return Err(ConfigError::InvalidValue {
            name: property.name.clone(),
            expected: property.property_type,
            value: value.clone(),
          });
        }
        configuration.set(&property.name, value);
      }
      None if property.required => {
        return Err(ConfigError::MissingRequired {
          name: property.name.clone(),
        });
      }
      None => {}
    }
  }

  Ok(configuration)
}

/// Names of declared properties that resolved to no value.
pub fn unresolved_names(definition: &ConfigurationDefinition, configuration: &Configuration) -> Vec<String> {
  definition
    .iter()
    .filter(|p| configuration.get(&p.name).is_none())
    .map(|p| p.name.clone())
    .collect()
}

/// Parse `key=value` properties text.
///
/// Supports `#`/`!` comments, `=` or `:` separators and trailing-backslash line continuations.
pub fn parse_properties(text: &str) -> BTreeMap<String, String> {
  let mut properties = BTreeMap::new();
  let mut logical = String::new();

  for raw in text.lines() {
    let line = raw.trim_start();
    if logical.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
      continue;
    }

    if let Some(continued) = line.strip_suffix('\\') {
      logical.push_str(continued);
      continue;
    }
    logical.push_str(line);

    let entry = std::mem::take(&mut logical);
    let (key, value) = match entry.find(['=', ':']) {
      Some(pos) => (&entry[..pos], &entry[pos + 1..]),
      None => (entry.as_str(), ""),
    };
    let key = key.trim();
    if !key.is_empty() {
      properties.insert(key.to_string(), value.trim_start().to_string());
    }
  }

  properties
}
