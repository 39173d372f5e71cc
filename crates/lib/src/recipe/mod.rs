//! Bundle recipes.
//!
//! A recipe is an XML document declaring the bundle (name, version,
//! input properties), one or more deployment units with their content
//! directives, and the hook targets run around deployment.

pub mod fileset;
mod parse;
mod types;

pub use fileset::Fileset;
pub use types::*;
