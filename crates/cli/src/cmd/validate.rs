//! Implementation of the `deployer validate` command.

use std::path::Path;

use anyhow::{Context, Result};

use deployer_lib::project::BundleLauncher;

use crate::output::{OutputFormat, print_json, print_stat, print_success, symbols};

pub fn cmd_validate(recipe: &Path, verbose: bool, output: OutputFormat) -> Result<()> {
  let project = BundleLauncher::new()
    .parse(recipe)
    .with_context(|| format!("Invalid recipe: {}", recipe.display()))?;
  let units = &project.recipe.bundle.units;

  if output.is_json() {
    let unit_list: Vec<_> = units
      .iter()
      .map(|u| {
        serde_json::json!({
          "name": u.name,
          "dir": u.dir,
          "compliance": u.compliance,
          "directives": u.directives.iter().map(|d| d.describe()).collect::<Vec<_>>(),
        })
      })
      .collect();
    let json_output = serde_json::json!({
      "bundle": project.bundle_name,
      "version": project.bundle_version,
      "description": project.bundle_description,
      "configuration": project.configuration_definition,
      "files": project.bundle_file_names,
      "urls": project.url_files,
      "units": unit_list,
    });
    return print_json(&json_output);
  }

  print_success(&format!("Valid recipe: {} {}", project.bundle_name, project.bundle_version));
  if let Some(description) = &project.bundle_description {
    print_stat("Description", description);
  }
  print_stat("Deployment units", &units.len().to_string());
  print_stat("Input properties", &project.configuration_definition.len().to_string());
  print_stat("Bundle files", &project.bundle_file_names.len().to_string());
  if !project.url_files.is_empty() {
    print_stat("URLs", &project.url_files.len().to_string());
  }

  if verbose {
    for property in project.configuration_definition.iter() {
      let default = property.default_value.as_deref().unwrap_or("-");
      let required = if property.required { "required" } else { "optional" };
      println!(
        "  {} {} ({}, {required}, default {default})",
        symbols::INFO,
        property.name,
        property.property_type.as_str()
      );
    }
    for unit in units {
      println!();
      println!("Unit {} ({}):", unit.name, unit.compliance);
      for directive in &unit.directives {
        println!("  {} {}", symbols::INFO, directive.describe());
      }
    }
  }

  Ok(())
}
