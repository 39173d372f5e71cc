//! XML recipe parsing.
//!
//! The document is first read into a generic element tree (namespace
//! prefixes dropped, only local names kept), which is then validated and
//! converted into the typed [`Recipe`].

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::warn;

use crate::config::{ConfigurationDefinition, PropertyDefinition, PropertyType};
use crate::types::DestinationCompliance;

use super::fileset::{self, Fileset};
use super::types::{
  ArchiveDirective, BundleDecl, ContentRef, DeploymentUnit, Destination, Directive, FileDirective, HandedOver,
  Handover, HookTarget, HookTask, Recipe, RecipeError, roots_overlap,
};

#[derive(Debug, Default)]
struct Element {
  name: String,
  attrs: BTreeMap<String, String>,
  children: Vec<Element>,
  text: String,
}

impl Element {
  fn attr(&self, name: &str) -> Option<&str> {
    self.attrs.get(name).map(String::as_str).filter(|v| !v.trim().is_empty())
  }

  fn required_attr(&self, name: &str) -> Result<&str, RecipeError> {
    self
      .attr(name)
      .ok_or_else(|| RecipeError::invalid(format!("<{}> requires the '{name}' attribute", self.name)))
  }

  fn bool_attr(&self, name: &str, default: bool) -> Result<bool, RecipeError> {
    match self.attr(name) {
      None => Ok(default),
      Some(value) => parse_bool(value).ok_or_else(|| {
        RecipeError::invalid(format!(
          "<{}> attribute '{name}' must be true or false, got '{value}'",
          self.name
        ))
      }),
    }
  }

  fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
    self.children.iter().filter(move |c| c.name == name)
  }
}

fn parse_bool(value: &str) -> Option<bool> {
  match value.trim().to_ascii_lowercase().as_str() {
    "true" | "yes" | "on" => Some(true),
    "false" | "no" | "off" => Some(false),
    _ => None,
  }
}

impl Recipe {
  /// Read and parse a recipe file.
  pub fn from_file(path: &Path) -> Result<Recipe, RecipeError> {
    let content = fs::read_to_string(path).map_err(|e| RecipeError::Read {
      path: path.display().to_string(),
      message: e.to_string(),
    })?;
    Recipe::parse_str(&content)
  }

  /// Parse and validate recipe XML.
  pub fn parse_str(xml: &str) -> Result<Recipe, RecipeError> {
    let root = read_tree(xml)?;
    convert_project(&root)
  }
}

fn read_tree(xml: &str) -> Result<Element, RecipeError> {
  let mut reader = Reader::from_str(xml);
  reader.config_mut().trim_text(true);

  let mut stack: Vec<Element> = Vec::new();
  let mut root: Option<Element> = None;

  loop {
    let event = reader.read_event().map_err(|e| RecipeError::Xml {
      position: reader.error_position() as u64,
      message: e.to_string(),
    })?;
    let xml_err = |message: String| RecipeError::Xml {
      position: reader.buffer_position() as u64,
      message,
    };

    match event {
      Event::Start(start) => stack.push(element_from(&start).map_err(xml_err)?),
      Event::Empty(start) => {
        let element = element_from(&start).map_err(xml_err)?;
        attach(&mut stack, &mut root, element).map_err(xml_err)?;
      }
      Event::End(_) => {
        let element = stack
          .pop()
          .ok_or_else(|| xml_err("unexpected closing tag".to_string()))?;
        attach(&mut stack, &mut root, element).map_err(xml_err)?;
      }
      Event::Text(text) => {
        let text = text.unescape().map_err(|e| xml_err(e.to_string()))?;
        if let Some(top) = stack.last_mut() {
          top.text.push_str(&text);
        }
      }
      Event::CData(data) => {
        if let Some(top) = stack.last_mut() {
          top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
        }
      }
      Event::Eof => break,
      _ => {}
    }
  }

  if let Some(open) = stack.last() {
    return Err(RecipeError::Xml {
      position: xml.len() as u64,
      message: format!("element <{}> is never closed", open.name),
    });
  }
  root.ok_or_else(|| RecipeError::invalid("recipe document is empty"))
}

fn element_from(start: &BytesStart<'_>) -> Result<Element, String> {
  let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
  let mut attrs = BTreeMap::new();

  for attr in start.attributes() {
    let attr = attr.map_err(|e| e.to_string())?;
    if attr.key.as_ref().starts_with(b"xmlns") {
      continue;
    }
    let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
    let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
    attrs.insert(key, value);
  }

  Ok(Element {
    name,
    attrs,
    ..Element::default()
  })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<(), String> {
  match stack.last_mut() {
    Some(parent) => {
      parent.children.push(element);
      Ok(())
    }
    None if root.is_none() => {
      *root = Some(element);
      Ok(())
    }
    None => Err("document has more than one root element".to_string()),
  }
}

fn convert_project(root: &Element) -> Result<Recipe, RecipeError> {
  if root.name != "project" {
    return Err(RecipeError::invalid(format!(
      "recipe root element must be <project>, found <{}>",
      root.name
    )));
  }

  let mut targets = BTreeMap::new();
  for target in root.children_named("target") {
    let converted = convert_target(target)?;
    if targets.insert(converted.name.clone(), converted).is_some() {
      return Err(RecipeError::invalid(format!(
        "target '{}' is declared more than once",
        target.attr("name").unwrap_or_default()
      )));
    }
  }

  let bundles: Vec<&Element> = root.children_named("bundle").collect();
  let bundle = match bundles.as_slice() {
    [] => return Err(RecipeError::invalid("recipe is missing the <rhq:bundle> element")),
    [bundle] => convert_bundle(bundle)?,
    _ => return Err(RecipeError::invalid("recipe declares more than one <rhq:bundle> element")),
  };

  for child in &root.children {
    if child.name != "target" && child.name != "bundle" {
      warn!(element = %child.name, "ignoring unsupported top-level recipe element");
    }
  }

  for unit in &bundle.units {
    for (kind, target) in [
      ("preinstall", &unit.preinstall_target),
      ("postinstall", &unit.postinstall_target),
    ] {
      if let Some(target) = target
        && !targets.contains_key(target)
      {
        return Err(RecipeError::invalid(format!(
          "deployment unit '{}' names {kind} target '{target}' which does not exist",
          unit.name
        )));
      }
    }
  }

  Ok(Recipe {
    project_name: root.attr("name").map(str::to_string),
    bundle,
    targets,
  })
}

fn convert_bundle(element: &Element) -> Result<BundleDecl, RecipeError> {
  let name = element
    .attr("name")
    .ok_or_else(|| RecipeError::invalid("<rhq:bundle> must declare a name"))?;
  let version = element
    .attr("version")
    .ok_or_else(|| RecipeError::invalid("<rhq:bundle> must declare a version"))?;

  let mut configuration = ConfigurationDefinition::new();
  let mut units = Vec::new();

  for child in &element.children {
    match child.name.as_str() {
      "input-property" => {
        let property = convert_input_property(child)?;
        let name = property.name.clone();
        if !configuration.add(property) {
          return Err(RecipeError::invalid(format!(
            "input property '{name}' is declared more than once"
          )));
        }
      }
      "deployment-unit" => units.push(convert_unit(child, name)?),
      other => {
        return Err(RecipeError::invalid(format!(
          "unsupported element <{other}> in <rhq:bundle>"
        )));
      }
    }
  }

  if units.is_empty() {
    return Err(RecipeError::invalid(
      "<rhq:bundle> must declare at least one <rhq:deployment-unit>",
    ));
  }

  // Absolute dirs are compared with relative ones once the deploy dir is known.
  for (i, unit) in units.iter().enumerate() {
    for earlier in &units[..i] {
      let (a, b) = (earlier.root(), unit.root());
      if a.is_absolute() == b.is_absolute() && roots_overlap(&a, &b) {
        return Err(RecipeError::invalid(format!(
          "deployment units '{}' and '{}' deploy into overlapping directories '{}' and '{}'",
          earlier.name,
          unit.name,
          earlier.dir.as_deref().unwrap_or("."),
          unit.dir.as_deref().unwrap_or("."),
        )));
      }
    }
  }

  Ok(BundleDecl {
    name: name.to_string(),
    version: version.to_string(),
    description: element.attr("description").map(str::to_string),
    configuration,
    units,
  })
}

fn convert_input_property(element: &Element) -> Result<PropertyDefinition, RecipeError> {
  let name = element.required_attr("name")?;
  let property_type = match element.attr("type") {
    Some(ty) => ty
      .parse::<PropertyType>()
      .map_err(|e| RecipeError::invalid(format!("input property '{name}': {e}")))?,
    None => PropertyType::String,
  };

  Ok(PropertyDefinition {
    name: name.to_string(),
    property_type,
    required: element.bool_attr("required", true)?,
    default_value: element.attrs.get("defaultValue").cloned(),
    description: element.attr("description").map(str::to_string),
  })
}

fn convert_unit(element: &Element, bundle_name: &str) -> Result<DeploymentUnit, RecipeError> {
  let name = element.attr("name").unwrap_or(bundle_name).to_string();
  let compliance = unit_compliance(element, &name)?;

  let mut directives = Vec::new();
  let mut ignore = Vec::new();
  for child in &element.children {
    match child.name.as_str() {
      "file" | "url-file" => directives.push(convert_file(child)?),
      "archive" | "url-archive" => directives.push(convert_archive(child)?),
      "ignore" => ignore.extend(convert_filesets(child)),
      other => {
        return Err(RecipeError::invalid(format!(
          "unsupported element <{other}> in deployment unit '{name}'"
        )));
      }
    }
  }

  if directives.is_empty() {
    return Err(RecipeError::invalid(format!(
      "You must specify at least one file to deploy via nested file, archive, url-file, url-archive types in deployment unit '{name}'"
    )));
  }

  fileset::compile(&ignore)
    .map_err(|e| RecipeError::invalid(format!("invalid ignore pattern in deployment unit '{name}': {e}")))?;

  Ok(DeploymentUnit {
    dir: element.attr("dir").map(str::to_string),
    compliance,
    preinstall_target: element.attr("preinstallTarget").map(str::to_string),
    postinstall_target: element.attr("postinstallTarget").map(str::to_string),
    directives,
    ignore,
    name,
  })
}

/// Map `compliance` or the legacy `manageRootDir` onto one compliance value.
fn unit_compliance(element: &Element, name: &str) -> Result<DestinationCompliance, RecipeError> {
  let explicit = element
    .attr("compliance")
    .map(|value| {
      value
        .parse::<DestinationCompliance>()
        .map_err(|e| RecipeError::invalid(format!("deployment unit '{name}': {e}")))
    })
    .transpose()?;

  let legacy = match element.attr("manageRootDir") {
    Some(_) => Some(DestinationCompliance::from_manage_root_dir(
      element.bool_attr("manageRootDir", true)?,
    )),
    None => None,
  };

  match (explicit, legacy) {
    (Some(compliance), None) => Ok(compliance),
    (None, Some(compliance)) => {
      warn!(unit = %name, %compliance, "manageRootDir is deprecated, use the compliance attribute");
      Ok(compliance)
    }
    (Some(compliance), Some(legacy)) if compliance == legacy => Ok(compliance),
    (Some(compliance), Some(legacy)) => Err(RecipeError::invalid(format!(
      "deployment unit '{name}' declares compliance '{compliance}' but manageRootDir implies '{legacy}'"
    ))),
    (None, None) => Err(RecipeError::invalid(format!(
      "deployment unit '{name}' must declare its destination compliance: set compliance=\"full\" or compliance=\"filesAndDirectories\""
    ))),
  }
}

fn content_ref(element: &Element) -> Result<ContentRef, RecipeError> {
  if element.name.starts_with("url-") {
    Ok(ContentRef::Url(element.required_attr("url")?.to_string()))
  } else {
    Ok(ContentRef::Bundle(element.required_attr("name")?.to_string()))
  }
}

fn convert_file(element: &Element) -> Result<Directive, RecipeError> {
  let source = content_ref(element)?;
  let destination = match (element.attr("destinationFile"), element.attr("destinationDir")) {
    (Some(_), Some(_)) => {
      return Err(RecipeError::invalid(format!(
        "<{}> may declare destinationFile or destinationDir, not both",
        element.name
      )));
    }
    (Some(file), None) => Destination::File(file.to_string()),
    (None, Some(dir)) => Destination::Dir(dir.to_string()),
    (None, None) if matches!(source, ContentRef::Url(_)) => {
      return Err(RecipeError::invalid(
        "<rhq:url-file> must declare destinationFile or destinationDir",
      ));
    }
    (None, None) => Destination::Default,
  };

  let file = FileDirective {
    source,
    destination,
    replace: element.bool_attr("replace", false)?,
  };

  Ok(match convert_handover(element)? {
    Some(handover) => Directive::Handover {
      content: HandedOver::File(file),
      handover,
    },
    None => Directive::File(file),
  })
}

fn convert_archive(element: &Element) -> Result<Directive, RecipeError> {
  let source = content_ref(element)?;
  let replace: Vec<Fileset> = element.children_named("replace").flat_map(convert_filesets).collect();
  fileset::compile(&replace).map_err(|e| RecipeError::invalid(format!("invalid replace pattern: {e}")))?;

  for child in &element.children {
    if !matches!(child.name.as_str(), "replace" | "handover") {
      return Err(RecipeError::invalid(format!(
        "unsupported element <{}> in <{}>",
        child.name, element.name
      )));
    }
  }

  let archive = ArchiveDirective {
    source,
    destination_dir: element.attr("destinationDir").map(str::to_string),
    exploded: element.bool_attr("exploded", true)?,
    replace,
  };

  Ok(match convert_handover(element)? {
    Some(handover) => Directive::Handover {
      content: HandedOver::Archive(archive),
      handover,
    },
    None => Directive::Archive(archive),
  })
}

fn convert_handover(element: &Element) -> Result<Option<Handover>, RecipeError> {
  let mut handovers = element.children_named("handover");
  let Some(handover) = handovers.next() else {
    return Ok(None);
  };
  if handovers.next().is_some() {
    return Err(RecipeError::invalid(format!(
      "<{}> may declare at most one <rhq:handover>",
      element.name
    )));
  }

  let mut params = BTreeMap::new();
  for param in &handover.children {
    if param.name != "handover-param" {
      return Err(RecipeError::invalid(format!(
        "unsupported element <{}> in <rhq:handover>",
        param.name
      )));
    }
    let name = param.required_attr("name")?;
    let value = param.attrs.get("value").cloned().unwrap_or_default();
    params.insert(name.to_string(), value);
  }

  Ok(Some(Handover {
    action: handover.required_attr("action")?.to_string(),
    failonerror: handover.bool_attr("failonerror", true)?,
    params,
  }))
}

fn convert_filesets(element: &Element) -> Vec<Fileset> {
  element
    .children_named("fileset")
    .filter_map(|f| f.attr("includes"))
    .map(Fileset::from_includes)
    .collect()
}

fn convert_target(element: &Element) -> Result<HookTarget, RecipeError> {
  let name = element.required_attr("name")?.to_string();
  let mut tasks = Vec::new();

  for task in &element.children {
    let converted = match task.name.as_str() {
      "property" => HookTask::Property {
        name: task.required_attr("name")?.to_string(),
        value: task.attrs.get("value").cloned().unwrap_or_default(),
      },
      "echo" => HookTask::Echo {
        message: task
          .attr("message")
          .map(str::to_string)
          .unwrap_or_else(|| task.text.clone()),
      },
      "audit" => HookTask::Audit {
        status: task.attr("status").unwrap_or("SUCCESS").to_string(),
        action: task.required_attr("action")?.to_string(),
        info: task.required_attr("info")?.to_string(),
        message: task.attr("message").map(str::to_string),
        details: Some(task.text.clone()).filter(|t| !t.is_empty()),
      },
      other => {
        return Err(RecipeError::invalid(format!(
          "unsupported task <{other}> in target '{name}'"
        )));
      }
    };
    tasks.push(converted);
  }

  Ok(HookTarget { name, tasks })
}
