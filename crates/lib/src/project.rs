//! Bundle launcher: parses a recipe and drives a deployment.
//!
//! [`BundleLauncher::parse`] only reads the recipe. [`BundleLauncher::execute`]
//! resolves the configuration, then prepares every deployment unit: its content
//! is located and its target set computed. Only then does each unit run, in
//! recipe order:
//!
//! 1. pre-install hook target
//! 2. deployer (diff and apply, or the dry run of it)
//! 3. handovers
//! 4. post-install hook target
//!
//! Configuration, content and template errors in any unit therefore surface
//! before the first destination is written.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{self, ConfigError, Configuration, ConfigurationDefinition};
use crate::consts::*;
use crate::deploy::{self, ArchiveFile, DeployDifferences, DeployError, Deployer, DeploymentData, RawFile};
use crate::events::{AuditEvent, AuditStatus, DeployPhase, EventSink, Events};
use crate::handover::{self, HandoverError, HandoverOutcome, HandoverPayload, HandoverRequest, HandoverTarget};
use crate::locator::{BundleSource, ContentLocator, ContentSource, LocatorError, url_to_filename};
use crate::manifest::FileHashcodeMap;
use crate::metadata::DeploymentProperties;
use crate::recipe::{
  ContentRef, DeploymentUnit, Destination, Directive, FileDirective, HandedOver, HookTask, Recipe, RecipeError,
  fileset, roots_overlap,
};
use crate::template::{TemplateEngine, TemplateError};
use crate::types::{DeploymentPhase, DestinationCompliance};

/// Errors of a bundle deployment.
#[derive(Debug, Error)]
pub enum ProjectError {
  #[error("invalid recipe: {0}")]
  Validation(#[from] RecipeError),

  #[error("configuration error: {0}")]
  Configuration(#[from] ConfigError),

  #[error("failed to locate content for {directive}: {source}")]
  ContentResolution {
    directive: String,
    #[source]
    source: LocatorError,
  },

  #[error("failed to realize {path}: {source}")]
  Template {
    path: String,
    #[source]
    source: TemplateError,
  },

  #[error(transparent)]
  HandoverRejected(HandoverError),

  #[error("failed to deploy bundle [{bundle}] version [{version}]: {source}")]
  Apply {
    bundle: String,
    version: String,
    #[source]
    source: DeployError,
  },
}

impl ProjectError {
  fn locating(directive: impl Into<String>, source: LocatorError) -> Self {
    ProjectError::ContentResolution {
      directive: directive.into(),
      source,
    }
  }

  fn deploying(properties: &DeploymentProperties, source: DeployError) -> Self {
    match source {
      DeployError::Template { path, source } => ProjectError::Template { path, source },
      other => ProjectError::Apply {
        bundle: properties.bundle_name.clone(),
        version: properties.bundle_version.clone(),
        source: other,
      },
    }
  }

  fn handing_over(source: HandoverError) -> Self {
    match source {
      HandoverError::Open { path, source } => ProjectError::locating(
        format!("handover content {path}"),
        LocatorError::Io { path, source },
      ),
      rejected => ProjectError::HandoverRejected(rejected),
    }
  }
}

/// A deployment unit whose content is located and whose target set is computed.
struct PreparedUnit {
  destination: PathBuf,
  deployer: Deployer,
  handovers: Vec<HandoverRequest>,
}

/// Property bag handed to [`BundleLauncher::execute`].
///
/// Invocation settings use the `rhq.deploy.*` names; every other entry is an input
/// property value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputProperties {
  values: BTreeMap<String, String>,
}

impl InputProperties {
  pub fn new(deploy_dir: impl AsRef<Path>, deploy_id: u64, phase: DeploymentPhase) -> Self {
    Self::default()
      .with(DEPLOY_DIR, deploy_dir.as_ref().display().to_string())
      .with(DEPLOY_ID, deploy_id.to_string())
      .with(DEPLOY_PHASE, phase.as_str())
  }

  pub fn from_map(values: BTreeMap<String, String>) -> Self {
    Self { values }
  }

  pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.set(name, value);
    self
  }

  pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
    self.values.insert(name.into(), value.into());
  }

  pub fn dry_run(self, dry_run: bool) -> Self {
    self.with(DEPLOY_DRY_RUN, dry_run.to_string())
  }

  pub fn revert(self, revert: bool) -> Self {
    self.with(DEPLOY_REVERT, revert.to_string())
  }

  pub fn clean(self, clean: bool) -> Self {
    self.with(DEPLOY_CLEAN, clean.to_string())
  }

  /// External properties file, a path or URL.
  pub fn properties_file(self, location: impl Into<String>) -> Self {
    self.with(DEPLOY_PROPERTIES_FILE, location)
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self.values.get(name).map(String::as_str)
  }

  pub fn values(&self) -> &BTreeMap<String, String> {
    &self.values
  }

  fn flag(&self, name: &str) -> Result<bool, ConfigError> {
    match self.get(name) {
      None => Ok(false),
      Some(value) => match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => Ok(true),
        "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidInput {
          name: name.to_string(),
          message: format!("'{value}' is not a boolean"),
        }),
      },
    }
  }
}

/// Settings of one invocation, parsed from [`InputProperties`].
#[derive(Debug, Clone, PartialEq, Eq)]
struct Invocation {
  deploy_dir: PathBuf,
  deploy_id: u64,
  phase: DeploymentPhase,
  dry_run: bool,
  revert: bool,
  clean: bool,
  properties_file: Option<String>,
}

impl Invocation {
  fn parse(inputs: &InputProperties) -> Result<Self, ConfigError> {
    let required = |name: &str| {
      inputs
        .get(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingInput { name: name.to_string() })
    };

    let deploy_dir = PathBuf::from(required(DEPLOY_DIR)?);
    if !deploy_dir.is_absolute() {
      return Err(ConfigError::InvalidInput {
        name: DEPLOY_DIR.to_string(),
        message: format!("'{}' is not an absolute path", deploy_dir.display()),
      });
    }
    let deploy_id = required(DEPLOY_ID)?
      .trim()
      .parse::<u64>()
      .map_err(|e| ConfigError::InvalidInput {
        name: DEPLOY_ID.to_string(),
        message: e.to_string(),
      })?;
    let phase = required(DEPLOY_PHASE)?
      .parse::<DeploymentPhase>()
      .map_err(|message| ConfigError::InvalidInput {
        name: DEPLOY_PHASE.to_string(),
        message,
      })?;

    Ok(Self {
      deploy_dir,
      deploy_id,
      phase,
      dry_run: inputs.flag(DEPLOY_DRY_RUN)?,
      revert: inputs.flag(DEPLOY_REVERT)?,
      clean: inputs.flag(DEPLOY_CLEAN)?,
      properties_file: inputs
        .get(DEPLOY_PROPERTIES_FILE)
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string),
    })
  }
}

/// Outcome of parsing or executing a recipe.
#[derive(Debug)]
pub struct Project {
  pub recipe: Recipe,
  pub bundle_name: String,
  pub bundle_version: String,
  pub bundle_description: Option<String>,
  pub configuration_definition: ConfigurationDefinition,
  /// Resolved values; after a plain parse, only declared defaults.
  pub configuration: Configuration,
  /// Distinct bundle files referenced by the recipe.
  pub bundle_file_names: BTreeSet<String>,
  /// URLs content is fetched from.
  pub url_files: BTreeSet<String>,
  /// Project properties, including those set by hook targets.
  pub properties: BTreeMap<String, String>,
  pub deploy_differences: DeployDifferences,
  /// Recorded manifest per destination directory.
  pub manifests: BTreeMap<PathBuf, FileHashcodeMap>,
  pub handovers: HandoverOutcome,
  pub dry_run: bool,
}

impl Project {
  fn from_recipe(recipe: Recipe) -> Self {
    let mut configuration = Configuration::default();
    for property in recipe.bundle.configuration.iter() {
      if let Some(default) = &property.default_value {
        configuration.set(&property.name, default);
      }
    }

    let bundle_file_names = recipe
      .bundle_file_names()
      .into_iter()
      .filter(|name| !Path::new(name).is_absolute())
      .collect();

    let mut properties = BTreeMap::new();
    properties.insert(BUNDLE_NAME.to_string(), recipe.bundle.name.clone());
    properties.insert(BUNDLE_VERSION.to_string(), recipe.bundle.version.clone());

    Self {
      bundle_name: recipe.bundle.name.clone(),
      bundle_version: recipe.bundle.version.clone(),
      bundle_description: recipe.bundle.description.clone(),
      configuration_definition: recipe.bundle.configuration.clone(),
      url_files: recipe.urls(),
      bundle_file_names,
      configuration,
      properties,
      deploy_differences: DeployDifferences::default(),
      manifests: BTreeMap::new(),
      handovers: HandoverOutcome::default(),
      dry_run: false,
      recipe,
    }
  }

  pub fn property(&self, name: &str) -> Option<&str> {
    self.properties.get(name).map(String::as_str)
  }

  /// Tag properties (`rhq.tag.[namespace.]semantic`), keyed without the prefix.
  pub fn tags(&self) -> BTreeMap<String, String> {
    self
      .properties
      .iter()
      .filter_map(|(k, v)| k.strip_prefix(DEPLOY_TAG_PREFIX).map(|tag| (tag.to_string(), v.clone())))
      .filter(|(tag, _)| !tag.is_empty())
      .collect()
  }

  /// Set a property unless it already has a value.
  fn define(&mut self, name: &str, value: String) {
    self.properties.entry(name.to_string()).or_insert(value);
  }
}

/// Parses recipes and executes bundle deployments.
#[derive(Default)]
pub struct BundleLauncher {
  handover_target: Option<Box<dyn HandoverTarget>>,
  bundle_dir: Option<PathBuf>,
}

impl std::fmt::Debug for BundleLauncher {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BundleLauncher")
      .field("handover_target", &self.handover_target.is_some())
      .field("bundle_dir", &self.bundle_dir)
      .finish()
  }
}

impl BundleLauncher {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register the receiver of handed-over content.
  pub fn with_handover_target(mut self, target: Box<dyn HandoverTarget>) -> Self {
    self.handover_target = Some(target);
    self
  }

  /// Look up bundle files in `dir` instead of next to the recipe.
  pub fn with_bundle_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.bundle_dir = Some(dir.into());
    self
  }

  fn bundle_source(&self, recipe_path: &Path) -> BundleSource {
    match &self.bundle_dir {
      Some(dir) => BundleSource::Directory(dir.clone()),
      None => BundleSource::for_recipe(recipe_path),
    }
  }

  /// Parse and validate a recipe (a recipe file, or a packaged bundle zip) without deploying.
  pub fn parse(&self, recipe_path: &Path) -> Result<Project, ProjectError> {
    let recipe = load_recipe(recipe_path)?;
    debug!(
      bundle = %recipe.bundle.name,
      version = %recipe.bundle.version,
      units = recipe.bundle.units.len(),
      "parsed recipe"
    );
    Ok(Project::from_recipe(recipe))
  }

  /// Parse a recipe and deploy it.
  pub async fn execute(
    &mut self,
    recipe_path: &Path,
    inputs: &InputProperties,
    sinks: Vec<Box<dyn EventSink>>,
  ) -> Result<Project, ProjectError> {
    let mut project = self.parse(recipe_path)?;
    let mut events = Events::new(sinks);
    events.phase(DeployPhase::NotStarted);

    match self.run(recipe_path, inputs, &mut project, &mut events).await {
      Ok(()) => Ok(project),
      Err(e) => {
        events.emit(
          AuditEvent::new(
            AuditStatus::Failure,
            "Error Occurred",
            "The deployment could not complete successfully.",
          )
          .with_message(e.to_string()),
        );
        Err(e)
      }
    }
  }

  async fn run(
    &mut self,
    recipe_path: &Path,
    inputs: &InputProperties,
    project: &mut Project,
    events: &mut Events,
  ) -> Result<(), ProjectError> {
    let invocation = Invocation::parse(inputs)?;
    project.dry_run = invocation.dry_run;

    let staging = tempfile::Builder::new()
      .prefix("bundle-staging-")
      .tempdir()
      .map_err(|e| {
        ProjectError::locating(
          "staging directory",
          LocatorError::Io {
            path: std::env::temp_dir().display().to_string(),
            source: e,
          },
        )
      })?;
    let locator = ContentLocator::new(self.bundle_source(recipe_path), staging.path());

    let external = match &invocation.properties_file {
      Some(location) => load_external_properties(&locator, location).await?,
      None => BTreeMap::new(),
    };

    project.configuration = config::resolve(&project.configuration_definition, &external, inputs.values())?;
    self.define_properties(project, &invocation, inputs, &external);
    let templates = template_engine(project);

    info!(
      bundle = %project.bundle_name,
      version = %project.bundle_version,
      deploy_id = invocation.deploy_id,
      dir = %invocation.deploy_dir.display(),
      phase = %invocation.phase,
      dry_run = invocation.dry_run,
      "deploying bundle"
    );

    if invocation.clean {
      events.audit(
        AuditStatus::Info,
        "Clean Requested",
        "The deployment directory will be cleaned",
        Some("Everything in the deployment directory will be removed before the new content is written".to_string()),
      );
    }
    if invocation.revert {
      events.audit(
        AuditStatus::Info,
        "Revert Requested",
        "The previous deployment will be reverted!",
        Some("The previous deployment will be reverted. An attempt to restore backed up files and the old deployment content will be made".to_string()),
      );
    }

    // Everything that can fail without touching a destination is done for all
    // units before any of them is deployed.
    let units = project.recipe.bundle.units.clone();
    let mut prepared: Vec<PreparedUnit> = Vec::with_capacity(units.len());
    for unit in &units {
      let next = self
        .prepare_unit(project, &invocation, unit, &locator, &templates, events)
        .await?;
      if let Some((other, earlier)) = units
        .iter()
        .zip(&prepared)
        .find(|(_, earlier)| roots_overlap(&earlier.destination, &next.destination))
      {
        return Err(
          RecipeError::Invalid(format!(
            "deployment units '{}' and '{}' deploy into overlapping directories {} and {}",
            other.name,
            unit.name,
            earlier.destination.display(),
            next.destination.display()
          ))
          .into(),
        );
      }
      prepared.push(next);
    }

    for (unit, prepared) in units.iter().zip(prepared) {
      if let Some(target) = &unit.preinstall_target {
        self.run_hook(project, target, "Pre-Install", events)?;
      }

      if unit.compliance == DestinationCompliance::Full && !invocation.dry_run {
        events.audit(
          AuditStatus::Info,
          "Managing Top Level Deployment Directory",
          "The top level deployment directory will be managed - files found there will be backed up and removed!",
          Some(format!(
            "Deployment unit [{}] fully manages its destination directory; files found there that are not part of the bundle will be removed and backed up",
            unit.name
          )),
        );
      }

      let mut diff = DeployDifferences::new();
      let manifest = self.deploy_unit(project, &invocation, &prepared, &mut diff, events)?;
      project.manifests.insert(prepared.destination, manifest);
      project.deploy_differences.merge(diff);

      if let Some(target) = &unit.postinstall_target {
        self.run_hook(project, target, "Post-Install", events)?;
      }
    }

    Ok(())
  }

  /// Locate a unit's content and compute its target set.
  async fn prepare_unit(
    &self,
    project: &Project,
    invocation: &Invocation,
    unit: &DeploymentUnit,
    locator: &ContentLocator,
    templates: &TemplateEngine,
    events: &mut Events,
  ) -> Result<PreparedUnit, ProjectError> {
    let destination = match unit.dir.as_deref() {
      None => invocation.deploy_dir.clone(),
      Some(dir) if Path::new(dir).is_absolute() => PathBuf::from(dir),
      Some(dir) => invocation.deploy_dir.join(dir),
    };

    let properties = DeploymentProperties::new(
      invocation.deploy_id,
      &project.bundle_name,
      &project.bundle_version,
      unit.compliance,
    )
    .with_description(project.bundle_description.clone());
    let mut data = DeploymentData::new(properties, locator.staging(), &destination);
    data.templates = templates.clone();
    data.ignore = fileset::compile(&unit.ignore)
      .map_err(|e| RecipeError::Invalid(format!("invalid ignore pattern in deployment unit '{}': {e}", unit.name)))?;

    let mut handovers = Vec::new();
    for directive in &unit.directives {
      events.audit(AuditStatus::Info, "Directive", &directive.describe(), None);
      self
        .collect_directive(directive, locator, templates, &mut data, &mut handovers, events)
        .await?;
    }

    let deployer = Deployer::new(data);
    deployer
      .compute_targets()
      .map_err(|e| ProjectError::deploying(&deployer.data().properties, e))?;
    debug!(unit = %unit.name, dir = %destination.display(), "deployment unit prepared");

    Ok(PreparedUnit {
      destination,
      deployer,
      handovers,
    })
  }

  fn define_properties(
    &self,
    project: &mut Project,
    invocation: &Invocation,
    inputs: &InputProperties,
    external: &BTreeMap<String, String>,
  ) {
    let mut merged = external.clone();
    merged.extend(inputs.values().iter().map(|(k, v)| (k.clone(), v.clone())));
    merged.extend(project.configuration.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged.insert(DEPLOY_DIR.to_string(), invocation.deploy_dir.display().to_string());
    merged.insert(DEPLOY_ID.to_string(), invocation.deploy_id.to_string());
    merged.insert(DEPLOY_PHASE.to_string(), invocation.phase.as_str().to_string());
    merged.insert(SYSTEM_OS_NAME.to_string(), std::env::consts::OS.to_string());
    merged.insert(SYSTEM_ARCHITECTURE.to_string(), std::env::consts::ARCH.to_string());
    project.properties.extend(merged);
  }

  async fn collect_directive(
    &self,
    directive: &Directive,
    locator: &ContentLocator,
    templates: &TemplateEngine,
    data: &mut DeploymentData,
    handovers: &mut Vec<HandoverRequest>,
    events: &mut Events,
  ) -> Result<(), ProjectError> {
    match directive {
      Directive::File(file) => {
        let destination = file_destination(file);
        let source = fetch(locator, &file.source, &destination, directive, events).await?;
        data.raw_files.push(RawFile {
          source,
          destination,
          realize: file.replace,
        });
      }
      Directive::Archive(archive) => {
        let name = content_name(&archive.source);
        let source = fetch(locator, &archive.source, &name, directive, events).await?;
        data.archives.push(ArchiveFile {
          source,
          name,
          destination_dir: archive.destination_dir.clone(),
          exploded: archive.exploded,
          realize: compile_replace(&archive.replace)?,
        });
      }
      Directive::Handover { content, handover } => {
        let (logical, source) = match content {
          HandedOver::File(file) => {
            let logical = file_destination(file);
            (logical.clone(), fetch(locator, &file.source, &logical, directive, events).await?)
          }
          HandedOver::Archive(archive) => {
            let logical = content_name(&archive.source);
            (logical.clone(), fetch(locator, &archive.source, &logical, directive, events).await?)
          }
        };
        let filename = Path::new(&logical)
          .file_name()
          .map(|n| n.to_string_lossy().into_owned())
          .unwrap_or(logical.clone());

        let payload = match content {
          HandedOver::File(file) if file.replace => {
            let bytes = std::fs::read(&source).map_err(|e| {
              ProjectError::locating(
                directive.describe(),
                LocatorError::Io {
                  path: source.display().to_string(),
                  source: e,
                },
              )
            })?;
            let text = templates
              .realize_bytes(&bytes, &logical)
              .map_err(|source| ProjectError::Template {
                path: logical.clone(),
                source,
              })?;
            HandoverPayload::Bytes(text.into_bytes())
          }
          HandedOver::Archive(archive) => match compile_replace(&archive.replace)? {
            Some(regex) => {
              let bytes = deploy::realize_archive(&source, &regex, templates)
                .map_err(|e| ProjectError::deploying(&data.properties, e))?;
              HandoverPayload::Bytes(bytes)
            }
            None => HandoverPayload::Path(source),
          },
          HandedOver::File(_) => HandoverPayload::Path(source),
        };

        handovers.push(HandoverRequest {
          filename,
          handover: handover.clone(),
          payload,
        });
      }
    }
    Ok(())
  }

  fn deploy_unit(
    &mut self,
    project: &mut Project,
    invocation: &Invocation,
    prepared: &PreparedUnit,
    diff: &mut DeployDifferences,
    events: &mut Events,
  ) -> Result<FileHashcodeMap, ProjectError> {
    let deployer = &prepared.deployer;

    if !invocation.dry_run {
      events.audit(AuditStatus::Success, "Deployer Started", "The deployer has started its work", None);
    }

    let deployed = if invocation.revert {
      deployer.redeploy_and_restore_backup_files(diff, invocation.clean, invocation.dry_run, events)
    } else {
      deployer.deploy(diff, invocation.clean, invocation.dry_run, events)
    };

    let result = deployed
      .map_err(|e| ProjectError::deploying(&deployer.data().properties, e))
      .and_then(|manifest| {
        self.hand_over(project, invocation, &prepared.handovers, events)?;
        Ok(manifest)
      });

    match result {
      Ok(manifest) => {
        if !invocation.dry_run {
          events.emit(
            AuditEvent::new(AuditStatus::Success, "Deployer Finished", "The deployer has finished its work")
              .with_details(diff.to_string()),
          );
        }
        Ok(manifest)
      }
      Err(e) => {
        events.audit(
          AuditStatus::Failure,
          "Deployer Failed",
          "The deployer encountered an error and could not finish",
          Some(e.to_string()),
        );
        Err(e)
      }
    }
  }

  fn hand_over(
    &mut self,
    project: &mut Project,
    invocation: &Invocation,
    handovers: &[HandoverRequest],
    events: &mut Events,
  ) -> Result<(), ProjectError> {
    if handovers.is_empty() {
      return Ok(());
    }
    if invocation.dry_run {
      debug!(count = handovers.len(), "dry run, handovers skipped");
      return Ok(());
    }
    let Some(target) = self.handover_target.as_mut() else {
      warn!(count = handovers.len(), "no handover target registered, handovers skipped");
      return Ok(());
    };

    let outcome = handover::dispatch(target.as_mut(), handovers, invocation.revert, events)
      .map_err(ProjectError::handing_over)?;
    project.handovers.accepted.extend(outcome.accepted);
    project.handovers.rejected.extend(outcome.rejected);
    Ok(())
  }

  fn run_hook(&self, project: &mut Project, target: &str, stage: &str, events: &mut Events) -> Result<(), ProjectError> {
    let Some(hook) = project.recipe.targets.get(target).cloned() else {
      events.audit(
        AuditStatus::Failure,
        &format!("{stage} Failure"),
        &format!("The {} target does not exist", stage.to_ascii_lowercase()),
        Some(format!("The target specified in the recipe [{target}] does not exist.")),
      );
      return Err(RecipeError::Invalid(format!("target '{target}' does not exist")).into());
    };

    events.audit(
      AuditStatus::Success,
      &format!("{stage} Started"),
      &format!("The {} target will start", stage.to_ascii_lowercase()),
      Some(format!("The {} target named [{target}] will start", stage.to_ascii_lowercase())),
    );

    for task in &hook.tasks {
      match task {
        HookTask::Property { name, value } => {
          let value = expand_properties(value, &project.properties);
          project.define(name, value);
        }
        HookTask::Echo { message } => {
          let message = expand_properties(message, &project.properties);
          info!(hook = %target, "{message}");
          events.audit(AuditStatus::Info, "Echo", &message, None);
        }
        HookTask::Audit {
          status,
          action,
          info,
          message,
          details,
        } => {
          let expand = |s: &str| expand_properties(s, &project.properties);
          let mut event = AuditEvent::new(audit_status(status), expand(action), expand(info));
          event.message = message.as_deref().map(expand);
          event.details = details.as_deref().map(expand);
          events.emit(event);
        }
      }
    }

    events.audit(
      AuditStatus::Success,
      &format!("{stage} Finished"),
      &format!("The {} target has finished", stage.to_ascii_lowercase()),
      None,
    );
    Ok(())
  }
}

fn load_recipe(recipe_path: &Path) -> Result<Recipe, ProjectError> {
  match BundleSource::for_recipe(recipe_path) {
    BundleSource::Archive(archive) => {
      let xml = BundleSource::read_packaged_recipe(&archive).map_err(|e| ProjectError::locating("recipe", e))?;
      Ok(Recipe::parse_str(&xml)?)
    }
    BundleSource::Directory(_) => Ok(Recipe::from_file(recipe_path)?),
  }
}

async fn load_external_properties(
  locator: &ContentLocator,
  location: &str,
) -> Result<BTreeMap<String, String>, ConfigError> {
  let bytes = locator
    .fetch_bytes(location)
    .await
    .map_err(|e| ConfigError::ExternalProperties {
      location: location.to_string(),
      message: e.to_string(),
    })?;
  let properties = config::parse_properties(&String::from_utf8_lossy(&bytes));
  debug!(location, count = properties.len(), "loaded external properties");
  Ok(properties)
}

/// Tokens available to `@@token@@` realization.
fn template_engine(project: &Project) -> TemplateEngine {
  let tokens = project
    .properties
    .iter()
    .map(|(k, v)| (k.clone(), v.clone()))
    .collect();
  let unresolved = config::unresolved_names(&project.configuration_definition, &project.configuration)
    .into_iter()
    .filter(|name| !project.properties.contains_key(name));
  TemplateEngine::new(tokens).with_declared_without_value(unresolved)
}

async fn fetch(
  locator: &ContentLocator,
  reference: &ContentRef,
  logical_name: &str,
  directive: &Directive,
  events: &mut Events,
) -> Result<PathBuf, ProjectError> {
  let source = ContentSource::from(reference);
  let ContentSource::Url(url) = &source else {
    return locator
      .resolve(&source, logical_name)
      .await
      .map_err(|e| ProjectError::locating(directive.describe(), e));
  };

  events.audit(
    AuditStatus::Info,
    "File Download Started",
    &format!("Downloading {url}"),
    Some(format!("Content for [{logical_name}] will be downloaded")),
  );
  match locator.resolve(&source, logical_name).await {
    Ok(path) => {
      events.audit(
        AuditStatus::Info,
        "File Download Finished",
        &format!("Downloaded {url}"),
        Some(path.display().to_string()),
      );
      Ok(path)
    }
    Err(e) => {
      events.audit(
        AuditStatus::Failure,
        "File Download Failed",
        &format!("Failed to download {url}"),
        Some(e.to_string()),
      );
      Err(ProjectError::locating(directive.describe(), e))
    }
  }
}

/// Bundle-relative name of content, or the file name of a URL.
fn content_name(reference: &ContentRef) -> String {
  match reference {
    ContentRef::Bundle(name) => name.clone(),
    ContentRef::Url(url) => url_to_filename(url),
  }
}

/// Manifest destination of a file directive.
fn file_destination(file: &FileDirective) -> String {
  let name = content_name(&file.source);
  match &file.destination {
    Destination::Default => name,
    Destination::File(path) => path.clone(),
    Destination::Dir(dir) => {
      let file_name = Path::new(&name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or(name);
      format!("{}/{file_name}", dir.trim_end_matches(['/', '\\']))
    }
  }
}

fn compile_replace(filesets: &[fileset::Fileset]) -> Result<Option<regex::Regex>, ProjectError> {
  fileset::compile(filesets).map_err(|e| ProjectError::Validation(RecipeError::Invalid(format!("invalid replace pattern: {e}"))))
}

fn audit_status(status: &str) -> AuditStatus {
  match status.trim().to_ascii_uppercase().as_str() {
    "INFO" => AuditStatus::Info,
    "WARN" | "WARNING" => AuditStatus::Warn,
    "FAILURE" | "FAIL" | "ERROR" => AuditStatus::Failure,
    _ => AuditStatus::Success,
  }
}

/// Replace `${name}` references with property values. Unknown references stay as written.
fn expand_properties(input: &str, properties: &BTreeMap<String, String>) -> String {
  let mut output = String::with_capacity(input.len());
  let mut rest = input;
  while let Some(start) = rest.find("${") {
    output.push_str(&rest[..start]);
    let after = &rest[start + 2..];
    match after.find('}') {
      Some(end) => {
        let name = &after[..end];
        match properties.get(name) {
          Some(value) => output.push_str(value),
          None => output.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
      }
      None => {
        output.push_str(&rest[start..]);
        rest = "";
      }
    }
  }
  output.push_str(rest);
  output
}
