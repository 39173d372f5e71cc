//! Diffing a target file set against a destination and applying it.

use std::cell::OnceCell;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::BufWriter;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::consts::METADATA_DIR;
use crate::events::{DeployPhase, Events};
use crate::manifest::{
  DELETED_FILE_HASHCODE, DIRECTORY_HASHCODE, FileHashcodeMap, is_absolute_key, key_to_path, relative_key,
  top_level_dir,
};
use crate::metadata::DeploymentsMetadata;
use crate::types::DestinationCompliance;
use crate::util::hash::hash_file;

use super::archive::{self, Archive};
use super::diff::DeployDifferences;
use super::disk::usable_space;
use super::targets::{self, Target, TargetContent, TargetSet};
use super::types::{DeployError, DeploymentData};

/// What applying a deployment will do, in order.
#[derive(Debug, Default)]
struct Plan {
  /// Paths to back up, deepest first, and whether to remove them afterwards.
  backups: Vec<(String, bool)>,
  /// Paths to delete, deepest first.
  deletions: Vec<String>,
  /// Directories whose empty subdirectories are removed after backups.
  prune: Vec<PathBuf>,
  clean: bool,
  /// Top-level names a clean must keep.
  keep_on_clean: BTreeSet<String>,
  /// Target keys to write.
  writes: Vec<String>,
  /// Manifest recorded once the plan is applied.
  manifest: FileHashcodeMap,
}

/// Deploys one deployment unit into its destination directory.
#[derive(Debug)]
pub struct Deployer {
  data: DeploymentData,
  metadata: DeploymentsMetadata,
  targets: OnceCell<TargetSet>,
}

impl Deployer {
  pub fn new(data: DeploymentData) -> Self {
    let metadata = DeploymentsMetadata::new(&data.destination_dir);
    Self {
      data,
      metadata,
      targets: OnceCell::new(),
    }
  }

  pub fn data(&self) -> &DeploymentData {
    &self.data
  }

  pub fn metadata(&self) -> &DeploymentsMetadata {
    &self.metadata
  }

  /// Whether an earlier deployment was recorded in the destination.
  pub fn is_managed(&self) -> bool {
    self.metadata.is_managed()
  }

  /// Locate every source and realize every template without touching the destination.
  ///
  /// The result is kept for the following [`Deployer::deploy`], so a launcher can check
  /// all of its units before writing to any of them.
  pub fn compute_targets(&self) -> Result<(), DeployError> {
    self.targets().map(|_| ())
  }

  fn targets(&self) -> Result<&TargetSet, DeployError> {
    if let Some(targets) = self.targets.get() {
      return Ok(targets);
    }
    let computed = targets::compute(&self.data)?;
    Ok(self.targets.get_or_init(|| computed))
  }

  /// Deploy, returning the manifest of the new deployment.
  ///
  /// With `dry_run`, `diff` is filled exactly as for a real run but nothing on disk
  /// changes and no metadata is written.
  pub fn deploy(
    &self,
    diff: &mut DeployDifferences,
    clean: bool,
    dry_run: bool,
    events: &mut Events,
  ) -> Result<FileHashcodeMap, DeployError> {
    self.run(diff, clean, dry_run, false, events)
  }

  /// Deploy, then put back the files the current deployment backed up when it was made.
  pub fn redeploy_and_restore_backup_files(
    &self,
    diff: &mut DeployDifferences,
    clean: bool,
    dry_run: bool,
    events: &mut Events,
  ) -> Result<FileHashcodeMap, DeployError> {
    self.run(diff, clean, dry_run, true, events)
  }

  fn run(
    &self,
    diff: &mut DeployDifferences,
    clean: bool,
    dry_run: bool,
    restore: bool,
    events: &mut Events,
  ) -> Result<FileHashcodeMap, DeployError> {
    let result = self.run_phases(diff, clean, dry_run, restore, events);
    match &result {
      Ok(_) => events.phase(DeployPhase::Done),
      Err(e) => {
        warn!(dir = %self.data.destination_dir.display(), error = %e, "deployment failed");
        events.phase(DeployPhase::Failed);
      }
    }
    result
  }

  fn run_phases(
    &self,
    diff: &mut DeployDifferences,
    clean: bool,
    dry_run: bool,
    restore: bool,
    events: &mut Events,
  ) -> Result<FileHashcodeMap, DeployError> {
    let deploy_id = self.data.properties.deployment_id;

    events.phase(DeployPhase::ComputingTargetSet);
    let targets = self.targets()?;
    self.check_disk_usage(targets)?;

    events.phase(DeployPhase::Diffing);
    let managed = self.is_managed();
    let restore_from = if restore && managed {
      Some(self.metadata.current_deployment_id()?)
    } else {
      None
    };

    let plan = if managed {
      info!(deploy_id, dir = %self.data.destination_dir.display(), dry_run, "update deployment");
      self.plan_update(targets, clean, diff)?
    } else {
      info!(deploy_id, dir = %self.data.destination_dir.display(), dry_run, "initial deployment");
      self.plan_initial(targets, diff)?
    };

    if !dry_run {
      events.phase(DeployPhase::Applying);
      self.apply(&plan, targets, diff)?;
    }

    let mut manifest = plan.manifest;
    if let Some(previous_id) = restore_from {
      self.restore_backups(previous_id, &mut manifest, diff, dry_run)?;
    }

    if !dry_run {
      self
        .metadata
        .set_current_deployment(&self.data.properties, &manifest, true)?;
    }

    info!(
      deploy_id,
      added = diff.added.len(),
      changed = diff.changed.len(),
      deleted = diff.deleted.len(),
      dry_run,
      "deployment finished"
    );
    Ok(manifest)
  }

  fn check_disk_usage(&self, targets: &TargetSet) -> Result<(), DeployError> {
    let mut usage = targets.usage;
    usage.usable = usable_space(&self.data.destination_dir);
    debug!(
      required = usage.required,
      files = usage.file_count,
      usable = ?usage.usable,
      "estimated disk usage"
    );
    if usage.exceeds_usable() {
      return Err(DeployError::InsufficientDiskSpace {
        required: usage.required,
        usable: usage.usable.unwrap_or(0),
      });
    }
    Ok(())
  }

  /// Where `key` is backed up during this deployment.
  fn backup_path(&self, key: &str) -> PathBuf {
    let id = self.data.properties.deployment_id;
    if is_absolute_key(key) {
      let mut path = self.metadata.external_backup_dir(id);
      for component in Path::new(key).components() {
        if let Component::Normal(part) = component {
          path.push(part);
        }
      }
      path
    } else {
      self.metadata.backup_dir(id).join(key)
    }
  }

  fn is_ignored(&self, key: &str) -> bool {
    self.data.ignore.as_ref().is_some_and(|re| re.is_match(key))
  }

  fn report_backup(&self, diff: &mut DeployDifferences, key: &str, remove: bool) {
    diff.add_backed_up(key, self.backup_path(key).display().to_string());
    if remove {
      diff.add_deleted(key);
    }
  }

  fn plan_initial(&self, targets: &TargetSet, diff: &mut DeployDifferences) -> Result<Plan, DeployError> {
    let root = &self.data.destination_dir;
    let mut plan = Plan::default();

    let managed_dirs: Option<BTreeSet<&str>> = match self.data.properties.compliance {
      DestinationCompliance::Full => None,
      DestinationCompliance::FilesAndDirectories => Some(
        targets
          .entries
          .iter()
          .filter_map(|(key, target)| match target.content {
            TargetContent::Directory if !is_absolute_key(key) => key.split('/').next(),
            _ => top_level_dir(key),
          })
          .collect(),
      ),
    };

    let existing = if root.is_dir() {
      FileHashcodeMap::from_directory(root, self.data.ignore.as_ref())?
    } else {
      FileHashcodeMap::new()
    };

    let mut to_backup: BTreeMap<String, bool> = BTreeMap::new();
    for key in existing.keys() {
      let in_scope = match &managed_dirs {
        None => true,
        Some(dirs) => top_level_dir(key).is_some_and(|top| dirs.contains(top)),
      };
      if in_scope {
        to_backup.insert(key.clone(), true);
      }
    }
    for key in targets.file_keys() {
      if !to_backup.contains_key(key) && !self.is_ignored(key) && key_to_path(root, key).is_file() {
        to_backup.insert(key.clone(), false);
      }
    }

    plan.prune = match &managed_dirs {
      None => vec![root.clone()],
      Some(dirs) => dirs.iter().map(|d| root.join(d)).collect(),
    };
    if self.data.properties.compliance == DestinationCompliance::Full && !to_backup.is_empty() {
      info!(dir = %root.display(), files = to_backup.len(), "backing up and purging existing content");
    }

    for (key, remove) in to_backup.iter().rev() {
      self.report_backup(diff, key, *remove);
      plan.backups.push((key.clone(), *remove));
    }

    for key in targets.file_keys() {
      diff.add_added(key.clone());
    }
    plan.writes = targets.entries.keys().cloned().collect();
    plan.manifest = targets.hashcodes();
    for (key, text) in &targets.realized {
      diff.add_realized(key.clone(), text.clone());
    }
    Ok(plan)
  }

  fn plan_update(&self, targets: &TargetSet, clean: bool, diff: &mut DeployDifferences) -> Result<Plan, DeployError> {
    let root = &self.data.destination_dir;
    let report_new_root_files = self.data.properties.compliance.manages_root_dir();

    let mut original = self.metadata.current_file_hashcodes()?;
    original.put_directory_entries();
    let current = original.rescan(root, self.data.ignore.as_ref(), report_new_root_files)?;
    let mut new = targets.hashcodes();
    new.put_directory_entries();

    diff.add_ignored(current.ignored.iter().cloned());
    for (path, current_hash) in current.current.iter() {
      let is_dir = current_hash == DIRECTORY_HASHCODE;
      match new.get(path) {
        _ if current_hash == DELETED_FILE_HASHCODE => {
          if new.get(path).is_some_and(|h| h != DIRECTORY_HASHCODE) {
            diff.add_added(path.clone());
          }
        }
        None => {
          if !is_dir {
            diff.add_deleted(path.clone());
          }
        }
        Some(new_hash) if new_hash != current_hash.as_str() => {
          if Some(new_hash) != original.get(path) {
            diff.add_changed(path.clone());
          }
        }
        Some(_) => {
          if !is_dir {
            diff.add_unchanged(path.clone());
          }
        }
      }
    }
    for (path, hash) in new.iter() {
      if !current.current.contains_key(path) && hash != DIRECTORY_HASHCODE {
        diff.add_added(path.clone());
      }
    }

    // Back up files nobody recorded, and user changes about to be overwritten or dropped.
    let mut to_backup: BTreeSet<String> = current.additions.keys().cloned().collect();
    let mut leave_alone: BTreeMap<String, String> = BTreeMap::new();
    for (path, changed_hash) in &current.changes {
      match new.get(path) {
        Some(new_hash) => {
          let original_hash = original.get(path);
          if Some(new_hash) == original_hash && !clean {
            leave_alone.insert(path.clone(), new_hash.to_string());
          } else if new_hash != changed_hash {
            to_backup.insert(path.clone());
          }
        }
        None => {
          to_backup.insert(path.clone());
        }
      }
    }

    for path in new.keys() {
      if !current.current.contains_key(path) && is_absolute_key(path) && Path::new(path).exists() {
        to_backup.insert(path.clone());
        diff.remove_added(path);
        diff.add_changed(path.clone());
      }
    }

    let mut to_delete: BTreeSet<String> = current
      .current
      .keys()
      .filter(|k| !new.contains_key(k) && !current.deletions.contains_key(*k))
      .cloned()
      .collect();

    let mut plan = Plan::default();
    for path in to_backup.iter().rev() {
      let remove = to_delete.remove(path);
      self.report_backup(diff, path, remove);
      plan.backups.push((path.clone(), remove));
    }
    plan.deletions = to_delete.into_iter().rev().collect();

    if clean {
      plan.clean = true;
      plan.keep_on_clean = current.skipped.clone();
    }
    diff.cleaned = clean;

    for (key, target) in &targets.entries {
      if leave_alone.contains_key(key) {
        debug!(path = %key, "keeping locally modified file that matches the new content");
        continue;
      }
      if !clean && target.content != TargetContent::Directory && current.current.get(key) == Some(target.hash.as_str()) {
        continue;
      }
      plan.writes.push(key.clone());
    }

    let mut manifest = targets.hashcodes();
    manifest.extend(leave_alone);
    plan.manifest = manifest;

    for (key, text) in &targets.realized {
      diff.add_realized(key.clone(), text.clone());
    }
    Ok(plan)
  }

  fn apply(&self, plan: &Plan, targets: &TargetSet, diff: &mut DeployDifferences) -> Result<(), DeployError> {
    for (key, remove) in &plan.backups {
      self.backup(key, *remove, diff)?;
    }

    for key in &plan.deletions {
      let path = key_to_path(&self.data.destination_dir, key);
      if path.is_dir() {
        if let Err(e) = fs::remove_dir(&path) {
          debug!(path = %path.display(), error = %e, "directory left in place");
        }
      } else if let Err(e) = fs::remove_file(&path) {
        debug!(path = %path.display(), error = %e, "failed to delete obsolete file");
        diff.add_error(key.clone(), format!("File [{}] did not delete: {e}", path.display()));
      }
    }

    if plan.clean {
      self.purge_destination(&plan.keep_on_clean)?;
    }

    for dir in &plan.prune {
      prune_empty_dirs(dir);
    }

    let mut archives: HashMap<PathBuf, Archive> = HashMap::new();
    for key in &plan.writes {
      if let Some(target) = targets.entries.get(key) {
        self.write_target(key, target, &mut archives, diff)?;
      }
    }
    Ok(())
  }

  fn backup(&self, key: &str, remove: bool, diff: &mut DeployDifferences) -> Result<(), DeployError> {
    let source = key_to_path(&self.data.destination_dir, key);
    let backup = self.backup_path(key);
    let Ok(meta) = fs::symlink_metadata(&source) else {
      return Ok(());
    };

    if let Some(parent) = backup.parent() {
      fs::create_dir_all(parent).map_err(|e| DeployError::io(parent, e))?;
    }

    if meta.is_dir() {
      fs::create_dir_all(&backup).map_err(|e| DeployError::io(&backup, e))?;
      if remove && let Err(e) = fs::remove_dir(&source) {
        debug!(path = %source.display(), error = %e, "directory left in place");
      }
    } else if remove {
      if fs::rename(&source, &backup).is_err() {
        fs::copy(&source, &backup).map_err(|e| DeployError::io(&source, e))?;
        if let Err(e) = fs::remove_file(&source) {
          diff.add_error(key, format!("File [{}] did not delete: {e}", source.display()));
        }
      }
    } else {
      fs::copy(&source, &backup).map_err(|e| DeployError::io(&source, e))?;
    }

    debug!(path = %source.display(), backup = %backup.display(), removed = remove, "backed up");
    Ok(())
  }

  /// Remove everything in the destination except the metadata directory and `keep`.
  fn purge_destination(&self, keep: &BTreeSet<String>) -> Result<(), DeployError> {
    let root = &self.data.destination_dir;
    let entries = match fs::read_dir(root) {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
      Err(e) => return Err(DeployError::io(root, e)),
    };

    for entry in entries {
      let entry = entry.map_err(|e| DeployError::io(root, e))?;
      let name = entry.file_name().to_string_lossy().into_owned();
      if name == METADATA_DIR || keep.contains(&name) || self.is_ignored(&name) {
        continue;
      }
      let path = entry.path();
      let file_type = entry.file_type().map_err(|e| DeployError::io(&path, e))?;
      let result = if file_type.is_dir() {
        fs::remove_dir_all(&path)
      } else {
        fs::remove_file(&path)
      };
      result.map_err(|e| DeployError::io(&path, e))?;
    }
    info!(dir = %root.display(), "cleaned destination");
    Ok(())
  }

  fn write_target(
    &self,
    key: &str,
    target: &Target,
    archives: &mut HashMap<PathBuf, Archive>,
    diff: &mut DeployDifferences,
  ) -> Result<(), DeployError> {
    let path = key_to_path(&self.data.destination_dir, key);
    if target.content == TargetContent::Directory {
      return fs::create_dir_all(&path).map_err(|e| DeployError::io(&path, e));
    }

    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).map_err(|e| DeployError::io(parent, e))?;
    }

    match &target.content {
      TargetContent::Copy(source) => {
        fs::copy(source, &path).map_err(|e| DeployError::io(&path, e))?;
      }
      TargetContent::Bytes(bytes) => {
        fs::write(&path, bytes).map_err(|e| DeployError::io(&path, e))?;
      }
      TargetContent::ArchiveEntry {
        archive: source,
        raw_name,
      } => {
        let zip = match archives.entry(source.clone()) {
          Entry::Occupied(entry) => entry.into_mut(),
          Entry::Vacant(entry) => entry.insert(archive::open(source)?),
        };
        let file = fs::File::create(&path).map_err(|e| DeployError::io(&path, e))?;
        archive::copy_entry(zip, source, raw_name, BufWriter::new(file))?;
      }
      TargetContent::Directory => {}
    }

    diff.add_written(key);
    Ok(())
  }

  /// Copy the backups made by deployment `previous_id` back into place.
  fn restore_backups(
    &self,
    previous_id: u64,
    manifest: &mut FileHashcodeMap,
    diff: &mut DeployDifferences,
    dry_run: bool,
  ) -> Result<(), DeployError> {
    let backup_dir = self.metadata.backup_dir(previous_id);
    let external_dir = self.metadata.external_backup_dir(previous_id);

    for (dir, external) in [(backup_dir, false), (external_dir, true)] {
      if !dir.is_dir() {
        continue;
      }
      for entry in WalkDir::new(&dir).sort_by_file_name() {
        let entry = entry.map_err(|e| DeployError::Io {
          path: dir.display().to_string(),
          source: e.into(),
        })?;
        if !entry.file_type().is_file() {
          continue;
        }

        let relative = relative_key(&dir, entry.path());
        let (key, dest) = if external {
          let dest = Path::new("/").join(&relative);
          (dest.display().to_string(), dest)
        } else {
          (relative.clone(), self.data.destination_dir.join(&relative))
        };

        if !dry_run {
          if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| DeployError::io(parent, e))?;
          }
          fs::copy(entry.path(), &dest).map_err(|e| DeployError::io(&dest, e))?;
        }
        manifest.insert(&key, hash_file(entry.path())?.0);
        diff.add_restored(key, entry.path().display().to_string());
      }
    }

    if !diff.restored.is_empty() {
      info!(previous_id, restored = diff.restored.len(), dry_run, "restored backup files");
    }
    Ok(())
  }
}

/// Remove empty directories below `dir`, deepest first. The metadata directory is kept.
fn prune_empty_dirs(dir: &Path) {
  let walker = WalkDir::new(dir)
    .min_depth(1)
    .contents_first(true)
    .into_iter()
    .filter_entry(|e| e.file_name() != METADATA_DIR);
  for entry in walker.flatten() {
    if entry.file_type().is_dir() {
      let _ = fs::remove_dir(entry.path());
    }
  }
}
