//! Locating bundle content.
//!
//! Directive content comes from one of three places:
//!
//! - the bundle itself, either a directory holding the recipe or a packaged zip
//! - an absolute filesystem path
//! - a URL (`http`, `https` or `file`)
//!
//! Everything is materialized as a local file before deployment starts, so an
//! unreachable source fails the deployment before anything is written.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::consts::DEFAULT_RECIPE_NAME;
use crate::recipe::ContentRef;

/// Errors resolving content.
#[derive(Debug, Error)]
pub enum LocatorError {
  #[error("content '{reference}' not found at {path}")]
  Missing { reference: String, path: String },

  #[error("invalid URL '{url}': {message}")]
  InvalidUrl { url: String, message: String },

  #[error("failed to download {url}: {message}")]
  Download { url: String, message: String },

  #[error("failed to read bundle archive {path}: {message}")]
  Archive { path: String, message: String },

  #[error("I/O error on {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: io::Error,
  },
}

impl LocatorError {
  fn io(path: &Path, source: io::Error) -> Self {
    LocatorError::Io {
      path: path.display().to_string(),
      source,
    }
  }
}

/// Where the bundle's own files live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleSource {
  /// An unpacked bundle: the directory holding the recipe.
  Directory(PathBuf),
  /// A packaged bundle zip with the recipe at its root.
  Archive(PathBuf),
}

impl BundleSource {
  /// Bundle source for a recipe path: a `.zip` is a packaged bundle, anything else a recipe file.
  pub fn for_recipe(recipe: &Path) -> Self {
    let is_zip = recipe
      .extension()
      .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
    if is_zip {
      return BundleSource::Archive(recipe.to_path_buf());
    }
    let dir = recipe
      .parent()
      .filter(|p| !p.as_os_str().is_empty())
      .unwrap_or_else(|| Path::new("."));
    BundleSource::Directory(dir.to_path_buf())
  }

  /// Recipe text of a packaged bundle.
  pub fn read_packaged_recipe(archive: &Path) -> Result<String, LocatorError> {
    let mut content = String::new();
    read_archive_entry(archive, DEFAULT_RECIPE_NAME)?
      .ok_or_else(|| LocatorError::Missing {
        reference: DEFAULT_RECIPE_NAME.to_string(),
        path: archive.display().to_string(),
      })?
      .as_slice()
      .read_to_string(&mut content)
      .map_err(|e| LocatorError::io(archive, e))?;
    Ok(content)
  }
}

/// Kind of a directive's content reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSource {
  /// Relative name inside the bundle.
  Bundle(String),
  /// Absolute filesystem path.
  Path(PathBuf),
  Url(String),
}

impl From<&ContentRef> for ContentSource {
  fn from(reference: &ContentRef) -> Self {
    match reference {
      ContentRef::Bundle(name) if Path::new(name).is_absolute() => ContentSource::Path(PathBuf::from(name)),
      ContentRef::Bundle(name) => ContentSource::Bundle(name.clone()),
      ContentRef::Url(url) => ContentSource::Url(url.clone()),
    }
  }
}

/// Resolves content references to local files.
#[derive(Debug)]
pub struct ContentLocator {
  bundle: BundleSource,
  staging: PathBuf,
  client: reqwest::Client,
  downloads: AtomicUsize,
}

impl ContentLocator {
  /// `staging` receives downloads and files extracted from a packaged bundle.
  pub fn new(bundle: BundleSource, staging: impl Into<PathBuf>) -> Self {
    Self {
      bundle,
      staging: staging.into(),
      client: reqwest::Client::new(),
      downloads: AtomicUsize::new(0),
    }
  }

  pub fn bundle(&self) -> &BundleSource {
    &self.bundle
  }

  /// Directory holding downloads and extracted bundle files.
  pub fn staging(&self) -> &Path {
    &self.staging
  }

  /// Materialize `source` as a local file and return its path.
  ///
  /// `logical_name` is the destination name the content is deployed under; downloads
  /// are stored under it rather than under the last URL segment.
  pub async fn resolve(&self, source: &ContentSource, logical_name: &str) -> Result<PathBuf, LocatorError> {
    match source {
      ContentSource::Bundle(name) => self.resolve_bundle_file(name),
      ContentSource::Path(path) => existing_file(path),
      ContentSource::Url(url) => self.download(url, logical_name).await,
    }
  }

  /// Open `source` for reading.
  pub async fn open(&self, source: &ContentSource, logical_name: &str) -> Result<Box<dyn Read + Send>, LocatorError> {
    let path = self.resolve(source, logical_name).await?;
    let file = fs::File::open(&path).map_err(|e| LocatorError::io(&path, e))?;
    Ok(Box::new(io::BufReader::new(file)))
  }

  /// Read everything at `location`, a URL or a filesystem path.
  pub async fn fetch_bytes(&self, location: &str) -> Result<Vec<u8>, LocatorError> {
    if let Some(url) = parse_url(location)? {
      if url.scheme() == "file" {
        let path = file_url_path(&url, location)?;
        return fs::read(&path).map_err(|e| LocatorError::io(&path, e));
      }
      return self.get(location).await;
    }

    let path = Path::new(location);
    fs::read(path).map_err(|e| match e.kind() {
      io::ErrorKind::NotFound => LocatorError::Missing {
        reference: location.to_string(),
        path: path.display().to_string(),
      },
      _ => LocatorError::io(path, e),
    })
  }

  fn resolve_bundle_file(&self, name: &str) -> Result<PathBuf, LocatorError> {
    match &self.bundle {
      BundleSource::Directory(dir) => {
        let path = dir.join(name);
        if path.is_file() {
          Ok(path)
        } else {
          Err(LocatorError::Missing {
            reference: name.to_string(),
            path: path.display().to_string(),
          })
        }
      }
      BundleSource::Archive(archive) => {
        let dest = self.staging.join("bundle").join(name);
        if dest.is_file() {
          return Ok(dest);
        }
        let content = read_archive_entry(archive, name)?.ok_or_else(|| LocatorError::Missing {
          reference: name.to_string(),
          path: archive.display().to_string(),
        })?;
        if let Some(parent) = dest.parent() {
          fs::create_dir_all(parent).map_err(|e| LocatorError::io(parent, e))?;
        }
        fs::write(&dest, content).map_err(|e| LocatorError::io(&dest, e))?;
        debug!(name, path = %dest.display(), "extracted bundle file");
        Ok(dest)
      }
    }
  }

  async fn download(&self, url: &str, logical_name: &str) -> Result<PathBuf, LocatorError> {
    let parsed = parse_url(url)?.ok_or_else(|| LocatorError::InvalidUrl {
      url: url.to_string(),
      message: "not an absolute URL".to_string(),
    })?;

    if parsed.scheme() == "file" {
      let path = file_url_path(&parsed, url)?;
      return existing_file(&path);
    }

    let filename = Path::new(logical_name)
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| url_to_filename(url));
    let slot = self.downloads.fetch_add(1, Ordering::SeqCst);
    let downloads_dir = self.staging.join("downloads").join(slot.to_string());
    tokio::fs::create_dir_all(&downloads_dir)
      .await
      .map_err(|e| LocatorError::io(&downloads_dir, e))?;
    let dest = downloads_dir.join(filename);

    info!(url = %url, "downloading bundle content");
    let bytes = self.get(url).await?;

    let mut file = tokio::fs::File::create(&dest)
      .await
      .map_err(|e| LocatorError::io(&dest, e))?;
    file.write_all(&bytes).await.map_err(|e| LocatorError::io(&dest, e))?;
    file.flush().await.map_err(|e| LocatorError::io(&dest, e))?;

    info!(path = %dest.display(), size = bytes.len(), "download complete");
    Ok(dest)
  }

  async fn get(&self, url: &str) -> Result<Vec<u8>, LocatorError> {
    let download_err = |message: String| LocatorError::Download {
      url: url.to_string(),
      message,
    };

    let response = self
      .client
      .get(url)
      .send()
      .await
      .map_err(|e| download_err(e.to_string()))?;
    if !response.status().is_success() {
      return Err(download_err(format!("HTTP {}", response.status())));
    }
    let bytes = response.bytes().await.map_err(|e| download_err(e.to_string()))?;
    Ok(bytes.to_vec())
  }
}

fn existing_file(path: &Path) -> Result<PathBuf, LocatorError> {
  if path.is_file() {
    Ok(path.to_path_buf())
  } else {
    Err(LocatorError::Missing {
      reference: path.display().to_string(),
      path: path.display().to_string(),
    })
  }
}

/// `Some(url)` if `location` is an absolute URL.
fn parse_url(location: &str) -> Result<Option<reqwest::Url>, LocatorError> {
  if !location.contains("://") {
    return Ok(None);
  }
  reqwest::Url::parse(location).map(Some).map_err(|e| LocatorError::InvalidUrl {
    url: location.to_string(),
    message: e.to_string(),
  })
}

fn file_url_path(url: &reqwest::Url, original: &str) -> Result<PathBuf, LocatorError> {
  url.to_file_path().map_err(|_| LocatorError::InvalidUrl {
    url: original.to_string(),
    message: "file URL does not name a local path".to_string(),
  })
}

/// Read one entry of a zip archive, `Ok(None)` if there is no such entry.
fn read_archive_entry(archive: &Path, name: &str) -> Result<Option<Vec<u8>>, LocatorError> {
  let archive_err = |message: String| LocatorError::Archive {
    path: archive.display().to_string(),
    message,
  };

  let file = fs::File::open(archive).map_err(|e| LocatorError::io(archive, e))?;
  let mut zip = zip::ZipArchive::new(file).map_err(|e| archive_err(e.to_string()))?;
  let mut entry = match zip.by_name(name) {
    Ok(entry) => entry,
    Err(zip::result::ZipError::FileNotFound) => return Ok(None),
    Err(e) => return Err(archive_err(e.to_string())),
  };

  let mut content = Vec::new();
  entry
    .read_to_end(&mut content)
    .map_err(|e| archive_err(e.to_string()))?;
  Ok(Some(content))
}

/// Derive a file name from the last URL segment.
///
/// Falls back to a hash of the URL when no usable name can be extracted.
pub fn url_to_filename(url: &str) -> String {
  let last = url.split(['?', '#']).next().unwrap_or(url).rsplit('/').next().unwrap_or("");

  let sanitized: String = last
    .chars()
    .map(|c| {
      if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
        c
      } else {
        '_'
      }
    })
    .collect();

  if !sanitized.is_empty() && sanitized != "." && sanitized != ".." {
    return sanitized;
  }

  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  format!("download_{}", &hex::encode(hasher.finalize())[..16])
}
