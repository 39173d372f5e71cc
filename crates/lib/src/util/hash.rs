//! SHA-256 digests of deployed content, stored as lowercase hex in manifests.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of a file's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<ContentHash> for String {
  fn from(hash: ContentHash) -> Self {
    hash.0
  }
}

#[derive(Debug, thiserror::Error)]
pub enum HashError {
  #[error("cannot hash {path}: {source}")]
  ReadFile {
    path: String,
    #[source]
    source: io::Error,
  },
}

const CHUNK: usize = 8192;

pub fn hash_file(path: &Path) -> Result<ContentHash, HashError> {
  let read_error = |source| HashError::ReadFile {
    path: path.display().to_string(),
    source,
  };
  let file = fs::File::open(path).map_err(read_error)?;
  hash_reader(file).map_err(read_error)
}

/// Digest of everything `reader` yields.
pub fn hash_reader(reader: impl Read) -> io::Result<ContentHash> {
  digest_stream(reader, io::sink())
}

pub fn hash_bytes(data: &[u8]) -> ContentHash {
  ContentHash(hex::encode(Sha256::digest(data)))
}

/// Copy `reader` into `writer`, returning the digest of the copied bytes.
pub fn copy_and_hash(reader: impl Read, writer: impl Write) -> io::Result<ContentHash> {
  digest_stream(reader, writer)
}

fn digest_stream(mut reader: impl Read, mut writer: impl Write) -> io::Result<ContentHash> {
  let mut sha = Sha256::new();
  let mut chunk = vec![0u8; CHUNK];
  loop {
    let n = match reader.read(&mut chunk) {
      Ok(0) => break,
      Ok(n) => n,
      Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
      Err(e) => return Err(e),
    };
    sha.update(&chunk[..n]);
    writer.write_all(&chunk[..n])?;
  }
  writer.flush()?;
  Ok(ContentHash(hex::encode(sha.finalize())))
}
