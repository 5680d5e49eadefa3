//! On-disk store of last observed resource states.
//!
//! A stored state is used as the state hint on the next apply, so resources
//! whose identity is server-generated can be found again.
//!
//! # Storage Layout
//!
//! ```text
//! {data_dir}/state/
//! └── <kind>/
//!     └── <key-hash>.json   # StoredState
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::codec::{self, CodecError, Encoding};
use crate::platform::paths::data_dir;
use crate::resource::Resource;
use crate::schema::ResourceSchema;
use crate::util::hash::key_hash;

const STATE_DIR: &str = "state";

/// Current version of the stored state format.
pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StateError {
  #[error("no data directory could be determined; set CONVERGE_DATA_DIR")]
  NoDataDir,

  #[error("failed to create state directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read state {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write state {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse state {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("unsupported state version {0}")]
  UnsupportedVersion(u32),

  #[error("stored state is for {stored}, expected {expected}")]
  KindMismatch { expected: String, stored: String },

  #[error(transparent)]
  Codec(#[from] CodecError),
}

/// Serialized form of one stored state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredState {
  pub version: u32,
  pub kind: String,
  /// The caller-chosen key the file name was derived from.
  pub key: String,
  pub state: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct StateStore {
  base_path: PathBuf,
}

impl StateStore {
  pub fn new(base_path: PathBuf) -> Self {
    Self { base_path }
  }

  pub fn base_path(&self) -> &Path {
    &self.base_path
  }

  /// Store under the platform data directory.
  pub fn default_store() -> Result<Self, StateError> {
    data_dir()
      .map(|dir| Self::new(dir.join(STATE_DIR)))
      .ok_or(StateError::NoDataDir)
  }

  /// File holding the state for `key`.
  pub fn path_for(&self, kind: &str, key: &str) -> PathBuf {
    self.base_path.join(kind).join(format!("{}.json", key_hash(key)))
  }

  /// Load the stored state, or `None` if nothing was saved under `key`.
  pub fn load(&self, schema: &ResourceSchema, key: &str) -> Result<Option<Resource>, StateError> {
    let path = self.path_for(&schema.kind, key);
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(source) => return Err(StateError::Read { path, source }),
    };

    let stored: StoredState =
      serde_json::from_str(&content).map_err(|source| StateError::Parse { path: path.clone(), source })?;
    if stored.version != STATE_VERSION {
      return Err(StateError::UnsupportedVersion(stored.version));
    }
    if stored.kind != schema.kind {
      return Err(StateError::KindMismatch {
        expected: schema.kind.clone(),
        stored: stored.kind,
      });
    }

    debug!(path = %path.display(), "loaded stored state");
    Ok(Some(codec::from_json(schema, &stored.state)?))
  }

  /// Save `state` under `key`, replacing any previous state.
  ///
  /// Written to a temp file first, then renamed into place.
  pub fn save(&self, schema: &ResourceSchema, key: &str, state: &Resource) -> Result<PathBuf, StateError> {
    let path = self.path_for(&schema.kind, key);
    let dir = self.base_path.join(&schema.kind);
    fs::create_dir_all(&dir).map_err(|source| StateError::CreateDir {
      path: dir.clone(),
      source,
    })?;

    let stored = StoredState {
      version: STATE_VERSION,
      kind: schema.kind.clone(),
      key: key.to_string(),
      state: codec::to_json(schema, state, Encoding::Full)?,
    };
    let content = serde_json::to_string_pretty(&stored).map_err(CodecError::from)?;

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, &content).map_err(|source| StateError::Write {
      path: temp_path.clone(),
      source,
    })?;
    fs::rename(&temp_path, &path).map_err(|source| StateError::Write {
      path: path.clone(),
      source,
    })?;

    debug!(path = %path.display(), "saved state");
    Ok(path)
  }

  /// Remove the stored state. Returns false if there was none.
  pub fn remove(&self, kind: &str, key: &str) -> Result<bool, StateError> {
    let path = self.path_for(kind, key);
    match fs::remove_file(&path) {
      Ok(()) => Ok(true),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
      Err(source) => Err(StateError::Write { path, source }),
    }
  }
}
