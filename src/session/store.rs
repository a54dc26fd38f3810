//! Persisted session artifacts
//!
//! One JSON file per account, named after the sanitized identifier. The
//! content is opaque to everything except [`SessionStore::load`] and
//! [`SessionStore::save`].

use crate::api::ApiSession;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session artifact IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session artifact is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SessionStoreResult<T> = std::result::Result<T, SessionStoreError>;

/// Directory of `session_<identifier>.json` files
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the artifact for `identifier`
    pub fn path_for(&self, identifier: &str) -> PathBuf {
        self.dir.join(format!("session_{}.json", sanitize(identifier)))
    }

    pub fn exists(&self, identifier: &str) -> bool {
        self.path_for(identifier).is_file()
    }

    pub fn load(&self, identifier: &str) -> SessionStoreResult<ApiSession> {
        let content = fs::read_to_string(self.path_for(identifier))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, identifier: &str, session: &ApiSession) -> SessionStoreResult<()> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(session)?;
        fs::write(self.path_for(identifier), json)?;
        Ok(())
    }

    /// Removes the artifact; a missing file is not an error
    pub fn delete(&self, identifier: &str) -> SessionStoreResult<()> {
        match fs::remove_file(self.path_for(identifier)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reduces an identifier to a safe file-name component
///
/// Keeps ASCII alphanumerics, `_` and `-`, maps `.` to `_` and drops the rest.
pub fn sanitize(identifier: &str) -> String {
    identifier
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || c == '_' || c == '-' => Some(c),
            '.' => Some('_'),
            _ => None,
        })
        .collect()
}
