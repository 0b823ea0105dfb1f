use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Access key pair of the provisioned IAM user.
///
/// The secret half is sensitive: it is redacted from `Debug` output and must never be logged.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessKeyMaterial {
    pub iam_user_name: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub created_at: DateTime<Utc>,
}

impl AccessKeyMaterial {
    /// A key pair is only usable when both halves are present.
    pub fn is_usable(&self) -> bool {
        !self.access_key_id.trim().is_empty() && !self.secret_access_key.trim().is_empty()
    }
}

impl fmt::Debug for AccessKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessKeyMaterial")
            .field("iam_user_name", &self.iam_user_name)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("reading access key cache `{0}`: `{1}`")]
    Read(PathBuf, String),
    #[error("access key cache `{0}` is corrupt: `{1}`")]
    Corrupt(PathBuf, String),
    #[error("writing access key cache `{0}`: `{1}`")]
    Write(PathBuf, String),
    #[error("removing access key cache `{0}`: `{1}`")]
    Remove(PathBuf, String),
}

/// Single JSON file holding the most recently created access key.
///
/// There is no locking: concurrent runs against the same file are not supported.
#[derive(Debug, Clone)]
pub struct LocalKeyCache {
    path: PathBuf,
}

impl LocalKeyCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<AccessKeyMaterial>, CacheError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::Read(self.path.clone(), e.to_string())),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| CacheError::Corrupt(self.path.clone(), e.to_string()))
    }

    pub fn save(&self, material: &AccessKeyMaterial) -> Result<(), CacheError> {
        let write_err = |e: &dyn std::error::Error| CacheError::Write(self.path.clone(), e.to_string());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| write_err(&e))?;
        }

        let content = serde_json::to_vec_pretty(material).map_err(|e| write_err(&e))?;

        let mut file = open_private(&self.path).map_err(|e| write_err(&e))?;
        file.write_all(&content).map_err(|e| write_err(&e))?;
        file.write_all(b"\n").map_err(|e| write_err(&e))?;

        debug!(path = %self.path.display(), access_key_id = %material.access_key_id, "access key cached");
        Ok(())
    }

    /// Removes the cache file. A missing file is not an error.
    pub fn clear(&self) -> Result<(), CacheError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "access key cache removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Remove(self.path.clone(), e.to_string())),
        }
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // The mode above only applies to newly created files.
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> io::Result<fs::File> {
    fs::File::create(path)
}
