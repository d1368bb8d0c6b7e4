//! File-backed persistence for the jAccount cookie record.
//!
//! One JSON file holding a flat `cookie name → value` object.  Writes go
//! through a named temp file in the same directory followed by a rename,
//! so readers either see the full new set or the old one — never a
//! partial write.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use cg_domain::error::{Error, Result};

pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the persisted cookie record.
    ///
    /// An absent file yields `None`.  A corrupt file is logged and treated
    /// as absent rather than failing construction of the session manager.
    pub fn load(&self) -> Result<Option<BTreeMap<String, String>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path).map_err(Error::Io)?;
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "cookie file is corrupt, starting a fresh session"
                );
                Ok(None)
            }
        }
    }

    /// Persist the full cookie record atomically.
    pub fn save(&self, record: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }
        let json = serde_json::to_string_pretty(record).map_err(Error::Json)?;

        let dir = self.path.parent().unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(Error::Io)?;
        tmp.write_all(json.as_bytes()).map_err(Error::Io)?;
        tmp.persist(&self.path)
            .map_err(|e| Error::Io(e.error))?;

        tracing::info!(path = %self.path.display(), cookies = record.len(), "cookie record saved");
        Ok(())
    }

    /// Remove the persisted record.  Idempotent — deleting an absent file
    /// succeeds.
    pub fn delete(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "cookie record deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}
