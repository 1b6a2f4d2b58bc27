// src/config.rs

//! Stored API credential
//!
//! The catalog key is kept as plaintext JSON under the per-user config
//! directory. On a definitive authentication failure the caller deletes the
//! file and prompts again; nothing else is persisted between runs.

use crate::error::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CREDENTIALS_FILE: &str = "credentials.json";

/// The on-disk credential record
#[derive(Debug, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub api_key: String,
    /// RFC 3339 timestamp of when the key was saved
    pub saved_at: String,
}

/// Load/save/delete for the credential file
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Store under the platform's per-user config directory
    pub fn default_location() -> Result<Self> {
        let dirs = ProjectDirs::from("com", "modcheck", "modcheck")
            .ok_or_else(|| Error::Init("Could not determine config directory".to_string()))?;
        Ok(Self {
            path: dirs.config_dir().join(CREDENTIALS_FILE),
        })
    }

    /// Store at an explicit path
    pub fn at(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored key, if any
    ///
    /// An unreadable or malformed file is treated as absent; the operator
    /// will simply be prompted for a fresh key.
    pub fn load(&self) -> Option<StoredCredentials> {
        let raw = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(creds) => Some(creds),
            Err(e) => {
                debug!("Ignoring malformed credential file: {}", e);
                None
            }
        }
    }

    pub fn save(&self, api_key: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let creds = StoredCredentials {
            api_key: api_key.to_string(),
            saved_at: chrono::Utc::now().to_rfc3339(),
        };
        let raw = serde_json::to_string_pretty(&creds)
            .map_err(|e| Error::Init(format!("Failed to serialize credentials: {}", e)))?;
        fs::write(&self.path, raw)?;
        info!("Saved API key to {}", self.path.display());
        Ok(())
    }

    /// Remove the stored key; absent is fine
    pub fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Deleted stored API key");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_load_delete_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = CredentialStore::at(tmp.path().join("nested/credentials.json"));

        assert!(store.load().is_none());

        store.save("abc123").unwrap();
        let creds = store.load().unwrap();
        assert_eq!(creds.api_key, "abc123");
        assert!(!creds.saved_at.is_empty());

        store.delete().unwrap();
        assert!(store.load().is_none());
        // Deleting again is not an error
        store.delete().unwrap();
    }

    #[test]
    fn test_malformed_file_is_treated_as_absent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credentials.json");
        std::fs::write(&path, "not json at all").unwrap();

        let store = CredentialStore::at(&path);
        assert!(store.load().is_none());
    }
}
