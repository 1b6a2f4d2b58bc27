// src/scan.rs

//! Scanner contract and a manifest-based implementation
//!
//! The core pipeline consumes immutable `ScanRecord`s and never looks at the
//! install directory again. Extraction of identity metadata from compiled
//! plugin binaries is deliberately kept behind the `ModScanner` trait so that
//! a proper ahead-of-time metadata reader can be slotted in without touching
//! core logic; the implementation shipped here reads JSON manifests only and
//! never executes anything from the install.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Raw identity metadata extracted from one on-disk mod component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    pub guid: String,
    pub file_path: PathBuf,
    pub is_server_component: bool,
    pub local_name: String,
    pub local_author: String,
    pub local_version: String,
    pub alternate_guids: Vec<String>,
    pub load_warnings: Vec<String>,
}

/// Extracts a `ScanRecord` from a single on-disk component
pub trait ModScanner {
    /// Scan one component directory or file
    ///
    /// Returns `Ok(None)` when the path is not a recognizable mod component.
    fn scan(&self, path: &Path) -> Result<Option<ScanRecord>>;
}

/// Server-mod `package.json` manifest
#[derive(Debug, Deserialize)]
struct ServerManifest {
    name: String,
    version: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    guid: Option<String>,
    #[serde(default, rename = "altGuids")]
    alt_guids: Vec<String>,
}

/// Client-plugin sidecar manifest (`<plugin>.manifest.json`)
#[derive(Debug, Deserialize)]
struct ClientManifest {
    guid: String,
    name: String,
    version: String,
    #[serde(default)]
    author: String,
    #[serde(default, rename = "altGuids")]
    alt_guids: Vec<String>,
}

/// Reads mod identity from JSON manifests on disk
pub struct ManifestScanner;

impl ModScanner for ManifestScanner {
    fn scan(&self, path: &Path) -> Result<Option<ScanRecord>> {
        let server_manifest = path.join("package.json");
        if server_manifest.is_file() {
            return Ok(Some(self.scan_server(path, &server_manifest)?));
        }

        if path.extension().is_some_and(|e| e == "json")
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".manifest.json"))
        {
            return Ok(Some(self.scan_client(path)?));
        }

        Ok(None)
    }
}

impl ManifestScanner {
    fn scan_server(&self, dir: &Path, manifest: &Path) -> Result<ScanRecord> {
        let raw = fs::read_to_string(manifest)?;
        let parsed: ServerManifest = serde_json::from_str(&raw)
            .map_err(|e| Error::InvalidInput(format!("{}: {}", manifest.display(), e)))?;

        let mut warnings = Vec::new();
        // Older server mods predate GUIDs; fall back to the directory name
        let guid = match parsed.guid {
            Some(g) if !g.is_empty() => g,
            _ => {
                warnings.push("manifest has no guid, using directory name".to_string());
                dir.file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(&parsed.name)
                    .to_string()
            }
        };

        Ok(ScanRecord {
            guid,
            file_path: dir.to_path_buf(),
            is_server_component: true,
            local_name: parsed.name,
            local_author: parsed.author,
            local_version: parsed.version,
            alternate_guids: parsed.alt_guids,
            load_warnings: warnings,
        })
    }

    fn scan_client(&self, manifest: &Path) -> Result<ScanRecord> {
        let raw = fs::read_to_string(manifest)?;
        let parsed: ClientManifest = serde_json::from_str(&raw)
            .map_err(|e| Error::InvalidInput(format!("{}: {}", manifest.display(), e)))?;

        Ok(ScanRecord {
            guid: parsed.guid,
            file_path: manifest.to_path_buf(),
            is_server_component: false,
            local_name: parsed.name,
            local_author: parsed.author,
            local_version: parsed.version,
            alternate_guids: parsed.alt_guids,
            load_warnings: Vec::new(),
        })
    }
}

/// Scan an SPT install root for server and client components
///
/// Server mods live one directory deep under `user/mods/`; client plugin
/// manifests live under `BepInEx/plugins/` (any depth is not needed, plugins
/// sit flat or one directory deep). Unreadable entries are logged and
/// skipped, never fatal.
pub fn scan_install_root<S: ModScanner>(
    scanner: &S,
    root: &Path,
) -> Result<(Vec<ScanRecord>, Vec<ScanRecord>)> {
    let mut server = Vec::new();
    let mut client = Vec::new();

    let server_dir = root.join("user").join("mods");
    if server_dir.is_dir() {
        for entry in fs::read_dir(&server_dir)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            match scanner.scan(&entry.path()) {
                Ok(Some(record)) => server.push(record),
                Ok(None) => debug!("Skipping {}: not a mod component", entry.path().display()),
                Err(e) => warn!("Failed to scan {}: {}", entry.path().display(), e),
            }
        }
    }

    let plugin_dir = root.join("BepInEx").join("plugins");
    if plugin_dir.is_dir() {
        scan_plugin_dir(scanner, &plugin_dir, &mut client, 0)?;
    }

    debug!(
        "Scanned {}: {} server components, {} client components",
        root.display(),
        server.len(),
        client.len()
    );
    Ok((server, client))
}

fn scan_plugin_dir<S: ModScanner>(
    scanner: &S,
    dir: &Path,
    out: &mut Vec<ScanRecord>,
    depth: usize,
) -> Result<()> {
    // Plugins sit flat or one directory deep
    if depth > 1 {
        return Ok(());
    }
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to read {}: {}", dir.display(), e);
            return Ok(());
        }
    };
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to read an entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if path.is_dir() {
            scan_plugin_dir(scanner, &path, out, depth + 1)?;
        } else {
            match scanner.scan(&path) {
                Ok(Some(record)) => out.push(record),
                Ok(None) => {}
                Err(e) => warn!("Failed to scan {}: {}", path.display(), e),
            }
        }
    }
    Ok(())
}
