// src/catalog/api.rs

//! Catalog wire types and the `CatalogApi` trait
//!
//! Every response arrives in a JSON envelope carrying a success flag and a
//! payload. A missing flag or missing payload means "nothing there" and is
//! handled as empty/not-found, never as a hard error.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Standard response envelope
///
/// No `serde(default)` on these fields: `Option` already reads an absent
/// field as `None`, and the attribute would force `Default` onto every
/// payload type.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: Option<bool>,
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    /// Payload if the call succeeded and carried one; `None` otherwise
    pub fn into_data(self) -> Option<T> {
        match self.success {
            Some(false) => None,
            _ => self.data,
        }
    }
}

/// One published version of a catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogVersionInfo {
    pub version: String,
    #[serde(default, rename = "sptConstraint")]
    pub spt_constraint: Option<String>,
    #[serde(default, rename = "downloadUrl")]
    pub download_url: Option<String>,
}

/// A catalog entry, the read-only projection of one listed mod
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: i64,
    #[serde(default)]
    pub guid: String,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    /// Publishing account name on the catalog
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "sourceUrl")]
    pub source_url: Option<String>,
    #[serde(default)]
    pub versions: Vec<CatalogVersionInfo>,
}

/// A declared dependency edge, recursive as the catalog returns it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDependency {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub guid: String,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default, rename = "latestCompatibleVersion")]
    pub latest_compatible_version: Option<String>,
    #[serde(default)]
    pub conflict: bool,
    #[serde(default)]
    pub children: Vec<CatalogDependency>,
}

/// Declared dependencies of one queried mod
#[derive(Debug, Clone, Deserialize)]
pub struct DependencyListing {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub guid: String,
    #[serde(default)]
    pub dependencies: Vec<CatalogDependency>,
}

/// An SPT version descriptor from the catalog
#[derive(Debug, Clone, Deserialize)]
pub struct SptVersionInfo {
    pub version: String,
    #[serde(default, rename = "isLatest")]
    pub is_latest: bool,
}

/// One (catalog id, installed version) pair for a batched update check
#[derive(Debug, Clone, Serialize)]
pub struct UpdateQuery {
    #[serde(rename = "modId")]
    pub catalog_id: i64,
    #[serde(rename = "installedVersion")]
    pub installed_version: String,
}

/// Per-mod result inside a batched update check
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateEntry {
    #[serde(rename = "modId")]
    pub catalog_id: i64,
    #[serde(default, rename = "latestVersion")]
    pub latest_version: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Categorized result of a batched update check
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateReport {
    #[serde(default, rename = "safeToUpdate")]
    pub safe_to_update: Vec<UpdateEntry>,
    #[serde(default)]
    pub blocked: Vec<UpdateEntry>,
    #[serde(default, rename = "upToDate")]
    pub up_to_date: Vec<UpdateEntry>,
    #[serde(default)]
    pub incompatible: Vec<UpdateEntry>,
}

/// One (id-or-guid, version) pair for a batched dependency query
#[derive(Debug, Clone, Serialize)]
pub struct DependencyQuery {
    #[serde(rename = "modId", skip_serializing_if = "Option::is_none")]
    pub catalog_id: Option<i64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub guid: String,
    pub version: String,
}

/// The remote catalog surface the pipeline consumes
///
/// Methods return `impl Future + Send` so generic callers can spawn work on
/// the multi-threaded runtime. Implementations must be cheap to share behind
/// an `Arc`.
pub trait CatalogApi: Send + Sync {
    /// Does the configured API key have read scope?
    fn check_auth(&self) -> impl Future<Output = Result<bool>> + Send;

    /// List SPT version descriptors, optionally filtered
    fn list_versions(
        &self,
        filter: Option<&str>,
    ) -> impl Future<Output = Result<Vec<SptVersionInfo>>> + Send;

    /// Free-text search for entries compatible with the target SPT version
    fn search(
        &self,
        query: &str,
        spt_version: &str,
    ) -> impl Future<Output = Result<Vec<CatalogEntry>>> + Send;

    /// Exact GUID lookup
    ///
    /// Errors with `NotFound` or `NoCompatibleVersion` rather than returning
    /// an empty entry.
    fn get_by_guid(
        &self,
        guid: &str,
        spt_version: &str,
    ) -> impl Future<Output = Result<CatalogEntry>> + Send;

    /// Batched update check for matched mods
    fn batch_updates(
        &self,
        queries: &[UpdateQuery],
        spt_version: &str,
    ) -> impl Future<Output = Result<UpdateReport>> + Send;

    /// Batched dependency listing
    fn batch_dependencies(
        &self,
        queries: &[DependencyQuery],
    ) -> impl Future<Output = Result<Vec<DependencyListing>>> + Send;
}

/// Deterministic download URL for a catalog release
///
/// Requires all three of id, slug, and version; returns `None` when any is
/// absent rather than guessing at a partial URL.
pub fn build_download_url(
    base_url: &str,
    id: Option<i64>,
    slug: Option<&str>,
    version: Option<&str>,
) -> Option<String> {
    let id = id?;
    let slug = slug?;
    let version = version?;
    if slug.is_empty() || version.is_empty() {
        return None;
    }
    let base = base_url.trim_end_matches('/');
    Some(format!("{base}/mods/{id}/{slug}/download/{version}"))
}
