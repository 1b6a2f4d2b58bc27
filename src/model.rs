// src/model.rs

//! Core data model: the `Mod` aggregate and the types hung off it
//!
//! A `Mod` is the unit the whole pipeline operates on. It is created by the
//! reconciliation engine from one or two scan records, mutated in place by the
//! matching engine, enrichment, and compatibility checks, and never persisted
//! across runs.

use crate::names;
use crate::scan::ScanRecord;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a mod was matched against the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMethod {
    /// Not matched (yet)
    None,

    /// Exact GUID lookup hit (primary or alternate GUID)
    ExactGuid,

    /// Exact name equality, possibly after normalization/suffix stripping
    ExactName,

    /// Edit-distance similarity above threshold
    FuzzyName,

    /// Operator confirmed an uncertain candidate by hand
    Manual,
}

/// Resolution state of a mod
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModStatus {
    /// Not yet examined
    Unknown,

    /// Matched against the catalog with sufficient confidence
    Verified,

    /// No catalog entry could be found
    NoMatch,

    /// Catalog entry exists but is incompatible with the target SPT version
    Incompatible,

    /// The locally installed version string could not be interpreted
    InvalidVersion,

    /// A candidate was found but confidence is too low to auto-accept
    NeedsConfirmation,
}

/// Update state relative to the catalog's latest compatible version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateStatus {
    /// Not checked (unmatched mods stay here)
    Unknown,

    /// Installed version is the latest compatible version
    UpToDate,

    /// A newer compatible version exists
    UpdateAvailable,

    /// A newer version exists but the catalog blocks updating to it
    UpdateBlocked,

    /// No version of this mod is compatible with the target SPT version
    Incompatible,
}

/// One published version of a catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogVersion {
    pub version: String,
    pub spt_constraint: Option<String>,
    pub download_url: Option<String>,
}

/// A locally installed mod, unified across its server and client components
#[derive(Debug, Clone)]
pub struct Mod {
    // Identity from the scan
    pub guid: String,
    pub local_name: String,
    pub local_author: String,
    pub local_version: String,
    pub file_path: PathBuf,
    /// Path of the paired component on the other side, when reconciled
    pub paired_component_path: Option<PathBuf>,
    pub alternate_guids: Vec<String>,
    /// Index in the original scan order, used to restore presentation order
    /// after concurrent matching completes out of order
    pub scan_index: usize,

    // Catalog match state
    pub catalog_id: Option<i64>,
    pub catalog_name: Option<String>,
    pub catalog_author: Option<String>,
    pub slug: Option<String>,
    pub url: Option<String>,
    pub source_url: Option<String>,
    pub versions: Vec<CatalogVersion>,

    // Resolution state
    pub match_confidence: u8,
    pub match_method: MatchMethod,
    pub status: ModStatus,
    pub is_confirmed: bool,

    // Update/compat state
    pub update_status: UpdateStatus,
    pub latest_version: Option<String>,
    pub incompatibility_reason: Option<String>,
}

impl Mod {
    /// Build a mod from a single scan record
    pub fn from_record(record: &ScanRecord, scan_index: usize) -> Self {
        Self {
            guid: record.guid.clone(),
            local_name: record.local_name.clone(),
            local_author: record.local_author.clone(),
            local_version: record.local_version.clone(),
            file_path: record.file_path.clone(),
            paired_component_path: None,
            alternate_guids: record.alternate_guids.clone(),
            scan_index,
            catalog_id: None,
            catalog_name: None,
            catalog_author: None,
            slug: None,
            url: None,
            source_url: None,
            versions: Vec::new(),
            match_confidence: 0,
            match_method: MatchMethod::None,
            status: ModStatus::Unknown,
            is_confirmed: false,
            update_status: UpdateStatus::Unknown,
            latest_version: None,
            incompatibility_reason: None,
        }
    }

    /// Fabricate a placeholder for a dependency that is not installed locally
    ///
    /// Keeps dependency tree nodes uniformly typed: every node wraps a `Mod`,
    /// installed or not.
    pub fn placeholder(guid: &str, name: &str, version: &str) -> Self {
        Self {
            guid: guid.to_string(),
            local_name: name.to_string(),
            local_author: String::new(),
            local_version: version.to_string(),
            file_path: PathBuf::new(),
            paired_component_path: None,
            alternate_guids: Vec::new(),
            scan_index: usize::MAX,
            catalog_id: None,
            catalog_name: None,
            catalog_author: None,
            slug: None,
            url: None,
            source_url: None,
            versions: Vec::new(),
            match_confidence: 0,
            match_method: MatchMethod::None,
            status: ModStatus::Unknown,
            is_confirmed: false,
            update_status: UpdateStatus::Unknown,
            latest_version: None,
            incompatibility_reason: None,
        }
    }

    /// Identity key: normalized GUID when present, else normalized (name, author)
    pub fn identity_key(&self) -> String {
        if !self.guid.is_empty() {
            names::normalize(&self.guid)
        } else {
            format!(
                "{}|{}",
                names::normalize(&self.local_name),
                names::normalize(&self.local_author)
            )
        }
    }

    /// Name to show the operator: catalog name when matched, local name otherwise
    pub fn display_name(&self) -> &str {
        self.catalog_name.as_deref().unwrap_or(&self.local_name)
    }

    /// Remove every catalog-derived field, reverting to an unmatched state
    ///
    /// Used when the operator rejects a low-confidence candidate.
    pub fn clear_catalog_match(&mut self) {
        self.catalog_id = None;
        self.catalog_name = None;
        self.catalog_author = None;
        self.slug = None;
        self.url = None;
        self.source_url = None;
        self.versions.clear();
        self.match_confidence = 0;
        self.match_method = MatchMethod::None;
        self.status = ModStatus::NoMatch;
        self.is_confirmed = false;
        self.update_status = UpdateStatus::Unknown;
        self.latest_version = None;
        self.incompatibility_reason = None;
    }
}

/// Diagnostic record of one server/client pairing decision
///
/// Kept only for display after a run; not consumed by later stages.
#[derive(Debug, Clone)]
pub struct ReconciliationPair {
    pub server_record: ScanRecord,
    pub client_record: ScanRecord,
    pub selected_guid: String,
    pub notes: Vec<String>,
}

/// One node of a dependency tree
///
/// Built fresh per analysis run and never mutated after construction.
#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub module: Mod,
    /// The catalog's declared edge that produced this node, absent for roots
    pub dependency_info: Option<DependencyEdge>,
    pub is_installed: bool,
    pub children: Vec<DependencyNode>,
}

/// The declared requirement behind a tree node
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    pub guid: String,
    pub name: String,
    pub recommended_version: Option<String>,
    pub conflict: bool,
}

/// A dependency the catalog declares but the install lacks
#[derive(Debug, Clone)]
pub struct MissingDependency {
    pub guid: String,
    pub name: String,
    pub recommended_version: Option<String>,
    /// Deterministic catalog download URL; absent when id, slug, or version is unknown
    pub download_url: Option<String>,
    /// Display names of installed mods that require it
    pub required_by: Vec<String>,
}

/// A conflict edge declared by the catalog
#[derive(Debug, Clone)]
pub struct DependencyConflict {
    pub guid: String,
    pub name: String,
    pub note: String,
}
