// src/resolver.rs

//! Dependency resolver
//!
//! For every installed mod this builds the dependency tree the catalog
//! declares, flagging dependencies that are not installed and edges the
//! catalog marks as conflicting. Unmatched mods become leaf roots so the
//! forest always covers the whole install.
//!
//! The cycle guard is per root, not global: each root's traversal keeps one
//! visited set seeded with the root's own GUID, and an edge whose target is
//! already in the set is pruned. The same dependency can therefore appear
//! with different subtrees under two different roots if the catalog answers
//! inconsistently between calls; that is accepted, not resolved.

use crate::catalog::api::{
    CatalogApi, CatalogDependency, DependencyListing, DependencyQuery, build_download_url,
};
use crate::model::{
    DependencyConflict, DependencyEdge, DependencyNode, MissingDependency, Mod, ModStatus,
};
use crate::names;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// The dependency forest plus flattened problem lists
#[derive(Debug, Default)]
pub struct ResolutionOutcome {
    /// One root per installed mod, in the order `mods` was given
    pub roots: Vec<DependencyNode>,
    /// De-duplicated by GUID, with every root that requires each entry
    pub missing: Vec<MissingDependency>,
    /// De-duplicated by GUID
    pub conflicts: Vec<DependencyConflict>,
}

/// Resolve declared dependencies for the whole install
///
/// `installed_guids` lets the caller declare components the scanner cannot
/// see (bundled or core plugins). A failed dependency fetch degrades to an
/// empty forest rather than aborting; the mods keep their match data.
pub async fn resolve_dependencies<C: CatalogApi>(
    api: &C,
    mods: &[Mod],
    installed_guids: &HashSet<String>,
    base_url: &str,
) -> ResolutionOutcome {
    let listings = fetch_listings(api, mods).await;

    let installed: HashSet<String> = installed_guids.iter().map(|g| names::normalize(g)).collect();
    let mut builder = TreeBuilder {
        mods,
        installed_guids: &installed,
        base_url,
        missing: BTreeMap::new(),
        conflicts: BTreeMap::new(),
    };

    let mut roots = Vec::with_capacity(mods.len());
    for module in mods {
        let mut visited = HashSet::new();
        visited.insert(names::normalize(&module.guid));

        let mut children = Vec::new();
        if let Some(listing) = module.catalog_id.and_then(|id| listings.get(&id)) {
            for edge in &listing.dependencies {
                if let Some(node) = builder.build_node(module, edge, &mut visited) {
                    children.push(node);
                }
            }
        }

        roots.push(DependencyNode {
            module: module.clone(),
            dependency_info: None,
            is_installed: true,
            children,
        });
    }

    ResolutionOutcome {
        roots,
        missing: builder.missing.into_values().collect(),
        conflicts: builder.conflicts.into_values().collect(),
    }
}

/// One batched dependency query covering every distinct catalog id
///
/// Paired server/client mods share a catalog id, so de-duplicating the ids
/// means one fetch serves both. The result map is the per-run cache.
async fn fetch_listings<C: CatalogApi>(
    api: &C,
    mods: &[Mod],
) -> HashMap<i64, DependencyListing> {
    let mut queries: Vec<DependencyQuery> = Vec::new();
    let mut seen = HashSet::new();
    for module in mods {
        if module.status != ModStatus::Verified {
            continue;
        }
        let Some(id) = module.catalog_id else { continue };
        if seen.insert(id) {
            queries.push(DependencyQuery {
                catalog_id: Some(id),
                guid: module.guid.clone(),
                version: module.local_version.clone(),
            });
        }
    }
    if queries.is_empty() {
        return HashMap::new();
    }

    debug!("Fetching dependency listings for {} mods", queries.len());
    let listings = match api.batch_dependencies(&queries).await {
        Ok(listings) => listings,
        Err(e) => {
            // Degrade to an empty forest; match data is still useful
            warn!("Dependency fetch failed: {}", e);
            return HashMap::new();
        }
    };

    // Last write wins on duplicate ids; responses are idempotent
    listings
        .into_iter()
        .filter_map(|l| l.id.map(|id| (id, l)))
        .collect()
}

struct TreeBuilder<'a> {
    mods: &'a [Mod],
    /// Caller-supplied installed GUIDs, pre-normalized
    installed_guids: &'a HashSet<String>,
    base_url: &'a str,
    missing: BTreeMap<String, MissingDependency>,
    conflicts: BTreeMap<String, DependencyConflict>,
}

impl<'a> TreeBuilder<'a> {
    /// Build the node for one declared edge, depth-first
    ///
    /// Returns `None` when the edge's target is already in this root's
    /// visited set (cycle or diamond; either way the subtree exists once).
    fn build_node(
        &mut self,
        root: &Mod,
        edge: &CatalogDependency,
        visited: &mut HashSet<String>,
    ) -> Option<DependencyNode> {
        let key = names::normalize(&edge.guid);
        if !key.is_empty() && !visited.insert(key.clone()) {
            debug!("Pruning repeated dependency {} under {}", edge.guid, root.display_name());
            return None;
        }

        let local = self.find_installed(edge);
        let is_installed = local.is_some() || self.installed_guids.contains(&key);

        if edge.conflict {
            self.conflicts.entry(key.clone()).or_insert_with(|| DependencyConflict {
                guid: edge.guid.clone(),
                name: edge.name.clone(),
                note: "Declared as conflicting by the catalog".to_string(),
            });
        }

        if !is_installed {
            let required_by = root.display_name().to_string();
            self.missing
                .entry(key)
                .and_modify(|m| {
                    if !m.required_by.contains(&required_by) {
                        m.required_by.push(required_by.clone());
                    }
                })
                .or_insert_with(|| MissingDependency {
                    guid: edge.guid.clone(),
                    name: edge.name.clone(),
                    recommended_version: edge.latest_compatible_version.clone(),
                    download_url: build_download_url(
                        self.base_url,
                        edge.id,
                        edge.slug.as_deref(),
                        edge.latest_compatible_version.as_deref(),
                    ),
                    required_by: vec![required_by.clone()],
                });
        }

        let module = match local {
            Some(installed) => installed.clone(),
            None => Mod::placeholder(
                &edge.guid,
                &edge.name,
                edge.latest_compatible_version.as_deref().unwrap_or(""),
            ),
        };

        let mut children = Vec::new();
        for child in &edge.children {
            if let Some(node) = self.build_node(root, child, visited) {
                children.push(node);
            }
        }

        Some(DependencyNode {
            module,
            dependency_info: Some(DependencyEdge {
                guid: edge.guid.clone(),
                name: edge.name.clone(),
                recommended_version: edge.latest_compatible_version.clone(),
                conflict: edge.conflict,
            }),
            is_installed,
            children,
        })
    }

    /// Presence test: by GUID against a local mod, then by catalog id
    /// against a matched mod
    ///
    /// The returned borrow lives as long as the mod slice, not this builder,
    /// so holding it does not block the bookkeeping maps.
    fn find_installed(&self, edge: &CatalogDependency) -> Option<&'a Mod> {
        let key = names::normalize(&edge.guid);
        if !key.is_empty() {
            if let Some(found) = self.mods.iter().find(|m| {
                names::normalize(&m.guid) == key
                    || m.alternate_guids.iter().any(|g| names::normalize(g) == key)
            }) {
                return Some(found);
            }
        }
        if let Some(id) = edge.id {
            return self.mods.iter().find(|m| m.catalog_id == Some(id));
        }
        None
    }
}
