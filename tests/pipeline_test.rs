// tests/pipeline_test.rs

//! Integration tests for modcheck
//!
//! Runs the whole pipeline (scan, reconcile, match, enrich, resolve) over a
//! temporary install directory and an in-process catalog fake.

use modcheck::catalog::api::{
    CatalogApi, CatalogEntry, CatalogVersionInfo, DependencyListing, DependencyQuery,
    SptVersionInfo, UpdateEntry, UpdateQuery, UpdateReport,
};
use modcheck::catalog::CatalogDependency;
use modcheck::model::{MatchMethod, Mod, ModStatus, UpdateStatus};
use modcheck::scan::ManifestScanner;
use modcheck::{matching, reconcile, resolver, scan, update, Error, Result};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const BASE: &str = "https://forge.test/api/v1";

struct FakeCatalog {
    by_guid: HashMap<String, CatalogEntry>,
    listings: Vec<DependencyListing>,
    updates: UpdateReport,
}

impl CatalogApi for FakeCatalog {
    async fn check_auth(&self) -> Result<bool> {
        Ok(true)
    }

    async fn list_versions(&self, _filter: Option<&str>) -> Result<Vec<SptVersionInfo>> {
        Ok(vec![SptVersionInfo {
            version: "3.11.0".to_string(),
            is_latest: true,
        }])
    }

    async fn search(&self, _query: &str, _spt: &str) -> Result<Vec<CatalogEntry>> {
        Ok(Vec::new())
    }

    async fn get_by_guid(&self, guid: &str, _spt: &str) -> Result<CatalogEntry> {
        self.by_guid.get(guid).cloned().ok_or(Error::NotFound)
    }

    async fn batch_updates(&self, _q: &[UpdateQuery], _spt: &str) -> Result<UpdateReport> {
        Ok(self.updates.clone())
    }

    async fn batch_dependencies(
        &self,
        queries: &[DependencyQuery],
    ) -> Result<Vec<DependencyListing>> {
        let wanted: HashSet<i64> = queries.iter().filter_map(|q| q.catalog_id).collect();
        Ok(self
            .listings
            .iter()
            .filter(|l| l.id.is_some_and(|id| wanted.contains(&id)))
            .cloned()
            .collect())
    }
}

fn entry(id: i64, guid: &str, name: &str, slug: &str) -> CatalogEntry {
    CatalogEntry {
        id,
        guid: guid.to_string(),
        name: name.to_string(),
        slug: Some(slug.to_string()),
        owner: Some("acme".to_string()),
        url: None,
        source_url: None,
        versions: vec![CatalogVersionInfo {
            version: "2.0.0".to_string(),
            spt_constraint: None,
            download_url: None,
        }],
    }
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// A small install: one mod split across server and client halves, one
/// server-only mod, one client plugin the catalog has never heard of
fn fixture_install() -> TempDir {
    let tmp = TempDir::new().unwrap();
    write(
        &tmp.path().join("user/mods/bigmod/package.json"),
        r#"{"name":"BigMod","version":"1.0.0","author":"acme","guid":"com.acme.bigmod"}"#,
    );
    write(
        &tmp.path().join("user/mods/solo/package.json"),
        r#"{"name":"Solo","version":"3.0.0","author":"acme","guid":"com.acme.solo"}"#,
    );
    write(
        &tmp.path().join("BepInEx/plugins/BigMod.manifest.json"),
        r#"{"guid":"com.acme.bigmod","name":"BigMod-Client","version":"1.1.0","author":"acme"}"#,
    );
    write(
        &tmp.path().join("BepInEx/plugins/Mystery.manifest.json"),
        r#"{"guid":"com.other.mystery","name":"Mystery","version":"0.1.0"}"#,
    );
    tmp
}

fn fake_catalog() -> FakeCatalog {
    let mut by_guid = HashMap::new();
    by_guid.insert(
        "com.acme.bigmod".to_string(),
        entry(1, "com.acme.bigmod", "BigMod", "big-mod"),
    );
    by_guid.insert(
        "com.acme.solo".to_string(),
        entry(2, "com.acme.solo", "Solo", "solo"),
    );

    // BigMod depends on the installed Solo and on an absent library
    let listings = vec![DependencyListing {
        id: Some(1),
        guid: "com.acme.bigmod".to_string(),
        dependencies: vec![
            CatalogDependency {
                id: Some(2),
                guid: "com.acme.solo".to_string(),
                name: "Solo".to_string(),
                slug: Some("solo".to_string()),
                latest_compatible_version: Some("3.0.0".to_string()),
                conflict: false,
                children: Vec::new(),
            },
            CatalogDependency {
                id: Some(9),
                guid: "com.acme.helperlib".to_string(),
                name: "HelperLib".to_string(),
                slug: Some("helper-lib".to_string()),
                latest_compatible_version: Some("4.2.0".to_string()),
                conflict: false,
                children: Vec::new(),
            },
        ],
    }];

    let updates = UpdateReport {
        safe_to_update: vec![UpdateEntry {
            catalog_id: 1,
            latest_version: Some("2.0.0".to_string()),
            reason: None,
        }],
        up_to_date: vec![UpdateEntry {
            catalog_id: 2,
            latest_version: Some("3.0.0".to_string()),
            reason: None,
        }],
        ..Default::default()
    };

    FakeCatalog {
        by_guid,
        listings,
        updates,
    }
}

fn find<'a>(mods: &'a [Mod], guid: &str) -> &'a Mod {
    mods.iter()
        .find(|m| m.guid == guid)
        .unwrap_or_else(|| panic!("no mod with guid {}", guid))
}

#[tokio::test]
async fn test_full_pipeline() {
    let install = fixture_install();
    let catalog = Arc::new(fake_catalog());

    // Scan and reconcile
    let (server, client) = scan::scan_install_root(&ManifestScanner, install.path()).unwrap();
    assert_eq!(server.len(), 2);
    assert_eq!(client.len(), 2);

    let reconciled = reconcile::reconcile(server, client);
    assert_eq!(reconciled.mods.len(), 3, "bigmod merges, solo and mystery stay");
    assert_eq!(reconciled.pairs.len(), 1);
    assert_eq!(reconciled.unmatched_server.len(), 1);
    assert_eq!(reconciled.unmatched_client.len(), 1);

    // The client half carried the higher version, so it was selected
    let bigmod = find(&reconciled.mods, "com.acme.bigmod");
    assert_eq!(bigmod.local_version, "1.1.0");
    assert!(bigmod.paired_component_path.is_some());

    // Match concurrently
    let progress = Arc::new(AtomicUsize::new(0));
    let mods = matching::match_all(
        catalog.clone(),
        reconciled.mods,
        "3.11.0",
        &CancellationToken::new(),
        progress,
    )
    .await
    .unwrap();

    let bigmod = find(&mods, "com.acme.bigmod");
    assert_eq!(bigmod.status, ModStatus::Verified);
    assert_eq!(bigmod.match_confidence, 100);
    assert_eq!(bigmod.match_method, MatchMethod::ExactGuid);
    assert_eq!(bigmod.catalog_id, Some(1));

    let solo = find(&mods, "com.acme.solo");
    assert_eq!(solo.status, ModStatus::Verified);

    let mystery = find(&mods, "com.other.mystery");
    assert_eq!(mystery.status, ModStatus::NoMatch);
    assert_eq!(mystery.match_confidence, 0);

    // Enrich with update info
    let mut mods = mods;
    update::enrich_updates(catalog.as_ref(), &mut mods, "3.11.0").await;
    assert_eq!(
        find(&mods, "com.acme.bigmod").update_status,
        UpdateStatus::UpdateAvailable
    );
    assert_eq!(
        find(&mods, "com.acme.solo").update_status,
        UpdateStatus::UpToDate
    );
    assert_eq!(
        find(&mods, "com.other.mystery").update_status,
        UpdateStatus::Unknown
    );

    // Resolve dependencies
    let outcome =
        resolver::resolve_dependencies(catalog.as_ref(), &mods, &HashSet::new(), BASE).await;

    assert_eq!(outcome.roots.len(), 3, "every installed mod gets a root");

    let bigmod_root = outcome
        .roots
        .iter()
        .find(|r| r.module.guid == "com.acme.bigmod")
        .unwrap();
    assert_eq!(bigmod_root.children.len(), 2);

    let solo_node = bigmod_root
        .children
        .iter()
        .find(|n| n.module.guid == "com.acme.solo")
        .unwrap();
    assert!(solo_node.is_installed);

    let helper_node = bigmod_root
        .children
        .iter()
        .find(|n| n.module.guid == "com.acme.helperlib")
        .unwrap();
    assert!(!helper_node.is_installed);

    assert_eq!(outcome.missing.len(), 1);
    let missing = &outcome.missing[0];
    assert_eq!(missing.guid, "com.acme.helperlib");
    assert_eq!(missing.recommended_version.as_deref(), Some("4.2.0"));
    assert_eq!(
        missing.download_url.as_deref(),
        Some("https://forge.test/api/v1/mods/9/helper-lib/download/4.2.0")
    );
    assert_eq!(missing.required_by, vec!["BigMod".to_string()]);

    assert!(outcome.conflicts.is_empty());
}

#[tokio::test]
async fn test_pipeline_survives_catalog_silence() {
    // A catalog that knows nothing: everything degrades to NoMatch, the
    // forest is all leaf roots, and nothing errors
    let install = fixture_install();
    let catalog = Arc::new(FakeCatalog {
        by_guid: HashMap::new(),
        listings: Vec::new(),
        updates: UpdateReport::default(),
    });

    let (server, client) = scan::scan_install_root(&ManifestScanner, install.path()).unwrap();
    let reconciled = reconcile::reconcile(server, client);

    let progress = Arc::new(AtomicUsize::new(0));
    let mut mods = matching::match_all(
        catalog.clone(),
        reconciled.mods,
        "3.11.0",
        &CancellationToken::new(),
        progress,
    )
    .await
    .unwrap();

    assert!(mods.iter().all(|m| m.status == ModStatus::NoMatch));

    update::enrich_updates(catalog.as_ref(), &mut mods, "3.11.0").await;
    let outcome =
        resolver::resolve_dependencies(catalog.as_ref(), &mods, &HashSet::new(), BASE).await;

    assert_eq!(outcome.roots.len(), mods.len());
    assert!(outcome.roots.iter().all(|r| r.children.is_empty()));
    assert!(outcome.missing.is_empty());
}

#[tokio::test]
async fn test_pipeline_preserves_scan_order() {
    let install = fixture_install();
    let catalog = Arc::new(fake_catalog());

    let (server, client) = scan::scan_install_root(&ManifestScanner, install.path()).unwrap();
    let reconciled = reconcile::reconcile(server, client);
    let expected: Vec<usize> = reconciled.mods.iter().map(|m| m.scan_index).collect();

    let progress = Arc::new(AtomicUsize::new(0));
    let mods = matching::match_all(
        catalog,
        reconciled.mods,
        "3.11.0",
        &CancellationToken::new(),
        progress,
    )
    .await
    .unwrap();

    let got: Vec<usize> = mods.iter().map(|m| m.scan_index).collect();
    assert_eq!(got, expected);
}
