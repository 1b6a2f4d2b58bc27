// src/update.rs

//! Update enrichment
//!
//! One batched catalog call annotates every verified mod with its update
//! status and latest compatible version. No algorithm here beyond mapping the
//! categorized response back onto the mods; a failed call leaves everything
//! at `Unknown`.

use crate::catalog::api::{CatalogApi, UpdateQuery};
use crate::model::{Mod, ModStatus, UpdateStatus};
use semver::Version;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Annotate verified mods with update information from the catalog
pub async fn enrich_updates<C: CatalogApi>(api: &C, mods: &mut [Mod], spt_version: &str) {
    let mut queries: Vec<UpdateQuery> = Vec::new();
    let mut seen = HashSet::new();
    for module in mods.iter_mut() {
        if module.status != ModStatus::Verified {
            continue;
        }
        let Some(id) = module.catalog_id else { continue };

        if Version::parse(&module.local_version).is_err() {
            module.status = ModStatus::InvalidVersion;
            debug!(
                "Skipping update check for {}: version {:?} is not semantic",
                module.display_name(),
                module.local_version
            );
            continue;
        }

        // Paired halves share an id; one query serves both
        if seen.insert(id) {
            queries.push(UpdateQuery {
                catalog_id: id,
                installed_version: module.local_version.clone(),
            });
        }
    }
    if queries.is_empty() {
        return;
    }

    let report = match api.batch_updates(&queries, spt_version).await {
        Ok(report) => report,
        Err(e) => {
            warn!("Update check failed: {}", e);
            return;
        }
    };

    let mut by_id: HashMap<i64, (UpdateStatus, Option<String>, Option<String>)> = HashMap::new();
    for entry in &report.safe_to_update {
        by_id.insert(
            entry.catalog_id,
            (UpdateStatus::UpdateAvailable, entry.latest_version.clone(), None),
        );
    }
    for entry in &report.blocked {
        by_id.insert(
            entry.catalog_id,
            (
                UpdateStatus::UpdateBlocked,
                entry.latest_version.clone(),
                entry.reason.clone(),
            ),
        );
    }
    for entry in &report.up_to_date {
        by_id.insert(
            entry.catalog_id,
            (UpdateStatus::UpToDate, entry.latest_version.clone(), None),
        );
    }
    for entry in &report.incompatible {
        by_id.insert(
            entry.catalog_id,
            (
                UpdateStatus::Incompatible,
                entry.latest_version.clone(),
                entry.reason.clone(),
            ),
        );
    }

    for module in mods.iter_mut() {
        let Some(id) = module.catalog_id else { continue };
        if let Some((status, latest, reason)) = by_id.get(&id) {
            module.update_status = *status;
            module.latest_version = latest.clone();
            if module.update_status == UpdateStatus::Incompatible {
                module.status = ModStatus::Incompatible;
                module.incompatibility_reason = reason.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::api::{
        CatalogEntry, DependencyListing, DependencyQuery, SptVersionInfo, UpdateEntry,
        UpdateReport,
    };
    use crate::error::{Error, Result};
    use crate::model::MatchMethod;
    use crate::scan::ScanRecord;
    use std::path::PathBuf;

    fn verified(guid: &str, id: i64, version: &str) -> Mod {
        let mut m = Mod::from_record(
            &ScanRecord {
                guid: guid.to_string(),
                file_path: PathBuf::from("/mods/x"),
                is_server_component: true,
                local_name: guid.to_string(),
                local_author: "a".to_string(),
                local_version: version.to_string(),
                alternate_guids: Vec::new(),
                load_warnings: Vec::new(),
            },
            0,
        );
        m.catalog_id = Some(id);
        m.status = ModStatus::Verified;
        m.match_method = MatchMethod::ExactGuid;
        m.match_confidence = 100;
        m
    }

    struct MockCatalog {
        report: UpdateReport,
    }

    impl CatalogApi for MockCatalog {
        async fn check_auth(&self) -> Result<bool> {
            Ok(true)
        }

        async fn list_versions(&self, _f: Option<&str>) -> Result<Vec<SptVersionInfo>> {
            Ok(Vec::new())
        }

        async fn search(&self, _q: &str, _s: &str) -> Result<Vec<CatalogEntry>> {
            Ok(Vec::new())
        }

        async fn get_by_guid(&self, _g: &str, _s: &str) -> Result<CatalogEntry> {
            Err(Error::NotFound)
        }

        async fn batch_updates(&self, _q: &[UpdateQuery], _s: &str) -> Result<UpdateReport> {
            Ok(self.report.clone())
        }

        async fn batch_dependencies(
            &self,
            _q: &[DependencyQuery],
        ) -> Result<Vec<DependencyListing>> {
            Ok(Vec::new())
        }
    }

    fn entry(id: i64, latest: &str, reason: Option<&str>) -> UpdateEntry {
        UpdateEntry {
            catalog_id: id,
            latest_version: Some(latest.to_string()),
            reason: reason.map(|r| r.to_string()),
        }
    }

    #[tokio::test]
    async fn test_categories_map_onto_mods() {
        let catalog = MockCatalog {
            report: UpdateReport {
                safe_to_update: vec![entry(1, "2.0.0", None)],
                blocked: vec![entry(2, "3.0.0", Some("breaking change"))],
                up_to_date: vec![entry(3, "1.0.0", None)],
                incompatible: vec![entry(4, "9.9.9", Some("needs SPT 4.0"))],
            },
        };
        let mut mods = vec![
            verified("a", 1, "1.0.0"),
            verified("b", 2, "1.0.0"),
            verified("c", 3, "1.0.0"),
            verified("d", 4, "1.0.0"),
        ];

        enrich_updates(&catalog, &mut mods, "3.11.0").await;

        assert_eq!(mods[0].update_status, UpdateStatus::UpdateAvailable);
        assert_eq!(mods[0].latest_version.as_deref(), Some("2.0.0"));
        assert_eq!(mods[1].update_status, UpdateStatus::UpdateBlocked);
        assert_eq!(mods[2].update_status, UpdateStatus::UpToDate);
        assert_eq!(mods[3].update_status, UpdateStatus::Incompatible);
        assert_eq!(mods[3].status, ModStatus::Incompatible);
        assert_eq!(
            mods[3].incompatibility_reason.as_deref(),
            Some("needs SPT 4.0")
        );
    }

    #[tokio::test]
    async fn test_unparsable_local_version_is_flagged_and_skipped() {
        let catalog = MockCatalog {
            report: UpdateReport::default(),
        };
        let mut mods = vec![verified("a", 1, "one point oh")];

        enrich_updates(&catalog, &mut mods, "3.11.0").await;

        assert_eq!(mods[0].status, ModStatus::InvalidVersion);
        assert_eq!(mods[0].update_status, UpdateStatus::Unknown);
    }

    #[tokio::test]
    async fn test_paired_mods_share_one_result() {
        let catalog = MockCatalog {
            report: UpdateReport {
                safe_to_update: vec![entry(1, "2.0.0", None)],
                ..Default::default()
            },
        };
        // Server and client halves matched to the same catalog entry
        let mut mods = vec![verified("a", 1, "1.0.0"), verified("a.client", 1, "1.0.0")];

        enrich_updates(&catalog, &mut mods, "3.11.0").await;

        assert_eq!(mods[0].update_status, UpdateStatus::UpdateAvailable);
        assert_eq!(mods[1].update_status, UpdateStatus::UpdateAvailable);
    }
}
