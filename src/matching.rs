// src/matching.rs

//! Catalog matching engine
//!
//! Resolves each mod against the catalog with a cascade of strategies: exact
//! GUID lookup, alternate-GUID lookup, then a name-search cascade scored by a
//! five-tier evaluator. Matching is per-mod and runs concurrently; only the
//! gateway imposes ordering between catalog calls.
//!
//! Confidence constants are fixed tuning values, centralized here. Do not
//! re-derive them.

use crate::catalog::api::{CatalogApi, CatalogEntry};
use crate::error::{Error, Result};
use crate::model::{CatalogVersion, MatchMethod, Mod, ModStatus};
use crate::names;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Exact primary-GUID hit
pub const CONFIDENCE_EXACT_GUID: u8 = 100;

/// Deducted when the hit came from an alternate GUID rather than the primary
pub const ALTERNATE_GUID_PENALTY: u8 = 5;

/// Tier (a): normalized-name exact equality
pub const CONFIDENCE_EXACT_NAME: u8 = 95;

/// Tier (b): normalized-name equality after component-suffix stripping
pub const CONFIDENCE_STRIPPED_NAME: u8 = 93;

/// Tier (c): candidate slug equals the local name
pub const CONFIDENCE_SLUG_VS_NAME: u8 = 92;

/// Tier (c): candidate slug equals the GUID-derived name
pub const CONFIDENCE_SLUG_VS_GUID_NAME: u8 = 90;

/// Tier (d): owner equals author plus suffix-stripped name equality
pub const CONFIDENCE_AUTHOR_AND_NAME: u8 = 95;

/// Tier (e): minimum fuzzy similarity ratio considered at all
pub const FUZZY_FLOOR: u8 = 70;

/// Tier (e): fuzzy ratios are scaled down before becoming confidence
pub const FUZZY_SCALE: f64 = 0.85;

/// Confidence at or above this auto-accepts; below it queues for confirmation
pub const AUTO_ACCEPT_THRESHOLD: u8 = 75;

/// Author values that carry no identifying information
const PLACEHOLDER_AUTHORS: &[&str] = &["", "unknown", "anonymous", "n/a"];

/// Build the ordered, de-duplicated candidate-term list for the name search
///
/// Terms are CamelCase-expanded before querying; an all-uppercase term is an
/// acronym and stays as-is.
pub fn candidate_terms(module: &Mod) -> Vec<String> {
    let mut raw_terms = vec![
        module.local_name.clone(),
        names::strip_component_suffix(&module.local_name),
    ];

    let guid_name = names::guid_tail(&module.guid);
    if !guid_name.is_empty() {
        raw_terms.push(guid_name.to_string());
        raw_terms.push(names::strip_component_suffix(guid_name));
    }

    let author = module.local_author.trim();
    if !PLACEHOLDER_AUTHORS.contains(&author.to_lowercase().as_str()) {
        raw_terms.push(format!("{} {}", author, module.local_name));
    }

    let mut terms = Vec::new();
    for raw in raw_terms {
        if raw.is_empty() {
            continue;
        }
        let expanded = names::split_camel_case(&raw);
        if !terms.contains(&expanded) {
            terms.push(expanded);
        }
    }
    terms
}

/// Fuzzy similarity ratio in [0, 100] over normalized forms
fn fuzzy_ratio(a: &str, b: &str) -> u8 {
    let (a, b) = (names::normalize(a), names::normalize(b));
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    (strsim::normalized_levenshtein(&a, &b) * 100.0).round() as u8
}

/// Score search candidates with the five-tier evaluator
///
/// Tiers are tried in order and the first satisfied tier wins, regardless of
/// how any individual term scored. Returns the chosen entry, its confidence,
/// and the match method.
fn evaluate_candidates<'a>(
    module: &Mod,
    candidates: &'a [CatalogEntry],
) -> Option<(&'a CatalogEntry, u8, MatchMethod)> {
    let local_name = &module.local_name;
    let guid_name = names::guid_tail(&module.guid);

    // (a) exact normalized name
    for entry in candidates {
        if names::names_equal(local_name, &entry.name) {
            return Some((entry, CONFIDENCE_EXACT_NAME, MatchMethod::ExactName));
        }
    }

    // (b) exact after stripping the local component suffix
    let stripped_local = names::strip_component_suffix(local_name);
    for entry in candidates {
        if names::names_equal(&stripped_local, &entry.name) {
            return Some((entry, CONFIDENCE_STRIPPED_NAME, MatchMethod::ExactName));
        }
    }

    // (c) slug comparisons
    for entry in candidates {
        let Some(slug) = entry.slug.as_deref() else { continue };
        if names::names_equal(local_name, slug) {
            return Some((entry, CONFIDENCE_SLUG_VS_NAME, MatchMethod::ExactName));
        }
        if !guid_name.is_empty() && names::names_equal(guid_name, slug) {
            return Some((entry, CONFIDENCE_SLUG_VS_GUID_NAME, MatchMethod::ExactName));
        }
    }

    // (d) owner matches author plus stripped name equality
    let author = module.local_author.trim();
    if !author.is_empty() {
        for entry in candidates {
            let owner_matches = entry
                .owner
                .as_deref()
                .is_some_and(|o| o.eq_ignore_ascii_case(author));
            if owner_matches && names::names_equal_stripped(local_name, &entry.name) {
                return Some((entry, CONFIDENCE_AUTHOR_AND_NAME, MatchMethod::ExactName));
            }
        }
    }

    // (e) fuzzy similarity over name and slug, higher of the two
    let mut best: Option<(&CatalogEntry, u8)> = None;
    for entry in candidates {
        let name_score = fuzzy_ratio(local_name, &entry.name);
        let slug_score = entry
            .slug
            .as_deref()
            .map(|s| fuzzy_ratio(local_name, s))
            .unwrap_or(0);
        let score = name_score.max(slug_score);
        if score >= FUZZY_FLOOR && best.is_none_or(|(_, b)| score > b) {
            best = Some((entry, score));
        }
    }
    best.map(|(entry, score)| {
        let confidence = (score as f64 * FUZZY_SCALE).round() as u8;
        (entry, confidence, MatchMethod::FuzzyName)
    })
}

/// Copy a catalog entry's fields onto the mod
fn apply_entry(module: &mut Mod, entry: &CatalogEntry, confidence: u8, method: MatchMethod) {
    module.catalog_id = Some(entry.id);
    module.catalog_name = Some(entry.name.clone());
    module.catalog_author = entry.owner.clone();
    module.slug = entry.slug.clone();
    module.url = entry.url.clone();
    module.source_url = entry.source_url.clone();
    module.versions = entry
        .versions
        .iter()
        .map(|v| CatalogVersion {
            version: v.version.clone(),
            spt_constraint: v.spt_constraint.clone(),
            download_url: v.download_url.clone(),
        })
        .collect();
    module.match_confidence = confidence.min(100);
    module.match_method = method;
    module.status = if confidence >= AUTO_ACCEPT_THRESHOLD {
        ModStatus::Verified
    } else {
        ModStatus::NeedsConfirmation
    };
}

/// Resolve one mod against the catalog, mutating it in place
///
/// Catalog errors degrade this mod to unmatched instead of failing the run;
/// only fatal conditions (auth rejection, cancellation) propagate.
pub async fn match_mod<C: CatalogApi>(api: &C, module: &mut Mod, spt_version: &str) -> Result<()> {
    // 1. Primary GUID lookup
    if !module.guid.is_empty() {
        match api.get_by_guid(&module.guid, spt_version).await {
            Ok(entry) => {
                apply_entry(module, &entry, CONFIDENCE_EXACT_GUID, MatchMethod::ExactGuid);
                return Ok(());
            }
            Err(e) => handle_lookup_error(module, e)?,
        }
        if module.status == ModStatus::Incompatible {
            return Ok(());
        }
    }

    // 2. Alternate-GUID lookups
    for alt in module.alternate_guids.clone() {
        match api.get_by_guid(&alt, spt_version).await {
            Ok(entry) => {
                apply_entry(
                    module,
                    &entry,
                    CONFIDENCE_EXACT_GUID - ALTERNATE_GUID_PENALTY,
                    MatchMethod::ExactGuid,
                );
                return Ok(());
            }
            Err(e) => handle_lookup_error(module, e)?,
        }
        if module.status == ModStatus::Incompatible {
            return Ok(());
        }
    }

    // 3. Name-search cascade: the first term with any candidates decides
    for term in candidate_terms(module) {
        let candidates = match api.search(&term, spt_version).await {
            Ok(candidates) => candidates,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("Search for {:?} failed: {}", term, e);
                continue;
            }
        };
        if candidates.is_empty() {
            continue;
        }
        debug!("Term {:?} returned {} candidates", term, candidates.len());
        match evaluate_candidates(module, &candidates) {
            Some((entry, confidence, method)) => {
                apply_entry(module, entry, confidence, method);
            }
            None => {
                module.status = ModStatus::NoMatch;
            }
        }
        return Ok(());
    }

    module.status = ModStatus::NoMatch;
    Ok(())
}

/// Degrade a failed GUID lookup, propagating only fatal errors
fn handle_lookup_error(module: &mut Mod, error: Error) -> Result<()> {
    match error {
        Error::NotFound => Ok(()),
        Error::NoCompatibleVersion(version) => {
            module.status = ModStatus::Incompatible;
            module.incompatibility_reason =
                Some(format!("No version compatible with SPT {}", version));
            Ok(())
        }
        e if e.is_fatal() => Err(e),
        e => {
            warn!("Lookup for {} failed: {}", module.display_name(), e);
            Ok(())
        }
    }
}

/// Match every mod concurrently, restoring original scan order afterwards
///
/// `progress` is bumped once per completed mod. Cancellation stops remaining
/// work; mods already resolved keep whatever they gathered. An auth rejection
/// aborts the run.
pub async fn match_all<C>(
    api: Arc<C>,
    mods: Vec<Mod>,
    spt_version: &str,
    cancel: &CancellationToken,
    progress: Arc<AtomicUsize>,
) -> Result<Vec<Mod>>
where
    C: CatalogApi + 'static,
{
    let mut tasks = JoinSet::new();
    for mut module in mods {
        let api = api.clone();
        let spt_version = spt_version.to_string();
        let cancel = cancel.clone();
        let progress = progress.clone();
        tasks.spawn(async move {
            if cancel.is_cancelled() {
                return (module, None);
            }
            let outcome = match_mod(api.as_ref(), &mut module, &spt_version).await;
            progress.fetch_add(1, Ordering::Relaxed);
            (module, outcome.err())
        });
    }

    let mut matched = Vec::new();
    let mut fatal: Option<Error> = None;
    while let Some(joined) = tasks.join_next().await {
        let (module, error) = joined.map_err(|e| Error::Init(format!("Match task panicked: {e}")))?;
        if let Some(e) = error {
            match e {
                // Cancellation is not an error for the run: keep partial data
                Error::Cancelled => {}
                e if fatal.is_none() => fatal = Some(e),
                _ => {}
            }
        }
        matched.push(module);
    }

    if let Some(e) = fatal {
        return Err(e);
    }

    // Completion order is arbitrary; presentation order is scan order
    matched.sort_by_key(|m| m.scan_index);
    Ok(matched)
}

/// Indices of mods waiting on operator confirmation
pub fn pending_confirmations(mods: &[Mod]) -> Vec<usize> {
    mods.iter()
        .enumerate()
        .filter(|(_, m)| m.status == ModStatus::NeedsConfirmation)
        .map(|(i, _)| i)
        .collect()
}

/// Apply the operator's decision on an uncertain candidate
///
/// Accepting keeps the attached catalog data and promotes the mod to
/// `Verified` with the `Manual` method; rejecting strips every catalog field.
pub fn apply_confirmation(module: &mut Mod, accepted: bool) {
    if accepted {
        module.status = ModStatus::Verified;
        module.match_method = MatchMethod::Manual;
        module.is_confirmed = true;
    } else {
        module.clear_catalog_match();
    }
}
