// src/reconcile.rs

//! Reconciliation engine
//!
//! Merges paired server-side and client-side scan records into unified mods
//! before any catalog calls happen. Pairing is greedy and order-dependent:
//! each client record takes the first unconsumed server record that satisfies
//! the match predicate, in original scan order. This is not a globally
//! optimal bipartite match; it mirrors how installs actually lay out and is
//! a documented limitation, not a defect to fix silently.

use crate::model::{Mod, ReconciliationPair};
use crate::names;
use crate::scan::ScanRecord;
use semver::Version;
use tracing::debug;

/// Everything the reconciliation pass produces for one install
#[derive(Debug, Default)]
pub struct ReconciliationOutcome {
    /// Unified mod set: one entry per pair plus one per unmatched record
    pub mods: Vec<Mod>,
    /// Diagnostic record of each pairing decision
    pub pairs: Vec<ReconciliationPair>,
    pub unmatched_server: Vec<ScanRecord>,
    pub unmatched_client: Vec<ScanRecord>,
}

/// Pair server and client records and build the unified mod set
///
/// Server records keep scan indices `0..S`, client records `S..S+C`; a merged
/// mod carries its server record's index so presentation order is stable.
pub fn reconcile(
    server_records: Vec<ScanRecord>,
    client_records: Vec<ScanRecord>,
) -> ReconciliationOutcome {
    let server_count = server_records.len();
    let mut consumed = vec![false; server_count];
    let mut outcome = ReconciliationOutcome::default();

    for (client_offset, client) in client_records.into_iter().enumerate() {
        let client_index = server_count + client_offset;
        let matched = server_records
            .iter()
            .enumerate()
            .find(|(i, server)| !consumed[*i] && records_match(server, &client));

        match matched {
            Some((server_index, server)) => {
                consumed[server_index] = true;
                let (merged, notes) = merge_pair(server, &client, server_index);
                debug!(
                    "Paired {} (server) with {} (client)",
                    server.local_name, client.local_name
                );
                outcome.pairs.push(ReconciliationPair {
                    server_record: server.clone(),
                    client_record: client,
                    selected_guid: merged.guid.clone(),
                    notes,
                });
                outcome.mods.push(merged);
            }
            None => {
                outcome
                    .mods
                    .push(Mod::from_record(&client, client_index));
                outcome.unmatched_client.push(client);
            }
        }
    }

    for (index, server) in server_records.into_iter().enumerate() {
        if !consumed[index] {
            outcome.mods.push(Mod::from_record(&server, index));
            outcome.unmatched_server.push(server);
        }
    }

    outcome.mods.sort_by_key(|m| m.scan_index);
    outcome
}

/// Match predicate, evaluated in order; first true wins
///
/// 1. Case-insensitive GUID equality
/// 2. Normalized local-name equality after component-suffix stripping
/// 3. GUID-tail comparison: the last delimited segment of each GUID against
///    the other's, or cross-compared against the opposite side's local name
fn records_match(server: &ScanRecord, client: &ScanRecord) -> bool {
    if !server.guid.is_empty() && server.guid.eq_ignore_ascii_case(&client.guid) {
        return true;
    }

    if names::names_equal_stripped(&server.local_name, &client.local_name) {
        return true;
    }

    let server_tail = names::guid_tail(&server.guid);
    let client_tail = names::guid_tail(&client.guid);
    if !server_tail.is_empty()
        && !client_tail.is_empty()
        && names::names_equal_stripped(server_tail, client_tail)
    {
        return true;
    }
    if !server_tail.is_empty() && names::names_equal_stripped(server_tail, &client.local_name) {
        return true;
    }
    if !client_tail.is_empty() && names::names_equal_stripped(client_tail, &server.local_name) {
        return true;
    }

    false
}

/// Which side of a pair supplies the unified identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectedSide {
    Server,
    Client,
}

/// Decide which record of a pair is authoritative
///
/// Both versions parse and differ: the strictly higher wins. Equal or
/// unparsable on both sides: the server record wins (it carries the more
/// authoritative platform metadata). Exactly one parses: that side wins.
pub fn select_best_mod(server: &ScanRecord, client: &ScanRecord) -> (SelectedSide, Vec<String>) {
    let mut notes = Vec::new();

    if !server.guid.eq_ignore_ascii_case(&client.guid) {
        notes.push(format!(
            "GUID differs between sides: {} (server) vs {} (client)",
            server.guid, client.guid
        ));
    }

    let server_version = Version::parse(&server.local_version).ok();
    let client_version = Version::parse(&client.local_version).ok();

    let side = match (&server_version, &client_version) {
        (Some(sv), Some(cv)) => {
            if sv != cv {
                notes.push(format!(
                    "Version differs between sides: {} (server) vs {} (client)",
                    server.local_version, client.local_version
                ));
            }
            if cv > sv {
                SelectedSide::Client
            } else {
                SelectedSide::Server
            }
        }
        (Some(_), None) => {
            notes.push(format!(
                "Client version {:?} is not a valid semantic version",
                client.local_version
            ));
            SelectedSide::Server
        }
        (None, Some(_)) => {
            notes.push(format!(
                "Server version {:?} is not a valid semantic version",
                server.local_version
            ));
            SelectedSide::Client
        }
        (None, None) => {
            notes.push("Neither side has a parseable semantic version".to_string());
            SelectedSide::Server
        }
    };

    (side, notes)
}

/// Build the unified mod for a matched pair
fn merge_pair(server: &ScanRecord, client: &ScanRecord, scan_index: usize) -> (Mod, Vec<String>) {
    let (side, notes) = select_best_mod(server, client);
    let (selected, other) = match side {
        SelectedSide::Server => (server, client),
        SelectedSide::Client => (client, server),
    };

    let mut merged = Mod::from_record(selected, scan_index);
    merged.paired_component_path = Some(other.file_path.clone());

    // The other side's identity stays reachable for catalog matching
    for guid in other
        .alternate_guids
        .iter()
        .chain(std::iter::once(&other.guid))
    {
        if !guid.is_empty()
            && !guid.eq_ignore_ascii_case(&merged.guid)
            && !merged
                .alternate_guids
                .iter()
                .any(|g| g.eq_ignore_ascii_case(guid))
        {
            merged.alternate_guids.push(guid.clone());
        }
    }

    (merged, notes)
}
