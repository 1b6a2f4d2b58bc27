// src/main.rs

use anyhow::{Context, Result, bail};
use clap::Parser;
use modcheck::catalog::{CatalogApi, DEFAULT_BASE_URL, ForgeClient};
use modcheck::config::CredentialStore;
use modcheck::model::{Mod, ModStatus, UpdateStatus};
use modcheck::resolver::ResolutionOutcome;
use modcheck::scan::ManifestScanner;
use modcheck::{matching, reconcile, resolver, scan, update};
use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Plugin GUIDs that ship with SPT itself and never appear as mods
const CORE_GUIDS: &[&str] = &["com.SPT.core", "com.SPT.custom", "com.SPT.debugging"];

#[derive(Parser)]
#[command(name = "modcheck")]
#[command(author, version, about = "Audit installed SPT mods against the Forge catalog", long_about = None)]
struct Cli {
    /// SPT install root (defaults to the current directory)
    install_root: Option<PathBuf>,

    /// Catalog API base URL
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    api_url: String,

    /// Target SPT version (defaults to the catalog's latest)
    #[arg(long)]
    spt_version: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let root = match cli.install_root {
        Some(root) => root,
        None => std::env::current_dir().context("Cannot determine current directory")?,
    };

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight work");
            ctrl_c_cancel.cancel();
        }
    });

    let store = CredentialStore::default_location()?;
    let client = Arc::new(authenticate(&store, &cli.api_url, &cancel).await?);

    let spt_version = match cli.spt_version {
        Some(version) => version,
        None => detect_spt_version(client.as_ref()).await?,
    };
    info!("Target SPT version: {}", spt_version);

    // Scan and reconcile before any further catalog traffic
    let (server_records, client_records) = scan::scan_install_root(&ManifestScanner, &root)?;
    if server_records.is_empty() && client_records.is_empty() {
        bail!("No mods found under {}", root.display());
    }
    println!(
        "Found {} server and {} client components under {}",
        server_records.len(),
        client_records.len(),
        root.display()
    );

    let reconciled = reconcile::reconcile(server_records, client_records);
    for pair in &reconciled.pairs {
        for note in &pair.notes {
            println!("  note [{}]: {}", pair.selected_guid, note);
        }
    }

    // Concurrent catalog matching
    let progress = Arc::new(AtomicUsize::new(0));
    let total = reconciled.mods.len();
    println!("Matching {} mods against the catalog...", total);
    let mut mods = match matching::match_all(
        client.clone(),
        reconciled.mods,
        &spt_version,
        &cancel,
        progress,
    )
    .await
    {
        Ok(mods) => mods,
        Err(modcheck::Error::InvalidApiKey { should_delete_key }) => {
            if should_delete_key {
                store.delete()?;
            }
            bail!("The catalog rejected the API key mid-run; please run again");
        }
        Err(e) => return Err(e.into()),
    };

    confirm_uncertain_matches(&mut mods)?;

    update::enrich_updates(client.as_ref(), &mut mods, &spt_version).await;

    let installed: HashSet<String> = CORE_GUIDS.iter().map(|g| g.to_string()).collect();
    let resolution =
        resolver::resolve_dependencies(client.as_ref(), &mods, &installed, client.base_url()).await;

    print_report(&mods, &resolution);
    Ok(())
}

/// Load or prompt for the API key until the catalog accepts it
///
/// A definitive rejection deletes the stored key and prompts again; a
/// transient catalog error keeps the key and lets the run continue degraded.
async fn authenticate(
    store: &CredentialStore,
    api_url: &str,
    cancel: &CancellationToken,
) -> Result<ForgeClient> {
    for attempt in 0..3 {
        let api_key = match store.load() {
            Some(creds) => creds.api_key,
            None => {
                let key = prompt("Forge API key: ")?;
                if key.is_empty() {
                    bail!("An API key is required");
                }
                store.save(&key)?;
                key
            }
        };

        let client = ForgeClient::new(api_url, &api_key, cancel.clone())?;
        match client.check_auth().await {
            Ok(true) => return Ok(client),
            Ok(false) => {
                warn!("API key lacks read scope (attempt {})", attempt + 1);
                store.delete()?;
            }
            Err(modcheck::Error::InvalidApiKey { should_delete_key }) => {
                warn!("API key rejected (attempt {})", attempt + 1);
                if should_delete_key {
                    store.delete()?;
                }
            }
            Err(e) => {
                // Can't verify right now; keep the key and proceed
                warn!("Auth check failed ({}), continuing with stored key", e);
                return Ok(client);
            }
        }
    }
    bail!("Could not authenticate against the catalog")
}

/// Ask the catalog which SPT version is current
async fn detect_spt_version<C: CatalogApi>(api: &C) -> Result<String> {
    let versions = api
        .list_versions(None)
        .await
        .context("Failed to list SPT versions")?;
    versions
        .iter()
        .find(|v| v.is_latest)
        .or_else(|| versions.first())
        .map(|v| v.version.clone())
        .context("The catalog reported no SPT versions; pass --spt-version")
}

/// Walk the operator through low-confidence candidates
fn confirm_uncertain_matches(mods: &mut [Mod]) -> Result<()> {
    let pending = matching::pending_confirmations(mods);
    if pending.is_empty() {
        return Ok(());
    }
    println!("\n{} mods need confirmation:", pending.len());
    for index in pending {
        let module = &mods[index];
        println!(
            "  local:   {} {} by {}",
            module.local_name, module.local_version, module.local_author
        );
        println!(
            "  catalog: {} by {} (confidence {})",
            module.catalog_name.as_deref().unwrap_or("?"),
            module.catalog_author.as_deref().unwrap_or("?"),
            module.match_confidence
        );
        let answer = prompt("  accept this match? [y/N] ")?;
        let accepted = matches!(answer.to_lowercase().as_str(), "y" | "yes");
        matching::apply_confirmation(&mut mods[index], accepted);
    }
    Ok(())
}

fn prompt(message: &str) -> Result<String> {
    print!("{}", message);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn status_label(module: &Mod) -> String {
    match module.status {
        ModStatus::Verified => match module.update_status {
            UpdateStatus::UpdateAvailable => format!(
                "update available ({} -> {})",
                module.local_version,
                module.latest_version.as_deref().unwrap_or("?")
            ),
            UpdateStatus::UpdateBlocked => "update blocked".to_string(),
            UpdateStatus::UpToDate => "up to date".to_string(),
            _ => "verified".to_string(),
        },
        ModStatus::NoMatch => "no catalog match".to_string(),
        ModStatus::Incompatible => format!(
            "incompatible: {}",
            module.incompatibility_reason.as_deref().unwrap_or("unknown reason")
        ),
        ModStatus::InvalidVersion => {
            format!("invalid local version {:?}", module.local_version)
        }
        ModStatus::NeedsConfirmation => "unconfirmed".to_string(),
        ModStatus::Unknown => "unknown".to_string(),
    }
}

fn print_report(mods: &[Mod], resolution: &ResolutionOutcome) {
    println!("\n=== Mods ===");
    for module in mods {
        println!(
            "{:<40} {:<12} {}",
            module.display_name(),
            module.local_version,
            status_label(module)
        );
        if module.status == ModStatus::NoMatch {
            println!(
                "    {} by {} at {}",
                module.local_name,
                module.local_author,
                module.file_path.display()
            );
        }
    }

    if !resolution.missing.is_empty() {
        println!("\n=== Missing dependencies ===");
        for missing in &resolution.missing {
            println!(
                "{} (recommended {})",
                missing.name,
                missing.recommended_version.as_deref().unwrap_or("any"),
            );
            println!("    required by: {}", missing.required_by.join(", "));
            if let Some(url) = &missing.download_url {
                println!("    download: {}", url);
            }
        }
    }

    if !resolution.conflicts.is_empty() {
        println!("\n=== Conflicts ===");
        for conflict in &resolution.conflicts {
            println!("{}: {}", conflict.name, conflict.note);
        }
    }

    let verified = mods.iter().filter(|m| m.status == ModStatus::Verified).count();
    println!(
        "\n{} of {} mods verified, {} missing dependencies, {} conflicts",
        verified,
        mods.len(),
        resolution.missing.len(),
        resolution.conflicts.len()
    );
}
