use clap::{Parser, Subcommand};
use cliclack::{intro, log, note, outro, spinner};
use futures::TryStreamExt;
use playbridge::config::Config;
use playbridge::gateway::spotify::SpotifyClient;
use playbridge::gateway::youtube::YouTubeClient;
use playbridge::{
    Gateway, MappingOutcome, MappingValidation, Resolver, RunReport, SyncError, SyncMode,
    SyncOrchestrator, SyncReport,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Keep YouTube Music playlists in sync with Spotify playlists")]
struct Cli {
    /// The command to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync mapped playlists
    Sync {
        /// Source playlist ID to sync (optional, syncs all mappings if not specified)
        #[clap(short = 'i', long = "id", value_name = "SOURCE_PLAYLIST_ID")]
        playlist_id: Option<String>,
        /// Compute the changes without applying them
        #[clap(short = 'd', long)]
        dry_run: bool,
        /// Print the run report as JSON
        #[clap(long)]
        json: bool,
    },
    /// Check that every mapped target playlist still exists
    Validate,
    /// Show the configured playlist mappings
    Mappings,
    /// List your playlists on a catalog
    Playlists {
        /// List YouTube playlists instead of Spotify ones
        #[clap(short = 't', long)]
        target: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = Config::read()?;

    match cli.command {
        Commands::Sync {
            playlist_id,
            dry_run,
            json,
        } => handle_sync(&cfg, playlist_id, dry_run, json).await?,
        Commands::Validate => handle_validate(&cfg).await?,
        Commands::Mappings => handle_mappings(&cfg)?,
        Commands::Playlists { target } => handle_playlists(&cfg, target).await?,
    }

    Ok(())
}

fn source_gateway(cfg: &Config) -> Result<Gateway, SyncError> {
    let client = SpotifyClient::from_env(&cfg.spotify_token_env)?;
    Ok(Gateway::new(
        Arc::new(client),
        Arc::new(cfg.source_limits.rate_limiter()),
        cfg.source_limits.retry_policy(),
    ))
}

async fn target_gateway(cfg: &Config) -> Result<Gateway, SyncError> {
    let oauth2_json = cfg
        .oauth2_json
        .as_deref()
        .ok_or(SyncError::MissingSetting("oauth2_json"))?;
    let client = YouTubeClient::new(oauth2_json).await?;
    Ok(Gateway::new(
        Arc::new(client),
        Arc::new(cfg.target_limits.rate_limiter()),
        cfg.target_limits.retry_policy(),
    ))
}

async fn orchestrator(cfg: &Config) -> Result<SyncOrchestrator, SyncError> {
    let source = source_gateway(cfg)?;
    let target = target_gateway(cfg).await?;
    Ok(
        SyncOrchestrator::new(source, target, Resolver::new(cfg.resolver_config()))
            .with_config(cfg.orchestrator_config()),
    )
}

async fn handle_sync(
    cfg: &Config,
    playlist_id: Option<String>,
    dry_run: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mode = SyncMode::from_dry_run(dry_run);

    // The mapping list is fixed for the whole run
    let snapshot = match &playlist_id {
        Some(id) => cfg.snapshot().only_source(id),
        None => cfg.snapshot(),
    };

    if !json {
        intro(if dry_run {
            "🔍 Playlist Sync (Dry Run)"
        } else {
            "🔄 Playlist Sync"
        })?;
    }

    if snapshot.is_empty() {
        if !json {
            outro("❌ No playlist mappings found to sync")?;
        }
        return Ok(());
    }

    let orchestrator = orchestrator(cfg).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight batches");
            on_signal.cancel();
        }
    });

    info!("Syncing {} mapping(s) in {:?} mode", snapshot.len(), mode);
    let report = if json {
        orchestrator.run(snapshot, mode, cancel).await
    } else {
        let sp = spinner();
        sp.start(&format!("Syncing {} playlist mapping(s)", snapshot.len()));
        let report = orchestrator.run(snapshot, mode, cancel).await;
        sp.stop("Sync finished");
        report
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        render_report(cfg, &report)?;
    }

    if let Some(fatal) = &report.fatal {
        return Err(fatal.to_string().into());
    }
    Ok(())
}

fn render_report(cfg: &Config, report: &RunReport) -> Result<(), Box<dyn std::error::Error>> {
    for outcome in &report.outcomes {
        let mapping = outcome.mapping();
        let label = cfg
            .label_for(&mapping.source_id)
            .map(|name| format!("{name} ({mapping})"))
            .unwrap_or_else(|| mapping.to_string());

        match outcome {
            MappingOutcome::Done(sync) => note(label, describe(sync))?,
            MappingOutcome::Broken { reason, .. } => {
                log::warning(format!("{label}: broken mapping, {reason}"))?
            }
            MappingOutcome::Failed {
                during,
                reason,
                added,
                removed,
                ..
            } => {
                log::error(format!("{label}: failed while {during}: {reason}"))?;
                if !added.is_empty() || !removed.is_empty() {
                    log::remark(format!(
                        "{label}: {} added and {} removed before the failure",
                        added.len(),
                        removed.len()
                    ))?;
                }
            }
            MappingOutcome::Cancelled { .. } => log::remark(format!("{label}: cancelled"))?,
        }
    }

    let summary = report.summary();
    let message = match report.mode {
        SyncMode::DryRun => format!(
            "✅ Dry run completed: {} to add, {} to remove, {} unresolved",
            summary.to_add, summary.to_remove, summary.unresolved
        ),
        SyncMode::Apply => format!(
            "✅ Sync completed: {} added, {} removed, {} unresolved",
            summary.added, summary.removed, summary.unresolved
        ),
    };
    if summary.broken + summary.failed + summary.cancelled > 0 {
        log::warning(format!(
            "{} broken, {} failed, {} cancelled",
            summary.broken, summary.failed, summary.cancelled
        ))?;
    }
    outro(message)?;
    Ok(())
}

fn describe(report: &SyncReport) -> String {
    let mut lines = Vec::new();

    match report.mode {
        SyncMode::DryRun => {
            lines.push(format!("Would add {} track(s)", report.diff.to_add.len()));
            lines.push(format!("Would remove {} track(s)", report.diff.to_remove.len()));
        }
        SyncMode::Apply => {
            lines.push(format!("Added {} track(s)", report.added.len()));
            lines.push(format!("Removed {} track(s)", report.removed.len()));
        }
    }
    lines.push(format!("{} already in sync", report.unchanged));

    if !report.unresolved.is_empty() {
        lines.push(format!("No match found for {} track(s):", report.unresolved.len()));
        for track in &report.unresolved {
            lines.push(format!("  - {track}"));
        }
    }
    for issue in &report.errors {
        lines.push(format!("  ! {}", serde_json::to_string(issue).unwrap_or_default()));
    }
    if report.interrupted {
        lines.push("Interrupted before all changes were applied".to_string());
    }

    lines.join("\n")
}

async fn handle_validate(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    intro("🩺 Validate Mappings")?;

    let snapshot = cfg.snapshot();
    if snapshot.is_empty() {
        outro("❌ No playlist mappings configured")?;
        return Ok(());
    }

    let orchestrator = orchestrator(cfg).await?;
    let sp = spinner();
    sp.start(&format!("Checking {} playlist mapping(s)", snapshot.len()));
    let validations = orchestrator.validate(&snapshot).await?;
    sp.stop("Check finished");

    let mut broken = 0;
    for validation in &validations {
        match validation {
            MappingValidation::Valid { .. } => {}
            MappingValidation::Broken { mapping } => {
                broken += 1;
                log::warning(format!("{mapping}: target playlist no longer exists"))?;
            }
            MappingValidation::Error { mapping, reason } => {
                log::error(format!("{mapping}: could not check ({reason})"))?;
            }
        }
    }

    if broken == 0 {
        outro("✅ All mappings are valid")?;
    } else {
        outro(format!("⚠️  {broken} broken mapping(s)"))?;
    }
    Ok(())
}

fn handle_mappings(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    intro("📜 Playlist Mappings")?;

    if cfg.mappings.is_empty() {
        outro("No mappings configured")?;
        return Ok(());
    }

    for entry in &cfg.mappings {
        let title = entry.name.clone().unwrap_or_else(|| entry.source_id.clone());
        note(
            title,
            format!("Spotify: {}\nYouTube: {}", entry.source_id, entry.target_id),
        )?;
    }

    outro(format!("{} mapping(s)", cfg.mappings.len()))?;
    Ok(())
}

async fn handle_playlists(cfg: &Config, target: bool) -> Result<(), Box<dyn std::error::Error>> {
    let gateway = if target {
        target_gateway(cfg).await?
    } else {
        source_gateway(cfg)?
    };
    intro(format!("🎵 Your {} playlists", gateway.name()))?;

    let playlists: Vec<_> = gateway.list_playlists().try_collect().await?;
    for playlist in &playlists {
        log::info(format!("{} (ID: {})", playlist.name, playlist.id))?;
    }

    outro(format!("{} playlist(s)", playlists.len()))?;
    Ok(())
}
