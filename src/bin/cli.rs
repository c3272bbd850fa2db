//! glotwatch CLI
//!
//! Local execution entry point: manage the watch list, force ticks, or run
//! the periodic surveillance loop in the foreground.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::Utc;
use clap::{Parser, Subcommand};
use glotwatch::{
    error::Result,
    models::{Config, ProjectKey, ProjectType},
    notify::WebhookNotifier,
    pipeline::Engine,
    storage::LocalStore,
    utils::http,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// glotwatch - Translation Status Watcher
#[derive(Parser, Debug)]
#[command(
    name = "glotwatch",
    version,
    about = "Watches translation completion of WordPress.org projects"
)]
struct Cli {
    /// Path to storage directory containing config and state files
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start watching a project (runs a trial scrape first)
    Watch {
        /// Project type: core, plugin, theme, meta or app
        project_type: ProjectType,
        /// Project slug as known to the translation API
        slug: String,
        /// Locale code, e.g. fr_FR
        locale: String,
    },

    /// Stop watching a project
    Unwatch {
        project_type: ProjectType,
        slug: String,
        locale: String,
    },

    /// List watched projects with their last snapshot
    List,

    /// Run one scrape/dispatch tick now
    Tick {
        /// Run even when surveillance is disabled
        #[arg(long)]
        force: bool,
    },

    /// Run one digest flush tick now
    Digest,

    /// Run the surveillance loop in the foreground
    Run,

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.storage_dir.join("config.toml");
    let config = Arc::new(Config::load_or_default(&config_path));

    if let Command::Validate = cli.command {
        config.validate()?;
        log::info!("Configuration OK ({} webhook(s))", config.webhooks.len());
        return Ok(());
    }

    let store = Arc::new(LocalStore::new(&cli.storage_dir));
    let client = http::create_async_client(&config.scraper)?;
    let notifier = Arc::new(WebhookNotifier::new(client));
    let engine = Engine::load(
        Arc::clone(&config),
        store,
        notifier,
        StdRng::from_entropy(),
    )
    .await?;

    match cli.command {
        Command::Watch {
            project_type,
            slug,
            locale,
        } => match engine.watch(project_type, &slug, &locale, Utc::now()).await {
            Ok(snapshot) => {
                log::info!(
                    "Watching {project_type}/{slug}/{locale}: {}% translated ({}/{})",
                    snapshot.completion_pct,
                    snapshot.translated,
                    snapshot.total
                );
            }
            Err(reason) => {
                log::error!("Watch request denied: {reason}");
            }
        },

        Command::Unwatch {
            project_type,
            slug,
            locale,
        } => {
            let key = ProjectKey::new(project_type, slug, locale);
            if engine.unwatch(&key, Utc::now()).await? {
                log::info!("Stopped watching {key}");
            } else {
                log::warn!("{key} was not being watched");
            }
        }

        Command::List => {
            let watched = engine.watched();
            if watched.is_empty() {
                log::info!("No projects watched");
            }
            for project in watched {
                match &project.last_snapshot {
                    Some(snapshot) => log::info!(
                        "{} [{}] {}% ({}/{}), next check {}",
                        project.key,
                        project.project_type_label,
                        snapshot.completion_pct,
                        snapshot.translated,
                        snapshot.total,
                        project.next_check_at
                    ),
                    None => log::info!(
                        "{} [{}] never checked, next check {}",
                        project.key,
                        project.project_type_label,
                        project.next_check_at
                    ),
                }
            }
        }

        Command::Tick { force } => {
            let report = engine.run_scrape_tick(force, Utc::now()).await?;
            log::info!(
                "Tick report: {} selected, {} ok, {} in backoff, {} failed",
                report.selected,
                report.succeeded,
                report.skipped_backoff,
                report.failed
            );
        }

        Command::Digest => {
            let flushed = engine.run_digest_tick(Utc::now()).await?;
            log::info!("Digest tick: {flushed} channel(s) flushed");
        }

        Command::Run => {
            config.validate()?;
            let abort = engine.abort_flag();
            let period =
                std::time::Duration::from_secs((config.surveillance.interval_minutes * 60) as u64);
            let mut ticker = tokio::time::interval(period);
            log::info!(
                "Surveillance loop started (every {} minute(s))",
                config.surveillance.interval_minutes
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = Utc::now();
                        if let Err(error) = engine.run_scrape_tick(false, now).await {
                            log::error!("scrape tick failed: {error}");
                        }
                        if let Err(error) = engine.run_digest_tick(now).await {
                            log::error!("digest tick failed: {error}");
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        abort.store(true, Ordering::Relaxed);
                        log::info!("Interrupt received, stopping");
                        break;
                    }
                }
            }
        }

        Command::Validate => unreachable!("handled above"),
    }

    Ok(())
}
