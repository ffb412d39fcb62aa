use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail, ensure};
use clap::{ArgAction, Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use dream_frame::config::Configuration;
use dream_frame::display;
use dream_frame::media::{self, FolderRef};
use dream_frame::platform::lock::LockController;
use dream_frame::settings::Preferences;
use dream_frame::tasks::loader::DecodingLoader;
use dream_frame::tasks::scanner::{self, FsProvider};
use dream_frame::tasks::sequencer::{self, Activation};

#[derive(Debug, Parser)]
#[command(
    name = "dream-frame",
    version,
    about = "Show one random picture from a folder, then lock the screen"
)]
struct Args {
    /// Path to YAML config
    #[arg(short, long, value_name = "FILE", default_value = "/etc/dream-frame/config.yaml")]
    config: PathBuf,
    /// Override the preferences file from the config
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one screensaver activation (default)
    Run {
        /// Deterministic RNG seed for picking the entry
        #[arg(long, value_name = "SEED")]
        seed: Option<u64>,
    },
    /// Remember DIR as the media folder
    SelectFolder {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
    /// Allow activations to lock the device with the configured command
    EnrollLock,
    /// Stop locking the device after activations
    RevokeLock,
    /// List the qualifying entries and some random picks without displaying
    Preview {
        #[arg(long, value_name = "SEED")]
        seed: Option<u64>,
        /// Number of picks to print
        #[arg(long, value_name = "N", default_value_t = 5)]
        count: usize,
    },
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dream_frame={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        config,
        settings,
        verbose,
        command,
    } = Args::parse();
    init_tracing(verbose);

    let mut cfg = Configuration::load_or_default(&config)?
        .validated()
        .context("invalid configuration values")?;
    if let Some(path) = settings {
        cfg.settings_path = path;
    }
    tracing::debug!("configuration:\n{:#?}", cfg);

    let mut prefs = Preferences::open(&cfg.settings_path, &cfg.preferences_namespace)
        .with_context(|| format!("failed to open preferences {}", cfg.settings_path.display()))?;

    match command.unwrap_or(Command::Run { seed: None }) {
        Command::Run { seed } => run(&cfg, &prefs, seed).await,
        Command::SelectFolder { dir } => select_folder(&mut prefs, dir),
        Command::EnrollLock => enroll_lock(&cfg, &mut prefs),
        Command::RevokeLock => {
            prefs.set_lock_enrolled(false);
            prefs.save().context("failed to save preferences")?;
            tracing::info!("lock enrollment revoked");
            Ok(())
        }
        Command::Preview { seed, count } => preview(&prefs, seed, count),
    }
}

fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

async fn run(cfg: &Configuration, prefs: &Preferences, seed: Option<u64>) -> Result<()> {
    let cancel = CancellationToken::new();
    spawn_shutdown_watchers(&cancel);

    let lock = LockController::new(cfg.lock.plan(), prefs.lock_enrolled());
    if !lock.is_enrolled() {
        tracing::info!("lock enforcement not enrolled; activation will end without locking");
    }
    let ctx = Activation {
        provider: Arc::new(FsProvider),
        loader: Arc::new(DecodingLoader),
        surface: display::surface_from_config(&cfg.display),
        lock: Arc::new(lock),
        timings: cfg.timings(),
    };

    let mut rng = rng_for(seed);
    let outcome =
        sequencer::run_activation(&ctx, prefs.selected_folder(), &mut rng, cancel.clone()).await;
    tracing::info!(
        end = ?outcome.end,
        displayed = ?outcome.displayed.as_ref().map(|e| e.path.display().to_string()),
        "activation complete"
    );
    cancel.cancel();
    Ok(())
}

// Ctrl-C, SIGTERM, or closing stdin tear the activation down.
fn spawn_shutdown_watchers(cancel: &CancellationToken) {
    if io::stdin().is_terminal() {
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            let mut sink = Vec::new();
            match io::stdin().read_to_end(&mut sink) {
                Ok(_) => tracing::info!("stdin closed; initiating shutdown"),
                Err(err) => tracing::warn!("stdin watcher failed: {err}"),
            }
            cancel.cancel();
        });
    } else {
        tracing::debug!("stdin is not a terminal; skipping shutdown watcher");
    }

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                res = tokio::signal::ctrl_c() => match res {
                    Ok(()) => {
                        tracing::info!("ctrl-c received; initiating shutdown");
                        cancel.cancel();
                    }
                    Err(err) => tracing::warn!("ctrl-c handler failed: {err}"),
                }
            }
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = sigterm.recv() => {
                            tracing::info!("SIGTERM received; initiating shutdown");
                            cancel.cancel();
                        }
                    }
                }
                Err(err) => tracing::warn!("failed to register SIGTERM handler: {err}"),
            }
        });
    }
}

fn select_folder(prefs: &mut Preferences, dir: PathBuf) -> Result<()> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("cannot resolve {}", dir.display()))?;
    ensure!(dir.is_dir(), "{} is not a directory", dir.display());
    std::fs::read_dir(&dir).with_context(|| format!("cannot read {}", dir.display()))?;

    let folder = FolderRef::from_path(&dir);
    prefs.set_selected_folder(&folder);
    prefs.save().context("failed to save preferences")?;
    tracing::info!(folder = %folder, prefs = %prefs.path().display(), "media folder selected");
    Ok(())
}

fn enroll_lock(cfg: &Configuration, prefs: &mut Preferences) -> Result<()> {
    if cfg.lock.command.is_none() {
        bail!("lock.command must be configured before enrolling");
    }
    prefs.set_lock_enrolled(true);
    prefs.save().context("failed to save preferences")?;
    tracing::info!("lock enforcement enrolled");
    Ok(())
}

fn preview(prefs: &Preferences, seed: Option<u64>, count: usize) -> Result<()> {
    let Some(folder) = prefs.selected_folder() else {
        println!("(no media folder selected; run `dream-frame select-folder <DIR>`)");
        return Ok(());
    };

    let entries = scanner::scan(&FsProvider, &folder);
    println!(
        "# preview\n# folder: {}\n# images: {}\n# seed: {}\n",
        folder,
        entries.len(),
        seed.map_or_else(|| "(random)".to_string(), |s| s.to_string())
    );
    if entries.is_empty() {
        println!("(no images under {})", folder.to_path().display());
        return Ok(());
    }

    println!("# entries:");
    for entry in &entries {
        println!(
            "  {:<12} {:<4} {}",
            entry.content_type.as_deref().unwrap_or("unknown"),
            if media::is_gif(entry) { "gif" } else { "" },
            entry.path.display()
        );
    }

    let mut rng = rng_for(seed);
    println!("\n# picks:");
    for idx in 0..count {
        if let Some(entry) = sequencer::select_entry(&entries, &mut rng) {
            println!("  {:>4}: {}", idx + 1, entry.path.display());
        }
    }
    Ok(())
}
