//! ftm: fastfetch theme manager.
//!
//! Lists, previews and applies fastfetch configuration themes.  Applying
//! always goes through the safe apply engine: the active configuration is
//! snapshotted, the theme is written, fastfetch is run once against it, and
//! the previous configuration is restored automatically if fastfetch fails or
//! hangs.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ Cli::parse()            -- clap; usage errors exit with code 2
//!  └─ load_settings_from()    -- ftm/config.toml, defaults when absent
//!  └─ init_logging()          -- tracing to stderr
//!  └─ AppContext::new()       -- data dirs, locator, backup store, probe, engine
//!  └─ dispatch Command
//!       ├─ list / preview / add / backups / prune / settings
//!       └─ apply / restore    -> SafeApplyEngine::apply
//! ```
//!
//! # Exit codes
//!
//! | code | meaning                                             |
//! |------|-----------------------------------------------------|
//! | 0    | success / theme applied                             |
//! | 1    | failed before anything was changed, or other error  |
//! | 2    | command-line usage error                            |
//! | 3    | theme rejected, previous configuration restored     |
//! | 4    | theme rejected and restore failed (manual recovery) |

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, SystemTime};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use ftm::application::ports::{ConfigLocator, ProcessProbe};
use ftm::infrastructure::backup::select_restorable;
use ftm::infrastructure::console;
use ftm::infrastructure::context::{AppContext, Overrides};
use ftm::infrastructure::storage::config::{
    load_settings_from, save_settings_to, settings_file_path, Settings,
};
use ftm_core::{ExitStatusCode, ThemeDescriptor, ThemeOrigin};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Fastfetch theme manager with automatic rollback.
#[derive(Debug, Parser)]
#[command(name = "ftm", version, about)]
struct Cli {
    /// Settings file to use instead of the platform default.
    #[arg(long, global = true, env = "FTM_SETTINGS")]
    settings: Option<PathBuf>,

    /// Active fastfetch configuration to manage instead of the standard location.
    #[arg(long, global = true, env = "FTM_ACTIVE_CONFIG")]
    active: Option<PathBuf>,

    /// Log debug output to stderr (ignored when RUST_LOG is set).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List available themes.
    List {
        /// Only list themes of one origin: system, example or user.
        #[arg(long)]
        origin: Option<ThemeOrigin>,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Run fastfetch once with a theme without changing anything.
    Preview {
        /// Index, name, origin/name, or path to a theme file.
        theme: String,
    },

    /// Make a theme the active configuration, reverting if fastfetch fails.
    #[command(visible_alias = "set")]
    Apply {
        /// Index, name, origin/name, or path to a theme file.
        theme: String,
        /// Probe timeout in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Copy a theme file into the user theme directory.
    Add {
        file: PathBuf,
        /// Name to store the theme under (defaults to the file name).
        #[arg(long)]
        name: Option<String>,
    },

    /// List retained snapshots of the active configuration, newest first.
    Backups,

    /// Re-apply a retained snapshot of the active configuration (the newest by default).
    Restore {
        /// Leading characters of the snapshot id.
        id: Option<String>,
        /// Probe timeout in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Delete old snapshots.
    Prune {
        /// Number of snapshots to keep (defaults to backup.keep).
        #[arg(long)]
        keep: Option<usize>,
    },

    /// Show the effective settings.
    Settings {
        /// Write them to the settings file.
        #[arg(long)]
        write: bool,
    },
}

impl Command {
    fn timeout(&self) -> Option<Duration> {
        match self {
            Command::Apply { timeout_ms, .. } | Command::Restore { timeout_ms, .. } => {
                timeout_ms.map(Duration::from_millis)
            }
            _ => None,
        }
    }

    /// Commands that search the preset dirs for themes.
    fn looks_up_themes(&self) -> bool {
        matches!(
            self,
            Command::List { .. } | Command::Preview { .. } | Command::Apply { .. }
        )
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit(ExitStatusCode::Failed)
        }
    }
}

fn exit(status: ExitStatusCode) -> ExitCode {
    ExitCode::from(status.code())
}

/// `RUST_LOG` wins; otherwise `-v` or the settings level.
fn init_logging(settings: &Settings, verbose: bool) {
    let fallback = if verbose { "debug" } else { settings.logging.level.as_str() };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let settings_path = match cli.settings {
        Some(path) => path,
        None => settings_file_path()?,
    };
    let settings = load_settings_from(&settings_path)
        .with_context(|| format!("loading settings from {}", settings_path.display()))?;
    init_logging(&settings, cli.verbose);
    debug!(path = %settings_path.display(), "settings loaded");

    let overrides = Overrides {
        active_config: cli.active,
        timeout: cli.command.timeout(),
        detect_data_paths: cli.command.looks_up_themes(),
    };
    let ctx = AppContext::new(settings, overrides).await?;

    match cli.command {
        Command::List { origin, json } => {
            let themes = ctx.catalog.list(origin);
            if json {
                println!("{}", console::theme_json(&themes)?);
            } else {
                print!("{}", console::theme_table(&themes));
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Preview { theme } => {
            let theme = ctx.catalog.resolve(&theme)?;
            ctx.probe.ensure_available()?;
            info!(theme = %theme.qualified_name(), "previewing");
            let status = ctx
                .probe
                .preview(&theme.source_path)
                .await
                .with_context(|| format!("running {}", ctx.probe.command().program))?;
            Ok(if status.success() {
                ExitCode::SUCCESS
            } else {
                exit(ExitStatusCode::Failed)
            })
        }

        Command::Apply { theme, .. } => {
            let theme = ctx.catalog.resolve(&theme)?;
            let result = ctx.engine.apply(&theme).await;
            eprint!("{}", console::apply_report(&result));
            Ok(exit(result.exit_code()))
        }

        Command::Add { file, name } => {
            let theme = ctx
                .locator
                .install_user_theme(&file, name.as_deref())
                .with_context(|| format!("adding {}", file.display()))?;
            println!("added {} → {}", theme.qualified_name(), theme.source_path.display());
            Ok(ExitCode::SUCCESS)
        }

        Command::Backups => {
            let entries = ctx.store.list()?;
            print!("{}", console::backup_table(&entries, SystemTime::now()));
            Ok(ExitCode::SUCCESS)
        }

        Command::Restore { id, .. } => {
            let entries = ctx.store.list()?;
            let active = ctx.locator.locate()?;
            let entry = select_restorable(&entries, id.as_deref(), &active)?;

            let short = entry.record.id.simple().to_string();
            let theme = ThemeDescriptor::new(
                format!("snapshot {}", &short[..8]),
                entry.payload_path.clone(),
                ThemeOrigin::User,
            );
            let result = ctx.engine.apply(&theme).await;
            eprint!("{}", console::apply_report(&result));
            Ok(exit(result.exit_code()))
        }

        Command::Prune { keep } => {
            let keep = keep.unwrap_or(ctx.settings.backup.keep).max(1);
            let removed = ctx.store.prune(keep)?;
            println!("removed {removed} snapshot(s), kept at most {keep}");
            Ok(ExitCode::SUCCESS)
        }

        Command::Settings { write } => {
            if write {
                save_settings_to(&ctx.settings, &settings_path)?;
                eprintln!("wrote {}", settings_path.display());
            }
            print!("# {}\n{}", settings_path.display(), toml::to_string_pretty(&ctx.settings)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
