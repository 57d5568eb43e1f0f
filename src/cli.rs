//! CLI interface for shotcam.
//!
//! - `shotcam run`: the long-running orchestration loop.
//! - `shotcam state`: what the machine log says right now.
//! - `shotcam reconcile --camera <id> --shot <n>`: match a movie by hand.
//! - `shotcam journal`: the operator journal.
//!
//! All commands read the same config, `~/.shotcam/config.toml` unless
//! `--config` says otherwise.

mod format;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand};
use jiff::{SignedDuration, Timestamp};

use crate::archive;
use crate::config::Config;
use crate::helper::HelperProcess;
use crate::journal::Journal;
use crate::orchestrator::Orchestrator;
use crate::reconcile::{self, Freshness};
use crate::schedule;
use crate::shot_store;
use crate::tracker::ShotStateTracker;

use format::{format_age, format_entry, format_time};

/// shotcam: record infrared movies around each plasma shot.
#[derive(Debug, Parser)]
#[command(name = "shotcam", version, after_long_help = EXAMPLE_HELP)]
pub struct Cli {
    /// Config file. Defaults to `~/.shotcam/config.toml`.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level. `RUST_LOG` overrides this.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

const EXAMPLE_HELP: &str = r#"Examples:
  shotcam run
  shotcam state
  shotcam reconcile --camera ircam --shot 44123 --relocate
  shotcam journal --limit 50"#;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Watch the machine log and drive the cameras until interrupted.
    Run {
        /// Do not start the configured log-source helper.
        #[arg(long)]
        no_helper: bool,
    },

    /// Show the current shot, machine state and timing estimate.
    State,

    /// Match the newest movie in a camera's export directory to a shot.
    ///
    /// The age check is skipped: the operator vouches for the file.
    Reconcile {
        /// Camera id from the config.
        #[arg(long)]
        camera: String,

        /// The shot the newest movie belongs to.
        #[arg(long)]
        shot: u32,

        /// Also move the movie into today's archive folders.
        #[arg(long)]
        relocate: bool,
    },

    /// Print the most recent operator journal entries.
    Journal {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

/// Run the parsed command.
pub fn run(cli: Cli) -> Result<(), String> {
    let config = load_config(cli.config)?;

    match cli.command {
        Command::Run { no_helper } => cmd_run(&config, no_helper),
        Command::State => cmd_state(&config),
        Command::Reconcile {
            camera,
            shot,
            relocate,
        } => cmd_reconcile(&config, &camera, shot, relocate),
        Command::Journal { limit } => cmd_journal(&config, limit),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config, String> {
    let path = match path {
        Some(path) => path,
        None => Config::default_path().ok_or("could not determine home directory")?,
    };
    Config::load(&path).map_err(|e| format!("failed to load config {}: {e}", path.display()))
}

fn cmd_run(config: &Config, no_helper: bool) -> Result<(), String> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .map_err(|e| format!("failed to install interrupt handler: {e}"))?;

    // Dropped on every way out of this function, which kills the helper.
    let mut helper = match &config.helper {
        Some(helper_config) if !no_helper => {
            let helper = HelperProcess::spawn(helper_config)
                .map_err(|e| format!("failed to start helper: {e}"))?;
            let wait = Duration::from_secs(helper_config.startup_wait_secs);
            if schedule::sleep_unless(&shutdown, wait) {
                return Ok(());
            }
            Some(helper)
        }
        _ => None,
    };

    let mut orchestrator = Orchestrator::open(config, Timestamp::now())
        .map_err(|e| format!("failed to start: {e}"))?;
    orchestrator.run(&shutdown, helper.as_mut());
    Ok(())
}

fn cmd_state(config: &Config) -> Result<(), String> {
    let now = Timestamp::now();
    let tz = config
        .time_zone()
        .map_err(|e| format!("invalid time zone: {e}"))?;
    let zoned = now.to_zoned(tz.clone());
    let log_path = config
        .log_path_at(&zoned)
        .map_err(|e| format!("invalid log path: {e}"))?;
    let tracker = ShotStateTracker::open(log_path, config.timing.clone(), now)
        .map_err(|e| format!("failed to read log: {e}"))?;
    let record = tracker.record();

    println!("log:        {}", tracker.log_path().display());
    match record.shot {
        Some(shot) => println!("shot:       {shot}"),
        None => println!("shot:       unknown"),
    }
    println!(
        "state:      {} (entered {} ago)",
        record.state,
        format_age(now.duration_since(record.state_entered_at))
    );
    match tracker.estimate() {
        Some(estimate) => {
            let until = estimate.until_shot(now);
            let relative = if until.is_negative() {
                format!("{} ago", format_age(-until))
            } else {
                format!("in {}", format_age(until))
            };
            println!(
                "predicted:  {} ({relative})",
                format_time(estimate.predicted_shot(), &tz)
            );
            println!(
                "recording:  {} to {}",
                format_time(estimate.recording_start(), &tz),
                format_time(estimate.recording_finish(), &tz)
            );
            println!("re-arm:     {}", format_time(estimate.rearm(), &tz));
        }
        None => println!("predicted:  no estimate"),
    }
    let operating = schedule::is_operating(&config.hours, &zoned);
    println!("operating:  {}", if operating { "yes" } else { "no" });
    if let Some(path) = &config.shot_number_path {
        match shot_store::read_next_shot(path) {
            Some(next) => println!("next shot:  {next}"),
            None => println!("next shot:  unreadable ({})", path.display()),
        }
    }
    Ok(())
}

fn cmd_reconcile(
    config: &Config,
    camera_id: &str,
    shot: u32,
    relocate: bool,
) -> Result<(), String> {
    let camera = config
        .camera(camera_id)
        .ok_or_else(|| format!("unknown camera '{camera_id}'"))?;
    let now = Timestamp::now();
    let freshness = Freshness {
        shot_changed_at: None,
        max_age: SignedDuration::MAX,
    };

    let reconciliation = reconcile::reconcile(
        &camera.export_dir,
        shot,
        &camera.filename_pattern,
        freshness,
        now,
    )
    .map_err(|e| format!("failed to reconcile: {e}"))?;

    let file = reconciliation
        .file
        .as_ref()
        .map_or_else(|| "-".to_string(), |f| f.display().to_string());
    println!("{:?}: {file}", reconciliation.outcome);

    if relocate
        && reconciliation.outcome.is_success()
        && let Some(path) = &reconciliation.file
    {
        let tz = config
            .time_zone()
            .map_err(|e| format!("invalid time zone: {e}"))?;
        let today = now.to_zoned(tz).date();
        let folders = archive::ensure_day_folders(camera, today)
            .map_err(|e| format!("failed to create day folders: {e}"))?;
        let relocation =
            archive::relocate(path, &folders).map_err(|e| format!("failed to relocate: {e}"))?;
        println!("archived: {}", relocation.local.display());
        if let Some(remote) = relocation.remote {
            println!("mirrored: {}", remote.display());
        }
    }
    Ok(())
}

fn cmd_journal(config: &Config, limit: usize) -> Result<(), String> {
    let path = config
        .journal_path()
        .ok_or("could not determine home directory")?;
    let journal = Journal::new(path);
    let entries = journal
        .load()
        .map_err(|e| format!("failed to read journal {}: {e}", journal.path().display()))?;

    if entries.is_empty() {
        println!("No journal entries");
        return Ok(());
    }
    let tz = config
        .time_zone()
        .map_err(|e| format!("invalid time zone: {e}"))?;
    let skip = entries.len().saturating_sub(limit);
    for entry in &entries[skip..] {
        println!("{}", format_entry(entry, &tz));
    }
    Ok(())
}
