use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

use trading_workshop::config::{RESET_TOKEN, WorkshopConfig};
use trading_workshop::domain::backup::{BackupRestoreStateMachine, SnapshotKind, StageBoundary, TrackedFile};
use trading_workshop::domain::carbon::{daily_profile, sci_progression};
use trading_workshop::domain::deployment::{read_machines, read_services, select_services};
use trading_workshop::domain::metrics::{MetricsProvider, MockMetricsProvider, Timeframe};
use trading_workshop::domain::progression::{Checkpoint, CheckpointProgressionEngine, Dashboard};
use trading_workshop::domain::schedule::read_schedule_jobs;
use trading_workshop::error::Error;
use trading_workshop::{logger, report};

#[derive(Parser)]
#[command(name = "workshop", about = "Trading cluster efficiency workshop")]
struct Cli {
    /// Workshop directory containing `configuration_files/` and the market data artifact.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// JSON configuration file. Defaults to `workshop.json` in the root, if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Cluster overview, progress and the current hint.
    Status {
        /// Comma-separated service names to show.
        #[arg(short, long, value_delimiter = ',')]
        services: Vec<String>,
    },

    /// P50/P95/P99 response times per service.
    Latency,

    /// Check whether a checkpoint is complete.
    Validate {
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=3))]
        checkpoint: u8,
    },

    /// Batch job schedule with overlaps.
    Scheduler,

    /// Carbon intensity by hour.
    Carbon,

    /// Energy and software carbon intensity as checkpoints are completed.
    SoftwareCarbonIntensity,

    /// Request volume and utilization history of one service.
    Historical {
        service: String,

        #[arg(short, long, default_value = "180_days")]
        timeframe: Timeframe,
    },

    /// Snapshot and restore the workshop files.
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
}

#[derive(Subcommand)]
enum BackupAction {
    /// Save a copy of the current deployment descriptor.
    CreateCheckpoint {
        #[arg(long)]
        checkpoint_name: Option<String>,
    },

    #[command(name = "restore-checkpoint1-start")]
    RestoreCheckpoint1Start,

    #[command(name = "restore-checkpoint2-start")]
    RestoreCheckpoint2Start,

    #[command(name = "restore-checkpoint3-start")]
    RestoreCheckpoint3Start,

    /// Replace the original snapshots with the current files (instructors only).
    ResetOriginal {
        #[arg(long)]
        confirm: Option<String>,
    },

    List,

    Status,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("{} {:#}", "Error:".red(), e);
            ExitCode::FAILURE
        }
    }
}

/// `Ok(false)` is a failed validation or a refused/aborted backup operation.
fn run(cli: Cli) -> Result<bool> {
    let config = WorkshopConfig::load(&cli.root, cli.config.as_deref()).context("Could not load workshop configuration")?;
    logger::init(&config.logging);
    log::info!("Workshop root '{}'", config.root.display());

    let backup = BackupRestoreStateMachine::new(&config);
    backup.ensure_original_snapshot();

    let engine = CheckpointProgressionEngine::new(&config);

    match cli.command {
        Command::Status { services: filter } => {
            let report = engine.evaluate();
            let services = engine.current_services();
            let metrics = MockMetricsProvider::new(&config.removable_service, &config.performance_service, engine.is_artifact_optimized());

            let shown = if filter.is_empty() {
                services.clone()
            } else {
                let (selected, unknown) = select_services(&services, &filter);
                if !unknown.is_empty() {
                    println!("{} Services not found: {}", "Warning:".yellow(), unknown.join(", "));
                }
                selected
            };

            print!("{}", report::render_cluster(&shown, &read_machines(&config.deployment_path)));
            println!();
            print!("{}", report::render_checkpoints(&report.state));
            println!();
            print!("{}", report::render_alerts(&engine.alerts_for(&report.state, &services, &metrics)));
            if let Some(notice) = engine.sustainability_notice(&report.state) {
                print!("{}", report::render_sustainability_notice(&notice));
            }
            Ok(true)
        }

        Command::Validate { checkpoint } => {
            let checkpoint = Checkpoint::from_number(checkpoint).with_context(|| format!("No checkpoint {}", checkpoint))?;
            let original = backup.snapshot_path(TrackedFile::Deployment, &SnapshotKind::Original);
            let outcome = engine.validate(checkpoint, original.is_file().then_some(original.as_path()));

            print!("{}", report::render_validation(&outcome));
            Ok(outcome.passed)
        }

        Command::Latency => {
            let state = engine.compute_state();
            let missing = Dashboard::Latency.missing(&state);
            if !missing.is_empty() {
                print!("{}", report::render_locked(Dashboard::Latency, &missing));
                return Ok(true);
            }

            let metrics = MockMetricsProvider::new(&config.removable_service, &config.performance_service, engine.is_artifact_optimized());
            let mut readings: Vec<_> = engine.current_services().into_iter().map(|s| (s.name.clone(), metrics.metrics_for(&s.name))).collect();
            readings.sort_by(|a, b| a.0.cmp(&b.0));

            let artifact = config.artifact_path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            print!("{}", report::render_latency(&readings, &config.performance_service, &artifact));
            Ok(true)
        }

        Command::SoftwareCarbonIntensity => {
            let state = engine.compute_state();
            print!("{}", report::render_software_carbon(&sci_progression(&state), &state));
            Ok(true)
        }

        Command::Historical { service, timeframe } => {
            let original = backup.snapshot_path(TrackedFile::Deployment, &SnapshotKind::Original);
            let known = engine.current_services().into_iter().chain(read_services(&original)).any(|s| s.name == service);
            if !known {
                println!("{} No historical data found for service '{}'.", "Failed:".red(), service);
                return Ok(false);
            }

            let metrics = MockMetricsProvider::new(&config.removable_service, &config.performance_service, engine.is_artifact_optimized());
            print!("{}", report::render_history(&metrics.history_for(&service, timeframe)));
            Ok(true)
        }

        Command::Scheduler => {
            let state = engine.compute_state();
            let missing = Dashboard::Scheduler.missing(&state);
            if !missing.is_empty() {
                print!("{}", report::render_locked(Dashboard::Scheduler, &missing));
                return Ok(true);
            }
            print!("{}", report::render_schedule(&engine.assess_schedule(), &config.low_impact_window.to_string()));
            Ok(true)
        }

        Command::Carbon => {
            let state = engine.compute_state();
            let missing = Dashboard::Carbon.missing(&state);
            if !missing.is_empty() {
                print!("{}", report::render_locked(Dashboard::Carbon, &missing));
                return Ok(true);
            }
            let jobs = read_schedule_jobs(&config.schedule_path).into_items();
            print!("{}", report::render_carbon(&daily_profile(), &jobs));
            Ok(true)
        }

        Command::Backup { action } => run_backup(&backup, action),
    }
}

fn run_backup(backup: &BackupRestoreStateMachine, action: BackupAction) -> Result<bool> {
    let outcome = match action {
        BackupAction::CreateCheckpoint { checkpoint_name } => backup.create_named_snapshot(checkpoint_name.as_deref()).map(|path| {
            println!("{} Snapshot saved to {}", "Success:".green(), path.display());
        }),
        BackupAction::RestoreCheckpoint1Start => backup.restore_original().map(|_| print!("{}", report::render_restored("the original workshop files"))),
        BackupAction::RestoreCheckpoint2Start => restore_boundary(backup, StageBoundary::Stage2Start),
        BackupAction::RestoreCheckpoint3Start => restore_boundary(backup, StageBoundary::Stage3Start),
        BackupAction::ResetOriginal { confirm } => {
            let token = match confirm {
                Some(token) => token,
                None => prompt_for_token()?,
            };
            backup.reset_original_snapshot(&token).map(|files| {
                println!("{} Original snapshots reset for {} file(s).", "Success:".green(), files.len());
            })
        }
        BackupAction::List => {
            print!("{}", report::render_snapshot_list(&backup.list_snapshots()?));
            Ok(())
        }
        BackupAction::Status => {
            print!("{}", report::render_backup_status(&backup.status()));
            Ok(())
        }
    };

    match outcome {
        Ok(()) => Ok(true),
        Err(e @ (Error::MissingBackup { .. } | Error::ConfirmationRejected | Error::InvalidSnapshotName(_))) => {
            eprintln!("{} {}", "Failed:".red(), e);
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

fn restore_boundary(backup: &BackupRestoreStateMachine, boundary: StageBoundary) -> Result<(), Error> {
    backup.restore_stage_boundary(boundary).map(|_| print!("{}", report::render_restored(report::boundary_description(boundary))))
}

fn prompt_for_token() -> Result<String> {
    println!("{} This overwrites the original snapshots with the current files.", "Warning:".yellow());
    print!("   Type '{}' to confirm: ", RESET_TOKEN);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
