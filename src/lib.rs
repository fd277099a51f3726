use std::path::Path;

use crate::config::WorkshopConfig;
use crate::domain::backup::BackupRestoreStateMachine;
use crate::domain::progression::{CheckpointProgressionEngine, ProgressionReport};
use crate::error::Result;

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;
pub mod report;

/// Loads the configuration for the workshop at `root`, makes sure the original snapshots
/// exist and evaluates the learner's progress.
pub fn evaluate_workshop(root: &Path) -> Result<ProgressionReport> {
    let config = WorkshopConfig::load(root, None)?;
    log::info!("Configuration loaded for workshop root '{}'.", root.display());

    BackupRestoreStateMachine::new(&config).ensure_original_snapshot();

    let report = CheckpointProgressionEngine::new(&config).evaluate();
    log::info!("Progress evaluated: {:?}.", report.state.as_tuple());

    Ok(report)
}
