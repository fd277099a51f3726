//! Snapshot and restore of the three files a learner edits.
//!
//! Snapshots live in one flat directory, named `<stem>_<tag>.<ext>` after the file they
//! copy. The `original` tag is write-once: it is captured on first use of any operation here
//! and only [`BackupRestoreStateMachine::reset_original_snapshot`] may replace it.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Local};
use uuid::Uuid;

use crate::config::{RESET_TOKEN, WorkshopConfig};
use crate::domain::deployment::without_service;
use crate::domain::progression::ANALYTICS_TARGET;
use crate::error::{Error, Result};

const ORIGINAL_TAG: &str = "original";
const AFTER_STAGE1_TAG: &str = "2";
const OPTIMIZED_TAG: &str = "optimized";
const RESERVED_TAGS: [&str; 3] = [ORIGINAL_TAG, AFTER_STAGE1_TAG, OPTIMIZED_TAG];

/// Artifact file name the bundled optimized reference belongs to.
const REFERENCE_ARTIFACT_NAME: &str = "get_market_data.py";
const OPTIMIZED_REFERENCE: &str = include_str!("../../assets/get_market_data_optimized.py");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackedFile {
    Deployment,
    Schedule,
    Artifact,
}

impl TrackedFile {
    pub const ALL: [TrackedFile; 3] = [TrackedFile::Deployment, TrackedFile::Schedule, TrackedFile::Artifact];
}

impl fmt::Display for TrackedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackedFile::Deployment => write!(f, "deployment descriptor"),
            TrackedFile::Schedule => write!(f, "schedule descriptor"),
            TrackedFile::Artifact => write!(f, "market data artifact"),
        }
    }
}

/// Fixed snapshots that stage-boundary restores draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryTag {
    /// Deployment as it should look once checkpoint 1 is done.
    AfterStage1,

    /// Reference solution for checkpoint 2.
    OptimizedReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    Original,
    StageBoundary(BoundaryTag),
    Named(String),
}

impl SnapshotKind {
    fn tag(&self) -> &str {
        match self {
            SnapshotKind::Original => ORIGINAL_TAG,
            SnapshotKind::StageBoundary(BoundaryTag::AfterStage1) => AFTER_STAGE1_TAG,
            SnapshotKind::StageBoundary(BoundaryTag::OptimizedReference) => OPTIMIZED_TAG,
            SnapshotKind::Named(name) => name,
        }
    }

    fn from_tag(tag: &str) -> Self {
        match tag {
            ORIGINAL_TAG => SnapshotKind::Original,
            AFTER_STAGE1_TAG => SnapshotKind::StageBoundary(BoundaryTag::AfterStage1),
            OPTIMIZED_TAG => SnapshotKind::StageBoundary(BoundaryTag::OptimizedReference),
            other => SnapshotKind::Named(other.to_string()),
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotKind::Original => write!(f, "original"),
            SnapshotKind::StageBoundary(BoundaryTag::AfterStage1) => write!(f, "after checkpoint 1"),
            SnapshotKind::StageBoundary(BoundaryTag::OptimizedReference) => write!(f, "optimized reference"),
            SnapshotKind::Named(name) => write!(f, "checkpoint '{}'", name),
        }
    }
}

/// Start of checkpoint 2 or 3, restorable as a fixed bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageBoundary {
    Stage2Start,
    Stage3Start,
}

impl StageBoundary {
    pub fn id(&self) -> &'static str {
        match self {
            StageBoundary::Stage2Start => "stage2-start",
            StageBoundary::Stage3Start => "stage3-start",
        }
    }

    /// Snapshot restored into each tracked file.
    pub fn bundle(&self) -> [(TrackedFile, SnapshotKind); 3] {
        let artifact = match self {
            StageBoundary::Stage2Start => SnapshotKind::Original,
            StageBoundary::Stage3Start => SnapshotKind::StageBoundary(BoundaryTag::OptimizedReference),
        };
        [
            (TrackedFile::Deployment, SnapshotKind::StageBoundary(BoundaryTag::AfterStage1)),
            (TrackedFile::Artifact, artifact),
            (TrackedFile::Schedule, SnapshotKind::Original),
        ]
    }
}

impl FromStr for StageBoundary {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "stage2-start" | "checkpoint2-start" | "2" => Ok(StageBoundary::Stage2Start),
            "stage3-start" | "checkpoint3-start" | "3" => Ok(StageBoundary::Stage3Start),
            other => Err(Error::UnknownBoundary(other.to_string())),
        }
    }
}

impl fmt::Display for StageBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Metadata of one snapshot file on disk.
#[derive(Debug, Clone)]
pub struct BackupSnapshot {
    pub kind: SnapshotKind,
    pub target: TrackedFile,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub created_at: DateTime<Local>,
}

#[derive(Debug, Clone)]
pub struct SnapshotPresence {
    pub target: TrackedFile,
    pub kind: SnapshotKind,
    pub path: PathBuf,
    pub exists: bool,
}

#[derive(Debug, Clone)]
pub struct BackupStatus {
    pub snapshot_dir: PathBuf,
    pub fixed_snapshots: Vec<SnapshotPresence>,
    pub named_snapshots: usize,
}

impl BackupStatus {
    pub fn all_originals_present(&self) -> bool {
        self.fixed_snapshots.iter().filter(|s| s.kind == SnapshotKind::Original).all(|s| s.exists)
    }
}

pub struct BackupRestoreStateMachine {
    snapshot_dir: PathBuf,
    deployment_path: PathBuf,
    schedule_path: PathBuf,
    artifact_path: PathBuf,
    removable_service: String,
}

impl BackupRestoreStateMachine {
    pub fn new(config: &WorkshopConfig) -> Self {
        BackupRestoreStateMachine {
            snapshot_dir: config.snapshot_dir.clone(),
            deployment_path: config.deployment_path.clone(),
            schedule_path: config.schedule_path.clone(),
            artifact_path: config.artifact_path.clone(),
            removable_service: config.removable_service.clone(),
        }
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    pub fn tracked_path(&self, target: TrackedFile) -> &Path {
        match target {
            TrackedFile::Deployment => &self.deployment_path,
            TrackedFile::Schedule => &self.schedule_path,
            TrackedFile::Artifact => &self.artifact_path,
        }
    }

    fn stem_and_extension(&self, target: TrackedFile) -> (String, Option<String>) {
        let path = self.tracked_path(target);
        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "file".to_string());
        let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
        (stem, ext)
    }

    pub fn snapshot_path(&self, target: TrackedFile, kind: &SnapshotKind) -> PathBuf {
        let (stem, ext) = self.stem_and_extension(target);
        let file_name = match ext {
            Some(ext) => format!("{}_{}.{}", stem, kind.tag(), ext),
            None => format!("{}_{}", stem, kind.tag()),
        };
        self.snapshot_dir.join(file_name)
    }

    /// Captures the original snapshot of every tracked file that exists and has none yet,
    /// then seeds the stage-boundary references (see [`Self::ensure_reference_snapshots`]).
    ///
    /// Idempotent. Failures are logged, never returned. Returns the originals captured by this call.
    pub fn ensure_original_snapshot(&self) -> Vec<TrackedFile> {
        if let Err(e) = fs::create_dir_all(&self.snapshot_dir) {
            log::warn!("Could not create snapshot directory '{}': {}", self.snapshot_dir.display(), e);
            return Vec::new();
        }

        let mut captured = Vec::new();
        for target in TrackedFile::ALL {
            let source = self.tracked_path(target);
            let snapshot = self.snapshot_path(target, &SnapshotKind::Original);
            if snapshot.exists() || !source.exists() {
                continue;
            }

            match write_once(source, &snapshot) {
                Ok(true) => {
                    log::info!("Captured original snapshot of {} at '{}'", target, snapshot.display());
                    tracing::info!(target: ANALYTICS_TARGET, LogDescription = "Original snapshot captured", TrackedFile = ?target);
                    captured.push(target);
                }
                Ok(false) => log::debug!("Original snapshot '{}' appeared concurrently, keeping it", snapshot.display()),
                Err(e) => log::warn!("Could not capture original snapshot of {}: {}", target, e),
            }
        }

        self.ensure_reference_snapshots();
        captured
    }

    /// Writes the fixed stage-boundary snapshots that do not exist yet. Existing ones are never touched.
    ///
    /// - `deployment_2`: the original deployment without the removable service.
    /// - `<artifact>_optimized`: the bundled reference, only for the default artifact name.
    ///
    /// Returns the references written by this call.
    pub fn ensure_reference_snapshots(&self) -> Vec<BoundaryTag> {
        let mut seeded = Vec::new();

        let after_stage1 = self.snapshot_path(TrackedFile::Deployment, &SnapshotKind::StageBoundary(BoundaryTag::AfterStage1));
        let original = self.snapshot_path(TrackedFile::Deployment, &SnapshotKind::Original);
        if !after_stage1.exists() && original.is_file() {
            let derived = fs::read_to_string(&original).map_err(Error::from).and_then(|text| without_service(&text, &self.removable_service));
            match derived.and_then(|text| write_bytes_once(&after_stage1, text.as_bytes()).map_err(Error::from)) {
                Ok(true) => seeded.push(BoundaryTag::AfterStage1),
                Ok(false) => {}
                Err(e) => log::warn!("Could not derive '{}' from the original deployment: {}", after_stage1.display(), e),
            }
        }

        let optimized = self.snapshot_path(TrackedFile::Artifact, &SnapshotKind::StageBoundary(BoundaryTag::OptimizedReference));
        let bundled = self.artifact_path.file_name().is_some_and(|name| name == REFERENCE_ARTIFACT_NAME);
        if !optimized.exists() && bundled {
            match write_bytes_once(&optimized, OPTIMIZED_REFERENCE.as_bytes()) {
                Ok(true) => seeded.push(BoundaryTag::OptimizedReference),
                Ok(false) => {}
                Err(e) => log::warn!("Could not write the optimized reference '{}': {}", optimized.display(), e),
            }
        }

        for tag in &seeded {
            log::info!("Seeded stage-boundary snapshot {}", SnapshotKind::StageBoundary(*tag));
        }
        seeded
    }

    /// Copies the deployment descriptor to `deployment_<name>.yaml`; `None` picks a timestamped name.
    pub fn create_named_snapshot(&self, name: Option<&str>) -> Result<PathBuf> {
        self.ensure_original_snapshot();

        let name = match name {
            Some(name) => validate_snapshot_name(name)?,
            None => format!("checkpoint_{}", Local::now().format("%Y%m%d_%H%M%S")),
        };

        let content = fs::read(&self.deployment_path)?;
        let snapshot = self.snapshot_path(TrackedFile::Deployment, &SnapshotKind::Named(name.clone()));
        replace_file(&snapshot, &content)?;

        log::info!("Created snapshot '{}'", snapshot.display());
        tracing::info!(target: ANALYTICS_TARGET, LogDescription = "Named snapshot created", SnapshotName = %name);
        Ok(snapshot)
    }

    /// Restores every tracked file from its original snapshot. Nothing is written unless all three exist.
    pub fn restore_original(&self) -> Result<()> {
        self.ensure_original_snapshot();

        let bundle: Vec<(TrackedFile, SnapshotKind)> = TrackedFile::ALL.iter().map(|t| (*t, SnapshotKind::Original)).collect();
        self.restore_bundle("restore original", &bundle)?;

        tracing::info!(target: ANALYTICS_TARGET, LogDescription = "Original state restored");
        Ok(())
    }

    /// Restores the fixed bundle of `boundary`. Nothing is written unless every source exists.
    pub fn restore_stage_boundary(&self, boundary: StageBoundary) -> Result<()> {
        self.ensure_original_snapshot();

        self.restore_bundle(&format!("restore {}", boundary.id()), &boundary.bundle())?;

        tracing::info!(target: ANALYTICS_TARGET, LogDescription = "Stage boundary restored", Boundary = boundary.id());
        Ok(())
    }

    fn restore_bundle(&self, operation: &str, bundle: &[(TrackedFile, SnapshotKind)]) -> Result<()> {
        let sources: Vec<(TrackedFile, PathBuf)> = bundle.iter().map(|(target, kind)| (*target, self.snapshot_path(*target, kind))).collect();

        let missing: Vec<PathBuf> = sources.iter().filter(|(_, path)| !path.is_file()).map(|(_, path)| path.clone()).collect();
        if !missing.is_empty() {
            log::error!("{} aborted, {} snapshot(s) missing", operation, missing.len());
            return Err(Error::MissingBackup { operation: operation.to_string(), missing });
        }

        let mut contents = Vec::with_capacity(sources.len());
        for (target, path) in &sources {
            let content = match fs::read(path) {
                Ok(content) => content,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(Error::MissingBackup { operation: operation.to_string(), missing: vec![path.clone()] });
                }
                Err(e) => return Err(e.into()),
            };
            contents.push((*target, content));
        }

        for (target, content) in contents {
            let destination = self.tracked_path(target);
            replace_file(destination, &content)?;
            log::info!("Restored {} at '{}'", target, destination.display());
        }
        Ok(())
    }

    /// Overwrites the original snapshots with the current files. Requires the exact reset token.
    pub fn reset_original_snapshot(&self, confirmation_token: &str) -> Result<Vec<TrackedFile>> {
        self.ensure_original_snapshot();

        if confirmation_token != RESET_TOKEN {
            log::warn!("Original snapshot reset refused: confirmation token did not match");
            return Err(Error::ConfirmationRejected);
        }

        let mut recaptured = Vec::new();
        for target in TrackedFile::ALL {
            let source = self.tracked_path(target);
            if !source.is_file() {
                log::warn!("Not resetting original snapshot of {}: '{}' does not exist", target, source.display());
                continue;
            }
            let content = fs::read(source)?;
            replace_file(&self.snapshot_path(target, &SnapshotKind::Original), &content)?;
            recaptured.push(target);
        }

        log::warn!("Original snapshots reset for {} file(s)", recaptured.len());
        tracing::warn!(target: ANALYTICS_TARGET, LogDescription = "Original snapshots reset", ResetCount = recaptured.len());
        Ok(recaptured)
    }

    /// Every snapshot file recognised in the snapshot directory, sorted by file name.
    pub fn list_snapshots(&self) -> Result<Vec<BackupSnapshot>> {
        self.ensure_original_snapshot();

        let prefixes: Vec<(TrackedFile, String, Option<String>)> = TrackedFile::ALL
            .iter()
            .map(|t| {
                let (stem, ext) = self.stem_and_extension(*t);
                (*t, format!("{}_", stem), ext.map(|e| format!(".{}", e)))
            })
            .collect();

        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.snapshot_dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.starts_with('.') {
                log::debug!("Ignoring hidden file '{}' in snapshot directory", file_name);
                continue;
            }

            let matched = prefixes.iter().find_map(|(target, prefix, suffix)| {
                let rest = file_name.strip_prefix(prefix.as_str())?;
                let tag = match suffix {
                    Some(suffix) => rest.strip_suffix(suffix.as_str())?,
                    None => rest,
                };
                (!tag.is_empty()).then(|| (*target, SnapshotKind::from_tag(tag)))
            });
            let Some((target, kind)) = matched else {
                log::debug!("Ignoring unrecognised file '{}' in snapshot directory", file_name);
                continue;
            };

            let created_at = metadata.modified().map(DateTime::<Local>::from).unwrap_or_else(|_| Local::now());
            snapshots.push(BackupSnapshot { kind, target, path: entry.path(), size_bytes: metadata.len(), created_at });
        }

        snapshots.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(snapshots)
    }

    pub fn status(&self) -> BackupStatus {
        self.ensure_original_snapshot();

        let mut fixed_kinds: Vec<(TrackedFile, SnapshotKind)> = TrackedFile::ALL.iter().map(|t| (*t, SnapshotKind::Original)).collect();
        fixed_kinds.push((TrackedFile::Deployment, SnapshotKind::StageBoundary(BoundaryTag::AfterStage1)));
        fixed_kinds.push((TrackedFile::Artifact, SnapshotKind::StageBoundary(BoundaryTag::OptimizedReference)));

        let fixed_snapshots = fixed_kinds
            .into_iter()
            .map(|(target, kind)| {
                let path = self.snapshot_path(target, &kind);
                SnapshotPresence { exists: path.is_file(), target, kind, path }
            })
            .collect();

        let named_snapshots = match self.list_snapshots() {
            Ok(all) => all.iter().filter(|s| matches!(s.kind, SnapshotKind::Named(_))).count(),
            Err(e) => {
                log::warn!("Could not list snapshots in '{}': {}", self.snapshot_dir.display(), e);
                0
            }
        };

        BackupStatus { snapshot_dir: self.snapshot_dir.clone(), fixed_snapshots, named_snapshots }
    }
}

fn validate_snapshot_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.contains(['/', '\\']) || trimmed == "." || trimmed == ".." || RESERVED_TAGS.contains(&trimmed) {
        return Err(Error::InvalidSnapshotName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Copies `source` to `destination` only if `destination` does not exist yet.
/// `Ok(false)` means it already existed and was left alone.
fn write_once(source: &Path, destination: &Path) -> std::io::Result<bool> {
    write_bytes_once(destination, &fs::read(source)?)
}

fn write_bytes_once(destination: &Path, content: &[u8]) -> std::io::Result<bool> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(destination) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e),
    };

    if let Err(e) = file.write_all(content).and_then(|_| file.sync_all()) {
        drop(file);
        let _ = fs::remove_file(destination);
        return Err(e);
    }
    Ok(true)
}

/// Writes through a sibling temporary file and renames it over `destination`.
fn replace_file(destination: &Path, content: &[u8]) -> Result<()> {
    let parent = destination.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;

    let file_name = destination.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let temp = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    if let Err(e) = fs::write(&temp, content).and_then(|_| fs::rename(&temp, destination)) {
        let _ = fs::remove_file(&temp);
        return Err(e.into());
    }
    Ok(())
}
