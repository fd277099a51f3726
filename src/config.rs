use std::fmt;
use std::path::{Path, PathBuf};

use crate::api::config_dto::ConfigDto;
use crate::error::{Error, Result};
use crate::loader::parser::parse_json_file;
use crate::logger::LogSettings;

/// File names looked up in the workshop root when no `--config` is given.
const CONFIG_FILE_NAMES: [&str; 2] = ["workshop.json", ".workshop.json"];

/// Literal the instructor must type to overwrite the original snapshots.
pub const RESET_TOKEN: &str = "RESET";

/// Half-open range of start hours `[start_hour, end_hour)` considered low-impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowImpactWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl LowImpactWindow {
    pub fn new(start_hour: u32, end_hour: u32) -> Result<Self> {
        if start_hour >= end_hour || end_hour > 24 {
            return Err(Error::Config(format!("low-impact window [{}, {}) is empty or exceeds 24h", start_hour, end_hour)));
        }
        Ok(LowImpactWindow { start_hour, end_hour })
    }

    pub fn contains(&self, hour: u32) -> bool {
        self.start_hour <= hour && hour < self.end_hour
    }
}

impl Default for LowImpactWindow {
    fn default() -> Self {
        LowImpactWindow { start_hour: 2, end_hour: 6 }
    }
}

impl fmt::Display for LowImpactWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:00-{:02}:00", self.start_hour, self.end_hour)
    }
}

/// Literal substrings that identify the two reference implementations of the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSet {
    /// Individual-call idioms (one request per ticker).
    pub inefficient: Vec<String>,

    /// Bulk/batch idioms.
    pub efficient: Vec<String>,

    /// A line whose trimmed text starts with one of these is a comment and never counts.
    pub comment_prefixes: Vec<String>,
}

impl Default for MarkerSet {
    fn default() -> Self {
        MarkerSet {
            inefficient: vec!["for ticker in tickers:".to_string(), "api_client.get_equity_spot(ticker)".to_string()],
            efficient: vec!["api_client.get_bulk_market_data(".to_string(), "get_bulk_market_data(tickers)".to_string()],
            comment_prefixes: vec!["#".to_string(), "//".to_string()],
        }
    }
}

/// Everything the workshop engine needs to know about where things live and what to look for.
#[derive(Debug, Clone)]
pub struct WorkshopConfig {
    pub root: PathBuf,
    pub deployment_path: PathBuf,
    pub schedule_path: PathBuf,

    /// The source file learners optimize in checkpoint 2.
    pub artifact_path: PathBuf,
    pub snapshot_dir: PathBuf,

    /// Service learners must delete in checkpoint 1.
    pub removable_service: String,

    /// Service whose latency suffers from the unoptimized artifact.
    pub performance_service: String,
    pub low_impact_window: LowImpactWindow,
    pub markers: MarkerSet,
    pub logging: LogSettings,
}

impl WorkshopConfig {
    /// Built-in layout relative to `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        WorkshopConfig {
            deployment_path: root.join("configuration_files").join("deployment.yaml"),
            schedule_path: root.join("configuration_files").join("schedule.yaml"),
            artifact_path: root.join("get_market_data.py"),
            snapshot_dir: root.join("configuration_files").join(".workshop_reference"),
            removable_service: "fax-service".to_string(),
            performance_service: "market-data-service".to_string(),
            low_impact_window: LowImpactWindow::default(),
            markers: MarkerSet::default(),
            logging: LogSettings { log_dir: root.join(".workshop_logs"), level: "info".to_string() },
            root,
        }
    }

    /// Defaults, then the JSON config file, then `WORKSHOP_*` environment variables.
    ///
    /// An explicitly requested config file must parse; a discovered one that does not is
    /// logged and ignored.
    pub fn load(root: &Path, explicit_file: Option<&Path>) -> Result<Self> {
        let mut config = WorkshopConfig::with_root(root);

        match explicit_file {
            Some(file) => {
                let dto: ConfigDto = parse_json_file(file)?;
                config.apply_dto(dto)?;
            }
            None => {
                if let Some(file) = CONFIG_FILE_NAMES.iter().map(|name| root.join(name)).find(|p| p.is_file()) {
                    match parse_json_file::<ConfigDto>(&file) {
                        Ok(dto) => config.apply_dto(dto)?,
                        Err(e) => log::warn!("Ignoring config file '{}': {}", file.display(), e),
                    }
                }
            }
        }

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() { p.to_path_buf() } else { self.root.join(p) }
    }

    pub fn apply_dto(&mut self, dto: ConfigDto) -> Result<()> {
        if let Some(p) = dto.deployment_file {
            self.deployment_path = self.resolve(&p);
        }
        if let Some(p) = dto.schedule_file {
            self.schedule_path = self.resolve(&p);
        }
        if let Some(p) = dto.artifact_file {
            self.artifact_path = self.resolve(&p);
        }
        if let Some(p) = dto.snapshot_dir {
            self.snapshot_dir = self.resolve(&p);
        }
        if let Some(name) = dto.removable_service {
            self.removable_service = name;
        }
        if let Some(name) = dto.performance_service {
            self.performance_service = name;
        }
        if let Some(window) = dto.low_impact_window {
            self.low_impact_window = LowImpactWindow::new(window.start_hour, window.end_hour)?;
        }
        if let Some(markers) = dto.markers {
            if let Some(inefficient) = markers.inefficient {
                self.markers.inefficient = inefficient;
            }
            if let Some(efficient) = markers.efficient {
                self.markers.efficient = efficient;
            }
            if let Some(prefixes) = markers.comment_prefixes {
                self.markers.comment_prefixes = prefixes;
            }
        }
        if let Some(logging) = dto.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(dir) = logging.dir {
                self.logging.log_dir = self.resolve(&dir);
            }
        }
        Ok(())
    }

    /// Applies `WORKSHOP_*` overrides read through `lookup`. Unusable values are logged and skipped.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup("WORKSHOP_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(dir) = lookup("WORKSHOP_LOG_DIR") {
            self.logging.log_dir = self.resolve(&dir);
        }
        if let Some(name) = lookup("WORKSHOP_REMOVABLE_SERVICE").filter(|n| !n.trim().is_empty()) {
            self.removable_service = name;
        }
        if let Some(name) = lookup("WORKSHOP_PERFORMANCE_SERVICE").filter(|n| !n.trim().is_empty()) {
            self.performance_service = name;
        }

        let start = lookup("WORKSHOP_WINDOW_START");
        let end = lookup("WORKSHOP_WINDOW_END");
        if start.is_none() && end.is_none() {
            return;
        }

        let parse_hour = |var: &str, raw: Option<String>, current: u32| -> Option<u32> {
            match raw {
                None => Some(current),
                Some(v) => match v.trim().parse::<u32>() {
                    Ok(h) => Some(h),
                    Err(e) => {
                        log::warn!("Invalid value for {}: '{}' ({})", var, v, e);
                        None
                    }
                },
            }
        };

        let (Some(start_hour), Some(end_hour)) = (
            parse_hour("WORKSHOP_WINDOW_START", start, self.low_impact_window.start_hour),
            parse_hour("WORKSHOP_WINDOW_END", end, self.low_impact_window.end_hour),
        ) else {
            return;
        };

        match LowImpactWindow::new(start_hour, end_hour) {
            Ok(window) => self.low_impact_window = window,
            Err(e) => log::warn!("Ignoring window override: {}", e),
        }
    }
}
