//! Infers learner progress from the files on disk.
//!
//! Nothing here is persisted: every call re-reads the deployment descriptor, the
//! optimizable artifact and the schedule. Stage `N` is only tested once stage `N - 1`
//! passed, so a later test never runs against a state the learner has not reached.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::WorkshopConfig;
use crate::domain::analyzer::{CodeAnalysis, CodeStateAnalyzer};
use crate::domain::deployment::{DeployedService, DeploymentDiff, read_services, read_services_outcome};
use crate::domain::metrics::{MetricsProvider, Timeframe};
use crate::domain::schedule::{ConflictPair, ScheduledJob, find_conflicts, jobs_outside_window, read_schedule_jobs};
use crate::error::Error;

/// `tracing` target for progress analytics events.
pub const ANALYTICS_TARGET: &str = "workshop::progress";

/// Low-utilization alerts fire below this CPU share.
const IDLE_CPU_THRESHOLD: f64 = 5.0;

/// P95 latency above which a service is degraded.
const P95_WARNING_MS: f64 = 5_000.0;

/// P95 latency above which a service is critical.
const P95_CRITICAL_MS: f64 = 10_000.0;

/// Severity of a P95 reading. `Info` means healthy.
pub fn latency_level(p95_latency_ms: f64) -> AlertLevel {
    if p95_latency_ms > P95_CRITICAL_MS {
        AlertLevel::Critical
    } else if p95_latency_ms > P95_WARNING_MS {
        AlertLevel::Warning
    } else {
        AlertLevel::Info
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Checkpoint {
    One,
    Two,
    Three,
}

impl Checkpoint {
    pub const ALL: [Checkpoint; 3] = [Checkpoint::One, Checkpoint::Two, Checkpoint::Three];

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Checkpoint::One),
            2 => Some(Checkpoint::Two),
            3 => Some(Checkpoint::Three),
            _ => None,
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            Checkpoint::One => 1,
            Checkpoint::Two => 2,
            Checkpoint::Three => 3,
        }
    }

    pub fn previous(&self) -> Option<Checkpoint> {
        match self {
            Checkpoint::One => None,
            Checkpoint::Two => Some(Checkpoint::One),
            Checkpoint::Three => Some(Checkpoint::Two),
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Checkpoint::One => "Remove the unused service",
            Checkpoint::Two => "Optimize the market data fetch",
            Checkpoint::Three => "Reschedule batch jobs into the low-impact window",
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checkpoint {}", self.number())
    }
}

/// Completion vector. A later flag is never true while an earlier one is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CheckpointState {
    pub checkpoint1: bool,
    pub checkpoint2: bool,
    pub checkpoint3: bool,
}

impl CheckpointState {
    pub fn is_complete(&self, checkpoint: Checkpoint) -> bool {
        match checkpoint {
            Checkpoint::One => self.checkpoint1,
            Checkpoint::Two => self.checkpoint2,
            Checkpoint::Three => self.checkpoint3,
        }
    }

    pub fn next_incomplete(&self) -> Option<Checkpoint> {
        Checkpoint::ALL.into_iter().find(|cp| !self.is_complete(*cp))
    }

    pub fn all_complete(&self) -> bool {
        self.next_incomplete().is_none()
    }

    pub fn as_tuple(&self) -> (bool, bool, bool) {
        (self.checkpoint1, self.checkpoint2, self.checkpoint3)
    }
}

/// Everything stage 3 looks at, kept so callers can explain a failure.
#[derive(Debug, Clone, Default)]
pub struct ScheduleAssessment {
    pub jobs: Vec<ScheduledJob>,
    pub conflicts: Vec<ConflictPair>,

    /// Names of jobs starting outside the low-impact window.
    pub outside_window: Vec<String>,

    /// Why the schedule could not be read completely, if it could not.
    pub problem: Option<String>,
}

impl ScheduleAssessment {
    /// An empty or partially read schedule never completes the stage.
    pub fn is_complete(&self) -> bool {
        self.problem.is_none() && !self.jobs.is_empty() && self.conflicts.is_empty() && self.outside_window.is_empty()
    }
}

/// The first unmet completion test.
#[derive(Debug, Clone)]
pub enum Blocker {
    ServiceStillDeployed { service: String },
    ArtifactNotOptimized { path: PathBuf, analysis: Option<CodeAnalysis> },
    ScheduleNotReady(ScheduleAssessment),
}

impl Blocker {
    pub fn checkpoint(&self) -> Checkpoint {
        match self {
            Blocker::ServiceStillDeployed { .. } => Checkpoint::One,
            Blocker::ArtifactNotOptimized { .. } => Checkpoint::Two,
            Blocker::ScheduleNotReady(_) => Checkpoint::Three,
        }
    }

    /// One line per unmet condition.
    pub fn describe(&self) -> Vec<String> {
        match self {
            Blocker::ServiceStillDeployed { service } => vec![format!("'{}' is still declared in the deployment descriptor", service)],
            Blocker::ArtifactNotOptimized { path, analysis: None } => vec![format!("'{}' could not be read", path.display())],
            Blocker::ArtifactNotOptimized { path, analysis: Some(analysis) } => vec![format!(
                "'{}' still fetches tickers one at a time ({} individual-call pattern(s), no bulk call)",
                path.display(),
                analysis.inefficient_active
            )],
            Blocker::ScheduleNotReady(assessment) => {
                let mut lines = Vec::new();
                if let Some(problem) = &assessment.problem {
                    lines.push(format!("schedule {}", problem));
                }
                if assessment.problem.is_none() && assessment.jobs.is_empty() {
                    lines.push("schedule declares no jobs".to_string());
                }
                for pair in &assessment.conflicts {
                    lines.push(format!("jobs overlap: {}", pair));
                }
                for name in &assessment.outside_window {
                    lines.push(format!("'{}' starts outside the low-impact window", name));
                }
                lines
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressionReport {
    pub state: CheckpointState,
    pub blocker: Option<Blocker>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertLevel::Info => write!(f, "INFO"),
            AlertLevel::Warning => write!(f, "WARNING"),
            AlertLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub service_name: String,
    pub level: AlertLevel,
    pub message: String,
    pub metric_name: &'static str,
    pub current_value: f64,
    pub threshold: f64,
}

/// The stage-3 hint. Rendered as free text rather than as an [`Alert`].
#[derive(Debug, Clone)]
pub struct SustainabilityNotice {
    pub conflicts: Vec<ConflictPair>,
    pub outside_window: Vec<String>,
    pub window: String,

    /// Why the schedule could not be read completely, if it could not.
    pub problem: Option<String>,
}

/// Views that stay locked until earlier checkpoints are done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dashboard {
    Status,
    Latency,
    Carbon,
    Scheduler,
}

impl Dashboard {
    pub fn required(&self) -> &'static [Checkpoint] {
        match self {
            Dashboard::Status => &[],
            Dashboard::Latency => &[Checkpoint::One],
            Dashboard::Carbon => &[Checkpoint::One],
            Dashboard::Scheduler => &[Checkpoint::One, Checkpoint::Two],
        }
    }

    /// Required checkpoints that are not complete yet. Empty means unlocked.
    pub fn missing(&self, state: &CheckpointState) -> Vec<Checkpoint> {
        self.required().iter().copied().filter(|cp| !state.is_complete(*cp)).collect()
    }
}

/// Result of `validate --checkpoint N`.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub checkpoint: Checkpoint,
    pub passed: bool,
    pub messages: Vec<String>,
}

pub struct CheckpointProgressionEngine<'a> {
    config: &'a WorkshopConfig,
    analyzer: CodeStateAnalyzer,
}

impl<'a> CheckpointProgressionEngine<'a> {
    pub fn new(config: &'a WorkshopConfig) -> Self {
        CheckpointProgressionEngine { config, analyzer: CodeStateAnalyzer::new(config.markers.clone()) }
    }

    pub fn current_services(&self) -> Vec<DeployedService> {
        read_services(&self.config.deployment_path)
    }

    pub fn is_artifact_optimized(&self) -> bool {
        self.analyzer.is_artifact_optimized(&self.config.artifact_path)
    }

    fn check_stage1(&self) -> Option<Blocker> {
        let service = &self.config.removable_service;
        if self.current_services().iter().any(|s| &s.name == service) { Some(Blocker::ServiceStillDeployed { service: service.clone() }) } else { None }
    }

    fn check_stage2(&self) -> Option<Blocker> {
        let path = &self.config.artifact_path;
        match self.analyzer.analyze_file(path) {
            Ok(analysis) if analysis.is_optimized() => None,
            Ok(analysis) => Some(Blocker::ArtifactNotOptimized { path: path.clone(), analysis: Some(analysis) }),
            Err(e) => {
                log::warn!("{}; treating it as not optimized", e);
                Some(Blocker::ArtifactNotOptimized { path: path.clone(), analysis: None })
            }
        }
    }

    /// Reads the schedule and checks it against the low-impact window.
    pub fn assess_schedule(&self) -> ScheduleAssessment {
        let read = read_schedule_jobs(&self.config.schedule_path);
        let problem = read.problem();
        let jobs = read.into_items();

        let conflicts = find_conflicts(&jobs);
        let outside_window = jobs_outside_window(&jobs, &self.config.low_impact_window).into_iter().map(|j| j.name.clone()).collect();

        ScheduleAssessment { jobs, conflicts, outside_window, problem }
    }

    fn check_stage3(&self) -> Option<Blocker> {
        let assessment = self.assess_schedule();
        if assessment.is_complete() { None } else { Some(Blocker::ScheduleNotReady(assessment)) }
    }

    /// Runs the stage tests in order and stops at the first failure.
    pub fn evaluate(&self) -> ProgressionReport {
        let mut state = CheckpointState::default();

        let blocker = 'stages: {
            if let Some(b) = self.check_stage1() {
                break 'stages Some(b);
            }
            state.checkpoint1 = true;

            if let Some(b) = self.check_stage2() {
                break 'stages Some(b);
            }
            state.checkpoint2 = true;

            if let Some(b) = self.check_stage3() {
                break 'stages Some(b);
            }
            state.checkpoint3 = true;
            None
        };

        tracing::info!(
            target: ANALYTICS_TARGET,
            LogDescription = "Checkpoint state computed",
            Checkpoint1 = state.checkpoint1,
            Checkpoint2 = state.checkpoint2,
            Checkpoint3 = state.checkpoint3,
            BlockedAt = blocker.as_ref().map(|b| b.checkpoint().number()).unwrap_or(0),
        );

        ProgressionReport { state, blocker }
    }

    pub fn compute_state(&self) -> CheckpointState {
        self.evaluate().state
    }

    /// At most one alert: the hint for the next actionable checkpoint.
    pub fn alerts_for(&self, state: &CheckpointState, current_services: &[DeployedService], metrics: &dyn MetricsProvider) -> Vec<Alert> {
        if !state.checkpoint1 {
            let service = &self.config.removable_service;
            let history = metrics.history_for(service, Timeframe::Days30);
            let cpu = history.average_cpu();
            let hosts = current_services.iter().find(|s| &s.name == service).map(|s| s.assigned_machines.join(", ")).unwrap_or_default();

            let mut message = format!(
                "{} has averaged {:.1}% CPU and {} requests over the last {} days. Low utilization: is this service still needed?",
                service,
                cpu,
                history.total_requests(),
                history.timeframe.days()
            );
            if !hosts.is_empty() {
                message.push_str(&format!(" Running on: {}.", hosts));
            }
            message.push_str(&format!(" Run `workshop historical {}` for details.", service));

            return vec![Alert { service_name: service.clone(), level: AlertLevel::Warning, message, metric_name: "cpu_percent", current_value: cpu, threshold: IDLE_CPU_THRESHOLD }];
        }

        if !state.checkpoint2 {
            let service = &self.config.performance_service;
            let p95 = metrics.metrics_for(service).p95_latency_ms;
            let artifact = self.config.artifact_path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| self.config.artifact_path.display().to_string());

            let level = match latency_level(p95) {
                AlertLevel::Info => AlertLevel::Warning,
                degraded => degraded,
            };

            return vec![Alert {
                service_name: service.clone(),
                level,
                message: format!("{} P95 latency is {:.0} ms. Review the API usage in {}.", service, p95, artifact),
                metric_name: "p95_latency_ms",
                current_value: p95,
                threshold: P95_CRITICAL_MS,
            }];
        }

        Vec::new()
    }

    /// The stage-3 hint, shown only once checkpoints 1 and 2 are done and 3 is not.
    pub fn sustainability_notice(&self, state: &CheckpointState) -> Option<SustainabilityNotice> {
        if !(state.checkpoint1 && state.checkpoint2) || state.checkpoint3 {
            return None;
        }

        let assessment = self.assess_schedule();
        Some(SustainabilityNotice {
            conflicts: assessment.conflicts,
            outside_window: assessment.outside_window,
            window: self.config.low_impact_window.to_string(),
            problem: assessment.problem,
        })
    }

    /// Validates one checkpoint, including that every earlier one is complete.
    ///
    /// For checkpoint 1, when `original_deployment` is given, the current deployment must
    /// differ from it by exactly the removal of the removable service.
    pub fn validate(&self, checkpoint: Checkpoint, original_deployment: Option<&Path>) -> ValidationOutcome {
        let report = self.evaluate();
        let mut messages = Vec::new();

        let prerequisite_missing = checkpoint.previous().filter(|prev| !report.state.is_complete(*prev));
        let mut passed = match prerequisite_missing {
            Some(prev) => {
                messages.push(format!("{} must be completed first ({})", prev, prev.title()));
                if let Some(blocker) = &report.blocker {
                    messages.extend(blocker.describe());
                }
                false
            }
            None => match &report.blocker {
                Some(blocker) if blocker.checkpoint() == checkpoint => {
                    messages.extend(blocker.describe());
                    false
                }
                _ => true,
            },
        };

        if passed && checkpoint == Checkpoint::One {
            if let Some(original) = original_deployment {
                let reference = read_services_outcome(original);
                if reference.is_degraded() {
                    let e = Error::UnparseableDescriptor { path: original.to_path_buf(), reason: reference.problem().unwrap_or_default() };
                    log::warn!("Skipping strict deployment check: {}", e);
                } else {
                    let diff = DeploymentDiff::between(reference.items(), &self.current_services());
                    let problems = diff.violations_for_single_removal(&self.config.removable_service);
                    if !problems.is_empty() {
                        passed = false;
                        messages.extend(problems);
                    }
                }
            }
        }

        tracing::info!(target: ANALYTICS_TARGET, LogDescription = "Checkpoint validated", Checkpoint = checkpoint.number(), Passed = passed);

        ValidationOutcome { checkpoint, passed, messages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_incomplete() {
        let state = CheckpointState { checkpoint1: true, checkpoint2: false, checkpoint3: false };
        assert_eq!(state.next_incomplete(), Some(Checkpoint::Two));
        assert!(!state.all_complete());
        assert!(CheckpointState { checkpoint1: true, checkpoint2: true, checkpoint3: true }.all_complete());
    }

    #[test]
    fn test_dashboard_gating() {
        let fresh = CheckpointState::default();
        assert!(Dashboard::Status.missing(&fresh).is_empty());
        assert_eq!(Dashboard::Latency.missing(&fresh), vec![Checkpoint::One]);
        assert_eq!(Dashboard::Carbon.missing(&fresh), vec![Checkpoint::One]);
        assert_eq!(Dashboard::Scheduler.missing(&fresh), vec![Checkpoint::One, Checkpoint::Two]);

        let first_done = CheckpointState { checkpoint1: true, ..Default::default() };
        assert!(Dashboard::Carbon.missing(&first_done).is_empty());
        assert_eq!(Dashboard::Scheduler.missing(&first_done), vec![Checkpoint::Two]);
    }

    #[test]
    fn test_empty_schedule_is_not_complete() {
        assert!(!ScheduleAssessment::default().is_complete());
        let degraded = ScheduleAssessment { problem: Some("unreadable".to_string()), ..Default::default() };
        assert!(!degraded.is_complete());
    }

    #[test]
    fn test_latency_levels() {
        assert_eq!(latency_level(120.0), AlertLevel::Info);
        assert_eq!(latency_level(5_000.0), AlertLevel::Info);
        assert_eq!(latency_level(7_500.0), AlertLevel::Warning);
        assert_eq!(latency_level(20_500.0), AlertLevel::Critical);
    }

    #[test]
    fn test_checkpoint_numbers() {
        assert_eq!(Checkpoint::from_number(3), Some(Checkpoint::Three));
        assert_eq!(Checkpoint::from_number(4), None);
        assert_eq!(Checkpoint::Two.previous(), Some(Checkpoint::One));
        assert_eq!(Checkpoint::Three.to_string(), "Checkpoint 3");
    }
}
