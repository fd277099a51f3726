//! Terminal rendering. Every function returns the text so `main` decides where it goes.

use std::fmt::Write;

use colored::Colorize;

use crate::domain::backup::{BackupSnapshot, BackupStatus, StageBoundary};
use crate::domain::carbon::{CarbonLevel, HourlyIntensity, SciRow, carbon_impact_score};
use crate::domain::deployment::{DeployedService, MachineDescriptor};
use crate::domain::metrics::{ServiceHistory, ServiceMetrics};
use crate::domain::progression::{Alert, AlertLevel, Checkpoint, CheckpointState, Dashboard, ScheduleAssessment, SustainabilityNotice, ValidationOutcome, latency_level};
use crate::domain::schedule::ScheduledJob;

fn check_mark(done: bool) -> String {
    if done { "✔".green().to_string() } else { "✘".red().to_string() }
}

pub fn render_checkpoints(state: &CheckpointState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "Workshop progress".bold());
    for checkpoint in Checkpoint::ALL {
        let _ = writeln!(out, "  {} {}: {}", check_mark(state.is_complete(checkpoint)), checkpoint, checkpoint.title());
    }
    if state.all_complete() {
        let _ = writeln!(out, "\n{} All checkpoints complete.", "Success:".green());
    }
    out
}

pub fn render_cluster(services: &[DeployedService], machines: &[MachineDescriptor]) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}", "Machines".bold());
    if machines.is_empty() {
        let _ = writeln!(out, "  (none declared)");
    }
    for machine in machines {
        let (cores, memory) = machine.size_class.resources();
        let _ = writeln!(out, "  {:<12} {:<8} {:>2} cores {:>3} GB", machine.hostname, machine.size_class, cores, memory);
    }

    let _ = writeln!(out, "\n{}", "Services".bold());
    if services.is_empty() {
        let _ = writeln!(out, "  (none declared)");
    }
    for service in services {
        let _ = writeln!(out, "  {:<24} {:<8} [{}]", service.name, service.version, service.assigned_machines.join(", "));
    }
    out
}

pub fn render_alerts(alerts: &[Alert]) -> String {
    let mut out = String::new();
    for alert in alerts {
        let level = match alert.level {
            AlertLevel::Info => alert.level.to_string().blue(),
            AlertLevel::Warning => alert.level.to_string().yellow(),
            AlertLevel::Critical => alert.level.to_string().red(),
        };
        let _ = writeln!(out, "{} [{}] {}", level.bold(), alert.service_name, alert.message);
        let _ = writeln!(out, "    {} = {:.1} (threshold {:.1})", alert.metric_name, alert.current_value, alert.threshold);
    }
    out
}

pub fn render_sustainability_notice(notice: &SustainabilityNotice) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} Batch jobs are competing for resources in high-carbon hours.", "Sustainability:".cyan().bold());
    if let Some(problem) = &notice.problem {
        let _ = writeln!(out, "    {} schedule {}", "Warning:".yellow(), problem);
    }
    for pair in &notice.conflicts {
        let _ = writeln!(out, "    overlapping: {}", pair);
    }
    for name in &notice.outside_window {
        let _ = writeln!(out, "    outside {}: {}", notice.window, name);
    }
    let _ = writeln!(out, "    Run `workshop scheduler` to inspect the schedule.");
    out
}

pub fn render_validation(outcome: &ValidationOutcome) -> String {
    let mut out = String::new();
    if outcome.passed {
        let _ = writeln!(out, "{} {} passed: {}", "Success:".green(), outcome.checkpoint, outcome.checkpoint.title());
    } else {
        let _ = writeln!(out, "{} {} not complete: {}", "Failed:".red(), outcome.checkpoint, outcome.checkpoint.title());
    }
    for message in &outcome.messages {
        let _ = writeln!(out, "  - {}", message);
    }
    out
}

pub fn render_locked(dashboard: Dashboard, missing: &[Checkpoint]) -> String {
    let names: Vec<String> = missing.iter().map(|cp| cp.to_string()).collect();
    format!("{} The {:?} dashboard unlocks after {}.\n", "Locked:".yellow(), dashboard, names.join(" and "))
}

pub fn render_schedule(assessment: &ScheduleAssessment, window: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "Batch schedule".bold());
    if let Some(problem) = &assessment.problem {
        let _ = writeln!(out, "  {} {}", "Warning:".yellow(), problem);
    }

    for job in &assessment.jobs {
        let name = if assessment.conflicts.iter().any(|c| c.involves(&job.name)) { job.name.red().to_string() } else { job.name.clone() };
        let in_window = !assessment.outside_window.contains(&job.name);
        let _ = writeln!(out, "  {:<28} {} - {} ({}) {}", name, job.start_time, job.end_time(), job.duration, check_mark(in_window));
    }

    let _ = writeln!(out);
    if assessment.conflicts.is_empty() {
        let _ = writeln!(out, "  No overlapping jobs.");
    } else {
        let _ = writeln!(out, "  {} overlapping pair(s):", assessment.conflicts.len());
        for pair in &assessment.conflicts {
            let _ = writeln!(out, "    {}", pair);
        }
    }
    let _ = writeln!(out, "  Low-impact window: {} ({} job(s) outside)", window, assessment.outside_window.len());
    out
}

pub fn render_carbon(profile: &[HourlyIntensity], jobs: &[ScheduledJob]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "Grid carbon intensity (24h)".bold());
    for hour in profile {
        let level = match hour.level {
            CarbonLevel::Low => hour.level.to_string().green(),
            CarbonLevel::Medium => hour.level.to_string().yellow(),
            CarbonLevel::High => hour.level.to_string().red(),
        };
        let starting: Vec<&str> = jobs.iter().filter(|j| j.start_time.hour() == hour.hour).map(|j| j.name.as_str()).collect();
        let _ = writeln!(
            out,
            "  {:02}:00 {:<6} {:>3} gCO2/kWh {:>3.0}% renewable  {}",
            hour.hour,
            level,
            hour.grams_co2_per_kwh,
            hour.renewable_share * 100.0,
            starting.join(", ")
        );
    }

    let (score, worst) = carbon_impact_score(jobs);
    let _ = writeln!(out, "\n  Carbon impact score: {:.1} / {:.1}", score, worst);
    out
}

pub fn render_latency(readings: &[(String, ServiceMetrics)], performance_service: &str, artifact: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "Service response times".bold());
    let _ = writeln!(out, "  {:<28} {:>10} {:>10} {:>10}  Status", "Service", "P50 (ms)", "P95 (ms)", "P99 (ms)");

    let mut critical = Vec::new();
    for (name, metrics) in readings {
        let level = latency_level(metrics.p95_latency_ms);
        let status = match level {
            AlertLevel::Info => "HEALTHY".green(),
            AlertLevel::Warning => "WARNING".yellow(),
            AlertLevel::Critical => "CRITICAL".red(),
        };
        let _ = writeln!(out, "  {:<28} {:>10.0} {:>10.0} {:>10.0}  {}", name, metrics.p50_latency_ms, metrics.p95_latency_ms, metrics.p99_latency_ms, status);
        if level == AlertLevel::Critical {
            critical.push((name, metrics));
        }
    }

    for (name, metrics) in critical {
        let _ = writeln!(out, "\n{} {}", "Critical latency:".red().bold(), name);
        let _ = writeln!(out, "    P95 {:.1} s, queue depth {} request(s)", metrics.p95_latency_ms / 1_000.0, metrics.queue_depth);
        if name == performance_service {
            let _ = writeln!(out, "    Check {} for one API call per ticker; a bulk request replaces them all.", artifact);
        }
    }
    out
}

pub fn render_software_carbon(rows: &[SciRow], state: &CheckpointState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "Software carbon intensity".bold());
    let _ = writeln!(out, "  {:<12} {:>12} {:>18} {:>16} {:>12}", "Checkpoint", "Energy kWh", "Grid gCO2e/kWh", "Embodied gCO2e", "SCI");

    let mut previous: Option<&SciRow> = None;
    for row in rows {
        let label = row.checkpoint.map(|cp| cp.number().to_string()).unwrap_or_else(|| "Baseline".to_string());
        let highlight = |text: String, changed: bool| if changed { text.blue().to_string() } else { text };
        let changed = |f: fn(&SciRow) -> f64| previous.is_some_and(|p| f(p) != f(row));

        let _ = writeln!(
            out,
            "  {:<12} {} {} {} {:>12.1}",
            label,
            highlight(format!("{:>12.2}", row.energy_kwh), changed(|r| r.energy_kwh)),
            highlight(format!("{:>18.1}", row.grid_g_per_kwh), changed(|r| r.grid_g_per_kwh)),
            highlight(format!("{:>16.3}", row.embodied_g), changed(|r| r.embodied_g)),
            row.sci()
        );
        previous = Some(row);
    }

    let _ = writeln!(out);
    match state.next_incomplete() {
        Some(next) => {
            let _ = writeln!(out, "  Next: {} ({})", next, next.title());
        }
        None => {
            let _ = writeln!(out, "  {} All checkpoints complete.", "Success:".green());
        }
    }
    out
}

pub fn render_history(history: &ServiceHistory) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {} ({})", "Historical analytics:".bold(), history.service_name, history.timeframe);
    let _ = writeln!(out, "  Total requests: {}", history.total_requests());
    let _ = writeln!(out, "  Daily average:  {:.1}", history.daily_average_requests());
    if let Some((cpu, memory)) = history.recent_average(7) {
        let _ = writeln!(out, "  Last 7 days:    {:.1}% CPU, {:.1}% memory", cpu, memory);
    }

    if history.total_requests() == 0 {
        let _ = writeln!(out, "  {} no requests over {} days; the service looks unused.", "Warning:".yellow(), history.timeframe.days());
    } else {
        let _ = writeln!(out, "  Utilization looks appropriate.");
    }
    out
}

pub fn render_snapshot_list(snapshots: &[BackupSnapshot]) -> String {
    if snapshots.is_empty() {
        return "No snapshots found.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "{}", "Available snapshots:".bold());
    for snapshot in snapshots {
        let name = snapshot.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let _ = writeln!(
            out,
            "  • {} ({}, {} bytes, modified: {})",
            name,
            snapshot.kind,
            snapshot.size_bytes,
            snapshot.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    out
}

pub fn render_backup_status(status: &BackupStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", "Snapshot directory:".bold(), status.snapshot_dir.display());
    for snapshot in &status.fixed_snapshots {
        let _ = writeln!(out, "  {} {} ({})", check_mark(snapshot.exists), snapshot.target, snapshot.kind);
    }
    let _ = writeln!(out, "  Named checkpoints: {}", status.named_snapshots);
    out
}

pub fn render_restored(what: &str) -> String {
    format!("{} Restored {}.\n", "Success:".green(), what)
}

pub fn boundary_description(boundary: StageBoundary) -> &'static str {
    match boundary {
        StageBoundary::Stage2Start => "the start of checkpoint 2",
        StageBoundary::Stage3Start => "the start of checkpoint 3",
    }
}
