use std::fs;
use std::path::Path;

use tempfile::TempDir;

use trading_workshop::config::WorkshopConfig;
use trading_workshop::domain::deployment::read_services;
use trading_workshop::domain::metrics::{DailyUsage, MetricsProvider, ServiceHistory, ServiceMetrics, Timeframe};
use trading_workshop::domain::progression::{AlertLevel, Blocker, Checkpoint, CheckpointProgressionEngine, CheckpointState};

const DEPLOYMENT: &str = r#"metadata:
  name: "trading-services-cluster"
  version: "1.0.0"

cluster:
  region: eu-west-1

machines:
  - hostname: node1
    size: small
  - hostname: node2
    size: large
  - hostname: node3
    size: medium

services:
  - name: "order-service"
    version: "3.2.0"
    description: "Order routing"
    deployment:
      machines: ["node1"]
  - name: "fax-service"
    version: "2.1.3"
    description: "Legacy fax gateway"
    deployment:
      machines: ["node2"]
  - name: "market-data-service"
    version: "1.8.0"
    description: "Market data fan-out"
    deployment:
      machines: ["node3"]

monitoring:
  enabled: true
"#;

const UNOPTIMIZED: &str = r#"def get_market_data(api_client, tickers):
    results = {}
    for ticker in tickers:
        results[ticker] = api_client.get_equity_spot(ticker)
    return results
"#;

const OPTIMIZED: &str = r#"def get_market_data(api_client, tickers):
    # for ticker in tickers:
    #     results[ticker] = api_client.get_equity_spot(ticker)
    return api_client.get_bulk_market_data(tickers)
"#;

fn evening_schedule() -> String {
    let mut text = String::from("jobs:\n");
    for i in 1..=5 {
        text.push_str(&format!("  - name: batch-{}\n    start_time: \"18:00\"\n    duration_hours: 2\n", i));
    }
    text
}

fn night_schedule() -> String {
    let slots = [("02:00", 0.75), ("02:45", 0.75), ("03:30", 0.5), ("04:00", 1.0), ("05:00", 1.0)];
    let mut text = String::from("jobs:\n");
    for (i, (start, hours)) in slots.iter().enumerate() {
        text.push_str(&format!("  - name: batch-{}\n    start_time: \"{}\"\n    duration_hours: {}\n", i + 1, start, hours));
    }
    text
}

struct Workshop {
    dir: TempDir,
    config: WorkshopConfig,
}

impl Workshop {
    fn new(deployment: &str, artifact: &str, schedule: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let config = WorkshopConfig::with_root(dir.path());
        fs::create_dir_all(dir.path().join("configuration_files")).unwrap();
        fs::write(&config.deployment_path, deployment).unwrap();
        fs::write(&config.artifact_path, artifact).unwrap();
        fs::write(&config.schedule_path, schedule).unwrap();
        Workshop { dir, config }
    }

    fn engine(&self) -> CheckpointProgressionEngine<'_> {
        CheckpointProgressionEngine::new(&self.config)
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }
}

fn without_fax(deployment: &str) -> String {
    let start = deployment.find("  - name: \"fax-service\"").unwrap();
    let end = deployment.find("  - name: \"market-data-service\"").unwrap();
    format!("{}{}", &deployment[..start], &deployment[end..])
}

struct FixedMetrics;

impl MetricsProvider for FixedMetrics {
    fn metrics_for(&self, service_name: &str) -> ServiceMetrics {
        match service_name {
            "fax-service" => ServiceMetrics { cpu_percent: 1.2, p50_latency_ms: 20.0, p95_latency_ms: 40.0, p99_latency_ms: 55.0, queue_depth: 0 },
            _ => ServiceMetrics { cpu_percent: 92.0, p50_latency_ms: 9_000.0, p95_latency_ms: 20_500.0, p99_latency_ms: 26_000.0, queue_depth: 300 },
        }
    }

    fn history_for(&self, service_name: &str, timeframe: Timeframe) -> ServiceHistory {
        let date = chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let day = DailyUsage { date, requests: 0, cpu_avg: 1.2, memory_avg: 3.0 };
        ServiceHistory { service_name: service_name.to_string(), timeframe, days: vec![day; timeframe.days() as usize] }
    }
}

#[test]
fn test_removable_service_present_blocks_everything() {
    let workshop = Workshop::new(DEPLOYMENT, OPTIMIZED, &night_schedule());
    let engine = workshop.engine();

    assert_eq!(engine.compute_state().as_tuple(), (false, false, false));

    let report = engine.evaluate();
    assert!(matches!(report.blocker, Some(Blocker::ServiceStillDeployed { ref service }) if service == "fax-service"));

    let alerts = engine.alerts_for(&report.state, &engine.current_services(), &FixedMetrics);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].service_name, "fax-service");
    assert_eq!(alerts[0].level, AlertLevel::Warning);
    assert_eq!(alerts[0].current_value, 1.2);
    assert!(alerts[0].message.contains("node2"));
    assert!(alerts[0].message.contains("over the last 30 days"));
    assert!(alerts[0].message.contains("workshop historical fax-service"));
    assert!(engine.sustainability_notice(&report.state).is_none());
}

#[test]
fn test_removal_unlocks_performance_alert() {
    let workshop = Workshop::new(&without_fax(DEPLOYMENT), UNOPTIMIZED, &evening_schedule());
    let engine = workshop.engine();

    let state = engine.compute_state();
    assert_eq!(state.as_tuple(), (true, false, false));

    let alerts = engine.alerts_for(&state, &engine.current_services(), &FixedMetrics);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].service_name, "market-data-service");
    assert_eq!(alerts[0].metric_name, "p95_latency_ms");
    assert_eq!(alerts[0].level, AlertLevel::Critical);
    assert_eq!(alerts[0].current_value, 20_500.0);
    assert!(alerts[0].message.contains("get_market_data.py"));
}

#[test]
fn test_evening_schedule_blocks_stage_three() {
    let workshop = Workshop::new(&without_fax(DEPLOYMENT), OPTIMIZED, &evening_schedule());
    let engine = workshop.engine();

    let state = engine.compute_state();
    assert_eq!(state.as_tuple(), (true, true, false));
    assert!(engine.alerts_for(&state, &engine.current_services(), &FixedMetrics).is_empty());

    let notice = engine.sustainability_notice(&state).expect("stage 3 hint");
    assert_eq!(notice.conflicts.len(), 10);
    assert_eq!(notice.outside_window.len(), 5);
    assert_eq!(notice.window, "02:00-06:00");
    assert!(notice.problem.is_none());
}

#[test]
fn test_notice_on_degraded_schedule() {
    let partial = format!("{}  - name: broken\n    start_time: \"25:00\"\n", evening_schedule());
    let workshop = Workshop::new(&without_fax(DEPLOYMENT), OPTIMIZED, &partial);
    let engine = workshop.engine();

    let state = engine.compute_state();
    assert_eq!(state.as_tuple(), (true, true, false));
    let notice = engine.sustainability_notice(&state).expect("stage 3 hint");
    assert_eq!(notice.conflicts.len(), 10);
    assert!(notice.problem.as_deref().is_some_and(|p| p.contains("broken")));

    fs::write(&workshop.config.schedule_path, "jobs:\n  - name: [unterminated\n").unwrap();
    let notice = engine.sustainability_notice(&engine.compute_state()).expect("stage 3 hint");
    assert!(notice.conflicts.is_empty());
    assert!(notice.outside_window.is_empty());
    assert!(notice.problem.as_deref().is_some_and(|p| p.contains("could not read")));
}

#[test]
fn test_night_schedule_completes_workshop() {
    let workshop = Workshop::new(&without_fax(DEPLOYMENT), OPTIMIZED, &night_schedule());
    let engine = workshop.engine();

    let state = engine.compute_state();
    assert_eq!(state, CheckpointState { checkpoint1: true, checkpoint2: true, checkpoint3: true });
    assert!(engine.alerts_for(&state, &engine.current_services(), &FixedMetrics).is_empty());
    assert!(engine.sustainability_notice(&state).is_none());
    assert!(engine.evaluate().blocker.is_none());
}

#[test]
fn test_empty_schedule_does_not_complete_stage_three() {
    let workshop = Workshop::new(&without_fax(DEPLOYMENT), OPTIMIZED, "jobs:\n");
    assert_eq!(workshop.engine().compute_state().as_tuple(), (true, true, false));
}

#[test]
fn test_missing_artifact_is_not_optimized() {
    let workshop = Workshop::new(&without_fax(DEPLOYMENT), OPTIMIZED, &night_schedule());
    fs::remove_file(&workshop.config.artifact_path).unwrap();

    let report = workshop.engine().evaluate();
    assert_eq!(report.state.as_tuple(), (true, false, false));
    assert!(matches!(report.blocker, Some(Blocker::ArtifactNotOptimized { analysis: None, .. })));
}

#[test]
fn test_state_follows_edits_without_caching() {
    let workshop = Workshop::new(DEPLOYMENT, OPTIMIZED, &night_schedule());
    let engine = workshop.engine();
    assert!(!engine.compute_state().checkpoint1);

    fs::write(&workshop.config.deployment_path, without_fax(DEPLOYMENT)).unwrap();
    assert!(engine.compute_state().all_complete());
}

#[test]
fn test_validate_requires_previous_checkpoint() {
    let workshop = Workshop::new(DEPLOYMENT, OPTIMIZED, &night_schedule());
    let outcome = workshop.engine().validate(Checkpoint::Three, None);

    assert!(!outcome.passed);
    assert!(outcome.messages[0].contains("Checkpoint 2 must be completed first"));
    assert!(outcome.messages.iter().any(|m| m.contains("fax-service")));
}

#[test]
fn test_validate_checkpoint_one_strictly_against_original() {
    let workshop = Workshop::new(DEPLOYMENT, UNOPTIMIZED, &evening_schedule());
    let original = workshop.root().join("deployment_original.yaml");
    fs::write(&original, DEPLOYMENT).unwrap();

    let clean = without_fax(DEPLOYMENT);
    fs::write(&workshop.config.deployment_path, &clean).unwrap();
    let outcome = workshop.engine().validate(Checkpoint::One, Some(&original));
    assert!(outcome.passed, "{:?}", outcome.messages);

    let overzealous = clean.replace("order-service", "order-service-v2");
    fs::write(&workshop.config.deployment_path, overzealous).unwrap();
    let outcome = workshop.engine().validate(Checkpoint::One, Some(&original));
    assert!(!outcome.passed);
    assert!(outcome.messages.contains(&"'order-service' was removed but is still required".to_string()));
    assert!(outcome.messages.contains(&"'order-service-v2' was added".to_string()));
}

#[test]
fn test_validate_checkpoint_one_with_late_original() {
    let workshop = Workshop::new(&without_fax(DEPLOYMENT), UNOPTIMIZED, &evening_schedule());
    let original = workshop.root().join("deployment_original.yaml");
    fs::write(&original, without_fax(DEPLOYMENT)).unwrap();

    let engine = workshop.engine();
    assert!(engine.compute_state().checkpoint1);

    let outcome = engine.validate(Checkpoint::One, Some(&original));
    assert!(!outcome.passed);
    assert_eq!(outcome.messages.len(), 1);
    assert!(outcome.messages[0].contains("'fax-service' was not present in the original deployment"), "{:?}", outcome.messages);
}

#[test]
fn test_missing_deployment_reads_as_no_services() {
    let workshop = Workshop::new(DEPLOYMENT, UNOPTIMIZED, &evening_schedule());
    fs::remove_file(&workshop.config.deployment_path).unwrap();

    assert!(read_services(&workshop.config.deployment_path).is_empty());
    assert!(workshop.engine().compute_state().checkpoint1);
}

#[test]
fn test_evaluate_workshop_captures_originals() {
    let workshop = Workshop::new(DEPLOYMENT, UNOPTIMIZED, &evening_schedule());

    let report = trading_workshop::evaluate_workshop(workshop.root()).unwrap();

    assert_eq!(report.state.as_tuple(), (false, false, false));
    assert!(workshop.config.snapshot_dir.join("deployment_original.yaml").is_file());
}
