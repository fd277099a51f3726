use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const DEPLOYMENT: &str = r#"metadata:
  name: "trading-services-cluster" # main cluster

services:
  - name: "order-service"
    version: "3.2.0"
    deployment:
      machines: ["node1"]
  - name: "fax-service"
    version: "2.1.3"
    deployment:
      machines: ["node2"]
"#;

const DEPLOYMENT_WITHOUT_FAX: &str = r#"services:
  - name: "order-service"
    version: "3.2.0"
    deployment:
      machines: ["node1"]
"#;

const SCHEDULE: &str = "jobs:\n  - name: batch-1\n    start_time: \"18:00\"\n    duration_hours: 2\n";

const ARTIFACT: &str = "def getMarketData(api_client):\n    for ticker in tickers:\n        data[ticker] = api_client.get_equity_spot(ticker)\n";

fn workshop_root(deployment: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("configuration_files")).unwrap();
    fs::write(dir.path().join("configuration_files/deployment.yaml"), deployment).unwrap();
    fs::write(dir.path().join("configuration_files/schedule.yaml"), SCHEDULE).unwrap();
    fs::write(dir.path().join("get_market_data.py"), ARTIFACT).unwrap();
    dir
}

fn workshop(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_workshop")).arg("--root").arg(root).args(args).env_clear().output().expect("run workshop")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_boundary_restores_work_on_a_fresh_root() {
    let root = workshop_root(DEPLOYMENT);

    let output = workshop(root.path(), &["backup", "restore-checkpoint2-start"]);
    assert!(output.status.success(), "stderr={}", String::from_utf8_lossy(&output.stderr));

    let deployment = fs::read_to_string(root.path().join("configuration_files/deployment.yaml")).unwrap();
    assert!(deployment.contains("order-service"));
    assert!(!deployment.contains("fax-service"));

    let output = workshop(root.path(), &["backup", "restore-checkpoint3-start"]);
    assert!(output.status.success(), "stderr={}", String::from_utf8_lossy(&output.stderr));
    assert!(fs::read_to_string(root.path().join("get_market_data.py")).unwrap().contains("get_bulk_market_data(tickers)"));

    let output = workshop(root.path(), &["validate", "--checkpoint", "2"]);
    assert!(output.status.success(), "stdout={}", stdout(&output));

    let output = workshop(root.path(), &["backup", "restore-checkpoint1-start"]);
    assert!(output.status.success());
    assert_eq!(fs::read_to_string(root.path().join("configuration_files/deployment.yaml")).unwrap(), DEPLOYMENT);
}

#[test]
fn test_validate_names_a_late_original_snapshot() {
    let root = workshop_root(DEPLOYMENT_WITHOUT_FAX);

    let output = workshop(root.path(), &["validate", "--checkpoint", "1"]);
    let text = stdout(&output);

    assert!(!output.status.success());
    assert!(text.contains("not present in the original deployment"), "stdout={}", text);
    assert!(!text.contains("still deployed"), "stdout={}", text);
}

#[test]
fn test_dashboards_follow_progress() {
    let root = workshop_root(DEPLOYMENT);

    let output = workshop(root.path(), &["latency"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("unlocks after Checkpoint 1"));

    let output = workshop(root.path(), &["historical", "fax-service", "--timeframe", "30_days"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Total requests: 0"));

    let output = workshop(root.path(), &["historical", "ghost-service"]);
    assert!(!output.status.success());

    let output = workshop(root.path(), &["status", "--services", "order-service,ghost-service"]);
    let text = stdout(&output);
    assert!(text.contains("Services not found: ghost-service"), "stdout={}", text);
    assert!(!text.contains("fax-service   "), "stdout={}", text);

    fs::write(root.path().join("configuration_files/deployment.yaml"), DEPLOYMENT_WITHOUT_FAX).unwrap();
    let output = workshop(root.path(), &["latency"]);
    assert!(stdout(&output).contains("P95 (ms)"));

    let output = workshop(root.path(), &["software-carbon-intensity"]);
    assert!(stdout(&output).contains("Next: Checkpoint 2"));
}
