use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rusqlite::Connection;
use tempfile::TempDir;

use armig_core::db;
use armig_core::domain::{AlertRule, AlertType};
use armig_core::rename::{
    apply_renames, discover_noncanonical_names, load_name_overrides, save_name_overrides,
};
use armig_core::repo::{self, EnvInfo};

fn test_conn() -> Connection {
    let mut conn = db::open_in_memory().expect("open");
    db::migrate(&mut conn).expect("migrate");
    conn
}

fn seed_rule(conn: &mut Connection, cluster: &str, namespace: &str, name: &str) -> i64 {
    let rule = AlertRule {
        id: 0,
        cluster: cluster.to_string(),
        namespace: namespace.to_string(),
        name: name.to_string(),
        alert_type: AlertType::Monitor,
        expr: "up == 0".to_string(),
        message: "target down".to_string(),
        for_duration: "1m".to_string(),
        inhibit_labels: vec![],
        is_open: true,
        alert_levels: vec![],
        receivers: vec![],
        promql_generator: None,
        logql_generator: None,
    };
    repo::create_alert_rule(conn, &rule).expect("seed rule")
}

fn seed_env(conn: &Connection) {
    repo::insert_environment(
        conn,
        &EnvInfo {
            cluster: "cluster-a".to_string(),
            namespace: "monitoring".to_string(),
            tenant_name: "tenant-1".to_string(),
            project_name: "proj-1".to_string(),
            environment_name: "prod".to_string(),
        },
    )
    .expect("seed env");
}

fn rule_names(conn: &Connection) -> Vec<String> {
    repo::list_alert_rules(conn)
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect()
}

fn read_audit_rows(path: &std::path::Path) -> (Vec<u8>, Vec<Vec<String>>) {
    let raw = fs::read(path).expect("audit file");
    let bom = raw[..3].to_vec();
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(&raw[3..]);
    let rows = rdr
        .records()
        .map(|r| r.unwrap().iter().map(|v| v.to_string()).collect())
        .collect();
    (bom, rows)
}

#[test]
fn discovery_is_idempotent_and_preserves_operator_entries() {
    let mut conn = test_conn();
    seed_rule(&mut conn, "cluster-a", "monitoring", "My Rule");
    seed_rule(&mut conn, "cluster-a", "monitoring", "磁盘告警");
    seed_rule(&mut conn, "cluster-a", "monitoring", "clean-name");

    let dir = TempDir::new().unwrap();
    let map_path = dir.path().join("alertname-map.yaml");

    let first = discover_noncanonical_names(&conn, &map_path).unwrap();
    assert_eq!(first.flagged, 2);
    assert_eq!(first.added.len(), 2);
    let after_first = load_name_overrides(&map_path).unwrap();

    // Operator fills one entry in between runs.
    let mut edited = after_first.clone();
    edited.insert("磁盘告警".to_string(), "disk-alert".to_string());
    save_name_overrides(&map_path, &edited).unwrap();

    let second = discover_noncanonical_names(&conn, &map_path).unwrap();
    assert_eq!(second.flagged, 2);
    assert!(second.added.is_empty(), "rerun must not add entries");

    let after_second = load_name_overrides(&map_path).unwrap();
    assert_eq!(after_second.get("磁盘告警").map(String::as_str), Some("disk-alert"));
    assert_eq!(after_second.get("My Rule").map(String::as_str), Some(""));
}

#[test]
fn apply_uses_override_when_present_and_slug_otherwise() {
    let mut conn = test_conn();
    seed_env(&conn);
    seed_rule(&mut conn, "cluster-a", "monitoring", "My Rule");
    seed_rule(&mut conn, "cluster-a", "monitoring", "Foo Bar");

    let dir = TempDir::new().unwrap();
    let map_path = dir.path().join("alertname-map.yaml");
    let audit_path = dir.path().join("alertname-changes.csv");

    let mut overrides = BTreeMap::new();
    overrides.insert("My Rule".to_string(), "my-custom-rule".to_string());
    save_name_overrides(&map_path, &overrides).unwrap();

    let summary = apply_renames(&mut conn, &map_path, &audit_path, Duration::ZERO).unwrap();
    assert_eq!(summary.renamed, 2);
    assert_eq!(summary.audited, 2);

    let names = rule_names(&conn);
    assert!(names.contains(&"my-custom-rule".to_string()));
    assert!(names.contains(&"foo-bar".to_string()));

    let (bom, rows) = read_audit_rows(&audit_path);
    assert_eq!(bom, vec![0xEF, 0xBB, 0xBF]);
    assert_eq!(
        rows[0],
        vec![
            "My Rule",
            "my-custom-rule",
            "cluster-a",
            "monitoring",
            "tenant-1",
            "proj-1",
            "prod"
        ]
    );
    assert_eq!(rows[1][0], "Foo Bar");
    assert_eq!(rows[1][1], "foo-bar");
}

#[test]
fn empty_override_entry_falls_back_to_slug() {
    let mut conn = test_conn();
    seed_env(&conn);
    seed_rule(&mut conn, "cluster-a", "monitoring", "Foo Bar");

    let dir = TempDir::new().unwrap();
    let map_path = dir.path().join("alertname-map.yaml");
    let audit_path = dir.path().join("alertname-changes.csv");

    // Discovery leaves an empty value; the operator never filled it.
    let mut overrides = BTreeMap::new();
    overrides.insert("Foo Bar".to_string(), String::new());
    save_name_overrides(&map_path, &overrides).unwrap();

    apply_renames(&mut conn, &map_path, &audit_path, Duration::ZERO).unwrap();
    assert_eq!(rule_names(&conn), vec!["foo-bar".to_string()]);
}

#[test]
fn canonical_name_is_left_unchanged_but_still_audited() {
    let mut conn = test_conn();
    seed_rule(&mut conn, "cluster-a", "monitoring", "already-fine");

    let dir = TempDir::new().unwrap();
    let map_path = dir.path().join("alertname-map.yaml");
    let audit_path = dir.path().join("alertname-changes.csv");

    let summary = apply_renames(&mut conn, &map_path, &audit_path, Duration::ZERO).unwrap();
    assert_eq!(summary.renamed, 0);
    assert_eq!(summary.audited, 1);

    assert_eq!(rule_names(&conn), vec!["already-fine".to_string()]);

    let (_, rows) = read_audit_rows(&audit_path);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], "already-fine");
    assert_eq!(rows[0][1], "already-fine");
    // No environment table entry: location columns stay empty.
    assert_eq!(rows[0][2], "");
    assert_eq!(rows[0][6], "");
}

#[test]
fn invalid_computed_name_aborts_phase_without_partial_renames() {
    let mut conn = test_conn();
    seed_rule(&mut conn, "cluster-a", "monitoring", "My Rule");
    // No override entry: slugification keeps the wide characters, which the
    // grammar rejects.
    seed_rule(&mut conn, "cluster-a", "monitoring", "磁盘告警");

    let dir = TempDir::new().unwrap();
    let map_path = dir.path().join("alertname-map.yaml");
    let audit_path = dir.path().join("alertname-changes.csv");

    let err = apply_renames(&mut conn, &map_path, &audit_path, Duration::ZERO).unwrap_err();
    assert_eq!(err.code, "RENAME_INVALID_NAME");
    assert!(err.is_fatal);

    // Nothing was renamed and no audit file appeared.
    let names = rule_names(&conn);
    assert!(names.contains(&"My Rule".to_string()));
    assert!(names.contains(&"磁盘告警".to_string()));
    assert!(!audit_path.exists());
}

#[test]
fn apply_is_rerunnable_after_the_operator_fixes_the_map() {
    let mut conn = test_conn();
    seed_rule(&mut conn, "cluster-a", "monitoring", "磁盘告警");

    let dir = TempDir::new().unwrap();
    let map_path = dir.path().join("alertname-map.yaml");
    let audit_path = dir.path().join("alertname-changes.csv");

    discover_noncanonical_names(&conn, &map_path).unwrap();
    assert!(apply_renames(&mut conn, &map_path, &audit_path, Duration::ZERO).is_err());

    let mut overrides = load_name_overrides(&map_path).unwrap();
    overrides.insert("磁盘告警".to_string(), "disk-alert".to_string());
    save_name_overrides(&map_path, &overrides).unwrap();

    let summary = apply_renames(&mut conn, &map_path, &audit_path, Duration::ZERO).unwrap();
    assert_eq!(summary.renamed, 1);
    assert_eq!(rule_names(&conn), vec!["disk-alert".to_string()]);
}
