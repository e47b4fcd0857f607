use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{kebab_case, validate_rule_name};
use crate::error::MigrateError;
use crate::repo;

/// UTF-8 byte-order marker written ahead of the audit CSV so spreadsheet
/// tools decode it correctly.
const AUDIT_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

const AUDIT_HEADER: [&str; 7] = [
    "oldname",
    "newname",
    "cluster",
    "namespace",
    "tenant_name",
    "project_name",
    "environment_name",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoverSummary {
    pub flagged: usize,
    pub added: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenameSummary {
    pub renamed: usize,
    pub audited: usize,
}

/// Load the operator-editable old-name -> new-name map. A missing or empty
/// file is an empty map; an unreadable or malformed file aborts the phase.
pub fn load_name_overrides(path: &Path) -> Result<BTreeMap<String, String>, MigrateError> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => {
            return Err(
                MigrateError::new("OVERRIDE_FILE_OPEN_FAILED", "Failed to read name override file")
                    .with_details(format!("path={}; err={e}", path.display()))
                    .fatal(),
            )
        }
    };
    if contents.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    // Operators often leave the value blank (`Old Name:`), which YAML reads
    // as null; treat that the same as an empty string.
    let parsed: BTreeMap<String, Option<String>> =
        serde_yaml::from_str(&contents).map_err(|e| {
            MigrateError::new("OVERRIDE_FILE_PARSE_FAILED", "Failed to parse name override file")
                .with_details(format!("path={}; err={e}", path.display()))
                .fatal()
        })?;
    Ok(parsed
        .into_iter()
        .map(|(k, v)| (k, v.unwrap_or_default()))
        .collect())
}

pub fn save_name_overrides(
    path: &Path,
    overrides: &BTreeMap<String, String>,
) -> Result<(), MigrateError> {
    let yaml = serde_yaml::to_string(overrides).map_err(|e| {
        MigrateError::new("OVERRIDE_FILE_ENCODE_FAILED", "Failed to encode name override file")
            .with_details(e.to_string())
            .fatal()
    })?;
    fs::write(path, yaml.as_bytes()).map_err(|e| {
        MigrateError::new("OVERRIDE_FILE_WRITE_FAILED", "Failed to write name override file")
            .with_details(format!("path={}; err={e}", path.display()))
            .fatal()
    })
}

/// Phase A: scan persisted rules for non-canonical names and merge them into
/// the override file with an empty proposed value. Existing entries —
/// including operator-filled ones — are never overwritten, so the phase is
/// idempotent and safe to rerun between operator edits.
pub fn discover_noncanonical_names(
    conn: &Connection,
    override_path: &Path,
) -> Result<DiscoverSummary, MigrateError> {
    let mut overrides = load_name_overrides(override_path)?;
    let flagged_names = repo::list_noncanonical_rule_names(conn)?;

    let mut added = Vec::new();
    for name in &flagged_names {
        if !overrides.contains_key(name) {
            overrides.insert(name.clone(), String::new());
            info!(name, "added non-canonical alert name to override map");
            added.push(name.clone());
        }
    }

    save_name_overrides(override_path, &overrides)?;
    Ok(DiscoverSummary {
        flagged: flagged_names.len(),
        added,
    })
}

struct PlannedRename {
    rule_id: i64,
    full_name: String,
    old_name: String,
    new_name: String,
}

fn write_audit_file(path: &Path, records: &[Vec<String>]) -> Result<(), MigrateError> {
    let mut file = fs::File::create(path).map_err(|e| {
        MigrateError::new("AUDIT_FILE_OPEN_FAILED", "Failed to create rename audit file")
            .with_details(format!("path={}; err={e}", path.display()))
            .fatal()
    })?;
    file.write_all(&AUDIT_BOM).map_err(|e| {
        MigrateError::new("AUDIT_FILE_WRITE_FAILED", "Failed to write audit preamble")
            .with_details(e.to_string())
            .fatal()
    })?;

    let mut w = csv::Writer::from_writer(file);
    w.write_record(AUDIT_HEADER).map_err(|e| {
        MigrateError::new("AUDIT_FILE_WRITE_FAILED", "Failed to write audit header")
            .with_details(e.to_string())
            .fatal()
    })?;
    for record in records {
        w.write_record(record).map_err(|e| {
            MigrateError::new("AUDIT_FILE_WRITE_FAILED", "Failed to write audit record")
                .with_details(e.to_string())
                .fatal()
        })?;
    }
    w.flush().map_err(|e| {
        MigrateError::new("AUDIT_FILE_WRITE_FAILED", "Failed to flush audit file")
            .with_details(e.to_string())
            .fatal()
    })
}

/// Phase B: compute every rule's canonical name (override entry when
/// non-empty, kebab-case slug otherwise), validate all of them up front,
/// apply the renames in one transaction, and rewrite the audit CSV with one
/// row per rule — including rules whose name did not change.
///
/// Any grammar-invalid name aborts the phase before a single rename is
/// persisted. A settle delay follows a successful apply so downstream
/// watchers observe the change before the process exits.
pub fn apply_renames(
    conn: &mut Connection,
    override_path: &Path,
    audit_path: &Path,
    settle: Duration,
) -> Result<RenameSummary, MigrateError> {
    let overrides = load_name_overrides(override_path)?;
    let rules = repo::list_alert_rules(conn).map_err(|e| e.fatal())?;
    let envinfo = repo::cluster_ns_env_map(conn)?;

    // Validate everything before touching the store.
    let mut planned = Vec::with_capacity(rules.len());
    let mut records = Vec::with_capacity(rules.len());
    for rule in &rules {
        let new_name = match overrides.get(&rule.name) {
            Some(chosen) if !chosen.is_empty() => chosen.clone(),
            _ => kebab_case(&rule.name),
        };
        validate_rule_name(&new_name)?;

        let info = envinfo
            .get(&format!("{}/{}", rule.cluster, rule.namespace))
            .cloned()
            .unwrap_or_default();
        records.push(vec![
            rule.name.clone(),
            new_name.clone(),
            info.cluster,
            info.namespace,
            info.tenant_name,
            info.project_name,
            info.environment_name,
        ]);

        if new_name != rule.name {
            planned.push(PlannedRename {
                rule_id: rule.id,
                full_name: rule.full_name(),
                old_name: rule.name.clone(),
                new_name,
            });
        }
    }

    let tx = conn.transaction().map_err(|e| {
        MigrateError::new("DB_TX_FAILED", "Failed to start rename transaction")
            .with_details(e.to_string())
            .fatal()
    })?;
    for plan in &planned {
        repo::update_alert_rule_name(&tx, plan.rule_id, &plan.new_name)?;
        info!(
            rule = plan.full_name,
            old_name = plan.old_name,
            new_name = plan.new_name,
            "updated alert rule name"
        );
    }
    tx.commit().map_err(|e| {
        MigrateError::new("DB_TX_FAILED", "Failed to commit rename transaction")
            .with_details(e.to_string())
            .fatal()
    })?;

    write_audit_file(audit_path, &records)?;

    // Let downstream caches and watchers observe the renames before exit.
    if !settle.is_zero() {
        std::thread::sleep(settle);
    }

    Ok(RenameSummary {
        renamed: planned.len(),
        audited: records.len(),
    })
}
