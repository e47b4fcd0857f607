use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::domain::{
    AlertChannel, AlertLevel, AlertReceiver, AlertRule, AlertType, ChannelStatus, LogqlGenerator,
    PromqlGenerator,
};
use crate::error::MigrateError;

/// Location metadata for one `cluster/namespace` pair, used by the rename
/// audit export.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvInfo {
    pub cluster: String,
    pub namespace: String,
    pub tenant_name: String,
    pub project_name: String,
    pub environment_name: String,
}

fn encode_json<T: Serialize>(what: &str, value: &T) -> Result<String, MigrateError> {
    serde_json::to_string(value).map_err(|e| {
        MigrateError::new("DB_ENCODE_FAILED", format!("Failed to encode {what}"))
            .with_details(e.to_string())
    })
}

fn decode_json<T: for<'de> Deserialize<'de>>(what: &str, raw: &str) -> Result<T, MigrateError> {
    serde_json::from_str(raw).map_err(|e| {
        MigrateError::new("DB_DECODE_FAILED", format!("Failed to decode {what}"))
            .with_details(e.to_string())
    })
}

/// Persist one canonical rule plus its receiver rows, in one transaction so
/// a failed receiver insert never leaves an orphan rule row behind.
///
/// Only the channel id is written for each receiver; the channel record
/// itself is never created or touched here.
pub fn create_alert_rule(conn: &mut Connection, rule: &AlertRule) -> Result<i64, MigrateError> {
    let inhibit_labels = encode_json("inhibit labels", &rule.inhibit_labels)?;
    let alert_levels = encode_json("alert levels", &rule.alert_levels)?;
    let promql_generator = rule
        .promql_generator
        .as_ref()
        .map(|g| encode_json("promql generator", g))
        .transpose()?;
    let logql_generator = rule
        .logql_generator
        .as_ref()
        .map(|g| encode_json("logql generator", g))
        .transpose()?;

    let tx = conn.transaction().map_err(|e| {
        MigrateError::new("DB_TX_FAILED", "Failed to start alert rule transaction")
            .with_details(e.to_string())
    })?;

    tx.execute(
        r#"
      INSERT INTO alert_rules(
        cluster, namespace, name, alert_type, expr, message, for_duration,
        inhibit_labels, is_open, alert_levels, promql_generator, logql_generator,
        created_at
      ) VALUES (
        ?1, ?2, ?3, ?4, ?5, ?6, ?7,
        ?8, ?9, ?10, ?11, ?12,
        strftime('%Y-%m-%dT%H:%M:%fZ','now')
      )
      "#,
        rusqlite::params![
            rule.cluster,
            rule.namespace,
            rule.name,
            rule.alert_type.as_str(),
            rule.expr,
            rule.message,
            rule.for_duration,
            inhibit_labels,
            rule.is_open,
            alert_levels,
            promql_generator,
            logql_generator,
        ],
    )
    .map_err(|e| {
        MigrateError::new("DB_INSERT_FAILED", "Failed to insert alert rule")
            .with_details(format!("rule={}; err={e}", rule.full_name()))
    })?;

    let rule_id = tx.last_insert_rowid();
    for (ordinal, rec) in rule.receivers.iter().enumerate() {
        tx.execute(
            r#"
          INSERT INTO alert_receivers(alert_rule_id, alert_channel_id, interval, ordinal)
          VALUES (?1, ?2, ?3, ?4)
          "#,
            rusqlite::params![rule_id, rec.alert_channel_id, rec.interval, ordinal as i64],
        )
        .map_err(|e| {
            MigrateError::new("DB_INSERT_FAILED", "Failed to insert alert receiver")
                .with_details(format!("rule={}; err={e}", rule.full_name()))
        })?;
    }

    tx.commit().map_err(|e| {
        MigrateError::new("DB_TX_FAILED", "Failed to commit alert rule transaction")
            .with_details(format!("rule={}; err={e}", rule.full_name()))
    })?;
    Ok(rule_id)
}

/// Receivers with their channel records eagerly joined in, so callers never
/// have to go back to `alert_channels` per receiver. A receiver whose channel
/// row is gone loads with `alert_channel: None`.
fn list_receivers(conn: &Connection, rule_id: i64) -> Result<Vec<AlertReceiver>, MigrateError> {
    let mut stmt = conn
        .prepare(
            r#"
          SELECT r.alert_channel_id, r.interval, c.id, c.name, c.status
          FROM alert_receivers r
          LEFT JOIN alert_channels c ON c.id = r.alert_channel_id
          WHERE r.alert_rule_id = ?1
          ORDER BY r.ordinal ASC
          "#,
        )
        .map_err(|e| {
            MigrateError::new("DB_QUERY_FAILED", "Failed to prepare receivers query")
                .with_details(e.to_string())
        })?;

    let rows = stmt
        .query_map([rule_id], |row| {
            let channel_id: Option<i64> = row.get(2)?;
            let alert_channel = match channel_id {
                Some(id) => Some(AlertChannel {
                    id,
                    name: row.get(3)?,
                    status: ChannelStatus::parse(&row.get::<_, String>(4)?),
                }),
                None => None,
            };
            Ok(AlertReceiver {
                alert_channel_id: row.get(0)?,
                interval: row.get(1)?,
                alert_channel,
            })
        })
        .map_err(|e| {
            MigrateError::new("DB_QUERY_FAILED", "Failed to query receivers")
                .with_details(e.to_string())
        })?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r.map_err(|e| {
            MigrateError::new("DB_QUERY_FAILED", "Failed to decode receiver row")
                .with_details(e.to_string())
        })?);
    }
    Ok(out)
}

struct AlertRuleRow {
    id: i64,
    cluster: String,
    namespace: String,
    name: String,
    alert_type: String,
    expr: String,
    message: String,
    for_duration: String,
    inhibit_labels: String,
    is_open: bool,
    alert_levels: String,
    promql_generator: Option<String>,
    logql_generator: Option<String>,
}

fn rule_from_row(conn: &Connection, row: AlertRuleRow) -> Result<AlertRule, MigrateError> {
    let inhibit_labels: Vec<String> = decode_json("inhibit labels", &row.inhibit_labels)?;
    let alert_levels: Vec<AlertLevel> = decode_json("alert levels", &row.alert_levels)?;
    let promql_generator: Option<PromqlGenerator> = row
        .promql_generator
        .as_deref()
        .map(|raw| decode_json("promql generator", raw))
        .transpose()?;
    let logql_generator: Option<LogqlGenerator> = row
        .logql_generator
        .as_deref()
        .map(|raw| decode_json("logql generator", raw))
        .transpose()?;
    let receivers = list_receivers(conn, row.id)?;

    Ok(AlertRule {
        id: row.id,
        cluster: row.cluster,
        namespace: row.namespace,
        name: row.name,
        alert_type: AlertType::parse(&row.alert_type)?,
        expr: row.expr,
        message: row.message,
        for_duration: row.for_duration,
        inhibit_labels,
        is_open: row.is_open,
        alert_levels,
        receivers,
        promql_generator,
        logql_generator,
    })
}

/// List all persisted rules with their receiver bindings eagerly loaded,
/// ordered by id so batch phases are deterministic.
pub fn list_alert_rules(conn: &Connection) -> Result<Vec<AlertRule>, MigrateError> {
    let mut stmt = conn
        .prepare(
            r#"
          SELECT
            id, cluster, namespace, name, alert_type, expr, message, for_duration,
            inhibit_labels, is_open, alert_levels, promql_generator, logql_generator
          FROM alert_rules
          ORDER BY id ASC
          "#,
        )
        .map_err(|e| {
            MigrateError::new("DB_QUERY_FAILED", "Failed to prepare alert rules query")
                .with_details(e.to_string())
        })?;

    let rows = stmt
        .query_map([], |row| {
            Ok(AlertRuleRow {
                id: row.get(0)?,
                cluster: row.get(1)?,
                namespace: row.get(2)?,
                name: row.get(3)?,
                alert_type: row.get(4)?,
                expr: row.get(5)?,
                message: row.get(6)?,
                for_duration: row.get(7)?,
                inhibit_labels: row.get(8)?,
                is_open: row.get(9)?,
                alert_levels: row.get(10)?,
                promql_generator: row.get(11)?,
                logql_generator: row.get(12)?,
            })
        })
        .map_err(|e| {
            MigrateError::new("DB_QUERY_FAILED", "Failed to query alert rules")
                .with_details(e.to_string())
        })?;

    let mut raw = Vec::new();
    for r in rows {
        raw.push(r.map_err(|e| {
            MigrateError::new("DB_QUERY_FAILED", "Failed to decode alert rule row")
                .with_details(e.to_string())
        })?);
    }

    let mut out = Vec::with_capacity(raw.len());
    for row in raw {
        out.push(rule_from_row(conn, row)?);
    }
    Ok(out)
}

pub fn count_alert_rules(conn: &Connection) -> Result<i64, MigrateError> {
    conn.query_row("SELECT COUNT(*) FROM alert_rules", [], |row| row.get(0))
        .map_err(|e| {
            MigrateError::new("DB_QUERY_FAILED", "Failed to count alert rules")
                .with_details(e.to_string())
        })
}

pub fn update_alert_rule_name(
    conn: &Connection,
    rule_id: i64,
    new_name: &str,
) -> Result<(), MigrateError> {
    let changed = conn
        .execute(
            "UPDATE alert_rules SET name = ?1 WHERE id = ?2",
            rusqlite::params![new_name, rule_id],
        )
        .map_err(|e| {
            MigrateError::new("DB_UPDATE_FAILED", "Failed to update alert rule name")
                .with_details(format!("id={rule_id}; new_name={new_name}; err={e}"))
                .fatal()
        })?;
    if changed == 0 {
        return Err(
            MigrateError::new("DB_NOT_FOUND", "Alert rule not found for rename")
                .with_details(format!("id={rule_id}"))
                .fatal(),
        );
    }
    Ok(())
}

/// Names that are not representable in the canonical single-byte slug form:
/// anything containing a space, or whose byte length differs from its
/// character length. Both checks are kept separate on purpose.
pub fn list_noncanonical_rule_names(conn: &Connection) -> Result<Vec<String>, MigrateError> {
    let mut stmt = conn
        .prepare(
            r#"
          SELECT DISTINCT name FROM alert_rules
          WHERE LENGTH(CAST(name AS BLOB)) != LENGTH(name) OR name LIKE '% %'
          ORDER BY name ASC
          "#,
        )
        .map_err(|e| {
            MigrateError::new("DB_QUERY_FAILED", "Failed to prepare non-canonical name scan")
                .with_details(e.to_string())
                .fatal()
        })?;

    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| {
            MigrateError::new("DB_QUERY_FAILED", "Failed to scan non-canonical names")
                .with_details(e.to_string())
                .fatal()
        })?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r.map_err(|e| {
            MigrateError::new("DB_QUERY_FAILED", "Failed to decode non-canonical name row")
                .with_details(e.to_string())
                .fatal()
        })?);
    }
    Ok(out)
}

/// Environment-resolution table keyed by `cluster/namespace`.
pub fn cluster_ns_env_map(conn: &Connection) -> Result<BTreeMap<String, EnvInfo>, MigrateError> {
    let mut stmt = conn
        .prepare(
            r#"
          SELECT cluster, namespace, tenant_name, project_name, environment_name
          FROM environments
          "#,
        )
        .map_err(|e| {
            MigrateError::new("DB_QUERY_FAILED", "Failed to prepare environments query")
                .with_details(e.to_string())
                .fatal()
        })?;

    let rows = stmt
        .query_map([], |row| {
            Ok(EnvInfo {
                cluster: row.get(0)?,
                namespace: row.get(1)?,
                tenant_name: row.get(2)?,
                project_name: row.get(3)?,
                environment_name: row.get(4)?,
            })
        })
        .map_err(|e| {
            MigrateError::new("DB_QUERY_FAILED", "Failed to query environments")
                .with_details(e.to_string())
                .fatal()
        })?;

    let mut out = BTreeMap::new();
    for r in rows {
        let info = r.map_err(|e| {
            MigrateError::new("DB_QUERY_FAILED", "Failed to decode environment row")
                .with_details(e.to_string())
                .fatal()
        })?;
        out.insert(format!("{}/{}", info.cluster, info.namespace), info);
    }
    Ok(out)
}

pub fn insert_environment(conn: &Connection, info: &EnvInfo) -> Result<(), MigrateError> {
    conn.execute(
        r#"
      INSERT INTO environments(cluster, namespace, tenant_name, project_name, environment_name)
      VALUES (?1, ?2, ?3, ?4, ?5)
      "#,
        rusqlite::params![
            info.cluster,
            info.namespace,
            info.tenant_name,
            info.project_name,
            info.environment_name,
        ],
    )
    .map_err(|e| {
        MigrateError::new("DB_INSERT_FAILED", "Failed to insert environment")
            .with_details(e.to_string())
    })?;
    Ok(())
}

pub fn insert_alert_channel(
    conn: &Connection,
    name: &str,
    status: ChannelStatus,
) -> Result<i64, MigrateError> {
    conn.execute(
        "INSERT INTO alert_channels(name, status) VALUES (?1, ?2)",
        rusqlite::params![name, status.as_str()],
    )
    .map_err(|e| {
        MigrateError::new("DB_INSERT_FAILED", "Failed to insert alert channel")
            .with_details(e.to_string())
    })?;
    Ok(conn.last_insert_rowid())
}

pub fn channel_exists(conn: &Connection, channel_id: i64) -> Result<bool, MigrateError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM alert_channels WHERE id = ?1",
            [channel_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| {
            // A failed lookup is a store problem, not a missing channel.
            MigrateError::new("DB_QUERY_FAILED", "Failed to query alert channel")
                .with_details(e.to_string())
                .fatal()
        })?;
    Ok(found.is_some())
}
