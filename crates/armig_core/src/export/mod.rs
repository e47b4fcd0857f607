use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::cluster::{ClusterRegistry, TemplateLookup};
use crate::domain::{
    match_type, AlertReceiver, AlertRule, AlertType, ChannelStatus, LabelMatcher,
    LegacyLoggingRule, LegacyMonitorRule, LogqlGenerator, MigrationWarning, PromqlGenerator,
};
use crate::error::MigrateError;
use crate::repo;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportSummary {
    pub fetched: usize,
    pub exported: usize,
    pub skipped: usize,
    pub warnings: Vec<MigrationWarning>,
}

fn convert_matchers(label_pairs: &std::collections::BTreeMap<String, String>) -> Vec<LabelMatcher> {
    label_pairs
        .iter()
        .map(|(name, value)| LabelMatcher {
            match_type: match_type(value),
            name: name.clone(),
            value: value.clone(),
        })
        .collect()
}

fn convert_receivers(receivers: &[crate::domain::LegacyReceiver]) -> Vec<AlertReceiver> {
    receivers
        .iter()
        .map(|rec| AlertReceiver {
            alert_channel_id: rec.alert_channel_id,
            interval: rec.interval.clone(),
            alert_channel: None,
        })
        .collect()
}

/// Convert one legacy monitor rule into its canonical form.
///
/// Scalar fields are copied verbatim; levels and receivers keep their input
/// order. A non-normal channel status is logged but never blocks conversion.
pub fn convert_monitor_rule(cluster: &str, rule: &LegacyMonitorRule) -> AlertRule {
    let mut ret = AlertRule {
        id: 0,
        cluster: cluster.to_string(),
        namespace: rule.namespace.clone(),
        name: rule.name.clone(),
        alert_type: AlertType::Monitor,
        expr: rule.expr.clone(),
        message: rule.message.clone(),
        for_duration: rule.for_duration.clone(),
        inhibit_labels: rule.inhibit_labels.clone(),
        is_open: rule.is_open,
        alert_levels: rule.alert_levels.clone(),
        receivers: convert_receivers(&rule.receivers),
        promql_generator: None,
        logql_generator: None,
    };
    if let Some(gen) = &rule.promql_generator {
        ret.promql_generator = Some(PromqlGenerator {
            scope: gen.scope.clone(),
            resource: gen.resource.clone(),
            rule: gen.rule.clone(),
            unit: gen.unit.clone(),
            label_matchers: convert_matchers(&gen.label_pairs),
        });
    }
    if rule.channel_status != ChannelStatus::Normal {
        warn!(
            rule = ret.full_name(),
            status = ?rule.channel_status,
            "monitor rule channel status is not normal"
        );
    }
    ret
}

pub fn convert_logging_rule(cluster: &str, rule: &LegacyLoggingRule) -> AlertRule {
    let mut ret = AlertRule {
        id: 0,
        cluster: cluster.to_string(),
        namespace: rule.namespace.clone(),
        name: rule.name.clone(),
        alert_type: AlertType::Logging,
        expr: rule.expr.clone(),
        message: rule.message.clone(),
        for_duration: rule.for_duration.clone(),
        inhibit_labels: rule.inhibit_labels.clone(),
        is_open: rule.is_open,
        alert_levels: rule.alert_levels.clone(),
        receivers: convert_receivers(&rule.receivers),
        promql_generator: None,
        logql_generator: None,
    };
    if let Some(gen) = &rule.logql_generator {
        ret.logql_generator = Some(LogqlGenerator {
            duration: gen.duration.clone(),
            match_expr: gen.match_expr.clone(),
            label_matchers: convert_matchers(&gen.label_pairs),
        });
    }
    if rule.channel_status != ChannelStatus::Normal {
        warn!(
            rule = ret.full_name(),
            status = ?rule.channel_status,
            "logging rule channel status is not normal"
        );
    }
    ret
}

/// Bind the rule's receiver references against the channel table. Fails on
/// the first receiver whose channel id cannot be found; the caller skips the
/// rule and continues the batch.
pub fn resolve_receivers(conn: &Connection, rule: &AlertRule) -> Result<(), MigrateError> {
    for rec in &rule.receivers {
        if !repo::channel_exists(conn, rec.alert_channel_id)? {
            return Err(MigrateError::new(
                "RECEIVER_CHANNEL_NOT_FOUND",
                "Receiver references an unknown alert channel",
            )
            .with_details(format!(
                "rule={}; channel_id={}",
                rule.full_name(),
                rec.alert_channel_id
            )));
        }
    }
    Ok(())
}

/// Fetch every legacy rule from every registered cluster, convert, resolve
/// receivers and persist. A list failure in one cluster yields zero rules
/// from that cluster; a failure on one rule skips that rule only. A fatal
/// store failure aborts the whole batch.
pub fn export_legacy_rules(
    conn: &mut Connection,
    registry: &dyn ClusterRegistry,
    tpl: TemplateLookup<'_>,
) -> Result<ExportSummary, MigrateError> {
    let mut converted: Vec<AlertRule> = Vec::new();
    let mut warnings: Vec<MigrationWarning> = Vec::new();

    registry.for_each_cluster(&mut |cli| {
        match cli.list_monitor_rules("", false, tpl) {
            Ok(rules) => {
                for rule in &rules {
                    if rule.channel_status != ChannelStatus::Normal {
                        warnings.push(
                            MigrationWarning::new(
                                "CHANNEL_STATUS_NOT_NORMAL",
                                "Monitor rule has a degraded channel status",
                            )
                            .with_details(format!("cluster={}; rule={}", cli.name(), rule.name)),
                        );
                    }
                    converted.push(convert_monitor_rule(cli.name(), rule));
                }
            }
            Err(e) => {
                error!(cluster = cli.name(), error = %e, "listing monitor rules failed");
                warnings.push(
                    MigrationWarning::new("LIST_MONITOR_RULES_FAILED", "Failed to list monitor rules")
                        .with_details(format!("cluster={}; err={e}", cli.name())),
                );
            }
        }
        match cli.list_logging_rules("", false) {
            Ok(rules) => {
                for rule in &rules {
                    if rule.channel_status != ChannelStatus::Normal {
                        warnings.push(
                            MigrationWarning::new(
                                "CHANNEL_STATUS_NOT_NORMAL",
                                "Logging rule has a degraded channel status",
                            )
                            .with_details(format!("cluster={}; rule={}", cli.name(), rule.name)),
                        );
                    }
                    converted.push(convert_logging_rule(cli.name(), rule));
                }
            }
            Err(e) => {
                error!(cluster = cli.name(), error = %e, "listing logging rules failed");
                warnings.push(
                    MigrationWarning::new("LIST_LOGGING_RULES_FAILED", "Failed to list logging rules")
                        .with_details(format!("cluster={}; err={e}", cli.name())),
                );
            }
        }
        Ok(())
    })?;

    let fetched = converted.len();
    let mut exported = 0usize;
    let mut skipped = 0usize;

    for rule in &converted {
        match resolve_receivers(conn, rule) {
            Ok(()) => {}
            Err(e) if e.is_fatal => return Err(e),
            Err(e) => {
                error!(rule = rule.full_name(), error = %e, "resolving receivers failed");
                warnings.push(
                    MigrationWarning::new("RECEIVER_RESOLUTION_FAILED", "Skipped rule with unresolved receiver")
                        .with_details(format!("rule={}; err={e}", rule.full_name())),
                );
                skipped += 1;
                continue;
            }
        }
        match repo::create_alert_rule(conn, rule) {
            Ok(_) => {
                info!(rule = rule.full_name(), "exported alert rule");
                exported += 1;
            }
            Err(e) if e.is_fatal => return Err(e),
            Err(e) => {
                error!(rule = rule.full_name(), error = %e, "persisting alert rule failed");
                warnings.push(
                    MigrationWarning::new("RULE_PERSIST_FAILED", "Skipped rule that failed to persist")
                        .with_details(format!("rule={}; err={e}", rule.full_name())),
                );
                skipped += 1;
            }
        }
    }

    Ok(ExportSummary {
        fetched,
        exported,
        skipped,
        warnings,
    })
}
