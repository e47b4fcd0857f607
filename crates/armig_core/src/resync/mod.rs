use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::cluster::{ClusterRegistry, RuleProcessor};
use crate::domain::MigrationWarning;
use crate::error::MigrateError;
use crate::repo;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResyncSummary {
    pub synced: usize,
    pub failed: usize,
    pub warnings: Vec<MigrationWarning>,
}

/// Reload every canonical rule (receivers and their channel records eagerly
/// loaded) and re-apply it into its owning cluster through the rule
/// processor, re-materializing the in-cluster objects after the rename. A
/// cluster lookup or sync failure
/// skips that rule only; the batch never aborts.
pub fn resync_alert_rules(
    conn: &Connection,
    registry: &dyn ClusterRegistry,
    processor: &dyn RuleProcessor,
) -> Result<ResyncSummary, MigrateError> {
    let rules = repo::list_alert_rules(conn).map_err(|e| e.fatal())?;

    let mut synced = 0usize;
    let mut failed = 0usize;
    let mut warnings: Vec<MigrationWarning> = Vec::new();

    for rule in &rules {
        let client = match registry.client_of(&rule.cluster) {
            Ok(client) => client,
            Err(e) => {
                error!(rule = rule.full_name(), error = %e, "cluster client lookup failed");
                warnings.push(
                    MigrationWarning::new("RESYNC_CLIENT_LOOKUP_FAILED", "No client for rule's cluster")
                        .with_details(format!("rule={}; err={e}", rule.full_name())),
                );
                failed += 1;
                continue;
            }
        };
        match processor.sync_alert_rule(client, rule) {
            Ok(()) => {
                info!(rule = rule.full_name(), "synced alert rule");
                synced += 1;
            }
            Err(e) => {
                error!(rule = rule.full_name(), error = %e, "syncing alert rule failed");
                warnings.push(
                    MigrationWarning::new("RESYNC_SYNC_FAILED", "Failed to sync alert rule")
                        .with_details(format!("rule={}; err={e}", rule.full_name())),
                );
                failed += 1;
            }
        }
    }

    Ok(ResyncSummary {
        synced,
        failed,
        warnings,
    })
}
