use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::cluster::{
    ClusterRegistry, ObjectKind, CONFIG_NAME_LABEL, RULE_NAME_LABEL, RULE_TYPE_LABEL,
};
use crate::domain::{AlertType, MigrationWarning};
use crate::error::MigrateError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurgeSummary {
    pub deleted: usize,
    pub failed: usize,
    pub warnings: Vec<MigrationWarning>,
}

/// Best-effort deletion of the legacy in-cluster configuration objects:
/// alerting configs carrying the config-name label, and rule objects
/// carrying the rule-name label with a monitor rule type. Every list or
/// delete failure is logged and skipped; remaining objects and clusters are
/// still processed.
pub fn purge_cluster_objects(registry: &dyn ClusterRegistry) -> Result<PurgeSummary, MigrateError> {
    let mut deleted = 0usize;
    let mut failed = 0usize;
    let mut warnings: Vec<MigrationWarning> = Vec::new();

    let monitor_only = [(RULE_TYPE_LABEL, AlertType::Monitor.as_str())];
    let selectors: [(ObjectKind, &[&str], &[(&str, &str)]); 2] = [
        (ObjectKind::AlertingConfig, &[CONFIG_NAME_LABEL], &[]),
        (ObjectKind::AlertRuleGroup, &[RULE_NAME_LABEL], &monitor_only),
    ];

    registry.for_each_cluster(&mut |cli| {
        for (kind, has_labels, match_labels) in selectors {
            let objects = match cli.list_objects(kind, has_labels, match_labels) {
                Ok(objects) => objects,
                Err(e) => {
                    error!(cluster = cli.name(), kind = ?kind, error = %e, "listing legacy objects failed");
                    warnings.push(
                        MigrationWarning::new("PURGE_LIST_FAILED", "Failed to list legacy objects")
                            .with_details(format!("cluster={}; kind={kind:?}; err={e}", cli.name())),
                    );
                    continue;
                }
            };
            for obj in &objects {
                match cli.delete_object(obj) {
                    Ok(()) => {
                        info!(
                            cluster = cli.name(),
                            namespace = obj.namespace,
                            name = obj.name,
                            kind = ?obj.kind,
                            "deleted legacy object"
                        );
                        deleted += 1;
                    }
                    Err(e) => {
                        error!(
                            cluster = cli.name(),
                            namespace = obj.namespace,
                            name = obj.name,
                            error = %e,
                            "deleting legacy object failed"
                        );
                        warnings.push(
                            MigrationWarning::new("PURGE_DELETE_FAILED", "Failed to delete legacy object")
                                .with_details(format!(
                                    "cluster={}; object={}/{}; err={e}",
                                    cli.name(),
                                    obj.namespace,
                                    obj.name
                                )),
                        );
                        failed += 1;
                    }
                }
            }
        }
        Ok(())
    })?;

    Ok(PurgeSummary {
        deleted,
        failed,
        warnings,
    })
}
