use tracing::warn;

use crate::domain::{LegacyLoggingRule, LegacyMonitorRule, QueryTemplate};
use crate::error::MigrateError;

/// Label carried by legacy in-cluster alerting-config objects.
pub const CONFIG_NAME_LABEL: &str = "alerting.config/name";
/// Label carried by legacy in-cluster rule objects.
pub const RULE_NAME_LABEL: &str = "alerting.rule/name";
/// Label whose value distinguishes monitor rules from logging rules.
pub const RULE_TYPE_LABEL: &str = "alerting.rule/type";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    AlertingConfig,
    AlertRuleGroup,
}

/// Reference to one in-cluster configuration object, enough to delete it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterObjectRef {
    pub kind: ObjectKind,
    pub namespace: String,
    pub name: String,
}

/// Lookup for the query template referenced by a monitor rule's generator
/// descriptor, keyed by template name.
pub type TemplateLookup<'a> = &'a dyn Fn(&str) -> Option<QueryTemplate>;

/// Scoped API client for one registered cluster. The real implementation
/// wraps the cluster's API server; tests use in-memory fakes.
pub trait ClusterClient: std::fmt::Debug {
    fn name(&self) -> &str;

    /// List legacy monitor-based rules. `filter` narrows by rule name and is
    /// empty during migration; disabled rules are excluded unless asked for.
    fn list_monitor_rules(
        &self,
        filter: &str,
        include_disabled: bool,
        tpl: TemplateLookup<'_>,
    ) -> Result<Vec<LegacyMonitorRule>, MigrateError>;

    fn list_logging_rules(
        &self,
        filter: &str,
        include_disabled: bool,
    ) -> Result<Vec<LegacyLoggingRule>, MigrateError>;

    /// List objects of one kind across all namespaces, selected by label
    /// presence (`has_labels`) and exact label values (`match_labels`).
    fn list_objects(
        &self,
        kind: ObjectKind,
        has_labels: &[&str],
        match_labels: &[(&str, &str)],
    ) -> Result<Vec<ClusterObjectRef>, MigrateError>;

    fn delete_object(&self, obj: &ClusterObjectRef) -> Result<(), MigrateError>;
}

/// Registry of all clusters known to the platform.
///
/// `for_each_cluster` invokes the callback once per cluster, independently:
/// a callback failure is logged and does not stop the remaining clusters.
/// Only a failure of the enumeration mechanism itself propagates.
pub trait ClusterRegistry {
    fn for_each_cluster(
        &self,
        f: &mut dyn FnMut(&dyn ClusterClient) -> Result<(), MigrateError>,
    ) -> Result<(), MigrateError>;

    fn client_of(&self, cluster: &str) -> Result<&dyn ClusterClient, MigrateError>;
}

/// Re-applies one canonical rule into its owning cluster, re-materializing
/// the in-cluster objects. Implemented by the alerting engine; out of scope
/// here beyond the contract.
pub trait RuleProcessor {
    fn sync_alert_rule(
        &self,
        client: &dyn ClusterClient,
        rule: &crate::domain::AlertRule,
    ) -> Result<(), MigrateError>;
}

/// Registry over a fixed set of clients, used by tests and by embeddings
/// that already hold their cluster handles.
pub struct StaticRegistry {
    clients: Vec<Box<dyn ClusterClient>>,
}

impl StaticRegistry {
    pub fn new(clients: Vec<Box<dyn ClusterClient>>) -> Self {
        Self { clients }
    }
}

impl ClusterRegistry for StaticRegistry {
    fn for_each_cluster(
        &self,
        f: &mut dyn FnMut(&dyn ClusterClient) -> Result<(), MigrateError>,
    ) -> Result<(), MigrateError> {
        for client in &self.clients {
            if let Err(e) = f(client.as_ref()) {
                warn!(cluster = client.name(), error = %e, "per-cluster callback failed");
            }
        }
        Ok(())
    }

    fn client_of(&self, cluster: &str) -> Result<&dyn ClusterClient, MigrateError> {
        self.clients
            .iter()
            .map(|c| c.as_ref())
            .find(|c| c.name() == cluster)
            .ok_or_else(|| {
                MigrateError::new("CLUSTER_NOT_FOUND", "No client registered for cluster")
                    .with_details(cluster.to_string())
            })
    }
}
