use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MigrateError;

/// Kind of signal a persisted alert rule evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Monitor,
    Logging,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Monitor => "monitor",
            AlertType::Logging => "logging",
        }
    }

    pub fn parse(s: &str) -> Result<Self, MigrateError> {
        match s {
            "monitor" => Ok(AlertType::Monitor),
            "logging" => Ok(AlertType::Logging),
            other => Err(MigrateError::new("DOMAIN_UNKNOWN_ALERT_TYPE", "Unknown alert type")
                .with_details(other.to_string())),
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health of the notification channel bindings on a legacy rule, as reported
/// by the cluster it was read from. Anything but `Normal` is surfaced as a
/// warning during conversion; it never blocks the rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Normal,
    Lost,
    Unknown,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Normal => "normal",
            ChannelStatus::Lost => "lost",
            ChannelStatus::Unknown => "unknown",
        }
    }

    /// Anything unrecognized reads as `Unknown`; channel status is advisory
    /// and never blocks a rule.
    pub fn parse(s: &str) -> Self {
        match s {
            "normal" => ChannelStatus::Normal,
            "lost" => ChannelStatus::Lost,
            _ => ChannelStatus::Unknown,
        }
    }
}

/// Notification channel record, loaded alongside receivers so downstream
/// sync can materialize them without going back to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertChannel {
    pub id: i64,
    pub name: String,
    pub status: ChannelStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MatchType {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "=~")]
    Regexp,
}

/// A value that carries an alternation separator can only be expressed as a
/// regex match; everything else stays an exact match. This is a one-way lossy
/// inference from the flat label-pair map.
pub fn match_type(value: &str) -> MatchType {
    if value.contains('|') {
        MatchType::Regexp
    } else {
        MatchType::Equal
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LabelMatcher {
    #[serde(rename = "type")]
    pub match_type: MatchType,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertLevel {
    pub compare_op: String,
    pub compare_value: String,
    pub severity: String,
}

/// Receiver binding on a canonical rule. Only the channel id is persisted;
/// `alert_channel` is filled when the rule is read back out of the store and
/// is never written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertReceiver {
    pub alert_channel_id: i64,
    pub interval: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_channel: Option<AlertChannel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromqlGenerator {
    pub scope: String,
    pub resource: String,
    pub rule: String,
    pub unit: String,
    pub label_matchers: Vec<LabelMatcher>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogqlGenerator {
    pub duration: String,
    #[serde(rename = "match")]
    pub match_expr: String,
    pub label_matchers: Vec<LabelMatcher>,
}

/// Generator template descriptor on a legacy monitor rule. Label pairs are a
/// flat key -> value map; conversion turns them into typed matchers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromqlGeneratorSpec {
    pub scope: String,
    pub resource: String,
    pub rule: String,
    pub unit: String,
    pub label_pairs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogqlGeneratorSpec {
    pub duration: String,
    #[serde(rename = "match")]
    pub match_expr: String,
    pub label_pairs: BTreeMap<String, String>,
}

/// Query template resolved by name when a cluster lists its monitor rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTemplate {
    pub scope: String,
    pub resource: String,
    pub rule: String,
    pub unit: String,
    pub expr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyReceiver {
    pub alert_channel_id: i64,
    pub interval: String,
}

/// Monitor-based alert rule as read out of a cluster, pre-migration.
/// Read-only source data; never mutated by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyMonitorRule {
    pub namespace: String,
    pub name: String,
    pub expr: String,
    pub message: String,
    pub for_duration: String,
    pub inhibit_labels: Vec<String>,
    pub is_open: bool,
    pub alert_levels: Vec<AlertLevel>,
    pub receivers: Vec<LegacyReceiver>,
    pub promql_generator: Option<PromqlGeneratorSpec>,
    pub channel_status: ChannelStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyLoggingRule {
    pub namespace: String,
    pub name: String,
    pub expr: String,
    pub message: String,
    pub for_duration: String,
    pub inhibit_labels: Vec<String>,
    pub is_open: bool,
    pub alert_levels: Vec<AlertLevel>,
    pub receivers: Vec<LegacyReceiver>,
    pub logql_generator: Option<LogqlGeneratorSpec>,
    pub channel_status: ChannelStatus,
}

/// Canonical persisted alert rule, keyed by (cluster, namespace, name).
///
/// Invariant after rename phase B: `name` satisfies the slug grammar checked
/// by [`validate_rule_name`]. At most one of the two generators is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: i64,
    pub cluster: String,
    pub namespace: String,
    pub name: String,
    pub alert_type: AlertType,
    pub expr: String,
    pub message: String,
    pub for_duration: String,
    pub inhibit_labels: Vec<String>,
    pub is_open: bool,
    pub alert_levels: Vec<AlertLevel>,
    pub receivers: Vec<AlertReceiver>,
    pub promql_generator: Option<PromqlGenerator>,
    pub logql_generator: Option<LogqlGenerator>,
}

impl AlertRule {
    pub fn full_name(&self) -> String {
        format!("{}/{}/{}", self.cluster, self.namespace, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationWarning {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl MigrationWarning {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

const MAX_RULE_NAME_LEN: usize = 63;

/// Canonical-name grammar: lowercase ASCII letters, digits and hyphens, must
/// start and end with an alphanumeric, at most 63 characters.
pub fn validate_rule_name(name: &str) -> Result<(), MigrateError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_RULE_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !name.starts_with('-')
        && !name.ends_with('-');
    if valid {
        Ok(())
    } else {
        Err(MigrateError::new(
            "RENAME_INVALID_NAME",
            "Alert rule name must be a lowercase hyphenated slug",
        )
        .with_details(format!("name={name}"))
        .fatal())
    }
}

/// Kebab-case slugification used when the operator has not chosen a name.
///
/// Spaces, underscores and dots become hyphens; camel-case boundaries are
/// split; characters outside ASCII pass through lowercased, which makes the
/// result fail [`validate_rule_name`] and forces an override-map entry.
pub fn kebab_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == ' ' || c == '_' || c == '.' || c == '-' {
            if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
            continue;
        }
        if c.is_uppercase() {
            let boundary = i > 0 && {
                let p = chars[i - 1];
                p.is_lowercase()
                    || p.is_numeric()
                    || (p.is_uppercase() && chars.get(i + 1).is_some_and(|n| n.is_lowercase()))
            };
            if boundary && !out.ends_with('-') {
                out.push('-');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out.trim_matches('-').to_string()
}
