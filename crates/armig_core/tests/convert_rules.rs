use std::collections::{BTreeMap, BTreeSet};

use pretty_assertions::assert_eq;

use armig_core::domain::{
    match_type, AlertLevel, AlertType, ChannelStatus, LegacyLoggingRule, LegacyMonitorRule,
    LegacyReceiver, LogqlGeneratorSpec, MatchType, PromqlGeneratorSpec,
};
use armig_core::export::{convert_logging_rule, convert_monitor_rule};

fn label_pairs() -> BTreeMap<String, String> {
    let mut pairs = BTreeMap::new();
    pairs.insert("container".to_string(), "app|sidecar".to_string());
    pairs.insert("namespace".to_string(), "prod".to_string());
    pairs.insert("pod".to_string(), "web-.*".to_string());
    pairs
}

fn monitor_rule() -> LegacyMonitorRule {
    LegacyMonitorRule {
        namespace: "monitoring".to_string(),
        name: "node-memory-high".to_string(),
        expr: "node_memory_usage > 80".to_string(),
        message: "memory usage on {{ $labels.node }} is high".to_string(),
        for_duration: "10m".to_string(),
        inhibit_labels: vec!["node".to_string(), "severity".to_string()],
        is_open: true,
        alert_levels: vec![
            AlertLevel {
                compare_op: ">".to_string(),
                compare_value: "80".to_string(),
                severity: "error".to_string(),
            },
            AlertLevel {
                compare_op: ">".to_string(),
                compare_value: "95".to_string(),
                severity: "critical".to_string(),
            },
        ],
        receivers: vec![
            LegacyReceiver {
                alert_channel_id: 3,
                interval: "30m".to_string(),
            },
            LegacyReceiver {
                alert_channel_id: 1,
                interval: "6h".to_string(),
            },
        ],
        promql_generator: Some(PromqlGeneratorSpec {
            scope: "system".to_string(),
            resource: "node".to_string(),
            rule: "memoryUsage".to_string(),
            unit: "percent".to_string(),
            label_pairs: label_pairs(),
        }),
        channel_status: ChannelStatus::Normal,
    }
}

fn logging_rule() -> LegacyLoggingRule {
    LegacyLoggingRule {
        namespace: "apps".to_string(),
        name: "error-burst".to_string(),
        expr: "sum(count_over_time({namespace=\"apps\"} |= \"error\" [1m])) > 100".to_string(),
        message: "error burst in apps".to_string(),
        for_duration: "2m".to_string(),
        inhibit_labels: vec![],
        is_open: false,
        alert_levels: vec![AlertLevel {
            compare_op: ">".to_string(),
            compare_value: "100".to_string(),
            severity: "error".to_string(),
        }],
        receivers: vec![LegacyReceiver {
            alert_channel_id: 2,
            interval: "1h".to_string(),
        }],
        logql_generator: Some(LogqlGeneratorSpec {
            duration: "1m".to_string(),
            match_expr: "error".to_string(),
            label_pairs: label_pairs(),
        }),
        channel_status: ChannelStatus::Lost,
    }
}

#[test]
fn match_type_depends_only_on_alternation_separator() {
    for (value, expected) in [
        ("prod|staging", MatchType::Regexp),
        ("a||b", MatchType::Regexp),
        ("|leading", MatchType::Regexp),
        ("plain", MatchType::Equal),
        ("web-.*", MatchType::Equal),
        ("", MatchType::Equal),
        ("with space", MatchType::Equal),
    ] {
        assert_eq!(match_type(value), expected, "value={value:?}");
    }
}

#[test]
fn converting_twice_yields_identical_rules_with_set_equal_matchers() {
    let legacy = monitor_rule();
    let first = convert_monitor_rule("cluster-a", &legacy);
    let second = convert_monitor_rule("cluster-a", &legacy);

    // Matcher order within one conversion is permitted to vary; the matcher
    // sets must be identical.
    let matchers_of = |r: &armig_core::domain::AlertRule| {
        r.promql_generator
            .as_ref()
            .unwrap()
            .label_matchers
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
    };
    assert_eq!(matchers_of(&first), matchers_of(&second));

    let strip = |mut r: armig_core::domain::AlertRule| {
        r.promql_generator.as_mut().unwrap().label_matchers.clear();
        r
    };
    assert_eq!(strip(first), strip(second));
}

#[test]
fn monitor_conversion_preserves_ordering_of_levels_and_receivers() {
    let legacy = monitor_rule();
    let rule = convert_monitor_rule("cluster-a", &legacy);

    assert_eq!(rule.alert_type, AlertType::Monitor);
    assert_eq!(rule.alert_levels, legacy.alert_levels);
    assert_eq!(rule.receivers.len(), 2);
    assert_eq!(rule.receivers[0].alert_channel_id, 3);
    assert_eq!(rule.receivers[1].alert_channel_id, 1);
    assert_eq!(rule.receivers[0].interval, "30m");
}

#[test]
fn monitor_conversion_derives_matcher_types_from_values() {
    let rule = convert_monitor_rule("cluster-a", &monitor_rule());
    let gen = rule.promql_generator.expect("promql generator");
    assert_eq!(gen.scope, "system");
    assert_eq!(gen.unit, "percent");

    let by_name: BTreeMap<_, _> = gen
        .label_matchers
        .iter()
        .map(|m| (m.name.as_str(), m.match_type))
        .collect();
    assert_eq!(by_name["container"], MatchType::Regexp);
    assert_eq!(by_name["namespace"], MatchType::Equal);
    // A regex-looking value without an alternation stays an exact match.
    assert_eq!(by_name["pod"], MatchType::Equal);
}

#[test]
fn logging_conversion_builds_logql_generator_only() {
    let legacy = logging_rule();
    let rule = convert_logging_rule("cluster-b", &legacy);

    assert_eq!(rule.cluster, "cluster-b");
    assert_eq!(rule.alert_type, AlertType::Logging);
    assert!(!rule.is_open);
    assert!(rule.promql_generator.is_none());

    let gen = rule.logql_generator.expect("logql generator");
    assert_eq!(gen.duration, "1m");
    assert_eq!(gen.match_expr, "error");
    assert_eq!(gen.label_matchers.len(), 3);
}

#[test]
fn degraded_channel_status_still_emits_the_rule() {
    let legacy = logging_rule();
    assert_eq!(legacy.channel_status, ChannelStatus::Lost);
    let rule = convert_logging_rule("cluster-b", &legacy);
    assert_eq!(rule.receivers.len(), 1);
    assert_eq!(rule.receivers[0].alert_channel_id, 2);
}
