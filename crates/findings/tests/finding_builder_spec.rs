use findings::*;
use serde_json::json;

#[test]
fn given_title_and_key_when_building_minimal_finding_then_defaults_apply() {
    let finding = Finding::builder("Max replicas updated")
        .aggregation_key("scale_hpa_callback")
        .build()
        .expect("Should build successfully");

    assert_eq!(finding.severity, FindingSeverity::Info);
    assert_eq!(finding.source, FindingSource::None);
    assert!(finding.enrichments.is_empty());
    assert!(finding.subject.is_none());
}

#[test]
fn given_missing_aggregation_key_when_building_then_fails() {
    let err = Finding::builder("Something happened")
        .build()
        .expect_err("Key is required");
    assert_eq!(err, BuildError::MissingAggregationKey);

    let err = Finding::builder("   ")
        .aggregation_key("key")
        .build()
        .expect_err("Title is required");
    assert_eq!(err, BuildError::MissingTitle);
}

#[test]
fn given_enrichments_when_iterating_then_blocks_are_split_by_type() {
    let mut finding = Finding::builder("HPA reached limit")
        .severity(FindingSeverity::Low)
        .source(FindingSource::KubernetesApiServer)
        .aggregation_key("alert_on_hpa_reached_limit")
        .add_markdown("first")
        .build()
        .expect("Should build successfully");

    finding.add_enrichment(vec![
        Block::markdown("second"),
        Block::callback(vec![CallbackChoice::new(
            "Update HPA max replicas to: 6",
            "scale_hpa_callback",
            json!({ "max_replicas": 6 }),
        )]),
    ]);

    let markdown: Vec<&str> = finding.markdown_blocks().collect();
    assert_eq!(markdown, vec!["first", "second"]);

    let choices: Vec<&CallbackChoice> = finding.callback_choices().collect();
    assert_eq!(choices.len(), 1);
    assert_eq!(choices[0].action_name, "scale_hpa_callback");
    assert_eq!(choices[0].action_params["max_replicas"], 6);
}

#[test]
fn given_finding_when_serialized_then_wire_format_is_camel_case() {
    let finding = Finding::builder("HPA reached limit")
        .severity(FindingSeverity::Low)
        .source(FindingSource::KubernetesApiServer)
        .aggregation_key("alert_on_hpa_reached_limit")
        .subject(FindingSubject::new(
            "HorizontalPodAutoscaler",
            "web",
            Some("beta".to_string()),
        ))
        .add_enrichment(vec![Block::markdown("text")])
        .build()
        .expect("Should build successfully");

    let value = serde_json::to_value(&finding).expect("Should serialize");
    assert_eq!(value["severity"], "low");
    assert_eq!(value["source"], "kubernetes_api_server");
    assert_eq!(value["aggregationKey"], "alert_on_hpa_reached_limit");
    assert_eq!(value["subject"]["namespace"], "beta");
    assert_eq!(value["enrichments"][0]["blocks"][0]["type"], "markdown");
    assert!(value.get("description").is_none());
}

#[test]
fn given_severities_when_compared_then_order_follows_urgency() {
    assert!(FindingSeverity::High > FindingSeverity::Low);
    assert!(FindingSeverity::Low > FindingSeverity::Info);
    assert_eq!(FindingSeverity::Medium.to_string(), "medium");
}
