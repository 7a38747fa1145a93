use super::*;
use crate::schema::{ParamDef, ParamType};
use serde_json::json;

fn status_schema() -> ParamSpec {
    ParamSpec::new()
        .with("status", ParamDef::new(ParamType::string()))
        .with("uptime", ParamDef::new(ParamType::number()))
        .with("version", ParamDef::new(ParamType::string()))
        .with("timestamp", ParamDef::new(ParamType::string()))
}

#[test]
fn egress_firewall_drops_undeclared_fields() {
    let presenter = Presenter::builder("status", status_schema()).build();
    let datum = json!({
        "status": "healthy",
        "uptime": 12.5,
        "version": "0.1.0",
        "timestamp": "2025-01-01T00:00:00Z",
        "tenant": "acme",
    });
    let response = presenter.present(&datum, &ExecutionContext::new(), None).unwrap();
    let primary: Value = serde_json::from_str(response.content[0].as_text()).unwrap();
    assert_eq!(
        primary,
        json!({"status": "healthy", "uptime": 12.5, "version": "0.1.0", "timestamp": "2025-01-01T00:00:00Z"})
    );
    assert!(primary.get("tenant").is_none());
}

#[test]
fn validation_failure_is_a_critical_presenter_error() {
    let presenter = Presenter::builder("status", status_schema()).build();
    let datum = json!({"status": "healthy"});
    let err = presenter.present(&datum, &ExecutionContext::new(), None).unwrap_err();
    assert!(matches!(err, KernelError::PresenterValidation(_)));
}

#[test]
fn redaction_replaces_dotted_path_value() {
    let schema = ParamSpec::new().with("email", ParamDef::new(ParamType::string()));
    let presenter = Presenter::builder("user", schema).redact("email").build();
    let datum = json!({"email": "a@example.com"});
    let response = presenter.present(&datum, &ExecutionContext::new(), None).unwrap();
    let primary: Value = serde_json::from_str(response.content[0].as_text()).unwrap();
    assert_eq!(primary["email"], "[REDACTED]");
}

#[test]
fn select_narrows_to_declared_fields_only() {
    let presenter = Presenter::builder("status", status_schema()).build();
    let datum = json!({"status": "healthy", "uptime": 1.0, "version": "x", "timestamp": "t"});
    let select = vec!["status".to_string(), "bogus".to_string()];
    let response = presenter
        .present(&datum, &ExecutionContext::new(), Some(&select))
        .unwrap();
    let primary: Value = serde_json::from_str(response.content[0].as_text()).unwrap();
    assert_eq!(primary, json!({"status": "healthy"}));
}

fn item_schema() -> ParamSpec {
    ParamSpec::new().with("id", ParamDef::new(ParamType::integer()))
}

#[test]
fn agent_limit_truncates_collections_and_reports_hidden_count() {
    let presenter = Presenter::builder("items", item_schema())
        .agent_limit(AgentLimit::new(2))
        .build();
    let datum = json!([{"id": 1}, {"id": 2}, {"id": 3}, {"id": 4}, {"id": 5}]);
    let response = presenter.present(&datum, &ExecutionContext::new(), None).unwrap();
    let primary: Value = serde_json::from_str(response.content[0].as_text()).unwrap();
    assert_eq!(primary.as_array().unwrap().len(), 2);
    let has_note = response
        .content
        .iter()
        .any(|b| b.as_text().contains("3 items hidden"));
    assert!(has_note);
}

#[test]
fn agent_limit_does_not_apply_to_a_single_object() {
    let presenter = Presenter::builder("status", status_schema())
        .agent_limit(AgentLimit::new(1))
        .build();
    let datum = json!({"status": "ok", "uptime": 1.0, "version": "x", "timestamp": "t"});
    let response = presenter.present(&datum, &ExecutionContext::new(), None).unwrap();
    assert!(!response.content.iter().any(|b| b.as_text().contains("hidden")));
}

#[test]
fn system_rules_block_includes_static_dynamic_and_auto_rules() {
    let schema = ParamSpec::new().with(
        "status",
        ParamDef::new(ParamType::string()).describe("current health"),
    );
    let presenter = Presenter::builder("status", schema)
        .rule("never fabricate a status")
        .dynamic_rule(Arc::new(|_ctx| vec!["respect tenant scoping".to_string()]))
        .auto_rules(true)
        .build();
    let datum = json!({"status": "ok"});
    let response = presenter.present(&datum, &ExecutionContext::new(), None).unwrap();
    let rules_block = response.content.last().unwrap().as_text();
    assert!(rules_block.contains("never fabricate a status"));
    assert!(rules_block.contains("respect tenant scoping"));
    assert!(rules_block.contains("status: current health"));
}

#[test]
fn suggested_actions_block_is_omitted_when_empty() {
    let presenter = Presenter::builder("status", status_schema())
        .suggested_actions(Arc::new(|_d| Vec::new()))
        .build();
    let datum = json!({"status": "ok", "uptime": 1.0, "version": "x", "timestamp": "t"});
    let response = presenter.present(&datum, &ExecutionContext::new(), None).unwrap();
    assert!(!response.content.iter().any(|b| b.as_text().contains("SUGGESTED_ACTIONS")));
}

#[test]
fn suggested_actions_block_lists_tool_and_reason() {
    let presenter = Presenter::builder("status", status_schema())
        .suggested_actions(Arc::new(|_d| vec![SuggestedAction::new("restart", "service degraded")]))
        .build();
    let datum = json!({"status": "ok", "uptime": 1.0, "version": "x", "timestamp": "t"});
    let response = presenter.present(&datum, &ExecutionContext::new(), None).unwrap();
    let block = response
        .content
        .iter()
        .find(|b| b.as_text().contains("SUGGESTED_ACTIONS"))
        .unwrap();
    assert!(block.as_text().contains("restart: service degraded"));
}

#[test]
fn embed_rules_propagate_without_renesting_output() {
    let child_schema = ParamSpec::new().with("id", ParamDef::new(ParamType::string()));
    let child = Arc::new(Presenter::builder("owner", child_schema).rule("owner ids are opaque").build());

    let parent_schema = ParamSpec::new().with("owner", ParamDef::new(ParamType::string()));
    let parent = Presenter::builder("resource", parent_schema)
        .embed("owner", child)
        .build();

    let datum = json!({"owner": "u1"});
    let response = parent.present(&datum, &ExecutionContext::new(), None).unwrap();

    let primary: Value = serde_json::from_str(response.content[0].as_text()).unwrap();
    assert_eq!(primary, json!({"owner": "u1"}));

    let rules_block = response.content.last().unwrap().as_text();
    assert!(rules_block.contains("owner ids are opaque"));
}

#[test]
fn accessors_expose_schema_keys_and_redact_paths_and_limit() {
    let presenter = Presenter::builder("status", status_schema())
        .redact("version")
        .agent_limit(AgentLimit::new(10))
        .build();
    assert_eq!(presenter.get_agent_limit_max(), Some(10));
    assert!(presenter.get_schema_keys().iter().any(|k| *k == "status"));
    assert_eq!(presenter.get_redact_paths(), &["version".to_string()]);
}
