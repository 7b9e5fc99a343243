mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_json_diff::assert_json_eq;
use common::RecordingTransport;
use graphsync_core::prelude::*;
use graphsync_core::{
    Base64Fields, DiagnosticKind, HttpMethod, SubActionGate, TransportError, WriteStep,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

const SCRIPTS: &str = "/deviceManagement/deviceShellScripts";

fn script_descriptor() -> ResourceDescriptor {
    let schema = SchemaNode::object(
        ObjectNode::new()
            .attribute("id", Attribute::computed(SchemaNode::string()))
            .attribute("displayName", Attribute::required(SchemaNode::string()))
            .attribute("scriptContent", Attribute::optional(SchemaNode::string()))
            .attribute("assignments", Attribute::optional(SchemaNode::set(SchemaNode::dynamic())))
            .attribute("roleScopeTagIds", Attribute::optional(SchemaNode::set(SchemaNode::string())))
            .attribute("notes", Attribute::optional(SchemaNode::string())),
    );
    ResourceDescriptor::new("device_shell_script", SCRIPTS, schema)
        .with_sub_action(WriteSubAction::new("assign").mapped_attribute("assignments", "deviceManagementScriptAssignments"))
        .with_sub_action(WriteSubAction::new("updateScopeTags").attribute("roleScopeTagIds"))
        .with_sub_action(
            WriteSubAction::new("annotate")
                .attribute("notes")
                .gate(SubActionGate::UpdateOnly),
        )
        .with_write_middleware(Arc::new(Base64Fields::new(["scriptContent"])))
}

fn engine(descriptor: ResourceDescriptor, transport: &Arc<RecordingTransport>) -> ResourceEngine {
    ResourceEngine::new(Arc::new(descriptor), transport.clone()).unwrap()
}

fn script_transport() -> Arc<RecordingTransport> {
    let transport = Arc::new(RecordingTransport::new());
    transport
        .on_method(HttpMethod::Post, SCRIPTS, 201, json!({ "id": "s1", "displayName": "s" }))
        .on_method(HttpMethod::Patch, &format!("{SCRIPTS}/s1"), 204, serde_json::Value::Null)
        .on_method(HttpMethod::Post, &format!("{SCRIPTS}/s1/assign"), 204, serde_json::Value::Null)
        .on_method(HttpMethod::Post, &format!("{SCRIPTS}/s1/updateScopeTags"), 204, serde_json::Value::Null)
        .on_method(HttpMethod::Post, &format!("{SCRIPTS}/s1/annotate"), 204, serde_json::Value::Null);
    transport
}

#[tokio::test]
async fn test_create_runs_sub_actions_in_order_and_skips_update_only() {
    let transport = script_transport();
    let engine = engine(script_descriptor(), &transport);

    let outcome = engine
        .create(
            &json!({ "displayName": "s", "scriptContent": "echo hi", "notes": "n" }),
            &OperationContext::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        transport.call_lines(),
        vec![
            format!("POST {SCRIPTS}"),
            format!("POST {SCRIPTS}/s1/assign"),
            format!("POST {SCRIPTS}/s1/updateScopeTags"),
        ]
    );
    assert_eq!(outcome.id.as_deref(), Some("s1"));
    assert_eq!(outcome.progress.committed, vec![0, 1]);
    assert_eq!(outcome.progress.skipped, vec![2]);

    let calls = transport.calls();
    assert_json_eq!(
        calls[0].body.clone().unwrap(),
        json!({ "displayName": "s", "scriptContent": "ZWNobyBoaQ==", "notes": "n" })
    );
    assert_json_eq!(
        calls[1].body.clone().unwrap(),
        json!({ "deviceManagementScriptAssignments": [] })
    );
    assert_json_eq!(calls[2].body.clone().unwrap(), json!({ "roleScopeTagIds": [] }));
}

#[tokio::test]
async fn test_update_runs_every_sub_action_in_order() {
    let transport = script_transport();
    let engine = engine(script_descriptor(), &transport);

    engine
        .update(
            &ResourceTarget::new("s1"),
            &json!({ "displayName": "s", "notes": "n", "roleScopeTagIds": ["0"] }),
            &UpdateOptions::default(),
            &OperationContext::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        transport.call_lines(),
        vec![
            format!("PATCH {SCRIPTS}/s1"),
            format!("POST {SCRIPTS}/s1/assign"),
            format!("POST {SCRIPTS}/s1/updateScopeTags"),
            format!("POST {SCRIPTS}/s1/annotate"),
        ]
    );
    let calls = transport.calls();
    assert_json_eq!(calls[0].body.clone().unwrap(), json!({ "displayName": "s" }));
    assert_json_eq!(calls[3].body.clone().unwrap(), json!({ "notes": "n" }));
}

#[tokio::test]
async fn test_singleton_create_is_a_single_patch() {
    let schema = SchemaNode::object(
        ObjectNode::new().attribute("a", Attribute::optional(SchemaNode::int64())),
    );
    let descriptor = ResourceDescriptor::new("policy", "/policies/x/default", schema).singleton();
    let transport = Arc::new(RecordingTransport::new());
    transport.on_method(HttpMethod::Patch, "/policies/x/default", 204, serde_json::Value::Null);
    let engine = engine(descriptor, &transport);

    let outcome = engine
        .create(&json!({ "a": 1 }), &OperationContext::new())
        .await
        .unwrap();

    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, HttpMethod::Patch);
    assert_eq!(calls[0].uri, "/policies/x/default");
    assert_json_eq!(calls[0].body.clone().unwrap(), json!({ "a": 1 }));
    assert_eq!(outcome.id, None);
}

#[tokio::test]
async fn test_failed_sub_action_reports_progress_and_stops() {
    let transport = Arc::new(RecordingTransport::new());
    transport
        .on_method(HttpMethod::Patch, &format!("{SCRIPTS}/s1"), 204, serde_json::Value::Null)
        .on_method(HttpMethod::Post, &format!("{SCRIPTS}/s1/assign"), 204, serde_json::Value::Null)
        .on_method(
            HttpMethod::Post,
            &format!("{SCRIPTS}/s1/updateScopeTags"),
            500,
            json!({ "error": { "code": "InternalServerError", "message": "boom" } }),
        );
    let engine = engine(script_descriptor(), &transport);

    let err = engine
        .update(
            &ResourceTarget::new("s1"),
            &json!({ "displayName": "s", "notes": "n" }),
            &UpdateOptions::default(),
            &OperationContext::new(),
        )
        .await
        .unwrap_err();

    let EngineError::PartialWrite {
        progress,
        failed_step,
        source,
    } = &err
    else {
        panic!("expected PartialWrite, got {err:?}");
    };
    assert!(progress.primary_committed);
    assert_eq!(progress.committed, vec![0]);
    assert_eq!(progress.cursor(), Some(WriteStep::SubAction(0)));
    assert_eq!(*failed_step, WriteStep::SubAction(1));
    assert!(source.is_retryable());
    assert!(err.is_retryable());

    assert_eq!(transport.calls().len(), 3);
}

#[tokio::test]
async fn test_primary_failure_is_returned_unwrapped() {
    let transport = Arc::new(RecordingTransport::new());
    transport.on_method(
        HttpMethod::Post,
        SCRIPTS,
        400,
        json!({ "error": { "code": "BadRequest", "message": "Invalid displayName" } }),
    );
    let engine = engine(script_descriptor(), &transport);

    let err = engine
        .create(&json!({ "displayName": "s" }), &OperationContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::RemoteRequest { status: 400, .. }));
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test]
async fn test_validation_errors_send_nothing() {
    let transport = Arc::new(RecordingTransport::new());
    let engine = engine(script_descriptor(), &transport);

    let err = engine
        .create(&json!({ "displayName": 42 }), &OperationContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Validation { .. }));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_stale_etag_surfaces_as_conflict() {
    let transport = Arc::new(RecordingTransport::new());
    transport.on_method(
        HttpMethod::Patch,
        &format!("{SCRIPTS}/s1"),
        412,
        json!({ "error": { "code": "PreconditionFailed", "message": "etag mismatch" } }),
    );
    let engine = engine(script_descriptor(), &transport);

    let err = engine
        .update(
            &ResourceTarget::new("s1"),
            &json!({ "displayName": "s" }),
            &UpdateOptions::default().with_if_match("W/\"7\""),
            &OperationContext::new(),
        )
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    assert!(err.is_retryable());
    assert_eq!(transport.calls()[0].if_match.as_deref(), Some("W/\"7\""));
}

#[tokio::test]
async fn test_null_clearing_from_prior_state() {
    let transport = script_transport();
    let engine = engine(script_descriptor(), &transport);

    let prior = json!({ "id": "s1", "displayName": "s", "scriptContent": "old" });
    engine
        .update(
            &ResourceTarget::new("s1"),
            &json!({ "displayName": "s" }),
            &UpdateOptions::default().with_prior(prior),
            &OperationContext::new(),
        )
        .await
        .unwrap();

    assert_json_eq!(
        transport.calls()[0].body.clone().unwrap(),
        json!({ "displayName": "s", "scriptContent": null })
    );
}

#[test]
fn test_null_clearing_leaves_remote_computed_values_alone() {
    let schema = SchemaNode::object(
        ObjectNode::new()
            .attribute("id", Attribute::computed(SchemaNode::string()))
            .attribute("displayName", Attribute::required(SchemaNode::string()))
            .attribute("description", Attribute::optional(SchemaNode::string()))
            .attribute("createdBy", Attribute::optional_computed(SchemaNode::string())),
    );
    let transport = Arc::new(RecordingTransport::new());
    let engine = engine(ResourceDescriptor::new("role_scope_tag", "/deviceManagement/roleScopeTags", schema), &transport);

    let prior = json!({ "id": "t1", "displayName": "x", "description": "old", "createdBy": "server" });
    let plan = engine
        .plan_update(
            &ResourceTarget::new("t1"),
            &json!({ "displayName": "x" }),
            &UpdateOptions::default().with_prior(prior),
        )
        .unwrap();

    assert_json_eq!(
        Value::Object(plan.primary.body),
        json!({ "displayName": "x", "description": null })
    );
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_create_without_returned_id_fails_before_sub_actions() {
    let transport = Arc::new(RecordingTransport::new());
    transport.on_method(HttpMethod::Post, SCRIPTS, 201, json!({ "displayName": "s" }));
    let engine = engine(script_descriptor(), &transport);

    let err = engine
        .create(&json!({ "displayName": "s" }), &OperationContext::new())
        .await
        .unwrap_err();

    let EngineError::PartialWrite { progress, failed_step, .. } = &err else {
        panic!("expected PartialWrite, got {err:?}");
    };
    assert!(progress.primary_committed);
    assert_eq!(*failed_step, WriteStep::SubAction(0));
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test]
async fn test_child_create_uses_parent_scope_and_strips_parent_field() {
    let schema = SchemaNode::object(
        ObjectNode::new()
            .attribute("id", Attribute::computed(SchemaNode::string()))
            .attribute("mobile_app_id", Attribute::required(SchemaNode::string()))
            .attribute("intent", Attribute::required(SchemaNode::string())),
    );
    let descriptor = ResourceDescriptor::new("mobile_app_assignment", "/deviceAppManagement/mobileApps", schema)
        .with_parent("mobile_app_id", "assignments");
    let transport = Arc::new(RecordingTransport::new());
    transport.on_method(
        HttpMethod::Post,
        "/deviceAppManagement/mobileApps/P/assignments",
        201,
        json!({ "id": "A1", "intent": "required" }),
    );
    let engine = engine(descriptor, &transport);

    let outcome = engine
        .create(
            &json!({ "mobile_app_id": "P", "intent": "required" }),
            &OperationContext::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.id.as_deref(), Some("A1"));
    assert_json_eq!(
        transport.calls()[0].body.clone().unwrap(),
        json!({ "intent": "required" })
    );
}

#[tokio::test]
async fn test_cancelled_operation_sends_nothing() {
    let transport = script_transport();
    let engine = engine(script_descriptor(), &transport);
    let token = CancellationToken::new();
    token.cancel();

    let err = engine
        .create(
            &json!({ "displayName": "s" }),
            &OperationContext::new().with_cancellation(token),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Cancelled));
    assert!(transport.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_aborts_in_flight_sub_action() {
    let transport = Arc::new(RecordingTransport::new());
    transport
        .on_method(HttpMethod::Post, SCRIPTS, 201, json!({ "id": "s1" }))
        .on_delayed(
            HttpMethod::Post,
            &format!("{SCRIPTS}/s1/assign"),
            Duration::from_secs(60),
            204,
            serde_json::Value::Null,
        );
    let engine = engine(script_descriptor(), &transport);

    let err = engine
        .create(
            &json!({ "displayName": "s" }),
            &OperationContext::new().with_timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap_err();

    let EngineError::PartialWrite { failed_step, source, .. } = &err else {
        panic!("expected PartialWrite, got {err:?}");
    };
    assert_eq!(*failed_step, WriteStep::SubAction(0));
    assert!(matches!(**source, EngineError::Timeout));
    assert_eq!(transport.calls().len(), 2);
}

#[tokio::test]
async fn test_transport_failure_maps_to_engine_error() {
    let transport = Arc::new(RecordingTransport::new());
    transport.on_error(
        HttpMethod::Post,
        SCRIPTS,
        TransportError::Connection("connection refused".into()),
    );
    let engine = engine(script_descriptor(), &transport);

    let err = engine
        .create(&json!({ "displayName": "s" }), &OperationContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Transport(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_delete_semantics() {
    let transport = Arc::new(RecordingTransport::new());
    transport.on_method(HttpMethod::Delete, &format!("{SCRIPTS}/s1"), 204, serde_json::Value::Null);
    let engine = engine(script_descriptor(), &transport);

    let diagnostics = engine
        .delete(&ResourceTarget::new("s1"), &OperationContext::new())
        .await
        .unwrap();
    assert!(diagnostics.is_empty());

    // Unrouted, so the transport answers 404.
    engine
        .delete(&ResourceTarget::new("gone"), &OperationContext::new())
        .await
        .unwrap();

    let singleton = ResourceDescriptor::new(
        "policy",
        "/policies/x/default",
        SchemaNode::object(ObjectNode::new()),
    )
    .singleton();
    let singleton_transport = Arc::new(RecordingTransport::new());
    let singleton_engine = ResourceEngine::new(Arc::new(singleton), singleton_transport.clone()).unwrap();
    let diagnostics = singleton_engine
        .delete(&ResourceTarget::singleton(), &OperationContext::new())
        .await
        .unwrap();
    assert_eq!(diagnostics.count(DiagnosticKind::SingletonDelete), 1);
    assert!(singleton_transport.calls().is_empty());
}

#[test]
fn test_plan_is_serialisable() {
    let transport = Arc::new(RecordingTransport::new());
    let engine = engine(script_descriptor(), &transport);

    let plan = engine
        .plan_update(
            &ResourceTarget::new("s1"),
            &json!({ "displayName": "s", "notes": "n" }),
            &UpdateOptions::default(),
        )
        .unwrap();

    assert_json_eq!(
        serde_json::to_value(&plan).unwrap(),
        json!({
            "operation": "update",
            "type_name": "device_shell_script",
            "resource_id": "s1",
            "primary": {
                "method": "PATCH",
                "uri": "/deviceManagement/deviceShellScripts/s1",
                "body": { "displayName": "s" }
            },
            "sub_actions": [
                { "index": 0, "method": "POST", "uri_suffix": "assign", "body": { "deviceManagementScriptAssignments": [] } },
                { "index": 1, "method": "POST", "uri_suffix": "updateScopeTags", "body": { "roleScopeTagIds": [] } },
                { "index": 2, "method": "POST", "uri_suffix": "annotate", "body": { "notes": "n" } }
            ],
            "skipped_sub_actions": []
        })
    );
    assert!(transport.calls().is_empty());
}
